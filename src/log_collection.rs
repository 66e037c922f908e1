/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::config::roles::Stack;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Every experiment writes into its own directory under the work directory, named after the
/// experiment.
pub fn output_dir(workdir: &Path, experiment: &str) -> PathBuf {
    workdir.join(experiment)
}

pub fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).context(format!(
        "Unable to create output directory {}",
        dir.to_string_lossy()
    ))
}

/// Whether a previous run already left files in `dir`.
pub fn has_output(dir: &Path) -> anyhow::Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }

    let mut entries = fs::read_dir(dir)
        .context(format!("Unable to read {}", dir.to_string_lossy()))?;
    Ok(entries.next().is_some())
}

/// Moves `src` into `dir`, keeping its file name.
pub fn relocate(src: &Path, dir: &Path) -> anyhow::Result<PathBuf> {
    let file_name = src
        .file_name()
        .context(format!("{} has no file name", src.to_string_lossy()))?;
    let dest = dir.join(file_name);
    debug!("Moving {} to {}", src.to_string_lossy(), dest.to_string_lossy());

    if fs::rename(src, &dest).is_err() {
        // rename cannot cross file systems
        fs::copy(src, &dest).context(format!(
            "Unable to move {} to {}",
            src.to_string_lossy(),
            dest.to_string_lossy()
        ))?;
        fs::remove_file(src).context(format!("Unable to remove {}", src.to_string_lossy()))?;
    }

    Ok(dest)
}

/// Summary of one experiment run, written next to its logs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Manifest {
    pub experiment: String,
    pub server_stack: Stack,
    pub client_stack: Stack,
    pub nconns: Option<u32>,
    pub msize: Option<u32>,
    /// Unix time in milliseconds.
    pub start_time: i64,
    pub stop_time: i64,
    pub files: Vec<String>,
}
impl Manifest {
    pub fn write(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).context(format!(
            "Unable to write manifest {}",
            path.to_string_lossy()
        ))?;
        Ok(path)
    }

    pub fn try_from_path(path: &Path) -> anyhow::Result<Self> {
        let json = fs::read_to_string(path)
            .context(format!("Unable to read manifest {}", path.to_string_lossy()))?;
        serde_json::from_str(&json).context("Invalid manifest")
    }
}
