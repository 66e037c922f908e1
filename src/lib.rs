/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod clap_args;
pub mod components;
pub mod config;
pub mod experiment;
pub mod hooks;
pub mod log_collection;
pub mod node;
pub mod session;
pub mod settle;

use anyhow::Context;
use chrono::Utc;
use clap_args::RunOptions;
use colored::Colorize;
use config::{ensure_unique_names, ExperimentConfig, Suite};
use experiment::Experiment;
use hooks::{CaptureCheck, NoopHook, PhaseHook};
use itertools::Itertools;
use log_collection::Manifest;
use regex::Regex;
use session::{memory::MemoryMultiplexer, tmux::TmuxMultiplexer, Multiplexer, SessionManager};
use settle::{Delay, Settle, Timing};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use term_table::{row, row::Row, rows, table_cell::*, Table, TableStyle};
use tracing::{subscriber::set_global_default, warn, Subscriber};
use tracing_subscriber::EnvFilter;

// ******** ******** ********
// **       LOGGING        **
// ******** ******** ********
pub fn get_subscriber(verbose: bool) -> impl Subscriber + Sync + Send {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .finish()
}

pub fn init_subscriber(subscriber: impl Subscriber + Sync + Send) -> anyhow::Result<()> {
    set_global_default(subscriber).context("Failed to set tracing subscriber")
}

// ******** ******** ********
// **      SELECTION       **
// ******** ******** ********

/// Translates a shell glob into an anchored regex. Only `*` and `?` are special.
pub fn glob_to_regex(glob: &str) -> anyhow::Result<Regex> {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');

    Regex::new(&pattern).context(format!("Invalid filter {}", glob))
}

/// Loads every suite, checks experiment names are unique across all of them and keeps the
/// experiments matching any of the filters. No filters keeps everything.
pub fn load_experiments(
    files: &[PathBuf],
    filters: &[String],
) -> anyhow::Result<Vec<ExperimentConfig>> {
    let filters = filters
        .iter()
        .map(|f| glob_to_regex(f))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut experiments = vec![];
    for file in files {
        let suite = Suite::try_from_path(file)?;
        experiments.extend(
            suite
                .experiments()
                .context(format!("Invalid suite file {}", file.to_string_lossy()))?,
        );
    }
    ensure_unique_names(&experiments)?;

    Ok(experiments
        .into_iter()
        .filter(|e| filters.is_empty() || filters.iter().any(|f| f.is_match(&e.name)))
        .collect())
}

// ******** ******** ********
// **       COMMANDS       **
// ******** ******** ********

/// Renders the experiments a set of suites expands to.
pub fn list(files: &[PathBuf], filters: &[String]) -> anyhow::Result<String> {
    let experiments = load_experiments(files, filters)?;

    let mut rows = rows![row![
        TableCell::builder("Experiment".bold()).build(),
        TableCell::builder("Server".bold()).build(),
        TableCell::builder("Client".bold()).build(),
        TableCell::builder("VMs".bold()).build(),
        TableCell::builder("Benchmarks".bold()).build()
    ]];
    for experiment in experiments.iter() {
        rows.push(row![
            TableCell::new(experiment.name.green()),
            TableCell::new(experiment.server.stack()),
            TableCell::new(experiment.client.stack()),
            TableCell::new(format!(
                "{} / {}",
                experiment.server.vms.len(),
                experiment.client.vms.len()
            )),
            TableCell::new(format!(
                "{} / {}",
                experiment.server.benchmarks.len(),
                experiment.client.benchmarks.len()
            ))
        ]);
    }

    let table = Table::builder()
        .rows(rows)
        .style(TableStyle::rounded())
        .build();
    Ok(table.render())
}

pub fn init(path: &Path) -> anyhow::Result<()> {
    Suite::write_example_to_file(path)?;
    println!("> wrote example suite to {}", path.to_string_lossy().green());
    Ok(())
}

/// Runs every selected experiment one after the other. With `--reset` it tears down every
/// experiment of the suites instead, whatever the filters select.
pub async fn run(opts: &RunOptions) -> anyhow::Result<()> {
    let filters: &[String] = if opts.reset { &[] } else { &opts.filter };
    let experiments = load_experiments(&opts.files, filters)?;
    if experiments.is_empty() {
        anyhow::bail!("No experiment matches the given filters");
    }

    let mux: Arc<dyn Multiplexer> = if opts.dry_run {
        Arc::new(MemoryMultiplexer::echoing())
    } else {
        Arc::new(TmuxMultiplexer::connect(opts.tmux_session.as_deref())?)
    };

    for config in experiments {
        let timing = if opts.dry_run {
            Timing::instant()
        } else {
            config.timing.clone()
        };
        let settle = settle::from_timing(&timing)?;
        let hook: Arc<dyn PhaseHook> = if opts.strict {
            Arc::new(CaptureCheck::new(&config.verify.fail_patterns)?)
        } else {
            Arc::new(NoopHook)
        };
        let sessions = Arc::new(SessionManager::new(
            mux.clone(),
            &config.defaults.pane_prefix,
            &config.defaults.remote_connect_cmd,
            settle.clone(),
        ));
        let mut experiment = Experiment::new(config, sessions.clone(), settle.clone(), hook);

        if opts.reset {
            println!("> resetting {}", experiment.name().green());
            experiment.reset().await?;
            // an aborted run may have opened panes under names this configuration no longer has
            sessions.release_by_prefix()?;
            continue;
        }

        let dir = log_collection::output_dir(&opts.workdir, experiment.name());
        if !opts.force && log_collection::has_output(&dir)? {
            println!(
                "> skipping {}, {} already holds results",
                experiment.name().yellow(),
                dir.to_string_lossy()
            );
            continue;
        }

        run_experiment(&mut experiment, settle.as_ref(), &dir, !opts.dry_run).await?;
    }

    Ok(())
}

/// Resets, runs, collects and resets one experiment. A failed run is still torn down before
/// its error is returned.
pub async fn run_experiment(
    experiment: &mut Experiment,
    settle: &dyn Settle,
    dir: &Path,
    collect: bool,
) -> anyhow::Result<Option<Manifest>> {
    println!("> running experiment {}", experiment.name().green());
    experiment.reset().await?;

    let res = run_and_collect(experiment, settle, dir, collect).await;
    if let Err(err) = &res {
        warn!("Experiment {} failed: {:#}", experiment.name(), err);
    }

    if let Err(err) = experiment.reset().await {
        if res.is_ok() {
            return Err(err);
        }
        warn!(
            "Resetting {} after the failure also failed: {:#}",
            experiment.name(),
            err
        );
    }
    res
}

async fn run_and_collect(
    experiment: &mut Experiment,
    settle: &dyn Settle,
    dir: &Path,
    collect: bool,
) -> anyhow::Result<Option<Manifest>> {
    let start_time = Utc::now().timestamp_millis();
    experiment.run().await?;

    println!("> letting {} run", experiment.name().green());
    settle.wait(Delay::Runtime).await;
    let stop_time = Utc::now().timestamp_millis();

    if !collect {
        return Ok(None);
    }

    let files = experiment.save_logs(dir).await?;
    let manifest = Manifest {
        experiment: experiment.name().to_string(),
        server_stack: experiment.server().stack(),
        client_stack: experiment.client().stack(),
        nconns: experiment.config().nconns,
        msize: experiment.config().msize,
        start_time,
        stop_time,
        files: files
            .iter()
            .filter_map(|f| f.file_name())
            .map(|f| f.to_string_lossy().to_string())
            .collect_vec(),
    };
    manifest.write(dir)?;

    println!(
        "> collected {} files into {}",
        manifest.files.len(),
        dir.to_string_lossy().green()
    );
    Ok(Some(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globs_match_whole_names() -> anyhow::Result<()> {
        let re = glob_to_regex("scal*.vm-?are")?;
        assert!(re.is_match("scalability-bare-metal.vm-bare"));
        assert!(!re.is_match("scalability-bare-metal.vm-bare_nconns64"));
        assert!(!re.is_match("xscal.vm-bare"));

        let dots = glob_to_regex("a.b")?;
        assert!(dots.is_match("a.b"));
        assert!(!dots.is_match("axb"));
        Ok(())
    }

    #[test]
    fn filters_select_experiments() -> anyhow::Result<()> {
        let files = vec![PathBuf::from("./fixtures/scalability.toml")];

        assert_eq!(load_experiments(&files, &[])?.len(), 4);

        let names = load_experiments(&files, &["*nconns128".to_string()])?
            .into_iter()
            .map(|e| e.name)
            .collect_vec();
        assert_eq!(
            names,
            vec![
                "scalability-vm-proxied.vm-proxied_nconns128",
                "scalability-bare-metal.bare-metal_nconns128"
            ]
        );
        Ok(())
    }

    #[test]
    fn the_same_suite_twice_is_rejected() {
        let file = PathBuf::from("./fixtures/scalability.toml");
        assert!(load_experiments(&[file.clone(), file], &[]).is_err());
    }

    #[tokio::test]
    async fn reset_ignores_filters() -> anyhow::Result<()> {
        use clap::Parser;
        let args = clap_args::Args::try_parse_from([
            "benchrig",
            "run",
            "./fixtures/scalability.toml",
            "-f",
            "nothing*",
            "--reset",
            "--dry-run",
        ])?;
        let clap_args::Commands::Run(mut opts) = args.command else {
            anyhow::bail!("expected the run command");
        };

        run(&opts).await?;

        opts.reset = false;
        assert!(run(&opts).await.is_err());
        Ok(())
    }

    #[test]
    fn list_shows_every_experiment() -> anyhow::Result<()> {
        let table = list(&[PathBuf::from("./fixtures/scalability.toml")], &[])?;
        assert!(table.contains("scalability-vm-proxied.vm-proxied_nconns64"));
        assert!(table.contains("bare-metal"));
        Ok(())
    }
}
