/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the experiments defined in one or more suite files
    Run(RunOptions),

    /// List the experiments a set of suite files expands to
    List {
        /// Suite files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Only list experiments whose name matches one of these globs
        #[arg(short, long)]
        filter: Vec<String>,
    },

    /// Write an example suite file
    Init {
        #[arg(short, long, default_value = "benchrig.toml")]
        path: PathBuf,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunOptions {
    /// Suite files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Only run experiments whose name matches one of these globs (`*` and `?`)
    #[arg(short, long)]
    pub filter: Vec<String>,

    /// Run experiments even if their output directory already holds files
    #[arg(long)]
    pub force: bool,

    /// Verbose mode (-v, --verbose)
    #[arg(short, long)]
    pub verbose: bool,

    /// Tear down every pane and VM of every experiment in the suites, ignoring --filter, then exit
    #[arg(long)]
    pub reset: bool,

    /// Directory experiment outputs are collected into
    #[arg(short, long, default_value = "./out")]
    pub workdir: PathBuf,

    /// Fail when a pane shows one of the suite's failure patterns
    #[arg(long)]
    pub strict: bool,

    /// Print the keystrokes instead of sending them to tmux
    #[arg(long)]
    pub dry_run: bool,

    /// tmux session to open windows in, defaults to the first attached one
    #[arg(long)]
    pub tmux_session: Option<String>,
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_several_suites_and_filters() -> anyhow::Result<()> {
        let args = Args::try_parse_from([
            "benchrig",
            "run",
            "a.toml",
            "b.toml",
            "--filter",
            "scal*",
            "-f",
            "*vm-bare*",
            "--dry-run",
        ])?;

        let Commands::Run(opts) = args.command else {
            anyhow::bail!("expected the run command");
        };
        assert_eq!(opts.files, vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")]);
        assert_eq!(opts.filter, vec!["scal*", "*vm-bare*"]);
        assert!(opts.dry_run);
        assert!(!opts.force);
        assert_eq!(opts.workdir, PathBuf::from("./out"));
        Ok(())
    }

    #[test]
    fn run_needs_a_suite() {
        assert!(Args::try_parse_from(["benchrig", "run"]).is_err());
    }
}
