/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::{Multiplexer, Pane, Window};
use anyhow::Context;
use std::sync::Arc;
use subprocess::{Exec, Redirection};
use tracing::{info, trace};

/// Runs `tmux` with the given arguments and returns its stdout.
fn tmux(args: &[&str]) -> anyhow::Result<String> {
    trace!("tmux {}", args.join(" "));

    let capture = Exec::cmd("tmux")
        .args(args)
        .stdout(Redirection::Pipe)
        .stderr(Redirection::Pipe)
        .capture()
        .context("Failed to run tmux. Is it installed?")?;

    if !capture.exit_status.success() {
        anyhow::bail!(
            "tmux {} failed: {}",
            args.first().unwrap_or(&""),
            capture.stderr_str().trim()
        );
    }

    Ok(capture.stdout_str())
}

/// Drives windows of one session of a running tmux server.
pub struct TmuxMultiplexer {
    session: String,
}
impl TmuxMultiplexer {
    /// Targets the named session, or the first attached session when no name is given.
    pub fn connect(session: Option<&str>) -> anyhow::Result<Self> {
        let session = match session {
            Some(name) => {
                tmux(&["has-session", "-t", name])
                    .context(format!("tmux session {} does not exist", name))?;
                name.to_string()
            }

            None => {
                let out = tmux(&[
                    "list-sessions",
                    "-F",
                    "#{session_attached}\t#{session_name}",
                ])?;
                out.lines()
                    .filter_map(|line| line.split_once('\t'))
                    .find(|(attached, _)| *attached != "0")
                    .map(|(_, name)| name.to_string())
                    .context("No attached tmux session found, start tmux or pass --tmux-session")?
            }
        };

        info!("Driving tmux session {}", session);
        Ok(Self { session })
    }

    fn window(&self, id: &str, name: &str) -> Window {
        Window {
            id: id.to_string(),
            name: name.to_string(),
            pane: Arc::new(TmuxPane {
                target: id.to_string(),
            }),
        }
    }
}
impl Multiplexer for TmuxMultiplexer {
    fn new_window(&self, name: &str) -> anyhow::Result<Window> {
        let target = format!("{}:", self.session);
        let out = tmux(&[
            "new-window",
            "-d",
            "-t",
            &target,
            "-n",
            name,
            "-P",
            "-F",
            "#{window_id}",
        ])?;

        Ok(self.window(out.trim(), name))
    }

    fn windows(&self) -> anyhow::Result<Vec<Window>> {
        let out = tmux(&[
            "list-windows",
            "-t",
            &self.session,
            "-F",
            "#{window_id}\t#{window_name}",
        ])?;

        Ok(out
            .lines()
            .filter_map(|line| line.split_once('\t'))
            .map(|(id, name)| self.window(id, name))
            .collect())
    }

    fn kill_window(&self, window: &Window) -> anyhow::Result<()> {
        tmux(&["kill-window", "-t", &window.id]).map(|_| ())
    }
}

struct TmuxPane {
    target: String,
}
impl Pane for TmuxPane {
    fn send_keys(&self, keys: &str, enter: bool) -> anyhow::Result<()> {
        if !keys.is_empty() {
            tmux(&["send-keys", "-t", &self.target, "-l", "--", keys])?;
        }
        if enter {
            tmux(&["send-keys", "-t", &self.target, "Enter"])?;
        }
        Ok(())
    }

    fn capture(&self) -> anyhow::Result<Vec<String>> {
        let out = tmux(&["capture-pane", "-p", "-t", &self.target])?;
        Ok(trim_trailing_blank(out.lines().map(str::to_string).collect()))
    }
}

fn trim_trailing_blank(mut lines: Vec<String>) -> Vec<String> {
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_blank_lines_are_dropped() {
        let lines = vec!["$ whoami", "tas", "$ ", "", "   "]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(trim_trailing_blank(lines), vec!["$ whoami", "tas", "$ "]);
        assert!(trim_trailing_blank(vec![]).is_empty());
    }
}
