/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod memory;
pub mod tmux;

use crate::settle::{Delay, Settle};
use anyhow::Context;
use std::{
    collections::BTreeSet,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, info};

/// A single terminal pane. Keystrokes go in, the visible text comes out; nothing else about the
/// program running inside is observable.
pub trait Pane: Send + Sync {
    fn send_keys(&self, keys: &str, enter: bool) -> anyhow::Result<()>;

    /// Visible lines of the pane, trailing blank lines removed.
    fn capture(&self) -> anyhow::Result<Vec<String>>;
}

#[derive(Clone)]
pub struct Window {
    pub id: String,
    pub name: String,
    pub pane: Arc<dyn Pane>,
}
impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// The narrow slice of a terminal multiplexer the harness needs.
pub trait Multiplexer: Send + Sync {
    fn new_window(&self, name: &str) -> anyhow::Result<Window>;

    /// Every window of the target session, duplicates included.
    fn windows(&self) -> anyhow::Result<Vec<Window>>;

    fn kill_window(&self, window: &Window) -> anyhow::Result<()>;
}

/// A named pane handed out by the `SessionManager`.
#[derive(Clone)]
pub struct Session {
    name: String,
    pane: Arc<dyn Pane>,
}
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("name", &self.name).finish()
    }
}
impl Session {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Types a command and presses enter. The leading space keeps the command out of the shell
    /// history.
    pub fn send(&self, cmd: &str) -> anyhow::Result<()> {
        debug!("[{}] {}", self.name, cmd);
        self.pane
            .send_keys(&format!(" {}", cmd), true)
            .context(format!("Failed to send keys to {}", self.name))
    }

    /// Types text verbatim and presses enter. Used for logins and passwords, where a leading
    /// space would be part of the input.
    pub fn send_raw(&self, keys: &str) -> anyhow::Result<()> {
        debug!("[{}] <raw input>", self.name);
        self.pane
            .send_keys(keys, true)
            .context(format!("Failed to send keys to {}", self.name))
    }

    pub fn enter(&self) -> anyhow::Result<()> {
        self.pane
            .send_keys("", true)
            .context(format!("Failed to send enter to {}", self.name))
    }

    pub fn capture(&self) -> anyhow::Result<Vec<String>> {
        self.pane
            .capture()
            .context(format!("Failed to capture {}", self.name))
    }
}

/// Owns the pool of panes belonging to one experiment instance. Every pane name is the
/// manager's prefix followed by a purpose suffix, which lets cleanup target one instance
/// without touching anything else running in the same multiplexer.
pub struct SessionManager {
    mux: Arc<dyn Multiplexer>,
    prefix: String,
    remote_connect_cmd: String,
    settle: Arc<dyn Settle>,
    known: Mutex<BTreeSet<String>>,
}
impl SessionManager {
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        prefix: &str,
        remote_connect_cmd: &str,
        settle: Arc<dyn Settle>,
    ) -> Self {
        Self {
            mux,
            prefix: prefix.to_string(),
            remote_connect_cmd: remote_connect_cmd.to_string(),
            settle,
            known: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn full_name(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// Returns the pane called `prefix + suffix`, creating it if needed. A freshly created
    /// remote pane is logged into the remote host first. An existing pane is reused as is and
    /// is never logged in a second time.
    pub async fn acquire(&self, suffix: &str, remote: bool) -> anyhow::Result<Session> {
        self.remember(suffix);

        if let Some(session) = self.attach(suffix)? {
            debug!("Attached to existing pane {}", session.name);
            return Ok(session);
        }

        let name = self.full_name(suffix);
        let window = self
            .mux
            .new_window(&name)
            .context(format!("Failed to create pane {}", name))?;
        let session = Session {
            name,
            pane: window.pane,
        };

        if remote {
            session.send(&self.remote_connect_cmd)?;
            self.settle.settle(&session, Delay::RemoteLogin).await;
        }

        Ok(session)
    }

    /// Looks a pane up without creating it.
    pub fn attach(&self, suffix: &str) -> anyhow::Result<Option<Session>> {
        let name = self.full_name(suffix);
        let session = self
            .mux
            .windows()?
            .into_iter()
            .find(|window| window.name == name)
            .map(|window| Session {
                name: window.name,
                pane: window.pane,
            });

        Ok(session)
    }

    /// Destroys every pane named `prefix + suffix` for each suffix. Earlier runs may have left
    /// several panes with the same name, so this keeps going until none is left.
    pub fn release_all(&self, suffixes: &[String]) -> anyhow::Result<()> {
        let names = suffixes
            .iter()
            .map(|suffix| self.full_name(suffix))
            .collect::<BTreeSet<_>>();

        self.release_matching(|name| names.contains(name))
    }

    /// Destroys every pane whose name starts with the prefix.
    pub fn release_by_prefix(&self) -> anyhow::Result<()> {
        let prefix = self.prefix.clone();
        self.release_matching(|name| name.starts_with(&prefix))
    }

    /// Suffixes of every pane acquired through this manager.
    pub fn known_names(&self) -> Vec<String> {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn remember(&self, suffix: &str) {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(suffix.to_string());
    }

    fn release_matching(&self, matches: impl Fn(&str) -> bool) -> anyhow::Result<()> {
        const MAX_PASSES: usize = 16;

        for _ in 0..MAX_PASSES {
            let doomed = self
                .mux
                .windows()?
                .into_iter()
                .filter(|window| matches(&window.name))
                .collect::<Vec<_>>();

            if doomed.is_empty() {
                return Ok(());
            }

            for window in doomed.iter() {
                info!("Closing pane {}", window.name);
                self.mux
                    .kill_window(window)
                    .context(format!("Failed to close pane {}", window.name))?;
            }
        }

        anyhow::bail!("Panes kept reappearing after {} attempts to close them", MAX_PASSES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settle::{FixedDelay, Timing};
    use memory::MemoryMultiplexer;

    fn manager(mux: Arc<MemoryMultiplexer>, prefix: &str) -> SessionManager {
        SessionManager::new(
            mux,
            prefix,
            "ssh lab04",
            Arc::new(FixedDelay::new(Timing::instant())),
        )
    }

    #[tokio::test]
    async fn remote_panes_log_in_once() -> anyhow::Result<()> {
        let mux = Arc::new(MemoryMultiplexer::new());
        let sessions = manager(mux.clone(), "e_");

        sessions.acquire("server_setup", true).await?;
        sessions.acquire("server_setup", true).await?;

        assert_eq!(mux.window_names(), vec!["e_server_setup"]);
        assert_eq!(mux.sent_to("e_server_setup"), vec!["ssh lab04"]);
        Ok(())
    }

    #[tokio::test]
    async fn local_panes_are_not_logged_in() -> anyhow::Result<()> {
        let mux = Arc::new(MemoryMultiplexer::new());
        let sessions = manager(mux.clone(), "e_");

        let session = sessions.acquire("client_setup", false).await?;
        session.send("ls")?;

        assert_eq!(mux.sent_to("e_client_setup"), vec!["ls"]);
        Ok(())
    }

    #[tokio::test]
    async fn attach_never_creates() -> anyhow::Result<()> {
        let mux = Arc::new(MemoryMultiplexer::new());
        let sessions = manager(mux.clone(), "e_");

        assert!(sessions.attach("server_vm0")?.is_none());
        assert!(mux.window_names().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn release_all_removes_duplicates() -> anyhow::Result<()> {
        let mux = Arc::new(MemoryMultiplexer::new());
        mux.new_window("e_server_setup")?;
        mux.new_window("e_server_setup")?;
        mux.new_window("e_server_setup")?;
        mux.new_window("e_server_cleanup")?;
        let sessions = manager(mux.clone(), "e_");

        sessions.release_all(&["server_setup".to_string(), "missing".to_string()])?;

        assert_eq!(mux.window_names(), vec!["e_server_cleanup"]);
        assert_eq!(mux.killed().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn release_by_prefix_leaves_other_instances_alone() -> anyhow::Result<()> {
        for duplicates in [0, 1, 3] {
            let mux = Arc::new(MemoryMultiplexer::new());
            for _ in 0..duplicates {
                mux.new_window("a_server_vm0")?;
            }
            mux.new_window("a_client_setup")?;
            mux.new_window("b_server_vm0")?;
            mux.new_window("scratch")?;
            let sessions = manager(mux.clone(), "a_");

            sessions.release_by_prefix()?;

            assert_eq!(mux.window_names(), vec!["b_server_vm0", "scratch"]);
            assert_eq!(mux.killed().len(), duplicates + 1);
        }
        Ok(())
    }

    #[tokio::test]
    async fn known_names_tracks_acquired_suffixes() -> anyhow::Result<()> {
        let mux = Arc::new(MemoryMultiplexer::new());
        let sessions = manager(mux.clone(), "e_");

        sessions.acquire("server_stack", false).await?;
        sessions.acquire("client_bench0_0", false).await?;
        sessions.acquire("server_stack", false).await?;

        assert_eq!(
            sessions.known_names(),
            vec!["client_bench0_0", "server_stack"]
        );
        Ok(())
    }
}
