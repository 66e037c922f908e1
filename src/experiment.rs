/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{
    components::Env,
    config::{roles::NodeConfig, ExperimentConfig},
    hooks::PhaseHook,
    log_collection,
    node::{first_error, Node},
    session::SessionManager,
    settle::Settle,
};
use itertools::Itertools;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;

/// A server node and a client node driven as one unit of repeatable work.
pub struct Experiment {
    config: ExperimentConfig,
    sessions: Arc<SessionManager>,
    server: Node,
    client: Node,
}
impl Experiment {
    pub fn new(
        config: ExperimentConfig,
        sessions: Arc<SessionManager>,
        settle: Arc<dyn Settle>,
        hook: Arc<dyn PhaseHook>,
    ) -> Self {
        let node = |node: &NodeConfig| {
            let env = Env {
                machine: node.machine.clone(),
                defaults: config.defaults.clone(),
                sessions: sessions.clone(),
                settle: settle.clone(),
            };
            Node::new(node.clone(), env, hook.clone())
        };
        let server = node(&config.server);
        let client = node(&config.client);

        Self {
            config,
            sessions,
            server,
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn server(&self) -> &Node {
        &self.server
    }

    pub fn client(&self) -> &Node {
        &self.client
    }

    /// Brings up the server node completely, then the client node.
    ///
    /// The client's benchmarks connect as soon as they start, so the server side must already
    /// be listening. Nothing observes that; it holds because the server node's phases,
    /// settle delays included, finish before the client node begins.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        info!("Running experiment {}", self.name());
        self.server.run().await?;
        self.client.run().await
    }

    /// Cleans up both nodes and closes every pane this experiment can own. Every step runs
    /// even when an earlier one fails; the first failure is returned.
    pub async fn reset(&self) -> anyhow::Result<()> {
        info!("Resetting experiment {}", self.name());
        let server = self.server.cleanup().await;
        let client = self.client.cleanup().await;

        let names = self
            .config
            .pane_names()
            .into_iter()
            .chain(self.sessions.known_names())
            .unique()
            .collect_vec();
        let panes = self.sessions.release_all(&names);

        first_error([server, client, panes])
    }

    /// Collects the client's logs into `dir`, creating it if needed.
    pub async fn save_logs(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        log_collection::ensure_dir(dir)?;
        self.client.save_logs(dir).await
    }
}
