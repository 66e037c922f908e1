/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::{compile_and_run, Env, GuestAccess, LaunchOptions, Privilege};
use crate::{config::roles::StackProcessConfig, log_collection, settle::Delay};
use std::path::{Path, PathBuf};
use tracing::info;

/// The fast-path stack daemon. Always runs elevated and tees its output so the log can be
/// collected afterwards.
pub struct StackDaemon {
    pub config: StackProcessConfig,
    /// Set when the daemon runs inside a guest.
    pub guest: Option<GuestAccess>,
}
impl StackDaemon {
    pub fn host(config: StackProcessConfig) -> Self {
        Self {
            config,
            guest: None,
        }
    }

    pub fn guest(config: StackProcessConfig, access: GuestAccess) -> Self {
        Self {
            config,
            guest: Some(access),
        }
    }

    pub fn options(&self) -> LaunchOptions {
        LaunchOptions {
            affinity: self.config.affinity.clone(),
            privilege: Privilege::Sudo,
            preload: None,
            tee: Some(self.config.out()),
            background: false,
        }
    }

    pub async fn start(&self, env: &Env) -> anyhow::Result<()> {
        info!("Starting stack daemon in {}", self.config.pane);
        let session = env.acquire(&self.config.pane).await?;
        if let Some(access) = &self.guest {
            access.login(env, &session).await?;
        }

        compile_and_run(
            env,
            &session,
            &self.config.build,
            None,
            &self.config.exec,
            &self.config.args,
            &self.options(),
        )
        .await?;
        env.settle.settle(&session, Delay::StackUp).await;
        Ok(())
    }

    /// Moves the daemon's log into `dir`.
    pub fn save_log(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        log_collection::relocate(Path::new(&self.config.out()), dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{defaults::Defaults, roles::Role};

    #[test]
    fn daemon_runs_elevated_and_pinned() {
        let defaults = Defaults::default();
        let config = StackProcessConfig::new(
            &defaults,
            Role::Server,
            None,
            "192.168.10.14",
            4,
            "3b:00.0",
            Some("0-3".to_string()),
        );
        let daemon = StackDaemon::host(config);

        let cmd = daemon.options().command(&daemon.config.exec, "--fp-cores-max=4");
        assert_eq!(
            cmd,
            "taskset -c 0-3 sudo /local/mstolet/projects/tas/tas/tas --fp-cores-max=4 \
             | tee /local/mstolet/projects/tas/out/tas_s"
        );
    }
}
