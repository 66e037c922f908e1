/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::{compile_and_run, Env, GuestAccess, LaunchOptions, Privilege};
use crate::{
    config::roles::BenchmarkConfig,
    log_collection,
    session::Session,
    settle::Delay,
};
use std::path::{Path, PathBuf};
use tracing::info;

/// A benchmark client or server instance, on the host or inside a guest.
pub struct Benchmark {
    pub config: BenchmarkConfig,
    pub guest: Option<GuestAccess>,
}
impl Benchmark {
    pub fn options(&self) -> LaunchOptions {
        // plain sudo would drop the exported tenant group
        let privilege = match (self.config.privilege, self.config.group) {
            (Privilege::Sudo, Some(_)) => Privilege::SudoPreserveEnv,
            (privilege, _) => privilege,
        };

        LaunchOptions {
            affinity: self.config.affinity.clone(),
            privilege,
            preload: self.config.interpose.then(|| self.config.lib_so.clone()),
            tee: Some(self.config.out()),
            background: false,
        }
    }

    pub async fn start(&self, env: &Env) -> anyhow::Result<()> {
        info!(
            "Starting {} benchmark {} in {}",
            self.config.role, self.config.index, self.config.pane
        );
        let session = env.acquire(&self.config.pane).await?;
        if let Some(access) = &self.guest {
            access.login(env, &session).await?;
        }
        if let Some(group) = self.config.group {
            env.run(&session, &format!("export TAS_GROUP={}", group), Delay::Command)
                .await?;
        }

        compile_and_run(
            env,
            &session,
            &self.config.build,
            Some(&self.config.exec_dir),
            &self.config.exec,
            &self.config.args,
            &self.options(),
        )
        .await
    }

    /// Brings the benchmark's log into `dir`: a local rename for host instances, a copy
    /// typed into `session` for guest instances, optionally followed by deleting the guest's
    /// copy.
    pub async fn save_log(
        &self,
        env: &Env,
        session: &Session,
        dir: &Path,
    ) -> anyhow::Result<PathBuf> {
        let out = self.config.out();
        let Some(access) = &self.guest else {
            return log_collection::relocate(Path::new(&out), dir);
        };

        let dest = dir.join(&self.config.out_file);
        env.run(
            session,
            &access.scp_command(&out, &dest.to_string_lossy()),
            Delay::LogCopy,
        )
        .await?;
        access.type_password(env, session).await?;

        if env.defaults.remote_log_delete {
            env.run(session, &access.remove_command(&out), Delay::GuestSsh)
                .await?;
            access.type_password(env, session).await?;
        }

        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        defaults::Defaults,
        roles::{Placement, ServerParams},
    };

    fn server(group: Option<u32>, interpose: bool) -> Benchmark {
        let placement = Placement {
            experiment: "e".to_string(),
            index: 0,
            vm: None,
            instance: 0,
            interpose,
            group,
            affinity: None,
            privilege: None,
        };
        let params = ServerParams {
            port: 1234,
            cores: 1,
            max_flows: 4096,
            max_bytes: 1024,
        };
        Benchmark {
            config: BenchmarkConfig::server(&Defaults::default(), &placement, &params),
            guest: None,
        }
    }

    #[test]
    fn exported_group_keeps_environment() {
        assert_eq!(server(None, false).options().privilege, Privilege::Sudo);
        assert_eq!(server(Some(2), false).options().privilege, Privilege::SudoPreserveEnv);
    }

    #[test]
    fn interposition_follows_config() {
        assert_eq!(server(None, false).options().preload, None);
        assert_eq!(
            server(None, true).options().preload.as_deref(),
            Some("/local/mstolet/projects/tas/lib/libtas_interpose.so")
        );
    }
}
