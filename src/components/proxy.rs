/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::{compile_and_run, Env, GuestAccess, LaunchOptions, Privilege};
use crate::{config::roles::ProxyConfig, settle::Delay};
use tracing::info;

fn options(config: &ProxyConfig) -> LaunchOptions {
    LaunchOptions {
        privilege: Privilege::Sudo,
        tee: Some(config.out()),
        ..Default::default()
    }
}

/// Host half of the shared-memory proxy.
pub struct HostProxy {
    pub config: ProxyConfig,
}
impl HostProxy {
    pub async fn start(&self, env: &Env) -> anyhow::Result<()> {
        info!("Starting host proxy in {}", self.config.pane);
        let session = env.acquire(&self.config.pane).await?;

        // a socket left behind by a crashed run stops the proxy from binding
        if let Some(socket) = &self.config.socket_path {
            env.run(&session, &format!("sudo rm -f {}", socket), Delay::Command)
                .await?;
        }

        compile_and_run(
            env,
            &session,
            &self.config.build,
            None,
            &self.config.exec,
            "",
            &options(&self.config),
        )
        .await?;
        env.settle.settle(&session, Delay::ProxyUp).await;
        Ok(())
    }
}

/// Guest half of the shared-memory proxy, one per VM.
pub struct GuestProxy {
    pub config: ProxyConfig,
    pub access: GuestAccess,
}
impl GuestProxy {
    pub async fn start(&self, env: &Env) -> anyhow::Result<()> {
        info!("Starting guest proxy in {}", self.config.pane);
        let session = env.acquire(&self.config.pane).await?;
        self.access.login(env, &session).await?;

        compile_and_run(
            env,
            &session,
            &self.config.build,
            None,
            &self.config.exec,
            "",
            &options(&self.config),
        )
        .await?;
        env.settle.settle(&session, Delay::ProxyUp).await;
        Ok(())
    }
}
