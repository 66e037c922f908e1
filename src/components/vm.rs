/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::Env;
use crate::{config::roles::VmConfig, session::Session, settle::Delay};
use tracing::{info, warn};

/// A guest VM. Its pane is the VM's console once `start` returns.
pub struct Vm {
    pub config: VmConfig,
}
impl Vm {
    pub fn new(config: VmConfig) -> Self {
        Self { config }
    }

    /// Boots the VM from its manager directory and logs into the console.
    pub async fn start(&self, env: &Env) -> anyhow::Result<Session> {
        info!("Starting VM {} in {}", self.config.index, self.config.pane);
        let session = env.acquire(&self.config.pane).await?;

        env.run(
            &session,
            &format!("cd {}", self.config.manager_dir),
            Delay::Command,
        )
        .await?;
        env.run(
            &session,
            &format!(
                "sudo bash start-vm.sh {} {} {} {}",
                env.machine.role, env.machine.stack, self.config.index, self.config.mac
            ),
            Delay::VmBoot,
        )
        .await?;

        self.login(env, &session).await?;
        Ok(session)
    }

    /// The console shows the login prompt twice on boot, so the user goes in, then the
    /// password, then one more enter.
    async fn login(&self, env: &Env, session: &Session) -> anyhow::Result<()> {
        session.send_raw(&env.defaults.guest_user)?;
        env.settle.settle(session, Delay::ConsolePrompt).await;
        session.send_raw(&env.defaults.guest_password)?;
        session.enter()?;
        env.settle.settle(session, Delay::ConsoleLogin).await;
        Ok(())
    }

    pub async fn enable_huge_pages(&self, env: &Env, session: &Session) -> anyhow::Result<()> {
        env.run(
            session,
            "sudo mount -t hugetlbfs nodev /dev/hugepages",
            Delay::Command,
        )
        .await?;
        env.run(
            session,
            &format!(
                "echo {} | sudo tee /sys/devices/system/node/node*/hugepages/hugepages-2048kB/nr_hugepages",
                env.defaults.huge_pages
            ),
            Delay::HugePages,
        )
        .await
    }

    /// Puts vfio into no-IOMMU mode and registers the device ids with vfio-pci.
    pub async fn enable_noiommu(&self, env: &Env, session: &Session) -> anyhow::Result<()> {
        env.run(session, "sudo su -", Delay::Command).await?;
        env.run(
            session,
            "echo 1 > /sys/module/vfio/parameters/enable_unsafe_noiommu_mode",
            Delay::Command,
        )
        .await?;
        env.run(
            session,
            &format!(
                "echo {} > /sys/bus/pci/drivers/vfio-pci/new_id",
                env.defaults.vfio_ids
            ),
            Delay::Command,
        )
        .await?;
        env.run(session, "exit", Delay::Command).await
    }

    pub async fn init_interface(
        &self,
        env: &Env,
        session: &Session,
        ip: &str,
        interface: &str,
    ) -> anyhow::Result<()> {
        env.run(
            session,
            &format!("sudo ip addr add {}/24 dev {}", ip, interface),
            Delay::Command,
        )
        .await?;
        env.run(
            session,
            &format!("sudo ip link set {} up", interface),
            Delay::Command,
        )
        .await
    }

    /// Binds the guest interface to the fast-path driver.
    pub async fn driver_bind(
        &self,
        env: &Env,
        session: &Session,
        ip: &str,
        interface: &str,
        pci: &str,
    ) -> anyhow::Result<()> {
        env.run(
            session,
            &format!("cd {}", self.config.guest_manager_dir),
            Delay::Command,
        )
        .await?;
        env.run(
            session,
            &format!("bash dpdk-bind.sh {} {} {}", ip, interface, pci),
            Delay::DriverBind,
        )
        .await
    }

    /// Runs user supplied post-boot commands, `{vm}` replaced by the VM index.
    pub async fn run_cmds(&self, env: &Env, session: &Session, cmds: &[String]) -> anyhow::Result<()> {
        for cmd in cmds {
            let cmd = cmd.replace("{vm}", &self.config.index.to_string());
            env.run(session, &cmd, Delay::Command).await?;
        }
        Ok(())
    }

    /// Shuts the guest down, but only after checking the console is really logged into the
    /// guest. A pane that fell back to the host shell must never receive `shutdown`. Returns
    /// whether the shutdown was sent.
    pub async fn shutdown(&self, env: &Env) -> anyhow::Result<bool> {
        let Some(session) = env.sessions.attach(&self.config.pane)? else {
            return Ok(false);
        };

        session.send_raw("whoami")?;
        env.settle.settle(&session, Delay::Command).await;
        let captured = session.capture()?;

        if !is_guest_console(&captured, &env.defaults.guest_user) {
            warn!(
                "Refusing to shut down VM {}: {} does not look like the guest console",
                self.config.index,
                session.name()
            );
            return Ok(false);
        }

        session.send_raw("sudo shutdown -h now")?;
        env.settle.settle(&session, Delay::Shutdown).await;
        Ok(true)
    }
}

/// After `whoami` the second to last line holds its output; the last one is the next prompt.
pub fn is_guest_console(captured: &[String], user: &str) -> bool {
    let lines = captured
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();

    lines.len() >= 2 && lines[lines.len() - 2] == user
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn guest_console_is_recognised() {
        assert!(is_guest_console(
            &lines(&["tas@vm:~$ whoami", "tas", "tas@vm:~$", ""]),
            "tas"
        ));
    }

    #[test]
    fn host_shell_is_not_the_guest() {
        assert!(!is_guest_console(
            &lines(&["mstolet@lab04:~$ whoami", "mstolet", "mstolet@lab04:~$"]),
            "tas"
        ));
        assert!(!is_guest_console(&lines(&["tas"]), "tas"));
        assert!(!is_guest_console(&[], "tas"));
    }
}
