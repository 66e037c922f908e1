/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Process components. Each one drives a single process role through compile and launch by
//! typing into its own pane, and later retrieves the process's output.

pub mod benchmark;
pub mod proxy;
pub mod stack;
pub mod vm;

use crate::{
    config::{
        defaults::Defaults,
        roles::{BuildSpec, MachineConfig, VmConfig},
    },
    session::{Session, SessionManager},
    settle::{Delay, Settle},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a component needs to act on its host: the machine, the lab defaults, the pane pool and
/// the waiter.
#[derive(Clone)]
pub struct Env {
    pub machine: Arc<MachineConfig>,
    pub defaults: Arc<Defaults>,
    pub sessions: Arc<SessionManager>,
    pub settle: Arc<dyn Settle>,
}
impl Env {
    pub async fn acquire(&self, suffix: &str) -> anyhow::Result<Session> {
        self.sessions.acquire(suffix, self.machine.remote).await
    }

    /// Sends a command and waits for it to settle.
    pub async fn run(&self, session: &Session, cmd: &str, delay: Delay) -> anyhow::Result<()> {
        session.send(cmd)?;
        self.settle.settle(session, delay).await;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Privilege {
    #[default]
    None,
    Sudo,
    /// `sudo -E`, for launches that depend on exported variables.
    SudoPreserveEnv,
}

/// How a process is launched. Rendered as
/// `[taskset -c <cores>] [sudo -E|sudo] [LD_PRELOAD=<path>] <exec> <args> [| tee <out>] [&]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub affinity: Option<String>,
    pub privilege: Privilege,
    pub preload: Option<String>,
    pub tee: Option<String>,
    pub background: bool,
}
impl LaunchOptions {
    pub fn command(&self, exec: &str, args: &str) -> String {
        let mut words = vec![];

        if let Some(cores) = &self.affinity {
            words.push(format!("taskset -c {}", cores));
        }
        match self.privilege {
            Privilege::None => {}
            Privilege::Sudo => words.push("sudo".to_string()),
            Privilege::SudoPreserveEnv => words.push("sudo -E".to_string()),
        }
        if let Some(lib) = &self.preload {
            words.push(format!("LD_PRELOAD={}", lib));
        }

        words.push(exec.to_string());
        if !args.trim().is_empty() {
            words.push(args.trim().to_string());
        }

        if let Some(out) = &self.tee {
            words.push(format!("| tee {}", out));
        }
        if self.background {
            words.push("&".to_string());
        }

        words.join(" ")
    }
}

/// Builds a project in `build.comp_dir` and launches `exec` from `exec_dir`.
pub async fn compile_and_run(
    env: &Env,
    session: &Session,
    build: &BuildSpec,
    exec_dir: Option<&str>,
    exec: &str,
    args: &str,
    options: &LaunchOptions,
) -> anyhow::Result<()> {
    env.run(session, &format!("cd {}", build.comp_dir), Delay::Command)
        .await?;
    if let Some(clean) = &build.clean_cmd {
        env.run(session, clean, Delay::Command).await?;
    }
    env.run(session, &build.comp_cmd, Delay::Compile).await?;

    if let Some(dir) = exec_dir.filter(|dir| *dir != build.comp_dir) {
        env.run(session, &format!("cd {}", dir), Delay::Command)
            .await?;
    }

    session.send(&options.command(exec, args))
}

/// How to reach a guest over ssh: through a forwarded port on the host for vm-proxied nodes,
/// directly by address otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestAccess {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: Option<u16>,
}
impl GuestAccess {
    pub fn new(machine: &MachineConfig, defaults: &Defaults, vm: &VmConfig) -> anyhow::Result<Self> {
        let (host, port) = if machine.stack.port_forwarded() {
            let port = format!("222{}", vm.index).parse::<u16>()?;
            ("localhost".to_string(), Some(port))
        } else {
            (vm.vm_ip.clone(), None)
        };

        Ok(Self {
            user: defaults.guest_user.clone(),
            password: defaults.guest_password.clone(),
            host,
            port,
        })
    }

    pub fn ssh_command(&self) -> String {
        match self.port {
            Some(port) => format!("ssh -p {} {}@{}", port, self.user, self.host),
            None => format!("ssh {}@{}", self.user, self.host),
        }
    }

    pub fn scp_command(&self, src: &str, dst: &str) -> String {
        match self.port {
            Some(port) => format!("scp -P {} {}@{}:{} {}", port, self.user, self.host, src, dst),
            None => format!("scp {}@{}:{} {}", self.user, self.host, src, dst),
        }
    }

    pub fn remove_command(&self, path: &str) -> String {
        format!("{} rm -f {}", self.ssh_command(), path)
    }

    /// Opens an ssh session into the guest inside `session`.
    pub async fn login(&self, env: &Env, session: &Session) -> anyhow::Result<()> {
        env.run(session, &self.ssh_command(), Delay::GuestSsh).await?;
        self.type_password(env, session).await
    }

    pub async fn type_password(&self, env: &Env, session: &Session) -> anyhow::Result<()> {
        session.send_raw(&self.password)?;
        env.settle.settle(session, Delay::Password).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::roles::{Role, Stack},
        session::memory::MemoryMultiplexer,
        settle::{FixedDelay, Timing},
    };

    fn machine(stack: Stack) -> MachineConfig {
        MachineConfig {
            role: Role::Client,
            stack,
            ip: "192.168.10.13".to_string(),
            interface: "ens1f0np0".to_string(),
            remote: false,
        }
    }

    #[test]
    fn launch_grammar_orders_prefixes() {
        let options = LaunchOptions {
            affinity: Some("0,2,4".to_string()),
            privilege: Privilege::SudoPreserveEnv,
            preload: Some("/tas/lib/libtas_interpose.so".to_string()),
            tee: Some("/tas/out/c0".to_string()),
            background: true,
        };

        assert_eq!(
            options.command("/bench/testclient_linux", "10.0.0.1 1234"),
            "taskset -c 0,2,4 sudo -E LD_PRELOAD=/tas/lib/libtas_interpose.so \
             /bench/testclient_linux 10.0.0.1 1234 | tee /tas/out/c0 &"
        );
    }

    #[test]
    fn launch_grammar_without_options() {
        let options = LaunchOptions::default();
        assert_eq!(options.command("/proxy/host/host", ""), "/proxy/host/host");

        let options = LaunchOptions {
            privilege: Privilege::Sudo,
            tee: Some("out".to_string()),
            ..Default::default()
        };
        assert_eq!(options.command("tas", "--fp-cores-max=2"), "sudo tas --fp-cores-max=2 | tee out");
    }

    #[test]
    fn guest_access_by_variant() -> anyhow::Result<()> {
        let defaults = Defaults::default();
        let vm = VmConfig::new(&defaults, Role::Client, 3)?;

        let forwarded = GuestAccess::new(&machine(Stack::VmProxied), &defaults, &vm)?;
        assert_eq!(forwarded.ssh_command(), "ssh -p 2223 tas@localhost");
        assert_eq!(
            forwarded.scp_command("/o/c", "/w/c"),
            "scp -P 2223 tas@localhost:/o/c /w/c"
        );

        let direct = GuestAccess::new(&machine(Stack::TapBridged), &defaults, &vm)?;
        assert_eq!(direct.ssh_command(), "ssh tas@10.0.0.23");
        assert_eq!(direct.remove_command("/o/c"), "ssh tas@10.0.0.23 rm -f /o/c");
        Ok(())
    }

    #[tokio::test]
    async fn compile_and_run_sequence() -> anyhow::Result<()> {
        let mux = Arc::new(MemoryMultiplexer::new());
        let settle: Arc<dyn Settle> = Arc::new(FixedDelay::new(Timing::instant()));
        let env = Env {
            machine: Arc::new(machine(Stack::BareMetal)),
            defaults: Arc::new(Defaults::default()),
            sessions: Arc::new(SessionManager::new(mux.clone(), "e_", "ssh lab", settle.clone())),
            settle,
        };
        let session = env.acquire("client_stack").await?;
        let build = BuildSpec {
            comp_dir: "/bench/micro_rpc".to_string(),
            comp_cmd: "make -j6".to_string(),
            clean_cmd: Some("make clean".to_string()),
        };

        compile_and_run(
            &env,
            &session,
            &build,
            Some("/tas"),
            "/bench/micro_rpc/echoserver_linux",
            "1234 1 foo 4096 1024",
            &LaunchOptions::default(),
        )
        .await?;

        assert_eq!(
            mux.sent_to("e_client_stack"),
            vec![
                "cd /bench/micro_rpc",
                "make clean",
                "make -j6",
                "cd /tas",
                "/bench/micro_rpc/echoserver_linux 1234 1 foo 4096 1024",
            ]
        );
        Ok(())
    }
}
