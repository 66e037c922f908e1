/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod commands;
pub mod plan;

use crate::{
    components::{
        benchmark::Benchmark,
        proxy::{GuestProxy, HostProxy},
        stack::StackDaemon,
        vm::Vm,
        Env, GuestAccess,
    },
    config::roles::{NodeConfig, Role, Stack, VmConfig},
    hooks::{Phase, PhaseHook},
    settle::Delay,
};
use anyhow::Context;
use colored::Colorize;
use commands::PostBoot;
use plan::Capabilities;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// One role of an experiment on one host. Which phases run is decided by the node's
/// capabilities; the phases themselves are shared by every stack variant.
pub struct Node {
    config: Arc<NodeConfig>,
    env: Env,
    hook: Arc<dyn PhaseHook>,
    plan: Vec<Phase>,
    launched: Vec<Benchmark>,
}
impl Node {
    pub fn new(config: NodeConfig, env: Env, hook: Arc<dyn PhaseHook>) -> Self {
        let plan = Capabilities::of(&config).plan();
        Self {
            config: Arc::new(config),
            env,
            hook,
            plan,
            launched: vec![],
        }
    }

    pub fn role(&self) -> Role {
        self.config.role()
    }

    pub fn stack(&self) -> Stack {
        self.config.stack()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn plan(&self) -> &[Phase] {
        &self.plan
    }

    /// Output paths of every benchmark launched so far, in VM then instance order.
    pub fn log_paths(&self) -> Vec<String> {
        self.launched.iter().map(|b| b.config.out()).collect()
    }

    pub fn pane_names(&self) -> Vec<String> {
        self.config.pane_names()
    }

    /// Walks the node's phase plan. Each phase completes, settle delays included, before the
    /// next one starts.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.launched.clear();

        for phase in self.plan.clone() {
            self.hook.before(self.role(), phase).await?;
            println!(
                "> {} {} {}",
                self.role().to_string().green(),
                self.stack(),
                phase
            );
            info!("{} {}: {}", self.role(), self.stack(), phase);

            match phase {
                Phase::SetupCmds => self.setup().await?,
                Phase::StackBringup => self.start_stack().await?,
                Phase::ProxyBringup => self.start_proxy().await?,
                Phase::VmBringup => self.start_vms().await?,
                Phase::GuestStackBringup => self.start_guest_stacks().await?,
                Phase::GuestProxyBringup => self.start_guest_proxies().await?,
                Phase::Execute => self.execute().await?,
                Phase::Cleanup => self.cleanup().await?,
            }

            self.hook
                .after(self.role(), phase, &self.env.sessions)
                .await?;
        }

        Ok(())
    }

    async fn setup(&self) -> anyhow::Result<()> {
        let session = self.env.acquire(&self.config.setup_pane()).await?;
        for step in commands::setup_steps(&self.config, &self.env.defaults) {
            self.env.run(&session, &step.cmd, step.delay).await?;
        }
        Ok(())
    }

    async fn start_stack(&self) -> anyhow::Result<()> {
        if let Some(config) = &self.config.host_stack {
            StackDaemon::host(config.clone()).start(&self.env).await?;
        }
        Ok(())
    }

    async fn start_proxy(&self) -> anyhow::Result<()> {
        if let Some(config) = &self.config.host_proxy {
            HostProxy {
                config: config.clone(),
            }
            .start(&self.env)
            .await?;
        }
        Ok(())
    }

    /// Boots every VM on its own pane concurrently and returns once all of them are up.
    async fn start_vms(&self) -> anyhow::Result<()> {
        let mut workers = JoinSet::new();
        for vm in self.config.vms.iter() {
            let env = self.env.clone();
            let config = self.config.clone();
            let hook = self.hook.clone();
            let vm = vm.clone();
            workers.spawn(async move { bring_up_vm(env, config, hook, vm).await });
        }

        while let Some(res) = workers.join_next().await {
            res.context("VM worker panicked")??;
        }
        Ok(())
    }

    fn guest_access(&self, vm: usize) -> anyhow::Result<GuestAccess> {
        let vm = self
            .config
            .vms
            .iter()
            .find(|config| config.index == vm)
            .context(format!("{} has no VM {}", self.role(), vm))?;
        GuestAccess::new(&self.env.machine, &self.env.defaults, vm)
    }

    async fn start_guest_stacks(&self) -> anyhow::Result<()> {
        for config in self.config.guest_stacks.iter() {
            let vm = config
                .vm
                .context("Guest stack configured without a VM")?;
            StackDaemon::guest(config.clone(), self.guest_access(vm)?)
                .start(&self.env)
                .await?;
        }
        Ok(())
    }

    async fn start_guest_proxies(&self) -> anyhow::Result<()> {
        for (config, vm) in self.config.guest_proxies.iter().zip(self.config.vms.iter()) {
            GuestProxy {
                config: config.clone(),
                access: self.guest_access(vm.index)?,
            }
            .start(&self.env)
            .await?;
        }
        Ok(())
    }

    async fn execute(&mut self) -> anyhow::Result<()> {
        for config in self.config.benchmarks.iter() {
            let guest = match config.vm {
                Some(vm) => Some(self.guest_access(vm)?),
                None => None,
            };
            let benchmark = Benchmark {
                config: config.clone(),
                guest,
            };

            benchmark.start(&self.env).await?;
            self.launched.push(benchmark);
            self.env.settle.wait(Delay::InstanceGap).await;
        }
        Ok(())
    }

    /// Tears down what setup created and shuts down every VM whose console is still logged
    /// in. Safe to call any number of times, including before `run`. A failed step does not
    /// stop the ones after it; the first failure is returned.
    pub async fn cleanup(&self) -> anyhow::Result<()> {
        let mut results = vec![self.hook.before(self.role(), Phase::Cleanup).await];
        info!("{} {}: cleanup", self.role(), self.stack());

        results.push(
            self.cleanup_host()
                .await
                .context(format!("{} host cleanup failed", self.role())),
        );
        for vm in self.config.vms.iter() {
            results.push(
                Vm::new(vm.clone())
                    .shutdown(&self.env)
                    .await
                    .map(|_| ())
                    .context(format!("Shutting down {} VM {} failed", self.role(), vm.index)),
            );
        }

        results.push(
            self.hook
                .after(self.role(), Phase::Cleanup, &self.env.sessions)
                .await,
        );
        first_error(results)
    }

    async fn cleanup_host(&self) -> anyhow::Result<()> {
        let session = self.env.acquire(&self.config.cleanup_pane()).await?;
        for step in commands::cleanup_steps(&self.config, &self.env.defaults) {
            self.env.run(&session, &step.cmd, step.delay).await?;
        }
        Ok(())
    }

    /// Collects every launched benchmark's log into `dir`. Guest logs are copied back over
    /// scp from the node's save-logs pane; host logs are moved. vm-bare nodes also hand over
    /// the stack daemon's log.
    pub async fn save_logs(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut saved = vec![];

        let remote = self.launched.iter().any(|b| b.guest.is_some());
        let session = if remote {
            Some(self.env.acquire(&self.config.savelogs_pane()).await?)
        } else {
            None
        };

        for benchmark in self.launched.iter() {
            let path = match &session {
                Some(session) if benchmark.guest.is_some() => {
                    benchmark.save_log(&self.env, session, dir).await?
                }
                _ => crate::log_collection::relocate(Path::new(&benchmark.config.out()), dir)?,
            };
            saved.push(path);
        }

        if self.stack() == Stack::VmBare {
            if let Some(config) = &self.config.host_stack {
                saved.push(StackDaemon::host(config.clone()).save_log(dir)?);
            }
        }

        Ok(saved)
    }
}

/// Logs every failed teardown step and returns the first failure.
pub(crate) fn first_error(
    results: impl IntoIterator<Item = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    let mut first = None;
    for err in results.into_iter().filter_map(Result::err) {
        warn!("{:#}", err);
        first.get_or_insert(err);
    }
    first.map_or(Ok(()), Err)
}

async fn bring_up_vm(
    env: Env,
    config: Arc<NodeConfig>,
    hook: Arc<dyn PhaseHook>,
    vm_config: VmConfig,
) -> anyhow::Result<()> {
    let index = vm_config.index;
    let steps = commands::post_boot(&config, &env.defaults, &vm_config);
    let vm = Vm::new(vm_config);
    let session = vm.start(&env).await?;

    for step in steps {
        match step {
            PostBoot::HugePages => vm.enable_huge_pages(&env, &session).await?,
            PostBoot::NoIommu => vm.enable_noiommu(&env, &session).await?,
            PostBoot::Interface { ip, interface } => {
                vm.init_interface(&env, &session, &ip, &interface).await?
            }
            PostBoot::DriverBind { ip, interface, pci } => {
                vm.driver_bind(&env, &session, &ip, &interface, &pci).await?
            }
            PostBoot::UserCmds => vm.run_cmds(&env, &session, &config.post_boot_cmds).await?,
        }
    }

    info!("{} VM {} is up", config.role(), index);
    hook.vm_ready(config.role(), index).await
}
