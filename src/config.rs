/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod defaults;
pub mod roles;

use crate::{
    components::Privilege,
    settle::{Delay, Timing},
};
use anyhow::Context;
use defaults::Defaults;
use itertools::Itertools;
use regex::Regex;
use roles::{
    BenchmarkConfig, ClientParams, MachineConfig, NodeConfig, Placement, ProxyConfig, Role,
    ServerParams, Stack, StackProcessConfig, VmConfig, MAX_VMS,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs::{self, File},
    io::{Read, Write},
    path::Path,
    sync::Arc,
};

static EXAMPLE_SUITE: &str = include_str!("templates/suite.example.toml");

// ******** ******** ********
// **    SUITE FILES       **
// ******** ******** ********
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Suite {
    /// Seed every experiment name in the suite starts with.
    pub name: String,
    /// Seconds the benchmarks run before their logs are collected.
    pub runtime: Option<f64>,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub verify: Verify,
    #[serde(default)]
    pub sweep: Sweep,

    /// Shorthand for a suite with a single pairing.
    pub server: Option<MachineSection>,
    pub client: Option<MachineSection>,

    #[serde(default, rename = "experiment")]
    pub experiments: Vec<Pairing>,
}
impl Suite {
    pub fn write_example_to_file(path: &Path) -> anyhow::Result<File> {
        let mut file = File::create_new(path)
            .context(format!("Unable to create {}", path.to_string_lossy()))?;
        File::write_all(&mut file, EXAMPLE_SUITE.as_bytes())?;
        Ok(file)
    }

    pub fn try_from_path(path: &Path) -> anyhow::Result<Suite> {
        let mut suite_str = String::new();
        fs::File::open(path)
            .context(format!("Unable to open suite file {}", path.to_string_lossy()))?
            .read_to_string(&mut suite_str)?;
        Suite::try_from_str(&suite_str)
            .context(format!("Invalid suite file {}", path.to_string_lossy()))
    }

    pub fn try_from_str(suite_str: &str) -> anyhow::Result<Suite> {
        toml::from_str::<Suite>(suite_str).map_err(|e| anyhow::anyhow!("TOML parsing error: {}", e))
    }

    pub fn pairings(&self) -> anyhow::Result<Vec<Pairing>> {
        let mut pairings = vec![];
        match (&self.server, &self.client) {
            (Some(server), Some(client)) => pairings.push(Pairing {
                server: server.clone(),
                client: client.clone(),
            }),
            (None, None) => {}
            _ => anyhow::bail!("[server] and [client] must be given together"),
        }
        pairings.extend(self.experiments.iter().cloned());

        if pairings.is_empty() {
            anyhow::bail!("Suite {} defines no experiments", self.name);
        }
        Ok(pairings)
    }

    /// Expands every pairing over the sweep and validates the result.
    pub fn experiments(&self) -> anyhow::Result<Vec<ExperimentConfig>> {
        self.validate()?;

        let mut timing = self.timing.clone();
        if let Some(runtime) = self.runtime {
            timing.overrides.insert(Delay::Runtime, runtime);
        }
        let defaults = Arc::new(self.defaults.clone());

        let mut experiments = vec![];
        for pairing in self.pairings()? {
            for (nconns, msize) in self.sweep.points() {
                let name = experiment_name(
                    &self.name,
                    pairing.server.stack,
                    pairing.client.stack,
                    nconns,
                    msize,
                );
                let experiment = ExperimentConfig::new(
                    &name,
                    &pairing,
                    defaults.clone(),
                    timing.clone(),
                    self.verify.clone(),
                    nconns,
                    msize,
                )
                .context(format!("Invalid experiment {}", name))?;
                experiments.push(experiment);
            }
        }

        ensure_unique_names(&experiments)?;
        Ok(experiments)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.timing.validate()?;
        self.verify.validate()?;
        if let Some(runtime) = self.runtime {
            if !runtime.is_finite() || runtime < 0.0 {
                anyhow::bail!("runtime must be a non-negative number of seconds");
            }
        }

        check_command("defaults.remote_connect_cmd", &self.defaults.remote_connect_cmd)?;
        check_command("defaults.comp_cmd", &self.defaults.comp_cmd)?;
        check_command("defaults.clean_cmd", &self.defaults.clean_cmd)?;

        for pairing in self.pairings()? {
            pairing.validate()?;
        }
        Ok(())
    }
}

/// Names must be unique: they key every output directory and log file of a suite.
pub fn ensure_unique_names(experiments: &[ExperimentConfig]) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for experiment in experiments {
        if !seen.insert(experiment.name.as_str()) {
            anyhow::bail!("Experiment name {} is used more than once", experiment.name);
        }
    }
    Ok(())
}

/// `<seed>-<server>.<client>`, extended by the swept parameters.
pub fn experiment_name(
    seed: &str,
    server: Stack,
    client: Stack,
    nconns: Option<u32>,
    msize: Option<u32>,
) -> String {
    let mut name = format!("{}-{}.{}", seed, server, client);
    if let Some(nconns) = nconns {
        name.push_str(&format!("_nconns{}", nconns));
    }
    if let Some(msize) = msize {
        name.push_str(&format!("_msize{}", msize));
    }
    name
}

fn check_command(field: &str, cmd: &str) -> anyhow::Result<()> {
    match shlex::split(cmd) {
        Some(words) if !words.is_empty() => Ok(()),
        Some(_) => anyhow::bail!("{} is empty", field),
        None => anyhow::bail!("{} is not a valid shell command: {}", field, cmd),
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Pairing {
    pub server: MachineSection,
    pub client: MachineSection,
}
impl Pairing {
    fn validate(&self) -> anyhow::Result<()> {
        self.server.validate(Role::Server)?;
        self.client.validate(Role::Client)?;

        if roles::macs_overlap(self.server.vms, self.client.vms)? {
            anyhow::bail!(
                "{} server vms and {} client vms would share MAC addresses, \
                 use at most 10 server vms when the client runs vms",
                self.server.vms,
                self.client.vms
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Sweep {
    #[serde(default)]
    pub nconns: Vec<u32>,
    #[serde(default)]
    pub msize: Vec<u32>,
}
impl Sweep {
    /// Every combination of swept values, `None` standing in for a parameter that is not swept.
    pub fn points(&self) -> Vec<(Option<u32>, Option<u32>)> {
        let nconns = if self.nconns.is_empty() {
            vec![None]
        } else {
            self.nconns.iter().copied().map(Some).collect()
        };
        let msize = if self.msize.is_empty() {
            vec![None]
        } else {
            self.msize.iter().copied().map(Some).collect()
        };

        nconns.into_iter().cartesian_product(msize).collect()
    }
}

/// Failure patterns promoted to errors by `--strict`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Verify {
    #[serde(default)]
    pub fail_patterns: Vec<String>,
}
impl Verify {
    pub fn validate(&self) -> anyhow::Result<()> {
        for pattern in self.fail_patterns.iter() {
            Regex::new(pattern).context(format!("Invalid fail pattern {}", pattern))?;
        }
        Ok(())
    }
}

fn default_instances() -> usize {
    1
}

/// The `[server]` / `[client]` tables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MachineSection {
    pub stack: Stack,
    pub ip: String,
    pub interface: String,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub vms: usize,
    /// Benchmark instances per VM, or on the host for nodes without VMs.
    #[serde(default = "default_instances")]
    pub instances: usize,
    pub stack_process: Option<StackProcessSection>,
    #[serde(default)]
    pub benchmark: BenchmarkSection,
    #[serde(default)]
    pub setup_cmds: Vec<String>,
    #[serde(default)]
    pub cleanup_cmds: Vec<String>,
    #[serde(default)]
    pub post_boot_cmds: Vec<String>,
}
impl MachineSection {
    fn validate(&self, role: Role) -> anyhow::Result<()> {
        if matches!(self.stack, Stack::VmProxied | Stack::VmBare) && self.stack_process.is_none() {
            anyhow::bail!(
                "[{}] uses the {} stack which needs a [{}.stack_process] table",
                role,
                self.stack,
                role
            );
        }

        if self.stack.has_vms() {
            if self.vms == 0 {
                anyhow::bail!("[{}] uses the {} stack but has no vms", role, self.stack);
            }
            if self.vms > MAX_VMS {
                anyhow::bail!("[{}] asks for {} vms, at most {} are supported", role, self.vms, MAX_VMS);
            }
        } else if self.vms > 0 {
            anyhow::bail!("[{}] uses the {} stack which runs no vms", role, self.stack);
        }

        if self.instances == 0 {
            anyhow::bail!("[{}] needs at least one benchmark instance", role);
        }
        if !self.benchmark.groups.is_empty() && self.benchmark.groups.len() != self.instances {
            anyhow::bail!(
                "[{}.benchmark] lists {} groups for {} instances",
                role,
                self.benchmark.groups.len(),
                self.instances
            );
        }

        for cmd in self
            .setup_cmds
            .iter()
            .chain(self.cleanup_cmds.iter())
            .chain(self.post_boot_cmds.iter())
        {
            check_command(&format!("[{}] command", role), cmd)?;
        }
        Ok(())
    }

    fn machine(&self, role: Role) -> MachineConfig {
        MachineConfig {
            role,
            stack: self.stack,
            ip: self.ip.clone(),
            interface: self.interface.clone(),
            remote: self.remote,
        }
    }
}

fn default_cores() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StackProcessSection {
    #[serde(default = "default_cores")]
    pub cores: u32,
    /// PCI address handed to DPDK; the lab default for the host or guest when absent.
    pub pci: Option<String>,
    /// Core list for `taskset -c`.
    pub affinity: Option<String>,
    pub extra_args: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkSection {
    pub port: u16,
    pub cores: u32,
    pub max_flows: u32,
    pub max_bytes: u32,
    pub msize: u32,
    pub mpending: u32,
    pub nconns: u32,
    pub open_delay: u32,
    pub max_msgs_conn: u32,
    pub max_pend_conns: u32,
    /// Address the client connects to; derived from the server node when absent.
    pub target_ip: Option<String>,
    /// Tenant group per instance.
    pub groups: Vec<u32>,
    pub affinity: Option<String>,
    pub privilege: Option<Privilege>,
    /// Forces interposition on or off; on exactly when the node runs a fast-path stack otherwise.
    pub interpose: Option<bool>,
    pub extra_args: Option<String>,
}
impl Default for BenchmarkSection {
    fn default() -> Self {
        Self {
            port: 1234,
            cores: 1,
            max_flows: 4096,
            max_bytes: 1024,
            msize: 64,
            mpending: 64,
            nconns: 1,
            open_delay: 0,
            max_msgs_conn: 0,
            max_pend_conns: 16,
            target_ip: None,
            groups: vec![],
            affinity: None,
            privilege: None,
            interpose: None,
            extra_args: None,
        }
    }
}

// ******** ******** ********
// **    EXPERIMENTS       **
// ******** ******** ********

/// One fully derived experiment: a server node and a client node plus everything needed to
/// drive them.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub name: String,
    pub defaults: Arc<Defaults>,
    pub timing: Timing,
    pub verify: Verify,
    pub nconns: Option<u32>,
    pub msize: Option<u32>,
    pub server: NodeConfig,
    pub client: NodeConfig,
}
impl ExperimentConfig {
    pub fn new(
        name: &str,
        pairing: &Pairing,
        defaults: Arc<Defaults>,
        timing: Timing,
        verify: Verify,
        nconns: Option<u32>,
        msize: Option<u32>,
    ) -> anyhow::Result<Self> {
        let server = build_node(
            name,
            Role::Server,
            &pairing.server,
            &pairing.client.ip,
            &defaults,
            |_| Ok(BenchmarkKind::Server),
        )?;

        let client = build_node(
            name,
            Role::Client,
            &pairing.client,
            &pairing.server.ip,
            &defaults,
            |vm| {
                let target_ip = match &pairing.client.benchmark.target_ip {
                    Some(ip) => ip.clone(),
                    None => service_ip(&server, vm.unwrap_or(0)),
                };
                Ok(BenchmarkKind::Client {
                    target_ip,
                    nconns,
                    msize,
                })
            },
        )?;

        Ok(Self {
            name: name.to_string(),
            defaults,
            timing,
            verify,
            nconns,
            msize,
            server,
            client,
        })
    }

    /// Every pane suffix either node can acquire.
    pub fn pane_names(&self) -> Vec<String> {
        self.server
            .pane_names()
            .into_iter()
            .chain(self.client.pane_names())
            .unique()
            .collect()
    }
}

/// Address clients use to reach the server benchmark running on, or behind, `vm`.
pub fn service_ip(server: &NodeConfig, vm: usize) -> String {
    if server.vms.is_empty() || server.stack() == Stack::VmProxied {
        return server.machine.ip.clone();
    }

    let vm = &server.vms[vm % server.vms.len()];
    if server.stack() == Stack::TapBridged && !server.guest_stacks.is_empty() {
        vm.tap_ip.clone()
    } else {
        vm.vm_ip.clone()
    }
}

enum BenchmarkKind {
    Server,
    Client {
        target_ip: String,
        nconns: Option<u32>,
        msize: Option<u32>,
    },
}

fn build_node(
    experiment: &str,
    role: Role,
    section: &MachineSection,
    peer_ip: &str,
    defaults: &Defaults,
    kind: impl Fn(Option<usize>) -> anyhow::Result<BenchmarkKind>,
) -> anyhow::Result<NodeConfig> {
    let machine = Arc::new(section.machine(role));
    let stack = section.stack;

    let vms = if stack.has_vms() {
        (0..section.vms)
            .map(|i| VmConfig::new(defaults, role, i))
            .collect::<anyhow::Result<Vec<_>>>()?
    } else {
        vec![]
    };

    let extra = |process: StackProcessConfig, sp: &StackProcessSection| match &sp.extra_args {
        Some(extra) => process.with_extra_args(extra),
        None => process,
    };

    let host_stack = match &section.stack_process {
        Some(sp) if !stack.stack_in_guest() => Some(extra(
            StackProcessConfig::new(
                defaults,
                role,
                None,
                &section.ip,
                sp.cores,
                sp.pci.as_deref().unwrap_or(&defaults.host_pci_id),
                sp.affinity.clone(),
            ),
            sp,
        )),
        _ => None,
    };

    let guest_stacks = match &section.stack_process {
        Some(sp) if stack.stack_in_guest() => vms
            .iter()
            .map(|vm| {
                let ip = match stack {
                    Stack::TapBridged => &vm.tap_ip,
                    _ => &vm.vm_ip,
                };
                extra(
                    StackProcessConfig::new(
                        defaults,
                        role,
                        Some(vm.index),
                        ip,
                        sp.cores,
                        sp.pci.as_deref().unwrap_or(&defaults.guest_pci_id),
                        sp.affinity.clone(),
                    ),
                    sp,
                )
            })
            .collect(),
        _ => vec![],
    };

    let (host_proxy, guest_proxies) = if stack == Stack::VmProxied {
        (
            Some(ProxyConfig::host(defaults, role)),
            vms.iter()
                .map(|vm| ProxyConfig::guest(defaults, role, vm.index))
                .collect(),
        )
    } else {
        (None, vec![])
    };

    let fast_path = section.stack_process.is_some();
    let bench = &section.benchmark;
    let slots = if vms.is_empty() {
        vec![None]
    } else {
        vms.iter().map(|vm| Some(vm.index)).collect()
    };

    let mut benchmarks = vec![];
    for (slot, vm) in slots.iter().enumerate() {
        for instance in 0..section.instances {
            let group = match bench.groups.get(instance) {
                Some(group) => Some(*group),
                None if stack == Stack::VmBare => Some(instance as u32),
                None => None,
            };
            let placement = Placement {
                experiment: experiment.to_string(),
                index: slot * section.instances + instance,
                vm: *vm,
                instance,
                interpose: bench.interpose.unwrap_or(fast_path),
                group,
                affinity: bench.affinity.clone(),
                privilege: bench.privilege,
            };

            let config = match kind(*vm)? {
                BenchmarkKind::Server => BenchmarkConfig::server(
                    defaults,
                    &placement,
                    &ServerParams {
                        port: bench.port,
                        cores: bench.cores,
                        max_flows: bench.max_flows,
                        max_bytes: bench.max_bytes,
                    },
                ),
                BenchmarkKind::Client {
                    target_ip,
                    nconns,
                    msize,
                } => BenchmarkConfig::client(
                    defaults,
                    &placement,
                    &ClientParams {
                        target_ip,
                        port: bench.port,
                        cores: bench.cores,
                        msize: msize.unwrap_or(bench.msize),
                        mpending: bench.mpending,
                        nconns: nconns.unwrap_or(bench.nconns),
                        open_delay: bench.open_delay,
                        max_msgs_conn: bench.max_msgs_conn,
                        max_pend_conns: bench.max_pend_conns,
                    },
                ),
            };

            benchmarks.push(match &bench.extra_args {
                Some(extra) => config.with_extra_args(extra),
                None => config,
            });
        }
    }

    Ok(NodeConfig {
        machine,
        host_stack,
        guest_stacks,
        host_proxy,
        guest_proxies,
        vms,
        benchmarks,
        setup_cmds: section.setup_cmds.clone(),
        cleanup_cmds: section.cleanup_cmds.clone(),
        post_boot_cmds: section.post_boot_cmds.clone(),
        peer_ip: peer_ip.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn can_load_suite_file() -> anyhow::Result<()> {
        let suite = Suite::try_from_path(Path::new("./fixtures/scalability.toml"))?;
        let experiments = suite.experiments()?;

        let names = experiments.iter().map(|e| e.name.as_str()).collect_vec();
        assert_eq!(
            names,
            vec![
                "scalability-vm-proxied.vm-proxied_nconns64",
                "scalability-vm-proxied.vm-proxied_nconns128",
                "scalability-bare-metal.bare-metal_nconns64",
                "scalability-bare-metal.bare-metal_nconns128",
            ]
        );
        Ok(())
    }

    #[test]
    fn example_suite_is_valid() -> anyhow::Result<()> {
        let suite = Suite::try_from_str(EXAMPLE_SUITE)?;
        assert!(!suite.experiments()?.is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_pairings_are_rejected() -> anyhow::Result<()> {
        let suite = Suite::try_from_path(Path::new("./fixtures/duplicate_names.toml"))?;
        let err = suite.experiments().unwrap_err();
        assert!(err.to_string().contains("used more than once"));
        Ok(())
    }

    #[test]
    fn names_are_unique_across_sweeps() -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for server in [Stack::BareMetal, Stack::VmProxied, Stack::TapBridged] {
            for client in [Stack::BareMetal, Stack::VmProxied, Stack::VmBare] {
                for nconns in [Some(1), Some(64), None] {
                    for msize in [Some(64), Some(1024), None] {
                        assert!(names.insert(experiment_name("s", server, client, nconns, msize)));
                    }
                }
            }
        }
        assert_eq!(
            experiment_name("s", Stack::BareMetal, Stack::VmBare, Some(64), Some(128)),
            "s-bare-metal.vm-bare_nconns64_msize128"
        );
        Ok(())
    }

    #[test]
    fn vm_proxied_requires_stack_process() -> anyhow::Result<()> {
        let suite = Suite::try_from_path(Path::new("./fixtures/missing_stack.toml"))?;
        let err = suite.experiments().unwrap_err();
        assert!(format!("{:#}", err).contains("stack_process"));
        Ok(())
    }

    #[test]
    fn too_many_vms_are_rejected() -> anyhow::Result<()> {
        let suite = Suite::try_from_str(
            r#"
            name = "big"
            [server]
            stack = "tap-bridged"
            ip = "192.168.10.14"
            interface = "ens1f0"
            vms = 17
            [client]
            stack = "bare-metal"
            ip = "192.168.10.13"
            interface = "ens1f0np0"
            "#,
        )?;
        assert!(suite.experiments().is_err());
        Ok(())
    }

    fn tap_pair(server_vms: usize, client_vms: usize) -> anyhow::Result<Suite> {
        Suite::try_from_str(&format!(
            r#"
            name = "macs"
            [server]
            stack = "tap-bridged"
            ip = "192.168.10.14"
            interface = "ens1f0"
            vms = {}
            [client]
            stack = "tap-bridged"
            ip = "192.168.10.13"
            interface = "ens1f0np0"
            vms = {}
            "#,
            server_vms, client_vms
        ))
    }

    #[test]
    fn overlapping_macs_are_rejected() -> anyhow::Result<()> {
        let err = tap_pair(11, 1)?.experiments().unwrap_err();
        assert!(format!("{:#}", err).contains("share MAC addresses"));

        let experiment = tap_pair(10, 16)?.experiments()?.remove(0);
        let macs = experiment
            .server
            .vms
            .iter()
            .chain(experiment.client.vms.iter())
            .map(|vm| vm.mac.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(macs.len(), 26);
        Ok(())
    }

    #[test]
    fn unbalanced_quotes_are_rejected() -> anyhow::Result<()> {
        let suite = Suite::try_from_str(
            r#"
            name = "quotes"
            [server]
            stack = "bare-metal"
            ip = "192.168.10.14"
            interface = "ens1f0"
            setup_cmds = ["echo 'oops"]
            [client]
            stack = "bare-metal"
            ip = "192.168.10.13"
            interface = "ens1f0np0"
            "#,
        )?;
        assert!(suite.experiments().is_err());
        Ok(())
    }

    #[test]
    fn client_targets_server_guests() -> anyhow::Result<()> {
        let suite = Suite::try_from_str(
            r#"
            name = "tap"
            [server]
            stack = "tap-bridged"
            ip = "192.168.10.14"
            interface = "ens1f0"
            vms = 2
            [server.stack_process]
            cores = 2
            [client]
            stack = "tap-bridged"
            ip = "192.168.10.13"
            interface = "ens1f0np0"
            vms = 2
            "#,
        )?;
        let experiment = &suite.experiments()?[0];

        let targets = experiment
            .client
            .benchmarks
            .iter()
            .map(|b| b.args.split(' ').next().unwrap_or_default().to_string())
            .collect_vec();
        assert_eq!(targets, vec!["10.0.1.1", "10.0.1.2"]);
        assert_eq!(experiment.server.guest_stacks.len(), 2);
        assert!(experiment.server.host_stack.is_none());
        assert!(!experiment.client.benchmarks[0].interpose);
        assert!(experiment.server.benchmarks[0].interpose);
        Ok(())
    }

    #[test]
    fn vm_bare_instances_get_groups() -> anyhow::Result<()> {
        let suite = Suite::try_from_str(
            r#"
            name = "groups"
            [server]
            stack = "bare-metal"
            ip = "192.168.10.14"
            interface = "ens1f0"
            [client]
            stack = "vm-bare"
            ip = "192.168.10.13"
            interface = "ens1f0np0"
            instances = 3
            [client.stack_process]
            cores = 4
            "#,
        )?;
        let experiment = &suite.experiments()?[0];

        let groups = experiment
            .client
            .benchmarks
            .iter()
            .map(|b| b.group)
            .collect_vec();
        assert_eq!(groups, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(experiment.client.benchmarks[2].pane, "client_bench0_2");
        assert_eq!(experiment.client.benchmarks[0].args.split(' ').next(), Some("192.168.10.14"));
        Ok(())
    }

    #[test]
    fn runtime_overrides_the_runtime_delay() -> anyhow::Result<()> {
        let suite = Suite::try_from_path(Path::new("./fixtures/scalability.toml"))?;
        let experiment = &suite.experiments()?[0];
        assert_eq!(experiment.timing.secs(Delay::Runtime), 60.0);
        Ok(())
    }
}
