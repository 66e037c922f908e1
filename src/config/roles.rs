/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Fully derived, typed launch parameters for every process an experiment starts.
//!
//! Everything here is built once from a handful of primitive inputs plus the lab's naming
//! conventions and is read-only afterwards, apart from `with_extra_args` patches.

use super::defaults::Defaults;
use crate::components::Privilege;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, sync::Arc};

/// Number of VMs a single role can address; bounded by the MAC and address schemes.
pub const MAX_VMS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stack {
    BareMetal,
    TapBridged,
    VmProxied,
    VirtualSwitchBridged,
    VmBare,
}
impl Stack {
    pub fn tag(&self) -> &'static str {
        match self {
            Stack::BareMetal => "bare-metal",
            Stack::TapBridged => "tap-bridged",
            Stack::VmProxied => "vm-proxied",
            Stack::VirtualSwitchBridged => "virtual-switch-bridged",
            Stack::VmBare => "vm-bare",
        }
    }

    pub fn has_vms(&self) -> bool {
        matches!(
            self,
            Stack::TapBridged | Stack::VmProxied | Stack::VirtualSwitchBridged
        )
    }

    /// Whether a configured fast-path stack runs inside the guests rather than on the host.
    pub fn stack_in_guest(&self) -> bool {
        matches!(self, Stack::TapBridged | Stack::VirtualSwitchBridged)
    }

    /// Whether guests are reached through forwarded ports on the host.
    pub fn port_forwarded(&self) -> bool {
        matches!(self, Stack::VmProxied)
    }
}
impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Client,
}
impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}
impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One host taking part in an experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub role: Role,
    pub stack: Stack,
    pub ip: String,
    pub interface: String,
    pub remote: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    pub comp_dir: String,
    pub comp_cmd: String,
    pub clean_cmd: Option<String>,
}

fn out_path(out_dir: &str, out_file: &str) -> String {
    format!("{}/{}", out_dir, out_file)
}

/// The fast-path stack daemon, on the host or inside one guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackProcessConfig {
    pub pane: String,
    pub vm: Option<usize>,
    pub build: BuildSpec,
    pub exec: String,
    pub args: String,
    pub out_dir: String,
    pub out_file: String,
    pub affinity: Option<String>,
}
impl StackProcessConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        defaults: &Defaults,
        role: Role,
        vm: Option<usize>,
        ip: &str,
        cores: u32,
        pci: &str,
        affinity: Option<String>,
    ) -> Self {
        let project_dir = defaults.stack_dir(vm.is_some());
        let out_dir = format!("{}/out", project_dir);
        let out_file = match role {
            Role::Server => "tas_s",
            Role::Client => "tas_c",
        };
        let pane = match vm {
            Some(i) => format!("{}_stack{}", role, i),
            None => format!("{}_stack", role),
        };

        Self {
            pane,
            vm,
            build: BuildSpec {
                comp_dir: project_dir.to_string(),
                comp_cmd: defaults.comp_cmd.clone(),
                clean_cmd: defaults.clean_cmd(),
            },
            exec: format!("{}/tas/tas", project_dir),
            args: format!(
                "--ip-addr={}/24 --fp-cores-max={} --cc=const-rate --cc-const-rate=0 \
                 --fp-no-autoscale --fp-no-ints --dpdk-extra=\"--lcores={}\" --dpdk-extra=\"-a{}\"",
                ip, cores, defaults.lcores, pci
            ),
            out_dir,
            out_file: out_file.to_string(),
            affinity,
        }
    }

    pub fn out(&self) -> String {
        out_path(&self.out_dir, &self.out_file)
    }

    pub fn with_extra_args(&self, extra: &str) -> Self {
        Self {
            args: format!("{} {}", self.args, extra),
            ..self.clone()
        }
    }
}

/// The shared-memory proxy pair used by vm-proxied nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub pane: String,
    pub build: BuildSpec,
    pub exec: String,
    pub out_dir: String,
    pub out_file: String,
    /// Removed before every host launch; a stale socket blocks the proxy from starting.
    pub socket_path: Option<String>,
}
impl ProxyConfig {
    pub fn host(defaults: &Defaults, role: Role) -> Self {
        let dir = defaults.stack_dir(false);
        Self {
            pane: format!("{}_proxyh", role),
            build: BuildSpec {
                comp_dir: dir.to_string(),
                comp_cmd: defaults.comp_cmd.clone(),
                clean_cmd: defaults.clean_cmd(),
            },
            exec: format!("{}/proxy/host/host", dir),
            out_dir: format!("{}/out", dir),
            out_file: "proxy_h".to_string(),
            socket_path: Some(defaults.proxy_socket.clone()),
        }
    }

    pub fn guest(defaults: &Defaults, role: Role, vm: usize) -> Self {
        let dir = defaults.stack_dir(true);
        Self {
            pane: format!("{}_proxyg{}", role, vm),
            build: BuildSpec {
                comp_dir: dir.to_string(),
                comp_cmd: defaults.comp_cmd.clone(),
                clean_cmd: defaults.clean_cmd(),
            },
            exec: format!("{}/proxy/guest/guest", dir),
            out_dir: format!("{}/out", dir),
            out_file: "proxy_g".to_string(),
            socket_path: None,
        }
    }

    pub fn out(&self) -> String {
        out_path(&self.out_dir, &self.out_file)
    }
}

/// Last octet of a VM's MAC address, always even. Server VM `i + 10` and client VM `i` share
/// an octet, so a pairing may only use both ranges while they stay apart; see
/// `macs_overlap`.
pub fn mac_octet(role: Role, index: usize) -> anyhow::Result<u8> {
    if index >= MAX_VMS {
        anyhow::bail!(
            "VM index {} is out of range, at most {} VMs per role are supported",
            index,
            MAX_VMS
        );
    }
    let base = match role {
        Role::Server => 10,
        Role::Client => 30,
    };
    // index < 16 keeps this well inside u8
    Ok(base + 2 * index as u8)
}

pub fn mac_address(role: Role, index: usize) -> anyhow::Result<String> {
    Ok(format!("52:54:00:12:34:{:02x}", mac_octet(role, index)?))
}

/// Whether `server_vms` server VMs and `client_vms` client VMs would be handed the same MAC.
pub fn macs_overlap(server_vms: usize, client_vms: usize) -> anyhow::Result<bool> {
    let server = (0..server_vms)
        .map(|i| mac_octet(Role::Server, i))
        .collect::<anyhow::Result<HashSet<_>>>()?;
    for i in 0..client_vms {
        if server.contains(&mac_octet(Role::Client, i)?) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    pub index: usize,
    pub pane: String,
    /// Directory holding `start-vm.sh` and the helper scripts on the host.
    pub manager_dir: String,
    /// The same directory as seen from inside the guest.
    pub guest_manager_dir: String,
    pub vm_ip: String,
    pub tap_ip: String,
    pub mac: String,
}
impl VmConfig {
    pub fn new(defaults: &Defaults, role: Role, index: usize) -> anyhow::Result<Self> {
        let mac = mac_address(role, index)?;
        let host = match role {
            Role::Server => 1 + index,
            Role::Client => 20 + index,
        };

        Ok(Self {
            index,
            pane: format!("{}_vm{}", role, index),
            manager_dir: format!("{}/images", defaults.stack_dir(false)),
            guest_manager_dir: format!("{}/images", defaults.stack_dir(true)),
            vm_ip: format!("10.0.0.{}", host),
            tap_ip: format!("10.0.1.{}", host),
            mac,
        })
    }
}

/// Primitive inputs of a client benchmark instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientParams {
    pub target_ip: String,
    pub port: u16,
    pub cores: u32,
    pub msize: u32,
    pub mpending: u32,
    pub nconns: u32,
    pub open_delay: u32,
    pub max_msgs_conn: u32,
    pub max_pend_conns: u32,
}

/// Primitive inputs of a server benchmark instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerParams {
    pub port: u16,
    pub cores: u32,
    pub max_flows: u32,
    pub max_bytes: u32,
}

/// Where and how a benchmark instance runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub experiment: String,
    /// Position of the instance across the whole node.
    pub index: usize,
    pub vm: Option<usize>,
    pub instance: usize,
    pub interpose: bool,
    pub group: Option<u32>,
    pub affinity: Option<String>,
    pub privilege: Option<Privilege>,
}

/// One benchmark process, client or server side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkConfig {
    pub role: Role,
    pub index: usize,
    pub vm: Option<usize>,
    pub pane: String,
    pub build: BuildSpec,
    /// Directory the benchmark is launched from.
    pub exec_dir: String,
    pub exec: String,
    pub args: String,
    pub lib_so: String,
    pub interpose: bool,
    pub out_dir: String,
    pub out_file: String,
    /// Tenant group exported as `TAS_GROUP` before launching.
    pub group: Option<u32>,
    pub affinity: Option<String>,
    pub privilege: Privilege,
}
impl BenchmarkConfig {
    fn base(defaults: &Defaults, role: Role, placement: &Placement, exec_name: &str) -> Self {
        let guest = placement.vm.is_some();
        let stack_dir = defaults.stack_dir(guest);
        let comp_dir = format!("{}/micro_rpc", defaults.bench_dir(guest));
        let default_privilege = match role {
            Role::Server => Privilege::Sudo,
            Role::Client => Privilege::None,
        };

        Self {
            role,
            index: placement.index,
            vm: placement.vm,
            pane: format!(
                "{}_bench{}_{}",
                role,
                placement.vm.unwrap_or(0),
                placement.instance
            ),
            build: BuildSpec {
                comp_dir: comp_dir.clone(),
                comp_cmd: defaults.comp_cmd.clone(),
                clean_cmd: defaults.clean_cmd(),
            },
            exec_dir: stack_dir.to_string(),
            exec: format!("{}/{}", comp_dir, exec_name),
            args: String::new(),
            lib_so: format!("{}/lib/libtas_interpose.so", stack_dir),
            interpose: placement.interpose,
            out_dir: format!("{}/out", stack_dir),
            out_file: String::new(),
            group: placement.group,
            affinity: placement.affinity.clone(),
            privilege: placement.privilege.unwrap_or(default_privilege),
        }
    }

    pub fn client(defaults: &Defaults, placement: &Placement, params: &ClientParams) -> Self {
        let mut config = Self::base(defaults, Role::Client, placement, "testclient_linux");
        config.args = format!(
            "{} {} {} foo {} {} {} {} {} {}",
            params.target_ip,
            params.port,
            params.cores,
            params.msize,
            params.mpending,
            params.nconns,
            params.open_delay,
            params.max_msgs_conn,
            params.max_pend_conns
        );
        config.out_file = format!(
            "{}_client{}_node{}_nconns{}_ncores{}_msize{}",
            placement.experiment,
            placement.index,
            placement.vm.unwrap_or(0),
            params.nconns,
            params.cores,
            params.msize
        );
        config
    }

    pub fn server(defaults: &Defaults, placement: &Placement, params: &ServerParams) -> Self {
        let mut config = Self::base(defaults, Role::Server, placement, "echoserver_linux");
        config.args = format!(
            "{} {} foo {} {}",
            params.port, params.cores, params.max_flows, params.max_bytes
        );
        config.out_file = format!(
            "{}_server{}_node{}",
            placement.experiment,
            placement.index,
            placement.vm.unwrap_or(0)
        );
        config
    }

    pub fn out(&self) -> String {
        out_path(&self.out_dir, &self.out_file)
    }

    pub fn with_extra_args(&self, extra: &str) -> Self {
        Self {
            args: format!("{} {}", self.args, extra),
            ..self.clone()
        }
    }
}

/// Everything one Node needs, for one role of one experiment.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub machine: Arc<MachineConfig>,
    /// Host daemon for bare-metal, vm-bare and vm-proxied nodes.
    pub host_stack: Option<StackProcessConfig>,
    /// One daemon per VM for tap-bridged and virtual-switch-bridged nodes.
    pub guest_stacks: Vec<StackProcessConfig>,
    pub host_proxy: Option<ProxyConfig>,
    pub guest_proxies: Vec<ProxyConfig>,
    pub vms: Vec<VmConfig>,
    /// In VM-index then instance order.
    pub benchmarks: Vec<BenchmarkConfig>,
    pub setup_cmds: Vec<String>,
    pub cleanup_cmds: Vec<String>,
    /// Typed into every VM after boot, `{vm}` replaced by the VM index.
    pub post_boot_cmds: Vec<String>,
    /// Address of the peer machine, used for tunnel endpoints.
    pub peer_ip: String,
}
impl NodeConfig {
    pub fn role(&self) -> Role {
        self.machine.role
    }

    pub fn stack(&self) -> Stack {
        self.machine.stack
    }

    pub fn setup_pane(&self) -> String {
        format!("{}_setup", self.role())
    }

    pub fn cleanup_pane(&self) -> String {
        format!("{}_cleanup", self.role())
    }

    pub fn savelogs_pane(&self) -> String {
        format!("{}_savelogs", self.role())
    }

    /// Every pane suffix this node can ever acquire.
    pub fn pane_names(&self) -> Vec<String> {
        let mut names = vec![self.setup_pane(), self.cleanup_pane(), self.savelogs_pane()];
        names.extend(self.host_stack.iter().map(|c| c.pane.clone()));
        names.extend(self.guest_stacks.iter().map(|c| c.pane.clone()));
        names.extend(self.host_proxy.iter().map(|c| c.pane.clone()));
        names.extend(self.guest_proxies.iter().map(|c| c.pane.clone()));
        names.extend(self.vms.iter().map(|c| c.pane.clone()));
        names.extend(self.benchmarks.iter().map(|c| c.pane.clone()));
        names
    }
}
