/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Host preparation and teardown commands per stack variant, and the post-boot sequence each
//! variant runs inside its VMs.

use crate::{
    config::{
        defaults::Defaults,
        roles::{NodeConfig, Stack, VmConfig},
    },
    settle::Delay,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub cmd: String,
    pub delay: Delay,
}
impl Step {
    fn new(cmd: impl Into<String>, delay: Delay) -> Self {
        Self {
            cmd: cmd.into(),
            delay,
        }
    }
}

/// The helper scripts live next to `start-vm.sh` in the first VM's manager directory.
fn script_dir(config: &NodeConfig) -> Option<&str> {
    config.vms.first().map(|vm| vm.manager_dir.as_str())
}

pub fn setup_steps(config: &NodeConfig, defaults: &Defaults) -> Vec<Step> {
    let machine = &config.machine;
    let mut steps = vec![];

    match (config.stack(), script_dir(config)) {
        (Stack::TapBridged, Some(dir)) => {
            steps.push(Step::new(format!("cd {}", dir), Delay::Command));
            steps.push(Step::new(
                format!("sudo bash br-up.sh {} {}/24", machine.interface, machine.ip),
                Delay::BridgeOp,
            ));
            for vm in config.vms.iter() {
                steps.push(Step::new(
                    format!("sudo bash tap-up.sh tap{} 0", vm.index),
                    Delay::BridgeOp,
                ));
                if !config.guest_stacks.is_empty() {
                    steps.push(Step::new(
                        format!("sudo bash tap-up.sh tastap{} 1", vm.index),
                        Delay::BridgeOp,
                    ));
                }
            }
        }

        (Stack::VirtualSwitchBridged, Some(dir)) => {
            if defaults.switch_install {
                steps.push(Step::new(format!("cd {}", defaults.switch_dir), Delay::Command));
                steps.push(Step::new("sudo make install", Delay::SwitchBuild));
            }
            steps.push(Step::new(format!("cd {}", dir), Delay::Command));
            steps.push(Step::new("sudo bash ovs-start.sh", Delay::SwitchOp));
            steps.push(Step::new(
                format!(
                    "sudo bash ovsbr-add.sh {} {}/24 {}",
                    defaults.bridge, machine.ip, machine.interface
                ),
                Delay::SwitchOp,
            ));
            for vm in config.vms.iter() {
                // tunnel keys must be unique per VM and non-zero
                steps.push(Step::new(
                    format!(
                        "sudo bash ovsvhost-add.sh {} vhost{} gre{} {} {}",
                        defaults.bridge,
                        vm.index,
                        vm.index,
                        config.peer_ip,
                        vm.index + 1
                    ),
                    Delay::SwitchOp,
                ));
                steps.push(Step::new(
                    format!("sudo bash ovstap-add.sh {} tap{} 0", defaults.bridge, vm.index),
                    Delay::BridgeOp,
                ));
            }
        }

        _ => {}
    }

    steps.extend(
        config
            .setup_cmds
            .iter()
            .map(|cmd| Step::new(cmd.clone(), Delay::Command)),
    );
    steps
}

pub fn cleanup_steps(config: &NodeConfig, defaults: &Defaults) -> Vec<Step> {
    let machine = &config.machine;
    let mut steps = config
        .cleanup_cmds
        .iter()
        .map(|cmd| Step::new(cmd.clone(), Delay::Command))
        .collect::<Vec<_>>();

    match (config.stack(), script_dir(config)) {
        (Stack::TapBridged, Some(dir)) => {
            steps.push(Step::new(format!("cd {}", dir), Delay::Command));
            steps.push(Step::new(
                format!("sudo bash br-down.sh {} {}/24", machine.interface, machine.ip),
                Delay::BridgeOp,
            ));
            for vm in config.vms.iter() {
                steps.push(Step::new(
                    format!("sudo bash tap-down.sh tap{}", vm.index),
                    Delay::BridgeOp,
                ));
                if !config.guest_stacks.is_empty() {
                    steps.push(Step::new(
                        format!("sudo bash tap-down.sh tastap{}", vm.index),
                        Delay::BridgeOp,
                    ));
                }
            }
        }

        (Stack::VirtualSwitchBridged, Some(dir)) => {
            steps.push(Step::new(format!("cd {}", dir), Delay::Command));
            steps.push(Step::new(
                format!("sudo bash ovsbr-del.sh {}", defaults.bridge),
                Delay::BridgeOp,
            ));
            steps.push(Step::new("sudo bash ovs-stop.sh", Delay::BridgeOp));
            for vm in config.vms.iter() {
                steps.push(Step::new(
                    format!("sudo bash tap-down.sh tap{}", vm.index),
                    Delay::BridgeOp,
                ));
            }
            // the bridge owned the interface while it existed
            steps.push(Step::new(
                format!("sudo ip addr add {}/24 dev {}", machine.ip, machine.interface),
                Delay::Command,
            ));
            steps.push(Step::new(
                format!("sudo ip link set dev {} up", machine.interface),
                Delay::Command,
            ));
        }

        _ => {}
    }

    steps
}

/// One post-boot action inside a guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostBoot {
    HugePages,
    NoIommu,
    Interface { ip: String, interface: String },
    DriverBind { ip: String, interface: String, pci: String },
    UserCmds,
}

pub fn post_boot(config: &NodeConfig, defaults: &Defaults, vm: &VmConfig) -> Vec<PostBoot> {
    let guest_stack = !config.guest_stacks.is_empty();
    let interface = |ip: &str, interface: &str| PostBoot::Interface {
        ip: ip.to_string(),
        interface: interface.to_string(),
    };

    let mut steps = match config.stack() {
        Stack::VmProxied => vec![PostBoot::NoIommu],

        Stack::TapBridged if guest_stack => vec![
            PostBoot::HugePages,
            PostBoot::NoIommu,
            interface(&vm.vm_ip, &defaults.vm_interface),
            interface(&vm.tap_ip, &defaults.guest_stack_interface),
            PostBoot::DriverBind {
                ip: vm.tap_ip.clone(),
                interface: defaults.guest_stack_interface.clone(),
                pci: defaults.guest_pci_id.clone(),
            },
        ],

        Stack::VirtualSwitchBridged if guest_stack => vec![
            PostBoot::HugePages,
            PostBoot::NoIommu,
            interface(&vm.vm_ip, &defaults.vm_interface),
            PostBoot::DriverBind {
                ip: vm.vm_ip.clone(),
                interface: defaults.vm_interface.clone(),
                pci: defaults.guest_pci_id.clone(),
            },
        ],

        _ => vec![interface(&vm.vm_ip, &defaults.vm_interface)],
    };

    if !config.post_boot_cmds.is_empty() {
        steps.push(PostBoot::UserCmds);
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Suite;

    fn node(server: &str) -> anyhow::Result<NodeConfig> {
        let suite = Suite::try_from_str(&format!(
            r#"
            name = "cmds"
            [server]
            ip = "192.168.10.14"
            interface = "ens1f0"
            {}
            [client]
            stack = "bare-metal"
            ip = "192.168.10.13"
            interface = "ens1f0np0"
            "#,
            server
        ))?;
        Ok(suite.experiments()?.remove(0).server)
    }

    fn cmds(steps: &[Step]) -> Vec<&str> {
        steps.iter().map(|s| s.cmd.as_str()).collect()
    }

    #[test]
    fn switch_tunnels_are_keyed_from_one() -> anyhow::Result<()> {
        let config = node("stack = \"virtual-switch-bridged\"\nvms = 2\n[server.stack_process]\ncores = 2")?;
        let steps = setup_steps(&config, &Defaults::default());

        let tunnels = cmds(&steps)
            .into_iter()
            .filter(|c| c.contains("ovsvhost-add.sh"))
            .collect::<Vec<_>>();
        assert_eq!(
            tunnels,
            vec![
                "sudo bash ovsvhost-add.sh br0 vhost0 gre0 192.168.10.13 1",
                "sudo bash ovsvhost-add.sh br0 vhost1 gre1 192.168.10.13 2",
            ]
        );
        Ok(())
    }

    #[test]
    fn switch_cleanup_restores_the_interface() -> anyhow::Result<()> {
        let config = node("stack = \"virtual-switch-bridged\"\nvms = 1")?;
        let steps = cleanup_steps(&config, &Defaults::default());

        assert_eq!(
            cmds(&steps)[steps.len() - 2..],
            [
                "sudo ip addr add 192.168.10.14/24 dev ens1f0",
                "sudo ip link set dev ens1f0 up"
            ]
        );
        Ok(())
    }

    #[test]
    fn tap_setup_adds_stack_taps_only_with_a_guest_stack() -> anyhow::Result<()> {
        let plain = node("stack = \"tap-bridged\"\nvms = 2")?;
        let with_stack = node("stack = \"tap-bridged\"\nvms = 2\n[server.stack_process]\ncores = 1")?;
        let defaults = Defaults::default();

        let plain = setup_steps(&plain, &defaults);
        assert_eq!(
            cmds(&plain),
            vec![
                "cd /local/mstolet/projects/tas/images",
                "sudo bash br-up.sh ens1f0 192.168.10.14/24",
                "sudo bash tap-up.sh tap0 0",
                "sudo bash tap-up.sh tap1 0",
            ]
        );
        assert_eq!(
            setup_steps(&with_stack, &defaults)
                .iter()
                .filter(|s| s.cmd.contains("tastap"))
                .count(),
            2
        );
        Ok(())
    }

    #[test]
    fn user_commands_wrap_variant_commands() -> anyhow::Result<()> {
        let config = node(
            "stack = \"bare-metal\"\nsetup_cmds = [\"sudo sysctl -w x=1\"]\ncleanup_cmds = [\"sudo sysctl -w x=0\"]",
        )?;
        let defaults = Defaults::default();

        assert_eq!(cmds(&setup_steps(&config, &defaults)), vec!["sudo sysctl -w x=1"]);
        assert_eq!(cmds(&cleanup_steps(&config, &defaults)), vec!["sudo sysctl -w x=0"]);
        Ok(())
    }

    #[test]
    fn post_boot_by_variant() -> anyhow::Result<()> {
        let defaults = Defaults::default();

        let proxied = node("stack = \"vm-proxied\"\nvms = 1\n[server.stack_process]\ncores = 1")?;
        assert_eq!(post_boot(&proxied, &defaults, &proxied.vms[0]), vec![PostBoot::NoIommu]);

        let tap = node("stack = \"tap-bridged\"\nvms = 1\n[server.stack_process]\ncores = 1")?;
        let steps = post_boot(&tap, &defaults, &tap.vms[0]);
        assert_eq!(steps.len(), 5);
        assert_eq!(
            steps[4],
            PostBoot::DriverBind {
                ip: "10.0.1.1".to_string(),
                interface: "enp0s3".to_string(),
                pci: "0000:00:03.0".to_string(),
            }
        );

        let plain = node("stack = \"tap-bridged\"\nvms = 1\npost_boot_cmds = [\"sudo ip link set enp0s2 up\"]")?;
        assert_eq!(
            post_boot(&plain, &defaults, &plain.vms[0]),
            vec![
                PostBoot::Interface {
                    ip: "10.0.0.1".to_string(),
                    interface: "enp0s3".to_string()
                },
                PostBoot::UserCmds
            ]
        );
        Ok(())
    }
}
