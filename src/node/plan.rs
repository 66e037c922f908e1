/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{config::roles::NodeConfig, hooks::Phase};

/// Where a node's fast-path stack runs, if it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPlacement {
    Host,
    Guest,
}

/// What a node brings up besides its benchmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub stack: Option<StackPlacement>,
    pub host_proxy: bool,
    pub vms: bool,
}
impl Capabilities {
    pub fn of(config: &NodeConfig) -> Self {
        let stack = if config.host_stack.is_some() {
            Some(StackPlacement::Host)
        } else if !config.guest_stacks.is_empty() {
            Some(StackPlacement::Guest)
        } else {
            None
        };

        Self {
            stack,
            host_proxy: config.host_proxy.is_some(),
            vms: !config.vms.is_empty(),
        }
    }

    /// The phases `Node::run` walks through, in order.
    pub fn plan(&self) -> Vec<Phase> {
        let mut phases = vec![Phase::SetupCmds];

        if self.stack == Some(StackPlacement::Host) {
            phases.push(Phase::StackBringup);
        }
        if self.host_proxy {
            phases.push(Phase::ProxyBringup);
        }
        if self.vms {
            phases.push(Phase::VmBringup);
            if self.stack == Some(StackPlacement::Guest) {
                phases.push(Phase::GuestStackBringup);
            }
            if self.host_proxy {
                phases.push(Phase::GuestProxyBringup);
            }
        }

        phases.push(Phase::Execute);
        phases
    }
}
