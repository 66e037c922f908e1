/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Phase hooks. Nothing typed into a pane reports success, so by default a failed step goes
//! unnoticed until the logs are parsed. Hooks run around every phase and may end the run.

use crate::{config::roles::Role, session::SessionManager};
use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    SetupCmds,
    StackBringup,
    ProxyBringup,
    VmBringup,
    GuestStackBringup,
    GuestProxyBringup,
    Execute,
    Cleanup,
}
impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::SetupCmds => "setup commands",
            Phase::StackBringup => "stack bring-up",
            Phase::ProxyBringup => "proxy bring-up",
            Phase::VmBringup => "VM bring-up",
            Phase::GuestStackBringup => "guest stack bring-up",
            Phase::GuestProxyBringup => "guest proxy bring-up",
            Phase::Execute => "execute",
            Phase::Cleanup => "cleanup",
        };
        write!(f, "{}", name)
    }
}

#[async_trait]
pub trait PhaseHook: Send + Sync {
    async fn before(&self, _role: Role, _phase: Phase) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after(
        &self,
        _role: Role,
        _phase: Phase,
        _sessions: &SessionManager,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called from each VM worker once its VM is booted and configured.
    async fn vm_ready(&self, _role: Role, _vm: usize) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct NoopHook;
#[async_trait]
impl PhaseHook for NoopHook {}

/// Scans every pane after each phase and fails the run when one shows a failure pattern.
pub struct CaptureCheck {
    patterns: Vec<Regex>,
}
impl CaptureCheck {
    pub fn new(patterns: &[String]) -> anyhow::Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).context(format!("Invalid fail pattern {}", p)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}
#[async_trait]
impl PhaseHook for CaptureCheck {
    async fn after(
        &self,
        role: Role,
        phase: Phase,
        sessions: &SessionManager,
    ) -> anyhow::Result<()> {
        // panes still show whatever failed the run while it is torn down
        if phase == Phase::Cleanup {
            return Ok(());
        }

        for suffix in sessions.known_names() {
            let Some(session) = sessions.attach(&suffix)? else {
                continue;
            };

            for line in session.capture()? {
                if let Some(pattern) = self.patterns.iter().find(|p| p.is_match(&line)) {
                    anyhow::bail!(
                        "{} {} failed: pane {} matched {:?}: {}",
                        role,
                        phase,
                        session.name(),
                        pattern.as_str(),
                        line.trim()
                    );
                }
            }
        }

        debug!("{} {} passed capture checks", role, phase);
        Ok(())
    }
}
