/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Settle delays.
//!
//! Nothing the harness types into a pane reports completion, so every step is followed by a
//! settle delay long enough for the step to very likely have finished. The delays are named
//! (`Delay`) so they can be tuned from the suite file and so tests can run them on a paused
//! clock.

use crate::session::Session;
use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{trace, warn};

/// Every point at which the harness waits instead of observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delay {
    Command,
    RemoteLogin,
    Compile,
    StackUp,
    ProxyUp,
    InstanceGap,
    VmBoot,
    ConsolePrompt,
    ConsoleLogin,
    GuestSsh,
    HugePages,
    DriverBind,
    SwitchBuild,
    SwitchOp,
    BridgeOp,
    LogCopy,
    Password,
    Shutdown,
    Runtime,
}
impl Delay {
    /// Durations observed to be long enough on the lab machines, in seconds.
    pub fn default_secs(self) -> f64 {
        match self {
            Delay::Command => 1.0,
            Delay::RemoteLogin => 2.0,
            Delay::Compile => 3.0,
            Delay::StackUp => 5.0,
            Delay::ProxyUp => 3.0,
            Delay::InstanceGap => 3.0,
            Delay::VmBoot => 25.0,
            Delay::ConsolePrompt => 3.0,
            Delay::ConsoleLogin => 5.0,
            Delay::GuestSsh => 3.0,
            Delay::HugePages => 5.0,
            Delay::DriverBind => 3.0,
            Delay::SwitchBuild => 4.0,
            Delay::SwitchOp => 4.0,
            Delay::BridgeOp => 2.0,
            Delay::LogCopy => 3.0,
            Delay::Password => 1.0,
            Delay::Shutdown => 2.0,
            Delay::Runtime => 100.0,
        }
    }
}

fn default_scale() -> f64 {
    1.0
}

/// The `[timing]` table of a suite file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Timing {
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Regex per delay; when present the delay ends as soon as the pane shows a match.
    #[serde(default)]
    pub probes: HashMap<Delay, String>,

    #[serde(flatten)]
    pub overrides: HashMap<Delay, f64>,
}
impl Default for Timing {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            probes: HashMap::new(),
            overrides: HashMap::new(),
        }
    }
}
impl Timing {
    /// Timing with every delay collapsed to zero, used for dry runs.
    pub fn instant() -> Self {
        Self {
            scale: 0.0,
            ..Default::default()
        }
    }

    pub fn secs(&self, delay: Delay) -> f64 {
        let secs = self
            .overrides
            .get(&delay)
            .copied()
            .unwrap_or_else(|| delay.default_secs());
        (secs * self.scale).max(0.0)
    }

    pub fn duration(&self, delay: Delay) -> Duration {
        Duration::from_secs_f64(self.secs(delay))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.scale.is_finite() || self.scale < 0.0 {
            anyhow::bail!("timing.scale must be a non-negative number, got {}", self.scale);
        }
        for (delay, secs) in self.overrides.iter() {
            if !secs.is_finite() || *secs < 0.0 {
                anyhow::bail!("timing.{:?} must be a non-negative number, got {}", delay, secs);
            }
        }
        for (delay, pattern) in self.probes.iter() {
            Regex::new(pattern).context(format!("Invalid probe pattern for {:?}", delay))?;
        }
        Ok(())
    }
}

/// Waits between steps. `settle` is handed the pane the step was typed into so strategies can
/// inspect it; `wait` is for delays that belong to no particular pane.
#[async_trait]
pub trait Settle: Send + Sync {
    async fn wait(&self, delay: Delay);

    async fn settle(&self, _session: &Session, delay: Delay) {
        self.wait(delay).await
    }
}

/// Sleeps for the configured duration of every delay.
pub struct FixedDelay {
    timing: Timing,
}
impl FixedDelay {
    pub fn new(timing: Timing) -> Self {
        Self { timing }
    }
}
#[async_trait]
impl Settle for FixedDelay {
    async fn wait(&self, delay: Delay) {
        let duration = self.timing.duration(delay);
        trace!("settling {:?} for {:?}", delay, duration);
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Polls the pane for a pattern and stops waiting as soon as it shows up. The fixed duration
/// is kept as the upper bound, so a probe that never matches behaves exactly like
/// `FixedDelay`.
pub struct ProbeDelay {
    timing: Timing,
    probes: HashMap<Delay, Regex>,
    interval: Duration,
}
impl ProbeDelay {
    pub fn new(timing: Timing, interval: Duration) -> anyhow::Result<Self> {
        let mut probes = HashMap::new();
        for (delay, pattern) in timing.probes.iter() {
            let regex =
                Regex::new(pattern).context(format!("Invalid probe pattern for {:?}", delay))?;
            probes.insert(*delay, regex);
        }

        Ok(Self {
            timing,
            probes,
            interval,
        })
    }
}
#[async_trait]
impl Settle for ProbeDelay {
    async fn wait(&self, delay: Delay) {
        let duration = self.timing.duration(delay);
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }

    async fn settle(&self, session: &Session, delay: Delay) {
        let Some(probe) = self.probes.get(&delay) else {
            return self.wait(delay).await;
        };

        let deadline = tokio::time::Instant::now() + self.timing.duration(delay);
        loop {
            match session.capture() {
                Ok(lines) if lines.iter().any(|line| probe.is_match(line)) => return,
                Ok(_) => {}
                Err(err) => warn!("Unable to capture {} while probing: {}", session.name(), err),
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                warn!(
                    "Probe {:?} for {:?} did not match in {} before the deadline",
                    probe.as_str(),
                    delay,
                    session.name()
                );
                return;
            }
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}

/// Picks the strategy a suite asks for: probing when any probe is configured, fixed otherwise.
pub fn from_timing(timing: &Timing) -> anyhow::Result<Arc<dyn Settle>> {
    if timing.probes.is_empty() {
        Ok(Arc::new(FixedDelay::new(timing.clone())))
    } else {
        Ok(Arc::new(ProbeDelay::new(
            timing.clone(),
            Duration::from_millis(500),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{memory::MemoryMultiplexer, SessionManager};

    #[test]
    fn overrides_and_scale_apply() -> anyhow::Result<()> {
        let timing: Timing = toml::from_str("scale = 0.5\nvm_boot = 20.0\n")?;
        assert_eq!(timing.secs(Delay::VmBoot), 10.0);
        assert_eq!(timing.secs(Delay::Command), 0.5);
        assert_eq!(Timing::instant().duration(Delay::Runtime), Duration::ZERO);
        Ok(())
    }

    #[test]
    fn unknown_delay_names_are_rejected() {
        let res = toml::from_str::<Timing>("vm_bot = 20.0\n");
        assert!(res.is_err());
    }

    #[test]
    fn negative_scale_is_rejected() -> anyhow::Result<()> {
        let timing: Timing = toml::from_str("scale = -1.0\n")?;
        assert!(timing.validate().is_err());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_sleeps_for_the_configured_duration() {
        let settle = FixedDelay::new(Timing::default());
        let start = tokio::time::Instant::now();
        settle.wait(Delay::VmBoot).await;
        assert_eq!(start.elapsed(), Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_returns_early_on_match() -> anyhow::Result<()> {
        let mux = Arc::new(MemoryMultiplexer::new());
        let sessions = SessionManager::new(mux.clone(), "t_", "ssh host", Arc::new(FixedDelay::new(Timing::instant())));
        let session = sessions.acquire("vm0", false).await?;
        mux.script_capture("t_vm0", &["booting", "guest login:"]);

        let mut timing = Timing::default();
        timing.probes.insert(Delay::VmBoot, "login:".to_string());
        let settle = ProbeDelay::new(timing, Duration::from_millis(500))?;

        let start = tokio::time::Instant::now();
        settle.settle(&session, Delay::VmBoot).await;
        assert!(start.elapsed() < Duration::from_secs(1));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn probe_falls_back_to_the_fixed_duration() -> anyhow::Result<()> {
        let mux = Arc::new(MemoryMultiplexer::new());
        let sessions = SessionManager::new(mux.clone(), "t_", "ssh host", Arc::new(FixedDelay::new(Timing::instant())));
        let session = sessions.acquire("vm0", false).await?;
        mux.script_capture("t_vm0", &["booting"]);

        let mut timing = Timing::default();
        timing.probes.insert(Delay::VmBoot, "login:".to_string());
        let settle = ProbeDelay::new(timing, Duration::from_millis(500))?;

        let start = tokio::time::Instant::now();
        settle.settle(&session, Delay::VmBoot).await;
        assert_eq!(start.elapsed(), Duration::from_secs(25));
        Ok(())
    }
}
