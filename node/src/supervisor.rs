//! Stall supervisor for the light client.
//!
//! Samples the best block height on a timer. A height that stops advancing
//! triggers a resync; if it is still stuck on the next sample the chain is
//! rolled back six hours behind the tip and resynced.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use spvrelay_spv::LightClient;

use crate::metrics::RelayMetrics;

/// How far behind the tip a repeated stall rolls the header chain back.
pub const ROLLBACK_WINDOW_SECS: u64 = 6 * 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StallState {
    Healthy,
    Stalled,
    StalledRepeated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorAction {
    None,
    Resync,
    RollbackAndResync,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delay {
    Full,
    Half,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub state: StallState,
    pub action: SupervisorAction,
    pub delay: Delay,
}

/// Next state for one sample. `advanced` is `height > last`.
pub fn transition(state: StallState, advanced: bool) -> Transition {
    use StallState::*;
    use SupervisorAction as A;

    let (state, action, delay) = match (state, advanced) {
        (_, true) => (Healthy, A::None, Delay::Full),
        (Healthy, false) => (Stalled, A::Resync, Delay::Full),
        (Stalled | StalledRepeated, false) => (StalledRepeated, A::RollbackAndResync, Delay::Half),
    };
    Transition {
        state,
        action,
        delay,
    }
}

/// Stall tracking between samples.
#[derive(Debug)]
pub struct StallTracker {
    state: StallState,
    last_height: u32,
}

impl StallTracker {
    pub fn new(initial_height: u32) -> Self {
        Self {
            state: StallState::Healthy,
            last_height: initial_height,
        }
    }

    pub fn state(&self) -> StallState {
        self.state
    }

    /// Feed one height sample. The returned transition carries the state the
    /// sample moved into; after a repeated stall the tracker itself settles
    /// back to `Healthy`, so one stall episode rolls back at most once.
    pub fn observe(&mut self, height: u32) -> Transition {
        let next = transition(self.state, height > self.last_height);
        self.last_height = height;
        self.state = match next.state {
            StallState::StalledRepeated => StallState::Healthy,
            other => other,
        };
        next
    }
}

pub struct Supervisor {
    light: Arc<dyn LightClient>,
    interval: Duration,
    metrics: Arc<RelayMetrics>,
}

impl Supervisor {
    pub fn new(light: Arc<dyn LightClient>, interval: Duration, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            light,
            interval,
            metrics,
        }
    }

    /// Sample the tip once and carry out the resulting action.
    pub fn tick(&self, tracker: &mut StallTracker) -> Delay {
        let tip = match self.light.best_block() {
            Ok(tip) => tip,
            Err(e) => {
                tracing::warn!(error = %e, "supervisor: cannot read best block");
                return Delay::Full;
            }
        };
        let step = tracker.observe(tip.height);
        match step.action {
            SupervisorAction::None => {
                tracing::debug!(height = tip.height, "supervisor: chain advancing");
            }
            SupervisorAction::Resync => {
                tracing::warn!(height = tip.height, "supervisor: chain stalled, resyncing");
                self.metrics.supervisor_resyncs.inc();
                if let Err(e) = self.light.resync() {
                    tracing::error!(error = %e, "supervisor: resync failed");
                }
            }
            SupervisorAction::RollbackAndResync => {
                let before = tip.timestamp.saturating_sub_secs(ROLLBACK_WINDOW_SECS);
                tracing::warn!(
                    height = tip.height,
                    %before,
                    "supervisor: chain still stalled, rolling back"
                );
                self.metrics.supervisor_rollbacks.inc();
                if let Err(e) = self.light.rollback(before) {
                    tracing::error!(error = %e, "supervisor: rollback failed");
                }
                self.metrics.supervisor_resyncs.inc();
                if let Err(e) = self.light.resync() {
                    tracing::error!(error = %e, "supervisor: resync failed");
                }
            }
        }
        step.delay
    }

    /// Height the stall tracker starts from. Zero if the light client cannot
    /// report its tip yet; the first tick then counts as progress.
    fn baseline_height(&self) -> u32 {
        match self.light.best_block() {
            Ok(tip) => tip.height,
            Err(e) => {
                tracing::warn!(error = %e, "supervisor: no best block at start, using height 0");
                0
            }
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let initial = self.baseline_height();
        let mut tracker = StallTracker::new(initial);
        let mut delay = self.interval;
        tracing::info!(interval = ?self.interval, height = initial, "supervisor started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = match self.tick(&mut tracker) {
                Delay::Full => self.interval,
                Delay::Half => self.interval / 2,
            };
        }
        tracing::info!("supervisor stopped");
    }
}
