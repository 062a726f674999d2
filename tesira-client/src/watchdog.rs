//! Subscription liveness watchdog
//!
//! A subscription can die silently: the device reboots its control server,
//! a network path flaps, and pushes simply stop. The watchdog probes one
//! random subscribed control point per interval by re-sending its subscribe
//! line. A live subscription answers `-ERR ALREADY_SUBSCRIBED`. If the next
//! tick finds the probe still unanswered, the subscriptions are presumed dead
//! and a full resubscription cycle is requested.
//!
//! When nothing has confirmed at all, usually a misconfigured instance tag,
//! escalations back off exponentially up to [`MAX_UNCONFIRMED_BACKOFF_TICKS`]
//! skipped ticks, and reset as soon as a probe target exists again.
//!
//! [`Watchdog`] is the synchronous state machine; [`WatchdogTask`] drives it
//! from a timer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::control_point::ControlPointId;
use crate::engine::{ProtocolEngine, WatchdogAction};
use crate::event::CycleReason;
use crate::supervisor::ResubscriptionSupervisor;

/// Longest run of ticks skipped between escalations while nothing confirms
pub const MAX_UNCONFIRMED_BACKOFF_TICKS: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Idle,
    Probing { target: ControlPointId },
}

/// Result of one watchdog tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Disabled, suspended, or not armed yet
    Inactive,
    /// Nothing is configured to subscribe to
    NoCandidates,
    /// Nothing confirmed, but the last escalation was too recent
    BackingOff { remaining: u32 },
    Probe(ControlPointId),
    /// The previous probe went unanswered, or nothing ever confirmed
    SuspectedDead { target: Option<ControlPointId> },
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    state: WatchdogState,
    enabled: bool,
    armed: bool,
    suspended: bool,
    unconfirmed_escalations: u32,
    backoff_remaining: u32,
}

impl Watchdog {
    pub fn new(enabled: bool) -> Self {
        Self {
            state: WatchdogState::Idle,
            enabled,
            armed: false,
            suspended: false,
            unconfirmed_escalations: 0,
            backoff_remaining: 0,
        }
    }

    /// Advance the state machine
    ///
    /// `candidates` are the enabled, currently subscribed control points.
    /// `has_targets` says whether any enabled control point is subscribable
    /// at all; with targets but no candidates nothing has confirmed since the
    /// last cycle, which is treated like an unanswered probe.
    pub fn tick<R: Rng + ?Sized>(&mut self, candidates: &[ControlPointId], has_targets: bool, rng: &mut R) -> TickOutcome {
        if !self.enabled || !self.armed || self.suspended {
            return TickOutcome::Inactive;
        }

        match self.state {
            WatchdogState::Probing { target } => {
                self.state = WatchdogState::Idle;
                TickOutcome::SuspectedDead { target: Some(target) }
            }
            WatchdogState::Idle => match candidates.choose(rng) {
                Some(&target) => {
                    self.unconfirmed_escalations = 0;
                    self.backoff_remaining = 0;
                    self.state = WatchdogState::Probing { target };
                    TickOutcome::Probe(target)
                }
                None if has_targets => {
                    if self.backoff_remaining > 0 {
                        self.backoff_remaining -= 1;
                        return TickOutcome::BackingOff {
                            remaining: self.backoff_remaining,
                        };
                    }
                    self.unconfirmed_escalations = self.unconfirmed_escalations.saturating_add(1);
                    self.backoff_remaining = self.backoff_ticks();
                    TickOutcome::SuspectedDead { target: None }
                }
                None => TickOutcome::NoCandidates,
            },
        }
    }

    /// Ticks skipped after the latest escalation with nothing confirmed
    ///
    /// 0 after the first, then 1, 3, 7 and finally [`MAX_UNCONFIRMED_BACKOFF_TICKS`].
    pub fn backoff_ticks(&self) -> u32 {
        let exponent = self.unconfirmed_escalations.saturating_sub(1).min(4);
        ((1u32 << exponent) - 1).min(MAX_UNCONFIRMED_BACKOFF_TICKS)
    }

    /// Record an `ALREADY_SUBSCRIBED` reply; returns whether a probe was open
    pub fn confirm_alive(&mut self) -> bool {
        match self.state {
            WatchdogState::Probing { .. } => {
                self.state = WatchdogState::Idle;
                true
            }
            WatchdogState::Idle => false,
        }
    }

    /// Start ticking; called when a resubscription cycle completes
    pub fn arm(&mut self) {
        self.armed = true;
        self.state = WatchdogState::Idle;
    }

    /// Stop ticking while a cycle runs
    pub fn disarm(&mut self) {
        self.armed = false;
        self.state = WatchdogState::Idle;
    }

    /// Transport went away or is degraded
    pub fn suspend(&mut self) {
        self.suspended = true;
        self.state = WatchdogState::Idle;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    pub fn is_probing(&self) -> bool {
        matches!(self.state, WatchdogState::Probing { .. })
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Background task ticking the engine's watchdog
///
/// Escalations start a resubscription cycle through the supervisor, which
/// ignores the request if a cycle is already running.
pub struct WatchdogTask {
    background_task: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WatchdogTask {
    pub fn start(
        engine: Arc<Mutex<ProtocolEngine>>,
        supervisor: Arc<ResubscriptionSupervisor>,
        period: Duration,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let background_task = tokio::spawn(Self::watchdog_task(engine, supervisor, period, shutdown.clone()));
        Self {
            background_task: Some(background_task),
            shutdown,
        }
    }

    async fn watchdog_task(
        engine: Arc<Mutex<ProtocolEngine>>,
        supervisor: Arc<ResubscriptionSupervisor>,
        period: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let action = engine.lock().watchdog_tick();
                    if action == WatchdogAction::Escalate {
                        supervisor.start_cycle(CycleReason::Watchdog);
                    }
                }
            }
        }
        tracing::debug!("Watchdog task stopped");
    }

    pub fn shutdown(&mut self) {
        self.shutdown.cancel();
        self.background_task.take();
    }
}

impl Drop for WatchdogTask {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn armed() -> Watchdog {
        let mut watchdog = Watchdog::new(true);
        watchdog.arm();
        watchdog
    }

    #[test]
    fn test_probe_then_confirm() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut watchdog = armed();
        let target = ControlPointId::new(4);

        assert_eq!(watchdog.tick(&[target], true, &mut rng), TickOutcome::Probe(target));
        assert!(watchdog.is_probing());
        assert!(watchdog.confirm_alive());
        assert_eq!(watchdog.state(), WatchdogState::Idle);

        // Confirmed before the next tick: probe again, never escalate
        assert_eq!(watchdog.tick(&[target], true, &mut rng), TickOutcome::Probe(target));
    }

    #[test]
    fn test_unanswered_probe_escalates_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut watchdog = armed();
        let target = ControlPointId::new(0);

        watchdog.tick(&[target], true, &mut rng);
        assert_eq!(
            watchdog.tick(&[target], true, &mut rng),
            TickOutcome::SuspectedDead { target: Some(target) }
        );
        assert_eq!(watchdog.state(), WatchdogState::Idle);
        assert!(!watchdog.confirm_alive());
    }

    #[test]
    fn test_inactive_states() {
        let mut rng = StdRng::seed_from_u64(1);
        let target = [ControlPointId::new(0)];

        let mut unarmed = Watchdog::new(true);
        assert_eq!(unarmed.tick(&target, true, &mut rng), TickOutcome::Inactive);

        let mut disabled = Watchdog::new(false);
        disabled.arm();
        assert_eq!(disabled.tick(&target, true, &mut rng), TickOutcome::Inactive);

        let mut watchdog = armed();
        watchdog.tick(&target, true, &mut rng);
        watchdog.suspend();
        assert_eq!(watchdog.state(), WatchdogState::Idle);
        assert_eq!(watchdog.tick(&target, true, &mut rng), TickOutcome::Inactive);
        watchdog.resume();
        assert_eq!(watchdog.tick(&target, true, &mut rng), TickOutcome::Probe(target[0]));

        watchdog.disarm();
        assert!(!watchdog.is_probing());
        assert_eq!(watchdog.tick(&target, true, &mut rng), TickOutcome::Inactive);
    }

    #[test]
    fn test_no_candidates() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut watchdog = armed();
        assert_eq!(watchdog.tick(&[], false, &mut rng), TickOutcome::NoCandidates);
        assert_eq!(
            watchdog.tick(&[], true, &mut rng),
            TickOutcome::SuspectedDead { target: None }
        );
    }

    #[test]
    fn test_unconfirmed_escalations_back_off() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut watchdog = armed();

        let escalated: Vec<bool> = (0..20)
            .map(|_| matches!(watchdog.tick(&[], true, &mut rng), TickOutcome::SuspectedDead { .. }))
            .collect();
        let ticks: Vec<usize> = escalated
            .iter()
            .enumerate()
            .filter_map(|(tick, &escalated)| escalated.then_some(tick))
            .collect();
        assert_eq!(ticks, vec![0, 1, 3, 7, 15]);
        assert_eq!(watchdog.backoff_ticks(), MAX_UNCONFIRMED_BACKOFF_TICKS);

        // The cycle each escalation triggers re-arms without resetting
        watchdog.disarm();
        watchdog.arm();
        assert!(matches!(watchdog.tick(&[], true, &mut rng), TickOutcome::BackingOff { .. }));

        // A confirmed subscription resets the schedule
        let target = ControlPointId::new(2);
        assert_eq!(watchdog.tick(&[target], true, &mut rng), TickOutcome::Probe(target));
        watchdog.confirm_alive();
        assert_eq!(
            watchdog.tick(&[], true, &mut rng),
            TickOutcome::SuspectedDead { target: None }
        );
        assert_eq!(watchdog.backoff_ticks(), 0);
    }

    #[test]
    fn test_target_is_chosen_among_candidates() {
        let mut rng = StdRng::seed_from_u64(42);
        let candidates: Vec<_> = (0..5).map(ControlPointId::new).collect();
        for _ in 0..50 {
            let mut watchdog = armed();
            match watchdog.tick(&candidates, true, &mut rng) {
                TickOutcome::Probe(target) => assert!(candidates.contains(&target)),
                other => panic!("Expected probe, got {other:?}"),
            }
        }
    }
}
