//! Full resubscription cycles
//!
//! A cycle rebuilds every subscription from scratch:
//!
//! 1. unsubscribe every enabled subscribable control point
//! 2. subscribe every enabled control point, polling the ones that have
//!    nothing to subscribe to
//! 3. poll device identity
//! 4. poll the expander inventory
//! 5. arm the watchdog
//!
//! Steps are paced: each one waits the pacing delay and then, up to the
//! settle timeout, for the command queue to drain, so a fader's range
//! discovery finishes before the next control point starts talking.
//!
//! At most one cycle runs at a time. Disconnecting abandons it; reconnecting
//! or the next session banner starts over from step 1.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::control_point::ControlPointId;
use crate::engine::ProtocolEngine;
use crate::event::{CycleReason, CyclePhase, SessionEvent};

/// Marker for a cycle that was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cancelled;

#[derive(Debug, Default)]
struct CycleSlot {
    generation: u64,
    active: Option<CancellationToken>,
}

pub struct ResubscriptionSupervisor {
    engine: Arc<Mutex<ProtocolEngine>>,
    session_tx: broadcast::Sender<SessionEvent>,
    pacing_delay: Duration,
    settle_timeout: Duration,
    slot: Mutex<CycleSlot>,
    runtime: Handle,
}

impl ResubscriptionSupervisor {
    pub fn new(
        engine: Arc<Mutex<ProtocolEngine>>,
        session_tx: broadcast::Sender<SessionEvent>,
        config: &ClientConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            engine,
            session_tx,
            pacing_delay: config.pacing_delay,
            settle_timeout: config.queue_settle_timeout,
            slot: Mutex::new(CycleSlot::default()),
            runtime,
        }
    }

    /// Start a cycle unless one is already running
    ///
    /// Returns whether a new cycle was started.
    pub fn start_cycle(self: &Arc<Self>, reason: CycleReason) -> bool {
        let (generation, cancel) = {
            let mut slot = self.slot.lock();
            if slot.active.is_some() {
                tracing::debug!("Resubscription cycle already running, ignoring {:?}", reason);
                return false;
            }
            slot.generation += 1;
            let cancel = CancellationToken::new();
            slot.active = Some(cancel.clone());
            (slot.generation, cancel)
        };

        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            this.run_cycle(generation, reason, cancel).await;
        });
        true
    }

    /// Cancel the running cycle, if any
    pub fn abandon(&self) {
        let cancel = self.slot.lock().active.take();
        if let Some(cancel) = cancel {
            cancel.cancel();
            tracing::info!("Resubscription cycle abandoned");
            let _ = self.session_tx.send(SessionEvent::CycleAbandoned);
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot.lock().active.is_some()
    }

    async fn run_cycle(self: Arc<Self>, generation: u64, reason: CycleReason, cancel: CancellationToken) {
        let outcome = self.execute(reason, &cancel).await;

        {
            let mut slot = self.slot.lock();
            // An abandoned cycle's slot may already belong to a newer one
            if slot.generation == generation {
                slot.active = None;
            }
        }

        match outcome {
            Ok(()) => {
                tracing::info!("Resubscription cycle complete");
                let _ = self.session_tx.send(SessionEvent::CycleCompleted);
            }
            Err(Cancelled) => {
                tracing::debug!("Resubscription cycle {} stopped early", generation);
            }
        }
    }

    async fn execute(&self, reason: CycleReason, cancel: &CancellationToken) -> Result<(), Cancelled> {
        tracing::info!("Starting resubscription cycle ({:?})", reason);
        let _ = self.session_tx.send(SessionEvent::CycleStarted(reason));

        let (targets, refresh, device_info, inventory) = self.step(cancel, |engine| {
            engine.disarm_watchdog();
            (
                engine.subscription_targets(),
                engine.refresh_targets(),
                engine.device_info_id(),
                engine.inventory_id(),
            )
        })?;

        self.phase(CyclePhase::Unsubscribe);
        for &id in &targets {
            self.pace(cancel).await?;
            self.step(cancel, |engine| log_failure(id, engine.unsubscribe(id)))?;
        }

        self.phase(CyclePhase::Subscribe);
        for &id in &refresh {
            self.pace(cancel).await?;
            self.step(cancel, |engine| log_failure(id, engine.refresh(id)))?;
        }

        self.phase(CyclePhase::DeviceInfo);
        self.pace(cancel).await?;
        self.step(cancel, |engine| log_failure(device_info, engine.poll(device_info)))?;

        self.phase(CyclePhase::Inventory);
        self.pace(cancel).await?;
        self.step(cancel, |engine| log_failure(inventory, engine.poll(inventory)))?;

        self.pace(cancel).await?;
        self.step(cancel, |engine| engine.arm_watchdog())
    }

    fn phase(&self, phase: CyclePhase) {
        tracing::debug!("Resubscription phase {:?}", phase);
        let _ = self.session_tx.send(SessionEvent::CyclePhaseStarted(phase));
    }

    /// Wait the pacing delay, then for the queue to drain (bounded)
    async fn pace(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let deadline = Instant::now() + self.settle_timeout;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = sleep(self.pacing_delay) => {}
            }

            if self.engine.lock().queue().is_idle() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                tracing::warn!("Command queue did not drain within {:?}, continuing", self.settle_timeout);
                return Ok(());
            }
        }
    }

    /// Run one step against the engine unless the cycle was cancelled
    fn step<R>(&self, cancel: &CancellationToken, f: impl FnOnce(&mut ProtocolEngine) -> R) -> Result<R, Cancelled> {
        let mut engine = self.engine.lock();
        // Checked under the lock so a disconnect handled on another task wins
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(f(&mut engine))
    }
}

fn log_failure(id: ControlPointId, result: crate::error::Result<()>) {
    if let Err(e) = result {
        tracing::warn!("Resubscription step for {} failed: {}", id, e);
    }
}

impl std::fmt::Debug for ResubscriptionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResubscriptionSupervisor")
            .field("pacing_delay", &self.pacing_delay)
            .field("settle_timeout", &self.settle_timeout)
            .field("slot", &*self.slot.lock())
            .finish()
    }
}
