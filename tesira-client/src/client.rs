//! Client facade
//!
//! [`TesiraClient`] ties the engine, the resubscription supervisor and the
//! watchdog task together behind a small API. It doesn't own a transport: feed
//! it lines and connection changes, or hand it a [`TransportEvent`] receiver
//! and call [`TesiraClient::run`].

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::context::ProtocolContext;
use crate::control_point::{
    build_control_point, ControlPoint, ControlPointConfig, ControlPointId, DeviceIdentity, DeviceInfo,
};
use crate::engine::{EngineSignal, ProtocolEngine};
use crate::error::{ClientError, ControlPointResult, Result};
use crate::event::{CycleReason, Feedback, SessionEvent};
use crate::supervisor::ResubscriptionSupervisor;
use crate::transport::{ConnectionState, LineSender, TransportEvent};
use crate::watchdog::WatchdogTask;

pub struct TesiraClient {
    config: ClientConfig,
    engine: Arc<Mutex<ProtocolEngine>>,
    supervisor: Arc<ResubscriptionSupervisor>,
    watchdog: Mutex<Option<WatchdogTask>>,
    feedback_tx: broadcast::Sender<Feedback>,
    session_tx: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
}

impl TesiraClient {
    /// Create a client; must be called from within a tokio runtime
    pub fn new(config: ClientConfig, sender: Arc<dyn LineSender>) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            ClientError::Configuration(format!("TesiraClient must be created inside a tokio runtime: {e}"))
        })?;

        let (feedback_tx, _) = broadcast::channel(config.event_buffer_size);
        let (session_tx, _) = broadcast::channel(config.event_buffer_size);

        let engine = Arc::new(Mutex::new(ProtocolEngine::new(
            &config,
            sender,
            feedback_tx.clone(),
            session_tx.clone(),
        )));
        let supervisor = Arc::new(ResubscriptionSupervisor::new(
            Arc::clone(&engine),
            session_tx.clone(),
            &config,
            runtime,
        ));

        let watchdog = config.watchdog_enabled.then(|| {
            WatchdogTask::start(
                Arc::clone(&engine),
                Arc::clone(&supervisor),
                config.watchdog_interval,
            )
        });

        tracing::debug!("Created Tesira client with {:?}", config);
        Ok(Self {
            config,
            engine,
            supervisor,
            watchdog: Mutex::new(watchdog),
            feedback_tx,
            session_tx,
            shutdown: CancellationToken::new(),
        })
    }

    /// Create a client and add control points from their definitions
    pub fn with_control_points(
        config: ClientConfig,
        sender: Arc<dyn LineSender>,
        definitions: &[ControlPointConfig],
    ) -> Result<Self> {
        let client = Self::new(config, sender)?;
        for definition in definitions {
            let point = build_control_point(definition, &client.config)?;
            client.add_control_point(point)?;
        }
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn add_control_point(&self, point: Box<dyn ControlPoint>) -> Result<ControlPointId> {
        self.engine.lock().add_control_point(point)
    }

    /// Process one inbound line
    pub fn handle_line(&self, line: &str) {
        let signal = self.engine.lock().handle_line(line);
        self.dispatch(signal);
    }

    /// Apply a connection state change
    ///
    /// Disconnecting abandons any running cycle before the queue is cleared.
    /// Coming back from a disconnect starts a fresh cycle; links without a
    /// session banner, such as serial, rely on this.
    pub fn set_connection_state(&self, state: ConnectionState) {
        if state == ConnectionState::Disconnected {
            self.supervisor.abandon();
        }
        let signal = self.engine.lock().set_connection_state(state);
        self.dispatch(signal);
    }

    fn dispatch(&self, signal: Option<EngineSignal>) {
        let reason = match signal {
            Some(EngineSignal::SessionStarted) => CycleReason::SessionStarted,
            Some(EngineSignal::ResubscribeRequested) => CycleReason::Sentinel,
            Some(EngineSignal::Reconnected) => CycleReason::Reconnected,
            None => return,
        };
        self.supervisor.start_cycle(reason);
    }

    /// Consume transport events until the channel closes or the client shuts down
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(TransportEvent::Line(line)) => self.handle_line(&line),
                    Some(TransportEvent::Connected) => self.set_connection_state(ConnectionState::Connected),
                    Some(TransportEvent::Disconnected) => self.set_connection_state(ConnectionState::Disconnected),
                    None => {
                        tracing::debug!("Transport event channel closed");
                        self.set_connection_state(ConnectionState::Disconnected);
                        break;
                    }
                },
            }
        }
    }

    /// Unsubscribe and resubscribe everything; no-op while a cycle runs
    pub fn resubscribe_all(&self) -> bool {
        self.supervisor.start_cycle(CycleReason::Operator)
    }

    pub fn is_cycle_running(&self) -> bool {
        self.supervisor.is_running()
    }

    pub fn feedback(&self) -> broadcast::Receiver<Feedback> {
        self.feedback_tx.subscribe()
    }

    pub fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.engine.lock().connection_state()
    }

    pub fn request_get(&self, key: &str, attribute: &str) -> Result<()> {
        self.engine
            .lock()
            .with_control_point(key, |point, ctx| point.request_get(ctx, attribute))
    }

    pub fn request_set(&self, key: &str, attribute: &str, value: &str) -> Result<()> {
        self.engine
            .lock()
            .with_control_point(key, |point, ctx| point.request_set(ctx, attribute, value))
    }

    pub fn request_toggle(&self, key: &str, attribute: &str) -> Result<()> {
        self.engine
            .lock()
            .with_control_point(key, |point, ctx| point.request_toggle(ctx, attribute))
    }

    pub fn request_increment(&self, key: &str, attribute: &str, step: &str) -> Result<()> {
        self.engine
            .lock()
            .with_control_point(key, |point, ctx| point.request_increment(ctx, attribute, step))
    }

    pub fn request_decrement(&self, key: &str, attribute: &str, step: &str) -> Result<()> {
        self.engine
            .lock()
            .with_control_point(key, |point, ctx| point.request_decrement(ctx, attribute, step))
    }

    pub fn subscribe(&self, key: &str) -> Result<()> {
        self.engine
            .lock()
            .with_control_point(key, |point, ctx| point.subscribe(ctx))
    }

    pub fn unsubscribe(&self, key: &str) -> Result<()> {
        self.engine
            .lock()
            .with_control_point(key, |point, ctx| point.unsubscribe(ctx))
    }

    pub fn poll(&self, key: &str) -> Result<()> {
        self.engine
            .lock()
            .with_control_point(key, |point, ctx| point.poll(ctx))
    }

    pub fn is_subscribed(&self, key: &str) -> Result<bool> {
        let engine = self.engine.lock();
        engine
            .control_point(key)
            .map(|point| point.is_subscribed())
            .ok_or_else(|| ClientError::UnknownControlPoint(key.to_string()))
    }

    /// Run group-specific operations on a control point
    ///
    /// ```rust,no_run
    /// # use tesira_client::{Fader, TesiraClient};
    /// # fn example(client: &TesiraClient) -> tesira_client::Result<()> {
    /// client.with_control_point::<Fader, _>("fader1", |fader, ctx| fader.set_level(ctx, 40_000))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_control_point<T: ControlPoint, R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut T, &mut ProtocolContext) -> ControlPointResult<R>,
    ) -> Result<R> {
        self.engine.lock().with_typed(key, f)
    }

    pub fn recall_preset(&self, preset_id: u32) -> Result<()> {
        self.with_control_point::<DeviceInfo, _>(DeviceInfo::KEY, |info, ctx| {
            info.recall_preset(ctx, preset_id);
            Ok(())
        })
    }

    pub fn recall_preset_by_name(&self, name: &str) -> Result<()> {
        self.with_control_point::<DeviceInfo, _>(DeviceInfo::KEY, |info, ctx| {
            info.recall_preset_by_name(ctx, name);
            Ok(())
        })
    }

    pub fn device_identity(&self) -> DeviceIdentity {
        self.engine.lock().device_identity()
    }

    /// Shared engine, for callers that need to batch several operations
    pub fn engine(&self) -> &Arc<Mutex<ProtocolEngine>> {
        &self.engine
    }

    /// Stop the watchdog and any running cycle
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        tracing::debug!("Shutting down Tesira client");
        self.shutdown.cancel();
        self.supervisor.abandon();
        if let Some(mut watchdog) = self.watchdog.lock().take() {
            watchdog.shutdown();
        }
    }
}

impl Drop for TesiraClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TesiraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TesiraClient")
            .field("config", &self.config)
            .field("supervisor", &self.supervisor)
            .finish()
    }
}
