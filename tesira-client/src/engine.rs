//! Line dispatcher and owner of all protocol state
//!
//! The engine is synchronous. Lines go in one at a time through
//! [`ProtocolEngine::handle_line`]; every effect (sending the next queued
//! command, routing a push, confirming a probe) happens before it returns.
//! Lines that need the asynchronous supervisor, the session banner and the
//! resubscribe sentinel, are reported back as an [`EngineSignal`], and so is
//! a connection coming back after a disconnect.
//!
//! Each line is its own error boundary: nothing a single line contains can
//! stop the lines after it from being processed.

use std::collections::HashMap;
use std::sync::Arc;

use tesira_protocol::{InboundLine, LineClassifier};
use tokio::sync::broadcast;

use crate::config::ClientConfig;
use crate::context::ProtocolContext;
use crate::control_point::{ControlPoint, ControlPointId, DeviceInfo, ExpanderInventory};
use crate::error::{ClientError, ControlPointResult, Result};
use crate::event::{Feedback, SessionEvent};
use crate::queue::CommandQueue;
use crate::registry::SubscriptionRegistry;
use crate::transport::{ConnectionState, LineSender};
use crate::watchdog::{TickOutcome, Watchdog};

/// Lines that require the supervisor's attention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSignal {
    SessionStarted,
    ResubscribeRequested,
    /// The transport came back after a disconnect
    Reconnected,
}

/// What a watchdog tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    Idle,
    Probed(ControlPointId),
    /// Subscriptions are presumed dead; a full cycle should run
    Escalate,
}

pub struct ProtocolEngine {
    classifier: LineClassifier,
    context: ProtocolContext,
    points: Vec<Box<dyn ControlPoint>>,
    keys: HashMap<String, ControlPointId>,
    watchdog: Watchdog,
    connection: ConnectionState,
    session_tx: broadcast::Sender<SessionEvent>,
    device_info: ControlPointId,
    inventory: ControlPointId,
}

impl ProtocolEngine {
    pub fn new(
        config: &ClientConfig,
        sender: Arc<dyn LineSender>,
        feedback_tx: broadcast::Sender<Feedback>,
        session_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let connection = if sender.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };

        let mut engine = Self {
            classifier: LineClassifier::new(config.classifier_config()),
            context: ProtocolContext::new(sender, feedback_tx),
            points: Vec::new(),
            keys: HashMap::new(),
            watchdog: Watchdog::new(config.watchdog_enabled),
            connection,
            session_tx,
            device_info: ControlPointId::DETACHED,
            inventory: ControlPointId::DETACHED,
        };
        engine.device_info = engine.attach(Box::new(DeviceInfo::new()));
        engine.inventory = engine.attach(Box::new(ExpanderInventory::new()));
        engine
    }

    /// Add a control point; its key must be unique
    pub fn add_control_point(&mut self, point: Box<dyn ControlPoint>) -> Result<ControlPointId> {
        if self.keys.contains_key(point.key()) {
            return Err(ClientError::DuplicateControlPoint(point.key().to_string()));
        }
        Ok(self.attach(point))
    }

    fn attach(&mut self, mut point: Box<dyn ControlPoint>) -> ControlPointId {
        let id = ControlPointId::new(self.points.len());
        point.base_mut().attach(id);
        tracing::debug!("Added control point {} ({}) as {}", point.key(), point.kind(), id);
        self.keys.insert(point.key().to_string(), id);
        self.points.push(point);
        id
    }

    /// Process one inbound line
    pub fn handle_line(&mut self, line: &str) -> Option<EngineSignal> {
        tracing::trace!("<- {}", line);
        let classified = match self.classifier.classify(line, self.context.queue().pending_echo()) {
            Ok(classified) => classified,
            Err(e) => {
                tracing::warn!("Dropping line: {}", e);
                return None;
            }
        };

        match classified {
            InboundLine::SessionBanner => {
                tracing::info!("Device session started");
                let _ = self.session_tx.send(SessionEvent::SessionStarted);
                Some(EngineSignal::SessionStarted)
            }
            InboundLine::ResubscribeRequest => {
                tracing::info!("Resubscribe requested by device");
                self.context.queue_mut().clear();
                Some(EngineSignal::ResubscribeRequested)
            }
            InboundLine::Push(push) => {
                self.route_push(push.token, push.value);
                None
            }
            InboundLine::Ack(reply) | InboundLine::Echo(reply) | InboundLine::Error(reply) => {
                self.route_reply(reply);
                None
            }
            InboundLine::AlreadySubscribed => {
                if self.watchdog.confirm_alive() {
                    tracing::debug!("Watchdog probe confirmed");
                    let _ = self.session_tx.send(SessionEvent::ProbeConfirmed);
                } else {
                    tracing::debug!("ALREADY_SUBSCRIBED with no probe open");
                }
                None
            }
            InboundLine::Unrecognized(other) => {
                tracing::debug!("Unrecognized line: {}", other);
                None
            }
        }
    }

    fn route_push(&mut self, token: &str, value: &str) {
        let Some(id) = self.context.registry().lookup(token) else {
            tracing::warn!("No control point subscribed as {}, dropping push", token);
            return;
        };
        let Some(point) = self.points.get_mut(id.index()) else {
            tracing::warn!("Token {} routes to missing control point {}", token, id);
            return;
        };

        point.base_mut().confirm_token(token);
        if let Err(e) = point.parse_subscription_message(&mut self.context, token, value) {
            tracing::warn!("{} failed to parse push {} = {}: {}", point.key(), token, value, e);
        }
    }

    fn route_reply(&mut self, reply: &str) {
        let Some(delivery) = self.context.queue_mut().advance(reply) else {
            return;
        };
        let Some(point) = self.points.get_mut(delivery.origin.index()) else {
            tracing::warn!("Reply for missing control point {}: {}", delivery.origin, reply);
            return;
        };

        match point.parse_response(&mut self.context, &delivery.attribute, &delivery.reply) {
            Ok(()) => {
                point.base_mut().confirm_attribute(&delivery.attribute);
            }
            Err(e) => {
                tracing::warn!("{} failed to parse {} reply: {}", point.key(), delivery.attribute, e);
            }
        }
    }

    /// Apply a connection state change from the transport or liveness monitor
    ///
    /// Returns [`EngineSignal::Reconnected`] when the connection comes back
    /// from `Disconnected`; everything subscribed before is presumed lost.
    pub fn set_connection_state(&mut self, state: ConnectionState) -> Option<EngineSignal> {
        if state == self.connection {
            return None;
        }
        tracing::info!("Connection {:?} -> {:?}", self.connection, state);
        let previous = std::mem::replace(&mut self.connection, state);

        match state {
            ConnectionState::Connected => {
                self.watchdog.resume();
                self.context.queue_mut().send_next();
            }
            ConnectionState::Degraded => {
                self.watchdog.suspend();
            }
            ConnectionState::Disconnected => {
                self.context.queue_mut().clear();
                self.watchdog.suspend();
            }
        }
        let _ = self.session_tx.send(SessionEvent::ConnectionChanged(state));

        (previous == ConnectionState::Disconnected && state == ConnectionState::Connected)
            .then_some(EngineSignal::Reconnected)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Advance the watchdog one interval
    pub fn watchdog_tick(&mut self) -> WatchdogAction {
        let candidates: Vec<ControlPointId> = self
            .points
            .iter()
            .filter(|point| point.is_enabled() && point.is_subscribable() && point.is_subscribed())
            .map(|point| point.base().id())
            .collect();
        let has_targets = !self.subscription_targets().is_empty();

        match self.watchdog.tick(&candidates, has_targets, &mut rand::thread_rng()) {
            TickOutcome::Inactive | TickOutcome::NoCandidates => WatchdogAction::Idle,
            TickOutcome::BackingOff { remaining } => {
                tracing::debug!("Nothing confirmed yet, next escalation in {} tick(s)", remaining + 1);
                WatchdogAction::Idle
            }
            TickOutcome::Probe(id) => {
                let Some(point) = self.points.get_mut(id.index()) else {
                    return WatchdogAction::Idle;
                };
                tracing::debug!("Watchdog probing {}", point.key());
                if let Err(e) = point.probe(&mut self.context) {
                    tracing::warn!("Watchdog probe of {} failed: {}", point.key(), e);
                }
                let _ = self.session_tx.send(SessionEvent::ProbeSent {
                    control_point: point.key().to_string(),
                });
                WatchdogAction::Probed(id)
            }
            TickOutcome::SuspectedDead { target } => {
                match target.and_then(|id| self.points.get(id.index())) {
                    Some(point) => tracing::warn!("Watchdog probe of {} went unanswered", point.key()),
                    None => tracing::warn!(
                        "No subscription confirmed since the last cycle, backing off {} tick(s)",
                        self.watchdog.backoff_ticks()
                    ),
                }
                let _ = self.session_tx.send(SessionEvent::SubscriptionsSuspectedDead);
                WatchdogAction::Escalate
            }
        }
    }

    pub fn arm_watchdog(&mut self) {
        self.watchdog.arm();
    }

    pub fn disarm_watchdog(&mut self) {
        self.watchdog.disarm();
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Enabled control points that have something to subscribe to, in order
    pub fn subscription_targets(&self) -> Vec<ControlPointId> {
        self.points
            .iter()
            .filter(|point| point.is_enabled() && point.is_subscribable())
            .map(|point| point.base().id())
            .collect()
    }

    /// Enabled control points the subscribe phase visits, in order
    ///
    /// Points without subscriptions are polled instead. The device identity
    /// and inventory points have their own phases.
    pub fn refresh_targets(&self) -> Vec<ControlPointId> {
        self.points
            .iter()
            .filter(|point| point.is_enabled())
            .map(|point| point.base().id())
            .filter(|&id| id != self.device_info && id != self.inventory)
            .collect()
    }

    pub fn device_info_id(&self) -> ControlPointId {
        self.device_info
    }

    pub fn inventory_id(&self) -> ControlPointId {
        self.inventory
    }

    pub fn id_of(&self, key: &str) -> Result<ControlPointId> {
        self.keys
            .get(key)
            .copied()
            .ok_or_else(|| ClientError::UnknownControlPoint(key.to_string()))
    }

    pub fn control_point(&self, key: &str) -> Option<&dyn ControlPoint> {
        let id = self.keys.get(key)?;
        self.points.get(id.index()).map(|point| point.as_ref())
    }

    /// Run an operation on a control point with access to the protocol context
    pub fn with_control_point<R>(
        &mut self,
        key: &str,
        f: impl FnOnce(&mut dyn ControlPoint, &mut ProtocolContext) -> ControlPointResult<R>,
    ) -> Result<R> {
        let id = self.id_of(key)?;
        self.with_id(id, f)
    }

    /// Like [`ProtocolEngine::with_control_point`], downcast to a concrete group
    pub fn with_typed<T: ControlPoint, R>(
        &mut self,
        key: &str,
        f: impl FnOnce(&mut T, &mut ProtocolContext) -> ControlPointResult<R>,
    ) -> Result<R> {
        let id = self.id_of(key)?;
        let Some(point) = self.points.get_mut(id.index()) else {
            return Err(ClientError::UnknownControlPoint(key.to_string()));
        };
        let Some(typed) = point.as_any_mut().downcast_mut::<T>() else {
            return Err(ClientError::WrongControlPointType {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
            });
        };
        f(typed, &mut self.context).map_err(|source| ClientError::ControlPoint {
            key: key.to_string(),
            source,
        })
    }

    pub fn with_id<R>(
        &mut self,
        id: ControlPointId,
        f: impl FnOnce(&mut dyn ControlPoint, &mut ProtocolContext) -> ControlPointResult<R>,
    ) -> Result<R> {
        let Some(point) = self.points.get_mut(id.index()) else {
            return Err(ClientError::UnknownControlPoint(id.to_string()));
        };
        f(point.as_mut(), &mut self.context).map_err(|source| ClientError::ControlPoint {
            key: point.key().to_string(),
            source,
        })
    }

    pub fn subscribe(&mut self, id: ControlPointId) -> Result<()> {
        self.with_id(id, |point, ctx| point.subscribe(ctx))
    }

    pub fn unsubscribe(&mut self, id: ControlPointId) -> Result<()> {
        self.with_id(id, |point, ctx| point.unsubscribe(ctx))
    }

    pub fn poll(&mut self, id: ControlPointId) -> Result<()> {
        self.with_id(id, |point, ctx| point.poll(ctx))
    }

    /// Subscribe a subscribable point, poll any other
    pub fn refresh(&mut self, id: ControlPointId) -> Result<()> {
        self.with_id(id, |point, ctx| {
            if point.is_subscribable() {
                point.subscribe(ctx)
            } else {
                point.poll(ctx)
            }
        })
    }

    pub fn device_identity(&self) -> crate::control_point::DeviceIdentity {
        self.points
            .get(self.device_info.index())
            .and_then(|point| point.as_any().downcast_ref::<DeviceInfo>())
            .map(|info| info.identity().clone())
            .unwrap_or_default()
    }

    pub fn queue(&self) -> &CommandQueue {
        self.context.queue()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        self.context.registry()
    }

    pub fn control_point_count(&self) -> usize {
        self.points.len()
    }
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("context", &self.context)
            .field("control_points", &self.points.len())
            .field("watchdog", &self.watchdog)
            .field("connection", &self.connection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_point::{ControlPointBase, Crosspoint, Fader, StateControl};
    use crate::test_support::RecordingSender;

    struct Harness {
        engine: ProtocolEngine,
        sender: Arc<RecordingSender>,
        session_rx: broadcast::Receiver<SessionEvent>,
    }

    fn harness() -> Harness {
        let sender = Arc::new(RecordingSender::connected());
        let (feedback_tx, _) = broadcast::channel(64);
        let (session_tx, session_rx) = broadcast::channel(64);
        let engine = ProtocolEngine::new(&ClientConfig::default(), sender.clone(), feedback_tx, session_tx);
        Harness {
            engine,
            sender,
            session_rx,
        }
    }

    fn state(key: &str, tag: &str) -> Box<dyn ControlPoint> {
        Box::new(StateControl::new(ControlPointBase::new(key, tag)))
    }

    #[test]
    fn test_builtins_and_duplicates() {
        let mut h = harness();
        assert_eq!(h.engine.control_point_count(), 2);
        assert!(h.engine.control_point(DeviceInfo::KEY).is_some());
        assert!(h.engine.subscription_targets().is_empty());

        h.engine.add_control_point(state("a", "Logic1")).unwrap();
        assert!(matches!(
            h.engine.add_control_point(state("a", "Logic2")),
            Err(ClientError::DuplicateControlPoint(_))
        ));
        assert!(matches!(
            h.engine.add_control_point(state(DeviceInfo::KEY, "Logic2")),
            Err(ClientError::DuplicateControlPoint(_))
        ));
    }

    #[test]
    fn test_banner_and_sentinel_signals() {
        let sender = Arc::new(RecordingSender::connected());
        let (feedback_tx, _) = broadcast::channel(8);
        let (session_tx, _) = broadcast::channel(8);
        let config = ClientConfig::default().with_resubscribe_sentinel("RESUBSCRIBE");
        let mut engine = ProtocolEngine::new(&config, sender.clone(), feedback_tx, session_tx);

        assert_eq!(
            engine.handle_line("Welcome to the Tesira Text Protocol Server..."),
            Some(EngineSignal::SessionStarted)
        );

        engine.poll(engine.device_info_id()).unwrap();
        assert!(engine.queue().is_in_progress());
        assert_eq!(engine.handle_line("RESUBSCRIBE"), Some(EngineSignal::ResubscribeRequested));
        assert!(engine.queue().is_idle());
        assert!(!engine.queue().is_in_progress());
    }

    #[test]
    fn test_replies_reach_origin() {
        let mut h = harness();
        let id = h
            .engine
            .add_control_point(Box::new(Fader::new(ControlPointBase::new("fader1", "Level1"))))
            .unwrap();

        h.engine.subscribe(id).unwrap();
        assert_eq!(h.engine.handle_line("+OK \"value\":-100.000000"), None);
        assert_eq!(h.engine.handle_line("+OK \"value\":12.000000"), None);
        assert_eq!(
            h.sender.sent(),
            vec![
                "\"Level1\" get minLevel 1",
                "\"Level1\" get maxLevel 1",
                "\"Level1\" subscribe mute 1 Level1__mute1",
                "\"Level1\" subscribe level 1 Level1__level1",
            ]
        );
        assert_eq!(h.engine.registry().len(), 2);

        // Acknowledgements of the subscribe lines
        assert_eq!(h.engine.handle_line("+OK"), None);
        assert_eq!(h.engine.handle_line("+OK"), None);
        assert!(h.engine.queue().is_idle());

        h.engine.handle_line("! \"publishToken\":\"Level1__mute1\" \"value\":false");
        assert!(!h.engine.control_point("fader1").unwrap().is_subscribed());
        h.engine.handle_line("! \"Level1__level1\" -44.000000");
        assert!(h.engine.control_point("fader1").unwrap().is_subscribed());

        let level = h
            .engine
            .with_typed::<Fader, _>("fader1", |fader, _| Ok(fader.level()))
            .unwrap();
        assert_eq!(level, Some(32768));
    }

    #[test]
    fn test_unknown_push_changes_nothing() {
        let mut h = harness();
        h.engine.poll(h.engine.device_info_id()).unwrap();
        let before = format!("{:?}", h.engine.queue());

        assert_eq!(h.engine.handle_line("! \"Nobody__level1\" 1.0"), None);
        assert_eq!(h.engine.handle_line("! garbage"), None);
        assert_eq!(h.engine.handle_line("something else entirely"), None);
        assert_eq!(format!("{:?}", h.engine.queue()), before);
    }

    #[test]
    fn test_failing_parser_still_advances_queue() {
        let mut h = harness();
        h.engine.add_control_point(state("logic", "Logic1")).unwrap();
        h.engine.poll(h.engine.id_of("logic").unwrap()).unwrap();
        h.engine.poll(h.engine.device_info_id()).unwrap();

        h.engine.handle_line("+OK \"value\":not-a-bool");
        assert_eq!(h.sender.sent().last().unwrap(), "DEVICE get serialNumber");
        h.engine.handle_line("-ERR address not found");
        assert_eq!(h.sender.sent().last().unwrap(), "DEVICE get version");
    }

    #[test]
    fn test_watchdog_probe_and_confirm() {
        let mut h = harness();
        let id = h.engine.add_control_point(state("logic", "Logic1")).unwrap();
        h.engine.subscribe(id).unwrap();
        h.engine.handle_line("! \"Logic1__state1\" true");
        h.engine.arm_watchdog();
        h.sender.take();

        assert_eq!(h.engine.watchdog_tick(), WatchdogAction::Probed(id));
        assert_eq!(h.sender.take(), vec!["\"Logic1\" subscribe state 1 Logic1__state1"]);
        assert!(h.engine.control_point("logic").unwrap().is_subscribed());

        h.engine.handle_line("-ERR ALREADY_SUBSCRIBED");
        assert!(!h.engine.watchdog().is_probing());
        assert_eq!(h.engine.watchdog_tick(), WatchdogAction::Probed(id));
        assert_eq!(h.engine.watchdog_tick(), WatchdogAction::Escalate);

        let mut saw_confirm = false;
        while let Ok(event) = h.session_rx.try_recv() {
            saw_confirm |= event == SessionEvent::ProbeConfirmed;
        }
        assert!(saw_confirm);
    }

    #[test]
    fn test_disconnect_clears_queue_and_suspends() {
        let mut h = harness();
        h.engine.arm_watchdog();
        h.engine.poll(h.engine.device_info_id()).unwrap();

        h.sender.set_connected(false);
        assert_eq!(h.engine.set_connection_state(ConnectionState::Disconnected), None);
        assert!(h.engine.queue().is_idle());
        assert!(h.engine.watchdog().is_suspended());

        h.sender.set_connected(true);
        assert_eq!(
            h.engine.set_connection_state(ConnectionState::Connected),
            Some(EngineSignal::Reconnected)
        );
        assert!(!h.engine.watchdog().is_suspended());

        // Recovering from degraded is not a new session
        assert_eq!(h.engine.set_connection_state(ConnectionState::Degraded), None);
        assert!(h.engine.watchdog().is_suspended());
        assert_eq!(h.engine.set_connection_state(ConnectionState::Connected), None);
    }

    #[test]
    fn test_refresh_polls_points_without_subscriptions() {
        let mut h = harness();
        let logic = h.engine.add_control_point(state("logic", "Logic1")).unwrap();
        let crosspoint = h
            .engine
            .add_control_point(Box::new(Crosspoint::new(
                ControlPointBase::new("xp", "Mixer1").with_second_index(2),
            )))
            .unwrap();
        let disabled = StateControl::new(ControlPointBase::new("off", "Logic9").with_enabled(false));
        h.engine.add_control_point(Box::new(disabled)).unwrap();

        assert_eq!(h.engine.subscription_targets(), vec![logic]);
        assert_eq!(h.engine.refresh_targets(), vec![logic, crosspoint]);

        h.engine.refresh(logic).unwrap();
        h.engine.refresh(crosspoint).unwrap();
        assert_eq!(
            h.sender.sent(),
            vec![
                "\"Logic1\" subscribe state 1 Logic1__state1",
                "\"Mixer1\" get crosspointLevelState 1 2",
            ]
        );
    }
}
