//! Events published by the client
//!
//! [`Feedback`] carries attribute values parsed from replies and push lines.
//! [`SessionEvent`] reports session, watchdog and resubscription lifecycle.
//! Both are delivered on `tokio::sync::broadcast` channels.

use crate::transport::ConnectionState;

/// Value of one attribute as reported by the device
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackValue {
    Bool(bool),
    /// Level scaled to 0..=65535 across the discovered range
    Level(u16),
    Decibels(f64),
    Integer(i64),
    Text(String),
}

/// An attribute value change for one control point
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub control_point: String,
    pub attribute: String,
    pub value: FeedbackValue,
}

impl Feedback {
    pub fn new(control_point: impl Into<String>, attribute: impl Into<String>, value: FeedbackValue) -> Self {
        Self {
            control_point: control_point.into(),
            attribute: attribute.into(),
            value,
        }
    }
}

/// Why a resubscription cycle was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleReason {
    /// The device printed its session banner
    SessionStarted,
    /// The configured resubscribe sentinel was received
    Sentinel,
    /// The watchdog's probe went unanswered
    Watchdog,
    /// Requested through the public API
    Operator,
    /// The transport came back after a disconnect
    Reconnected,
}

/// Steps of a resubscription cycle, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CyclePhase {
    Unsubscribe,
    Subscribe,
    DeviceInfo,
    Inventory,
}

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SessionStarted,
    ConnectionChanged(ConnectionState),
    CycleStarted(CycleReason),
    CyclePhaseStarted(CyclePhase),
    CycleCompleted,
    CycleAbandoned,
    ProbeSent { control_point: String },
    ProbeConfirmed,
    SubscriptionsSuspectedDead,
}
