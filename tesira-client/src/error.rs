//! Error types for the tesira-client crate.

use tesira_protocol::{ProtocolError, SubscriptionToken};

/// Errors surfaced by the client facade and engine.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No control point is registered under this key
    #[error("Unknown control point: {0}")]
    UnknownControlPoint(String),

    /// Two control points were configured with the same key
    #[error("Duplicate control point key: {0}")]
    DuplicateControlPoint(String),

    /// A control point operation failed
    #[error("Control point {key} failed: {source}")]
    ControlPoint {
        key: String,
        #[source]
        source: ControlPointError,
    },

    /// The control point exists but is not of the requested type
    #[error("Control point {key} is not a {expected}")]
    WrongControlPointType { key: String, expected: &'static str },

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors from the generic control point contract and attribute groups.
#[derive(Debug, thiserror::Error)]
pub enum ControlPointError {
    /// A reply or push could not be interpreted
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Token registration failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The command could not be handed to the transport
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A bounded-range value was used before its bounds were discovered
    #[error("Range bounds for {attribute} are not known yet")]
    BoundsUnknown { attribute: String },

    /// The attribute group doesn't support the requested operation
    #[error("Unsupported operation {operation} for attribute {attribute}")]
    Unsupported {
        operation: &'static str,
        attribute: String,
    },

    /// A push arrived for a token this control point never issued
    #[error("Unexpected subscription token: {0}")]
    UnexpectedToken(SubscriptionToken),
}

/// Errors from the subscription registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The token already routes to a different control point
    #[error("Token {token} is already registered to {existing}, rejected for {requested}")]
    TokenConflict {
        token: SubscriptionToken,
        existing: String,
        requested: String,
    },
}

/// Errors from the send primitive.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport is not connected
    #[error("Transport is not connected")]
    NotConnected,

    /// The writer side of the transport has gone away
    #[error("Transport channel closed")]
    ChannelClosed,

    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Result type for control point operations.
pub type ControlPointResult<T> = std::result::Result<T, ControlPointError>;
