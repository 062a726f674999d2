use thiserror::Error;

/// Errors raised while interpreting protocol text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A `!` push line without a quoted token or without a value
    #[error("Malformed push line: {0}")]
    MalformedPush(String),

    /// A reply that should carry a value but doesn't
    #[error("Reply carries no value: {0}")]
    MissingValue(String),

    /// A value that can't be interpreted for the attribute it belongs to
    #[error("Invalid value '{value}' for attribute {attribute}")]
    InvalidValue { attribute: String, value: String },

    /// A device error reply delivered where a value was expected
    #[error("Device reported error: {0}")]
    DeviceError(String),

    /// A subscription token that doesn't follow the `<tag>__<attribute><index>` shape
    #[error("Invalid subscription token: {0}")]
    InvalidToken(String),
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ProtocolError::MalformedPush("! nothing".to_string());
        assert_eq!(error.to_string(), "Malformed push line: ! nothing");

        let error = ProtocolError::InvalidValue {
            attribute: "mute".to_string(),
            value: "maybe".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid value 'maybe' for attribute mute");

        let error = ProtocolError::DeviceError("-ERR address not found".to_string());
        assert!(error.to_string().contains("address not found"));
    }
}
