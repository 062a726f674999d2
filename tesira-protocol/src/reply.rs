//! Reply and push line parsing
//!
//! The device answers commands with `+OK` (optionally followed by a value) or
//! `-ERR <reason>`, and reports subscribed attribute changes with `!` push lines.
//! Values come in two spellings depending on firmware and session mode:
//!
//! ```text
//! +OK "value":-12.000000          ! "publishToken":"Tag1__level1" "value":-12.000000
//! +OK -12.000000                  ! "Tag1__level1" -12.000000
//! ```
//!
//! Both are accepted everywhere.

use crate::error::{ProtocolError, Result};

pub const OK_PREFIX: &str = "+OK";
pub const ERROR_MARKER: &str = "-ERR";
pub const PUSH_PREFIX: &str = "! ";
pub const ALREADY_SUBSCRIBED: &str = "ALREADY_SUBSCRIBED";

const VALUE_KEY: &str = "\"value\":";
const PUBLISH_TOKEN_KEY: &str = "\"publishToken\":";

/// A parsed push line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage<'a> {
    pub token: &'a str,
    pub value: &'a str,
}

impl<'a> PushMessage<'a> {
    /// Parse a line starting with the push marker
    pub fn parse(line: &'a str) -> Result<Self> {
        let malformed = || ProtocolError::MalformedPush(line.to_string());

        let rest = line.strip_prefix(PUSH_PREFIX).ok_or_else(malformed)?.trim_start();
        let rest = rest.strip_prefix(PUBLISH_TOKEN_KEY).unwrap_or(rest);
        let rest = rest.strip_prefix('"').ok_or_else(malformed)?;
        let (token, rest) = rest.split_once('"').ok_or_else(malformed)?;

        let rest = rest.trim_start();
        let rest = rest.strip_prefix(VALUE_KEY).unwrap_or(rest);
        let value = unquote(rest.trim());

        if token.is_empty() || value.is_empty() {
            return Err(malformed());
        }

        Ok(Self { token, value })
    }
}

/// Value carried by a `+OK` reply, if any
pub fn ok_value(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix(OK_PREFIX)?.trim();
    let rest = rest.strip_prefix(VALUE_KEY).unwrap_or(rest).trim();
    if rest.is_empty() {
        None
    } else {
        Some(unquote(rest))
    }
}

/// Reason text following `-ERR`, empty when the error is bare
pub fn error_reason(line: &str) -> &str {
    line.split_once(ERROR_MARKER)
        .map(|(_, reason)| reason.trim())
        .unwrap_or("")
}

pub fn is_already_subscribed(line: &str) -> bool {
    line.contains(ERROR_MARKER) && error_reason(line).starts_with(ALREADY_SUBSCRIBED)
}

/// Extract the value of a reply to a `get`
///
/// Device errors and bare acknowledgements are reported as errors so response
/// parsers can log them without special-casing.
pub fn reply_value(line: &str) -> Result<&str> {
    if line.contains(ERROR_MARKER) {
        return Err(ProtocolError::DeviceError(line.trim().to_string()));
    }
    ok_value(line).ok_or_else(|| ProtocolError::MissingValue(line.trim().to_string()))
}

/// Strip one pair of surrounding double quotes
pub fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

pub fn parse_bool(attribute: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(attribute, value)),
    }
}

pub fn parse_f64(attribute: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(attribute, value))
}

pub fn parse_i64(attribute: &str, value: &str) -> Result<i64> {
    value.trim().parse::<i64>().map_err(|_| invalid(attribute, value))
}

fn invalid(attribute: &str, value: &str) -> ProtocolError {
    ProtocolError::InvalidValue {
        attribute: attribute.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("! \"Tag1__level1\" -12.000000", "Tag1__level1", "-12.000000")]
    #[case("! \"publishToken\":\"Tag1__level1\" \"value\":-12.000000", "Tag1__level1", "-12.000000")]
    #[case("! \"publishToken\":\"Tag1__mute1\" \"value\":true", "Tag1__mute1", "true")]
    #[case("! \"Status1__callState1\" \"IDLE\"", "Status1__callState1", "IDLE")]
    fn test_push_parse(#[case] line: &str, #[case] token: &str, #[case] value: &str) {
        let push = PushMessage::parse(line).unwrap();
        assert_eq!(push.token, token);
        assert_eq!(push.value, value);
    }

    #[rstest]
    #[case("! ")]
    #[case("! Tag1__level1 -12")]
    #[case("! \"Tag1__level1")]
    #[case("! \"Tag1__level1\"")]
    #[case("! \"\" 4")]
    #[case("+OK")]
    fn test_push_parse_malformed(#[case] line: &str) {
        assert!(matches!(
            PushMessage::parse(line),
            Err(ProtocolError::MalformedPush(_))
        ));
    }

    #[rstest]
    #[case("+OK", None)]
    #[case("+OK 0.5", Some("0.5"))]
    #[case("+OK \"value\":-100.000000", Some("-100.000000"))]
    #[case("+OK \"value\":\"ABC123\"", Some("ABC123"))]
    #[case("+OK false  ", Some("false"))]
    fn test_ok_value(#[case] line: &str, #[case] expected: Option<&str>) {
        assert_eq!(ok_value(line), expected);
    }

    #[test]
    fn test_error_reason() {
        assert_eq!(error_reason("-ERR ALREADY_SUBSCRIBED"), "ALREADY_SUBSCRIBED");
        assert_eq!(error_reason("-ERR"), "");
        assert!(is_already_subscribed("-ERR ALREADY_SUBSCRIBED"));
        assert!(!is_already_subscribed("-ERR address not found: {\"deviceId\":0}"));
    }

    #[test]
    fn test_reply_value() {
        assert_eq!(reply_value("+OK \"value\":true").unwrap(), "true");
        assert!(matches!(reply_value("+OK"), Err(ProtocolError::MissingValue(_))));
        assert!(matches!(
            reply_value("-ERR INVALID_PARAMETER"),
            Err(ProtocolError::DeviceError(_))
        ));
    }

    #[test]
    fn test_value_parsers() {
        assert!(parse_bool("mute", "true").unwrap());
        assert!(!parse_bool("mute", "FALSE").unwrap());
        assert!(parse_bool("mute", "yes").is_err());
        assert_eq!(parse_f64("level", "-12.000000").unwrap(), -12.0);
        assert!(parse_f64("level", "NaN").is_err());
        assert_eq!(parse_i64("input", " 3 ").unwrap(), 3);
        assert!(parse_i64("input", "three").is_err());
    }
}
