//! Command line construction
//!
//! All outbound text is produced here from a verb, an attribute code, a target
//! and an optional value. Layout decisions come from [`crate::attribute::format_rule`].

use std::fmt;

use crate::attribute::{self, FormatRule};
use crate::token::SubscriptionToken;

/// Command verbs understood by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Set,
    Toggle,
    Increment,
    Decrement,
    Subscribe,
    Unsubscribe,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Set => "set",
            Verb::Toggle => "toggle",
            Verb::Increment => "increment",
            Verb::Decrement => "decrement",
            Verb::Subscribe => "subscribe",
            Verb::Unsubscribe => "unsubscribe",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addressing for one command: instance tag plus up to two indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTarget<'a> {
    pub tag: &'a str,
    pub index1: u32,
    pub index2: u32,
}

impl<'a> CommandTarget<'a> {
    pub fn new(tag: &'a str, index1: u32) -> Self {
        Self {
            tag,
            index1,
            index2: 0,
        }
    }

    pub fn with_second_index(mut self, index2: u32) -> Self {
        self.index2 = index2;
        self
    }

    /// Target for device-scope commands
    pub fn device() -> CommandTarget<'static> {
        CommandTarget {
            tag: attribute::DEVICE_TAG,
            index1: 0,
            index2: 0,
        }
    }
}

/// Build a command line (without terminator)
///
/// # Example
///
/// ```rust
/// use tesira_protocol::command::{build, CommandTarget, Verb};
///
/// let target = CommandTarget::new("Mixer1", 2).with_second_index(3);
/// assert_eq!(
///     build(Verb::Toggle, "crosspointLevelState", &target, None),
///     "\"Mixer1\" toggle crosspointLevelState 2 3"
/// );
/// assert_eq!(
///     build(Verb::Get, "serialNumber", &CommandTarget::device(), None),
///     "DEVICE get serialNumber"
/// );
/// ```
pub fn build(verb: Verb, attribute: &str, target: &CommandTarget<'_>, value: Option<&str>) -> String {
    let rule = attribute::format_rule(attribute);
    let mut parts: Vec<String> = Vec::with_capacity(6);

    if rule.is_device_scope() {
        parts.push(attribute::DEVICE_TAG.to_string());
    } else {
        parts.push(quote(target.tag));
    }

    if !rule.omits_verb() {
        parts.push(verb.as_str().to_string());
    }

    parts.push(attribute.to_string());

    match rule {
        FormatRule::Indexed => parts.push(target.index1.to_string()),
        FormatRule::DualIndex | FormatRule::DualIndexAction => {
            parts.push(target.index1.to_string());
            parts.push(target.index2.to_string());
        }
        FormatRule::Standard | FormatRule::Device | FormatRule::DeviceAction => {}
    }

    if let Some(value) = value {
        parts.push(value.to_string());
    }

    parts.join(" ")
}

/// Build a subscribe line
///
/// `"<tag>" subscribe <attr> [<index>] <customName> [<responseRateMs>]`
pub fn build_subscribe(
    attribute: &str,
    target: &CommandTarget<'_>,
    token: &SubscriptionToken,
    response_rate_ms: Option<u32>,
) -> String {
    let mut line = subscription_prefix(Verb::Subscribe, attribute, target);
    line.push(' ');
    line.push_str(token.as_str());
    if let Some(rate) = response_rate_ms {
        line.push(' ');
        line.push_str(&rate.to_string());
    }
    line
}

/// Build an unsubscribe line
///
/// `"<tag>" unsubscribe <attr> [<index>] <customName>`
pub fn build_unsubscribe(attribute: &str, target: &CommandTarget<'_>, token: &SubscriptionToken) -> String {
    let mut line = subscription_prefix(Verb::Unsubscribe, attribute, target);
    line.push(' ');
    line.push_str(token.as_str());
    line
}

fn subscription_prefix(verb: Verb, attribute: &str, target: &CommandTarget<'_>) -> String {
    match attribute::format_rule(attribute) {
        FormatRule::Indexed | FormatRule::DualIndex | FormatRule::DualIndexAction => format!(
            "{} {} {} {}",
            quote(target.tag),
            verb,
            attribute,
            target.index1
        ),
        _ => format!("{} {} {}", quote(target.tag), verb, attribute),
    }
}

/// Wrap a value in double quotes, escaping embedded quotes
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}
