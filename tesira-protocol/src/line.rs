//! Inbound line classification
//!
//! Classification is ordered; the first matching rule wins:
//!
//! 1. session banner (substring)
//! 2. resubscribe sentinel (exact match, if configured)
//! 3. push line (`! ` prefix)
//! 4. acknowledgement (`+OK` prefix)
//! 5. echo of the fire-and-forget command currently in flight
//! 6. device error (`-ERR` substring), with `ALREADY_SUBSCRIBED` split out
//! 7. anything else

use crate::error::Result;
use crate::reply::{self, PushMessage};

/// Banner the device prints when a text protocol session opens
pub const DEFAULT_SESSION_BANNER: &str = "Welcome to the Tesira Text Protocol Server";

/// What an inbound line means to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine<'a> {
    SessionBanner,
    ResubscribeRequest,
    Push(PushMessage<'a>),
    Ack(&'a str),
    Echo(&'a str),
    AlreadySubscribed,
    Error(&'a str),
    Unrecognized(&'a str),
}

impl InboundLine<'_> {
    /// Whether the line completes the command at the head of the queue
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            InboundLine::Ack(_) | InboundLine::Echo(_) | InboundLine::Error(_)
        )
    }
}

/// Strings the classifier matches against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub session_banner: String,
    pub resubscribe_sentinel: Option<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            session_banner: DEFAULT_SESSION_BANNER.to_string(),
            resubscribe_sentinel: None,
        }
    }
}

/// Stateless classifier for inbound lines
#[derive(Debug, Clone, Default)]
pub struct LineClassifier {
    config: ClassifierConfig,
}

impl LineClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify one line
    ///
    /// `pending_echo` is the text of the fire-and-forget command in flight, if
    /// any. A malformed push line is the only error.
    pub fn classify<'a>(&self, line: &'a str, pending_echo: Option<&str>) -> Result<InboundLine<'a>> {
        let line = line.trim();

        if !self.config.session_banner.is_empty() && line.contains(self.config.session_banner.as_str()) {
            return Ok(InboundLine::SessionBanner);
        }

        if let Some(sentinel) = &self.config.resubscribe_sentinel {
            if line == sentinel.as_str() {
                return Ok(InboundLine::ResubscribeRequest);
            }
        }

        if line.starts_with(reply::PUSH_PREFIX) {
            return PushMessage::parse(line).map(InboundLine::Push);
        }

        if line.starts_with(reply::OK_PREFIX) {
            return Ok(InboundLine::Ack(line));
        }

        if let Some(echo) = pending_echo {
            if line == echo.trim() {
                return Ok(InboundLine::Echo(line));
            }
        }

        if line.contains(reply::ERROR_MARKER) {
            if reply::is_already_subscribed(line) {
                return Ok(InboundLine::AlreadySubscribed);
            }
            return Ok(InboundLine::Error(line));
        }

        Ok(InboundLine::Unrecognized(line))
    }
}
