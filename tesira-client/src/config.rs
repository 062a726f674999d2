//! Configuration types for the tesira-client crate
//!
//! [`ClientConfig`] controls session detection, watchdog timing and the pacing
//! of resubscription cycles. Control point definitions live in
//! [`crate::control_point::ControlPointConfig`].

use std::time::Duration;

use tesira_protocol::{ClassifierConfig, DEFAULT_SESSION_BANNER};

use crate::error::ClientError;

/// Configuration for the protocol engine and its supervisor
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Substring identifying the device's session banner
    /// Default: "Welcome to the Tesira Text Protocol Server"
    pub session_banner: String,

    /// Line that, when received verbatim, forces a full resubscribe
    /// Default: None
    pub resubscribe_sentinel: Option<String>,

    /// Period between watchdog probes
    /// Default: 90 seconds
    pub watchdog_interval: Duration,

    /// Enable the subscription watchdog
    /// Default: true
    pub watchdog_enabled: bool,

    /// Delay between consecutive steps of a resubscription cycle
    /// Default: 250 milliseconds
    pub pacing_delay: Duration,

    /// Longest a cycle step waits for the command queue to drain
    /// Default: 5 seconds
    pub queue_settle_timeout: Duration,

    /// Buffer size for the feedback and session event channels
    /// Default: 512
    pub event_buffer_size: usize,

    /// Response rate requested for meter subscriptions, in milliseconds
    /// Default: 250
    pub meter_response_rate_ms: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            session_banner: DEFAULT_SESSION_BANNER.to_string(),
            resubscribe_sentinel: None,
            watchdog_interval: Duration::from_secs(90),
            watchdog_enabled: true,
            pacing_delay: Duration::from_millis(250),
            queue_settle_timeout: Duration::from_secs(5),
            event_buffer_size: 512,
            meter_response_rate_ms: 250,
        }
    }
}

impl ClientConfig {
    /// Create a new ClientConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ClientConfig for serial links, which are slower to drain
    pub fn serial() -> Self {
        Self {
            pacing_delay: Duration::from_millis(500),
            queue_settle_timeout: Duration::from_secs(10),
            meter_response_rate_ms: 1000,
            ..Default::default()
        }
    }

    /// Create a ClientConfig without the watchdog
    pub fn no_watchdog() -> Self {
        Self {
            watchdog_enabled: false,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.session_banner.trim().is_empty() {
            return Err(ClientError::Configuration(
                "Session banner must not be empty".to_string(),
            ));
        }

        if let Some(sentinel) = &self.resubscribe_sentinel {
            if sentinel.trim().is_empty() {
                return Err(ClientError::Configuration(
                    "Resubscribe sentinel must not be blank when set".to_string(),
                ));
            }
            if sentinel.starts_with("+OK") || sentinel.starts_with("! ") || sentinel.contains("-ERR") {
                return Err(ClientError::Configuration(format!(
                    "Resubscribe sentinel '{sentinel}' collides with protocol replies"
                )));
            }
        }

        if self.watchdog_enabled && self.watchdog_interval.is_zero() {
            return Err(ClientError::Configuration(
                "Watchdog interval must be greater than 0".to_string(),
            ));
        }

        if self.pacing_delay.is_zero() {
            return Err(ClientError::Configuration(
                "Pacing delay must be greater than 0".to_string(),
            ));
        }

        if self.watchdog_enabled && self.pacing_delay >= self.watchdog_interval {
            return Err(ClientError::Configuration(
                "Pacing delay must be shorter than the watchdog interval".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(ClientError::Configuration(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Classifier settings derived from this configuration
    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            session_banner: self.session_banner.clone(),
            resubscribe_sentinel: self.resubscribe_sentinel.clone(),
        }
    }

    pub fn with_resubscribe_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.resubscribe_sentinel = Some(sentinel.into());
        self
    }

    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval;
        self
    }

    pub fn with_watchdog(mut self, enabled: bool) -> Self {
        self.watchdog_enabled = enabled;
        self
    }

    pub fn with_pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay = delay;
        self
    }

    pub fn with_queue_settle_timeout(mut self, timeout: Duration) -> Self {
        self.queue_settle_timeout = timeout;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.session_banner, DEFAULT_SESSION_BANNER);
        assert_eq!(config.watchdog_interval, Duration::from_secs(90));
        assert!(config.resubscribe_sentinel.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid = ClientConfig {
            pacing_delay: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = ClientConfig::default().with_resubscribe_sentinel("+OK");
        assert!(invalid.validate().is_err());

        let invalid = ClientConfig::default()
            .with_watchdog_interval(Duration::from_millis(100))
            .with_pacing_delay(Duration::from_millis(200));
        assert!(invalid.validate().is_err());

        // Pacing vs watchdog only matters when the watchdog runs
        let valid = ClientConfig::no_watchdog()
            .with_watchdog_interval(Duration::from_millis(100))
            .with_pacing_delay(Duration::from_millis(200));
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn test_config_presets() {
        let serial = ClientConfig::serial();
        assert_eq!(serial.pacing_delay, Duration::from_millis(500));
        assert!(serial.validate().is_ok());

        let quiet = ClientConfig::no_watchdog();
        assert!(!quiet.watchdog_enabled);
        assert!(quiet.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClientConfig::new()
            .with_resubscribe_sentinel("RESUBSCRIBE")
            .with_watchdog_interval(Duration::from_secs(30))
            .with_pacing_delay(Duration::from_millis(100))
            .with_buffer_size(64);

        assert_eq!(config.resubscribe_sentinel.as_deref(), Some("RESUBSCRIBE"));
        assert_eq!(config.classifier_config().resubscribe_sentinel.as_deref(), Some("RESUBSCRIBE"));
        assert_eq!(config.event_buffer_size, 64);
        assert!(config.validate().is_ok());
    }
}
