//! Declarative control point definitions
//!
//! A [`ControlPointConfig`] is what a configuration file holds for one
//! control point. Loading the file is up to the caller; any serde format
//! works.
//!
//! ```rust
//! use tesira_client::{build_control_point, ClientConfig, ControlPointConfig};
//!
//! let json = r#"{ "key": "fader1", "kind": "fader", "instanceTag": "Level1", "index1": 2 }"#;
//! let config: ControlPointConfig = serde_json::from_str(json).unwrap();
//! let point = build_control_point(&config, &ClientConfig::default()).unwrap();
//! assert_eq!(point.key(), "fader1");
//! ```

use serde::{Deserialize, Serialize};

use super::{
    ControlPoint, ControlPointBase, Crosspoint, Dialer, Fader, Meter, RoomCombiner, Router, SourceSelector,
    StateControl,
};
use crate::config::ClientConfig;
use crate::error::ClientError;

/// Attribute group of a control point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlPointKind {
    Fader,
    State,
    Meter,
    Router,
    SourceSelector,
    Crosspoint,
    Dialer,
    RoomCombiner,
    /// Built in; cannot be configured
    DeviceInfo,
    /// Built in; cannot be configured
    Inventory,
}

impl ControlPointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlPointKind::Fader => "fader",
            ControlPointKind::State => "state",
            ControlPointKind::Meter => "meter",
            ControlPointKind::Router => "router",
            ControlPointKind::SourceSelector => "sourceSelector",
            ControlPointKind::Crosspoint => "crosspoint",
            ControlPointKind::Dialer => "dialer",
            ControlPointKind::RoomCombiner => "roomCombiner",
            ControlPointKind::DeviceInfo => "deviceInfo",
            ControlPointKind::Inventory => "inventory",
        }
    }
}

impl std::fmt::Display for ControlPointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of one control point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPointConfig {
    /// Unique key used to address the control point through the client
    pub key: String,

    pub kind: ControlPointKind,

    /// Instance tag of the DSP block
    pub instance_tag: String,

    /// Second block, e.g. a dialer's call status block
    #[serde(default)]
    pub secondary_tag: Option<String>,

    #[serde(default = "default_index")]
    pub index1: u32,

    #[serde(default)]
    pub index2: u32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub label: Option<String>,

    /// Meter response rate; defaults to the client's meter rate
    #[serde(default)]
    pub response_rate_ms: Option<u32>,

    /// Fader increment/decrement step in dB
    #[serde(default)]
    pub level_step_db: Option<f64>,
}

fn default_index() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

impl ControlPointConfig {
    pub fn new(key: impl Into<String>, kind: ControlPointKind, instance_tag: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind,
            instance_tag: instance_tag.into(),
            secondary_tag: None,
            index1: default_index(),
            index2: 0,
            enabled: true,
            label: None,
            response_rate_ms: None,
            level_step_db: None,
        }
    }

    pub fn with_indices(mut self, index1: u32, index2: u32) -> Self {
        self.index1 = index1;
        self.index2 = index2;
        self
    }

    pub fn with_secondary_tag(mut self, tag: impl Into<String>) -> Self {
        self.secondary_tag = Some(tag.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.key.trim().is_empty() {
            return Err(ClientError::Configuration(
                "Control point key must not be empty".to_string(),
            ));
        }
        if self.instance_tag.trim().is_empty() {
            return Err(ClientError::Configuration(format!(
                "Control point {} has an empty instance tag",
                self.key
            )));
        }
        if self.instance_tag.contains('"') {
            return Err(ClientError::Configuration(format!(
                "Instance tag of {} must not contain quotes",
                self.key
            )));
        }
        if matches!(self.kind, ControlPointKind::DeviceInfo | ControlPointKind::Inventory) {
            return Err(ClientError::Configuration(format!(
                "Control point {}: {} is built in and cannot be configured",
                self.key, self.kind
            )));
        }
        if self.response_rate_ms == Some(0) {
            return Err(ClientError::Configuration(format!(
                "Response rate of {} must be greater than 0",
                self.key
            )));
        }
        if let Some(step) = self.level_step_db {
            if !step.is_finite() || step <= 0.0 {
                return Err(ClientError::Configuration(format!(
                    "Level step of {} must be a positive number of dB",
                    self.key
                )));
            }
        }
        Ok(())
    }
}

/// Build a control point from its definition
pub fn build_control_point(
    config: &ControlPointConfig,
    client: &ClientConfig,
) -> Result<Box<dyn ControlPoint>, ClientError> {
    config.validate()?;

    let mut base = ControlPointBase::new(config.key.clone(), config.instance_tag.clone())
        .with_index(config.index1)
        .with_second_index(config.index2)
        .with_enabled(config.enabled);
    if let Some(tag) = &config.secondary_tag {
        base = base.with_secondary_tag(tag.clone());
    }
    if let Some(label) = &config.label {
        base = base.with_label(label.clone());
    }

    let point: Box<dyn ControlPoint> = match config.kind {
        ControlPointKind::Fader => {
            let fader = Fader::new(base);
            match config.level_step_db {
                Some(step) => Box::new(fader.with_step(step)),
                None => Box::new(fader),
            }
        }
        ControlPointKind::State => Box::new(StateControl::new(base)),
        ControlPointKind::Meter => Box::new(Meter::new(
            base,
            config.response_rate_ms.unwrap_or(client.meter_response_rate_ms),
        )),
        ControlPointKind::Router => Box::new(Router::new(base)),
        ControlPointKind::SourceSelector => Box::new(SourceSelector::new(base)),
        ControlPointKind::Crosspoint => Box::new(Crosspoint::new(base)),
        ControlPointKind::Dialer => Box::new(Dialer::new(base)),
        ControlPointKind::RoomCombiner => Box::new(RoomCombiner::new(base)),
        ControlPointKind::DeviceInfo | ControlPointKind::Inventory => {
            return Err(ClientError::Configuration(format!(
                "{} is built in and cannot be configured",
                config.kind
            )))
        }
    };
    Ok(point)
}
