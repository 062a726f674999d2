//! Device-scope control points
//!
//! [`DeviceInfo`] polls identity and firmware and recalls presets.
//! [`ExpanderInventory`] polls the servers and expanders the device has
//! discovered. Both address the `DEVICE` pseudo-tag, have nothing to
//! subscribe to, and are added to every engine.

use tesira_protocol::attribute::{
    DEVICE_TAG, DISCOVERED_SERVERS, HOSTNAME, NETWORK_STATUS, RECALL_PRESET, RECALL_PRESET_BY_NAME, SERIAL_NUMBER,
    VERSION,
};
use tesira_protocol::command::quote;
use tesira_protocol::reply;

use super::{impl_any, ControlPoint, ControlPointBase, ControlPointKind, TagSelector};
use crate::context::ProtocolContext;
use crate::error::ControlPointResult;
use crate::event::FeedbackValue;

/// Identity reported by the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub hostname: Option<String>,
    /// Raw network status structure
    pub network_status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    base: ControlPointBase,
    identity: DeviceIdentity,
}

impl DeviceInfo {
    pub const KEY: &'static str = "device-info";

    pub fn new() -> Self {
        Self {
            base: ControlPointBase::new(Self::KEY, DEVICE_TAG),
            identity: DeviceIdentity::default(),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn recall_preset(&self, ctx: &mut ProtocolContext, preset_id: u32) {
        tracing::info!("Recalling preset {}", preset_id);
        self.base.enqueue_action(
            ctx,
            RECALL_PRESET,
            Some(&preset_id.to_string()),
            TagSelector::Primary,
        );
    }

    pub fn recall_preset_by_name(&self, ctx: &mut ProtocolContext, name: &str) {
        tracing::info!("Recalling preset {:?}", name);
        self.base
            .enqueue_action(ctx, RECALL_PRESET_BY_NAME, Some(&quote(name)), TagSelector::Primary);
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPoint for DeviceInfo {
    impl_any!();

    fn base(&self) -> &ControlPointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControlPointBase {
        &mut self.base
    }

    fn kind(&self) -> ControlPointKind {
        ControlPointKind::DeviceInfo
    }

    fn poll(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        for attribute in [SERIAL_NUMBER, VERSION, HOSTNAME, NETWORK_STATUS] {
            self.base.request_get(ctx, attribute, TagSelector::Primary);
        }
        Ok(())
    }

    fn parse_response(&mut self, ctx: &mut ProtocolContext, attribute: &str, line: &str) -> ControlPointResult<()> {
        let value = reply::reply_value(line)?.to_string();
        let slot = match attribute {
            SERIAL_NUMBER => &mut self.identity.serial_number,
            VERSION => &mut self.identity.firmware_version,
            HOSTNAME => &mut self.identity.hostname,
            NETWORK_STATUS => &mut self.identity.network_status,
            _ => return Ok(()),
        };
        *slot = Some(value.clone());
        tracing::info!("Device {}: {}", attribute, value);
        self.base.publish(ctx, attribute, FeedbackValue::Text(value));
        Ok(())
    }
}

/// Servers and expanders discovered by the device
#[derive(Debug, Clone)]
pub struct ExpanderInventory {
    base: ControlPointBase,
    hostnames: Vec<String>,
}

impl ExpanderInventory {
    pub const KEY: &'static str = "device-inventory";

    pub fn new() -> Self {
        Self {
            base: ControlPointBase::new(Self::KEY, DEVICE_TAG),
            hostnames: Vec::new(),
        }
    }

    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }
}

impl Default for ExpanderInventory {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect every `"hostname":"..."` entry from a discovered servers list
fn extract_hostnames(value: &str) -> Vec<String> {
    const KEY: &str = "\"hostname\":\"";
    let mut hostnames = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find(KEY) {
        rest = &rest[start + KEY.len()..];
        match rest.find('"') {
            Some(end) => {
                hostnames.push(rest[..end].to_string());
                rest = &rest[end..];
            }
            None => break,
        }
    }
    hostnames
}

impl ControlPoint for ExpanderInventory {
    impl_any!();

    fn base(&self) -> &ControlPointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControlPointBase {
        &mut self.base
    }

    fn kind(&self) -> ControlPointKind {
        ControlPointKind::Inventory
    }

    fn poll(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.base
            .request_get(ctx, DISCOVERED_SERVERS, TagSelector::Primary);
        Ok(())
    }

    fn parse_response(&mut self, ctx: &mut ProtocolContext, attribute: &str, line: &str) -> ControlPointResult<()> {
        if attribute != DISCOVERED_SERVERS {
            return Ok(());
        }
        self.hostnames = extract_hostnames(reply::reply_value(line)?);
        tracing::info!("Discovered {} server(s): {:?}", self.hostnames.len(), self.hostnames);
        self.base.publish(
            ctx,
            DISCOVERED_SERVERS,
            FeedbackValue::Integer(self.hostnames.len() as i64),
        );
        self.base
            .publish(ctx, DISCOVERED_SERVERS, FeedbackValue::Text(self.hostnames.join(",")));
        Ok(())
    }
}
