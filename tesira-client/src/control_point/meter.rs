//! Read-only level meters

use tesira_protocol::attribute::LEVEL;
use tesira_protocol::reply;

use super::{attribute_for, impl_any, ControlPoint, ControlPointBase, ControlPointKind, TagSelector};
use crate::context::ProtocolContext;
use crate::error::{ControlPointError, ControlPointResult};
use crate::event::FeedbackValue;

/// A meter subscribed at a fixed response rate
#[derive(Debug, Clone)]
pub struct Meter {
    base: ControlPointBase,
    level_db: Option<f64>,
}

impl Meter {
    pub fn new(mut base: ControlPointBase, response_rate_ms: u32) -> Self {
        base.declare_subscription(LEVEL, TagSelector::Primary, Some(response_rate_ms));
        Self { base, level_db: None }
    }

    pub fn level_db(&self) -> Option<f64> {
        self.level_db
    }

    fn apply(&mut self, ctx: &ProtocolContext, value: &str) -> ControlPointResult<()> {
        let db = reply::parse_f64(LEVEL, value)?;
        self.level_db = Some(db);
        self.base.publish(ctx, LEVEL, FeedbackValue::Decibels(db));
        Ok(())
    }
}

fn read_only(operation: &'static str, attribute: &str) -> ControlPointError {
    ControlPointError::Unsupported {
        operation,
        attribute: attribute.to_string(),
    }
}

impl ControlPoint for Meter {
    impl_any!();

    fn base(&self) -> &ControlPointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControlPointBase {
        &mut self.base
    }

    fn kind(&self) -> ControlPointKind {
        ControlPointKind::Meter
    }

    fn request_set(&mut self, _ctx: &mut ProtocolContext, attribute: &str, _value: &str) -> ControlPointResult<()> {
        Err(read_only("set", attribute))
    }

    fn request_toggle(&mut self, _ctx: &mut ProtocolContext, attribute: &str) -> ControlPointResult<()> {
        Err(read_only("toggle", attribute))
    }

    fn request_increment(&mut self, _ctx: &mut ProtocolContext, attribute: &str, _step: &str) -> ControlPointResult<()> {
        Err(read_only("increment", attribute))
    }

    fn request_decrement(&mut self, _ctx: &mut ProtocolContext, attribute: &str, _step: &str) -> ControlPointResult<()> {
        Err(read_only("decrement", attribute))
    }

    fn parse_response(&mut self, ctx: &mut ProtocolContext, attribute: &str, line: &str) -> ControlPointResult<()> {
        match attribute {
            LEVEL => self.apply(ctx, reply::reply_value(line)?),
            _ => Ok(()),
        }
    }

    fn parse_subscription_message(&mut self, ctx: &mut ProtocolContext, token: &str, value: &str) -> ControlPointResult<()> {
        match attribute_for(&self.base, token)?.as_str() {
            LEVEL => self.apply(ctx, value),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::control_point::ControlPointId;

    #[test]
    fn test_subscribe_carries_response_rate() {
        let (mut ctx, sender, _rx) = test_context();
        let mut base = ControlPointBase::new("mic1", "Meter1").with_index(2);
        base.attach(ControlPointId::new(0));
        let mut meter = Meter::new(base, 250);

        meter.subscribe(&mut ctx).unwrap();
        assert_eq!(sender.sent(), vec!["\"Meter1\" subscribe level 2 Meter1__level2 250"]);

        meter
            .parse_subscription_message(&mut ctx, "Meter1__level2", "-42.5")
            .unwrap();
        assert_eq!(meter.level_db(), Some(-42.5));
    }

    #[test]
    fn test_meters_reject_writes() {
        let (mut ctx, sender, _rx) = test_context();
        let mut meter = Meter::new(ControlPointBase::new("mic1", "Meter1"), 100);

        assert!(matches!(
            meter.request_set(&mut ctx, LEVEL, "0"),
            Err(ControlPointError::Unsupported { operation: "set", .. })
        ));
        assert!(meter.request_toggle(&mut ctx, LEVEL).is_err());
        assert!(meter.request_increment(&mut ctx, LEVEL, "1").is_err());
        assert!(meter.request_decrement(&mut ctx, LEVEL, "1").is_err());
        assert!(sender.sent().is_empty());
    }
}
