//! Room combiner walls

use tesira_protocol::attribute::WALL_STATE;
use tesira_protocol::reply;

use super::{attribute_for, impl_any, ControlPoint, ControlPointBase, ControlPointKind, TagSelector};
use crate::context::ProtocolContext;
use crate::error::ControlPointResult;
use crate::event::FeedbackValue;

/// One wall of a room combiner block; `index1` is the wall number
#[derive(Debug, Clone)]
pub struct RoomCombiner {
    base: ControlPointBase,
    closed: Option<bool>,
}

impl RoomCombiner {
    pub fn new(mut base: ControlPointBase) -> Self {
        base.declare_subscription(WALL_STATE, TagSelector::Primary, None);
        Self { base, closed: None }
    }

    /// Whether the wall is closed (rooms separated)
    pub fn is_closed(&self) -> Option<bool> {
        self.closed
    }

    pub fn set_wall(&mut self, ctx: &mut ProtocolContext, closed: bool) -> ControlPointResult<()> {
        self.request_set(ctx, WALL_STATE, if closed { "true" } else { "false" })
    }

    pub fn toggle_wall(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.request_toggle(ctx, WALL_STATE)
    }

    fn apply(&mut self, ctx: &ProtocolContext, value: &str) -> ControlPointResult<()> {
        let closed = reply::parse_bool(WALL_STATE, value)?;
        self.closed = Some(closed);
        self.base.publish(ctx, WALL_STATE, FeedbackValue::Bool(closed));
        Ok(())
    }
}

impl ControlPoint for RoomCombiner {
    impl_any!();

    fn base(&self) -> &ControlPointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControlPointBase {
        &mut self.base
    }

    fn kind(&self) -> ControlPointKind {
        ControlPointKind::RoomCombiner
    }

    fn parse_response(&mut self, ctx: &mut ProtocolContext, attribute: &str, line: &str) -> ControlPointResult<()> {
        match attribute {
            WALL_STATE => self.apply(ctx, reply::reply_value(line)?),
            _ => Ok(()),
        }
    }

    fn parse_subscription_message(&mut self, ctx: &mut ProtocolContext, token: &str, value: &str) -> ControlPointResult<()> {
        match attribute_for(&self.base, token)?.as_str() {
            WALL_STATE => self.apply(ctx, value),
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
    fn test_wall_state() {
        let (mut ctx, sender, _rx) = test_context();
        let mut base = ControlPointBase::new("wall2", "Combiner1").with_index(2);
        base.attach(ControlPointId::new(0));
        let mut wall = RoomCombiner::new(base);

        wall.subscribe(&mut ctx).unwrap();
        wall.set_wall(&mut ctx, false).unwrap();
        wall.toggle_wall(&mut ctx).unwrap();
        assert_eq!(
            sender.sent(),
            vec![
                "\"Combiner1\" subscribe wallState 2 Combiner1__wallState2",
                "\"Combiner1\" set wallState 2 false",
                "\"Combiner1\" toggle wallState 2",
            ]
        );

        wall.parse_subscription_message(&mut ctx, "Combiner1__wallState2", "true")
            .unwrap();
        assert_eq!(wall.is_closed(), Some(true));
    }
}
