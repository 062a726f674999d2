//! Logic state blocks (logic selectors, flip-flops, presence inputs)

use tesira_protocol::attribute::STATE;
use tesira_protocol::reply;

use super::{attribute_for, impl_any, ControlPoint, ControlPointBase, ControlPointKind, TagSelector};
use crate::context::ProtocolContext;
use crate::error::ControlPointResult;
use crate::event::FeedbackValue;

#[derive(Debug, Clone)]
pub struct StateControl {
    base: ControlPointBase,
    state: Option<bool>,
}

impl StateControl {
    pub fn new(mut base: ControlPointBase) -> Self {
        base.declare_subscription(STATE, TagSelector::Primary, None);
        Self { base, state: None }
    }

    pub fn state(&self) -> Option<bool> {
        self.state
    }

    pub fn set_state(&mut self, ctx: &mut ProtocolContext, state: bool) -> ControlPointResult<()> {
        self.request_set(ctx, STATE, if state { "true" } else { "false" })
    }

    pub fn toggle(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.request_toggle(ctx, STATE)
    }

    fn apply(&mut self, ctx: &ProtocolContext, value: &str) -> ControlPointResult<()> {
        let state = reply::parse_bool(STATE, value)?;
        self.state = Some(state);
        self.base.publish(ctx, STATE, FeedbackValue::Bool(state));
        Ok(())
    }
}

impl ControlPoint for StateControl {
    impl_any!();

    fn base(&self) -> &ControlPointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControlPointBase {
        &mut self.base
    }

    fn kind(&self) -> ControlPointKind {
        ControlPointKind::State
    }

    fn parse_response(&mut self, ctx: &mut ProtocolContext, attribute: &str, line: &str) -> ControlPointResult<()> {
        match attribute {
            STATE => self.apply(ctx, reply::reply_value(line)?),
            _ => Ok(()),
        }
    }

    fn parse_subscription_message(&mut self, ctx: &mut ProtocolContext, token: &str, value: &str) -> ControlPointResult<()> {
        match attribute_for(&self.base, token)?.as_str() {
            STATE => self.apply(ctx, value),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::control_point::ControlPointId;

    fn state_control() -> StateControl {
        let mut base = ControlPointBase::new("presence", "Logic1").with_index(3);
        base.attach(ControlPointId::new(2));
        StateControl::new(base)
    }

    #[test]
    fn test_commands() {
        let (mut ctx, sender, _rx) = test_context();
        let mut control = state_control();

        control.subscribe(&mut ctx).unwrap();
        control.set_state(&mut ctx, true).unwrap();
        control.toggle(&mut ctx).unwrap();
        control.poll(&mut ctx).unwrap();

        assert_eq!(
            sender.sent(),
            vec![
                "\"Logic1\" subscribe state 3 Logic1__state3",
                "\"Logic1\" set state 3 true",
                "\"Logic1\" toggle state 3",
                "\"Logic1\" get state 3",
            ]
        );
    }

    #[test]
    fn test_push_and_reply_update_state() {
        let (mut ctx, _sender, mut rx) = test_context();
        let mut control = state_control();
        control.subscribe(&mut ctx).unwrap();

        control
            .parse_subscription_message(&mut ctx, "Logic1__state3", "true")
            .unwrap();
        assert_eq!(control.state(), Some(true));
        assert_eq!(rx.try_recv().unwrap().value, FeedbackValue::Bool(true));

        control
            .parse_response(&mut ctx, STATE, "+OK \"value\":false")
            .unwrap();
        assert_eq!(control.state(), Some(false));

        assert!(control
            .parse_subscription_message(&mut ctx, "Logic1__state3", "maybe")
            .is_err());
        assert_eq!(control.state(), Some(false));
    }
}
