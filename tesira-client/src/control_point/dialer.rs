//! VoIP/POTS dialers
//!
//! Call actions (`dial`, `end`, `onHook`, `offHook`, `answer`) are verb-less
//! commands addressed by line and call appearance. They go through the queue
//! as fire-and-forget entries, so the device's echo of the command is consumed
//! as its reply. Call state is reported by a separate status block, the
//! control point's secondary tag.

use tesira_protocol::attribute::{ANSWER, AUTO_ANSWER, CALL_STATE, DIAL, END, OFF_HOOK, ON_HOOK};
use tesira_protocol::reply;
use tesira_protocol::ProtocolError;

use super::{attribute_for, impl_any, ControlPoint, ControlPointBase, ControlPointKind, TagSelector};
use crate::context::ProtocolContext;
use crate::error::ControlPointResult;
use crate::event::FeedbackValue;

/// One line and call appearance of a dialer block
#[derive(Debug, Clone)]
pub struct Dialer {
    base: ControlPointBase,
    call_state: Option<String>,
    auto_answer: Option<bool>,
}

impl Dialer {
    pub fn new(base: ControlPointBase) -> Self {
        // Call appearances are numbered from 1
        let mut base = if base.index2() == 0 {
            base.with_second_index(1)
        } else {
            base
        };
        base.declare_subscription(CALL_STATE, TagSelector::Secondary, None);
        base.declare_subscription(AUTO_ANSWER, TagSelector::Primary, None);
        Self {
            base,
            call_state: None,
            auto_answer: None,
        }
    }

    pub fn line(&self) -> u32 {
        self.base.index1()
    }

    pub fn call_appearance(&self) -> u32 {
        self.base.index2()
    }

    /// Last call state reported by the status block, unparsed
    pub fn call_state(&self) -> Option<&str> {
        self.call_state.as_deref()
    }

    pub fn auto_answer(&self) -> Option<bool> {
        self.auto_answer
    }

    pub fn dial(&mut self, ctx: &mut ProtocolContext, number: &str) -> ControlPointResult<()> {
        let number = number.trim();
        if number.is_empty() || !number.chars().all(is_dial_char) {
            return Err(ProtocolError::InvalidValue {
                attribute: DIAL.to_string(),
                value: number.to_string(),
            }
            .into());
        }
        self.action(ctx, DIAL, Some(number));
        Ok(())
    }

    pub fn end(&mut self, ctx: &mut ProtocolContext) {
        self.action(ctx, END, None);
    }

    pub fn on_hook(&mut self, ctx: &mut ProtocolContext) {
        self.action(ctx, ON_HOOK, None);
    }

    pub fn off_hook(&mut self, ctx: &mut ProtocolContext) {
        self.action(ctx, OFF_HOOK, None);
    }

    pub fn answer(&mut self, ctx: &mut ProtocolContext) {
        self.action(ctx, ANSWER, None);
    }

    pub fn set_auto_answer(&mut self, ctx: &mut ProtocolContext, enabled: bool) -> ControlPointResult<()> {
        self.request_set(ctx, AUTO_ANSWER, if enabled { "true" } else { "false" })
    }

    fn action(&self, ctx: &mut ProtocolContext, attribute: &str, value: Option<&str>) {
        tracing::debug!("{} {} on line {}", self.base.key(), attribute, self.line());
        self.base
            .enqueue_action(ctx, attribute, value, TagSelector::Primary);
    }

    fn apply(&mut self, ctx: &ProtocolContext, attribute: &str, value: &str) -> ControlPointResult<()> {
        match attribute {
            CALL_STATE => {
                self.call_state = Some(value.to_string());
                self.base
                    .publish(ctx, CALL_STATE, FeedbackValue::Text(value.to_string()));
            }
            AUTO_ANSWER => {
                let enabled = reply::parse_bool(AUTO_ANSWER, value)?;
                self.auto_answer = Some(enabled);
                self.base.publish(ctx, AUTO_ANSWER, FeedbackValue::Bool(enabled));
            }
            _ => {}
        }
        Ok(())
    }
}

fn is_dial_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '*' | '#' | '+' | ',' | '.')
}

impl ControlPoint for Dialer {
    impl_any!();

    fn base(&self) -> &ControlPointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControlPointBase {
        &mut self.base
    }

    fn kind(&self) -> ControlPointKind {
        ControlPointKind::Dialer
    }

    fn poll(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.base.request_get(ctx, CALL_STATE, TagSelector::Secondary);
        self.base.request_get(ctx, AUTO_ANSWER, TagSelector::Primary);
        Ok(())
    }

    fn parse_response(&mut self, ctx: &mut ProtocolContext, attribute: &str, line: &str) -> ControlPointResult<()> {
        let value = reply::reply_value(line)?;
        self.apply(ctx, attribute, value)
    }

    fn parse_subscription_message(&mut self, ctx: &mut ProtocolContext, token: &str, value: &str) -> ControlPointResult<()> {
        let attribute = attribute_for(&self.base, token)?;
        self.apply(ctx, &attribute, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::control_point::ControlPointId;

    fn dialer() -> Dialer {
        let mut base = ControlPointBase::new("phone", "Dialer1").with_secondary_tag("DialerStatus1");
        base.attach(ControlPointId::new(0));
        Dialer::new(base)
    }

    #[test]
    fn test_subscriptions_span_both_tags() {
        let (mut ctx, sender, _rx) = test_context();
        let mut dialer = dialer();

        dialer.subscribe(&mut ctx).unwrap();
        assert_eq!(
            sender.sent(),
            vec![
                "\"DialerStatus1\" subscribe callState DialerStatus1__callState1",
                "\"Dialer1\" subscribe autoAnswer 1 Dialer1__autoAnswer1",
            ]
        );

        dialer
            .parse_subscription_message(&mut ctx, "DialerStatus1__callState1", "IDLE")
            .unwrap();
        assert_eq!(dialer.call_state(), Some("IDLE"));
    }

    #[test]
    fn test_call_actions_are_queued_fire_and_forget() {
        let (mut ctx, sender, _rx) = test_context();
        let mut dialer = dialer();

        dialer.dial(&mut ctx, "5551212").unwrap();
        dialer.end(&mut ctx);
        assert_eq!(sender.take(), vec!["\"Dialer1\" dial 1 1 5551212"]);
        assert_eq!(ctx.queue().pending_echo(), Some("\"Dialer1\" dial 1 1 5551212"));

        assert!(ctx.queue_mut().advance("\"Dialer1\" dial 1 1 5551212").is_none());
        assert_eq!(sender.take(), vec!["\"Dialer1\" end 1 1"]);

        dialer.off_hook(&mut ctx);
        dialer.on_hook(&mut ctx);
        dialer.answer(&mut ctx);
        assert_eq!(ctx.queue().len(), 4);
    }

    #[test]
    fn test_dial_rejects_bad_numbers() {
        let (mut ctx, sender, _rx) = test_context();
        let mut dialer = dialer();

        assert!(dialer.dial(&mut ctx, "").is_err());
        assert!(dialer.dial(&mut ctx, "555 1212\" evil").is_err());
        assert!(dialer.dial(&mut ctx, "*72#").is_ok());
        assert_eq!(sender.sent(), vec!["\"Dialer1\" dial 1 1 *72#"]);
    }
}
