//! Matrix mixer crosspoints
//!
//! Crosspoint state has no subscription on the device; it is polled.

use tesira_protocol::attribute::CROSSPOINT_LEVEL_STATE;
use tesira_protocol::reply;

use super::{impl_any, ControlPoint, ControlPointBase, ControlPointKind, TagSelector};
use crate::context::ProtocolContext;
use crate::error::ControlPointResult;
use crate::event::FeedbackValue;

/// One input/output crosspoint; `index1` is the input, `index2` the output
#[derive(Debug, Clone)]
pub struct Crosspoint {
    base: ControlPointBase,
    state: Option<bool>,
}

impl Crosspoint {
    pub fn new(base: ControlPointBase) -> Self {
        Self { base, state: None }
    }

    pub fn state(&self) -> Option<bool> {
        self.state
    }

    pub fn set(&mut self, ctx: &mut ProtocolContext, on: bool) -> ControlPointResult<()> {
        self.request_set(ctx, CROSSPOINT_LEVEL_STATE, if on { "true" } else { "false" })
    }

    pub fn toggle(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.request_toggle(ctx, CROSSPOINT_LEVEL_STATE)
    }
}

impl ControlPoint for Crosspoint {
    impl_any!();

    fn base(&self) -> &ControlPointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControlPointBase {
        &mut self.base
    }

    fn kind(&self) -> ControlPointKind {
        ControlPointKind::Crosspoint
    }

    fn poll(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.base
            .request_get(ctx, CROSSPOINT_LEVEL_STATE, TagSelector::Primary);
        Ok(())
    }

    fn parse_response(&mut self, ctx: &mut ProtocolContext, attribute: &str, line: &str) -> ControlPointResult<()> {
        if attribute != CROSSPOINT_LEVEL_STATE {
            return Ok(());
        }
        let state = reply::parse_bool(attribute, reply::reply_value(line)?)?;
        self.state = Some(state);
        self.base
            .publish(ctx, CROSSPOINT_LEVEL_STATE, FeedbackValue::Bool(state));
        Ok(())
    }
}
