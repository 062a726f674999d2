//! Routers and source selectors
//!
//! A router output is addressed by the control point's index and reports the
//! input routed to it (0 for none). A source selector is block-wide and
//! reports the selected source.

use tesira_protocol::attribute::{INPUT, SOURCE_SELECTION};
use tesira_protocol::reply;

use super::{attribute_for, impl_any, ControlPoint, ControlPointBase, ControlPointKind, TagSelector};
use crate::context::ProtocolContext;
use crate::error::ControlPointResult;
use crate::event::FeedbackValue;

/// One output of a router block
#[derive(Debug, Clone)]
pub struct Router {
    base: ControlPointBase,
    input: Option<u32>,
}

impl Router {
    pub fn new(mut base: ControlPointBase) -> Self {
        base.declare_subscription(INPUT, TagSelector::Primary, None);
        Self { base, input: None }
    }

    pub fn output(&self) -> u32 {
        self.base.index1()
    }

    /// Routed input, 0 when unrouted
    pub fn input(&self) -> Option<u32> {
        self.input
    }

    pub fn route(&mut self, ctx: &mut ProtocolContext, input: u32) -> ControlPointResult<()> {
        self.request_set(ctx, INPUT, &input.to_string())
    }

    pub fn unroute(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.route(ctx, 0)
    }

    fn apply(&mut self, ctx: &ProtocolContext, value: &str) -> ControlPointResult<()> {
        let input = parse_index(INPUT, value)?;
        self.input = Some(input);
        self.base.publish(ctx, INPUT, FeedbackValue::Integer(i64::from(input)));
        Ok(())
    }
}

impl ControlPoint for Router {
    impl_any!();

    fn base(&self) -> &ControlPointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControlPointBase {
        &mut self.base
    }

    fn kind(&self) -> ControlPointKind {
        ControlPointKind::Router
    }

    fn parse_response(&mut self, ctx: &mut ProtocolContext, attribute: &str, line: &str) -> ControlPointResult<()> {
        match attribute {
            INPUT => self.apply(ctx, reply::reply_value(line)?),
            _ => Ok(()),
        }
    }

    fn parse_subscription_message(&mut self, ctx: &mut ProtocolContext, token: &str, value: &str) -> ControlPointResult<()> {
        match attribute_for(&self.base, token)?.as_str() {
            INPUT => self.apply(ctx, value),
            _ => Ok(()),
        }
    }
}

/// A source selector block
#[derive(Debug, Clone)]
pub struct SourceSelector {
    base: ControlPointBase,
    source: Option<u32>,
}

impl SourceSelector {
    pub fn new(mut base: ControlPointBase) -> Self {
        base.declare_subscription(SOURCE_SELECTION, TagSelector::Primary, None);
        Self { base, source: None }
    }

    /// Selected source, 0 when none
    pub fn source(&self) -> Option<u32> {
        self.source
    }

    pub fn select(&mut self, ctx: &mut ProtocolContext, source: u32) -> ControlPointResult<()> {
        self.request_set(ctx, SOURCE_SELECTION, &source.to_string())
    }

    fn apply(&mut self, ctx: &ProtocolContext, value: &str) -> ControlPointResult<()> {
        let source = parse_index(SOURCE_SELECTION, value)?;
        self.source = Some(source);
        self.base
            .publish(ctx, SOURCE_SELECTION, FeedbackValue::Integer(i64::from(source)));
        Ok(())
    }
}

impl ControlPoint for SourceSelector {
    impl_any!();

    fn base(&self) -> &ControlPointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControlPointBase {
        &mut self.base
    }

    fn kind(&self) -> ControlPointKind {
        ControlPointKind::SourceSelector
    }

    fn parse_response(&mut self, ctx: &mut ProtocolContext, attribute: &str, line: &str) -> ControlPointResult<()> {
        match attribute {
            SOURCE_SELECTION => self.apply(ctx, reply::reply_value(line)?),
            _ => Ok(()),
        }
    }

    fn parse_subscription_message(&mut self, ctx: &mut ProtocolContext, token: &str, value: &str) -> ControlPointResult<()> {
        match attribute_for(&self.base, token)?.as_str() {
            SOURCE_SELECTION => self.apply(ctx, value),
            _ => Ok(()),
        }
    }
}

fn parse_index(attribute: &str, value: &str) -> ControlPointResult<u32> {
    let index = reply::parse_i64(attribute, value)?;
    u32::try_from(index).map_err(|_| {
        tesira_protocol::ProtocolError::InvalidValue {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
        .into()
    })
}
