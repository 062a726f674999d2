//! The control point contract and the attribute groups built on it
//!
//! A control point is one addressable group of attributes on a DSP block: a
//! fader's level and mute, a router output, a dialer line. Every group shares
//! the same command and subscription plumbing through [`ControlPointBase`] and
//! exposes it through the [`ControlPoint`] trait. Group types only add what is
//! specific to them: value parsing, scaling, and the occasional chained `get`.
//!
//! # Subscription bookkeeping
//!
//! Each group declares its subscribable attributes when it is built. A
//! `subscribe` marks every declared attribute unconfirmed; a push on the
//! attribute's token, or a successful reply for that attribute, confirms it.
//! [`ControlPoint::is_subscribed`] is true once all of them are confirmed and
//! only goes back to false on the next subscribe or unsubscribe.

use std::any::Any;
use std::fmt;

use tesira_protocol::command::{self, CommandTarget, Verb};
use tesira_protocol::SubscriptionToken;

use crate::context::ProtocolContext;
use crate::error::{ControlPointError, ControlPointResult};
use crate::event::{Feedback, FeedbackValue};
use crate::queue::QueuedCommand;

/// Implements the `as_any` accessors for a control point type
macro_rules! impl_any {
    () => {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}
pub(crate) use impl_any;

mod config;
mod crosspoint;
mod device;
mod dialer;
mod fader;
mod meter;
mod room_combiner;
mod router;
mod state;

pub use config::{build_control_point, ControlPointConfig, ControlPointKind};
pub use crosspoint::Crosspoint;
pub use device::{DeviceIdentity, DeviceInfo, ExpanderInventory};
pub use dialer::Dialer;
pub use fader::{Fader, LevelRange, LEVEL_SCALE_MAX};
pub use meter::Meter;
pub use room_combiner::RoomCombiner;
pub use router::{Router, SourceSelector};
pub use state::StateControl;

/// Position of a control point inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlPointId(usize);

impl ControlPointId {
    /// Id carried by a control point that hasn't been added to an engine
    pub const DETACHED: ControlPointId = ControlPointId(usize::MAX);

    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ControlPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cp-{}", self.0)
    }
}

/// Which instance tag a command is addressed to
///
/// Some groups span two DSP blocks, e.g. a dialer's control block and its
/// call status block. Without a secondary tag both resolve to the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagSelector {
    Primary,
    Secondary,
}

/// One subscribable attribute of a control point
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubscriptionSlot {
    attribute: String,
    tag: TagSelector,
    response_rate_ms: Option<u32>,
    token: SubscriptionToken,
    /// Subscribe line sent since the last subscribe/unsubscribe
    active: bool,
    confirmed: bool,
}

/// State and plumbing shared by every attribute group
#[derive(Debug, Clone)]
pub struct ControlPointBase {
    id: ControlPointId,
    key: String,
    label: Option<String>,
    instance_tag: String,
    secondary_tag: Option<String>,
    index1: u32,
    index2: u32,
    enabled: bool,
    slots: Vec<SubscriptionSlot>,
}

impl ControlPointBase {
    pub fn new(key: impl Into<String>, instance_tag: impl Into<String>) -> Self {
        Self {
            id: ControlPointId::DETACHED,
            key: key.into(),
            label: None,
            instance_tag: instance_tag.into(),
            secondary_tag: None,
            index1: 1,
            index2: 0,
            enabled: true,
            slots: Vec::new(),
        }
    }

    pub fn with_index(mut self, index1: u32) -> Self {
        self.index1 = index1;
        self
    }

    pub fn with_second_index(mut self, index2: u32) -> Self {
        self.index2 = index2;
        self
    }

    pub fn with_secondary_tag(mut self, tag: impl Into<String>) -> Self {
        self.secondary_tag = Some(tag.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn id(&self) -> ControlPointId {
        self.id
    }

    pub(crate) fn attach(&mut self, id: ControlPointId) {
        self.id = id;
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }

    pub fn instance_tag(&self) -> &str {
        &self.instance_tag
    }

    pub fn index1(&self) -> u32 {
        self.index1
    }

    pub fn index2(&self) -> u32 {
        self.index2
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn tag(&self, which: TagSelector) -> &str {
        match which {
            TagSelector::Primary => &self.instance_tag,
            TagSelector::Secondary => self.secondary_tag.as_deref().unwrap_or(&self.instance_tag),
        }
    }

    pub fn target(&self, which: TagSelector) -> CommandTarget<'_> {
        CommandTarget::new(self.tag(which), self.index1).with_second_index(self.index2)
    }

    /// Format a command for this control point
    pub fn build_command(&self, verb: Verb, attribute: &str, value: Option<&str>, which: TagSelector) -> String {
        command::build(verb, attribute, &self.target(which), value)
    }

    /// Queue a `get`; the reply comes back through `parse_response`
    pub fn request_get(&self, ctx: &mut ProtocolContext, attribute: &str, which: TagSelector) {
        let text = self.build_command(Verb::Get, attribute, None, which);
        ctx.enqueue(QueuedCommand::correlated(text, attribute, self.id));
    }

    /// Send a command straight to the transport
    pub fn send_command(
        &self,
        ctx: &ProtocolContext,
        verb: Verb,
        attribute: &str,
        value: Option<&str>,
        which: TagSelector,
    ) -> ControlPointResult<()> {
        let text = self.build_command(verb, attribute, value, which);
        ctx.send_direct(&text)?;
        Ok(())
    }

    /// Queue a command whose reply is only consumed
    pub fn enqueue_action(&self, ctx: &mut ProtocolContext, attribute: &str, value: Option<&str>, which: TagSelector) {
        // The verb is dropped for action attributes by the format table
        let text = self.build_command(Verb::Set, attribute, value, which);
        ctx.enqueue(QueuedCommand::fire_and_forget(text));
    }

    /// Declare a subscribable attribute; called once while building the group
    pub fn declare_subscription(&mut self, attribute: &str, which: TagSelector, response_rate_ms: Option<u32>) {
        let token = SubscriptionToken::new(self.tag(which), attribute, self.index1);
        self.slots.retain(|slot| slot.attribute != attribute);
        self.slots.push(SubscriptionSlot {
            attribute: attribute.to_string(),
            tag: which,
            response_rate_ms,
            token,
            active: false,
            confirmed: false,
        });
    }

    pub fn has_subscriptions(&self) -> bool {
        !self.slots.is_empty()
    }

    pub fn subscription_attributes(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.attribute.as_str())
    }

    /// Reset confirmations ahead of a new round of subscribe lines
    pub fn begin_subscription(&mut self) {
        for slot in &mut self.slots {
            slot.active = false;
            slot.confirmed = false;
        }
    }

    /// Register the attribute's token and send its subscribe line
    pub fn subscribe_attribute(&mut self, ctx: &mut ProtocolContext, attribute: &str) -> ControlPointResult<()> {
        let id = self.id;
        let Some(slot) = self.slots.iter().position(|slot| slot.attribute == attribute) else {
            return Err(ControlPointError::Unsupported {
                operation: "subscribe",
                attribute: attribute.to_string(),
            });
        };

        let slot = &self.slots[slot];
        ctx.register_token(slot.token.clone(), id, &self.key)?;
        let line = command::build_subscribe(
            &slot.attribute,
            &self.target(slot.tag),
            &slot.token,
            slot.response_rate_ms,
        );

        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.attribute == attribute) {
            slot.active = true;
            slot.confirmed = false;
        }

        ctx.send_direct(&line)?;
        Ok(())
    }

    /// Subscribe every declared attribute
    pub fn subscribe_all(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.begin_subscription();
        let attributes: Vec<String> = self.slots.iter().map(|slot| slot.attribute.clone()).collect();
        for attribute in attributes {
            self.subscribe_attribute(ctx, &attribute)?;
        }
        Ok(())
    }

    /// Unsubscribe every declared attribute and drop its token
    ///
    /// Unsubscribe lines are sent whether or not this session subscribed;
    /// the device may still hold subscriptions from an earlier session.
    pub fn unsubscribe_all(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        let lines: Vec<(String, String)> = self
            .slots
            .iter()
            .map(|slot| {
                let line = command::build_unsubscribe(&slot.attribute, &self.target(slot.tag), &slot.token);
                (slot.attribute.clone(), line)
            })
            .collect();

        for slot in &mut self.slots {
            ctx.unregister_token(slot.token.as_str());
            slot.active = false;
            slot.confirmed = false;
        }

        for (attribute, line) in lines {
            if let Err(e) = ctx.send_direct(&line) {
                tracing::warn!("Failed to unsubscribe {} for {}: {}", attribute, self.key, e);
            }
        }
        Ok(())
    }

    /// Re-send subscribe lines for active subscriptions without touching state
    ///
    /// A healthy device answers with `ALREADY_SUBSCRIBED`.
    pub fn resend_subscriptions(&self, ctx: &ProtocolContext) -> ControlPointResult<()> {
        for slot in self.slots.iter().filter(|slot| slot.active) {
            let line = command::build_subscribe(
                &slot.attribute,
                &self.target(slot.tag),
                &slot.token,
                slot.response_rate_ms,
            );
            ctx.send_direct(&line)?;
        }
        Ok(())
    }

    /// Mark the attribute behind `token` as alive
    pub fn confirm_token(&mut self, token: &str) -> bool {
        match self
            .slots
            .iter_mut()
            .find(|slot| slot.active && slot.token.as_str() == token)
        {
            Some(slot) => {
                slot.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Mark `attribute` as alive after a successful reply
    pub fn confirm_attribute(&mut self, attribute: &str) -> bool {
        match self
            .slots
            .iter_mut()
            .find(|slot| slot.active && slot.attribute == attribute)
        {
            Some(slot) => {
                slot.confirmed = true;
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        !self.slots.is_empty() && self.slots.iter().all(|slot| slot.active && slot.confirmed)
    }

    /// Attribute code subscribed under `token`
    pub fn attribute_for_token(&self, token: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|slot| slot.token.as_str() == token)
            .map(|slot| slot.attribute.as_str())
    }

    pub fn token_for(&self, attribute: &str) -> Option<&SubscriptionToken> {
        self.slots
            .iter()
            .find(|slot| slot.attribute == attribute)
            .map(|slot| &slot.token)
    }

    pub fn publish(&self, ctx: &ProtocolContext, attribute: &str, value: FeedbackValue) {
        ctx.publish(Feedback::new(self.key.clone(), attribute, value));
    }
}

/// Capability shared by every attribute group
///
/// Only the accessors and [`ControlPoint::kind`] are required. The command
/// operations default to the plain behaviour of [`ControlPointBase`]; groups
/// override the parsers and whatever they do differently.
pub trait ControlPoint: Any + Send {
    fn base(&self) -> &ControlPointBase;

    fn base_mut(&mut self) -> &mut ControlPointBase;

    fn kind(&self) -> ControlPointKind;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn key(&self) -> &str {
        self.base().key()
    }

    fn is_enabled(&self) -> bool {
        self.base().is_enabled()
    }

    /// Whether the group has anything to subscribe to
    fn is_subscribable(&self) -> bool {
        self.base().has_subscriptions()
    }

    fn is_subscribed(&self) -> bool {
        self.base().is_subscribed()
    }

    fn request_get(&mut self, ctx: &mut ProtocolContext, attribute: &str) -> ControlPointResult<()> {
        self.base().request_get(ctx, attribute, TagSelector::Primary);
        Ok(())
    }

    fn request_set(&mut self, ctx: &mut ProtocolContext, attribute: &str, value: &str) -> ControlPointResult<()> {
        self.base()
            .send_command(ctx, Verb::Set, attribute, Some(value), TagSelector::Primary)
    }

    fn request_toggle(&mut self, ctx: &mut ProtocolContext, attribute: &str) -> ControlPointResult<()> {
        self.base()
            .send_command(ctx, Verb::Toggle, attribute, None, TagSelector::Primary)
    }

    fn request_increment(&mut self, ctx: &mut ProtocolContext, attribute: &str, step: &str) -> ControlPointResult<()> {
        self.base()
            .send_command(ctx, Verb::Increment, attribute, Some(step), TagSelector::Primary)
    }

    fn request_decrement(&mut self, ctx: &mut ProtocolContext, attribute: &str, step: &str) -> ControlPointResult<()> {
        self.base()
            .send_command(ctx, Verb::Decrement, attribute, Some(step), TagSelector::Primary)
    }

    fn subscribe(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.base_mut().subscribe_all(ctx)
    }

    fn unsubscribe(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.base_mut().unsubscribe_all(ctx)
    }

    /// Re-issue subscribe lines to check the subscriptions are still alive
    fn probe(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.base().resend_subscriptions(ctx)
    }

    /// Queue a `get` for every subscribable attribute
    fn poll(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        let base = self.base();
        let attributes: Vec<String> = base.subscription_attributes().map(str::to_string).collect();
        for attribute in &attributes {
            base.request_get(ctx, attribute, TagSelector::Primary);
        }
        Ok(())
    }

    /// Handle the reply to a queued `get` issued by this control point
    fn parse_response(&mut self, _ctx: &mut ProtocolContext, _attribute: &str, _reply: &str) -> ControlPointResult<()> {
        Ok(())
    }

    /// Handle a push line routed to this control point
    fn parse_subscription_message(
        &mut self,
        _ctx: &mut ProtocolContext,
        _token: &str,
        _value: &str,
    ) -> ControlPointResult<()> {
        Ok(())
    }
}

/// Look up the attribute a push token belongs to, or fail with the token
pub(crate) fn attribute_for(base: &ControlPointBase, token: &str) -> ControlPointResult<String> {
    base.attribute_for_token(token)
        .map(str::to_string)
        .ok_or_else(|| match SubscriptionToken::parse(token) {
            Ok(token) => ControlPointError::UnexpectedToken(token),
            Err(e) => ControlPointError::Protocol(e),
        })
}
