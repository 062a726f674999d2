//! Level and mute on a gain block
//!
//! Levels travel in dB on the wire and are exposed scaled to `0..=65535`
//! across the block's own range. The range has to be read from the device
//! (`minLevel`, then `maxLevel`) before the level subscription is opened,
//! otherwise the first pushes could not be scaled. Both subscriptions go out
//! together once the range is known.

use tesira_protocol::attribute::{LEVEL, MAX_LEVEL, MIN_LEVEL, MUTE};
use tesira_protocol::reply;

use super::{attribute_for, impl_any, ControlPoint, ControlPointBase, ControlPointKind, TagSelector};
use crate::context::ProtocolContext;
use crate::error::{ControlPointError, ControlPointResult};
use crate::event::FeedbackValue;

/// Top of the scaled level range
pub const LEVEL_SCALE_MAX: u16 = u16::MAX;

/// Discovery state of a fader's dB range
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelRange {
    Unknown,
    MinKnown { min: f64 },
    Known { min: f64, max: f64 },
}

impl LevelRange {
    /// Scale a dB value onto `0..=LEVEL_SCALE_MAX`, clamping outside the range
    pub fn scale(&self, db: f64) -> Option<u16> {
        let LevelRange::Known { min, max } = *self else {
            return None;
        };
        let fraction = ((db - min) / (max - min)).clamp(0.0, 1.0);
        Some((fraction * f64::from(LEVEL_SCALE_MAX)).round() as u16)
    }

    /// Inverse of [`LevelRange::scale`]
    pub fn unscale(&self, level: u16) -> Option<f64> {
        let LevelRange::Known { min, max } = *self else {
            return None;
        };
        Some(min + (f64::from(level) / f64::from(LEVEL_SCALE_MAX)) * (max - min))
    }

    pub fn is_known(&self) -> bool {
        matches!(self, LevelRange::Known { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Fader {
    base: ControlPointBase,
    range: LevelRange,
    /// Subscribe to `level` as soon as the range is known
    level_subscribe_pending: bool,
    level_db: Option<f64>,
    muted: Option<bool>,
    step_db: f64,
}

impl Fader {
    pub const DEFAULT_STEP_DB: f64 = 1.0;

    pub fn new(mut base: ControlPointBase) -> Self {
        base.declare_subscription(MUTE, TagSelector::Primary, None);
        base.declare_subscription(LEVEL, TagSelector::Primary, None);
        Self {
            base,
            range: LevelRange::Unknown,
            level_subscribe_pending: false,
            level_db: None,
            muted: None,
            step_db: Self::DEFAULT_STEP_DB,
        }
    }

    /// dB step used by [`Fader::level_up`] and [`Fader::level_down`]
    pub fn with_step(mut self, step_db: f64) -> Self {
        self.step_db = step_db;
        self
    }

    pub fn range(&self) -> LevelRange {
        self.range
    }

    pub fn level_db(&self) -> Option<f64> {
        self.level_db
    }

    /// Current level scaled to `0..=65535`, once the range is known
    pub fn level(&self) -> Option<u16> {
        self.level_db.and_then(|db| self.range.scale(db))
    }

    pub fn is_muted(&self) -> Option<bool> {
        self.muted
    }

    /// Start reading the range; `maxLevel` is chained from the `minLevel` reply
    pub fn discover_range(&mut self, ctx: &mut ProtocolContext) {
        self.range = LevelRange::Unknown;
        self.base.request_get(ctx, MIN_LEVEL, TagSelector::Primary);
    }

    /// Open the level subscription; the range must be known
    pub fn subscribe_level(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        if !self.range.is_known() {
            return Err(ControlPointError::BoundsUnknown {
                attribute: LEVEL.to_string(),
            });
        }
        self.level_subscribe_pending = false;
        self.base.subscribe_attribute(ctx, LEVEL)
    }

    /// Set the level on the `0..=65535` scale
    pub fn set_level(&mut self, ctx: &mut ProtocolContext, level: u16) -> ControlPointResult<()> {
        let db = self.range.unscale(level).ok_or_else(|| ControlPointError::BoundsUnknown {
            attribute: LEVEL.to_string(),
        })?;
        self.set_level_db(ctx, db)
    }

    pub fn set_level_db(&mut self, ctx: &mut ProtocolContext, db: f64) -> ControlPointResult<()> {
        let db = match self.range {
            LevelRange::Known { min, max } => db.clamp(min, max),
            _ => db,
        };
        self.request_set(ctx, LEVEL, &format!("{db:.2}"))
    }

    pub fn level_up(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        let step = self.step_db.to_string();
        self.request_increment(ctx, LEVEL, &step)
    }

    pub fn level_down(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        let step = self.step_db.to_string();
        self.request_decrement(ctx, LEVEL, &step)
    }

    pub fn set_mute(&mut self, ctx: &mut ProtocolContext, muted: bool) -> ControlPointResult<()> {
        self.request_set(ctx, MUTE, if muted { "true" } else { "false" })
    }

    pub fn toggle_mute(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.request_toggle(ctx, MUTE)
    }

    fn apply_level(&mut self, ctx: &ProtocolContext, value: &str) -> ControlPointResult<()> {
        let db = reply::parse_f64(LEVEL, value)?;
        self.level_db = Some(db);
        self.base.publish(ctx, LEVEL, FeedbackValue::Decibels(db));
        if let Some(level) = self.range.scale(db) {
            self.base.publish(ctx, LEVEL, FeedbackValue::Level(level));
        }
        Ok(())
    }

    fn apply_mute(&mut self, ctx: &ProtocolContext, value: &str) -> ControlPointResult<()> {
        let muted = reply::parse_bool(MUTE, value)?;
        self.muted = Some(muted);
        self.base.publish(ctx, MUTE, FeedbackValue::Bool(muted));
        Ok(())
    }
}

impl ControlPoint for Fader {
    impl_any!();

    fn base(&self) -> &ControlPointBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControlPointBase {
        &mut self.base
    }

    fn kind(&self) -> ControlPointKind {
        ControlPointKind::Fader
    }

    /// Reads the range first; mute and level are subscribed from the
    /// `maxLevel` reply
    ///
    /// The device acknowledges subscribe lines with a bare `+OK`, which would
    /// be taken as the reply to a queued `get` still in flight. Nothing is
    /// sent directly until discovery has drained.
    fn subscribe(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.base.begin_subscription();
        self.level_subscribe_pending = true;
        self.discover_range(ctx);
        Ok(())
    }

    fn unsubscribe(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.level_subscribe_pending = false;
        self.base.unsubscribe_all(ctx)
    }

    fn poll(&mut self, ctx: &mut ProtocolContext) -> ControlPointResult<()> {
        self.discover_range(ctx);
        self.base.request_get(ctx, MUTE, TagSelector::Primary);
        Ok(())
    }

    fn parse_response(&mut self, ctx: &mut ProtocolContext, attribute: &str, line: &str) -> ControlPointResult<()> {
        match attribute {
            MIN_LEVEL => {
                let min = reply::parse_f64(MIN_LEVEL, reply::reply_value(line)?)?;
                self.range = LevelRange::MinKnown { min };
                self.base.request_get(ctx, MAX_LEVEL, TagSelector::Primary);
                Ok(())
            }
            MAX_LEVEL => {
                let raw = reply::reply_value(line)?;
                let max = reply::parse_f64(MAX_LEVEL, raw)?;
                let min = match self.range {
                    LevelRange::MinKnown { min } | LevelRange::Known { min, .. } => min,
                    LevelRange::Unknown => {
                        return Err(ControlPointError::BoundsUnknown {
                            attribute: MIN_LEVEL.to_string(),
                        })
                    }
                };
                if max <= min {
                    return Err(tesira_protocol::ProtocolError::InvalidValue {
                        attribute: MAX_LEVEL.to_string(),
                        value: raw.to_string(),
                    }
                    .into());
                }
                self.range = LevelRange::Known { min, max };
                tracing::debug!("{} range is {} to {} dB", self.base.key(), min, max);

                if self.level_subscribe_pending {
                    self.base.subscribe_attribute(ctx, MUTE)?;
                    self.subscribe_level(ctx)
                } else {
                    self.base.request_get(ctx, LEVEL, TagSelector::Primary);
                    Ok(())
                }
            }
            LEVEL => self.apply_level(ctx, reply::reply_value(line)?),
            MUTE => self.apply_mute(ctx, reply::reply_value(line)?),
            _ => Ok(()),
        }
    }

    fn parse_subscription_message(&mut self, ctx: &mut ProtocolContext, token: &str, value: &str) -> ControlPointResult<()> {
        match attribute_for(&self.base, token)?.as_str() {
            LEVEL => self.apply_level(ctx, value),
            MUTE => self.apply_mute(ctx, value),
            _ => Ok(()),
        }
    }
}
