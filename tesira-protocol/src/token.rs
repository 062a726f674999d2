//! Subscription tokens
//!
//! A token is the custom name handed to the device in a `subscribe` command and
//! echoed back in every push line for that subscription. Tokens are derived, not
//! random: `<instanceTag>__<attribute><index>`, e.g. `Tag1__level1`.

use std::borrow::Borrow;
use std::fmt;

use crate::error::{ProtocolError, Result};

/// Separator between the instance tag and the attribute/index suffix
pub const TOKEN_DELIMITER: &str = "__";

/// Custom name correlating push lines to one attribute of one control point
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(String);

impl SubscriptionToken {
    /// Derive the token for `attribute` at `index` on the block `tag`
    pub fn new(tag: &str, attribute: &str, index: u32) -> Self {
        Self(format!("{tag}{TOKEN_DELIMITER}{attribute}{index}"))
    }

    /// Accept a token received from the device
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.rsplit_once(TOKEN_DELIMITER) {
            Some((tag, suffix)) if !tag.is_empty() && !suffix.is_empty() => Ok(Self(raw.to_string())),
            _ => Err(ProtocolError::InvalidToken(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Instance tag part of the token
    pub fn tag(&self) -> &str {
        self.0
            .rsplit_once(TOKEN_DELIMITER)
            .map(|(tag, _)| tag)
            .unwrap_or(&self.0)
    }

    /// Attribute and index part of the token (`level1`)
    pub fn suffix(&self) -> &str {
        self.0
            .rsplit_once(TOKEN_DELIMITER)
            .map(|(_, suffix)| suffix)
            .unwrap_or("")
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SubscriptionToken {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SubscriptionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
