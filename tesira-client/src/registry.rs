//! Subscription token registration with conflict protection
//!
//! Push lines carry nothing but a token and a value, so the registry is the
//! only thing standing between a push and the control point that asked for
//! it. Tokens are derived from instance tag, attribute and index; two control
//! points configured on the same block and index would derive the same token.
//! Registration fails fast in that case instead of silently routing every
//! push to whichever registered first.

use std::collections::{BTreeSet, HashMap};

use tesira_protocol::SubscriptionToken;

use crate::control_point::ControlPointId;
use crate::error::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct RegistryEntry {
    id: ControlPointId,
    key: String,
}

/// Bidirectional token ↔ control point mapping
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_token: HashMap<SubscriptionToken, RegistryEntry>,
    by_control_point: HashMap<ControlPointId, BTreeSet<SubscriptionToken>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `token` to the control point `id`
    ///
    /// Re-registering a token for the same control point is a no-op.
    pub fn register(&mut self, token: SubscriptionToken, id: ControlPointId, key: &str) -> Result<(), RegistryError> {
        if let Some(existing) = self.by_token.get(&token) {
            if existing.id == id {
                return Ok(());
            }
            return Err(RegistryError::TokenConflict {
                token,
                existing: existing.key.clone(),
                requested: key.to_string(),
            });
        }

        self.by_control_point
            .entry(id)
            .or_default()
            .insert(token.clone());
        self.by_token.insert(
            token,
            RegistryEntry {
                id,
                key: key.to_string(),
            },
        );
        Ok(())
    }

    /// Remove a token, returning the control point it routed to
    pub fn unregister(&mut self, token: &str) -> Option<ControlPointId> {
        let entry = self.by_token.remove(token)?;
        if let Some(tokens) = self.by_control_point.get_mut(&entry.id) {
            tokens.remove(token);
            if tokens.is_empty() {
                self.by_control_point.remove(&entry.id);
            }
        }
        Some(entry.id)
    }

    /// Remove every token owned by a control point
    pub fn unregister_control_point(&mut self, id: ControlPointId) -> usize {
        let Some(tokens) = self.by_control_point.remove(&id) else {
            return 0;
        };
        for token in &tokens {
            self.by_token.remove(token);
        }
        tokens.len()
    }

    pub fn lookup(&self, token: &str) -> Option<ControlPointId> {
        self.by_token.get(token).map(|entry| entry.id)
    }

    pub fn tokens_for(&self, id: ControlPointId) -> Vec<SubscriptionToken> {
        self.by_control_point
            .get(&id)
            .map(|tokens| tokens.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_token.clear();
        self.by_control_point.clear();
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_tokens: self.by_token.len(),
            control_points: self.by_control_point.len(),
        }
    }
}

/// Statistics about the registry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_tokens: usize,
    pub control_points: usize,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} token(s) across {} control point(s)",
            self.total_tokens, self.control_points
        )
    }
}
