//! Access gate: admits or rejects a sender before the pipeline runs.

use std::collections::BTreeSet;

use crate::config::Config;
use crate::types::SenderId;

/// Immutable sender allow-list, built once from [`Config`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessGate {
    allowed: BTreeSet<SenderId>,
}

impl AccessGate {
    pub fn new(allowed: impl IntoIterator<Item = SenderId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed: config.allowed_ids.clone(),
        }
    }

    /// An empty allow-list denies everyone.
    pub fn admits(&self, sender: SenderId) -> bool {
        self.allowed.contains(&sender)
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}
