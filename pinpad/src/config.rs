//! Terminal coordination configuration

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::BridgeOperation;

/// What happens to a two-phase approval right after it is held
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPolicy {
    /// Operator confirms or undoes
    #[default]
    Manual,
    /// Confirm immediately (`confirmed_automatic`)
    Automatic,
}

impl FromStr for ConfirmationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "automatic" | "auto" => Ok(Self::Automatic),
            other => Err(format!("unknown confirmation policy: {}", other)),
        }
    }
}

/// Per-operation deadlines (milliseconds)
///
/// A deadline only unblocks the caller; the device keeps working on the
/// operation it was given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deadlines {
    /// Card dip / PIX QR wait
    pub authorize_ms: u64,
    pub resolve_ms: u64,
    pub cancel_ms: u64,
    pub reprint_ms: u64,
    pub query_ms: u64,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            authorize_ms: 120_000,
            resolve_ms: 30_000,
            cancel_ms: 120_000,
            reprint_ms: 30_000,
            query_ms: 30_000,
        }
    }
}

impl Deadlines {
    /// Same deadline for every operation
    pub fn uniform(ms: u64) -> Self {
        Self {
            authorize_ms: ms,
            resolve_ms: ms,
            cancel_ms: ms,
            reprint_ms: ms,
            query_ms: ms,
        }
    }

    pub fn for_operation(&self, operation: BridgeOperation) -> Duration {
        let ms = match operation {
            BridgeOperation::Authorize => self.authorize_ms,
            BridgeOperation::ResolvePendency => self.resolve_ms,
            BridgeOperation::CancelSettled => self.cancel_ms,
            BridgeOperation::ReprintLast => self.reprint_ms,
            BridgeOperation::QueryPendency => self.query_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Terminal coordination configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerminalConfig {
    #[serde(default)]
    pub deadlines: Deadlines,
    #[serde(default)]
    pub confirmation_policy: ConfirmationPolicy,
}

impl TerminalConfig {
    pub fn with_deadlines(mut self, deadlines: Deadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.confirmation_policy = policy;
        self
    }
}
