//! Moderation state: review status, flag history and rating aggregate.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rawsy_core::{DomainError, UserId, ValueObject};

/// Admin-controlled visibility gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
        }
    }
}

/// Outcome of an admin review. `pending` is not a valid decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn status(self) -> ModerationStatus {
        match self {
            ReviewDecision::Approved => ModerationStatus::Approved,
            ReviewDecision::Rejected => ModerationStatus::Rejected,
        }
    }
}

impl FromStr for ReviewDecision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(ReviewDecision::Approved),
            "rejected" => Ok(ReviewDecision::Rejected),
            other => Err(DomainError::invalid_argument(format!(
                "decision must be 'approved' or 'rejected' (got '{other}')"
            ))),
        }
    }
}

/// One report filed against a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRecord {
    pub reason: String,
    pub date: DateTime<Utc>,
    pub user: UserId,
}

impl ValueObject for FlagRecord {}

/// Flag bookkeeping.
///
/// The count is the length of the append-only history, so the two can never
/// drift apart. `flagged` is a visibility toggle: `clear` resets it without
/// touching the history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagState {
    flagged: bool,
    flag_reason: Option<String>,
    flagged_by: Option<UserId>,
    flags: Vec<FlagRecord>,
}

impl FlagState {
    pub fn flagged(&self) -> bool {
        self.flagged
    }

    pub fn flag_count(&self) -> u64 {
        self.flags.len() as u64
    }

    pub fn flag_reason(&self) -> Option<&str> {
        self.flag_reason.as_deref()
    }

    pub fn flagged_by(&self) -> Option<UserId> {
        self.flagged_by
    }

    pub fn history(&self) -> &[FlagRecord] {
        &self.flags
    }

    pub(crate) fn record(&mut self, flag: FlagRecord) {
        self.flagged = true;
        self.flag_reason = Some(flag.reason.clone());
        self.flagged_by = Some(flag.user);
        self.flags.push(flag);
    }

    pub(crate) fn clear(&mut self) {
        self.flagged = false;
    }
}

/// Running rating aggregate, maintained by the external review subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub average: f64,
    pub count: u64,
}

impl ValueObject for Rating {}
