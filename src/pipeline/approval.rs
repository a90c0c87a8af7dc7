//! Approval disposition — decides whether a generated reply may be sent
//! without a human.

use crate::store::{ApprovalStatus, Direction};

/// Minimum confidence for an automatic send.
pub const AUTO_APPROVE_THRESHOLD: f64 = 0.6;

/// The decision attached to a generated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Send now; stored as `outbound`.
    AutoApproved,
    /// Wait for a human; stored as `outbound_draft`.
    Pending,
}

impl Disposition {
    pub fn approval_status(&self) -> ApprovalStatus {
        match self {
            Self::AutoApproved => ApprovalStatus::AutoApproved,
            Self::Pending => ApprovalStatus::Pending,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::AutoApproved => Direction::Outbound,
            Self::Pending => Direction::OutboundDraft,
        }
    }
}

/// Combine escalation, the auto-respond policy and confidence.
///
/// Order matters: escalation always wins, then a disabled auto-respond
/// toggle, and only then the confidence threshold.
pub fn determine_approval(
    confidence: f64,
    auto_respond_enabled: bool,
    should_escalate: bool,
) -> Disposition {
    if should_escalate {
        return Disposition::Pending;
    }
    if !auto_respond_enabled {
        return Disposition::Pending;
    }
    if confidence < AUTO_APPROVE_THRESHOLD {
        return Disposition::Pending;
    }
    Disposition::AutoApproved
}
