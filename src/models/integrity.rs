use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{BandId, ProposalId};

wire_enum! {
    pub enum IssueSeverity {
        Info => "INFO",
        Warning => "WARNING",
        Blocking => "BLOCKING",
    }
}

/// A single finding raised by the integrity hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub code: String,
    pub severity: IssueSeverity,
    pub message: String,
    #[serde(default)]
    pub field: Option<String>,
}

/// Verdict returned by the integrity hook for one pending mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub can_proceed: bool,
    #[serde(default)]
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn clear() -> Self {
        Self {
            can_proceed: true,
            issues: Vec::new(),
        }
    }
}

wire_enum! {
    pub enum IntegrityAction {
        Create => "CREATE",
        Edit => "EDIT",
    }
}

/// Payload handed to the integrity hook before a content-bearing write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityRequest {
    pub entity_type: &'static str,
    pub action: IntegrityAction,
    pub band_id: BandId,
    pub data: Value,
    pub parent_id: Option<ProposalId>,
}

/// The caller's answer to a flagged-but-allowed integrity report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityAck {
    #[serde(default)]
    pub proceed_with_flags: bool,
}

impl IntegrityAck {
    pub const NONE: IntegrityAck = IntegrityAck {
        proceed_with_flags: false,
    };
    pub const PROCEED: IntegrityAck = IntegrityAck {
        proceed_with_flags: true,
    };
}
