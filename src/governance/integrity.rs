//! Pre-commit content screening through the integrity hook.

use serde_json::json;
use tracing::warn;

use super::GovernanceEngine;
use crate::error::{GovernanceError, GovernanceResult};
use crate::models::governance::{ProposalContent, ProposalType};
use crate::models::integrity::{
    IntegrityAck, IntegrityAction, IntegrityIssue, IntegrityReport, IntegrityRequest,
};
use crate::models::ProposalId;

pub const PROPOSAL_ENTITY: &str = "proposal";

/// Decides whether a write may go ahead given the hook's report and the
/// caller's acknowledgement. Returns the issues the caller chose to override.
pub fn screen(report: IntegrityReport, ack: IntegrityAck) -> GovernanceResult<Vec<IntegrityIssue>> {
    if !report.can_proceed {
        return Err(GovernanceError::IntegrityBlocked {
            issues: report.issues,
            overridable: false,
        });
    }
    if report.issues.is_empty() {
        return Ok(Vec::new());
    }
    if !ack.proceed_with_flags {
        return Err(GovernanceError::IntegrityBlocked {
            issues: report.issues,
            overridable: true,
        });
    }
    Ok(report.issues)
}

impl GovernanceEngine {
    pub(super) async fn screen_content(
        &self,
        band_id: &str,
        action: IntegrityAction,
        proposal_type: ProposalType,
        content: &ProposalContent,
        parent_id: Option<ProposalId>,
        ack: IntegrityAck,
    ) -> GovernanceResult<Vec<IntegrityIssue>> {
        let request = IntegrityRequest {
            entity_type: PROPOSAL_ENTITY,
            action,
            band_id: band_id.to_string(),
            data: json!({
                "proposal_type": proposal_type,
                "content": content,
            }),
            parent_id,
        };
        let report = self.integrity.check(&request).await?;
        screen(report, ack).inspect_err(|err| {
            warn!(band_id, ?parent_id, %action, "integrity hook held the write: {err}");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::integrity::IssueSeverity;

    fn issue(code: &str, severity: IssueSeverity) -> IntegrityIssue {
        IntegrityIssue {
            code: code.into(),
            severity,
            message: format!("{code} raised"),
            field: Some("description".into()),
        }
    }

    #[test]
    fn clean_report_passes_without_ack() {
        assert!(screen(IntegrityReport::clear(), IntegrityAck::NONE)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn refusal_is_never_overridable() {
        let report = IntegrityReport {
            can_proceed: false,
            issues: vec![issue("PROFANITY", IssueSeverity::Blocking)],
        };
        let err = screen(report, IntegrityAck::PROCEED).unwrap_err();
        match err {
            GovernanceError::IntegrityBlocked {
                issues,
                overridable,
            } => {
                assert!(!overridable);
                assert_eq!(issues.len(), 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn flagged_report_needs_explicit_ack() {
        let report = IntegrityReport {
            can_proceed: true,
            issues: vec![issue("DUPLICATE_TITLE", IssueSeverity::Warning)],
        };
        let err = screen(report.clone(), IntegrityAck::NONE).unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::IntegrityBlocked {
                overridable: true,
                ..
            }
        ));

        let overridden = screen(report, IntegrityAck::PROCEED).unwrap();
        assert_eq!(overridden[0].code, "DUPLICATE_TITLE");
    }
}
