use crate::error::{GovernanceError, GovernanceResult};

/// Number of times a rejected or withdrawn proposal may be sent back.
pub const MAX_SUBMISSIONS: u32 = 3;

/// Refuses a resubmission once `submission_count` has reached the cap.
pub fn check_resubmission(submission_count: u32) -> GovernanceResult<()> {
    if submission_count >= MAX_SUBMISSIONS {
        return Err(GovernanceError::LimitExceeded(format!(
            "proposal has already been resubmitted {submission_count} times (limit {MAX_SUBMISSIONS})"
        )));
    }
    Ok(())
}
