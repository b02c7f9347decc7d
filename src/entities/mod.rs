pub mod founder_nomination;
pub mod founder_nomination_vote;
pub mod prelude;
pub mod proposal;
pub mod proposal_vote;
