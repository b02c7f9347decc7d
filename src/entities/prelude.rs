#![allow(unused_imports)]

pub use super::founder_nomination::Entity as FounderNomination;
pub use super::founder_nomination_vote::Entity as FounderNominationVote;
pub use super::proposal::Entity as Proposal;
pub use super::proposal_vote::Entity as ProposalVote;
