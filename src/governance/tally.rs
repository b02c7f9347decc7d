//! Turns a proposal's ballots into counts and a pass/fail verdict.
//!
//! Dissolution proposals always use the unanimous-rejection rule. Every other
//! type uses the pass rule registered for the band's voting method; rules are
//! looked up in a [`TallyRules`] registry built once at startup, so a band can
//! be given a different threshold without touching this module.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::governance::{ProposalType, Vote, VoteChoice, VoteCounts};
use crate::models::membership::VotingMethod;

/// Counts plus verdict for one proposal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub yes: u32,
    pub no: u32,
    pub abstain: u32,
    pub total: u32,
    pub eligible_voters: u32,
    /// Share of YES among yes+no votes, 0..=100.
    pub percentage_yes: f64,
    /// Share of NO among yes+no votes, 0..=100.
    pub percentage_no: f64,
    pub passed: bool,
}

impl Tally {
    pub fn counts(&self) -> VoteCounts {
        VoteCounts {
            yes: self.yes,
            no: self.no,
            abstain: self.abstain,
        }
    }
}

/// Pass threshold applied to yes/no counts; abstentions never reach a rule.
pub trait PassRule: Send + Sync {
    fn passes(&self, yes: u32, no: u32, eligible_voters: u32) -> bool;
}

/// More than half of the decisive votes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleMajority;

impl PassRule for SimpleMajority {
    fn passes(&self, yes: u32, no: u32, _eligible_voters: u32) -> bool {
        u64::from(yes) * 2 > u64::from(yes) + u64::from(no)
    }
}

/// At least `numerator / denominator` of the decisive votes.
#[derive(Debug, Clone, Copy)]
pub struct Supermajority {
    pub numerator: u32,
    pub denominator: u32,
}

impl Supermajority {
    pub const TWO_THIRDS: Supermajority = Supermajority {
        numerator: 2,
        denominator: 3,
    };
}

impl PassRule for Supermajority {
    fn passes(&self, yes: u32, no: u32, _eligible_voters: u32) -> bool {
        let decisive = u64::from(yes) + u64::from(no);
        decisive > 0
            && u64::from(yes) * u64::from(self.denominator)
                >= decisive * u64::from(self.numerator)
    }
}

/// Every decisive vote is YES.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unanimity;

impl PassRule for Unanimity {
    fn passes(&self, yes: u32, no: u32, _eligible_voters: u32) -> bool {
        yes > 0 && no == 0
    }
}

/// Registry of pass rules keyed by voting method.
#[derive(Clone)]
pub struct TallyRules {
    rules: HashMap<VotingMethod, Arc<dyn PassRule>>,
}

impl TallyRules {
    pub fn standard() -> Self {
        let mut rules: HashMap<VotingMethod, Arc<dyn PassRule>> = HashMap::new();
        rules.insert(VotingMethod::SimpleMajority, Arc::new(SimpleMajority));
        rules.insert(VotingMethod::SuperMajority, Arc::new(Supermajority::TWO_THIRDS));
        rules.insert(VotingMethod::Unanimous, Arc::new(Unanimity));
        Self { rules }
    }

    pub fn with_rule(mut self, method: VotingMethod, rule: Arc<dyn PassRule>) -> Self {
        self.rules.insert(method, rule);
        self
    }

    pub fn rule_for(&self, method: VotingMethod) -> Option<&dyn PassRule> {
        self.rules.get(&method).map(|rule| rule.as_ref())
    }
}

impl Default for TallyRules {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for TallyRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.rules.keys().copied().collect();
        methods.sort();
        f.debug_struct("TallyRules").field("methods", &methods).finish()
    }
}

/// Computes the tally of `votes` for a proposal of `proposal_type`.
///
/// A proposal with no decisive (yes/no) votes never passes.
pub fn compute_verdict(
    proposal_type: ProposalType,
    votes: &[Vote],
    eligible_voters: u32,
    rule: &dyn PassRule,
) -> Tally {
    let counts = VoteCounts::from_choices(votes.iter().map(|vote| &vote.choice));
    let decisive = counts.yes + counts.no;

    let passed = match proposal_type {
        // Non-voters are ignored; one NO anywhere sinks it.
        ProposalType::Dissolution => counts.yes > 0 && counts.no == 0,
        ProposalType::General
        | ProposalType::Budget
        | ProposalType::Project
        | ProposalType::Policy
        | ProposalType::Membership => {
            decisive > 0 && rule.passes(counts.yes, counts.no, eligible_voters)
        }
    };

    let (percentage_yes, percentage_no) = if decisive == 0 {
        (0.0, 0.0)
    } else {
        (
            f64::from(counts.yes) * 100.0 / f64::from(decisive),
            f64::from(counts.no) * 100.0 / f64::from(decisive),
        )
    };

    let tally = Tally {
        yes: counts.yes,
        no: counts.no,
        abstain: counts.abstain,
        total: counts.total(),
        eligible_voters,
        percentage_yes,
        percentage_no,
        passed,
    };
    assert_eq!(
        tally.total as usize,
        votes.len(),
        "Tally must account for every ballot"
    );
    tally
}

pub(crate) fn choice_allowed(proposal_type: ProposalType, choice: VoteChoice) -> bool {
    choice != VoteChoice::Abstain || proposal_type.allows_abstain()
}
