//! Feasibility gate applied before any evaluation.

use bt_types::Configuration;

use crate::space::ParameterSpace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneDecision {
    Accept,
    /// Carries the human-readable reason recorded on the pruned trial.
    Reject(String),
}

impl PruneDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Rejects configurations that are malformed or violate a declared
/// constraint, so the evaluator only ever sees feasible points.
#[derive(Debug, Clone, Copy)]
pub struct PruneGate<'a> {
    space: &'a ParameterSpace,
}

impl<'a> PruneGate<'a> {
    pub fn new(space: &'a ParameterSpace) -> Self {
        Self { space }
    }

    pub fn check(&self, config: &Configuration) -> PruneDecision {
        if let Err(e) = self.space.check_assignment(config) {
            return PruneDecision::Reject(e.to_string());
        }

        match self.space.first_violation(config) {
            Some(constraint) => PruneDecision::Reject(constraint.rejection_reason(config)),
            None => PruneDecision::Accept,
        }
    }
}
