//! # bt-optimizer
//!
//! Constraint-aware autotuning of kernel launch parameters.
//!
//! Provides parameter space and constraint definitions, a uniform and a
//! TPE sampler, the prune gate that keeps infeasible configurations away from
//! the evaluator, an append-only trial ledger, and the study loop that ties
//! them together under a fixed trial budget.

mod executor;
mod ledger;
mod prune;
mod report;
mod sampler;
mod space;
mod study;
mod trial;

pub use executor::{Evaluator, Execution, TrialExecutor};
pub use ledger::TrialLedger;
pub use prune::{PruneDecision, PruneGate};
pub use report::{BestTrial, StudyReport};
pub use sampler::{
    split_good_bad, CategoricalDensity, Proposal, ProposalPhase, RandomSampler, Sampler,
    StudyRng, TpeSampler,
};
pub use space::{Constraint, ParameterDef, ParameterKind, ParameterSpace};
pub use study::{SamplerKind, Study, StudyConfig, StudyId, StudyState};
pub use trial::{ObjectiveDirection, Trial, TrialOutcome, TrialState};
