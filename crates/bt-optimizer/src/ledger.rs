//! Append-only trial history for a single study.

use bt_types::{BtResult, Configuration};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sampler::ProposalPhase;
use crate::trial::{ObjectiveDirection, Trial, TrialOutcome, TrialState};

/// Every trial attempted in a study, in the order it was recorded.
///
/// Trials can only be appended; existing entries are never modified. The
/// best trial is derived from the history rather than stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialLedger {
    direction: ObjectiveDirection,
    trials: Vec<Trial>,
}

impl TrialLedger {
    pub fn new(direction: ObjectiveDirection) -> Self {
        Self {
            direction,
            trials: Vec::new(),
        }
    }

    /// Append a new trial and return it. Sequence numbers are assigned here.
    pub fn record(
        &mut self,
        configuration: Configuration,
        outcome: TrialOutcome,
        phase: ProposalPhase,
        duration: Option<Duration>,
    ) -> &Trial {
        let number = self.trials.len();
        self.trials
            .push(Trial::new(number, configuration, outcome, phase, duration));
        &self.trials[number]
    }

    pub fn direction(&self) -> ObjectiveDirection {
        self.direction
    }

    /// Ordered, read-only view of the full history.
    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn completed(&self) -> impl Iterator<Item = &Trial> {
        self.trials.iter().filter(|t| t.is_completed())
    }

    pub fn count(&self, state: TrialState) -> usize {
        self.trials.iter().filter(|t| t.state() == state).count()
    }

    /// The completed trial with the best cost. Ties go to the earliest trial.
    pub fn best(&self) -> Option<&Trial> {
        best_of(self.trials.iter(), self.direction)
    }

    /// Pretty-printed JSON of the full history, for external plotting tools.
    pub fn export_json(&self) -> BtResult<String> {
        Ok(serde_json::to_string_pretty(&self.trials)?)
    }
}

pub(crate) fn best_of<'a>(
    trials: impl Iterator<Item = &'a Trial>,
    direction: ObjectiveDirection,
) -> Option<&'a Trial> {
    let mut best: Option<(&Trial, f64)> = None;
    for trial in trials {
        let Some(cost) = trial.cost() else {
            continue;
        };
        let dominated = match best {
            None => true,
            Some((_, best_cost)) => direction.improves(cost, best_cost),
        };
        if dominated {
            best = Some((trial, cost));
        }
    }
    best.map(|(trial, _)| trial)
}
