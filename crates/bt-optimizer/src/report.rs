//! End-of-study summary.

use bt_types::{BtResult, Configuration};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::study::{Study, StudyId, StudyState};
use crate::trial::{ObjectiveDirection, TrialState};

/// The winning trial of a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestTrial {
    pub trial_id: Uuid,
    pub number: usize,
    pub configuration: Configuration,
    pub cost: f64,
}

/// Counts and best result of a study. `best` is `None` when every trial was
/// pruned or failed, which is a valid outcome rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyReport {
    pub study_id: StudyId,
    pub name: String,
    pub direction: ObjectiveDirection,
    pub seed: u64,
    pub state: StudyState,
    pub n_trials: usize,
    pub completed: usize,
    pub pruned: usize,
    pub failed: usize,
    pub best: Option<BestTrial>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StudyReport {
    pub fn from_study(study: &Study) -> Self {
        let ledger = study.ledger();
        let best = ledger.best().and_then(|trial| {
            Some(BestTrial {
                trial_id: trial.id,
                number: trial.number,
                configuration: trial.configuration.clone(),
                cost: trial.cost()?,
            })
        });

        Self {
            study_id: study.id(),
            name: study.config().name.clone(),
            direction: study.config().direction,
            seed: study.config().seed,
            state: study.state(),
            n_trials: ledger.len(),
            completed: ledger.count(TrialState::Completed),
            pruned: ledger.count(TrialState::Pruned),
            failed: ledger.count(TrialState::Failed),
            best,
            started_at: study.started_at(),
            finished_at: study.finished_at(),
        }
    }

    pub fn has_best(&self) -> bool {
        self.best.is_some()
    }

    pub fn to_json(&self) -> BtResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for StudyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Study {}: {} trials ({} completed, {} pruned, {} failed)",
            self.name, self.n_trials, self.completed, self.pruned, self.failed
        )?;
        match &self.best {
            Some(best) => {
                writeln!(f, "Best cost: {:.3} (trial {})", best.cost, best.number)?;
                writeln!(f, "Best parameters:")?;
                for (name, value) in best.configuration.iter() {
                    writeln!(f, "  {name}: {value}")?;
                }
                Ok(())
            }
            None => writeln!(f, "No completed trial: every attempt was pruned or failed"),
        }
    }
}
