//! Trial records and their outcomes.

use bt_types::Configuration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::sampler::ProposalPhase;

/// Whether we are minimizing or maximizing the measured cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    #[default]
    Minimize,
    Maximize,
}

impl ObjectiveDirection {
    /// True if `candidate` strictly improves on `incumbent`.
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Minimize => candidate < incumbent,
            Self::Maximize => candidate > incumbent,
        }
    }

    /// Ordering that puts better costs first.
    pub fn compare(self, a: f64, b: f64) -> std::cmp::Ordering {
        match self {
            Self::Minimize => a.total_cmp(&b),
            Self::Maximize => b.total_cmp(&a),
        }
    }
}

/// How a trial ended. Exactly one variant applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrialOutcome {
    /// Evaluated successfully; `cost` is finite and non-negative.
    Completed { cost: f64 },
    /// Rejected by a feasibility constraint, never evaluated.
    Pruned { reason: String },
    /// The evaluator errored or returned an unusable measurement.
    Failed { reason: String },
}

impl TrialOutcome {
    pub fn state(&self) -> TrialState {
        match self {
            Self::Completed { .. } => TrialState::Completed,
            Self::Pruned { .. } => TrialState::Pruned,
            Self::Failed { .. } => TrialState::Failed,
        }
    }

    pub fn cost(&self) -> Option<f64> {
        match self {
            Self::Completed { cost } => Some(*cost),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Completed { .. } => None,
            Self::Pruned { reason } | Self::Failed { reason } => Some(reason),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    Completed,
    Pruned,
    Failed,
}

/// A single attempted configuration and its recorded outcome.
///
/// Trials are created by [`TrialLedger::record`](crate::TrialLedger::record)
/// and only ever handed out by shared reference afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    /// Zero-based position in the study.
    pub number: usize,
    pub configuration: Configuration,
    pub outcome: TrialOutcome,
    /// Which branch of the sampler proposed this configuration.
    pub phase: ProposalPhase,
    pub recorded_at: DateTime<Utc>,
    /// Wall time spent in the evaluator; `None` for pruned trials.
    pub duration_ms: Option<f64>,
}

impl Trial {
    pub fn new(
        number: usize,
        configuration: Configuration,
        outcome: TrialOutcome,
        phase: ProposalPhase,
        duration: Option<Duration>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            configuration,
            outcome,
            phase,
            recorded_at: Utc::now(),
            duration_ms: duration.map(|d| d.as_secs_f64() * 1000.0),
        }
    }

    pub fn state(&self) -> TrialState {
        self.outcome.state()
    }

    pub fn cost(&self) -> Option<f64> {
        self.outcome.cost()
    }

    pub fn is_completed(&self) -> bool {
        self.outcome.is_completed()
    }
}
