//! Boundary to the external evaluation collaborator.

use bt_types::{Configuration, EvaluationError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::trial::TrialOutcome;

/// Measures the cost of one configuration, e.g. by launching and timing a
/// kernel. Must be safe to share across threads for batched studies.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, configuration: &Configuration) -> Result<f64, EvaluationError>;
}

impl<F> Evaluator for F
where
    F: Fn(&Configuration) -> Result<f64, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, configuration: &Configuration) -> Result<f64, EvaluationError> {
        self(configuration)
    }
}

/// Normalized result of a single evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Either `Completed` or `Failed`.
    pub outcome: TrialOutcome,
    pub duration: Duration,
}

/// Runs accepted configurations through an [`Evaluator`] exactly once and
/// turns every kind of failure into a `Failed` outcome.
pub struct TrialExecutor<'a, E: Evaluator + ?Sized> {
    evaluator: &'a E,
}

impl<'a, E: Evaluator + ?Sized> TrialExecutor<'a, E> {
    pub fn new(evaluator: &'a E) -> Self {
        Self { evaluator }
    }

    pub fn run(&self, configuration: &Configuration) -> Execution {
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.evaluator.evaluate(configuration)))
            .unwrap_or_else(|payload| {
                Err(EvaluationError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            })
            .and_then(validate_cost);
        let duration = start.elapsed();

        let outcome = match result {
            Ok(cost) => TrialOutcome::Completed { cost },
            Err(e) => {
                warn!("Trial failed for {}: {}", configuration, e);
                TrialOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        Execution { outcome, duration }
    }
}

/// A cost must be a finite, non-negative measurement.
fn validate_cost(cost: f64) -> Result<f64, EvaluationError> {
    if !cost.is_finite() {
        return Err(EvaluationError::InvalidResult {
            message: format!("non-finite cost {cost}"),
        });
    }
    if cost < 0.0 {
        return Err(EvaluationError::InvalidResult {
            message: format!("negative cost {cost}"),
        });
    }
    Ok(cost)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
