//! Study configuration and the sequential search loop.

use bt_types::{config_error, internal_error, BtResult, Configuration};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::executor::{Evaluator, TrialExecutor};
use crate::ledger::TrialLedger;
use crate::prune::{PruneDecision, PruneGate};
use crate::report::StudyReport;
use crate::sampler::{Proposal, RandomSampler, Sampler, StudyRng, TpeSampler};
use crate::space::ParameterSpace;
use crate::trial::{ObjectiveDirection, Trial, TrialOutcome};

/// Unique study identifier.
pub type StudyId = Uuid;

/// Which proposal strategy a study uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    #[default]
    Tpe,
    Random,
}

/// Top-level configuration for a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub name: String,
    pub direction: ObjectiveDirection,
    /// Seed for the study's single random source.
    pub seed: u64,
    /// Trial budget. Pruned and failed trials count against it.
    pub n_trials: usize,
    /// Quantile of completed trials used for the "good" density, in (0, 1).
    pub gamma: f64,
    /// Completed trials sampled uniformly before the model takes over.
    pub n_startup: usize,
    /// Candidates drawn from the good density per proposal.
    pub n_candidates: usize,
    /// Pseudo-count given to every domain value when fitting densities.
    pub prior_weight: f64,
    pub sampler: SamplerKind,
    /// Trials evaluated in parallel per model refit. 1 is fully sequential.
    pub concurrency: usize,
}

impl Default for StudyConfig {
    fn default() -> Self {
        let tpe = TpeSampler::default();
        Self {
            name: "study".to_string(),
            direction: ObjectiveDirection::Minimize,
            seed: 42,
            n_trials: 30,
            gamma: tpe.gamma,
            n_startup: tpe.n_startup,
            n_candidates: tpe.n_candidates,
            prior_weight: tpe.prior_weight,
            sampler: SamplerKind::Tpe,
            concurrency: 1,
        }
    }
}

impl StudyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON study configuration.
    pub fn from_json(json: &str) -> BtResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| config_error!("invalid study configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_startup(mut self, n: usize) -> Self {
        self.n_startup = n;
        self
    }

    pub fn with_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n;
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerKind) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn validate(&self) -> BtResult<()> {
        if self.n_trials == 0 {
            return Err(config_error!("n_trials must be a positive integer, got 0"));
        }
        if !(self.gamma > 0.0 && self.gamma < 1.0) {
            return Err(config_error!("gamma must be in (0, 1), got {}", self.gamma));
        }
        if self.n_candidates == 0 {
            return Err(config_error!("n_candidates must be at least 1"));
        }
        if !(self.prior_weight.is_finite() && self.prior_weight > 0.0) {
            return Err(config_error!(
                "prior_weight must be positive, got {}",
                self.prior_weight
            ));
        }
        if self.concurrency == 0 {
            return Err(config_error!("concurrency must be at least 1"));
        }
        Ok(())
    }

    fn build_sampler(&self) -> Box<dyn Sampler> {
        match self.sampler {
            SamplerKind::Tpe => Box::new(TpeSampler {
                gamma: self.gamma,
                n_startup: self.n_startup,
                n_candidates: self.n_candidates,
                prior_weight: self.prior_weight,
            }),
            SamplerKind::Random => Box::new(RandomSampler),
        }
    }
}

/// Lifecycle state for a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyState {
    Idle,
    Running,
    Done,
}

/// One tuning run: configuration, random source, and the trial ledger.
pub struct Study {
    id: StudyId,
    config: StudyConfig,
    state: StudyState,
    ledger: TrialLedger,
    sampler: Box<dyn Sampler>,
    rng: StudyRng,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Study {
    /// Create an idle study. Fails if the configuration is malformed.
    pub fn new(config: StudyConfig) -> BtResult<Self> {
        let sampler = config.build_sampler();
        Self::with_sampler(config, sampler)
    }

    /// Create an idle study with a caller-supplied sampler.
    pub fn with_sampler(config: StudyConfig, sampler: Box<dyn Sampler>) -> BtResult<Self> {
        config.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            ledger: TrialLedger::new(config.direction),
            rng: StudyRng::seed_from_u64(config.seed),
            config,
            state: StudyState::Idle,
            sampler,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        })
    }

    pub fn id(&self) -> StudyId {
        self.id
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    pub fn state(&self) -> StudyState {
        self.state
    }

    pub fn ledger(&self) -> &TrialLedger {
        &self.ledger
    }

    pub fn trials(&self) -> &[Trial] {
        self.ledger.trials()
    }

    pub fn best_trial(&self) -> Option<&Trial> {
        self.ledger.best()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Run the full trial budget and report the best configuration.
    ///
    /// Each trial is proposed, gated, evaluated if feasible, and recorded
    /// before the next proposal. With `concurrency > 1`, batches of proposals
    /// are drawn against the same ledger snapshot and evaluated in parallel;
    /// results are still appended in draw order.
    pub fn optimize<E>(&mut self, space: &ParameterSpace, evaluator: &E) -> BtResult<StudyReport>
    where
        E: Evaluator + ?Sized,
    {
        if self.state != StudyState::Idle {
            return Err(config_error!(
                "study {} cannot start from state {:?}",
                self.config.name,
                self.state
            ));
        }
        space.validate()?;

        self.mark_running();
        info!(
            "Starting study {} ({} sampler, {} trials, seed {})",
            self.config.name,
            self.sampler.name(),
            self.config.n_trials,
            self.config.seed
        );

        let gate = PruneGate::new(space);
        let executor = TrialExecutor::new(evaluator);

        if self.config.concurrency <= 1 {
            for _ in 0..self.config.n_trials {
                self.run_trial(space, &gate, &executor);
            }
        } else {
            self.run_batched(space, &gate, &executor)?;
        }

        self.mark_done();
        let report = StudyReport::from_study(self);
        match &report.best {
            Some(best) => info!(
                "Study {} finished: best cost {} at {}",
                self.config.name, best.cost, best.configuration
            ),
            None => info!(
                "Study {} finished without a completed trial",
                self.config.name
            ),
        }
        Ok(report)
    }

    /// Snapshot of the study as it stands.
    pub fn report(&self) -> StudyReport {
        StudyReport::from_study(self)
    }

    fn run_trial<E: Evaluator + ?Sized>(
        &mut self,
        space: &ParameterSpace,
        gate: &PruneGate<'_>,
        executor: &TrialExecutor<'_, E>,
    ) {
        let proposal = self.sampler.propose(
            space,
            self.ledger.trials(),
            self.config.direction,
            &mut self.rng,
        );
        debug!("Proposed {:?} configuration: {}", proposal.phase, proposal.configuration);

        let (outcome, duration) = match gate.check(&proposal.configuration) {
            PruneDecision::Accept => {
                let execution = executor.run(&proposal.configuration);
                (execution.outcome, Some(execution.duration))
            }
            PruneDecision::Reject(reason) => (TrialOutcome::Pruned { reason }, None),
        };
        self.record(proposal, outcome, duration);
    }

    fn run_batched<E: Evaluator + ?Sized>(
        &mut self,
        space: &ParameterSpace,
        gate: &PruneGate<'_>,
        executor: &TrialExecutor<'_, E>,
    ) -> BtResult<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency)
            .build()
            .map_err(|e| internal_error!("failed to build evaluation pool: {}", e))?;

        let mut remaining = self.config.n_trials;
        while remaining > 0 {
            let batch_size = remaining.min(self.config.concurrency);

            // Every proposal in the batch sees the same ledger.
            let history = self.ledger.trials();
            let batch: Vec<(Proposal, PruneDecision)> = (0..batch_size)
                .map(|_| {
                    let proposal =
                        self.sampler
                            .propose(space, history, self.config.direction, &mut self.rng);
                    let decision = gate.check(&proposal.configuration);
                    (proposal, decision)
                })
                .collect();

            let outcomes: Vec<(TrialOutcome, Option<Duration>)> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|(proposal, decision)| match decision {
                        PruneDecision::Accept => {
                            let execution = executor.run(&proposal.configuration);
                            (execution.outcome, Some(execution.duration))
                        }
                        PruneDecision::Reject(reason) => (
                            TrialOutcome::Pruned {
                                reason: reason.clone(),
                            },
                            None,
                        ),
                    })
                    .collect()
            });

            for ((proposal, _), (outcome, duration)) in batch.into_iter().zip(outcomes) {
                self.record(proposal, outcome, duration);
            }
            remaining -= batch_size;
        }
        Ok(())
    }

    fn record(&mut self, proposal: Proposal, outcome: TrialOutcome, duration: Option<Duration>) {
        let previous_best = self.ledger.best().and_then(Trial::cost);
        let direction = self.config.direction;

        let trial = self
            .ledger
            .record(proposal.configuration, outcome, proposal.phase, duration);

        match &trial.outcome {
            TrialOutcome::Completed { cost } => {
                debug!("Trial {} completed: {} -> {}", trial.number, trial.configuration, cost);
                let improved = previous_best.map_or(true, |best| direction.improves(*cost, best));
                if improved {
                    info!(
                        "Trial {} is the new best: {} (cost {})",
                        trial.number, trial.configuration, cost
                    );
                }
            }
            TrialOutcome::Pruned { reason } => {
                debug!("Trial {} pruned: {}", trial.number, reason);
            }
            TrialOutcome::Failed { reason } => {
                debug!("Trial {} failed: {}", trial.number, reason);
            }
        }
    }

    fn mark_running(&mut self) {
        self.state = StudyState::Running;
        self.started_at = Some(Utc::now());
    }

    fn mark_done(&mut self) {
        self.state = StudyState::Done;
        self.finished_at = Some(Utc::now());
    }

    /// The configuration of the best trial, if any trial completed.
    pub fn best_configuration(&self) -> Option<&Configuration> {
        self.best_trial().map(|t| &t.configuration)
    }
}

impl fmt::Debug for Study {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Study")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("sampler", &self.sampler.name())
            .field("trials", &self.ledger.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Constraint;
    use bt_types::{BtError, EvaluationError};

    fn block_space() -> ParameterSpace {
        ParameterSpace::new()
            .declare("BLOCK_X", [4, 8, 16, 32])
            .declare("BLOCK_Y", [4, 8, 16, 32])
            .constrain(Constraint::product_at_most(&["BLOCK_X", "BLOCK_Y"], 256))
    }

    fn product_cost(c: &Configuration) -> Result<f64, EvaluationError> {
        Ok((c.get_int("BLOCK_X").unwrap_or(0) * c.get_int("BLOCK_Y").unwrap_or(0)) as f64)
    }

    #[test]
    fn study_lifecycle() {
        let mut study = Study::new(StudyConfig::new("lifecycle").with_trials(5)).unwrap();
        assert_eq!(study.state(), StudyState::Idle);
        assert!(study.started_at().is_none());

        study.optimize(&block_space(), &product_cost).unwrap();
        assert_eq!(study.state(), StudyState::Done);
        assert!(study.started_at().is_some());
        assert!(study.finished_at().is_some());
        assert_eq!(study.trials().len(), 5);
    }

    #[test]
    fn study_cannot_run_twice() {
        let mut study = Study::new(StudyConfig::new("twice").with_trials(2)).unwrap();
        study.optimize(&block_space(), &product_cost).unwrap();
        let err = study.optimize(&block_space(), &product_cost).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(study.trials().len(), 2);
    }

    #[test]
    fn config_validation() {
        assert!(StudyConfig::default().validate().is_ok());
        assert!(StudyConfig::default().with_trials(0).validate().is_err());
        assert!(StudyConfig::default().with_gamma(0.0).validate().is_err());
        assert!(StudyConfig::default().with_gamma(1.0).validate().is_err());
        assert!(StudyConfig::default().with_gamma(f64::NAN).validate().is_err());
        assert!(StudyConfig::default().with_candidates(0).validate().is_err());
        assert!(StudyConfig::default().with_concurrency(0).validate().is_err());

        let mut weightless = StudyConfig::default();
        weightless.prior_weight = 0.0;
        assert!(weightless.validate().is_err());
    }

    #[test]
    fn config_from_json_uses_defaults() {
        let config = StudyConfig::from_json(
            r#"{"name": "gemm", "n_trials": 12, "direction": "minimize", "sampler": "random"}"#,
        )
        .unwrap();
        assert_eq!(config.name, "gemm");
        assert_eq!(config.n_trials, 12);
        assert_eq!(config.sampler, SamplerKind::Random);
        assert_eq!(config.seed, 42);
        assert_eq!(config.gamma, 0.25);
    }

    #[test]
    fn config_from_json_rejects_bad_budget() {
        for json in [r#"{"n_trials": 0}"#, r#"{"n_trials": -3}"#, r#"{"gamma": 2.0}"#] {
            match StudyConfig::from_json(json) {
                Err(BtError::Config(_)) => (),
                other => panic!("expected configuration error for {json}, got {other:?}"),
            }
        }
    }

    #[test]
    fn invalid_space_fails_before_any_trial() {
        let mut study = Study::new(StudyConfig::new("empty").with_trials(3)).unwrap();
        let space = ParameterSpace::new().declare("BLOCK_X", Vec::<i64>::new());
        let err = study.optimize(&space, &product_cost).unwrap_err();
        assert!(matches!(err, BtError::Space(_)));
        assert!(study.trials().is_empty());
        assert_eq!(study.state(), StudyState::Idle);
    }

    #[test]
    fn maximize_tracks_largest_cost() {
        let config = StudyConfig::new("max")
            .with_trials(20)
            .with_direction(ObjectiveDirection::Maximize);
        let mut study = Study::new(config).unwrap();
        let report = study.optimize(&block_space(), &product_cost).unwrap();

        let max_completed = study
            .ledger()
            .completed()
            .filter_map(Trial::cost)
            .fold(f64::MIN, f64::max);
        assert_eq!(report.best.unwrap().cost, max_completed);
    }

    #[test]
    fn custom_sampler() {
        let config = StudyConfig::new("custom").with_trials(4);
        let mut study = Study::with_sampler(config, Box::new(RandomSampler)).unwrap();
        study.optimize(&block_space(), &product_cost).unwrap();
        assert!(format!("{study:?}").contains("random"));
    }
}
