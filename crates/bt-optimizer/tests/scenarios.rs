use bt_optimizer::{
    Constraint, ObjectiveDirection, ParameterSpace, ProposalPhase, Study, StudyConfig, StudyState,
    TrialOutcome, TrialState,
};
use bt_types::{BtError, Configuration, EvaluationError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const BLOCK_DIMS: [i64; 4] = [4, 8, 16, 32];

fn block_space(limit: i64) -> ParameterSpace {
    ParameterSpace::new()
        .declare("BLOCK_X", BLOCK_DIMS)
        .declare("BLOCK_Y", BLOCK_DIMS)
        .constrain(Constraint::product_at_most(&["BLOCK_X", "BLOCK_Y"], limit))
}

fn product(config: &Configuration) -> i64 {
    config.get_int("BLOCK_X").unwrap() * config.get_int("BLOCK_Y").unwrap()
}

fn product_cost(config: &Configuration) -> Result<f64, EvaluationError> {
    Ok(product(config) as f64)
}

#[test]
fn scenario_a_thread_limit_with_product_cost() {
    let config = StudyConfig::new("scenario_a").with_seed(42).with_trials(30);
    let mut study = Study::new(config).unwrap();
    let report = study.optimize(&block_space(1024), &product_cost).unwrap();

    for trial in study.trials() {
        if product(&trial.configuration) > 1024 {
            assert_eq!(trial.state(), TrialState::Pruned);
        }
    }

    let best = report.best.expect("a feasible configuration completed");
    assert_eq!(best.cost, 16.0);
    assert_eq!(best.configuration.get_int("BLOCK_X"), Some(4));
    assert_eq!(best.configuration.get_int("BLOCK_Y"), Some(4));
}

#[test]
fn scenario_a_tight_limit_prunes_instead_of_evaluating() {
    let evaluated = Mutex::new(Vec::new());
    let evaluator = |config: &Configuration| -> Result<f64, EvaluationError> {
        evaluated.lock().unwrap().push(config.clone());
        product_cost(config)
    };

    let space = block_space(128);
    let config = StudyConfig::new("tight").with_seed(42).with_trials(30);
    let mut study = Study::new(config).unwrap();
    study.optimize(&space, &evaluator).unwrap();

    let evaluated = evaluated.into_inner().unwrap();
    assert!(evaluated.iter().all(|c| space.feasible(c)));
    assert_eq!(evaluated.len(), study.ledger().count(TrialState::Completed));

    for trial in study.trials() {
        match &trial.outcome {
            TrialOutcome::Pruned { reason } => {
                assert!(product(&trial.configuration) > 128);
                assert!(reason.starts_with("block size too large"));
                assert!(trial.duration_ms.is_none());
            }
            TrialOutcome::Completed { cost } => {
                assert!(product(&trial.configuration) <= 128);
                assert_eq!(*cost, product(&trial.configuration) as f64);
            }
            TrialOutcome::Failed { .. } => panic!("evaluator never fails"),
        }
    }
}

#[test]
fn scenario_b_every_evaluation_fails() {
    let evaluator = |_: &Configuration| -> Result<f64, EvaluationError> {
        Err(EvaluationError::device("hipErrorNoDevice"))
    };
    let config = StudyConfig::new("scenario_b").with_trials(12);
    let mut study = Study::new(config).unwrap();
    let report = study.optimize(&block_space(1024), &evaluator).unwrap();

    assert_eq!(study.trials().len(), 12);
    assert!(study
        .trials()
        .iter()
        .all(|t| t.state() == TrialState::Failed));
    assert!(report.best.is_none());
    assert!(study.best_trial().is_none());
    assert_eq!(report.failed, 12);
    assert_eq!(study.state(), StudyState::Done);
}

#[test]
fn scenario_c_budget_within_warm_up_never_fits_model() {
    let config = StudyConfig::new("scenario_c").with_startup(5).with_trials(5);
    let mut study = Study::new(config).unwrap();
    study.optimize(&block_space(1024), &product_cost).unwrap();

    assert_eq!(study.trials().len(), 5);
    assert!(study
        .trials()
        .iter()
        .all(|t| t.phase == ProposalPhase::Startup));
}

#[test]
fn scenario_d_zero_budget_is_a_configuration_error() {
    match Study::new(StudyConfig::new("scenario_d").with_trials(0)) {
        Err(BtError::Config(message)) => assert!(message.contains("n_trials")),
        other => panic!("expected configuration error, got {other:?}"),
    }

    let json_err = StudyConfig::from_json(r#"{"n_trials": 0}"#).unwrap_err();
    assert!(json_err.is_configuration());
}

#[test]
fn evaluator_sees_each_accepted_trial_once() {
    let calls = AtomicUsize::new(0);
    let evaluator = |c: &Configuration| -> Result<f64, EvaluationError> {
        calls.fetch_add(1, Ordering::SeqCst);
        product_cost(c)
    };

    let config = StudyConfig::new("calls").with_seed(9).with_trials(20);
    let mut study = Study::new(config).unwrap();
    let report = study.optimize(&block_space(128), &evaluator).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), report.completed + report.failed);
    assert_eq!(report.completed + report.pruned, 20);
}

#[test]
fn fixed_seed_reproduces_the_study() {
    let run = || {
        let config = StudyConfig::new("determinism")
            .with_seed(7)
            .with_trials(25)
            .with_startup(4);
        let mut study = Study::new(config).unwrap();
        let report = study.optimize(&block_space(256), &product_cost).unwrap();
        let proposals: Vec<Configuration> = study
            .trials()
            .iter()
            .map(|t| t.configuration.clone())
            .collect();
        let outcomes: Vec<TrialOutcome> = study.trials().iter().map(|t| t.outcome.clone()).collect();
        (proposals, outcomes, report.best.map(|b| (b.configuration, b.cost)))
    };

    assert_eq!(run(), run());
}

#[test]
fn budget_counts_every_outcome() {
    // 8-wide blocks crash, anything over 256 threads is pruned.
    let evaluator = |c: &Configuration| -> Result<f64, EvaluationError> {
        if c.get_int("BLOCK_X") == Some(8) {
            return Err(EvaluationError::other("kernel produced wrong results"));
        }
        product_cost(c)
    };

    let config = StudyConfig::new("budget").with_seed(3).with_trials(40).with_startup(6);
    let mut study = Study::new(config).unwrap();
    let report = study.optimize(&block_space(256), &evaluator).unwrap();

    assert_eq!(study.trials().len(), 40);
    assert_eq!(report.completed + report.pruned + report.failed, 40);
    for (i, trial) in study.trials().iter().enumerate() {
        assert_eq!(trial.number, i);
    }
}

#[test]
fn best_equals_minimum_completed_cost() {
    let evaluator = |c: &Configuration| -> Result<f64, EvaluationError> {
        // Non-monotonic latency surface with an interior optimum at 16x8.
        let x = c.get_int("BLOCK_X").unwrap() as f64;
        let y = c.get_int("BLOCK_Y").unwrap() as f64;
        Ok((x.log2() - 4.0).powi(2) + (y.log2() - 3.0).powi(2) + 0.5)
    };

    let config = StudyConfig::new("min").with_seed(11).with_trials(30);
    let mut study = Study::new(config).unwrap();
    let report = study.optimize(&block_space(1024), &evaluator).unwrap();

    let min_cost = study
        .ledger()
        .completed()
        .filter_map(|t| t.cost())
        .fold(f64::INFINITY, f64::min);
    assert_eq!(report.best.unwrap().cost, min_cost);
}

#[test]
fn batched_study_keeps_budget_and_determinism() {
    let run = || {
        let config = StudyConfig::new("batched")
            .with_seed(5)
            .with_trials(21)
            .with_startup(4)
            .with_concurrency(4);
        let mut study = Study::new(config).unwrap();
        study.optimize(&block_space(256), &product_cost).unwrap();
        study
            .trials()
            .iter()
            .map(|t| (t.number, t.configuration.clone(), t.outcome.clone()))
            .collect::<Vec<_>>()
    };

    let first = run();
    assert_eq!(first.len(), 21);
    assert_eq!(first, run());
}

#[test]
fn maximize_direction_is_respected() {
    let config = StudyConfig::new("maximize")
        .with_seed(42)
        .with_trials(30)
        .with_direction(ObjectiveDirection::Maximize);
    let mut study = Study::new(config).unwrap();
    let report = study.optimize(&block_space(256), &product_cost).unwrap();

    let best = report.best.unwrap();
    assert!(best.cost <= 256.0);
    let max_cost = study
        .ledger()
        .completed()
        .filter_map(|t| t.cost())
        .fold(0.0, f64::max);
    assert_eq!(best.cost, max_cost);
}

#[test]
fn history_export_round_trips_through_json() {
    let config = StudyConfig::new("export").with_trials(6);
    let mut study = Study::new(config).unwrap();
    study.optimize(&block_space(64), &product_cost).unwrap();

    let exported: serde_json::Value =
        serde_json::from_str(&study.ledger().export_json().unwrap()).unwrap();
    let trials = exported.as_array().unwrap();
    assert_eq!(trials.len(), 6);
    for (i, trial) in trials.iter().enumerate() {
        assert_eq!(trial["number"], i);
        assert!(trial["configuration"]["BLOCK_X"].is_i64());
    }
}
