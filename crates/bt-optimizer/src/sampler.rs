//! Candidate proposal: uniform random search and a categorical
//! Tree-structured Parzen Estimator.
//!
//! Samplers are stateless with respect to the study. Every call to
//! [`Sampler::propose`] rebuilds whatever model it needs from the trial
//! history, and all randomness comes from the study-owned [`StudyRng`], so a
//! fixed seed and identical outcomes reproduce an identical proposal sequence.

use bt_types::Configuration;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::space::{ParameterDef, ParameterSpace};
use crate::trial::{ObjectiveDirection, Trial};

/// The single pseudo-random source owned by a study.
pub type StudyRng = ChaCha8Rng;

/// Which branch produced a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalPhase {
    /// Uniform draw from the joint domain.
    Startup,
    /// Chosen by the good/bad density model.
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub configuration: Configuration,
    pub phase: ProposalPhase,
}

/// Common trait for all proposal strategies.
pub trait Sampler: Send + Sync {
    /// Propose the next configuration given the full trial history.
    ///
    /// `history` may contain pruned and failed trials; samplers must only
    /// learn from completed ones.
    fn propose(
        &self,
        space: &ParameterSpace,
        history: &[Trial],
        direction: ObjectiveDirection,
        rng: &mut StudyRng,
    ) -> Proposal;

    /// Human-readable sampler name.
    fn name(&self) -> &str;
}

// ---- Random search ----

/// Independent uniform sampling across the search space.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSampler;

impl Sampler for RandomSampler {
    fn propose(
        &self,
        space: &ParameterSpace,
        _history: &[Trial],
        _direction: ObjectiveDirection,
        rng: &mut StudyRng,
    ) -> Proposal {
        Proposal {
            configuration: space.sample_uniform(rng),
            phase: ProposalPhase::Startup,
        }
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- TPE ----

/// Smoothed frequency distribution over one parameter's domain.
///
/// `p(v) = (count(v) + prior_weight) / (n + prior_weight * k)`, so every value
/// keeps non-zero mass and an empty sample set is the uniform distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalDensity {
    probabilities: Vec<f64>,
}

impl CategoricalDensity {
    pub fn fit(param: &ParameterDef, trials: &[&Trial], prior_weight: f64) -> Self {
        let k = param.len();
        let mut counts = vec![0usize; k];
        let mut n = 0usize;
        for trial in trials {
            let index = trial
                .configuration
                .get(&param.name)
                .and_then(|v| param.index_of(v));
            if let Some(i) = index {
                counts[i] += 1;
                n += 1;
            }
        }

        let denominator = n as f64 + prior_weight * k as f64;
        let probabilities = counts
            .into_iter()
            .map(|c| (c as f64 + prior_weight) / denominator)
            .collect();
        Self { probabilities }
    }

    pub fn probability(&self, index: usize) -> f64 {
        self.probabilities.get(index).copied().unwrap_or(0.0)
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Draw a domain index by inverse-CDF sampling.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let r: f64 = rng.random();
        let mut cumulative = 0.0;
        for (i, p) in self.probabilities.iter().enumerate() {
            cumulative += p;
            if r < cumulative {
                return i;
            }
        }
        // Rounding can leave the total a hair under 1.0.
        self.probabilities.len().saturating_sub(1)
    }
}

/// Split completed trials into the best `ceil(gamma * n)` ("good") and the
/// rest ("bad"). Pruned and failed trials are dropped first.
///
/// Ordering is by cost in `direction`, ties by trial number, so the split is
/// independent of how the history slice interleaves other outcomes.
pub fn split_good_bad(
    history: &[Trial],
    gamma: f64,
    direction: ObjectiveDirection,
) -> (Vec<&Trial>, Vec<&Trial>) {
    let mut completed: Vec<(&Trial, f64)> = history
        .iter()
        .filter_map(|t| t.cost().map(|c| (t, c)))
        .collect();
    completed.sort_by(|(ta, a), (tb, b)| {
        direction
            .compare(*a, *b)
            .then_with(|| ta.number.cmp(&tb.number))
    });

    let n = completed.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    let n_good = ((n as f64) * gamma).ceil() as usize;
    let n_good = n_good.clamp(1, n);

    let mut good: Vec<&Trial> = completed.into_iter().map(|(t, _)| t).collect();
    let bad = good.split_off(n_good);
    (good, bad)
}

/// Tree-structured Parzen Estimator over categorical domains.
///
/// Until `n_startup` trials have completed it samples uniformly. After that it
/// fits a "good" and a "bad" density per parameter, draws `n_candidates`
/// configurations from the good densities and returns the one maximizing
/// `sum(ln l(x) - ln g(x))`. Parameters are modeled independently.
#[derive(Debug, Clone, PartialEq)]
pub struct TpeSampler {
    /// Quantile of completed trials treated as "good".
    pub gamma: f64,
    /// Completed trials required before the model is used.
    pub n_startup: usize,
    /// Candidates drawn from the good densities per proposal.
    pub n_candidates: usize,
    /// Pseudo-count added to every domain value.
    pub prior_weight: f64,
}

impl Default for TpeSampler {
    fn default() -> Self {
        Self {
            gamma: 0.25,
            n_startup: 10,
            n_candidates: 24,
            prior_weight: 1.0,
        }
    }
}

impl TpeSampler {
    pub fn new() -> Self {
        Self::default()
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
        self.n_candidates = n.max(1);
        self
    }

    pub fn with_prior_weight(mut self, weight: f64) -> Self {
        self.prior_weight = weight;
        self
    }

    fn propose_from_model(
        &self,
        space: &ParameterSpace,
        history: &[Trial],
        direction: ObjectiveDirection,
        rng: &mut StudyRng,
    ) -> Configuration {
        let (good, bad) = split_good_bad(history, self.gamma, direction);

        let densities: Vec<(CategoricalDensity, CategoricalDensity)> = space
            .parameters()
            .iter()
            .map(|p| {
                (
                    CategoricalDensity::fit(p, &good, self.prior_weight),
                    CategoricalDensity::fit(p, &bad, self.prior_weight),
                )
            })
            .collect();

        let mut best: Option<(Vec<usize>, f64)> = None;
        for _ in 0..self.n_candidates.max(1) {
            let candidate: Vec<usize> = densities.iter().map(|(l, _)| l.sample(rng)).collect();
            let score: f64 = candidate
                .iter()
                .zip(&densities)
                .map(|(&i, (l, g))| l.probability(i).ln() - g.probability(i).ln())
                .sum();

            // Strict comparison: the earliest draw wins ties.
            if best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((candidate, score));
            }
        }

        let mut config = Configuration::new();
        if let Some((indices, _)) = best {
            for (param, i) in space.parameters().iter().zip(indices) {
                config.insert(param.name.clone(), param.domain[i].clone());
            }
        }
        config
    }
}

impl Sampler for TpeSampler {
    fn propose(
        &self,
        space: &ParameterSpace,
        history: &[Trial],
        direction: ObjectiveDirection,
        rng: &mut StudyRng,
    ) -> Proposal {
        let n_completed = history.iter().filter(|t| t.is_completed()).count();
        if n_completed < self.n_startup {
            return Proposal {
                configuration: space.sample_uniform(rng),
                phase: ProposalPhase::Startup,
            };
        }

        Proposal {
            configuration: self.propose_from_model(space, history, direction, rng),
            phase: ProposalPhase::Model,
        }
    }

    fn name(&self) -> &str {
        "tpe"
    }
}
