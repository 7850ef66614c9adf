//! blocktune driver: thread-block tuning for a tiled GEMM kernel.

pub mod simulated;

use bt_optimizer::{Constraint, ParameterSpace, StudyConfig, StudyReport};
use bt_types::{config_error, BtResult};
use std::path::PathBuf;

pub use simulated::SimulatedGemm;

pub const BLOCK_X: &str = "BLOCK_X";
pub const BLOCK_Y: &str = "BLOCK_Y";

/// Powers of two are the usual choice for block dimensions.
pub const BLOCK_DIMS: [i64; 4] = [4, 8, 16, 32];

pub const DEFAULT_THREAD_LIMIT: i64 = 1024;

/// BLOCK_X x BLOCK_Y over [`BLOCK_DIMS`], limited to `thread_limit` threads.
pub fn block_space(thread_limit: i64) -> ParameterSpace {
    ParameterSpace::new()
        .declare(BLOCK_X, BLOCK_DIMS)
        .declare(BLOCK_Y, BLOCK_DIMS)
        .constrain(Constraint::product_at_most(&[BLOCK_X, BLOCK_Y], thread_limit))
}

/// Settings resolved from the process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSettings {
    pub study: StudyConfig,
    pub thread_limit: i64,
    /// Where to write the JSON trial history, if anywhere.
    pub history_path: Option<PathBuf>,
}

impl DriverSettings {
    pub fn from_env() -> BtResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings from `BLOCKTUNE_CONFIG`, `BLOCKTUNE_THREAD_LIMIT` and
    /// `BLOCKTUNE_HISTORY` as returned by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> BtResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let study = match lookup("BLOCKTUNE_CONFIG") {
            Some(path) => StudyConfig::from_json(&std::fs::read_to_string(path)?)?,
            None => StudyConfig::new("gemm_block_size").with_seed(42).with_trials(30),
        };

        let thread_limit = match lookup("BLOCKTUNE_THREAD_LIMIT") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or_else(|| config_error!("BLOCKTUNE_THREAD_LIMIT must be a positive integer, got {:?}", raw))?,
            None => DEFAULT_THREAD_LIMIT,
        };

        Ok(Self {
            study,
            thread_limit,
            history_path: lookup("BLOCKTUNE_HISTORY").map(PathBuf::from),
        })
    }
}

/// Human-readable result block, with costs in milliseconds.
pub fn summary(report: &StudyReport) -> String {
    let mut out = format!(
        "Trials: {} ({} completed, {} pruned, {} failed)\n",
        report.n_trials, report.completed, report.pruned, report.failed
    );
    match &report.best {
        Some(best) => {
            out.push_str(&format!("Best Time: {:.3} ms\n", best.cost));
            out.push_str("Best Parameters:\n");
            for (name, value) in best.configuration.iter() {
                out.push_str(&format!("  {name}: {value}\n"));
            }
        }
        None => out.push_str("No feasible configuration completed successfully\n"),
    }
    out
}
