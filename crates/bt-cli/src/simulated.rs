//! Analytic stand-in for timing a tiled GEMM launch on a GPU.
//!
//! The model charges for idle lanes in partially filled wavefronts, low
//! occupancy, the tail of the last wave, and uncoalesced loads along the
//! contiguous X dimension. It is deterministic, so studies driven by it are
//! reproducible.

use bt_optimizer::Evaluator;
use bt_types::{Configuration, EvaluationError};
use serde::{Deserialize, Serialize};

use crate::{BLOCK_X, BLOCK_Y};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedGemm {
    pub m: u64,
    pub n: u64,
    pub k: u64,
    /// Launch fails above this many threads per block.
    pub max_threads_per_block: u64,
    pub wavefront_size: u64,
    pub compute_units: u64,
    pub max_threads_per_cu: u64,
    pub max_blocks_per_cu: u64,
    pub peak_gflops: f64,
    pub launch_overhead_ms: f64,
}

impl Default for SimulatedGemm {
    fn default() -> Self {
        Self {
            m: 1024,
            n: 1024,
            k: 1024,
            max_threads_per_block: 1024,
            wavefront_size: 64,
            compute_units: 60,
            max_threads_per_cu: 2560,
            max_blocks_per_cu: 32,
            peak_gflops: 12_000.0,
            launch_overhead_ms: 0.01,
        }
    }
}

impl SimulatedGemm {
    pub fn with_problem(mut self, m: u64, n: u64, k: u64) -> Self {
        self.m = m;
        self.n = n;
        self.k = k;
        self
    }

    /// Simulated kernel time in milliseconds for a `bx * by` block.
    pub fn latency_ms(&self, bx: u64, by: u64) -> Result<f64, EvaluationError> {
        if bx == 0 || by == 0 {
            return Err(EvaluationError::InvalidResult {
                message: format!("empty block {bx}x{by}"),
            });
        }
        let threads = bx * by;
        if threads > self.max_threads_per_block {
            return Err(EvaluationError::device(format!(
                "invalid configuration argument: {threads} threads per block exceeds {}",
                self.max_threads_per_block
            )));
        }

        let wavefronts = threads.div_ceil(self.wavefront_size);
        let lane_utilization = threads as f64 / (wavefronts * self.wavefront_size) as f64;

        let resident = (self.max_threads_per_cu / threads)
            .min(self.max_blocks_per_cu)
            .max(1);
        let occupancy = ((resident * threads) as f64 / self.max_threads_per_cu as f64).min(1.0);

        let grid = self.n.div_ceil(bx) * self.m.div_ceil(by);
        let slots_per_wave = resident * self.compute_units;
        let waves = grid.div_ceil(slots_per_wave);
        let tail_utilization = grid as f64 / (waves * slots_per_wave) as f64;

        let coalescing = (bx as f64 / 16.0).min(1.0);

        let efficiency = (lane_utilization * occupancy.sqrt() * tail_utilization * coalescing).max(0.01);
        let flops = 2.0 * self.m as f64 * self.n as f64 * self.k as f64;
        Ok(flops / (self.peak_gflops * 1e9 * efficiency) * 1e3 + self.launch_overhead_ms)
    }
}

impl Evaluator for SimulatedGemm {
    fn evaluate(&self, configuration: &Configuration) -> Result<f64, EvaluationError> {
        let dim = |name: &str| -> Result<u64, EvaluationError> {
            configuration
                .get_int(name)
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| EvaluationError::InvalidResult {
                    message: format!("{name} is missing or negative"),
                })
        };
        self.latency_ms(dim(BLOCK_X)?, dim(BLOCK_Y)?)
    }
}
