use anyhow::Context;
use bt_cli::{block_space, summary, DriverSettings, SimulatedGemm};
use bt_optimizer::Study;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let settings = DriverSettings::from_env().context("failed to resolve blocktune settings")?;
    let space = block_space(settings.thread_limit);
    let evaluator = SimulatedGemm::default();

    println!("Starting GEMM block size optimization (BLOCK_X, BLOCK_Y)...");

    let mut study = Study::new(settings.study)?;
    let report = study.optimize(&space, &evaluator)?;

    println!("\n--- Optimization Complete ---");
    print!("{}", summary(&report));

    if let Some(path) = settings.history_path {
        std::fs::write(&path, study.ledger().export_json()?)
            .with_context(|| format!("failed to write trial history to {}", path.display()))?;
        info!("Trial history written to {}", path.display());
    }

    Ok(())
}
