use anyhow::{Context, Result};
use mnist_listener::{
    MnistData, RunContext, Settings,
    config::{MODE_VAR, SWEEP_CONFIG_VAR},
    logger,
};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let settings = Settings::resolve().with_context(|| {
        format!("failed to resolve settings, overrides come from ${SWEEP_CONFIG_VAR}")
    })?;

    let mode = settings.logger_mode();
    // SAFETY: nothing else is running yet, no other thread can read the environment
    unsafe { env::set_var(MODE_VAR, mode.as_str()) };

    init_logging();

    let run_id = logger::new_run_id();
    info!(
        "Starting run {run_id} of {} ({} metrics)",
        settings.run.project,
        mode.as_str()
    );
    info!("Hyperparameters: {:?}", settings.hyperparameters);

    let epochs = settings.hyperparameters.epochs;
    let data_dir = settings.run.data_dir.clone();

    let mut ctx = RunContext::from_settings(settings, &run_id).context("failed to set up run")?;

    let data = MnistData::load_or_download(&data_dir)
        .with_context(|| format!("failed to load MNIST from {}", data_dir.display()))?;

    let summary = ctx.train(&data, epochs).context("training failed")?;
    info!(
        "Finished {} epochs in {} steps, final mean reward {:.4}",
        summary.epochs, summary.total_steps, summary.last_mean_reward
    );

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
