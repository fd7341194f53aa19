use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use lexlm_trainer::{RunSummary, TrainArgs, Trainer, watch_interrupts};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

async fn run() -> anyhow::Result<RunSummary> {
    let config = TrainArgs::parse().resolve()?;

    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, flag).await {
            error!("Second interrupt received; aborting");
            std::process::exit(130);
        }
    });

    tokio::task::spawn_blocking(move || {
        let mut trainer = Trainer::new(config, interrupt)?;
        trainer.run()
    })
    .await?
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(summary) => info!(
            outcome = ?summary.outcome,
            epochs = summary.epochs_completed,
            best_valid = ?summary.best_valid,
            "Training finished"
        ),
        Err(e) => {
            error!("Training failed: {e:#}");
            std::process::exit(1);
        }
    }
}
