use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use intaked::config::IntakeConfig;
use intaked::consumer::DirConsumer;
use intaked::mail::MaildirFetcher;
use intaked::scheduler::{Scheduler, SchedulerConfig};
use intaked::storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = IntakeConfig::from_env().context("invalid configuration")?;

    // Collaborator construction failures are fatal: report and exit
    // non-zero without entering the loop.
    let consumer = DirConsumer::new(&config.consumption_dir, config.originals_dir())
        .context("failed to construct the document consumer")?;
    let fetcher = MaildirFetcher::new(config.maildir.clone(), &config.consumption_dir)
        .context("failed to construct the mail fetcher")?;

    storage::ensure_media_dirs(&config)
        .await
        .context("failed to prepare the media directories")?;

    info!(
        consumption_dir = %config.consumption_dir.display(),
        "Starting document consumer"
    );

    // Ctrl-C flips the shutdown flag; the loop exits after its current
    // step and the process ends with status 0.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut scheduler = Scheduler::new(SchedulerConfig::from(&config), consumer, fetcher);
    scheduler.run(shutdown_rx).await;

    Ok(())
}
