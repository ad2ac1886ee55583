use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use stencil_runner::batch;
use stencil_runner::cli::Cli;
use stencil_runner::config::RunnerConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = RunnerConfig::from_env();

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current job");
            signal_cancel.cancel();
        }
    });

    if let Err(e) = batch::run(&config, cli.command, cancel).await {
        tracing::error!(error = %e, "Batch run failed");
        std::process::exit(1);
    }
}
