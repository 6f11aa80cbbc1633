use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tidings::cli;
use tidings::runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();

    // stdout carries envelopes, so logs go to stderr
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tidings=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if settings.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    info!(
        "Starting {} {} (group size {}, hub {})",
        cli::APP_NAME,
        cli::APP_VERSION,
        settings.group_size,
        if settings.disable_hub {
            "disabled".to_string()
        } else {
            settings.hub.to_string()
        }
    );
    runtime::run_stdio(settings).await?;

    Ok(())
}
