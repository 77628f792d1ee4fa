use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tollgate::{MemoryStore, Pipeline, RateLimiter, Router, Server, TokenValidator, config, telemetry, users};

/// Users API behind the tollgate interceptor pipeline.
#[derive(Parser)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address; overrides the config file and `LISTEN`.
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
        config.validate()?;
    }

    telemetry::init(&config.log);
    tracing::info!(
        listen = %config.listen,
        permit_limit = config.rate_limit.permit_limit,
        window_secs = config.rate_limit.window,
        queue_limit = config.rate_limit.queue_limit,
        "configuration loaded"
    );

    let limiter = Arc::new(RateLimiter::new(config.rate_limit.options()));
    spawn_partition_sweeper(Arc::clone(&limiter));

    let store = Arc::new(MemoryStore::seeded());
    let app = users::routes(Router::new(), store);
    let pipeline = Pipeline::new(limiter, TokenValidator::new(), app.into_handler());

    let max_body_bytes = usize::try_from(config.max_body_bytes).unwrap_or(usize::MAX);
    Server::bind(&config.listen)?
        .max_body_bytes(max_body_bytes)
        .serve(pipeline)
        .await?;
    Ok(())
}

/// Evicts idle rate-limit partitions once per window.
fn spawn_partition_sweeper(limiter: Arc<RateLimiter>) {
    let period = limiter.options().window;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.purge_idle();
            if removed > 0 {
                tracing::debug!(removed, remaining = limiter.partition_count(), "purged idle partitions");
            }
        }
    });
}
