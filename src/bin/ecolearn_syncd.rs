use anyhow::{bail, Context, Result};
use ecolearn_lib::shared::{logging, metrics};
use ecolearn_lib::{AppConfig, AppState};
use std::env;
use std::time::Duration;
use tracing::{error, info, warn};

const TRIGGER: &str = "interval";

#[derive(Debug, Clone, Default)]
struct CliOptions {
    once: bool,
    status: bool,
    database_url: Option<String>,
}

fn usage() -> &'static str {
    "Usage: ecolearn-syncd [--once] [--status] [--database-url <url>]"
}

fn parse_args<I>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--once" => options.once = true,
            "--status" => options.status = true,
            "--database-url" => {
                let value = args.next().context("--database-url requires a value")?;
                options.database_url = Some(value);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}\n{}", usage()),
        }
    }
    Ok(options)
}

async fn run_pass(state: &AppState) {
    match state.outbox.drain(None, TRIGGER).await {
        Ok(report) if report.skipped => {}
        Ok(report) => {
            if report.failed > 0 {
                warn!(failed = report.failed, "some offline actions are still pending");
            }
        }
        Err(err) => error!(error = %err, "outbox drain failed"),
    }

    match state.records.store().purge_expired_cache().await {
        Ok(0) => {}
        Ok(purged) => info!(purged, "expired cache entries removed"),
        Err(err) => error!(error = %err, "failed to purge expired cache entries"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(args)?;

    let mut config = AppConfig::from_env();
    if let Some(url) = options.database_url {
        config.database.url = url;
    }
    let interval_secs = config.sync.interval_secs;
    let auto_sync = config.sync.auto_sync;

    let state = AppState::new(config)
        .await
        .context("failed to initialize application state")?;

    if options.status {
        let status = state.records.store().status().await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if options.once || !auto_sync {
        run_pass(&state).await;
        println!("{}", serde_json::to_string_pretty(&metrics::snapshot())?);
        return Ok(());
    }

    info!(interval_secs, "ecolearn sync daemon started");
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => run_pass(&state).await,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    Ok(())
}
