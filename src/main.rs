use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use games_query_contract::{
    catalog_db::{CountSource, SqliteCatalog},
    config::AppConfig,
    o11y,
    probe::HttpProbe,
    report::TracingReporter,
    rules::RuleRegistry,
    runner::MatrixRunner,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let config = AppConfig::load()?;
    let _telemetry = o11y::TelemetryGuard::init(&config)?;

    if config.target.base_url.is_empty() {
        tracing::warn!("URL is not set; every probe will fail with an invalid url");
    }

    let registry = Arc::new(RuleRegistry::games(config.matrix.price_mode)?);
    let probe = HttpProbe::new(config.target.base_url.clone(), config.target.timeout)?
        .with_basic_auth(config.target.basic_auth());

    let mut runner = MatrixRunner::new(Arc::new(probe), registry, config.run_options());
    if let Some(path) = &config.matrix.db_path {
        let catalog = SqliteCatalog::open(path)
            .with_context(|| format!("opening catalog database {}", path.display()))?;
        let source: Arc<dyn CountSource> = Arc::new(catalog);
        runner = runner.with_count_source(source);
    }

    tracing::info!(
        base_url = config.target.base_url.as_str(),
        path = config.target.path.as_str(),
        environment = config.environment.as_str(),
        "starting contract matrix"
    );

    let watcher = tokio::spawn(cancel_on_shutdown(runner.cancellation_token()));
    let summary = runner.run(Arc::new(TracingReporter)).await;
    watcher.abort();

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cancel_on_shutdown(cancel: CancellationToken) {
    if let Err(err) = shutdown_signal().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
        return;
    }
    tracing::info!("shutdown signal received; cancelling remaining probes");
    cancel.cancel();
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
