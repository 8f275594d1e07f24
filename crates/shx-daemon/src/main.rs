//! shx-daemon entry point.
//!
//! Startup order: config, secrets, sink (creates the output dir), ops
//! database, watermark seed, optional status API, then the tick loop until
//! Ctrl-C. Any failure before the loop starts is fatal.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use shx_daemon::{
    bootstrap,
    cli::Cli,
    routes,
    scheduler::Scheduler,
    state::{AppState, StartupInfo},
};
use shx_db::DbEpochFactSource;
use shx_reconcile::{EpochFactSource, Reconciler};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    let loaded = shx_config::load_layered(&cli.config_paths, &cli.overrides())
        .context("failed to load config")?;
    let cfg = &loaded.config;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let secrets = shx_config::resolve_secrets(cli.ops_dsn.as_deref(), &cfg.source.dsn_env)?;

    let sink = bootstrap::build_sink(&loaded.output)?;

    let pool = shx_db::connect(&secrets.ops_dsn, cfg.source.max_connections)
        .await
        .context("failed to connect to ops database")?;
    let source: Arc<dyn EpochFactSource> = Arc::new(DbEpochFactSource::new(pool));

    let tracker = bootstrap::seed_tracker(source.as_ref(), cfg.cold_start).await?;

    let state = Arc::new(AppState::new(StartupInfo {
        config_hash: loaded.config_hash.clone(),
        sink: sink.name().to_string(),
        cold_start: cfg.cold_start.as_str().to_string(),
        interval_secs: cfg.poll_interval().as_secs(),
    }));
    state.publish_watermarks(tracker.snapshot()).await;

    if let Some(addr) = cfg.status_addr() {
        let app = routes::build_router(Arc::clone(&state)).layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind status api on {addr}"))?;
        info!("status api listening on http://{}", addr);
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                error!("status api crashed: {err}");
            }
        });
    }

    let reconciler = Reconciler::new().with_chain_concurrency(cfg.reconcile.chain_concurrency);
    let scheduler = Scheduler::new(
        tracker,
        reconciler,
        source,
        sink,
        cfg.poll_interval(),
        state,
    );

    scheduler.run_until(shutdown_signal()).await;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
