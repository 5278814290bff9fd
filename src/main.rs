//! Demo Bank - scripted AI banking demo
//!
//! Serves the conversation playback engine and the audit log behind a small JSON
//! API for the browser views. All state is in memory; restarting the server or
//! calling the reset endpoint starts the demo from scratch.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::{mpsc, Mutex};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod audit;
mod catalog;
mod config;
mod conversation;
mod core;
mod routes;

use catalog::Catalog;
use config::Config;
use crate::core::{DemoBank, StepToken, TokioScheduler};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub demo: Arc<Mutex<DemoBank<TokioScheduler>>>,
}

/// Feed fired reveal timers back into the engine, one at a time
pub async fn drive_timers(
    mut timers: mpsc::UnboundedReceiver<StepToken>,
    demo: Arc<Mutex<DemoBank<TokioScheduler>>>,
) {
    while let Some(token) = timers.recv().await {
        demo.lock().await.engine_mut().fire(token);
    }
    tracing::debug!("Timer channel closed");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "demo_bank=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let mut catalog = Catalog::builtin()?;
    if let Some(dir) = &config.scripts_dir {
        let added = catalog.load_dir(dir).await?;
        tracing::info!("Loaded {} extra conversation(s) from {}", added, dir.display());
    }
    tracing::info!("📚 Catalog ready with {} conversation(s)", catalog.len());

    let (scheduler, timers) = TokioScheduler::new();
    let demo = Arc::new(Mutex::new(DemoBank::new(
        catalog,
        scheduler,
        config.playback(),
    )));
    tokio::spawn(drive_timers(timers, Arc::clone(&demo)));

    let state = AppState { config, demo };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("🏦 Demo Bank API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
