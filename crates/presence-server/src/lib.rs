pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::routing::{get, post};
use axum::{middleware, Router};
use chrono::Utc;
use presence_core::config::PresenceConfig;
use presence_core::db::PresenceDb;
use presence_core::notify::Notifier;
use presence_core::PresenceTracker;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Runtime settings for one server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    /// YAML tunables; a missing file means defaults.
    pub config_path: Option<PathBuf>,
    pub cron_secret: Option<String>,
    /// In-process sweep period. `None` leaves sweeping to an external caller.
    pub sweep_interval: Option<Duration>,
}

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let cron = Router::new()
        .route("/api/cron/availability", post(routes::sweep::run_sweep))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::cron_auth_middleware,
        ));

    Router::new()
        // Employee: session lifecycle and activity
        .route(
            "/api/app/availability/state",
            get(routes::availability::get_state),
        )
        .route(
            "/api/app/availability/session",
            get(routes::availability::get_session),
        )
        .route(
            "/api/app/availability/start",
            post(routes::availability::start),
        )
        .route("/api/app/availability/end", post(routes::availability::end))
        .route(
            "/api/app/availability/still-here",
            post(routes::availability::still_here),
        )
        .route(
            "/api/app/availability/activity",
            post(routes::availability::strong_activity),
        )
        .route("/api/app/heartbeat", post(routes::availability::heartbeat))
        // Employee: pings
        .route("/api/app/pings", get(routes::pings::my_pings))
        .route("/api/app/pings/stream", get(routes::events::ping_stream))
        .route(
            "/api/app/pings/{id}/respond",
            post(routes::pings::respond),
        )
        // Admin
        .route(
            "/api/admin/availability",
            get(routes::admin::list_availability),
        )
        .route(
            "/api/admin/availability/stream",
            get(routes::events::admin_availability_stream),
        )
        .route(
            "/api/admin/pings",
            get(routes::pings::admin_list).post(routes::pings::create),
        )
        .merge(cron)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Open the store and load the tunables, failing on any error-level config
/// warning.
pub fn open_tracker(config: &ServerConfig) -> anyhow::Result<PresenceTracker> {
    let tunables = match &config.config_path {
        Some(path) => PresenceConfig::load_validated(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PresenceConfig::default(),
    };
    let db = PresenceDb::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    Ok(PresenceTracker::new(Arc::new(db), tunables, Notifier::new()))
}

/// Run the decay sweep every `period` until the task is aborted.
pub fn spawn_sweeper(tracker: PresenceTracker, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let t = tracker.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || t.run_sweep(Utc::now())).await {
                tracing::warn!("sweep task failed: {e}");
            }
        }
    })
}

/// Start the presence server on a pre-bound listener.
///
/// The caller binds so it can read the actual port first (useful when
/// `port = 0` and the OS picks a free port).
pub async fn serve_on(listener: tokio::net::TcpListener, config: ServerConfig) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let tracker = open_tracker(&config)?;

    if config.cron_secret.as_deref().map_or(true, str::is_empty) {
        tracing::warn!("no cron secret configured; POST /api/cron/availability will reject every call");
    }
    let sweeper = config.sweep_interval.map(|period| {
        tracing::info!(secs = period.as_secs(), "in-process sweeper enabled");
        spawn_sweeper(tracker.clone(), period)
    });

    let notifier = tracker.notifier().clone();
    let app = build_router(state::AppState::new(tracker, config.cron_secret));

    tracing::info!("presence server listening on http://localhost:{actual_port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
            // Dropping the broadcast senders ends open SSE streams so the
            // graceful shutdown can complete.
            notifier.shutdown();
        })
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    Ok(())
}
