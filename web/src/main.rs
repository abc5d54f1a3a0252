//! Mess coupon HTTP server.
//!
//! Wires configuration, the Postgres store, the scan throttle, and the
//! router together, runs the periodic event expiry sweep, and serves with
//! graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mess_coupon_core::store::CouponStore;
use mess_coupon_postgres::PostgresCouponStore;
use mess_coupon_web::{AppState, Config, ScanRateLimiter, build_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env before anything reads the environment; absence is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mess_coupon=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mess coupon server");

    let config = Config::from_env();
    info!(
        host = %config.server.host,
        port = config.server.port,
        timezone_offset_minutes = config.timezone_offset_minutes,
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let store =
        PostgresCouponStore::connect(&config.database.url, config.database.max_connections).await?;
    store.migrate().await?;
    info!("Database connected and migrated");

    let store: Arc<dyn CouponStore> = Arc::new(store);

    let scan_limiter = Arc::new(ScanRateLimiter::new(
        config.scan_rate_limit.max_attempts,
        Duration::from_secs(config.scan_rate_limit.window_secs),
    ));

    // Peripheral timer: flip fully-expired events to closed so listings and
    // dashboards stay honest. Core correctness never depends on it.
    spawn_expiry_sweep(
        store.clone(),
        Duration::from_secs(config.sweep_interval_secs),
        scan_limiter.clone(),
    );

    let state = AppState::new(store, scan_limiter, config.timezone());
    let app = build_router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&address).await?;
    info!(%address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

/// Periodically close expired events and prune idle throttle windows.
fn spawn_expiry_sweep(
    store: Arc<dyn CouponStore>,
    interval: Duration,
    scan_limiter: Arc<ScanRateLimiter>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.close_expired_events().await {
                Ok(closed) if closed > 0 => info!(closed, "Expiry sweep closed events"),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "Expiry sweep failed"),
            }
            scan_limiter.prune();
        }
    });
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                error!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
