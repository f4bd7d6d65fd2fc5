//! Progression server
//!
//! Serves the client status portal API, operator magic-link tools and the
//! Margill / VoPay webhooks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;

use progression_server::{
    app_router, db, jobs,
    middleware::RateLimiter,
    notify::{DisabledSmsSender, SmsSender, TwilioSmsSender},
    store::{MemoryStore, Stores},
    AppState, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting progression server");

    let stores = if config.database_url.is_some() {
        let pool = db::create_pool(&config).await?;
        db::run_migrations(&pool).await?;
        Stores::postgres(pool)
    } else {
        tracing::warn!("DATABASE_URL not set, using in-memory store (data is lost on restart)");
        Stores::memory(Arc::new(MemoryStore::new()))
    };

    let sms: Arc<dyn SmsSender> = match config.twilio.clone() {
        Some(twilio) => Arc::new(TwilioSmsSender::new(twilio)),
        None => {
            tracing::warn!("Twilio not configured, magic links will not be texted");
            Arc::new(DisabledSmsSender)
        }
    };

    for (name, value) in [
        ("ADMIN_API_KEY", &config.admin_api_key),
        ("CRON_SECRET", &config.cron_secret),
        ("VOPAY_SHARED_SECRET", &config.vopay_shared_secret),
    ] {
        if value.is_none() {
            tracing::warn!("{} not set, the routes it protects will answer 503", name);
        }
    }

    let rate_limiter = RateLimiter::in_memory(
        config.status_rate_limit_max,
        Duration::from_secs(config.status_rate_limit_window_seconds),
    );
    let app_state = AppState::new(stores, sms, &config, rate_limiter.clone());

    tokio::spawn(async move {
        jobs::rate_limit_sweeper(rate_limiter).await;
    });

    let mut scheduler = match config.cleanup_cron.as_deref() {
        Some(schedule) => Some(
            jobs::start_cleanup_scheduler(schedule, app_state.magic_link_service.clone())
                .await
                .context("Failed to start cleanup scheduler")?,
        ),
        None => None,
    };

    let app = app_router(app_state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Cleanup scheduler did not shut down cleanly");
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
