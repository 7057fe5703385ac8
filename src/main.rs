/// Main application entry point
use chrono::Utc;
use sighting_fanout::clients::{ApnsClient, FcmClient};
use sighting_fanout::config::AppConfig;
use sighting_fanout::handlers::AppState;
use sighting_fanout::repo::{
    init_db, AlertHistoryStore, PgAlertHistoryStore, PgDeviceRegistry, PgUserLocationSource,
};
use sighting_fanout::routes::build_router;
use sighting_fanout::services::{
    DeviceResolver, Dispatcher, FanoutOrchestrator, PayloadBuilder, RateLimiter,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    // Load configuration
    let config = AppConfig::from_env()?;
    info!("Configuration loaded successfully");

    // Initialize database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    info!("Database connection pool established");

    // Initialize database schema
    init_db(&pool).await?;
    info!("Database schema initialized");

    // Initialize repositories
    let users = Arc::new(PgUserLocationSource::new(pool.clone()));
    let devices = Arc::new(PgDeviceRegistry::new(pool.clone()));
    let history: Arc<dyn AlertHistoryStore> = Arc::new(PgAlertHistoryStore::new(pool.clone()));

    // Initialize push providers
    let mut dispatcher = Dispatcher::new(config.dispatch.concurrency, config.dispatch.push_timeout);
    match config.fcm.clone() {
        Some(settings) => {
            dispatcher.register(Arc::new(FcmClient::new(settings, config.dispatch.push_timeout)?));
            info!("FCM provider registered");
        }
        None => warn!("FCM credentials missing; FCM targets will be counted as failed"),
    }
    match config.apns.clone() {
        Some(settings) => {
            dispatcher.register(Arc::new(ApnsClient::new(settings, config.dispatch.push_timeout)?));
            info!("APNS provider registered");
        }
        None => warn!("APNS credentials missing; APNS targets will be counted as failed"),
    }

    // Initialize services
    let rate_limiter = RateLimiter::new(
        history,
        chrono::Duration::seconds(config.rate_limit.window_seconds as i64),
    );
    let orchestrator = Arc::new(FanoutOrchestrator::new(
        users,
        rate_limiter,
        DeviceResolver::new(devices),
        PayloadBuilder::new(&config.payload),
        dispatcher,
    ));

    // Initialize application state
    let state = AppState {
        orchestrator: orchestrator.clone(),
        fanout_deadline: config.dispatch.fanout_deadline,
    };

    // Start background tasks
    start_background_tasks(config.clone(), orchestrator);

    // Build router
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("sighting_fanout service listening on {}", config.bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Start background maintenance tasks
fn start_background_tasks(config: AppConfig, orchestrator: Arc<FanoutOrchestrator>) {
    // Background task: alert history pruning
    {
        let limiter = orchestrator.rate_limiter().clone();
        let interval = config.rate_limit.prune_every_seconds.max(1);
        tokio::spawn(async move {
            info!("Starting alert history prune task (interval: {}s)", interval);
            loop {
                tokio::time::sleep(Duration::from_secs(interval)).await;
                let cutoff = Utc::now() - limiter.window();
                match limiter.store().prune_before(cutoff).await {
                    Ok(removed) if removed > 0 => info!(removed, "Pruned expired alert history"),
                    Ok(_) => {}
                    Err(e) => error!("Alert history prune error: {:?}", e),
                }
            }
        });
    }

    info!("All background tasks started successfully");
}
