use anyhow::Context;
use omniport_api::{app, state::{AppState, AuthConfig}};
use omniport_core::clock::{Clock, SystemClock};
use omniport_core::{EngineStore, MemoryStore, Portal};
use omniport_store::app_config::Config;
use omniport_store::{DbClient, EventProducer, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omniport_api=debug,omniport_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Omniport API on port {}", config.server.port);

    let store: Arc<dyn EngineStore> = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Arc::new(db.engine_store())
        }
        None => {
            tracing::warn!("No database configured, running on the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    let clock: Arc<dyn Clock> =
        Arc::new(SystemClock::from_offset_minutes(config.engine.service_utc_offset_minutes));
    let portal = Arc::new(Portal::new(store, clock, config.engine.engine_config()));

    let mut app_state = AppState::new(
        portal,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    )?;

    if let Some(redis) = &config.redis {
        let client = RedisClient::new(&redis.url).context("Invalid Redis URL")?;
        app_state = app_state.with_redis(client, config.engine.rate_limit_per_minute);
    }
    if let Some(kafka) = &config.kafka {
        let producer = EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
        app_state = app_state.with_kafka(producer);
    }

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
