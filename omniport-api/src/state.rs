use omniport_core::Portal;
use omniport_shared::models::events::TripStatusNotice;
use omniport_store::{EventProducer, RedisClient};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub portal: Arc<Portal>,
    /// Rate limiting is skipped when absent.
    pub redis: Option<Arc<RedisClient>>,
    /// Notifications are skipped when absent.
    pub kafka: Option<Arc<EventProducer>>,
    pub sse_tx: broadcast::Sender<TripStatusNotice>,
    pub auth: AuthConfig,
    pub metrics: Arc<Metrics>,
    pub rate_limit_per_minute: i64,
}

impl AppState {
    pub fn new(portal: Arc<Portal>, auth: AuthConfig) -> Result<Self, prometheus::Error> {
        let (sse_tx, _) = broadcast::channel(100);
        Ok(Self {
            portal,
            redis: None,
            kafka: None,
            sse_tx,
            auth,
            metrics: Arc::new(Metrics::new()?),
            rate_limit_per_minute: 120,
        })
    }

    pub fn with_redis(mut self, redis: RedisClient, limit_per_minute: i64) -> Self {
        self.redis = Some(Arc::new(redis));
        self.rate_limit_per_minute = limit_per_minute;
        self
    }

    pub fn with_kafka(mut self, kafka: EventProducer) -> Self {
        self.kafka = Some(Arc::new(kafka));
        self
    }
}
