pub mod app_config;
pub mod database;
pub mod events;
pub mod redis_repo;

mod boarding_repo;
mod booking_repo;
mod event_log_repo;
mod rows;
mod schedule_repo;
mod trip_repo;

pub use database::{DbClient, PgStore};
pub use events::EventProducer;
pub use redis_repo::RedisClient;
