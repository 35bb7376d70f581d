pub mod cache;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod users;

pub use cache::RecommendationCache;
pub use memory::{InMemoryRecommendationCache, InMemoryUserStore};
pub use postgres::{create_pool, PgUserStore};
pub use redis::create_redis_client;
pub use redis::Cache;
pub use redis::CacheKey;
pub use users::{HistoryAppend, UserStore};

#[cfg(test)]
pub use users::MockUserStore;
