use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::db::cache::RecommendationCache;
use crate::error::AppError;
use crate::error::AppResult;
use crate::models::Movie;

const RECOMMENDATIONS_TTL: u64 = 3600; // 1 hour

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    MovieByTitle(String),
    MovieById(i64),
    Listing(&'static str),
    UserRecommendations(String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::MovieByTitle(title) => {
                write!(f, "movie:title:{}", title.trim().to_lowercase())
            }
            CacheKey::MovieById(id) => write!(f, "movie:id:{}", id),
            CacheKey::Listing(name) => write!(f, "listing:{}", name),
            CacheKey::UserRecommendations(username) => write!(f, "recs:{}", username),
        }
    }
}

/// Creates a Redis client for caching
///
/// Establishes a connection to Redis for fast data caching.
/// Uses connection pooling via the connection-manager feature.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Cache handler for storing and retrieving data from Redis
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Initiates a graceful shutdown of the cache writer
    ///
    /// Sends a shutdown signal to the writer task, which flushes all pending
    /// writes to Redis before exiting.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl Cache {
    /// Creates a new Cache instance with an async write background task
    ///
    /// Writes go through a channel to a spawned task so that caching never
    /// delays a response.
    pub fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(client, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            write_tx,
        };

        (cache, CacheWriterHandle { shutdown_tx })
    }

    /// Background task that processes cache write messages
    ///
    /// On shutdown, drains whatever is still queued before exiting.
    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::error!(error = %e, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    write_rx.close();
                    let mut flushed = 0usize;
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        } else {
                            flushed += 1;
                        }
                    }

                    tracing::info!(flushed, "Cache writer task stopped");
                    break;
                }
            }
        }
    }

    /// Writes a single message to Redis
    async fn write_to_redis(client: &Client, msg: CacheWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }

    /// Retrieves a value from the cache by key
    ///
    /// Returns `None` when the key is absent.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Stores a value in the cache asynchronously without blocking
    ///
    /// The value is serialized here and handed to the writer task; this method
    /// returns before Redis has seen the write.
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }

    /// Stores a value and waits for Redis to acknowledge it
    pub async fn set_now<T: serde::Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: u64,
    ) -> AppResult<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)))?;

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key.to_string(), json, ttl).await?;
        Ok(())
    }

    /// Removes a key immediately
    pub async fn evict(&self, key: &CacheKey) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key.to_string()).await?;
        tracing::debug!(key = %key, "Evicted cache entry");
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecommendationCache for Cache {
    async fn get(&self, username: &str) -> AppResult<Option<Vec<Movie>>> {
        self.get_from_cache(&CacheKey::UserRecommendations(username.to_string()))
            .await
    }

    async fn put(&self, username: &str, movies: &[Movie]) -> AppResult<()> {
        self.set_now(
            &CacheKey::UserRecommendations(username.to_string()),
            &movies,
            RECOMMENDATIONS_TTL,
        )
        .await
    }

    async fn evict(&self, username: &str) -> AppResult<()> {
        Cache::evict(self, &CacheKey::UserRecommendations(username.to_string())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_display_movie_by_title() {
        let key = CacheKey::MovieByTitle("Inception".to_string());
        assert_eq!(key.to_string(), "movie:title:inception");
    }

    #[test]
    fn test_cache_key_display_movie_by_title_normalizes() {
        let key = CacheKey::MovieByTitle("  THE MATRIX ".to_string());
        assert_eq!(key.to_string(), "movie:title:the matrix");
    }

    #[test]
    fn test_cache_key_display_movie_by_id() {
        let key = CacheKey::MovieById(27205);
        assert_eq!(key.to_string(), "movie:id:27205");
    }

    #[test]
    fn test_cache_key_display_listing() {
        let key = CacheKey::Listing("top_rated");
        assert_eq!(key.to_string(), "listing:top_rated");
    }

    #[test]
    fn test_cache_key_display_user_recommendations() {
        let key = CacheKey::UserRecommendations("ada".to_string());
        assert_eq!(key.to_string(), "recs:ada");
    }

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_recommendations_put_then_evict() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, _handle) = Cache::new(client);

        let username = "cache_test_user";
        RecommendationCache::put(&cache, username, &[Movie::new(949, "Heat", "")])
            .await
            .unwrap();

        let cached = RecommendationCache::get(&cache, username).await.unwrap();
        assert_eq!(cached.map(|m| m.len()), Some(1));

        RecommendationCache::evict(&cache, username).await.unwrap();
        assert!(RecommendationCache::get(&cache, username)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_cache_writer_flushes_on_shutdown() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, handle) = Cache::new(client);

        let key = CacheKey::Listing("shutdown_test");
        cache.set_in_background(&key, &vec!["pending".to_string()], 60);
        handle.shutdown().await;
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(vec!["pending".to_string()]));

        cache.evict(&key).await.unwrap();
    }
}
