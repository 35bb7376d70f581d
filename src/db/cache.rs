use crate::{error::AppResult, models::Movie};

/// Read cache in front of each user's persisted recommendation list
///
/// Writers call `evict` after every change to favorites, history or the
/// recommendation list itself. Both `put` and `evict` have taken effect when
/// they return.
#[async_trait::async_trait]
pub trait RecommendationCache: Send + Sync {
    async fn get(&self, username: &str) -> AppResult<Option<Vec<Movie>>>;

    async fn put(&self, username: &str, movies: &[Movie]) -> AppResult<()>;

    async fn evict(&self, username: &str) -> AppResult<()>;
}
