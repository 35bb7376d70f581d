use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

pub mod candidates;
pub mod collaborative;
pub mod embeddings;
pub mod generative;
pub mod merger;
pub mod profile;
pub mod providers;
pub mod recommendations;
pub mod similarity;

pub use candidates::{CandidatePool, CandidatePoolBuilder, CandidateSnapshot};
pub use collaborative::CollaborativeRecommender;
pub use embeddings::{EmbeddingCache, EmbeddingResolver};
pub use generative::GenerativeRecommender;
pub use profile::ProfileBuilder;
pub use recommendations::RecommendationOrchestrator;

/// Bounds an external call, turning an elapsed deadline into `AppError::Timeout`
pub async fn with_timeout<T, F>(source: &str, limit: Duration, call: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(source = %source, timeout_ms = limit.as_millis() as u64, "External call timed out");
            Err(AppError::Timeout(source.to_string()))
        }
    }
}
