use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::{
    models::{Movie, MovieId},
    services::{providers::EmbeddingProvider, with_timeout},
};

/// Shared vector type; cloning only bumps a reference count
pub type Embedding = Arc<[f32]>;

/// Process-wide movie id → embedding map
///
/// Every stored vector has exactly `dimension` values. There is no eviction.
pub struct EmbeddingCache {
    dimension: usize,
    vectors: DashMap<MovieId, Embedding>,
}

impl EmbeddingCache {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: DashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn has(&self, id: MovieId) -> bool {
        self.vectors.contains_key(&id)
    }

    pub fn get(&self, id: MovieId) -> Option<Embedding> {
        self.vectors.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Stores a vector. A vector of the wrong length is dropped and `false` returned.
    pub fn put(&self, id: MovieId, vector: Vec<f32>) -> bool {
        if vector.len() != self.dimension {
            tracing::warn!(
                movie_id = id,
                expected = self.dimension,
                actual = vector.len(),
                "Discarding embedding with wrong dimension"
            );
            return false;
        }

        self.vectors.insert(id, Arc::from(vector));
        true
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Compute-if-absent in front of the embedding cache
///
/// Looks a movie up in the cache and, on a miss, embeds its overview and
/// stores the result. Any failure leaves the movie without an embedding.
#[derive(Clone)]
pub struct EmbeddingResolver {
    cache: Arc<EmbeddingCache>,
    provider: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl EmbeddingResolver {
    pub fn new(
        cache: Arc<EmbeddingCache>,
        provider: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            provider,
            timeout,
        }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn dimension(&self) -> usize {
        self.cache.dimension()
    }

    /// Cached embedding for `movie`, computing and caching it when absent
    pub async fn resolve(&self, movie: &Movie) -> Option<Embedding> {
        if let Some(existing) = movie.id.and_then(|id| self.cache.get(id)) {
            return Some(existing);
        }

        if !movie.has_overview() {
            tracing::debug!(title = %movie.title, "No overview to embed, skipping");
            return None;
        }

        let vector = match with_timeout(
            self.provider.name(),
            self.timeout,
            self.provider.embed(&movie.overview),
        )
        .await
        {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    title = %movie.title,
                    provider = self.provider.name(),
                    "Embedding failed, skipping movie"
                );
                return None;
            }
        };

        if vector.len() != self.cache.dimension() {
            tracing::warn!(
                title = %movie.title,
                expected = self.cache.dimension(),
                actual = vector.len(),
                "Provider returned embedding with wrong dimension"
            );
            return None;
        }

        match movie.id {
            Some(id) => {
                self.cache.put(id, vector);
                self.cache.get(id)
            }
            None => Some(Arc::from(vector)),
        }
    }
}
