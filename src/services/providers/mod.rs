//! External collaborators of the recommendation engine
//!
//! Each trait is one narrow seam: text embeddings, free-text completions, the
//! movie catalog and the user-similarity vector index. Concrete adapters live in
//! the submodules; the engine only ever sees `Arc<dyn Trait>`.
use std::fmt::Display;

use crate::{
    error::AppResult,
    models::{Movie, MovieId, SimilarUser},
};

pub mod openai;
pub mod qdrant;
pub mod tmdb;

/// Turns text into a fixed-length vector
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single text. Callers validate the returned length.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// One prompt in, one free-text answer out
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> AppResult<String>;

    fn name(&self) -> &'static str;
}

/// Curated listings offered by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listing {
    Trending,
    Upcoming,
    TopRated,
}

impl Listing {
    pub const ALL: [Listing; 3] = [Listing::Trending, Listing::Upcoming, Listing::TopRated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Listing::Trending => "trending",
            Listing::Upcoming => "upcoming",
            Listing::TopRated => "top_rated",
        }
    }
}

impl Display for Listing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Movie catalog: resolves titles and ids to canonical movies
///
/// Resolution is get-or-create from the caller's point of view: the same title
/// always yields the same movie, and repeated lookups may be served from cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Best match for a title, or `None` when the catalog has nothing
    async fn resolve_by_title(&self, title: &str) -> AppResult<Option<Movie>>;

    async fn resolve_by_id(&self, id: MovieId) -> AppResult<Option<Movie>>;

    /// First page of a curated listing
    async fn listing(&self, listing: Listing) -> AppResult<Vec<Movie>>;

    fn name(&self) -> &'static str;
}

/// Nearest-neighbor index over user profile vectors
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait UserVectorIndex: Send + Sync {
    /// Inserts or replaces the vector stored for a user
    async fn upsert(
        &self,
        user_id: i64,
        vector: &[f32],
        metadata: serde_json::Value,
    ) -> AppResult<()>;

    /// Up to `top_k` users closest to `vector`, best first, never including `exclude`
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        exclude: Option<i64>,
    ) -> AppResult<Vec<SimilarUser>>;

    fn name(&self) -> &'static str;
}
