use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    models::Movie,
    services::{
        embeddings::EmbeddingResolver,
        providers::{Listing, MovieCatalog},
        with_timeout,
    },
};

/// Well-known titles that are always part of the candidate universe
pub const SEED_TITLES: &[&str] = &[
    "The Shawshank Redemption",
    "The Godfather",
    "The Dark Knight",
    "Avengers: Endgame",
    "Titanic",
    "Inception",
    "Interstellar",
    "Dune: Part Two",
    "Oppenheimer",
    "Barbie",
    "Spider-Man: No Way Home",
    "Top Gun: Maverick",
    "The Super Mario Bros. Movie",
    "Avatar: The Way of Water",
    "Guardians of the Galaxy Vol. 3",
    "The Batman",
    "Mission: Impossible - Dead Reckoning Part One",
    "John Wick: Chapter 4",
    "Frozen II",
    "Toy Story 4",
    "Black Panther",
    "No Time to Die",
    "Joker",
    "The Lion King",
    "Furious 7",
    "Minions: The Rise of Gru",
    "The Hunger Games",
    "It",
    "Deadpool",
    "Creed III",
    "Doctor Strange in the Multiverse of Madness",
    "The Creator",
    "Elemental",
    "The Menu",
    "Everything Everywhere All at Once",
    "Killers of the Flower Moon",
    "Wonka",
    "The Holdovers",
    "Napoleon",
    "Asteroid City",
    "Saltburn",
];

/// One complete, immutable build of the candidate universe
#[derive(Debug, Clone)]
pub struct CandidateSnapshot {
    /// Unique by id. Movies whose embedding could not be obtained are kept for
    /// display but never ranked.
    pub movies: Vec<Movie>,
    pub built_at: DateTime<Utc>,
}

impl CandidateSnapshot {
    pub fn new(movies: Vec<Movie>) -> Self {
        Self {
            movies,
            built_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }
}

/// Holder of the current candidate snapshot
///
/// Snapshots are swapped whole. A reader keeps the `Arc` it got for as long as
/// it needs it, even if a newer snapshot is published meanwhile.
pub struct CandidatePool {
    current: RwLock<Arc<CandidateSnapshot>>,
}

impl Default for CandidatePool {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidatePool {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CandidateSnapshot::empty())),
        }
    }

    pub async fn snapshot(&self) -> Arc<CandidateSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Replaces the current snapshot
    ///
    /// An empty snapshot never replaces a non-empty one; returns whether the
    /// swap happened.
    pub async fn publish(&self, snapshot: CandidateSnapshot) -> bool {
        let mut current = self.current.write().await;

        if snapshot.is_empty() && !current.is_empty() {
            tracing::warn!(
                kept = current.len(),
                "Candidate rebuild produced no movies, keeping previous snapshot"
            );
            return false;
        }

        *current = Arc::new(snapshot);
        true
    }
}

/// Rebuilds the candidate pool from catalog listings and the seed titles
pub struct CandidatePoolBuilder {
    catalog: Arc<dyn MovieCatalog>,
    embeddings: EmbeddingResolver,
    pool: Arc<CandidatePool>,
    timeout: Duration,
    seed_titles: Vec<String>,
}

impl CandidatePoolBuilder {
    pub fn new(
        catalog: Arc<dyn MovieCatalog>,
        embeddings: EmbeddingResolver,
        pool: Arc<CandidatePool>,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            embeddings,
            pool,
            timeout,
            seed_titles: SEED_TITLES.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn with_seed_titles(mut self, titles: Vec<String>) -> Self {
        self.seed_titles = titles;
        self
    }

    /// Builds a new snapshot and publishes it. Returns the size of the pool
    /// readers see afterwards.
    pub async fn refresh(&self) -> usize {
        let snapshot = self.build().await;
        let built = snapshot.len();

        if self.pool.publish(snapshot).await {
            tracing::info!(movies = built, "Published candidate pool");
        }

        self.pool.snapshot().await.len()
    }

    /// Assembles listings and seeds, deduplicated by id, and embeds every
    /// movie that has no embedding yet
    pub async fn build(&self) -> CandidateSnapshot {
        let (trending, upcoming, top_rated) = tokio::join!(
            self.fetch_listing(Listing::Trending),
            self.fetch_listing(Listing::Upcoming),
            self.fetch_listing(Listing::TopRated),
        );
        let seeds = self.resolve_seeds().await;

        let mut seen = HashSet::new();
        let movies: Vec<Movie> = trending
            .into_iter()
            .chain(upcoming)
            .chain(top_rated)
            .chain(seeds)
            .filter(|movie| movie.id.is_some_and(|id| seen.insert(id)))
            .collect();
        let movies = self.fill_overviews(movies).await;

        let embedded = self.embed_missing(&movies).await;

        tracing::info!(
            movies = movies.len(),
            embedded,
            "Built candidate snapshot"
        );

        CandidateSnapshot::new(movies)
    }

    async fn fetch_listing(&self, listing: Listing) -> Vec<Movie> {
        match with_timeout(
            self.catalog.name(),
            self.timeout,
            self.catalog.listing(listing),
        )
        .await
        {
            Ok(movies) => {
                tracing::debug!(listing = %listing, count = movies.len(), "Fetched listing");
                movies
            }
            Err(e) => {
                tracing::warn!(error = %e, listing = %listing, "Listing unavailable, skipping");
                Vec::new()
            }
        }
    }

    async fn resolve_seeds(&self) -> Vec<Movie> {
        let handles: Vec<_> = self
            .seed_titles
            .iter()
            .cloned()
            .map(|title| {
                let catalog = Arc::clone(&self.catalog);
                let timeout = self.timeout;
                tokio::spawn(async move {
                    let result =
                        with_timeout(catalog.name(), timeout, catalog.resolve_by_title(&title))
                            .await;
                    (title, result)
                })
            })
            .collect();

        let mut movies = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok((_, Ok(Some(movie)))) => movies.push(movie),
                Ok((title, Ok(None))) => {
                    tracing::warn!(title = %title, "Seed title not found in catalog");
                }
                Ok((title, Err(e))) => {
                    tracing::warn!(error = %e, title = %title, "Failed to resolve seed title");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Seed resolution task failed");
                }
            }
        }

        movies
    }

    /// Looks up movies without an overview by id so they can be embedded.
    /// Movies the catalog cannot complete are kept as they are.
    async fn fill_overviews(&self, movies: Vec<Movie>) -> Vec<Movie> {
        let handles: Vec<_> = movies
            .into_iter()
            .map(|movie| {
                let catalog = Arc::clone(&self.catalog);
                let timeout = self.timeout;
                tokio::spawn(async move {
                    let Some(id) = movie.id.filter(|_| !movie.has_overview()) else {
                        return movie;
                    };

                    match with_timeout(catalog.name(), timeout, catalog.resolve_by_id(id)).await {
                        Ok(Some(found)) if found.has_overview() => {
                            tracing::debug!(title = %movie.title, "Filled overview by id");
                            Movie {
                                overview: found.overview,
                                ..movie
                            }
                        }
                        Ok(_) => movie,
                        Err(e) => {
                            tracing::warn!(error = %e, title = %movie.title, "Failed to look up movie by id");
                            movie
                        }
                    }
                })
            })
            .collect();

        let mut filled = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(movie) => filled.push(movie),
                Err(e) => tracing::error!(error = %e, "Overview lookup task failed"),
            }
        }

        filled
    }

    /// Returns how many movies end up with an embedding
    async fn embed_missing(&self, movies: &[Movie]) -> usize {
        let cache = self.embeddings.cache();
        let handles: Vec<_> = movies
            .iter()
            .filter(|movie| movie.id.is_some_and(|id| !cache.has(id)))
            .cloned()
            .map(|movie| {
                let embeddings = self.embeddings.clone();
                tokio::spawn(async move { embeddings.resolve(&movie).await.is_some() })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Embedding task failed");
            }
        }

        movies
            .iter()
            .filter(|movie| movie.id.is_some_and(|id| cache.has(id)))
            .count()
    }
}
