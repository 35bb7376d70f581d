use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::{
    db::{
        cache::RecommendationCache,
        users::{HistoryAppend, UserStore},
    },
    error::{AppError, AppResult},
    models::{Movie, MovieId, UserProfile, WatchEntry, HISTORY_RETENTION},
};

struct UserRecord {
    profile: UserProfile,
    watch_count: u64,
}

/// User state held in process memory, for tests and local runs without PostgreSQL
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<i64, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given users
    pub fn with_users(users: impl IntoIterator<Item = UserProfile>) -> Self {
        let users = users
            .into_iter()
            .map(|profile| {
                let watch_count = profile.history.len() as u64;
                (
                    profile.id,
                    UserRecord {
                        profile,
                        watch_count,
                    },
                )
            })
            .collect();

        Self {
            users: RwLock::new(users),
        }
    }

    pub async fn insert(&self, profile: UserProfile) {
        let watch_count = profile.history.len() as u64;
        self.users.write().await.insert(
            profile.id,
            UserRecord {
                profile,
                watch_count,
            },
        );
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserProfile>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|record| record.profile.username == username)
            .map(|record| record.profile.clone()))
    }

    async fn favorites_of(&self, user_id: i64) -> AppResult<Vec<Movie>> {
        let users = self.users.read().await;
        Ok(users
            .get(&user_id)
            .map(|record| record.profile.favorites.clone())
            .unwrap_or_default())
    }

    async fn add_favorite(&self, user_id: i64, movie: &Movie) -> AppResult<bool> {
        if movie.id.is_none() {
            return Err(AppError::InvalidInput(format!(
                "Movie '{}' has no catalog id",
                movie.title
            )));
        }

        let mut users = self.users.write().await;
        let record = users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        if record.profile.favorites.iter().any(|m| m.id == movie.id) {
            return Ok(false);
        }

        record.profile.favorites.push(movie.clone());
        Ok(true)
    }

    async fn remove_favorite(&self, user_id: i64, movie_id: MovieId) -> AppResult<bool> {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        let before = record.profile.favorites.len();
        record
            .profile
            .favorites
            .retain(|m| m.id != Some(movie_id));
        Ok(record.profile.favorites.len() != before)
    }

    async fn append_history(
        &self,
        user_id: i64,
        movie: &Movie,
        watched_at: DateTime<Utc>,
    ) -> AppResult<HistoryAppend> {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        let repeats_newest = record
            .profile
            .history
            .last()
            .is_some_and(|newest| match (newest.movie.id, movie.id) {
                (Some(a), Some(b)) => a == b,
                _ => newest.movie.title.eq_ignore_ascii_case(&movie.title),
            });

        if repeats_newest {
            return Ok(HistoryAppend {
                appended: false,
                total_appends: record.watch_count,
            });
        }

        let history = &mut record.profile.history;
        history.push(WatchEntry {
            movie: movie.clone(),
            watched_at,
        });
        if history.len() > HISTORY_RETENTION {
            let excess = history.len() - HISTORY_RETENTION;
            history.drain(..excess);
        }
        record.watch_count += 1;

        Ok(HistoryAppend {
            appended: true,
            total_appends: record.watch_count,
        })
    }

    async fn replace_recommendations(&self, user_id: i64, movies: &[Movie]) -> AppResult<()> {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

        record.profile.recommended = movies.to_vec();
        Ok(())
    }
}

/// Recommendation cache held in process memory
#[derive(Default)]
pub struct InMemoryRecommendationCache {
    entries: DashMap<String, Vec<Movie>>,
}

impl InMemoryRecommendationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.contains_key(username)
    }
}

#[async_trait::async_trait]
impl RecommendationCache for InMemoryRecommendationCache {
    async fn get(&self, username: &str) -> AppResult<Option<Vec<Movie>>> {
        Ok(self.entries.get(username).map(|entry| entry.value().clone()))
    }

    async fn put(&self, username: &str, movies: &[Movie]) -> AppResult<()> {
        self.entries.insert(username.to_string(), movies.to_vec());
        Ok(())
    }

    async fn evict(&self, username: &str) -> AppResult<()> {
        self.entries.remove(username);
        Ok(())
    }
}
