use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{Movie, MovieId, UserProfile},
};

/// Outcome of appending a movie to a user's watch history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryAppend {
    /// False when the movie matched the most recent entry and nothing was written
    pub appended: bool,
    /// Lifetime number of appends for this user, unaffected by the retention cap
    pub total_appends: u64,
}

/// Persisted per-user state
///
/// Users themselves are created elsewhere (registration/auth). This surface only
/// reads them and mutates their favorites, history and recommendation list.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Loads a user with favorites, retained history and current recommendations
    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserProfile>>;

    /// Favorites of a user by id; unknown users have none
    async fn favorites_of(&self, user_id: i64) -> AppResult<Vec<Movie>>;

    /// Adds a favorite. Returns false if a favorite with the same id already exists.
    async fn add_favorite(&self, user_id: i64, movie: &Movie) -> AppResult<bool>;

    /// Removes a favorite. Returns false if it was not a favorite.
    async fn remove_favorite(&self, user_id: i64, movie_id: MovieId) -> AppResult<bool>;

    /// Appends to history unless the movie equals the newest entry, then trims
    /// history to the retention window
    async fn append_history(
        &self,
        user_id: i64,
        movie: &Movie,
        watched_at: DateTime<Utc>,
    ) -> AppResult<HistoryAppend>;

    /// Replaces the whole recommendation list
    async fn replace_recommendations(&self, user_id: i64, movies: &[Movie]) -> AppResult<()>;
}
