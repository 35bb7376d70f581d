use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Movie;

/// Number of most recent history entries that shape a user's taste
pub const HISTORY_WINDOW: usize = 30;

/// Number of history entries kept per user
pub const HISTORY_RETENTION: usize = 100;

/// Maximum length of a persisted recommendation list
pub const MAX_RECOMMENDATIONS: usize = 30;

/// One watch event, holding a snapshot of the movie at the time it was watched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchEntry {
    pub movie: Movie,
    pub watched_at: DateTime<Utc>,
}

/// Persisted per-user state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    /// Unique by movie id
    pub favorites: Vec<Movie>,
    /// Oldest first
    pub history: Vec<WatchEntry>,
    pub recommended: Vec<Movie>,
}

impl UserProfile {
    /// Creates a user with no favorites, history or recommendations
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            favorites: Vec::new(),
            history: Vec::new(),
            recommended: Vec::new(),
        }
    }

    /// The newest `limit` history entries, oldest first
    pub fn recent_history(&self, limit: usize) -> &[WatchEntry] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    pub fn favorite_titles(&self) -> Vec<String> {
        self.favorites.iter().map(|m| m.title.clone()).collect()
    }

    pub fn recent_history_titles(&self, limit: usize) -> Vec<String> {
        self.recent_history(limit)
            .iter()
            .map(|entry| entry.movie.title.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64) -> WatchEntry {
        WatchEntry {
            movie: Movie::new(id, format!("Movie {}", id), ""),
            watched_at: Utc::now(),
        }
    }

    #[test]
    fn test_recent_history_takes_newest_entries() {
        let mut user = UserProfile::new(1, "ada");
        user.history = (1..=40).map(entry).collect();

        let recent = user.recent_history(HISTORY_WINDOW);
        assert_eq!(recent.len(), 30);
        assert_eq!(recent[0].movie.id, Some(11));
        assert_eq!(recent[29].movie.id, Some(40));
    }

    #[test]
    fn test_recent_history_shorter_than_window() {
        let mut user = UserProfile::new(1, "ada");
        user.history = (1..=3).map(entry).collect();

        assert_eq!(
            user.recent_history_titles(HISTORY_WINDOW),
            vec!["Movie 1", "Movie 2", "Movie 3"]
        );
    }
}
