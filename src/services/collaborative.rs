use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::{
    db::UserStore,
    models::UserProfile,
    services::{providers::UserVectorIndex, with_timeout},
};

/// Neighbors consulted per recomputation
pub const NEIGHBOR_COUNT: usize = 5;

/// Titles returned at most
pub const MAX_COLLABORATIVE_TITLES: usize = 10;

/// "Users like you also liked": favorites of the nearest users by profile vector
#[derive(Clone)]
pub struct CollaborativeRecommender {
    index: Arc<dyn UserVectorIndex>,
    store: Arc<dyn UserStore>,
    timeout: Duration,
}

impl CollaborativeRecommender {
    pub fn new(
        index: Arc<dyn UserVectorIndex>,
        store: Arc<dyn UserStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            store,
            timeout,
        }
    }

    /// Up to ten favorite titles of the `neighbors` closest users, most
    /// frequent first
    ///
    /// An empty profile vector returns nothing without touching the index.
    /// Index and store failures also return nothing.
    pub async fn recommend(&self, user_id: i64, vector: &[f32], neighbors: usize) -> Vec<String> {
        if vector.is_empty() {
            tracing::info!(user_id, "Empty profile vector, skipping collaborative recommendations");
            return Vec::new();
        }

        let similar = match with_timeout(
            self.index.name(),
            self.timeout,
            self.index.search(vector, neighbors, Some(user_id)),
        )
        .await
        {
            Ok(similar) => similar,
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Similar user search failed");
                return Vec::new();
            }
        };

        let mut neighbor_favorites = Vec::with_capacity(similar.len());
        for neighbor in similar.iter().filter(|n| n.user_id != user_id) {
            match self.store.favorites_of(neighbor.user_id).await {
                Ok(favorites) => {
                    neighbor_favorites.push(favorites.into_iter().map(|m| m.title).collect())
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        neighbor = neighbor.user_id,
                        "Failed to load neighbor favorites"
                    );
                }
            }
        }

        let titles = top_titles_by_frequency(neighbor_favorites, MAX_COLLABORATIVE_TITLES);
        tracing::info!(
            user_id,
            neighbors = similar.len(),
            count = titles.len(),
            "Collaborative recommendations ready"
        );
        titles
    }

    /// Stores the user's current profile vector in the index
    ///
    /// An empty vector is skipped. Failures are logged and swallowed.
    pub async fn sync_user_vector(&self, user: &UserProfile, vector: &[f32]) {
        if vector.is_empty() {
            tracing::debug!(username = %user.username, "Empty profile vector, not indexing user");
            return;
        }

        let metadata = json!({
            "username": user.username,
            "favorite_count": user.favorites.len(),
            "watch_history_count": user.history.len(),
        });

        if let Err(e) = with_timeout(
            self.index.name(),
            self.timeout,
            self.index.upsert(user.id, vector, metadata),
        )
        .await
        {
            tracing::warn!(error = %e, username = %user.username, "Failed to index user vector");
        }
    }
}

/// Counts titles across lists; ties keep the order titles were first seen
pub fn top_titles_by_frequency(lists: Vec<Vec<String>>, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for title in lists.into_iter().flatten() {
        let count = counts.entry(title.clone()).or_insert(0);
        if *count == 0 {
            order.push(title);
        }
        *count += 1;
    }

    // sort_by_key is stable, so first-seen order breaks ties
    order.sort_by_key(|title| std::cmp::Reverse(counts[title]));
    order.truncate(limit);
    order
}
