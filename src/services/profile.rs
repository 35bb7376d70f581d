use crate::{
    models::{UserProfile, HISTORY_WINDOW},
    services::embeddings::{Embedding, EmbeddingResolver},
};

pub const FAVORITE_WEIGHT: f32 = 2.0;
pub const HISTORY_WEIGHT: f32 = 1.0;

/// Builds a user's taste vector from favorites and recent history
#[derive(Clone)]
pub struct ProfileBuilder {
    embeddings: EmbeddingResolver,
}

impl ProfileBuilder {
    pub fn new(embeddings: EmbeddingResolver) -> Self {
        Self { embeddings }
    }

    /// Weighted mean of the embeddings of the user's favorites (weight 2) and of
    /// the newest `HISTORY_WINDOW` history entries (weight 1)
    ///
    /// Movies whose embedding cannot be obtained contribute nothing. Returns an
    /// empty vector when nothing usable exists.
    pub async fn build(&self, user: &UserProfile) -> Vec<f32> {
        let mut weighted: Vec<(Embedding, f32)> = Vec::new();

        for movie in &user.favorites {
            if let Some(vector) = self.embeddings.resolve(movie).await {
                weighted.push((vector, FAVORITE_WEIGHT));
            }
        }

        for entry in user.recent_history(HISTORY_WINDOW) {
            if let Some(vector) = self.embeddings.resolve(&entry.movie).await {
                weighted.push((vector, HISTORY_WEIGHT));
            }
        }

        if weighted.is_empty() {
            tracing::warn!(username = %user.username, "No usable embeddings for user profile");
            return Vec::new();
        }

        let profile = weighted_mean(&weighted);

        tracing::info!(
            username = %user.username,
            contributors = weighted.len(),
            dimension = profile.len(),
            "Built weighted profile vector"
        );

        profile
    }
}

/// `sum(v_i * w_i) / sum(w_i)` per dimension
///
/// The dimension is taken from the first vector; vectors of any other length
/// are ignored. Returns an empty vector if there is nothing to average or the
/// total weight is zero.
pub fn weighted_mean(pairs: &[(Embedding, f32)]) -> Vec<f32> {
    let Some(dimension) = pairs.first().map(|(v, _)| v.len()) else {
        return Vec::new();
    };

    let mut sum = vec![0.0f64; dimension];
    let mut total_weight = 0.0f64;

    for (vector, weight) in pairs.iter().filter(|(v, _)| v.len() == dimension) {
        let weight = *weight as f64;
        total_weight += weight;
        for (acc, &value) in sum.iter_mut().zip(vector.iter()) {
            *acc += value as f64 * weight;
        }
    }

    if total_weight == 0.0 {
        return Vec::new();
    }

    sum.into_iter()
        .map(|value| (value / total_weight) as f32)
        .collect()
}
