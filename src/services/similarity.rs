use crate::{
    error::{AppError, AppResult},
    models::{Movie, ScoredMovie},
    services::embeddings::EmbeddingCache,
};

/// Cosine of the angle between two equal-length vectors
///
/// Zero when either vector has zero norm. Accumulates in f64.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let (dot, norm_a, norm_b) = a.iter().zip(b.iter()).fold(
        (0.0f64, 0.0f64, 0.0f64),
        |(dot, na, nb), (&x, &y)| {
            let (x, y) = (x as f64, y as f64);
            (dot + x * y, na + x * x, nb + y * y)
        },
    );

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Ranks candidates by cosine similarity to a profile vector
///
/// Candidates without a cached embedding, or whose embedding length differs
/// from the profile's, are left out entirely. Ties keep candidate order.
/// Fails with `InvalidInput` for an empty profile vector.
pub fn rank_by_similarity(
    profile: &[f32],
    candidates: &[Movie],
    embeddings: &EmbeddingCache,
    limit: usize,
) -> AppResult<Vec<ScoredMovie>> {
    if profile.is_empty() {
        return Err(AppError::InvalidInput(
            "Profile vector is empty".to_string(),
        ));
    }

    let mut scored: Vec<ScoredMovie> = candidates
        .iter()
        .filter_map(|movie| {
            let vector = embeddings.get(movie.id?)?;
            if vector.len() != profile.len() {
                return None;
            }
            Some(ScoredMovie {
                movie: movie.clone(),
                similarity: cosine_similarity(profile, &vector),
            })
        })
        .collect();

    // sort_by is stable, so equal scores keep candidate order
    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored.truncate(limit);

    tracing::debug!(
        candidates = candidates.len(),
        returned = scored.len(),
        "Ranked candidates by similarity"
    );

    Ok(scored)
}
