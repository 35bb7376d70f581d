use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    models::{Movie, MAX_RECOMMENDATIONS},
    services::{providers::MovieCatalog, with_timeout},
};

/// Identity used to collapse the same movie arriving from different sources
pub fn dedup_key(movie: &Movie) -> String {
    match movie.id {
        Some(id) => format!("id:{}", id),
        None => format!("title:{}", movie.title.trim().to_lowercase()),
    }
}

/// Concatenates sources in priority order, keeping the first occurrence of each
/// movie, and caps the result at `MAX_RECOMMENDATIONS`
pub fn merge<I>(sources: I) -> Vec<Movie>
where
    I: IntoIterator<Item = Vec<Movie>>,
{
    let mut seen = HashSet::new();

    sources
        .into_iter()
        .flatten()
        .filter(|movie| seen.insert(dedup_key(movie)))
        .take(MAX_RECOMMENDATIONS)
        .collect()
}

/// Resolves titles to catalog movies, preserving order
///
/// A title exactly matching a movie in `existing` reuses that movie without a
/// catalog lookup. Titles the catalog cannot resolve are dropped.
pub async fn resolve_titles(
    catalog: &Arc<dyn MovieCatalog>,
    titles: &[String],
    existing: &[Movie],
    timeout: Duration,
) -> Vec<Movie> {
    let handles: Vec<_> = titles
        .iter()
        .map(|title| {
            let reused = existing.iter().find(|m| m.title == *title).cloned();
            let catalog = Arc::clone(catalog);
            let title = title.clone();
            tokio::spawn(async move {
                if let Some(movie) = reused {
                    return (title, Ok(Some(movie)));
                }
                let result =
                    with_timeout(catalog.name(), timeout, catalog.resolve_by_title(&title)).await;
                (title, result)
            })
        })
        .collect();

    let mut movies = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok((_, Ok(Some(movie)))) => movies.push(movie),
            Ok((title, Ok(None))) => {
                tracing::warn!(title = %title, "Title not found in catalog, dropping");
            }
            Ok((title, Err(e))) => {
                tracing::warn!(error = %e, title = %title, "Failed to resolve title, dropping");
            }
            Err(e) => {
                tracing::error!(error = %e, "Title resolution task failed");
            }
        }
    }

    movies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::providers::MockMovieCatalog;

    fn untracked(title: &str) -> Movie {
        Movie {
            id: None,
            title: title.to_string(),
            overview: String::new(),
            poster_url: None,
            vote_average: 0.0,
        }
    }

    #[test]
    fn test_dedup_key_prefers_id() {
        assert_eq!(dedup_key(&Movie::new(5, "Heat", "")), "id:5");
        assert_eq!(dedup_key(&untracked("  The HEAT ")), "title:the heat");
    }

    #[test]
    fn test_merge_keeps_first_source_position() {
        let ranked = vec![Movie::new(1, "Ronin", ""), Movie::new(5, "Heat", "")];
        let generative = vec![Movie::new(5, "HEAT", ""), Movie::new(6, "Thief", "")];
        let collaborative = vec![Movie::new(6, "thief", ""), Movie::new(7, "Collateral", "")];

        let merged = merge([ranked, generative, collaborative]);
        let ids: Vec<_> = merged.iter().filter_map(|m| m.id).collect();

        assert_eq!(ids, vec![1, 5, 6, 7]);
        assert_eq!(merged[1].title, "Heat");
        assert_eq!(merged[2].title, "Thief");
    }

    #[test]
    fn test_merge_dedups_untracked_titles_case_insensitively() {
        let merged = merge([vec![untracked("Heat")], vec![untracked(" heat ")], vec![]]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_merge_caps_length() {
        let many: Vec<Movie> = (0..50)
            .map(|id| Movie::new(id, format!("Movie {}", id), ""))
            .collect();
        let more: Vec<Movie> = (50..80)
            .map(|id| Movie::new(id, format!("Movie {}", id), ""))
            .collect();

        let merged = merge([many, more, Vec::new()]);
        assert_eq!(merged.len(), MAX_RECOMMENDATIONS);
        assert_eq!(merged[0].id, Some(0));
    }

    #[test]
    fn test_merge_all_empty() {
        assert!(merge([Vec::new(), Vec::new(), Vec::new()]).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_titles_drops_unresolvable() {
        let mut catalog = MockMovieCatalog::new();
        catalog
            .expect_resolve_by_title()
            .returning(|title| match title {
                "Heat" => Ok(Some(Movie::new(949, "Heat", ""))),
                "Broken" => Err(AppError::ExternalApi("boom".to_string())),
                _ => Ok(None),
            });
        catalog.expect_name().return_const("mock-catalog");
        let catalog: Arc<dyn MovieCatalog> = Arc::new(catalog);

        let titles = vec!["Nope".to_string(), "Heat".to_string(), "Broken".to_string()];
        let movies = resolve_titles(&catalog, &titles, &[], Duration::from_secs(5)).await;

        assert_eq!(movies, vec![Movie::new(949, "Heat", "")]);
    }

    #[tokio::test]
    async fn test_resolve_titles_reuses_existing_exact_match() {
        let mut catalog = MockMovieCatalog::new();
        catalog
            .expect_resolve_by_title()
            .withf(|title| title == "Ronin")
            .times(1)
            .returning(|_| Ok(Some(Movie::new(8195, "Ronin", ""))));
        catalog.expect_name().return_const("mock-catalog");
        let catalog: Arc<dyn MovieCatalog> = Arc::new(catalog);

        let existing = vec![Movie::new(949, "Heat", "cached")];
        let titles = vec!["Heat".to_string(), "Ronin".to_string()];
        let movies = resolve_titles(&catalog, &titles, &existing, Duration::from_secs(5)).await;

        assert_eq!(movies[0].overview, "cached");
        assert_eq!(movies[1].id, Some(8195));
    }
}
