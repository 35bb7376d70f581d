/// TMDB movie catalog
///
/// API Flow:
/// 1. Title lookup: /3/search/movie?query=... → first result wins
/// 2. Id lookup: /3/movie/{id}
/// 3. Listings: /3/trending/movie/week, /3/movie/upcoming, /3/movie/top_rated
///
/// Every lookup is cached in Redis; misses and errors are never cached.
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{Movie, MovieId, TmdbMovie, TmdbPage},
    services::providers::{Listing, MovieCatalog},
};

const MOVIE_CACHE_TTL: u64 = 6 * 3600; // 6 hours
const LISTING_CACHE_TTL: u64 = 3600; // 1 hour

#[derive(Clone)]
pub struct TmdbCatalog {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Cache,
}

impl TmdbCatalog {
    pub fn new(http_client: HttpClient, cache: Cache, api_key: String, api_url: String) -> Self {
        Self {
            http_client,
            api_key,
            api_url,
            cache,
        }
    }

    fn listing_path(listing: Listing) -> &'static str {
        match listing {
            Listing::Trending => "/3/trending/movie/week",
            Listing::Upcoming => "/3/movie/upcoming",
            Listing::TopRated => "/3/movie/top_rated",
        }
    }

    /// Picks the search result to use for a title
    ///
    /// An exact case-insensitive title match wins; otherwise TMDB's own ranking.
    fn best_match(title: &str, results: Vec<TmdbMovie>) -> Option<Movie> {
        let wanted = title.trim().to_lowercase();
        let exact = results
            .iter()
            .position(|m| m.title.trim().to_lowercase() == wanted);

        let mut results = results;
        match exact {
            Some(index) => Some(results.swap_remove(index).into()),
            None => results.into_iter().next().map(Movie::from),
        }
    }

    /// GET against the TMDB API; `Ok(None)` on 404
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> AppResult<Option<T>> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map(Some).map_err(|e| {
            tracing::error!(error = %e, path = %path, "Failed to deserialize TMDB response");
            AppError::ExternalApi(format!("Failed to parse TMDB response: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl MovieCatalog for TmdbCatalog {
    async fn resolve_by_title(&self, title: &str) -> AppResult<Option<Movie>> {
        if title.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Title cannot be empty".to_string(),
            ));
        }

        let lookup: AppResult<Movie> = cached!(
            self.cache,
            CacheKey::MovieByTitle(title.to_string()),
            MOVIE_CACHE_TTL,
            async {
                let page: Option<TmdbPage> = self
                    .get_json("/3/search/movie", &[("query", title.trim())])
                    .await?;

                let results = page.map(|p| p.results).unwrap_or_default();
                let count = results.len();
                let movie = Self::best_match(title, results)
                    .ok_or_else(|| AppError::NotFound(format!("No TMDB match for '{}'", title)))?;

                tracing::info!(
                    query = %title,
                    results = count,
                    movie_id = ?movie.id,
                    provider = "tmdb",
                    "Title resolved"
                );

                Ok::<_, AppError>(movie)
            }
        );

        match lookup {
            Ok(movie) => Ok(Some(movie)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn resolve_by_id(&self, id: MovieId) -> AppResult<Option<Movie>> {
        let lookup: AppResult<Movie> = cached!(
            self.cache,
            CacheKey::MovieById(id),
            MOVIE_CACHE_TTL,
            async {
                let path = format!("/3/movie/{}", id);
                let movie: Option<TmdbMovie> = self.get_json(&path, &[]).await?;
                movie
                    .map(Movie::from)
                    .ok_or_else(|| AppError::NotFound(format!("TMDB movie {}", id)))
            }
        );

        match lookup {
            Ok(movie) => Ok(Some(movie)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn listing(&self, listing: Listing) -> AppResult<Vec<Movie>> {
        cached!(
            self.cache,
            CacheKey::Listing(listing.as_str()),
            LISTING_CACHE_TTL,
            async {
                let page: Option<TmdbPage> = self
                    .get_json(Self::listing_path(listing), &[("page", "1")])
                    .await?;

                let movies: Vec<Movie> = page
                    .map(|p| p.results)
                    .unwrap_or_default()
                    .into_iter()
                    .map(Movie::from)
                    .collect();

                tracing::info!(
                    listing = %listing,
                    count = movies.len(),
                    provider = "tmdb",
                    "Listing fetched"
                );

                Ok::<_, AppError>(movies)
            }
        )
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmdb(id: i64, title: &str) -> TmdbMovie {
        TmdbMovie {
            id,
            title: title.to_string(),
            overview: None,
            poster_path: None,
            vote_average: None,
        }
    }

    #[test]
    fn test_best_match_prefers_exact_title() {
        let results = vec![
            tmdb(1, "Dune: Part One"),
            tmdb(2, "Dune"),
            tmdb(3, "Dune: Part Two"),
        ];

        let movie = TmdbCatalog::best_match(" dune ", results).unwrap();
        assert_eq!(movie.id, Some(2));
    }

    #[test]
    fn test_best_match_falls_back_to_first_result() {
        let results = vec![tmdb(10, "The Lion King"), tmdb(11, "The Lion King II")];

        let movie = TmdbCatalog::best_match("The Lion King (2019)", results).unwrap();
        assert_eq!(movie.id, Some(10));
    }

    #[test]
    fn test_best_match_empty_results() {
        assert!(TmdbCatalog::best_match("Nothing", Vec::new()).is_none());
    }

    #[test]
    fn test_listing_paths() {
        assert_eq!(
            TmdbCatalog::listing_path(Listing::Trending),
            "/3/trending/movie/week"
        );
        assert_eq!(TmdbCatalog::listing_path(Listing::Upcoming), "/3/movie/upcoming");
        assert_eq!(TmdbCatalog::listing_path(Listing::TopRated), "/3/movie/top_rated");
    }
}
