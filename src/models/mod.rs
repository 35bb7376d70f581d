use serde::{Deserialize, Serialize};

mod movie;
mod user_profile;

pub use movie::{Movie, MovieId, ScoredMovie};
pub use user_profile::{
    UserProfile, WatchEntry, HISTORY_RETENTION, HISTORY_WINDOW, MAX_RECOMMENDATIONS,
};

/// Base URL for TMDB poster images
pub const TMDB_POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";

// ============================================================================
// TMDB API Types
// ============================================================================

/// A movie as returned by any TMDB search or listing endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

impl From<TmdbMovie> for Movie {
    fn from(tmdb: TmdbMovie) -> Self {
        Movie {
            id: Some(tmdb.id),
            title: tmdb.title,
            overview: tmdb.overview.unwrap_or_default(),
            poster_url: tmdb
                .poster_path
                .filter(|path| !path.is_empty())
                .map(|path| format!("{}{}", TMDB_POSTER_BASE, path)),
            vote_average: tmdb.vote_average.unwrap_or_default(),
        }
    }
}

/// Paged TMDB result set
#[derive(Debug, Deserialize)]
pub struct TmdbPage {
    #[serde(default)]
    pub results: Vec<TmdbMovie>,
}

// ============================================================================
// OpenAI API Types
// ============================================================================

/// Response from POST /v1/embeddings
#[derive(Debug, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
}

/// Response from POST /v1/chat/completions
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

// ============================================================================
// Qdrant API Types
// ============================================================================

/// Qdrant accepts unsigned integers or UUID strings as point ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

/// Response from POST /collections/{name}/points/search
#[derive(Debug, Deserialize)]
pub struct QdrantSearchResponse {
    #[serde(default)]
    pub result: Vec<QdrantScoredPoint>,
}

#[derive(Debug, Deserialize)]
pub struct QdrantScoredPoint {
    pub id: PointId,
    pub score: f32,
    #[serde(default)]
    pub payload: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A neighbor returned by the user-similarity index
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarUser {
    pub user_id: i64,
    pub score: f32,
}

impl QdrantScoredPoint {
    /// Converts the point into a neighbor, dropping points whose id is not a user id
    pub fn into_similar_user(self) -> Option<SimilarUser> {
        let user_id = match self.id {
            PointId::Num(id) => i64::try_from(id).ok()?,
            PointId::Uuid(raw) => raw.parse().ok()?,
        };
        Some(SimilarUser {
            user_id,
            score: self.score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmdb_movie_to_movie_builds_poster_url() {
        let tmdb = TmdbMovie {
            id: 603,
            title: "The Matrix".to_string(),
            overview: Some("A hacker learns the truth".to_string()),
            poster_path: Some("/matrix.jpg".to_string()),
            vote_average: Some(8.2),
        };

        let movie: Movie = tmdb.into();
        assert_eq!(movie.id, Some(603));
        assert_eq!(
            movie.poster_url,
            Some("https://image.tmdb.org/t/p/w500/matrix.jpg".to_string())
        );
        assert_eq!(movie.vote_average, 8.2);
    }

    #[test]
    fn test_tmdb_movie_without_optional_fields() {
        let tmdb: TmdbMovie = serde_json::from_str(r#"{"id": 1, "title": "Untitled"}"#).unwrap();

        let movie: Movie = tmdb.into();
        assert_eq!(movie.overview, "");
        assert_eq!(movie.poster_url, None);
        assert_eq!(movie.vote_average, 0.0);
    }

    #[test]
    fn test_tmdb_page_deserialization() {
        let json = r#"{
            "page": 1,
            "results": [
                {"id": 27205, "title": "Inception", "overview": "Dreams", "poster_path": null, "vote_average": 8.4},
                {"id": 157336, "title": "Interstellar", "overview": "Space"}
            ],
            "total_pages": 1
        }"#;

        let page: TmdbPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[1].title, "Interstellar");
    }

    #[test]
    fn test_qdrant_search_response_numeric_and_uuid_ids() {
        let json = r#"{
            "result": [
                {"id": 42, "version": 3, "score": 0.91, "payload": {"username": "ada"}},
                {"id": "17", "version": 1, "score": 0.75},
                {"id": "5a3c8e1e-0000-4000-8000-000000000000", "version": 1, "score": 0.5}
            ],
            "status": "ok",
            "time": 0.001
        }"#;

        let response: QdrantSearchResponse = serde_json::from_str(json).unwrap();
        let users: Vec<SimilarUser> = response
            .result
            .into_iter()
            .filter_map(QdrantScoredPoint::into_similar_user)
            .collect();

        assert_eq!(
            users,
            vec![
                SimilarUser { user_id: 42, score: 0.91 },
                SimilarUser { user_id: 17, score: 0.75 },
            ]
        );
    }

    #[test]
    fn test_chat_completion_deserialization() {
        let json = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "1. Heat\n2. Ronin"}}]
        }"#;

        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("1. Heat\n2. Ronin")
        );
    }
}
