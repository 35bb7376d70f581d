use serde::{Deserialize, Serialize};

/// Catalog identifier of a movie (TMDB id)
pub type MovieId = i64;

/// A movie as resolved from the catalog and shown to the client
///
/// `id` is the identity. `title` only stands in for it when the id is unknown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(default)]
    pub id: Option<MovieId>,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
}

impl Movie {
    /// Creates a movie with a known catalog id
    pub fn new(id: MovieId, title: impl Into<String>, overview: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            title: title.into(),
            overview: overview.into(),
            poster_url: None,
            vote_average: 0.0,
        }
    }

    /// Whether there is any text to embed for this movie
    pub fn has_overview(&self) -> bool {
        !self.overview.trim().is_empty()
    }
}

/// A movie paired with its cosine similarity to a profile vector
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredMovie {
    pub movie: Movie,
    pub similarity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_serializes_camel_case() {
        let mut movie = Movie::new(27205, "Inception", "A thief who steals secrets");
        movie.poster_url = Some("https://image.tmdb.org/t/p/w500/inception.jpg".to_string());
        movie.vote_average = 8.4;

        let json = serde_json::to_value(&movie).unwrap();
        assert_eq!(json["id"], 27205);
        assert_eq!(json["posterUrl"], "https://image.tmdb.org/t/p/w500/inception.jpg");
        assert_eq!(json["voteAverage"], 8.4);
    }

    #[test]
    fn test_movie_deserializes_without_optional_fields() {
        let movie: Movie = serde_json::from_str(r#"{"title": "Heat"}"#).unwrap();
        assert_eq!(movie.id, None);
        assert_eq!(movie.title, "Heat");
        assert!(!movie.has_overview());
    }

    #[test]
    fn test_whitespace_overview_is_not_embeddable() {
        let movie = Movie::new(1, "Blank", "   \n ");
        assert!(!movie.has_overview());
    }
}
