use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    models::{Movie, MovieId, WatchEntry},
};

use super::AppState;

// Request/Response types

/// Body of a manual recommendation update: either a bare array of titles or
/// `{"titles": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SetRecommendationsRequest {
    Titles(Vec<String>),
    Wrapped { titles: Vec<String> },
}

impl SetRecommendationsRequest {
    pub fn into_titles(self) -> Vec<String> {
        match self {
            Self::Titles(titles) | Self::Wrapped { titles } => titles,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryAppendResponse {
    pub appended: bool,
    pub total_watches: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePoolResponse {
    pub size: usize,
    pub built_at: DateTime<Utc>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub async fn get_favorites(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<Vec<Movie>>> {
    let favorites = state.orchestrator.get_favorites(&username).await?;
    Ok(Json(favorites))
}

/// Resolves a title and adds it to the user's favorites
pub async fn add_favorite(
    State(state): State<AppState>,
    Path((username, title)): Path<(String, String)>,
) -> AppResult<(StatusCode, Json<Movie>)> {
    let movie = state.orchestrator.add_favorite(&username, &title).await?;
    Ok((StatusCode::CREATED, Json(movie)))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    Path((username, movie_id)): Path<(String, MovieId)>,
) -> AppResult<StatusCode> {
    state.orchestrator.remove_favorite(&username, movie_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Watch history, newest first
pub async fn get_history(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<Vec<WatchEntry>>> {
    let history = state.orchestrator.get_history(&username).await?;
    Ok(Json(history))
}

pub async fn add_to_history(
    State(state): State<AppState>,
    Path((username, title)): Path<(String, String)>,
) -> AppResult<Json<HistoryAppendResponse>> {
    let outcome = state.orchestrator.add_to_history(&username, &title).await?;
    Ok(Json(HistoryAppendResponse {
        appended: outcome.appended,
        total_watches: outcome.total_appends,
    }))
}

pub async fn get_recommendations(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<Vec<Movie>>> {
    let movies = state.orchestrator.get_recommendations(&username).await?;
    Ok(Json(movies))
}

/// Replaces the recommendation list with caller-supplied titles
pub async fn set_recommendations(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(request): Json<SetRecommendationsRequest>,
) -> AppResult<Json<Vec<Movie>>> {
    let titles = request.into_titles();
    let movies = state
        .orchestrator
        .set_recommendations(&username, &titles)
        .await?;
    Ok(Json(movies))
}

/// Runs the recommendation pipeline for a user right away
pub async fn refresh_recommendations(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<Vec<Movie>>> {
    let movies = state.orchestrator.recompute(&username).await?;
    Ok(Json(movies))
}

pub async fn get_candidates(State(state): State<AppState>) -> Json<CandidatePoolResponse> {
    let snapshot = state.candidates.snapshot().await;
    Json(CandidatePoolResponse {
        size: snapshot.len(),
        built_at: snapshot.built_at,
    })
}
