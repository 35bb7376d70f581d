use std::sync::Arc;

use crate::services::{CandidatePool, RecommendationOrchestrator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RecommendationOrchestrator>,
    pub candidates: Arc<CandidatePool>,
}

impl AppState {
    pub fn new(orchestrator: Arc<RecommendationOrchestrator>, candidates: Arc<CandidatePool>) -> Self {
        Self {
            orchestrator,
            candidates,
        }
    }
}
