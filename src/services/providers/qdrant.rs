//! Qdrant user-similarity index (REST API)
//!
//! One point per user: the point id is the user id and the vector is the
//! user's profile vector. The collection uses cosine distance.
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{QdrantScoredPoint, QdrantSearchResponse, SimilarUser},
    services::providers::UserVectorIndex,
};

#[derive(Clone)]
pub struct QdrantUserIndex {
    http_client: HttpClient,
    api_url: String,
    api_key: Option<String>,
    collection: String,
    dimension: usize,
}

impl QdrantUserIndex {
    pub fn new(
        http_client: HttpClient,
        api_url: String,
        api_key: Option<String>,
        collection: String,
        dimension: usize,
    ) -> Self {
        Self {
            http_client,
            api_url,
            api_key,
            collection,
            dimension,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.api_url, self.collection)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_key.as_deref().filter(|key| !key.is_empty()) {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> AppResult<()> {
        if vector.len() != self.dimension {
            return Err(AppError::InvalidInput(format!(
                "Profile vector must have {} values, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(())
    }

    async fn error_for_status(response: reqwest::Response) -> AppResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::ExternalApi(format!(
            "Qdrant returned status {}: {}",
            status, body
        )))
    }

    fn search_body(&self, vector: &[f32], top_k: usize, exclude: Option<i64>) -> Value {
        let mut body = json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
            "with_vector": false,
        });

        if let Some(user_id) = exclude {
            body["filter"] = json!({
                "must_not": [{ "has_id": [user_id] }]
            });
        }

        body
    }

    /// Creates the collection if it does not exist yet
    pub async fn ensure_collection(&self) -> AppResult<()> {
        let url = self.collection_url();

        let response = self.with_auth(self.http_client.get(&url)).send().await?;
        if response.status().is_success() {
            tracing::info!(collection = %self.collection, "Qdrant collection already exists");
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            Self::error_for_status(response).await?;
        }

        tracing::info!(
            collection = %self.collection,
            dimension = self.dimension,
            "Creating Qdrant collection"
        );

        let response = self
            .with_auth(self.http_client.put(&url))
            .json(&json!({
                "vectors": { "size": self.dimension, "distance": "Cosine" }
            }))
            .send()
            .await?;
        Self::error_for_status(response).await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl UserVectorIndex for QdrantUserIndex {
    async fn upsert(&self, user_id: i64, vector: &[f32], metadata: Value) -> AppResult<()> {
        self.check_dimension(vector)?;
        let point_id = u64::try_from(user_id)
            .map_err(|_| AppError::InvalidInput(format!("Invalid point id {}", user_id)))?;

        let url = format!("{}/points?wait=true", self.collection_url());
        let response = self
            .with_auth(self.http_client.put(&url))
            .json(&json!({
                "points": [{
                    "id": point_id,
                    "vector": vector,
                    "payload": metadata,
                }]
            }))
            .send()
            .await?;
        Self::error_for_status(response).await?;

        tracing::info!(user_id, provider = "qdrant", "Stored user profile vector");

        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        exclude: Option<i64>,
    ) -> AppResult<Vec<SimilarUser>> {
        self.check_dimension(vector)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let url = format!("{}/points/search", self.collection_url());
        let response = self
            .with_auth(self.http_client.post(&url))
            .json(&self.search_body(vector, top_k, exclude))
            .send()
            .await?;

        let body = Self::error_for_status(response).await?.text().await?;
        let parsed: QdrantSearchResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::ExternalApi(format!("Failed to parse Qdrant search response: {}", e))
        })?;

        let neighbors: Vec<SimilarUser> = parsed
            .result
            .into_iter()
            .filter_map(QdrantScoredPoint::into_similar_user)
            .filter(|user| Some(user.user_id) != exclude)
            .take(top_k)
            .collect();

        tracing::info!(
            count = neighbors.len(),
            provider = "qdrant",
            "Similar users found"
        );

        Ok(neighbors)
    }

    fn name(&self) -> &'static str {
        "qdrant"
    }
}
