use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use marquee_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, Cache, PgUserStore, UserStore},
    services::{
        providers::{
            openai::{OpenAiChat, OpenAiEmbedder},
            qdrant::QdrantUserIndex,
            tmdb::TmdbCatalog,
            MovieCatalog,
        },
        recommendations::OrchestratorDeps,
        CandidatePool, CandidatePoolBuilder, CollaborativeRecommender, EmbeddingCache,
        EmbeddingResolver, GenerativeRecommender, RecommendationOrchestrator,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let timeout = config.external_timeout();

    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    let store: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool));

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_handle) = Cache::new(redis_client);

    let catalog: Arc<dyn MovieCatalog> = Arc::new(TmdbCatalog::new(
        http_client.clone(),
        cache.clone(),
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
    ));

    let embeddings = EmbeddingResolver::new(
        Arc::new(EmbeddingCache::new(config.embedding_dimension)),
        Arc::new(OpenAiEmbedder::new(
            http_client.clone(),
            config.openai_api_key.clone(),
            config.openai_api_url.clone(),
            config.embedding_model.clone(),
        )),
        timeout,
    );

    let chat = OpenAiChat::new(
        http_client.clone(),
        config.openai_api_key.clone(),
        config.openai_api_url.clone(),
        config.chat_model.clone(),
    );

    let user_index = QdrantUserIndex::new(
        http_client.clone(),
        config.qdrant_url.clone(),
        config.qdrant_api_key.clone(),
        config.qdrant_collection.clone(),
        config.embedding_dimension,
    );
    if let Err(e) = user_index.ensure_collection().await {
        tracing::error!(error = %e, "Failed to prepare Qdrant collection, collaborative results will be empty");
    }

    let candidates = Arc::new(CandidatePool::new());
    let pool_builder = CandidatePoolBuilder::new(
        Arc::clone(&catalog),
        embeddings.clone(),
        Arc::clone(&candidates),
        timeout,
    );

    let refresh_interval = config.candidate_refresh_interval();
    let refresh_task = tokio::spawn(async move {
        // first tick fires immediately and builds the initial pool
        let mut ticker = tokio::time::interval(refresh_interval);
        loop {
            ticker.tick().await;
            let size = pool_builder.refresh().await;
            tracing::info!(size, "Candidate pool refreshed");
        }
    });

    let orchestrator = RecommendationOrchestrator::new(OrchestratorDeps {
        store: Arc::clone(&store),
        cache: Arc::new(cache),
        catalog,
        embeddings,
        candidates: Arc::clone(&candidates),
        generative: GenerativeRecommender::new(Arc::new(chat), timeout),
        collaborative: CollaborativeRecommender::new(Arc::new(user_index), store, timeout),
        timeout,
    });

    let app = create_router(AppState::new(Arc::new(orchestrator), candidates));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresh_task.abort();
    cache_handle.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
