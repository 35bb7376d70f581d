use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    db::{HistoryAppend, RecommendationCache, UserStore},
    error::{AppError, AppResult},
    models::{Movie, MovieId, UserProfile, WatchEntry, HISTORY_WINDOW},
    services::{
        candidates::CandidatePool,
        collaborative::{CollaborativeRecommender, NEIGHBOR_COUNT},
        embeddings::EmbeddingResolver,
        generative::GenerativeRecommender,
        merger::{merge, resolve_titles},
        profile::ProfileBuilder,
        providers::MovieCatalog,
        similarity::rank_by_similarity,
        with_timeout,
    },
};

/// Every this many history appends trigger a recomputation
pub const WATCH_TRIGGER_INTERVAL: u64 = 5;

/// Candidates taken from similarity ranking per recomputation
pub const RANKED_LIMIT: usize = 10;

/// Everything the orchestrator talks to
pub struct OrchestratorDeps {
    pub store: Arc<dyn UserStore>,
    pub cache: Arc<dyn RecommendationCache>,
    pub catalog: Arc<dyn MovieCatalog>,
    pub embeddings: EmbeddingResolver,
    pub candidates: Arc<CandidatePool>,
    pub generative: GenerativeRecommender,
    pub collaborative: CollaborativeRecommender,
    pub timeout: Duration,
}

/// Decides when a user's recommendations are rebuilt and persists the result
///
/// Favorite changes and every fifth history append trigger a rebuild. Rebuilds
/// of the same user are serialized; different users proceed in parallel.
pub struct RecommendationOrchestrator {
    store: Arc<dyn UserStore>,
    cache: Arc<dyn RecommendationCache>,
    catalog: Arc<dyn MovieCatalog>,
    embeddings: EmbeddingResolver,
    profiles: ProfileBuilder,
    candidates: Arc<CandidatePool>,
    generative: GenerativeRecommender,
    collaborative: CollaborativeRecommender,
    timeout: Duration,
    user_locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl RecommendationOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            profiles: ProfileBuilder::new(deps.embeddings.clone()),
            store: deps.store,
            cache: deps.cache,
            catalog: deps.catalog,
            embeddings: deps.embeddings,
            candidates: deps.candidates,
            generative: deps.generative,
            collaborative: deps.collaborative,
            timeout: deps.timeout,
            user_locks: Arc::new(DashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_favorites(&self, username: &str) -> AppResult<Vec<Movie>> {
        Ok(self.load_user(username).await?.favorites)
    }

    /// Retained history, newest first
    pub async fn get_history(&self, username: &str) -> AppResult<Vec<WatchEntry>> {
        let mut history = self.load_user(username).await?.history;
        history.reverse();
        Ok(history)
    }

    /// Persisted recommendation list, served from the cache when possible
    pub async fn get_recommendations(&self, username: &str) -> AppResult<Vec<Movie>> {
        match self.cache.get(username).await {
            Ok(Some(movies)) => {
                tracing::debug!(username, "Recommendations served from cache");
                return Ok(movies);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, username, "Recommendation cache read failed");
            }
        }

        // writers replace and evict under the same lock
        let user = self.load_user(username).await?;
        let _guard = self.lock_user(user.id).await;

        let movies = self.load_user(username).await?.recommended;
        if let Err(e) = self.cache.put(username, &movies).await {
            tracing::warn!(error = %e, username, "Failed to cache recommendations");
        }
        Ok(movies)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Resolves a title and adds it to the user's favorites
    ///
    /// A new favorite triggers a recomputation; adding an existing favorite
    /// changes nothing.
    pub async fn add_favorite(&self, username: &str, title: &str) -> AppResult<Movie> {
        let user = self.load_user(username).await?;
        let movie = self.resolve_title(title).await?;

        let added = self.store.add_favorite(user.id, &movie).await?;
        if added {
            tracing::info!(username, title = %movie.title, "Added favorite");
            self.embeddings.resolve(&movie).await;
            self.recompute_user(user.id, username).await?;
        } else {
            tracing::debug!(username, title = %movie.title, "Movie already a favorite");
        }

        Ok(movie)
    }

    pub async fn remove_favorite(&self, username: &str, movie_id: MovieId) -> AppResult<()> {
        let user = self.load_user(username).await?;

        if !self.store.remove_favorite(user.id, movie_id).await? {
            return Err(AppError::NotFound(format!(
                "Movie {} is not a favorite of '{}'",
                movie_id, username
            )));
        }

        tracing::info!(username, movie_id, "Removed favorite");
        self.recompute_user(user.id, username).await?;
        Ok(())
    }

    /// Records that the user watched a movie
    ///
    /// Repeating the newest entry is ignored. Every fifth recorded watch
    /// triggers a recomputation; other watches only refresh the user's vector
    /// in the similarity index.
    pub async fn add_to_history(&self, username: &str, title: &str) -> AppResult<HistoryAppend> {
        let user = self.load_user(username).await?;
        let movie = self.resolve_title(title).await?;
        self.embeddings.resolve(&movie).await;

        let outcome = self
            .store
            .append_history(user.id, &movie, Utc::now())
            .await?;

        if !outcome.appended {
            tracing::debug!(username, title = %movie.title, "Repeat of newest history entry ignored");
            return Ok(outcome);
        }

        tracing::info!(
            username,
            title = %movie.title,
            total_appends = outcome.total_appends,
            "Appended to watch history"
        );

        if outcome.total_appends % WATCH_TRIGGER_INTERVAL == 0 {
            self.recompute_user(user.id, username).await?;
        } else {
            let user = self.load_user(username).await?;
            let profile = self.profiles.build(&user).await;
            self.collaborative.sync_user_vector(&user, &profile).await;
            self.evict(username).await;
        }

        Ok(outcome)
    }

    /// Replaces the recommendation list with the given titles, as resolved by
    /// the catalog, without running the pipeline
    pub async fn set_recommendations(
        &self,
        username: &str,
        titles: &[String],
    ) -> AppResult<Vec<Movie>> {
        let user = self.load_user(username).await?;
        let _guard = self.lock_user(user.id).await;

        let current = self.load_user(username).await?;
        let resolved =
            resolve_titles(&self.catalog, titles, &current.recommended, self.timeout).await;
        let movies = merge([resolved]);

        self.store.replace_recommendations(current.id, &movies).await?;
        self.evict(username).await;

        tracing::info!(username, count = movies.len(), "Recommendations set manually");
        Ok(movies)
    }

    /// Rebuilds and persists the user's recommendations
    pub async fn recompute(&self, username: &str) -> AppResult<Vec<Movie>> {
        let user = self.load_user(username).await?;
        self.recompute_user(user.id, username).await
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    async fn recompute_user(&self, user_id: i64, username: &str) -> AppResult<Vec<Movie>> {
        let _guard = self.lock_user(user_id).await;

        // reload under the lock so the rebuild sees every committed change
        let user = self.load_user(username).await?;
        let movies = self.run_pipeline(&user).await;

        self.store.replace_recommendations(user.id, &movies).await?;
        self.evict(username).await;

        tracing::info!(username, count = movies.len(), "Recomputed recommendations");
        Ok(movies)
    }

    async fn run_pipeline(&self, user: &UserProfile) -> Vec<Movie> {
        let profile = self.profiles.build(user).await;
        self.collaborative.sync_user_vector(user, &profile).await;

        let favorites = user.favorite_titles();
        let history = user.recent_history_titles(HISTORY_WINDOW);

        let (ranked, generated, collaborative) = tokio::join!(
            self.rank_candidates(&profile),
            async {
                let titles = self.generative.recommend(&favorites, &history).await;
                resolve_titles(&self.catalog, &titles, &user.recommended, self.timeout).await
            },
            async {
                let titles = self
                    .collaborative
                    .recommend(user.id, &profile, NEIGHBOR_COUNT)
                    .await;
                resolve_titles(&self.catalog, &titles, &user.recommended, self.timeout).await
            },
        );

        tracing::debug!(
            username = %user.username,
            ranked = ranked.len(),
            generated = generated.len(),
            collaborative = collaborative.len(),
            "Recommendation sources ready"
        );

        merge([ranked, generated, collaborative])
    }

    async fn rank_candidates(&self, profile: &[f32]) -> Vec<Movie> {
        if profile.is_empty() {
            tracing::info!("No profile vector yet, skipping similarity ranking");
            return Vec::new();
        }

        let snapshot = self.candidates.snapshot().await;
        match rank_by_similarity(
            profile,
            &snapshot.movies,
            self.embeddings.cache(),
            RANKED_LIMIT,
        ) {
            Ok(scored) => scored.into_iter().map(|s| s.movie).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Similarity ranking failed");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn load_user(&self, username: &str) -> AppResult<UserProfile> {
        self.store
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}'", username)))
    }

    async fn resolve_title(&self, title: &str) -> AppResult<Movie> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidInput("Title must not be empty".to_string()));
        }

        with_timeout(
            self.catalog.name(),
            self.timeout,
            self.catalog.resolve_by_title(title),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Movie '{}'", title)))
    }

    /// Waits for exclusive access to one user's recommendation state
    async fn lock_user(&self, user_id: i64) -> UserLockGuard {
        let lock = Arc::clone(self.user_locks.entry(user_id).or_default().value());
        UserLockGuard {
            guard: Some(lock.lock_owned().await),
            user_id,
            locks: Arc::clone(&self.user_locks),
        }
    }

    async fn evict(&self, username: &str) {
        if let Err(e) = self.cache.evict(username).await {
            tracing::warn!(error = %e, username, "Failed to evict cached recommendations");
        }
    }
}

/// Holds a per-user lock; the map entry is dropped once nobody else holds or
/// waits for it
struct UserLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    user_id: i64,
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::db::{InMemoryRecommendationCache, InMemoryUserStore};
    use crate::services::candidates::CandidateSnapshot;
    use crate::services::embeddings::EmbeddingCache;
    use crate::services::providers::{
        CompletionProvider, MockCompletionProvider, MockEmbeddingProvider, MockMovieCatalog,
        MockUserVectorIndex,
    };

    struct Fixture {
        orchestrator: RecommendationOrchestrator,
        store: Arc<InMemoryUserStore>,
        cache: Arc<InMemoryRecommendationCache>,
    }

    fn catalog_movie(title: &str) -> Option<Movie> {
        let id = match title {
            "Heat" => 949,
            "Ronin" => 8195,
            "Thief" => 11524,
            "Collateral" => 1538,
            "Sicario" => 273481,
            _ => return None,
        };
        Some(Movie::new(id, title, format!("{} overview", title)))
    }

    fn catalog() -> MockMovieCatalog {
        let mut catalog = MockMovieCatalog::new();
        catalog
            .expect_resolve_by_title()
            .returning(|title| Ok(catalog_movie(title)));
        catalog.expect_name().return_const("mock-catalog");
        catalog
    }

    fn embedder() -> MockEmbeddingProvider {
        let mut mock = MockEmbeddingProvider::new();
        mock.expect_embed().returning(|_| Ok(vec![1.0, 0.0]));
        mock.expect_name().return_const("mock-embedder");
        mock
    }

    fn quiet_index() -> MockUserVectorIndex {
        let mut index = MockUserVectorIndex::new();
        index.expect_upsert().returning(|_, _, _| Ok(()));
        index.expect_search().returning(|_, _, _| Ok(Vec::new()));
        index.expect_name().return_const("mock-index");
        index
    }

    fn completion(answer: &'static str) -> MockCompletionProvider {
        let mut mock = MockCompletionProvider::new();
        mock.expect_complete()
            .returning(move |_| Ok(answer.to_string()));
        mock.expect_name().return_const("mock-llm");
        mock
    }

    async fn orchestrator(
        store: Arc<dyn UserStore>,
        cache: Arc<InMemoryRecommendationCache>,
        llm: Arc<dyn CompletionProvider>,
        index: MockUserVectorIndex,
    ) -> RecommendationOrchestrator {
        let timeout = Duration::from_secs(5);
        let catalog: Arc<dyn MovieCatalog> = Arc::new(catalog());

        let embedding_cache = Arc::new(EmbeddingCache::new(2));
        embedding_cache.put(8195, vec![1.0, 0.0]);
        let embeddings = EmbeddingResolver::new(embedding_cache, Arc::new(embedder()), timeout);

        let candidates = Arc::new(CandidatePool::new());
        candidates
            .publish(CandidateSnapshot::new(vec![Movie::new(8195, "Ronin", "Ronin overview")]))
            .await;

        RecommendationOrchestrator::new(OrchestratorDeps {
            store: Arc::clone(&store),
            cache,
            catalog,
            embeddings,
            candidates,
            generative: GenerativeRecommender::new(llm, timeout),
            collaborative: CollaborativeRecommender::new(Arc::new(index), store, timeout),
            timeout,
        })
    }

    async fn fixture(llm: MockCompletionProvider, index: MockUserVectorIndex) -> Fixture {
        fixture_with(Arc::new(llm), index).await
    }

    async fn fixture_with(llm: Arc<dyn CompletionProvider>, index: MockUserVectorIndex) -> Fixture {
        let store = Arc::new(InMemoryUserStore::with_users([UserProfile::new(1, "ada")]));
        let cache = Arc::new(InMemoryRecommendationCache::new());
        let orchestrator = orchestrator(store.clone(), cache.clone(), llm, index).await;

        Fixture {
            orchestrator,
            store,
            cache,
        }
    }

    /// Counts how many completions run at the same time
    #[derive(Default)]
    struct TrackingCompletion {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CompletionProvider for TrackingCompletion {
        async fn complete(&self, _prompt: &str) -> AppResult<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(String::new())
        }

        fn name(&self) -> &'static str {
            "tracking-llm"
        }
    }

    /// Store whose next user read sleeps after taking its snapshot
    struct SlowReadStore {
        inner: Arc<InMemoryUserStore>,
        delay_next_read: AtomicBool,
    }

    #[async_trait::async_trait]
    impl UserStore for SlowReadStore {
        async fn find_by_username(&self, username: &str) -> AppResult<Option<UserProfile>> {
            let found = self.inner.find_by_username(username).await;
            if self.delay_next_read.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            found
        }

        async fn favorites_of(&self, user_id: i64) -> AppResult<Vec<Movie>> {
            self.inner.favorites_of(user_id).await
        }

        async fn add_favorite(&self, user_id: i64, movie: &Movie) -> AppResult<bool> {
            self.inner.add_favorite(user_id, movie).await
        }

        async fn remove_favorite(&self, user_id: i64, movie_id: MovieId) -> AppResult<bool> {
            self.inner.remove_favorite(user_id, movie_id).await
        }

        async fn append_history(
            &self,
            user_id: i64,
            movie: &Movie,
            watched_at: chrono::DateTime<Utc>,
        ) -> AppResult<HistoryAppend> {
            self.inner.append_history(user_id, movie, watched_at).await
        }

        async fn replace_recommendations(&self, user_id: i64, movies: &[Movie]) -> AppResult<()> {
            self.inner.replace_recommendations(user_id, movies).await
        }
    }

    fn titles(movies: &[Movie]) -> Vec<&str> {
        movies.iter().map(|m| m.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_add_favorite_recomputes_with_ranked_then_generated() {
        let f = fixture(completion("1. Thief\n2. Ronin\n3. Not A Real Movie"), quiet_index()).await;

        let movie = f.orchestrator.add_favorite("ada", "Heat").await.unwrap();
        assert_eq!(movie.id, Some(949));

        let recommended = f.orchestrator.get_recommendations("ada").await.unwrap();
        assert_eq!(titles(&recommended), vec!["Ronin", "Thief"]);
    }

    #[tokio::test]
    async fn test_duplicate_favorite_does_not_recompute() {
        let mut llm = MockCompletionProvider::new();
        llm.expect_complete().times(1).returning(|_| Ok("Thief".to_string()));
        llm.expect_name().return_const("mock-llm");
        let f = fixture(llm, quiet_index()).await;

        f.orchestrator.add_favorite("ada", "Heat").await.unwrap();
        let again = f.orchestrator.add_favorite("ada", "Heat").await.unwrap();
        assert_eq!(again.id, Some(949));

        assert_eq!(f.orchestrator.get_favorites("ada").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_favorite_recomputes() {
        let f = fixture(completion("Collateral"), quiet_index()).await;
        f.orchestrator.add_favorite("ada", "Heat").await.unwrap();

        f.orchestrator.remove_favorite("ada", 949).await.unwrap();

        assert!(f.orchestrator.get_favorites("ada").await.unwrap().is_empty());
        // no profile left: ranking is skipped, only the generated title remains
        let recommended = f.orchestrator.get_recommendations("ada").await.unwrap();
        assert_eq!(titles(&recommended), vec!["Collateral"]);
    }

    #[tokio::test]
    async fn test_remove_missing_favorite_is_not_found() {
        let f = fixture(completion(""), quiet_index()).await;
        let result = f.orchestrator.remove_favorite("ada", 949).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_every_fifth_watch_triggers_recompute() {
        let mut llm = MockCompletionProvider::new();
        llm.expect_complete().times(1).returning(|_| Ok("Thief".to_string()));
        llm.expect_name().return_const("mock-llm");
        let f = fixture(llm, quiet_index()).await;

        for title in ["Heat", "Ronin", "Thief", "Collateral"] {
            f.orchestrator.add_to_history("ada", title).await.unwrap();
        }
        assert!(f.orchestrator.get_recommendations("ada").await.unwrap().is_empty());

        // repeat of the newest entry does not count
        let repeat = f.orchestrator.add_to_history("ada", "Collateral").await.unwrap();
        assert!(!repeat.appended);

        let fifth = f.orchestrator.add_to_history("ada", "Sicario").await.unwrap();
        assert_eq!(fifth.total_appends, 5);

        let recommended = f.orchestrator.get_recommendations("ada").await.unwrap();
        assert_eq!(titles(&recommended), vec!["Ronin", "Thief"]);
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let f = fixture(completion(""), quiet_index()).await;
        f.orchestrator.add_to_history("ada", "Heat").await.unwrap();
        f.orchestrator.add_to_history("ada", "Ronin").await.unwrap();

        let history = f.orchestrator.get_history("ada").await.unwrap();
        let watched: Vec<_> = history.iter().map(|e| e.movie.title.as_str()).collect();
        assert_eq!(watched, vec!["Ronin", "Heat"]);
    }

    #[tokio::test]
    async fn test_set_recommendations_bypasses_pipeline() {
        let mut llm = MockCompletionProvider::new();
        llm.expect_complete().never();
        llm.expect_name().return_const("mock-llm");
        let f = fixture(llm, quiet_index()).await;

        let requested = vec![
            "Sicario".to_string(),
            "Nowhere Film".to_string(),
            "Heat".to_string(),
            "Sicario".to_string(),
        ];
        let movies = f
            .orchestrator
            .set_recommendations("ada", &requested)
            .await
            .unwrap();

        assert_eq!(titles(&movies), vec!["Sicario", "Heat"]);
        let user = f.store.find_by_username("ada").await.unwrap().unwrap();
        assert_eq!(user.recommended, movies);
    }

    #[tokio::test]
    async fn test_recommendations_cache_is_evicted_on_write() {
        let f = fixture(completion("Thief"), quiet_index()).await;

        f.orchestrator.get_recommendations("ada").await.unwrap();
        assert!(f.cache.contains("ada"));

        f.orchestrator.add_favorite("ada", "Heat").await.unwrap();
        assert!(!f.cache.contains("ada"));
    }

    #[tokio::test]
    async fn test_empty_profile_skips_vector_sources() {
        let mut index = MockUserVectorIndex::new();
        index.expect_search().never();
        index.expect_upsert().never();
        index.expect_name().return_const("mock-index");
        let f = fixture(completion("Heat"), index).await;

        let movies = f.orchestrator.recompute("ada").await.unwrap();
        assert_eq!(titles(&movies), vec!["Heat"]);
    }

    #[tokio::test]
    async fn test_collaborative_titles_come_last() {
        let mut index = MockUserVectorIndex::new();
        index.expect_upsert().returning(|_, _, _| Ok(()));
        index.expect_search().returning(|_, _, _| {
            Ok(vec![crate::models::SimilarUser {
                user_id: 2,
                score: 0.99,
            }])
        });
        index.expect_name().return_const("mock-index");
        let f = fixture(completion("Thief"), index).await;

        let mut neighbor = UserProfile::new(2, "grace");
        neighbor.favorites = vec![Movie::new(1538, "Collateral", "Collateral overview")];
        f.store.insert(neighbor).await;

        f.orchestrator.add_favorite("ada", "Heat").await.unwrap();

        let recommended = f.orchestrator.get_recommendations("ada").await.unwrap();
        assert_eq!(titles(&recommended), vec!["Ronin", "Thief", "Collateral"]);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let f = fixture(completion(""), quiet_index()).await;

        assert!(matches!(
            f.orchestrator.recompute("nobody").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.orchestrator.get_recommendations("nobody").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_title_is_not_found() {
        let f = fixture(completion(""), quiet_index()).await;
        let result = f.orchestrator.add_favorite("ada", "Nowhere Film").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_recomputes_of_one_user_are_serialized() {
        let llm = Arc::new(TrackingCompletion::default());
        let f = fixture_with(llm.clone(), quiet_index()).await;

        let (a, b) = tokio::join!(f.orchestrator.recompute("ada"), f.orchestrator.recompute("ada"));
        a.unwrap();
        b.unwrap();

        assert_eq!(llm.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(f.orchestrator.user_locks.is_empty());
    }

    #[tokio::test]
    async fn test_recomputes_of_different_users_run_in_parallel() {
        let llm = Arc::new(TrackingCompletion::default());
        let f = fixture_with(llm.clone(), quiet_index()).await;
        f.store.insert(UserProfile::new(2, "grace")).await;

        let (a, b) = tokio::join!(
            f.orchestrator.recompute("ada"),
            f.orchestrator.recompute("grace")
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(llm.max_in_flight.load(Ordering::SeqCst), 2);
        assert!(f.orchestrator.user_locks.is_empty());
    }

    #[tokio::test]
    async fn test_cache_fill_does_not_outlive_concurrent_write() {
        let inner = Arc::new(InMemoryUserStore::with_users([UserProfile::new(1, "ada")]));
        let store = Arc::new(SlowReadStore {
            inner,
            delay_next_read: AtomicBool::new(true),
        });
        let orchestrator = orchestrator(
            store,
            Arc::new(InMemoryRecommendationCache::new()),
            Arc::new(completion("")),
            quiet_index(),
        )
        .await;

        // the read takes its snapshot first, the write lands while it sleeps
        let requested = vec!["Heat".to_string()];
        let (read, written) = tokio::join!(orchestrator.get_recommendations("ada"), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            orchestrator.set_recommendations("ada", &requested).await
        });
        read.unwrap();
        assert_eq!(titles(&written.unwrap()), vec!["Heat"]);

        let served = orchestrator.get_recommendations("ada").await.unwrap();
        assert_eq!(titles(&served), vec!["Heat"]);
    }
}
