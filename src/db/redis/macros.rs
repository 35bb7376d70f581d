/// Read-through caching for fallible async lookups.
///
/// Returns the cached value when `$key` is present. Otherwise awaits `$block`,
/// queues the value for a background write with `$ttl` seconds to live, and
/// returns it. A Redis read failure counts as a miss so that a cache outage
/// never fails the lookup itself.
///
/// # Arguments
/// * `$cache`: a [`Cache`](crate::db::Cache)
/// * `$key`: the [`CacheKey`](crate::db::CacheKey) to read and write
/// * `$ttl`: time-to-live in seconds
/// * `$block`: future yielding `AppResult<T>` on a miss
///
/// # Example
/// ```rust,ignore
/// let movie: Option<Movie> = cached!(self.cache, CacheKey::MovieById(id), MOVIE_TTL, async {
///     self.fetch_movie(id).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        let hit = match $cache.get_from_cache(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache read failed, treating as miss");
                None
            }
        };

        match hit {
            Some(cached) => Ok(cached),
            None => match $block.await {
                Ok(value) => {
                    $cache.set_in_background(&key, &value, $ttl);
                    Ok(value)
                }
                Err(e) => Err(e),
            },
        }
    }};
}
