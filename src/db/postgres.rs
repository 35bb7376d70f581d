use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};

use crate::{
    db::users::{HistoryAppend, UserStore},
    error::{AppError, AppResult},
    models::{Movie, MovieId, UserProfile, WatchEntry, HISTORY_RETENTION},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// PostgreSQL-backed user state
///
/// Expects the tables `users (id, username, watch_count)`,
/// `user_favorites (user_id, movie_id, movie, added_at)`,
/// `watch_history (id, user_id, movie_id, movie, watched_at)` and
/// `user_recommendations (user_id, position, movie)`. Movie snapshots are JSONB.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_favorites(&self, user_id: i64) -> AppResult<Vec<Movie>> {
        let rows: Vec<(Json<Movie>,)> = sqlx::query_as(
            r#"
            SELECT movie
            FROM user_favorites
            WHERE user_id = $1
            ORDER BY added_at, movie_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(Json(movie),)| movie).collect())
    }

    async fn load_history(&self, user_id: i64) -> AppResult<Vec<WatchEntry>> {
        let rows: Vec<(Json<Movie>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT movie, watched_at
            FROM watch_history
            WHERE user_id = $1
            ORDER BY watched_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(Json(movie), watched_at)| WatchEntry { movie, watched_at })
            .collect())
    }

    async fn load_recommendations(&self, user_id: i64) -> AppResult<Vec<Movie>> {
        let rows: Vec<(Json<Movie>,)> = sqlx::query_as(
            r#"
            SELECT movie
            FROM user_recommendations
            WHERE user_id = $1
            ORDER BY position
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(Json(movie),)| movie).collect())
    }
}

#[async_trait::async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<UserProfile>> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, username FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        let Some((id, username)) = row else {
            return Ok(None);
        };

        let (favorites, history, recommended) = tokio::try_join!(
            self.load_favorites(id),
            self.load_history(id),
            self.load_recommendations(id)
        )?;

        Ok(Some(UserProfile {
            id,
            username,
            favorites,
            history,
            recommended,
        }))
    }

    async fn favorites_of(&self, user_id: i64) -> AppResult<Vec<Movie>> {
        self.load_favorites(user_id).await
    }

    async fn add_favorite(&self, user_id: i64, movie: &Movie) -> AppResult<bool> {
        let movie_id = movie.id.ok_or_else(|| {
            AppError::InvalidInput(format!("Movie '{}' has no catalog id", movie.title))
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO user_favorites (user_id, movie_id, movie, added_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, movie_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(movie_id)
        .bind(Json(movie))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_favorite(&self, user_id: i64, movie_id: MovieId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM user_favorites WHERE user_id = $1 AND movie_id = $2")
            .bind(user_id)
            .bind(movie_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_history(
        &self,
        user_id: i64,
        movie: &Movie,
        watched_at: DateTime<Utc>,
    ) -> AppResult<HistoryAppend> {
        let mut tx = self.pool.begin().await?;

        // serializes appends of the same user until commit
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let newest: Option<(Option<i64>, Json<Movie>)> = sqlx::query_as(
            r#"
            SELECT movie_id, movie
            FROM watch_history
            WHERE user_id = $1
            ORDER BY watched_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let repeats_newest = newest.is_some_and(|(newest_id, Json(newest_movie))| {
            match (newest_id, movie.id) {
                (Some(a), Some(b)) => a == b,
                _ => newest_movie.title.eq_ignore_ascii_case(&movie.title),
            }
        });

        if repeats_newest {
            let (total,): (i64,) = sqlx::query_as("SELECT watch_count FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(HistoryAppend {
                appended: false,
                total_appends: total.max(0) as u64,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO watch_history (user_id, movie_id, movie, watched_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(movie.id)
        .bind(Json(movie))
        .bind(watched_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM watch_history
            WHERE user_id = $1
              AND id NOT IN (
                SELECT id FROM watch_history
                WHERE user_id = $1
                ORDER BY watched_at DESC, id DESC
                LIMIT $2
              )
            "#,
        )
        .bind(user_id)
        .bind(HISTORY_RETENTION as i64)
        .execute(&mut *tx)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "UPDATE users SET watch_count = watch_count + 1 WHERE id = $1 RETURNING watch_count",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(HistoryAppend {
            appended: true,
            total_appends: total.max(0) as u64,
        })
    }

    async fn replace_recommendations(&self, user_id: i64, movies: &[Movie]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_recommendations WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for (position, movie) in movies.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO user_recommendations (user_id, position, movie)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(user_id)
            .bind(position as i32)
            .bind(Json(movie))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(user_id, count = movies.len(), "Replaced persisted recommendations");

        Ok(())
    }
}
