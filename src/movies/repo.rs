use async_trait::async_trait;
use sqlx::PgPool;

use super::repo_types::{ListedMovieRow, Movie, NewMovie};
use crate::{
    db::bounded,
    error::StoreError,
    filters::{calculate_metadata, Filters, Metadata},
};

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn insert(&self, movie: NewMovie) -> Result<Movie, StoreError>;
    async fn get(&self, id: i64) -> Result<Movie, StoreError>;
    /// Version-checked; see [`crate::users::repo::UserStore::update`].
    async fn update(&self, movie: &Movie) -> Result<Movie, StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
    /// Movies whose title matches every word of `title` (empty matches all)
    /// and whose genres contain all of `genres`.
    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError>;
}

#[derive(Clone)]
pub struct PgMovieStore {
    db: PgPool,
}

impl PgMovieStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MovieStore for PgMovieStore {
    async fn insert(&self, movie: NewMovie) -> Result<Movie, StoreError> {
        bounded(
            sqlx::query_as::<_, Movie>(
                r#"
                INSERT INTO movies (title, year, runtime, genres)
                VALUES ($1, $2, $3, $4)
                RETURNING id, created_at, title, year, runtime, genres, version
                "#,
            )
            .bind(&movie.title)
            .bind(movie.year)
            .bind(movie.runtime)
            .bind(&movie.genres)
            .fetch_one(&self.db),
        )
        .await
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        bounded(
            sqlx::query_as::<_, Movie>(
                r#"
                SELECT id, created_at, title, year, runtime, genres, version
                FROM movies
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_one(&self.db),
        )
        .await
    }

    async fn update(&self, movie: &Movie) -> Result<Movie, StoreError> {
        let row = bounded(
            sqlx::query_as::<_, Movie>(
                r#"
                UPDATE movies
                SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
                WHERE id = $5 AND version = $6
                RETURNING id, created_at, title, year, runtime, genres, version
                "#,
            )
            .bind(&movie.title)
            .bind(movie.year)
            .bind(movie.runtime)
            .bind(&movie.genres)
            .bind(movie.id)
            .bind(movie.version)
            .fetch_optional(&self.db),
        )
        .await?;
        row.ok_or(StoreError::EditConflict)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        let result = bounded(
            sqlx::query("DELETE FROM movies WHERE id = $1")
                .bind(id)
                .execute(&self.db),
        )
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError> {
        let column = filters
            .sort_column()
            .ok_or_else(|| StoreError::InvalidSort(filters.sort.clone()))?;

        // `column` comes from the safelist, never from raw input.
        let sql = format!(
            r#"
            SELECT count(*) OVER() AS total_records,
                   id, created_at, title, year, runtime, genres, version
            FROM movies
            WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
              AND (genres @> $2 OR $2 = '{{}}')
            ORDER BY {column} {direction}, id ASC
            LIMIT $3 OFFSET $4
            "#,
            direction = filters.sort_direction().as_sql(),
        );

        let rows = bounded(
            sqlx::query_as::<_, ListedMovieRow>(&sql)
                .bind(title)
                .bind(genres)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.db),
        )
        .await?;

        let total = rows.first().map(|r| r.total_records).unwrap_or(0);
        let movies = rows.into_iter().map(|r| r.movie).collect();
        Ok((movies, calculate_metadata(total, filters.page, filters.page_size)))
    }
}
