use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

use super::runtime::Runtime;
use crate::validation::{unique, Validator};

pub const SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Movie {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

#[derive(Debug, Clone)]
pub struct NewMovie {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

/// List row carrying the windowed total alongside the movie.
#[derive(Debug, FromRow)]
pub(crate) struct ListedMovieRow {
    pub total_records: i64,
    #[sqlx(flatten)]
    pub movie: Movie,
}

pub fn validate_movie(v: &mut Validator, title: &str, year: i32, runtime: Runtime, genres: &[String]) {
    v.check(!title.is_empty(), "title", "must be provided");
    v.check(title.len() <= 500, "title", "must not be more than 500 bytes long");

    v.check(year != 0, "year", "must be provided");
    v.check(year >= 1888, "year", "must be greater than 1888");
    v.check(
        year <= OffsetDateTime::now_utc().year(),
        "year",
        "must not be in the future",
    );

    v.check(runtime.0 != 0, "runtime", "must be provided");
    v.check(runtime.0 > 0, "runtime", "must be a positive integer");

    v.check(!genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(genres.len() <= 5, "genres", "must not contain more than 5 genres");
    v.check(unique(genres), "genres", "must not contain duplicate values");
}
