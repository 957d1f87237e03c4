use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{MovieEnvelope, MovieInput, MoviePage},
    repo_types::{validate_movie, Movie, NewMovie, SORT_SAFELIST},
};
use crate::{
    auth::{
        dto::MessageResponse,
        identity::{MovieRead, MovieWrite, Permitted},
    },
    error::AppError,
    filters::{validate_filters, Filters},
    json::{read_csv, read_int, read_string, JsonBody, PathId},
    state::AppState,
    validation::Validator,
};

pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

pub fn movie_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/movies", get(list_movies).post(create_movie))
        .route(
            "/v1/movies/:id",
            get(show_movie).patch(update_movie).delete(delete_movie),
        )
}

fn check(movie: &Movie) -> Result<(), AppError> {
    let mut v = Validator::new();
    validate_movie(&mut v, &movie.title, movie.year, movie.runtime, &movie.genres);
    if v.valid() {
        Ok(())
    } else {
        Err(AppError::FailedValidation(v.into_errors()))
    }
}

#[instrument(skip(_caller, state))]
pub async fn list_movies(
    _caller: Permitted<MovieRead>,
    State(state): State<AppState>,
    Query(qs): Query<HashMap<String, String>>,
) -> Result<Json<MoviePage>, AppError> {
    let mut v = Validator::new();
    let title = read_string(&qs, "title", "");
    let genres = read_csv(&qs, "genres");
    let filters = Filters {
        page: read_int(&qs, "page", 1, &mut v),
        page_size: read_int(&qs, "page_size", 20, &mut v),
        sort: read_string(&qs, "sort", "id"),
        sort_safelist: SORT_SAFELIST,
    };
    validate_filters(&mut v, &filters);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    let (movies, metadata) = state.movies.list(&title, &genres, &filters).await?;
    Ok(Json(MoviePage { metadata, movies }))
}

#[instrument(skip(_caller, state))]
pub async fn show_movie(
    _caller: Permitted<MovieRead>,
    State(state): State<AppState>,
    PathId(id): PathId,
) -> Result<Json<MovieEnvelope>, AppError> {
    let movie = state.movies.get(id).await?;
    Ok(Json(MovieEnvelope { movie }))
}

#[instrument(skip(caller, state, payload))]
pub async fn create_movie(
    caller: Permitted<MovieWrite>,
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<MovieInput>,
) -> Result<(StatusCode, [(header::HeaderName, String); 1], Json<MovieEnvelope>), AppError> {
    let new = NewMovie {
        title: payload.title.unwrap_or_default(),
        year: payload.year.unwrap_or_default(),
        runtime: payload.runtime.unwrap_or_default(),
        genres: payload.genres.unwrap_or_default(),
    };

    let mut v = Validator::new();
    validate_movie(&mut v, &new.title, new.year, new.runtime, &new.genres);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    let movie = state.movies.insert(new).await?;
    info!(movie_id = movie.id, user_id = caller.user.id, "movie created");
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/v1/movies/{}", movie.id))],
        Json(MovieEnvelope { movie }),
    ))
}

/// Partial update. The version read here is the one the store checks, so a
/// concurrent writer between read and write produces a 409.
#[instrument(skip(caller, state, headers, payload))]
pub async fn update_movie(
    caller: Permitted<MovieWrite>,
    State(state): State<AppState>,
    PathId(id): PathId,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<MovieInput>,
) -> Result<Json<MovieEnvelope>, AppError> {
    let mut movie = state.movies.get(id).await?;

    if let Some(expected) = headers.get(EXPECTED_VERSION_HEADER) {
        let matches = expected
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok())
            == Some(movie.version);
        if !matches {
            return Err(AppError::EditConflict);
        }
    }

    if let Some(title) = payload.title {
        movie.title = title;
    }
    if let Some(year) = payload.year {
        movie.year = year;
    }
    if let Some(runtime) = payload.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = payload.genres {
        movie.genres = genres;
    }
    check(&movie)?;

    let movie = state.movies.update(&movie).await?;
    info!(movie_id = movie.id, version = movie.version, user_id = caller.user.id, "movie updated");
    Ok(Json(MovieEnvelope { movie }))
}

#[instrument(skip(caller, state))]
pub async fn delete_movie(
    caller: Permitted<MovieWrite>,
    State(state): State<AppState>,
    PathId(id): PathId,
) -> Result<Json<MessageResponse>, AppError> {
    state.movies.delete(id).await?;
    info!(movie_id = id, user_id = caller.user.id, "movie deleted");
    Ok(Json(MessageResponse::new("movie successfully deleted")))
}
