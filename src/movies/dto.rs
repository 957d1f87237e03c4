use serde::{Deserialize, Serialize};

use super::{repo_types::Movie, runtime::Runtime};
use crate::filters::Metadata;

/// Body for create and partial update. Absent fields are left unchanged on
/// update and fail validation on create.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovieInput {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct MovieEnvelope {
    pub movie: Movie,
}

#[derive(Debug, Serialize)]
pub struct MoviePage {
    pub metadata: Metadata,
    pub movies: Vec<Movie>,
}
