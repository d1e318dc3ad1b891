use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Error: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Unexpected error!".to_string(),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// The schema document itself is unusable. Never raised for a bad request body.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("schema {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("schema {path} does not compile: {message}")]
    Compile { path: PathBuf, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("imposters directory {path} does not exist or is not a directory")]
    Dir { path: PathBuf },
    #[error("invalid imposter pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("failed to read imposter file: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("failed to read imposter file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse imposter file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid imposter in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error("invalid imposter in {path}: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },
}
