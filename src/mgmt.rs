use std::result::Result as StdResult;
use std::sync::Arc;

use axum::extract::{Extension, Json};
use axum::{routing::get, Router};

use crate::debug::{Exchange, RecordingDebugger};
use crate::error::AppError;
use crate::model::Imposter;
use crate::router::ImposterRouter;

pub fn router(imposters: Arc<ImposterRouter>, recorder: Option<RecordingDebugger>) -> Router {
    Router::new()
        .route("/imposters", get(list_imposters))
        .route("/exchanges", get(list_exchanges))
        .layer(Extension(imposters))
        .layer(Extension(recorder))
}

#[tracing::instrument(level = "trace", "list_imposters", skip_all)]
async fn list_imposters(
    Extension(imposters): Extension<Arc<ImposterRouter>>,
) -> StdResult<Json<Vec<Imposter>>, AppError> {
    let imposters = imposters.imposters();
    tracing::debug!("listing {} imposters", imposters.len());

    Ok(Json(imposters))
}

#[tracing::instrument(level = "trace", "list_exchanges", skip_all)]
async fn list_exchanges(
    Extension(recorder): Extension<Option<RecordingDebugger>>,
) -> StdResult<Json<Vec<Exchange>>, AppError> {
    let exchanges = recorder
        .map(|recorder| recorder.exchanges())
        .unwrap_or_default();
    tracing::debug!("listing {} exchanges", exchanges.len());

    Ok(Json(exchanges))
}
