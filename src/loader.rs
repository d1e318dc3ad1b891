use std::path::{Path, PathBuf};

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};

use crate::error::LoadError;
use crate::model::Imposter;
use crate::schema::SchemaValidator;

pub const IMPOSTER_EXTENSION: &str = "imp.json";

/// Loads every `*.imp.json` file below `dir`, in path order.
///
/// Relative `schemaFile` and `bodyFile` paths are resolved against the
/// directory of the file that declares them. Schemas are compiled here so a
/// broken one fails the load instead of a request. Missing body files are
/// allowed and render as an empty body.
pub async fn load_imposters(
    dir: &Path,
    validator: &SchemaValidator,
) -> Result<Vec<Imposter>, LoadError> {
    let is_dir = tokio::fs::metadata(dir)
        .await
        .map_or(false, |metadata| metadata.is_dir());
    if !is_dir {
        return Err(LoadError::Dir {
            path: dir.to_path_buf(),
        });
    }

    // the directory is literal, only the suffix is a pattern
    let pattern = format!(
        "{}/**/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        IMPOSTER_EXTENSION
    );
    let paths = glob::glob(&pattern).map_err(|source| LoadError::Pattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut files = paths.collect::<Result<Vec<PathBuf>, _>>()?;
    files.sort();

    let mut imposters = Vec::new();
    for file in files {
        let loaded = load_file(&file, validator).await?;
        tracing::debug!("loaded {} imposters from {}", loaded.len(), file.display());
        imposters.extend(loaded);
    }

    tracing::info!("loaded {} imposters from {}", imposters.len(), dir.display());
    Ok(imposters)
}

pub async fn load_file(
    path: &Path,
    validator: &SchemaValidator,
) -> Result<Vec<Imposter>, LoadError> {
    let content = tokio::fs::read(path).await.map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut imposters: Vec<Imposter> =
        serde_json::from_slice(&content).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for imposter in imposters.iter_mut() {
        resolve_paths(imposter, base);
        check(imposter).map_err(|message| LoadError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;

        if let Some(schema_file) = &imposter.request.schema_file {
            validator
                .load(schema_file)
                .await
                .map_err(|source| LoadError::Schema {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
    }

    Ok(imposters)
}

fn resolve_paths(imposter: &mut Imposter, base: &Path) {
    let resolve = |file: &mut Option<PathBuf>| {
        if let Some(file) = file {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    };

    resolve(&mut imposter.request.schema_file);
    resolve(&mut imposter.response.body_file);
}

fn check(imposter: &Imposter) -> Result<(), String> {
    let request = &imposter.request;
    let response = &imposter.response;

    Method::from_bytes(request.method.as_bytes())
        .map_err(|_| format!("invalid method {:?}", request.method))?;

    if !request.endpoint.starts_with('/') {
        return Err(format!(
            "endpoint {:?} must start with '/'",
            request.endpoint
        ));
    }

    for name in request.headers.iter().flat_map(|headers| headers.keys()) {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| format!("invalid request header name {:?}", name))?;
    }

    StatusCode::from_u16(response.status)
        .map_err(|_| format!("invalid status {}", response.status))?;

    for (name, value) in response.headers.iter().flatten() {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| format!("invalid response header name {:?}", name))?;
        HeaderValue::from_str(value)
            .map_err(|_| format!("invalid value for response header {:?}", name))?;
    }

    if response.body.as_deref().map_or(false, |body| !body.is_empty())
        && response.body_file.is_some()
    {
        tracing::warn!(
            "imposter {} {} sets both body and bodyFile, bodyFile is ignored",
            request.method,
            request.endpoint
        );
    }

    Ok(())
}
