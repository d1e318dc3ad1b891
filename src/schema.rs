use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jsonschema::JSONSchema;
use parking_lot::RwLock;

use crate::error::SchemaError;

/// Validates request bodies against JSON-schema documents on disk.
///
/// Compiled schemas are cached by path, so each document is read at most once
/// per validator. Clones share the same cache.
#[derive(Debug, Default)]
pub struct SchemaValidator(Arc<SchemaValidatorInner>);

impl SchemaValidator {
    pub fn new() -> Self {
        Self(Arc::new(SchemaValidatorInner::default()))
    }

    pub async fn load(&self, path: &Path) -> Result<Arc<JSONSchema>, SchemaError> {
        self.0.load(path).await
    }

    /// Returns `Ok(false)` when the body is not JSON or does not conform.
    /// `Err` is reserved for problems with the schema document.
    pub async fn validate(&self, path: &Path, body: &[u8]) -> Result<bool, SchemaError> {
        let schema = self.load(path).await?;

        let instance: serde_json::Value = match serde_json::from_slice(body) {
            Ok(instance) => instance,
            Err(err) => {
                tracing::debug!("request body is not valid JSON: {}", err);
                return Ok(false);
            }
        };

        Ok(schema.is_valid(&instance))
    }
}

impl Clone for SchemaValidator {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

#[derive(Default)]
pub struct SchemaValidatorInner {
    schemas: RwLock<HashMap<PathBuf, Arc<JSONSchema>>>,
}

impl fmt::Debug for SchemaValidatorInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidatorInner")
            .field("schemas", &self.schemas.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SchemaValidatorInner {
    async fn load(&self, path: &Path) -> Result<Arc<JSONSchema>, SchemaError> {
        let cached = self.schemas.read().get(path).cloned();
        if let Some(schema) = cached {
            return Ok(schema);
        }

        let content = tokio::fs::read(path).await.map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document: serde_json::Value =
            serde_json::from_slice(&content).map_err(|source| SchemaError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let compiled = JSONSchema::compile(&document).map_err(|err| SchemaError::Compile {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        tracing::debug!("compiled schema {}", path.display());

        // concurrent first loads may both compile; last insert wins
        let schema = Arc::new(compiled);
        self.schemas
            .write()
            .insert(path.to_path_buf(), Arc::clone(&schema));
        Ok(schema)
    }
}
