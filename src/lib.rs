pub mod debug;
pub mod error;
pub mod handler;
pub mod loader;
pub mod mgmt;
pub mod model;
pub mod render;
pub mod router;
pub mod schema;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::Router;
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::debug::{Debugger, NoOpDebugger, RecordingDebugger, TracingDebugger};
use crate::handler::SchemaPolicy;
use crate::loader::load_imposters;
use crate::router::ImposterRouter;
use crate::schema::SchemaValidator;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnInvalid {
    #[default]
    Reject,
    PassThrough,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub on_invalid: OnInvalid,
    pub reject_status: u16,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            on_invalid: OnInvalid::Reject,
            reject_status: 400,
        }
    }
}

impl SchemaConfig {
    pub fn policy(&self) -> Result<SchemaPolicy> {
        match self.on_invalid {
            OnInvalid::Reject => {
                let status = StatusCode::from_u16(self.reject_status)
                    .map_err(|_| anyhow!("invalid reject_status {}", self.reject_status))?;
                Ok(SchemaPolicy::Reject { status })
            }
            OnInvalid::PassThrough => Ok(SchemaPolicy::PassThrough),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebugMode {
    #[default]
    None,
    Log,
    Record,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub mode: DebugMode,
    pub history: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            mode: DebugMode::None,
            history: 100,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Cors {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub imposters_dir: PathBuf,
    pub listener: String,
    pub management_listener: String,
    pub schema: SchemaConfig,
    pub debug: DebugConfig,
    pub cors: Cors,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            imposters_dir: PathBuf::from("imposters"),
            listener: "0.0.0.0:3000".to_string(),
            management_listener: "0.0.0.0:3443".to_string(),
            schema: SchemaConfig::default(),
            debug: DebugConfig::default(),
            cors: Cors::default(),
        }
    }
}

/// Builds the imposter router and the management router.
pub async fn app(config: &Config) -> Result<(Router, Router)> {
    let validator = SchemaValidator::new();
    let imposters = load_imposters(&config.imposters_dir, &validator).await?;
    let policy = config.schema.policy()?;

    let recorder = (config.debug.mode == DebugMode::Record)
        .then(|| RecordingDebugger::new(config.debug.history));
    let debugger: Arc<dyn Debugger> = match (&recorder, config.debug.mode) {
        (Some(recorder), _) => Arc::new(recorder.clone()),
        (None, DebugMode::Log) => Arc::new(TracingDebugger),
        (None, _) => Arc::new(NoOpDebugger::new()),
    };

    let imposter_router = Arc::new(ImposterRouter::new(imposters, debugger, validator, policy)?);
    if imposter_router.is_empty() {
        tracing::warn!("no imposters found in {}", config.imposters_dir.display());
    }

    let mgmt_router = mgmt::router(imposter_router.clone(), recorder);

    let mut router = router::router(imposter_router).layer(TraceLayer::new_for_http());
    if let Some(cors) = cors_layer(&config.cors)? {
        router = router.layer(cors);
    }

    Ok((router, mgmt_router))
}

fn cors_layer(cors: &Cors) -> Result<Option<CorsLayer>> {
    if cors.allow_origins.is_empty() {
        return Ok(None);
    }

    let wildcard = cors.allow_origins.iter().any(|origin| origin == "*");
    if wildcard && cors.allow_credentials {
        bail!("cors: allow_credentials cannot be combined with a wildcard origin");
    }

    let origins = if wildcard {
        AllowOrigin::from(Any)
    } else {
        let origins = cors
            .allow_origins
            .iter()
            .map(|origin| HeaderValue::from_str(origin))
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    let methods = if cors.allow_methods.is_empty() {
        vec![
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]
    } else {
        cors.allow_methods
            .iter()
            .map(|method| Method::from_bytes(method.to_ascii_uppercase().as_bytes()))
            .collect::<Result<Vec<_>, _>>()?
    };

    let headers = if cors.allow_headers.is_empty() {
        vec![
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ]
    } else {
        cors.allow_headers
            .iter()
            .map(|header| HeaderName::from_bytes(header.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(cors.allow_credentials),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.imposters_dir, PathBuf::from("imposters"));
        assert_eq!(config.listener, "0.0.0.0:3000");
        assert_eq!(config.schema.on_invalid, OnInvalid::Reject);
        assert_eq!(config.debug.mode, DebugMode::None);
        assert!(config.cors.allow_origins.is_empty());
    }

    #[test]
    fn config_from_toml() {
        let config: Config = toml::from_str(
            r#"
            imposters_dir = "mocks"
            listener = "127.0.0.1:8080"

            [schema]
            on_invalid = "pass_through"

            [debug]
            mode = "record"
            history = 5

            [cors]
            allow_origins = ["http://localhost:5173"]
            "#,
        )
        .unwrap();

        assert_eq!(config.imposters_dir, PathBuf::from("mocks"));
        assert_eq!(config.listener, "127.0.0.1:8080");
        assert_eq!(config.management_listener, "0.0.0.0:3443");
        assert_eq!(config.schema.policy().unwrap(), SchemaPolicy::PassThrough);
        assert_eq!(config.debug.mode, DebugMode::Record);
        assert_eq!(config.debug.history, 5);
        assert_eq!(config.cors.allow_origins, vec!["http://localhost:5173"]);
    }

    #[test]
    fn reject_policy_uses_configured_status() {
        let schema = SchemaConfig {
            on_invalid: OnInvalid::Reject,
            reject_status: 422,
        };

        assert_eq!(
            schema.policy().unwrap(),
            SchemaPolicy::Reject {
                status: StatusCode::UNPROCESSABLE_ENTITY
            }
        );
    }

    #[test]
    fn reject_policy_rejects_invalid_status() {
        let schema = SchemaConfig {
            on_invalid: OnInvalid::Reject,
            reject_status: 1000,
        };

        assert!(schema.policy().is_err());
    }

    #[test]
    fn cors_is_off_without_origins() {
        assert!(cors_layer(&Cors::default()).unwrap().is_none());
    }

    #[test]
    fn cors_wildcard_with_credentials_is_rejected() {
        let cors = Cors {
            allow_origins: vec!["*".to_string()],
            allow_credentials: true,
            ..Cors::default()
        };

        assert!(cors_layer(&cors).is_err());
    }
}
