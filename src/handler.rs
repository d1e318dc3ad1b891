use std::sync::Arc;

use anyhow::Context;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;

use crate::debug::{Debugger, Exchange, HttpRequest, HttpResponse};
use crate::error::AppError;
use crate::model::Imposter;
use crate::render::{render, Rendered};
use crate::schema::SchemaValidator;

/// What to do with a request body that fails schema validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaPolicy {
    /// Reply with `status` instead of the configured response.
    Reject { status: StatusCode },
    /// Log the failure and replay the configured response anyway.
    PassThrough,
}

impl Default for SchemaPolicy {
    fn default() -> Self {
        Self::Reject {
            status: StatusCode::BAD_REQUEST,
        }
    }
}

/// Serves the canned response of a single imposter.
#[derive(Debug, Clone)]
pub struct ImposterHandler {
    imposter: Arc<Imposter>,
    debugger: Arc<dyn Debugger>,
    validator: SchemaValidator,
    policy: SchemaPolicy,
}

impl ImposterHandler {
    pub fn new(
        imposter: Arc<Imposter>,
        debugger: Arc<dyn Debugger>,
        validator: SchemaValidator,
        policy: SchemaPolicy,
    ) -> Self {
        Self {
            imposter,
            debugger,
            validator,
            policy,
        }
    }

    pub fn imposter(&self) -> &Imposter {
        &self.imposter
    }

    #[tracing::instrument(
        level = "trace",
        "imposter",
        skip_all,
        fields(method = %self.imposter.request.method, endpoint = %self.imposter.request.endpoint)
    )]
    pub async fn handle(&self, req: Request<Body>) -> Result<Response, AppError> {
        let method = req.method().to_string();
        let uri = req.uri().to_string();
        let headers = transform_headers(req.headers());
        let body = hyper::body::to_bytes(req.into_body()).await?;

        let rendered = match self.check_schema(&body).await? {
            Some(rejection) => rejection,
            None => render(&self.imposter.response).await,
        };

        let exchange = Exchange {
            request: HttpRequest {
                method,
                uri,
                headers,
                body: Some(body.to_vec()),
            },
            response: HttpResponse {
                status: rendered.status.as_u16(),
                headers: rendered.headers.clone(),
                body: rendered.body.to_vec(),
            },
        };

        let response = rendered.into_response();
        self.debugger.notify(&exchange);

        Ok(response)
    }

    /// Returns the reply to send instead of the configured response, if any.
    async fn check_schema(&self, body: &Bytes) -> Result<Option<Rendered>, AppError> {
        let Some(schema_file) = &self.imposter.request.schema_file else {
            return Ok(None);
        };

        let valid = self
            .validator
            .validate(schema_file, body)
            .await
            .map_err(|err| {
                tracing::error!("imposter configuration defect: {}", err);
                err
            })
            .context("broken request schema")?;

        if valid {
            return Ok(None);
        }

        match self.policy {
            SchemaPolicy::Reject { status } => {
                tracing::info!(
                    "rejecting request body that does not match {}",
                    schema_file.display()
                );
                Ok(Some(Rendered {
                    status,
                    headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
                    body: Bytes::from_static(b"request body does not match schema"),
                }))
            }
            SchemaPolicy::PassThrough => {
                tracing::warn!(
                    "request body does not match {}, replaying anyway",
                    schema_file.display()
                );
                Ok(None)
            }
        }
    }
}

fn transform_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(key, value)| {
            let key_str = key.as_str().to_string();
            let value_str = match value.to_str() {
                Ok(value) => value.to_string(),
                Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            };
            (key_str, value_str)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::debug::{NoOpDebugger, RecordingDebugger};
    use crate::model::{Request as RequestSpec, Response as ResponseSpec};

    use super::*;

    const GOPHER: &str = r#"{"data":{"type":"gophers","attributes":{"name":"Zebediah","color":"Purple","age":55}}}"#;

    fn testdata(path: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/testdata/imposters")
            .join(path)
    }

    fn imposter(schema_file: Option<PathBuf>, body: &str) -> Imposter {
        Imposter {
            request: RequestSpec {
                method: "POST".to_string(),
                endpoint: "/gophers".to_string(),
                schema_file,
                headers: None,
            },
            response: ResponseSpec {
                status: 200,
                headers: None,
                body: Some(body.to_string()),
                body_file: None,
            },
        }
    }

    fn handler(
        imposter: Imposter,
        debugger: Arc<dyn Debugger>,
        policy: SchemaPolicy,
    ) -> ImposterHandler {
        ImposterHandler::new(Arc::new(imposter), debugger, SchemaValidator::new(), policy)
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/gophers")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(handler: &ImposterHandler, body: &str) -> (StatusCode, Bytes) {
        let response = handler.handle(post(body)).await.unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn valid_body_gets_configured_response() {
        let schema = testdata("schemas/create_gopher_request.json");
        let handler = handler(
            imposter(Some(schema), r#"{"test":true}"#),
            Arc::new(NoOpDebugger::new()),
            SchemaPolicy::default(),
        );

        let (status, body) = send(&handler, GOPHER).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], br#"{"test":true}"#);
    }

    #[tokio::test]
    async fn no_schema_skips_validation() {
        let handler = handler(
            imposter(None, "test ok"),
            Arc::new(NoOpDebugger::new()),
            SchemaPolicy::default(),
        );

        let (status, body) = send(&handler, "{ this is not json").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"test ok");
    }

    #[tokio::test]
    async fn invalid_body_is_rejected_by_default() {
        let schema = testdata("schemas/create_gopher_request.json");
        let handler = handler(
            imposter(Some(schema), "test ok"),
            Arc::new(NoOpDebugger::new()),
            SchemaPolicy::default(),
        );

        let (status, _) = send(&handler, r#"{"data":{"type":"gophers"}}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reject_status_is_configurable() {
        let schema = testdata("schemas/create_gopher_request.json");
        let handler = handler(
            imposter(Some(schema), "test ok"),
            Arc::new(NoOpDebugger::new()),
            SchemaPolicy::Reject {
                status: StatusCode::UNPROCESSABLE_ENTITY,
            },
        );

        let (status, _) = send(&handler, "").await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn pass_through_replays_invalid_body() {
        let schema = testdata("schemas/create_gopher_request.json");
        let handler = handler(
            imposter(Some(schema), "test ok"),
            Arc::new(NoOpDebugger::new()),
            SchemaPolicy::PassThrough,
        );

        let (status, body) = send(&handler, r#"{"data":{}}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"test ok");
    }

    #[tokio::test]
    async fn broken_schema_is_server_error() {
        let recorder = RecordingDebugger::new(10);
        let handler = handler(
            imposter(Some(testdata("schemas/missing.json")), "test ok"),
            Arc::new(recorder.clone()),
            SchemaPolicy::PassThrough,
        );

        let err = handler.handle(post(GOPHER)).await.err().unwrap();
        let response = axum::response::IntoResponse::into_response(err);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(recorder.exchanges().is_empty());
    }

    #[tokio::test]
    async fn debugger_sees_request_and_reply() {
        let recorder = RecordingDebugger::new(10);
        let handler = handler(
            imposter(None, "test ok"),
            Arc::new(recorder.clone()),
            SchemaPolicy::default(),
        );

        send(&handler, "ping").await;

        let exchanges = recorder.exchanges();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].request.method, "POST");
        assert_eq!(exchanges[0].request.uri, "/gophers");
        assert_eq!(exchanges[0].request.body.as_deref(), Some(&b"ping"[..]));
        assert_eq!(exchanges[0].response.status, 200);
        assert_eq!(exchanges[0].response.body, b"test ok");
    }

    #[tokio::test]
    async fn repeated_requests_get_identical_replies() {
        let handler = handler(
            imposter(None, r#"{"test":true}"#),
            Arc::new(NoOpDebugger::new()),
            SchemaPolicy::default(),
        );

        let first = send(&handler, GOPHER).await;
        let second = send(&handler, GOPHER).await;

        assert_eq!(first, second);
    }
}
