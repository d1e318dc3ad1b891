use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::header::HeaderName;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::debug::Debugger;
use crate::error::AppError;
use crate::handler::{ImposterHandler, SchemaPolicy};
use crate::model::{Imposter, Request as RequestSpec};
use crate::schema::SchemaValidator;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

/// Decides whether a live request is the one an imposter expects.
#[derive(Debug, Clone)]
pub struct Matcher {
    method: Method,
    segments: Vec<Segment>,
    headers: Vec<(HeaderName, String)>,
}

impl Matcher {
    pub fn new(spec: &RequestSpec) -> Result<Self> {
        let method = Method::from_bytes(spec.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| anyhow!("invalid method {:?}", spec.method))?;

        let mut segments = Vec::new();
        for segment in split_path(&spec.endpoint) {
            if segment.starts_with('{') && segment.ends_with('}') {
                // only bare `{name}` captures are matched
                if segment.contains(':') {
                    bail!(
                        "endpoint {:?}: pattern constraints like {} are not supported",
                        spec.endpoint,
                        segment
                    );
                }
                segments.push(Segment::Param);
            } else {
                segments.push(Segment::Literal(segment.to_string()));
            }
        }

        let mut headers = Vec::new();
        for (name, value) in spec.headers.iter().flatten() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| anyhow!("invalid header name {:?}", name))?;
            headers.push((name, value.clone()));
        }

        Ok(Self {
            method,
            segments,
            headers,
        })
    }

    pub fn matches(&self, method: &Method, path: &str, headers: &HeaderMap) -> bool {
        if *method != self.method {
            return false;
        }

        let mut path = split_path(path);
        for segment in &self.segments {
            match (segment, path.next()) {
                (Segment::Literal(expected), Some(actual)) if expected == actual => {}
                (Segment::Param, Some(_)) => {}
                _ => return false,
            }
        }
        if path.next().is_some() {
            return false;
        }

        self.headers.iter().all(|(name, expected)| {
            headers
                .get_all(name)
                .iter()
                .any(|value| value.to_str().map_or(false, |value| value == expected))
        })
    }
}

// "/gophers/" and "/gophers" are the same endpoint
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.trim_start_matches('/')
        .trim_end_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
}

/// Ordered dispatch table. The first imposter whose matcher accepts a request
/// serves it.
#[derive(Debug, Default)]
pub struct ImposterRouter {
    routes: Vec<(Matcher, ImposterHandler)>,
}

impl ImposterRouter {
    pub fn new(
        imposters: Vec<Imposter>,
        debugger: Arc<dyn Debugger>,
        validator: SchemaValidator,
        policy: SchemaPolicy,
    ) -> Result<Self> {
        let mut routes = Vec::with_capacity(imposters.len());
        for imposter in imposters {
            let matcher = Matcher::new(&imposter.request)?;
            let handler = ImposterHandler::new(
                Arc::new(imposter),
                Arc::clone(&debugger),
                validator.clone(),
                policy,
            );
            routes.push((matcher, handler));
        }

        Ok(Self { routes })
    }

    pub fn find(&self, req: &Request<Body>) -> Option<&ImposterHandler> {
        self.routes
            .iter()
            .find(|(matcher, _)| matcher.matches(req.method(), req.uri().path(), req.headers()))
            .map(|(_, handler)| handler)
    }

    pub fn imposters(&self) -> Vec<Imposter> {
        self.routes
            .iter()
            .map(|(_, handler)| handler.imposter().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

pub fn router(imposters: Arc<ImposterRouter>) -> Router {
    Router::new().fallback(dispatch).with_state(imposters)
}

async fn dispatch(
    State(imposters): State<Arc<ImposterRouter>>,
    req: Request<Body>,
) -> Result<Response, AppError> {
    match imposters.find(&req) {
        Some(handler) => handler.handle(req).await,
        None => {
            tracing::debug!("no imposter for {} {}", req.method(), req.uri());
            Ok((StatusCode::NOT_FOUND, "no imposter matches the request").into_response())
        }
    }
}
