use axum::body::{self, Bytes, Full};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{self, StatusCode};
use axum::response::Response as HttpResponse;

use crate::model::Response;

/// A configured response resolved to what goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Rendered {
    /// Writes headers, then the status, then the body.
    pub fn into_response(self) -> HttpResponse {
        let mut builder = http::Response::builder();
        for (key, value) in self.headers {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => tracing::warn!("skipping invalid response header {}: {}", key, value),
            }
        }

        let response = builder
            .status(self.status)
            .body(body::boxed(Full::from(self.body)));

        // only header parts can fail, and those were checked above
        response.unwrap_or_else(|_| {
            let mut response = HttpResponse::new(body::boxed(body::Empty::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
    }
}

/// Resolves a configured response. Never fails: an unreadable `bodyFile` renders an
/// empty body with the configured status.
pub async fn render(response: &Response) -> Rendered {
    let body = match (&response.body, &response.body_file) {
        (Some(body), _) if !body.is_empty() => Bytes::from(body.clone()),
        (_, Some(path)) => match tokio::fs::read(path).await {
            Ok(content) => Bytes::from(content),
            Err(err) => {
                tracing::warn!("failed to read body file {}: {}", path.display(), err);
                Bytes::new()
            }
        },
        _ => Bytes::new(),
    };

    let headers = response
        .headers
        .iter()
        .flatten()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let status = StatusCode::from_u16(response.status).unwrap_or_else(|_| {
        tracing::error!("invalid status {} in imposter response", response.status);
        StatusCode::INTERNAL_SERVER_ERROR
    });

    Rendered {
        status,
        headers,
        body,
    }
}
