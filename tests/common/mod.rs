use std::path::PathBuf;
use std::sync::Once;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use tower::util::ServiceExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imposter::Config;

static TRACING_INITIALIZED: Once = Once::new();

// Help function to add tracing to tests
// Note: This is safe to use for multiple tests, but since tests are run concurrently the
// output may be interleaved
#[allow(dead_code)]
pub fn enable_tracing() {
    TRACING_INITIALIZED.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "imposter=trace".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

pub fn testdata() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/testdata/imposters")
}

pub fn config() -> Config {
    Config {
        imposters_dir: testdata(),
        ..Config::default()
    }
}

#[allow(dead_code)]
pub async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response: Response<_> = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, body.to_vec())
}
