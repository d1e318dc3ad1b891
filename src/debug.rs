//! Observers for the request/reply pairs served by imposters.
//!
//! A [`Debugger`] is told about every exchange after the reply has been built.
//! Implementations must return quickly and must not fail: they run on the
//! reply path.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Exchange {
    pub request: HttpRequest,
    pub response: HttpResponse,
}

pub trait Debugger: Send + Sync + fmt::Debug {
    fn notify(&self, exchange: &Exchange);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpDebugger;

impl NoOpDebugger {
    pub fn new() -> Self {
        Self
    }
}

impl Debugger for NoOpDebugger {
    fn notify(&self, _exchange: &Exchange) {}
}

/// Emits each exchange as a `debug` level tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDebugger;

impl Debugger for TracingDebugger {
    fn notify(&self, exchange: &Exchange) {
        tracing::debug!(
            method = %exchange.request.method,
            uri = %exchange.request.uri,
            status = exchange.response.status,
            request_body = %String::from_utf8_lossy(exchange.request.body.as_deref().unwrap_or_default()),
            response_body = %String::from_utf8_lossy(&exchange.response.body),
            "imposter exchange"
        );
    }
}

/// Keeps the most recent exchanges in memory, dropping the oldest first.
#[derive(Debug)]
pub struct RecordingDebugger(Arc<RecordingDebuggerInner>);

impl RecordingDebugger {
    pub fn new(capacity: usize) -> Self {
        Self(Arc::new(RecordingDebuggerInner {
            capacity,
            exchanges: Mutex::new(VecDeque::with_capacity(capacity)),
        }))
    }

    /// Oldest first.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.0.exchanges.lock().iter().cloned().collect()
    }
}

impl Clone for RecordingDebugger {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Debugger for RecordingDebugger {
    fn notify(&self, exchange: &Exchange) {
        if self.0.capacity == 0 {
            return;
        }

        let mut exchanges = self.0.exchanges.lock();
        if exchanges.len() == self.0.capacity {
            exchanges.pop_front();
        }
        exchanges.push_back(exchange.clone());
    }
}

#[derive(Debug)]
pub struct RecordingDebuggerInner {
    capacity: usize,
    exchanges: Mutex<VecDeque<Exchange>>,
}
