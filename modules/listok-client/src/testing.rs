// Scripted transport for exercising the client without a network.
//
// Responses are queued per URL and consumed in order. A URL with an empty
// queue answers 404, which the retrying layer reports as NotFound.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CrmError, Result};
use crate::transport::{ApiRequest, HttpTransport, RawResponse};

enum Scripted {
    Response(RawResponse),
    NetworkFailure(String),
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.push(url, Scripted::Response(RawResponse::new(status, body)));
        self
    }

    pub fn respond_json(self, url: &str, body: serde_json::Value) -> Self {
        self.respond(url, 200, body.to_string())
    }

    pub fn fail(self, url: &str, message: &str) -> Self {
        self.push(url, Scripted::NetworkFailure(message.to_string()));
        self
    }

    fn push(&self, url: &str, entry: Scripted) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(entry);
    }

    /// Every request executed so far, in order.
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse> {
        self.calls.lock().unwrap().push(request.clone());
        let next = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(Scripted::Response(resp)) => Ok(resp),
            Some(Scripted::NetworkFailure(message)) => Err(CrmError::Transient(message)),
            None => Ok(RawResponse::new(
                404,
                format!("ScriptedTransport: nothing queued for {}", request.url),
            )),
        }
    }
}
