//! Scripted HTTP backend shared by the session integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::{BridgeError, HttpClient, HttpRequest, HttpResponse};
use chrono::{DateTime, TimeZone, Utc};
use core_runtime::events::{CoreEvent, EventBus};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

pub const PREFIX: &str = "http://api.test/api/catalog";

pub enum Scripted {
    Respond(HttpResponse),
    Fail(BridgeError),
    /// Wait for the gate before answering.
    Gated(Arc<Notify>, HttpResponse),
}

/// Fake backend answering from per-route queues keyed by method and path.
///
/// Unscripted routes answer 404.
#[derive(Default)]
pub struct ScriptedHttp {
    routes: Mutex<HashMap<(&'static str, String), VecDeque<Scripted>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, method: &'static str, path: &str, scripted: Scripted) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(scripted);
    }

    pub fn respond(&self, method: &'static str, path: &str, status: u16, body: serde_json::Value) {
        self.push(method, path, Scripted::Respond(json_response(status, body)));
    }

    /// Queue a response that is held until the returned gate is notified.
    pub fn gate(&self, method: &'static str, path: &str, status: u16, body: serde_json::Value) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(method, path, Scripted::Gated(gate.clone(), json_response(status, body)));
        gate
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| route_of(&r.url) == path)
            .collect()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let key = (request.method.as_str(), route_of(&request.url).to_string());
        self.requests.lock().unwrap().push(request);

        let next = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Gated(gate, response)) => {
                gate.notified().await;
                Ok(response)
            }
            None => Ok(HttpResponse::new(404, "unscripted")),
        }
    }
}

fn route_of(url: &str) -> &str {
    let path = url.strip_prefix(PREFIX).unwrap_or(url);
    path.split(['?', '#']).next().unwrap_or(path)
}

pub fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse::new(status, body.to_string())
}

pub fn tokens_body(access: &str, refresh: &str, expires_in: i64) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": expires_in,
    })
}

pub fn profile_body(id: u64, username: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "username": username,
        "avatar_url": format!("https://img.test/{}.jpg", username),
    })
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn drain(rx: &mut broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn bus() -> EventBus {
    EventBus::new(64)
}

/// Let spawned tasks run to completion.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}
