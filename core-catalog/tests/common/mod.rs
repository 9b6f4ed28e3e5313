//! In-memory catalog backend for the client integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::{BridgeError, HttpClient, HttpRequest, HttpResponse, ManualClock, RecordingNavigator};
use chrono::{TimeZone, Utc};
use core_auth::SessionManager;
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PREFIX: &str = "http://api.test/api/catalog";

/// Answers from FIFO queues keyed by `"METHOD /path"`, 404 otherwise.
#[derive(Default)]
pub struct Backend {
    answers: Mutex<HashMap<String, VecDeque<Result<HttpResponse>>>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl Backend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: &str, path: &str, status: u16, body: Value) {
        self.queue(method, path, Ok(HttpResponse::new(status, body.to_string())));
    }

    pub fn fail(&self, method: &str, path: &str, error: BridgeError) {
        self.queue(method, path, Err(error));
    }

    fn queue(&self, method: &str, path: &str, answer: Result<HttpResponse>) {
        self.answers
            .lock()
            .unwrap()
            .entry(format!("{} {}", method, path))
            .or_default()
            .push_back(answer);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// URLs requested so far, without the API prefix.
    pub fn paths(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r.url.trim_start_matches(PREFIX).to_string())
            .collect()
    }

    pub fn last(&self) -> HttpRequest {
        self.requests().pop().expect("no request was made")
    }
}

#[async_trait]
impl HttpClient for Backend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let path = request.url.trim_start_matches(PREFIX);
        let path = path.split('?').next().unwrap_or(path);
        let key = format!("{} {}", request.method.as_str(), path);
        self.seen.lock().unwrap().push(request);

        self.answers
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(HttpResponse::new(404, "not found")))
    }
}

pub fn config(backend: &Arc<Backend>) -> CoreConfig {
    CoreConfig::builder()
        .api_prefix(PREFIX)
        .http_client(backend.clone())
        .navigator(Arc::new(RecordingNavigator::new()))
        .clock(Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        )))
        .request_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Session that completed the OAuth callback and loaded its profile.
pub async fn signed_in(backend: &Arc<Backend>, config: &CoreConfig, events: EventBus) -> SessionManager {
    backend.on(
        "GET",
        "/auth/callback",
        200,
        json!({ "access_token": "T1", "refresh_token": "R1", "expires_in": 3600 }),
    );
    backend.on("GET", "/me", 200, user_json(7, "night-drive"));

    let session = SessionManager::new(config, events);
    session.exchange_callback("code", "state").await.unwrap();
    assert!(session.wait_until_settled().await.is_authenticated());
    session
}

pub fn user_json(id: u64, username: &str) -> Value {
    json!({ "id": id, "kind": "user", "username": username })
}

pub fn track_json(id: u64, title: &str) -> Value {
    json!({
        "id": id,
        "kind": "track",
        "title": title,
        "duration": 215000,
        "user": user_json(1, "uploader"),
    })
}

pub fn page_json(items: Vec<Value>, next_href: Option<&str>) -> Value {
    json!({ "collection": items, "next_href": next_href })
}
