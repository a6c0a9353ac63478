// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! A small axum server standing in for the clinic API.
//!
//! Each server runs on its own thread with a single-threaded runtime, so it
//! serves blocking `#[test]`s and `#[tokio::test]`s alike. Every request is
//! recorded before it reaches a handler.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[derive(Clone)]
struct Shared {
    log: Arc<Mutex<Vec<Recorded>>>,
    next_id: Arc<Mutex<u64>>,
    rejected: String,
}

pub struct StubServer {
    url: String,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl StubServer {
    /// Answers every request with the same status and JSON body.
    pub fn canned(status: u16, body: &str) -> StubServer {
        let status = StatusCode::from_u16(status).expect("valid status code");
        let body = body.to_string();
        let shared = Shared::new("");
        let router = Router::new()
            .fallback(move || {
                let body = body.clone();
                async move { (status, [(header::CONTENT_TYPE, "application/json")], body) }
            })
            .layer(middleware::from_fn_with_state(shared.clone(), record));
        Self::start(router, shared)
    }

    /// A resource server: `POST /api/{type}` assigns numeric ids from 42,
    /// `PATCH` and `DELETE` on `/api/{type}/{id}` answer 204, and
    /// `GET /health` answers 200. Creates of `rejected` answer 422.
    pub fn resources(rejected: &str) -> StubServer {
        let shared = Shared::new(rejected);
        let router = Router::new()
            .route("/health", get(|| async { Json(json!({"ok": true})) }))
            .route("/api/:entity", post(create))
            .route("/api/:entity/:id", patch(no_content).delete(no_content))
            .layer(middleware::from_fn_with_state(shared.clone(), record))
            .with_state(shared.clone());
        Self::start(router, shared)
    }

    fn start(router: Router, shared: Shared) -> StubServer {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("stub runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind listener");
                tx.send(listener.local_addr().expect("local addr")).unwrap();
                axum::serve(listener, router).await.expect("serve stub");
            });
        });
        let addr = rx.recv().expect("stub server started");
        StubServer {
            url: format!("http://{}", addr),
            log: shared.log,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Every request in arrival order.
    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    /// Entity requests only.
    pub fn api_requests(&self) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with("/api/"))
            .collect()
    }

    /// Entity requests as `METHOD /path`.
    pub fn api_calls(&self) -> Vec<String> {
        self.api_requests()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }
}

impl Shared {
    fn new(rejected: &str) -> Self {
        Shared {
            log: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(42)),
            rejected: rejected.to_string(),
        }
    }
}

async fn record(State(shared): State<Shared>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let headers = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    shared.log.lock().unwrap().push(Recorded {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    });
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn create(State(shared): State<Shared>, Path(entity): Path<String>, body: Bytes) -> Response {
    if entity == shared.rejected {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "rejected"})),
        )
            .into_response();
    }
    let mut resource: Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));
    let mut next_id = shared.next_id.lock().unwrap();
    resource["id"] = json!(*next_id);
    *next_id += 1;
    (StatusCode::CREATED, Json(resource)).into_response()
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}
