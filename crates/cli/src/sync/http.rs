// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP implementation of [`RemoteApi`] using reqwest.
//!
//! Endpoints, relative to the configured base URL:
//!
//! ```text
//! POST   /api/{entity_type}        create (Idempotency-Key header)
//! PATCH  /api/{entity_type}/{id}   update
//! DELETE /api/{entity_type}/{id}   delete (404 and 410 count as done)
//! GET    /health                   connectivity probe
//! ```
//!
//! Every entity request carries `X-Tenant-Key`.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;

use clinicsync_core::{EntityType, TenantKey};

use super::remote::{RemoteApi, RemoteError, RemoteFuture, RemoteRecord, RemoteResult};

pub const TENANT_HEADER: &str = "X-Tenant-Key";
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Longest error body echoed into a queue entry's `last_error`.
const MAX_ERROR_BODY: usize = 200;

fn parse_base(base_url: &str) -> RemoteResult<Url> {
    let url = Url::parse(base_url).map_err(|_| RemoteError::InvalidUrl(base_url.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(RemoteError::InvalidUrl(base_url.to_string()));
    }
    Ok(url)
}

fn build_client(timeout: Duration) -> RemoteResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RemoteError::Network(e.to_string()))
}

fn network(err: reqwest::Error) -> RemoteError {
    RemoteError::Network(err.to_string())
}

/// Remote API client.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> RemoteResult<Self> {
        Ok(HttpRemote {
            client: build_client(timeout)?,
            base: parse_base(base_url)?,
            token,
        })
    }

    /// `{base}/api/{entity_type}[/{id}]`, with segments percent-encoded.
    pub fn endpoint(&self, entity_type: &EntityType, id: Option<&str>) -> RemoteResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| RemoteError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty().push("api").push(entity_type.as_str());
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, tenant: &TenantKey) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(TENANT_HEADER, tenant.as_str());
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Maps a non-success response to [`RemoteError::Status`].
async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| message.is_char_boundary(*i))
            .unwrap_or(0);
        message.truncate(cut);
    }
    if message.is_empty() {
        message = status.canonical_reason().unwrap_or("error").to_string();
    }
    Err(RemoteError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Reads an optional JSON resource from a success response.
async fn read_resource(response: Response) -> RemoteResult<Option<RemoteRecord>> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    let body = response.bytes().await.map_err(network)?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
    RemoteRecord::from_value(value).map(Some)
}

impl RemoteApi for HttpRemote {
    fn create<'a>(
        &'a self,
        tenant: &'a TenantKey,
        entity_type: &'a EntityType,
        idempotency_key: &'a str,
        payload: &'a Value,
    ) -> RemoteFuture<'a, RemoteRecord> {
        Box::pin(async move {
            let url = self.endpoint(entity_type, None)?;
            let response = self
                .request(Method::POST, url, tenant)
                .header(IDEMPOTENCY_HEADER, idempotency_key)
                .json(payload)
                .send()
                .await
                .map_err(network)?;
            let response = check_status(response).await?;
            read_resource(response).await?.ok_or_else(|| {
                RemoteError::InvalidResponse("create returned no resource".to_string())
            })
        })
    }

    fn update<'a>(
        &'a self,
        tenant: &'a TenantKey,
        entity_type: &'a EntityType,
        id: &'a str,
        patch: &'a Value,
    ) -> RemoteFuture<'a, Option<RemoteRecord>> {
        Box::pin(async move {
            let url = self.endpoint(entity_type, Some(id))?;
            let response = self
                .request(Method::PATCH, url, tenant)
                .json(patch)
                .send()
                .await
                .map_err(network)?;
            let response = check_status(response).await?;
            read_resource(response).await
        })
    }

    fn delete<'a>(
        &'a self,
        tenant: &'a TenantKey,
        entity_type: &'a EntityType,
        id: &'a str,
    ) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let url = self.endpoint(entity_type, Some(id))?;
            let response = self
                .request(Method::DELETE, url, tenant)
                .send()
                .await
                .map_err(network)?;
            if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
                tracing::debug!(%entity_type, id, "delete target already gone");
                return Ok(());
            }
            check_status(response).await?;
            Ok(())
        })
    }
}

/// Reachability check against `{base}/health`.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: Client,
    url: Url,
}

impl HealthProbe {
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let mut url = parse_base(base_url)?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::InvalidUrl(base_url.to_string()))?
            .pop_if_empty()
            .push("health");
        Ok(HealthProbe {
            client: build_client(timeout)?,
            url,
        })
    }

    /// True if the server answered the probe with a success status.
    pub async fn check(&self) -> bool {
        match self.client.get(self.url.clone()).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
