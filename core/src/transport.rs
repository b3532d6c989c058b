//! Executing `HttpRequest` values against the network.
//!
//! # Design
//! `Transport` is the I/O seam: the session and synchronizer only ever see
//! plain request/response values, so tests substitute a scripted transport.
//! 4xx/5xx answers come back as `HttpResponse` data; only failures that
//! produce no response at all become `ApiError::Transport`.

use std::future::Future;

use tracing::debug;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send;
}

/// Blocking `ureq` agent driven from tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send {
        let agent = self.agent.clone();
        async move {
            debug!(method = %request.method, url = %request.url, "sending request");
            let response = tokio::task::spawn_blocking(move || execute_blocking(&agent, request))
                .await
                .map_err(|e| ApiError::Transport(e.to_string()))??;
            debug!(status = response.status, "received response");
            Ok(response)
        }
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (key, value) in headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder
}

fn execute_blocking(agent: &ureq::Agent, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let url = req.url.as_str();
    let result = match (req.method, req.body) {
        (HttpMethod::Get, _) => with_headers(agent.get(url), &req.headers).call(),
        (HttpMethod::Delete, _) => with_headers(agent.delete(url), &req.headers).call(),
        (HttpMethod::Post, Some(body)) => {
            with_headers(agent.post(url), &req.headers).send(body.as_bytes())
        }
        (HttpMethod::Post, None) => with_headers(agent.post(url), &req.headers).send_empty(),
        (HttpMethod::Patch, Some(body)) => {
            with_headers(agent.patch(url), &req.headers).send(body.as_bytes())
        }
        (HttpMethod::Patch, None) => with_headers(agent.patch(url), &req.headers).send_empty(),
    };
    let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    Ok(HttpResponse { status, body })
}
