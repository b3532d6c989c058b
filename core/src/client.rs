//! Stateless HTTP request builder and response parser for the task API.
//!
//! # Design
//! `TasksClient` holds only a `base_url`. Each remote operation is split into
//! a `build_*` method that produces an `HttpRequest` and a `parse_*` method
//! that consumes an `HttpResponse`. Task endpoints take the credential as an
//! argument, so nothing authenticates implicitly.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::token::Credential;
use crate::types::{AuthRequest, NewTask, Task, TaskPatch, TokenResponse};

#[derive(Debug, Clone)]
pub struct TasksClient {
    base_url: String,
}

impl TasksClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_login(&self, input: &AuthRequest) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/auth/login", None, input)
    }

    pub fn build_register(&self, input: &AuthRequest) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/auth/register", None, input)
    }

    pub fn build_list_tasks(&self, credential: &Credential) -> HttpRequest {
        self.request(HttpMethod::Get, "/tasks", Some(credential))
    }

    pub fn build_create_task(
        &self,
        credential: &Credential,
        input: &NewTask,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/tasks", Some(credential), input)
    }

    pub fn build_update_task(
        &self,
        credential: &Credential,
        id: i64,
        patch: &TaskPatch,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Patch, &format!("/tasks/{id}"), Some(credential), patch)
    }

    pub fn build_delete_task(&self, credential: &Credential, id: i64) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/tasks/{id}"), Some(credential))
    }

    /// Shared by login and register, which answer with the same body.
    pub fn parse_token(&self, response: HttpResponse) -> Result<Credential, ApiError> {
        let body: TokenResponse = parse_json(response)?;
        Ok(Credential::new(body.access_token))
    }

    pub fn parse_list_tasks(&self, response: HttpResponse) -> Result<Vec<Task>, ApiError> {
        parse_json(response)
    }

    pub fn parse_create_task(&self, response: HttpResponse) -> Result<Task, ApiError> {
        parse_json(response)
    }

    /// The update body is ignored; only the status matters.
    pub fn parse_update_task(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    pub fn parse_delete_task(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    fn request(&self, method: HttpMethod, path: &str, credential: Option<&Credential>) -> HttpRequest {
        let mut headers = Vec::new();
        if let Some(credential) = credential {
            headers.push(("authorization".to_string(), credential.bearer()));
        }
        HttpRequest {
            method,
            url: format!("{}{path}", self.base_url),
            headers,
            body: None,
        }
    }

    fn json_request<T: Serialize>(
        &self,
        method: HttpMethod,
        path: &str,
        credential: Option<&Credential>,
        input: &T,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(input).map_err(|e| ApiError::Serialization(e.to_string()))?;
        let mut req = self.request(method, path, credential);
        req.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        req.body = Some(body);
        Ok(req)
    }
}

/// Map non-2xx status codes to `ApiError::Http`.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::Http {
        status: response.status,
        body: response.body.clone(),
    })
}

fn parse_json<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    check_status(&response)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
}
