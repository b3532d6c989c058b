use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;

struct Step {
    gate: Option<Arc<Notify>>,
    result: Result<HttpResponse, ApiError>,
}

/// Replays queued responses in order and records every request it sees.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, response: HttpResponse) {
        self.push_step(None, Ok(response));
    }

    pub(crate) fn push_error(&self, error: ApiError) {
        self.push_step(None, Err(error));
    }

    /// Queue a response that is held back until `gate` is notified.
    pub(crate) fn push_gated(&self, gate: Arc<Notify>, response: HttpResponse) {
        self.push_step(Some(gate), Ok(response));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push_step(&self, gate: Option<Arc<Notify>>, result: Result<HttpResponse, ApiError>) {
        self.steps.lock().unwrap().push_back(Step { gate, result });
    }
}

impl Transport for ScriptedTransport {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();
        async move {
            let Some(step) = step else {
                return Err(ApiError::Transport("no scripted response".to_string()));
            };
            if let Some(gate) = step.gate {
                gate.notified().await;
            }
            step.result
        }
    }
}
