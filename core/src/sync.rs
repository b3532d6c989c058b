//! Local mirror of the remote task collection.
//!
//! # Design
//! `TaskList` applies a mutation to its cache only after the backend has
//! confirmed it; a failed call leaves the last good state in place and sets
//! a single human-readable error. Operations take `&self`, so several can be
//! in flight at once. The state mutex is never held across an await.
//!
//! Toggle and delete claim their task id for the duration of the remote
//! call. A second toggle or delete on a claimed id is refused with
//! `SyncError::Busy` before anything is sent, which keeps a toggle from
//! inverting a value that is about to change underneath it. Claims are
//! released on drop, so a cancelled future does not wedge the id.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::client::TasksClient;
use crate::error::SyncError;
use crate::session::CredentialSource;
use crate::token::Credential;
use crate::transport::Transport;
use crate::types::{NewTask, Task, TaskPatch};

pub const FETCH_FAILED: &str = "Failed to fetch tasks";
pub const CREATE_FAILED: &str = "Failed to create task";
pub const UPDATE_FAILED: &str = "Failed to update task";
pub const DELETE_FAILED: &str = "Failed to delete task";

/// Input fields of the create form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Default)]
struct ListState {
    tasks: Vec<Task>,
    fetches: usize,
    error: Option<String>,
    draft: Draft,
    pending: HashSet<i64>,
}

impl ListState {
    fn fail(&mut self, message: &str, error: &SyncError) {
        warn!(%error, "{message}");
        self.error = Some(message.to_string());
    }

    /// Keep ids unique: a task already cached is replaced in place.
    fn upsert(&mut self, task: Task) {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }
}

enum ClaimKind {
    Fetch,
    Item(i64),
}

/// Releases a fetch or per-id claim when dropped.
struct Claim<'a> {
    state: &'a Mutex<ListState>,
    kind: ClaimKind,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        match self.kind {
            ClaimKind::Fetch => state.fetches = state.fetches.saturating_sub(1),
            ClaimKind::Item(id) => {
                state.pending.remove(&id);
            }
        }
    }
}

fn lock(state: &Mutex<ListState>) -> MutexGuard<'_, ListState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct TaskList<T, C> {
    client: TasksClient,
    transport: T,
    credentials: C,
    state: Mutex<ListState>,
}

impl<T: Transport, C: CredentialSource> TaskList<T, C> {
    pub fn new(client: TasksClient, transport: T, credentials: C) -> Self {
        Self {
            client,
            transport,
            credentials,
            state: Mutex::new(ListState::default()),
        }
    }

    /// Snapshot of the cache in insertion order.
    pub fn tasks(&self) -> Vec<Task> {
        self.state().tasks.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().fetches > 0
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn clear_error(&self) {
        self.state().error = None;
    }

    pub fn draft(&self) -> Draft {
        self.state().draft.clone()
    }

    pub fn set_draft(&self, title: impl Into<String>, description: impl Into<String>) {
        self.state().draft = Draft {
            title: title.into(),
            description: description.into(),
        };
    }

    /// Replace the cache with the remote collection.
    ///
    /// The loading flag stays set while any fetch is outstanding. On failure
    /// the previous cache is kept.
    pub async fn fetch_all(&self) -> Result<(), SyncError> {
        self.state().fetches += 1;
        let _claim = Claim {
            state: &self.state,
            kind: ClaimKind::Fetch,
        };

        let result = self.fetch_remote().await;

        let mut state = self.state();
        match result {
            Ok(tasks) => {
                let mut seen = HashSet::with_capacity(tasks.len());
                let before = tasks.len();
                state.tasks = tasks.into_iter().filter(|t| seen.insert(t.id)).collect();
                if state.tasks.len() != before {
                    warn!(dropped = before - state.tasks.len(), "server returned duplicate task ids");
                }
                debug!(count = state.tasks.len(), "tasks fetched");
                Ok(())
            }
            Err(e) => {
                state.fail(FETCH_FAILED, &e);
                Err(e)
            }
        }
    }

    /// Create a task and append it to the cache.
    ///
    /// A blank title is refused locally without a remote call. Success also
    /// clears the draft.
    pub async fn create(&self, title: &str, description: &str) -> Result<Task, SyncError> {
        if title.trim().is_empty() {
            return Err(SyncError::EmptyTitle);
        }
        let input = NewTask {
            title: title.to_string(),
            description: description.to_string(),
        };

        let result = self.create_remote(&input).await;

        let mut state = self.state();
        match result {
            Ok(task) => {
                debug!(id = task.id, "task created");
                state.upsert(task.clone());
                state.draft = Draft::default();
                Ok(task)
            }
            Err(e) => {
                state.fail(CREATE_FAILED, &e);
                Err(e)
            }
        }
    }

    pub async fn create_from_draft(&self) -> Result<Task, SyncError> {
        let draft = self.draft();
        self.create(&draft.title, &draft.description).await
    }

    /// Invert `done` for a cached task.
    ///
    /// Returns `Ok(None)` without a remote call when `id` is not cached, and
    /// `Ok(Some(done))` with the confirmed value otherwise.
    pub async fn toggle_done(&self, id: i64) -> Result<Option<bool>, SyncError> {
        let requested = {
            let mut state = self.state();
            let Some(task) = state.tasks.iter().find(|t| t.id == id) else {
                return Ok(None);
            };
            let requested = !task.done;
            if !state.pending.insert(id) {
                return Err(SyncError::Busy(id));
            }
            requested
        };
        let _claim = Claim {
            state: &self.state,
            kind: ClaimKind::Item(id),
        };

        let result = self.update_remote(id, requested).await;

        let mut state = self.state();
        match result {
            Ok(()) => {
                if let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) {
                    task.done = requested;
                }
                Ok(Some(requested))
            }
            Err(e) => {
                state.fail(UPDATE_FAILED, &e);
                Err(e)
            }
        }
    }

    /// Delete a task remotely, then drop it from the cache.
    pub async fn delete(&self, id: i64) -> Result<(), SyncError> {
        if !self.state().pending.insert(id) {
            return Err(SyncError::Busy(id));
        }
        let _claim = Claim {
            state: &self.state,
            kind: ClaimKind::Item(id),
        };

        let result = self.delete_remote(id).await;

        let mut state = self.state();
        match result {
            Ok(()) => {
                state.tasks.retain(|t| t.id != id);
                debug!(id, "task deleted");
                Ok(())
            }
            Err(e) => {
                state.fail(DELETE_FAILED, &e);
                Err(e)
            }
        }
    }

    async fn fetch_remote(&self) -> Result<Vec<Task>, SyncError> {
        let credential = self.credential()?;
        let request = self.client.build_list_tasks(&credential);
        let response = self.transport.execute(request).await?;
        Ok(self.client.parse_list_tasks(response)?)
    }

    async fn create_remote(&self, input: &NewTask) -> Result<Task, SyncError> {
        let credential = self.credential()?;
        let request = self.client.build_create_task(&credential, input)?;
        let response = self.transport.execute(request).await?;
        Ok(self.client.parse_create_task(response)?)
    }

    async fn update_remote(&self, id: i64, done: bool) -> Result<(), SyncError> {
        let credential = self.credential()?;
        let request = self
            .client
            .build_update_task(&credential, id, &TaskPatch { done })?;
        let response = self.transport.execute(request).await?;
        Ok(self.client.parse_update_task(response)?)
    }

    async fn delete_remote(&self, id: i64) -> Result<(), SyncError> {
        let credential = self.credential()?;
        let request = self.client.build_delete_task(&credential, id);
        let response = self.transport.execute(request).await?;
        Ok(self.client.parse_delete_task(response)?)
    }

    fn credential(&self) -> Result<Credential, SyncError> {
        self.credentials
            .credential()
            .ok_or(SyncError::NotAuthenticated)
    }

    fn state(&self) -> MutexGuard<'_, ListState> {
        lock(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Notify;

    use super::*;
    use crate::error::ApiError;
    use crate::http::{HttpMethod, HttpResponse};
    use crate::test_support::ScriptedTransport;

    type List = TaskList<ScriptedTransport, Option<Credential>>;

    fn list() -> List {
        TaskList::new(
            TasksClient::new("http://localhost:3000"),
            ScriptedTransport::new(),
            Some(Credential::new("h.p.s")),
        )
    }

    fn task(id: i64, title: &str, done: bool) -> Task {
        Task {
            id,
            title: title.to_string(),
            description: None,
            done,
        }
    }

    /// Populate the cache through a successful fetch.
    async fn seeded(tasks: &[Task]) -> List {
        let list = list();
        list.transport.push(HttpResponse::new(
            200,
            serde_json::to_string(tasks).unwrap(),
        ));
        list.fetch_all().await.unwrap();
        list
    }

    #[tokio::test]
    async fn fetch_replaces_cache_and_clears_loading() {
        let list = seeded(&[task(1, "A", false), task(2, "B", true)]).await;
        assert_eq!(list.tasks(), vec![task(1, "A", false), task(2, "B", true)]);
        assert!(!list.is_loading());
        assert_eq!(list.error(), None);

        let sent = list.transport.requests();
        assert_eq!(sent[0].method, HttpMethod::Get);
        assert_eq!(sent[0].header("authorization"), Some("Bearer h.p.s"));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_cache() {
        let list = seeded(&[task(1, "A", false)]).await;
        list.transport.push(HttpResponse::new(500, "boom"));

        let err = list.fetch_all().await.unwrap_err();
        assert!(matches!(err, SyncError::Api(ApiError::Http { status: 500, .. })));
        assert_eq!(list.tasks(), vec![task(1, "A", false)]);
        assert_eq!(list.error().as_deref(), Some(FETCH_FAILED));
        assert!(!list.is_loading());
    }

    #[tokio::test]
    async fn transport_failure_on_fetch_sets_error() {
        let list = list();
        list.transport
            .push_error(ApiError::Transport("connection refused".to_string()));
        assert!(list.fetch_all().await.is_err());
        assert!(list.tasks().is_empty());
        assert_eq!(list.error().as_deref(), Some(FETCH_FAILED));
    }

    #[tokio::test]
    async fn fetch_drops_duplicate_ids() {
        let list = seeded(&[task(1, "A", false), task(1, "A again", true)]).await;
        assert_eq!(list.tasks(), vec![task(1, "A", false)]);
    }

    #[tokio::test]
    async fn loading_is_set_while_fetch_is_outstanding() {
        let list = list();
        let gate = Arc::new(Notify::new());
        list.transport
            .push_gated(gate.clone(), HttpResponse::new(200, "[]"));

        let (result, loading_mid_flight) = tokio::join!(list.fetch_all(), async {
            let loading = list.is_loading();
            gate.notify_one();
            loading
        });
        result.unwrap();
        assert!(loading_mid_flight);
        assert!(!list.is_loading());
    }

    #[tokio::test]
    async fn create_with_blank_title_is_refused_locally() {
        let list = seeded(&[task(1, "A", false)]).await;
        for title in ["", "   ", "\t\n"] {
            let err = list.create(title, "desc").await.unwrap_err();
            assert!(matches!(err, SyncError::EmptyTitle));
        }
        assert_eq!(list.transport.requests().len(), 1);
        assert_eq!(list.tasks(), vec![task(1, "A", false)]);
        assert_eq!(list.error(), None);
    }

    #[tokio::test]
    async fn create_appends_server_task_and_clears_draft() {
        let list = seeded(&[task(1, "A", false)]).await;
        list.set_draft("Buy milk", "2% milk");
        list.transport.push(HttpResponse::new(
            201,
            r#"{"id":17,"title":"Buy milk","description":"2% milk","done":false}"#,
        ));

        let created = list.create_from_draft().await.unwrap();

        assert_eq!(created.id, 17);
        let tasks = list.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0], task(1, "A", false));
        assert_eq!(tasks[1], created);
        assert_eq!(tasks[1].description.as_deref(), Some("2% milk"));
        assert_eq!(list.draft(), Draft::default());

        let sent = &list.transport.requests()[1];
        assert_eq!(sent.method, HttpMethod::Post);
        let body: serde_json::Value = serde_json::from_str(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "title": "Buy milk", "description": "2% milk" }));
    }

    #[tokio::test]
    async fn failed_create_keeps_cache_and_draft() {
        let list = seeded(&[]).await;
        list.set_draft("Buy milk", "");
        list.transport.push(HttpResponse::new(400, "bad"));

        assert!(list.create_from_draft().await.is_err());
        assert!(list.tasks().is_empty());
        assert_eq!(list.draft().title, "Buy milk");
        assert_eq!(list.error().as_deref(), Some(CREATE_FAILED));
    }

    #[tokio::test]
    async fn toggle_unknown_id_is_a_no_op() {
        let list = seeded(&[task(1, "A", false)]).await;
        assert_eq!(list.toggle_done(99).await.unwrap(), None);
        assert_eq!(list.transport.requests().len(), 1);
        assert_eq!(list.tasks(), vec![task(1, "A", false)]);
    }

    #[tokio::test]
    async fn toggle_sets_done_and_leaves_others_alone() {
        let list = seeded(&[task(1, "A", false), task(2, "B", false)]).await;
        list.transport.push(HttpResponse::new(200, "{}"));

        assert_eq!(list.toggle_done(1).await.unwrap(), Some(true));
        assert_eq!(list.tasks(), vec![task(1, "A", true), task(2, "B", false)]);

        let sent = &list.transport.requests()[1];
        assert_eq!(sent.method, HttpMethod::Patch);
        assert_eq!(sent.url, "http://localhost:3000/tasks/1");
        assert_eq!(sent.body.as_deref(), Some(r#"{"done":true}"#));
    }

    #[tokio::test]
    async fn toggle_single_item_scenario() {
        let list = seeded(&[task(1, "A", false)]).await;
        list.transport.push(HttpResponse::new(200, ""));
        list.toggle_done(1).await.unwrap();
        assert_eq!(list.tasks(), vec![task(1, "A", true)]);
    }

    #[tokio::test]
    async fn toggle_done_task_sends_false() {
        let list = seeded(&[task(1, "A", true)]).await;
        list.transport.push(HttpResponse::new(200, ""));
        assert_eq!(list.toggle_done(1).await.unwrap(), Some(false));
        assert_eq!(list.transport.requests()[1].body.as_deref(), Some(r#"{"done":false}"#));
        assert!(!list.tasks()[0].done);
    }

    #[tokio::test]
    async fn failed_toggle_keeps_flag() {
        let list = seeded(&[task(1, "A", false)]).await;
        list.transport.push(HttpResponse::new(500, ""));
        assert!(list.toggle_done(1).await.is_err());
        assert_eq!(list.tasks(), vec![task(1, "A", false)]);
        assert_eq!(list.error().as_deref(), Some(UPDATE_FAILED));
    }

    #[tokio::test]
    async fn overlapping_toggle_on_same_id_is_refused() {
        let list = seeded(&[task(1, "A", false)]).await;
        let gate = Arc::new(Notify::new());
        list.transport
            .push_gated(gate.clone(), HttpResponse::new(200, ""));

        let (first, second) = tokio::join!(list.toggle_done(1), async {
            let second = list.toggle_done(1).await;
            gate.notify_one();
            second
        });

        assert_eq!(first.unwrap(), Some(true));
        assert!(matches!(second, Err(SyncError::Busy(1))));
        assert_eq!(list.transport.requests().len(), 2);
        assert_eq!(list.tasks(), vec![task(1, "A", true)]);

        list.transport.push(HttpResponse::new(200, ""));
        assert_eq!(list.toggle_done(1).await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn delete_during_toggle_is_refused() {
        let list = seeded(&[task(1, "A", false)]).await;
        let gate = Arc::new(Notify::new());
        list.transport
            .push_gated(gate.clone(), HttpResponse::new(200, ""));

        let (toggled, deleted) = tokio::join!(list.toggle_done(1), async {
            let deleted = list.delete(1).await;
            gate.notify_one();
            deleted
        });

        toggled.unwrap();
        assert!(matches!(deleted, Err(SyncError::Busy(1))));
        assert_eq!(list.tasks().len(), 1);
    }

    #[tokio::test]
    async fn dropped_toggle_releases_its_claim() {
        let list = seeded(&[task(1, "A", false)]).await;
        let gate = Arc::new(Notify::new());
        list.transport.push_gated(gate, HttpResponse::new(200, ""));

        let pending = tokio::time::timeout(std::time::Duration::from_millis(10), list.toggle_done(1)).await;
        assert!(pending.is_err());

        list.transport.push(HttpResponse::new(200, ""));
        assert_eq!(list.toggle_done(1).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn delete_removes_only_that_id_and_keeps_order() {
        let list = seeded(&[task(1, "A", false), task(2, "B", true), task(3, "C", false)]).await;
        list.transport.push(HttpResponse::new(204, ""));

        list.delete(2).await.unwrap();

        assert_eq!(list.tasks(), vec![task(1, "A", false), task(3, "C", false)]);
        let sent = &list.transport.requests()[1];
        assert_eq!(sent.method, HttpMethod::Delete);
        assert_eq!(sent.url, "http://localhost:3000/tasks/2");
    }

    #[tokio::test]
    async fn failed_delete_keeps_cache() {
        let list = seeded(&[task(1, "A", false)]).await;
        list.transport.push(HttpResponse::new(404, ""));
        assert!(list.delete(1).await.is_err());
        assert_eq!(list.tasks(), vec![task(1, "A", false)]);
        assert_eq!(list.error().as_deref(), Some(DELETE_FAILED));
    }

    #[tokio::test]
    async fn error_persists_until_cleared() {
        let list = seeded(&[task(1, "A", false)]).await;
        list.transport.push(HttpResponse::new(500, ""));
        list.transport.push(HttpResponse::new(200, ""));
        assert!(list.delete(1).await.is_err());
        list.toggle_done(1).await.unwrap();
        assert_eq!(list.error().as_deref(), Some(DELETE_FAILED));

        list.clear_error();
        assert_eq!(list.error(), None);
    }

    #[tokio::test]
    async fn missing_credential_fails_without_request() {
        let list: List = TaskList::new(
            TasksClient::new("http://localhost:3000"),
            ScriptedTransport::new(),
            None,
        );
        let err = list.fetch_all().await.unwrap_err();
        assert!(matches!(err, SyncError::NotAuthenticated));
        assert!(list.transport.requests().is_empty());
        assert_eq!(list.error().as_deref(), Some(FETCH_FAILED));
    }
}
