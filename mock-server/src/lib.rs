use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

/// Signing secret used when none is configured.
pub const DEFAULT_SECRET: &[u8] = b"mock-server-dev-secret";

const TOKEN_TTL_SECS: i64 = 60 * 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub done: bool,
}

#[derive(Deserialize)]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

#[derive(Deserialize)]
pub struct CreateTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub done: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Passwords are kept in plain text; this server is a test double.
struct User {
    id: i64,
    email: String,
    password: String,
}

struct StoredTask {
    owner: i64,
    task: Task,
}

#[derive(Default)]
pub struct Store {
    users: Vec<User>,
    /// Keyed by id; ids only grow, so iteration order is insertion order.
    tasks: BTreeMap<i64, StoredTask>,
    last_user_id: i64,
    last_task_id: i64,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

#[derive(Clone)]
pub struct AppState {
    db: Arc<RwLock<Store>>,
    keys: Arc<Keys>,
}

impl AppState {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            db: Arc::new(RwLock::new(Store::default())),
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing or invalid bearer token")]
    Unauthorized,
    #[error("task not found")]
    NotFound,
    #[error("email already registered")]
    EmailTaken,
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::EmailTaken => StatusCode::CONFLICT,
            ApiError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "message": self.to_string() }))).into_response()
    }
}

/// The user id carried by a valid bearer token.
pub struct AuthUser(pub i64);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;
        let data = decode::<Claims>(token, &state.keys.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                debug!(error = %e, "rejected bearer token");
                ApiError::Unauthorized
            })?;
        Ok(AuthUser(data.claims.sub))
    }
}

pub fn app() -> Router {
    app_with_secret(DEFAULT_SECRET)
}

pub fn app_with_secret(secret: &[u8]) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", patch(update_task).delete(delete_task))
        .with_state(AppState::new(secret))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_secret(listener: TcpListener, secret: &[u8]) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_secret(secret)).await
}

fn issue_token(keys: &Keys, user: &User) -> Result<TokenResponse, ApiError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        iat: now,
        exp: now + TOKEN_TTL_SECS,
    };
    let access_token = encode(&Header::default(), &claims, &keys.encoding)?;
    Ok(TokenResponse { access_token })
}

async fn register(
    State(state): State<AppState>,
    Json(input): Json<AuthRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let email = input.email.trim();
    if email.is_empty() || input.password.is_empty() {
        return Err(ApiError::BadRequest("email and password are required"));
    }

    let mut db = state.db.write().await;
    if db.users.iter().any(|u| u.email.eq_ignore_ascii_case(email)) {
        return Err(ApiError::EmailTaken);
    }
    db.last_user_id += 1;
    let user = User {
        id: db.last_user_id,
        email: email.to_string(),
        password: input.password,
    };
    let token = issue_token(&state.keys, &user)?;
    info!(user_id = user.id, email = %user.email, "registered");
    db.users.push(user);
    Ok((StatusCode::CREATED, Json(token)))
}

async fn login(
    State(state): State<AppState>,
    Json(input): Json<AuthRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let db = state.db.read().await;
    let user = db
        .users
        .iter()
        .find(|u| u.email.eq_ignore_ascii_case(input.email.trim()) && u.password == input.password)
        .ok_or(ApiError::InvalidCredentials)?;
    info!(user_id = user.id, "logged in");
    Ok(Json(issue_token(&state.keys, user)?))
}

async fn list_tasks(AuthUser(user_id): AuthUser, State(state): State<AppState>) -> Json<Vec<Task>> {
    let db = state.db.read().await;
    Json(
        db.tasks
            .values()
            .filter(|stored| stored.owner == user_id)
            .map(|stored| stored.task.clone())
            .collect(),
    )
}

async fn create_task(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    if input.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty"));
    }

    let mut db = state.db.write().await;
    db.last_task_id += 1;
    let task = Task {
        id: db.last_task_id,
        title: input.title,
        description: non_blank(input.description),
        done: false,
    };
    db.tasks.insert(
        task.id,
        StoredTask {
            owner: user_id,
            task: task.clone(),
        },
    );
    debug!(user_id, task_id = task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateTask>,
) -> Result<Json<Task>, ApiError> {
    let mut db = state.db.write().await;
    let stored = db
        .tasks
        .get_mut(&id)
        .filter(|stored| stored.owner == user_id)
        .ok_or(ApiError::NotFound)?;
    if let Some(title) = input.title {
        stored.task.title = title;
    }
    if input.description.is_some() {
        stored.task.description = non_blank(input.description);
    }
    if let Some(done) = input.done {
        stored.task.done = done;
    }
    Ok(Json(stored.task.clone()))
}

/// A blank description is stored as `null`.
fn non_blank(description: Option<String>) -> Option<String> {
    description.filter(|d| !d.trim().is_empty())
}

async fn delete_task(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let mut db = state.db.write().await;
    let owned = db.tasks.get(&id).is_some_and(|stored| stored.owner == user_id);
    if !owned {
        return Err(ApiError::NotFound);
    }
    db.tasks.remove(&id);
    debug!(user_id, task_id = id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}
