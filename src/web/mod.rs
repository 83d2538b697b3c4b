//! # Web Module - HTTP Front End
//!
//! An axum [`Router`] over the shared [`Storage`]. Handlers are grouped by
//! area:
//!
//! - [`forum`] - categories, threads, posts and search
//! - [`auth`] - login, logout, registration and password changes
//! - [`profiles`] - profile pages and the member list
//! - [`messages`] - private conversations
//!
//! Responses are JSON. Logged-in state lives in a `tower-sessions` cookie
//! session holding the username; handlers that need a user answer 401 when
//! there is none.

pub mod auth;
pub mod error;
pub mod forum;
pub mod messages;
pub mod profiles;
pub mod views;

use anyhow::{anyhow, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Request},
    middleware::{self, Next},
    response::{Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use log::{info, warn};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

use crate::config::Config;
use crate::metrics;
use crate::storage::{Storage, StorageResult};
pub use error::{WebError, WebResult};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Mutex<Storage>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(storage: Storage, config: Config) -> Self {
        AppState { storage: Arc::new(Mutex::new(storage)), config: Arc::new(config) }
    }

    /// Expiry applied to sessions that should survive a browser restart.
    pub fn remembered_expiry(&self) -> Expiry {
        Expiry::OnInactivity(time::Duration::minutes(self.config.server.session_inactivity_minutes))
    }
}

/// Open the data directory with the limits and hashing params from `config`.
pub async fn open_storage(config: &Config) -> Result<Storage> {
    let mut storage = Storage::new_with_params(&config.storage.data_dir, config.argon2_params()?).await?;
    storage.set_max_post_bytes(config.storage.max_post_bytes);
    storage.set_max_upload_bytes(config.storage.max_upload_bytes);
    storage.set_min_password_length(config.security.min_password_length);
    Ok(storage)
}

/// Build the complete application router for `state`.
pub fn build_router(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.config.server.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_name("threadboard-session")
        .with_expiry(state.remembered_expiry());

    let media = ServeDir::new(state.config.storage.data_dir.clone() + "/media");
    // Room for one upload plus the other form fields
    let body_limit = state.config.storage.max_upload_bytes + 64 * 1024;

    Router::new()
        .route("/", get(|| async { Redirect::to("/forum/") }))
        .route("/health", get(health))
        .route("/forum/", get(forum::category_list))
        .route("/forum/category/:category/", get(forum::thread_list))
        .route("/forum/category/:category/add-thread/", post(forum::thread_add))
        .route("/forum/thread/:category/:thread/", get(forum::thread_view))
        .route("/forum/thread/:category/:thread/edit/", post(forum::thread_edit))
        .route("/forum/thread/:category/:thread/delete/", post(forum::thread_delete))
        .route("/forum/thread/:category/:thread/reply/", post(forum::post_reply))
        .route("/forum/post/:id/delete/", post(forum::post_delete))
        .route("/forum/add-category/", post(forum::category_add))
        .route("/forum/edit/:category/", post(forum::category_edit))
        .route("/forum/delete/:category/", post(forum::category_delete))
        .route("/forum/search/", post(forum::search_bar))
        .route("/forum/stats/", get(forum::stats))
        .route("/forum/ajax_login/", post(auth::ajax_login))
        .route("/forum/register/", post(auth::register))
        .route("/accounts/logout/", post(auth::logout))
        .route("/accounts/change-password/", post(auth::change_password))
        .route("/forum/profile/:username/", get(profiles::profile).post(profiles::profile_update))
        .route("/forum/users/", get(profiles::profile_list))
        .route("/forum/messages/", get(messages::conversation_list))
        .route("/forum/messages/:username/", get(messages::conversation).post(messages::send))
        .route("/forum/messages/:username/delete/", post(messages::delete_conversation))
        .route("/forum/messages/:username/:pm/delete/", post(messages::delete_pm))
        .nest_service("/media", media)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(track_latency))
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(session_layer),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn track_latency(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(req).await;
    metrics::observe_request_latency(started);
    response
}

/// A file part pulled out of a multipart body.
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Text fields plus at most one file from a multipart form.
#[derive(Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl MultipartForm {
    /// Drain `multipart`, keeping the part named `file_field` as the file.
    /// A file part with no name or no bytes counts as "no file chosen".
    pub async fn read(mut multipart: Multipart, file_field: &str) -> WebResult<Self> {
        let mut form = MultipartForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == file_field {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                if !filename.is_empty() && !bytes.is_empty() {
                    form.file = Some(UploadedFile { filename, bytes: bytes.to_vec() });
                }
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Drop a freshly stored upload when the write it belonged to failed.
pub(crate) async fn discard_on_error<T>(storage: &Storage, upload: Option<String>, result: StorageResult<T>) -> WebResult<T> {
    match result {
        Ok(v) => Ok(v),
        Err(e) => {
            if let Some(path) = upload {
                if let Err(cleanup) = storage.discard_upload(&path).await {
                    warn!("Could not remove orphaned upload {}: {}", path, cleanup);
                }
            }
            Err(e.into())
        }
    }
}

/// HTTP server wrapper
pub struct ForumServer {
    state: AppState,
}

impl ForumServer {
    pub async fn new(config: Config) -> Result<Self> {
        let storage = open_storage(&config).await?;
        Ok(ForumServer { state: AppState::new(storage, config) })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Bind and serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.server.socket_addr()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow!("Failed to bind {}: {}", addr, e))?;
        info!("{} listening on http://{}", self.state.config.forum.name, addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown signal received");
            })
            .await
            .map_err(|e| anyhow!("Server error: {}", e))?;
        Ok(())
    }
}

