use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Form, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::Session;

use super::auth::require_login;
use super::views::{ConversationSummary, PmView};
use super::{AppState, WebError, WebResult};
use crate::metrics;
use crate::pagination::{Page, PageQuery};

/// Inbox: one row per conversation, most recent first.
pub async fn conversation_list(State(state): State<AppState>, session: Session) -> WebResult<Json<Vec<ConversationSummary>>> {
    let user = require_login(&session).await?;
    let now = Utc::now();
    let storage = state.storage.lock().await;
    let list = storage.list_conversations(&user).await?;
    Ok(Json(list.iter().map(|c| ConversationSummary::new(c, now)).collect()))
}

/// The caller's side of a conversation, paginated oldest first.
pub async fn conversation(
    State(state): State<AppState>,
    session: Session,
    Path(other): Path<String>,
    Query(page): Query<PageQuery>,
) -> WebResult<Json<Value>> {
    let user = require_login(&session).await?;
    let now = Utc::now();
    let storage = state.storage.lock().await;
    if storage.get_user(&other).await?.is_none() {
        return Err(WebError::NotFound("User not found".to_string()));
    }
    let messages = storage.get_conversation(&user, &other).await?.map(|c| c.messages).unwrap_or_default();
    let page = Page::paginate(messages, page.requested(), state.config.forum.messages_per_page).map(|m| PmView::new(m, now));
    Ok(Json(json!({ "is_with": other, "page": page })))
}

#[derive(Debug, Deserialize)]
pub struct PmForm {
    #[serde(default)]
    pub text: String,
}

pub async fn send(
    State(state): State<AppState>,
    session: Session,
    Path(other): Path<String>,
    Form(form): Form<PmForm>,
) -> WebResult<(StatusCode, Json<PmView>)> {
    let user = require_login(&session).await?;
    let mut storage = state.storage.lock().await;
    let pm = storage.send_pm(&user, &other, &form.text).await?;
    metrics::inc_pms_sent();
    Ok((StatusCode::CREATED, Json(PmView::new(pm, Utc::now()))))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    session: Session,
    Path(other): Path<String>,
) -> WebResult<Json<Value>> {
    let user = require_login(&session).await?;
    let mut storage = state.storage.lock().await;
    storage.delete_conversation(&user, &other).await?;
    Ok(Json(json!({ "deleted": other })))
}

pub async fn delete_pm(
    State(state): State<AppState>,
    session: Session,
    Path((other, pm_id)): Path<(String, String)>,
) -> WebResult<Json<Value>> {
    let user = require_login(&session).await?;
    let mut storage = state.storage.lock().await;
    storage.delete_pm(&user, &other, &pm_id).await?;
    Ok(Json(json!({ "deleted": pm_id })))
}
