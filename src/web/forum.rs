//! Category, thread, post and search handlers.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Form, Json,
};
use chrono::Utc;
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::Session;

use super::auth::{current_user, require_login};
use super::views::{CategoryView, PostView, SearchView, ThreadView};
use super::{discard_on_error, AppState, MultipartForm, WebError, WebResult};
use crate::logutil::{escape_log, preview, DEFAULT_PREVIEW};
use crate::metrics;
use crate::pagination::{Page, PageQuery};
use crate::storage::{SearchKind, Storage, StorageError, Thread, UploadKind};

pub async fn category_list(State(state): State<AppState>, session: Session) -> WebResult<Json<Value>> {
    let user = current_user(&session).await?;
    let now = Utc::now();
    let storage = state.storage.lock().await;
    let categories: Vec<CategoryView> = storage.list_categories().into_iter().map(|c| CategoryView::new(c, now)).collect();
    Ok(Json(json!({
        "forum": state.config.forum.name,
        "description": state.config.forum.description,
        "user": user,
        "categories": categories,
    })))
}

pub async fn thread_list(
    State(state): State<AppState>,
    Path(category_slug): Path<String>,
    Query(page): Query<PageQuery>,
) -> WebResult<Json<Value>> {
    let now = Utc::now();
    let storage = state.storage.lock().await;
    let category = storage
        .get_category(&category_slug)
        .ok_or_else(|| WebError::NotFound("Category not found".to_string()))?;
    let threads = storage.list_threads(&category_slug).await?;
    let page = Page::paginate(threads, page.requested(), state.config.forum.threads_per_page)
        .map(|t| ThreadView::new(t, now));
    Ok(Json(json!({ "category": CategoryView::new(category, now), "page": page })))
}

/// Load a thread and make sure it belongs to the category named in the URL.
async fn thread_in_category(storage: &Storage, category_slug: &str, thread_slug: &str) -> WebResult<Thread> {
    match storage.get_thread(thread_slug).await {
        Ok(Some(thread)) if thread.category == category_slug => Ok(thread),
        Ok(_) | Err(StorageError::Invalid(_)) => Err(WebError::NotFound("Thread not found".to_string())),
        Err(e) => Err(e.into()),
    }
}

pub async fn thread_view(
    State(state): State<AppState>,
    Path((category_slug, thread_slug)): Path<(String, String)>,
    Query(page): Query<PageQuery>,
) -> WebResult<Json<Value>> {
    let now = Utc::now();
    let storage = state.storage.lock().await;
    let thread = thread_in_category(&storage, &category_slug, &thread_slug).await?;
    let category = storage
        .get_category(&category_slug)
        .ok_or_else(|| WebError::NotFound("Category not found".to_string()))?;
    let posts = storage.list_posts(&thread.slug).await?;
    let page = Page::paginate(posts, page.requested(), state.config.forum.posts_per_page).map(|p| PostView::new(p, now));
    Ok(Json(json!({
        "category": CategoryView::new(category, now),
        "thread": ThreadView::new(thread, now),
        "page": page,
    })))
}

pub async fn category_add(
    State(state): State<AppState>,
    session: Session,
    multipart: Multipart,
) -> WebResult<(StatusCode, Json<CategoryView>)> {
    let username = require_login(&session).await?;
    let form = MultipartForm::read(multipart, "image").await?;
    let mut storage = state.storage.lock().await;

    let image = match &form.file {
        Some(file) => Some(storage.store_upload(UploadKind::CategoryImage, &file.filename, &file.bytes).await?),
        None => None,
    };
    let result = storage.create_category(form.field("name"), image.clone()).await;
    let category = discard_on_error(&storage, image, result).await?;
    info!("{} added category {}", escape_log(&username), category.slug);
    Ok((StatusCode::CREATED, Json(CategoryView::new(category, Utc::now()))))
}

pub async fn category_edit(
    State(state): State<AppState>,
    session: Session,
    Path(category_slug): Path<String>,
    multipart: Multipart,
) -> WebResult<Json<CategoryView>> {
    let username = require_login(&session).await?;
    let form = MultipartForm::read(multipart, "image").await?;
    let mut storage = state.storage.lock().await;
    let existing = storage
        .get_category(&category_slug)
        .ok_or_else(|| WebError::NotFound("Category not found".to_string()))?;
    let name = match form.field("name").trim() {
        "" => existing.name.clone(),
        n => n.to_string(),
    };
    let image = match &form.file {
        Some(file) => Some(storage.store_upload(UploadKind::CategoryImage, &file.filename, &file.bytes).await?),
        None => None,
    };
    let result = storage.edit_category(&category_slug, &name, image.clone(), &username).await;
    let category = discard_on_error(&storage, image, result).await?;
    Ok(Json(CategoryView::new(category, Utc::now())))
}

pub async fn category_delete(
    State(state): State<AppState>,
    session: Session,
    Path(category_slug): Path<String>,
) -> WebResult<Json<Value>> {
    let username = require_login(&session).await?;
    let mut storage = state.storage.lock().await;
    storage.delete_category(&category_slug, &username).await?;
    Ok(Json(json!({ "deleted": category_slug })))
}

#[derive(Debug, Deserialize)]
pub struct ThreadForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: Option<String>,
}

pub async fn thread_add(
    State(state): State<AppState>,
    session: Session,
    Path(category_slug): Path<String>,
    Form(form): Form<ThreadForm>,
) -> WebResult<(StatusCode, Json<Value>)> {
    let username = require_login(&session).await?;
    let initial = form.text.as_deref().filter(|t| !t.trim().is_empty());
    let now = Utc::now();
    let mut storage = state.storage.lock().await;
    let (thread, post) = storage.create_thread(&category_slug, &form.name, &username, initial).await?;
    metrics::inc_threads_created();
    if post.is_some() {
        metrics::inc_posts_created();
    }
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "thread": ThreadView::new(thread, now),
            "post": post.map(|p| PostView::new(p, now)),
        })),
    ))
}

pub async fn thread_edit(
    State(state): State<AppState>,
    session: Session,
    Path((category_slug, thread_slug)): Path<(String, String)>,
    Form(form): Form<ThreadForm>,
) -> WebResult<Json<ThreadView>> {
    let username = require_login(&session).await?;
    let mut storage = state.storage.lock().await;
    thread_in_category(&storage, &category_slug, &thread_slug).await?;
    let thread = storage.edit_thread(&thread_slug, &form.name, &username).await?;
    Ok(Json(ThreadView::new(thread, Utc::now())))
}

pub async fn thread_delete(
    State(state): State<AppState>,
    session: Session,
    Path((category_slug, thread_slug)): Path<(String, String)>,
) -> WebResult<Json<Value>> {
    let username = require_login(&session).await?;
    let mut storage = state.storage.lock().await;
    thread_in_category(&storage, &category_slug, &thread_slug).await?;
    storage.delete_thread(&thread_slug, &username).await?;
    Ok(Json(json!({ "deleted": thread_slug })))
}

#[derive(Debug, Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub text: String,
}

pub async fn post_reply(
    State(state): State<AppState>,
    session: Session,
    Path((category_slug, thread_slug)): Path<(String, String)>,
    Form(form): Form<PostForm>,
) -> WebResult<(StatusCode, Json<PostView>)> {
    let username = require_login(&session).await?;
    let mut storage = state.storage.lock().await;
    thread_in_category(&storage, &category_slug, &thread_slug).await?;
    let post = storage.create_post(&thread_slug, &username, &form.text).await?;
    metrics::inc_posts_created();
    info!("{} replied in {}: {}", escape_log(&username), thread_slug, preview(&post.text, DEFAULT_PREVIEW));
    Ok((StatusCode::CREATED, Json(PostView::new(post, Utc::now()))))
}

pub async fn post_delete(
    State(state): State<AppState>,
    session: Session,
    Path(post_id): Path<String>,
) -> WebResult<Json<Value>> {
    let username = require_login(&session).await?;
    let mut storage = state.storage.lock().await;
    let post = storage.delete_post(&post_id, &username).await?;
    Ok(Json(json!({ "deleted": post.id, "thread": post.thread })))
}

#[derive(Debug, Deserialize)]
pub struct SearchForm {
    #[serde(default, alias = "search_object")]
    pub object: String,
    #[serde(default, alias = "search_text")]
    pub text: String,
}

pub async fn search_bar(State(state): State<AppState>, Form(form): Form<SearchForm>) -> WebResult<Json<Value>> {
    metrics::record_search(SearchKind::parse(&form.object));
    let storage = state.storage.lock().await;
    let results = storage.search(&form.object, &form.text, state.config.forum.search_limit).await?;
    Ok(Json(json!({
        "object": form.object,
        "results": SearchView::new(results, Utc::now()),
    })))
}

/// Persistent forum totals plus this process's activity counters.
pub async fn stats(State(state): State<AppState>) -> WebResult<Json<Value>> {
    let storage = state.storage.lock().await;
    let forum = storage.get_statistics().await?;
    Ok(Json(json!({ "forum": forum, "process": metrics::snapshot() })))
}
