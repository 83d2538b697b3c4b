//! Session login state and the account handlers.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Form, Json,
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::{Expiry, Session};

use super::{discard_on_error, AppState, MultipartForm, WebError, WebResult};
use crate::logutil::escape_log;
use crate::metrics;
use crate::storage::UploadKind;

const SESSION_USER_KEY: &str = "username";

const LOGIN_OK_HTML: &str = r#"<div class="alert alert-success"><p>Success!</p></div>"#;
const LOGIN_FAILED_HTML: &str =
    r#"<div class="alert alert-warning"><p>Your username and password do not match...</p></div>"#;

/// Username stored in the session, if anyone is logged in.
pub async fn current_user(session: &Session) -> WebResult<Option<String>> {
    Ok(session.get::<String>(SESSION_USER_KEY).await?)
}

/// Like [current_user] but answers 401 for anonymous requests.
pub async fn require_login(session: &Session) -> WebResult<String> {
    current_user(session).await?.ok_or(WebError::Unauthorized)
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub remember: String,
}

/// Always 200; the body says whether the credentials matched.
pub async fn ajax_login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> WebResult<Json<Value>> {
    let storage = state.storage.lock().await;
    let (user, ok) = storage.verify_user_password(&form.username, &form.password).await?;
    let user = match (user, ok) {
        (Some(u), true) => u,
        _ => {
            metrics::inc_logins_failed();
            warn!(target: "security", "Failed login for {}", escape_log(&form.username));
            return Ok(Json(json!({ "result": LOGIN_FAILED_HTML })));
        }
    };

    session.cycle_id().await?;
    session.insert(SESSION_USER_KEY, &user.username).await?;
    match form.remember.as_str() {
        "false" => session.set_expiry(Some(Expiry::OnSessionEnd)),
        "true" => session.set_expiry(Some(state.remembered_expiry())),
        _ => {}
    }
    storage.record_user_login(&user.username).await?;
    metrics::inc_logins_ok();
    info!("{} logged in", escape_log(&user.username));
    Ok(Json(json!({ "result": LOGIN_OK_HTML })))
}

pub async fn logout(session: Session) -> WebResult<Json<Value>> {
    if let Some(user) = current_user(&session).await? {
        info!("{} logged out", escape_log(&user));
    }
    session.flush().await?;
    Ok(Json(json!({ "result": "logged out" })))
}

/// Multipart so a profile picture can come along with the account details.
pub async fn register(State(state): State<AppState>, multipart: Multipart) -> WebResult<(StatusCode, Json<Value>)> {
    let form = MultipartForm::read(multipart, "picture").await?;
    let password = form.field("password1");
    if password != form.field("password2") {
        return Err(WebError::BadRequest("The two password fields didn't match".to_string()));
    }

    let mut storage = state.storage.lock().await;
    // Store the picture first: a rejected file must not leave an account behind
    let picture = match &form.file {
        Some(file) => Some(storage.store_upload(UploadKind::ProfilePicture, &file.filename, &file.bytes).await?),
        None => None,
    };
    let result = storage.register_user(form.field("username"), form.field("email"), password).await;
    let user = discard_on_error(&storage, picture.clone(), result).await?;
    if picture.is_some() {
        storage.set_profile_picture(&user.username, picture).await?;
    }
    metrics::inc_registrations();
    Ok((StatusCode::CREATED, Json(json!({ "username": user.username }))))
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeForm {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<PasswordChangeForm>,
) -> WebResult<Json<Value>> {
    let username = require_login(&session).await?;
    if form.new_password1 != form.new_password2 {
        return Err(WebError::BadRequest("The two password fields didn't match".to_string()));
    }
    let mut storage = state.storage.lock().await;
    let (_, ok) = storage.verify_user_password(&username, &form.old_password).await?;
    if !ok {
        warn!(target: "security", "Password change with wrong old password for {}", escape_log(&username));
        return Err(WebError::BadRequest("Your old password was entered incorrectly".to_string()));
    }
    storage.update_user_password(&username, &form.new_password1).await?;
    // Keep the user logged in under a fresh session id
    session.cycle_id().await?;
    info!("{} changed password", escape_log(&username));
    Ok(Json(json!({ "result": "password changed" })))
}
