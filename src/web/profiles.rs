use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use log::warn;
use tower_sessions::Session;

use super::auth::require_login;
use super::views::ProfileView;
use super::{AppState, MultipartForm, WebError, WebResult};
use crate::storage::UploadKind;

pub async fn profile(
    State(state): State<AppState>,
    session: Session,
    Path(username): Path<String>,
) -> WebResult<Json<ProfileView>> {
    require_login(&session).await?;
    let storage = state.storage.lock().await;
    let user = storage.get_user(&username).await?.ok_or_else(|| WebError::NotFound("User not found".to_string()))?;
    let profile = storage.get_profile(&user.username).await?;
    Ok(Json(ProfileView::new(profile, Some(&user))))
}

/// Only the logged-in user's own profile can be changed. Fields: `picture`
/// (file) replaces the picture, `clear=true` removes it.
pub async fn profile_update(
    State(state): State<AppState>,
    session: Session,
    Path(username): Path<String>,
    multipart: Multipart,
) -> WebResult<Json<ProfileView>> {
    let current = require_login(&session).await?;
    if current != username {
        return Err(WebError::Forbidden("You can only edit your own profile".to_string()));
    }
    let form = MultipartForm::read(multipart, "picture").await?;
    let mut storage = state.storage.lock().await;
    let user = storage.get_user(&current).await?.ok_or_else(|| WebError::NotFound("User not found".to_string()))?;

    let old = storage.get_profile(&current).await?.picture;
    let profile = if let Some(file) = &form.file {
        let path = storage.store_upload(UploadKind::ProfilePicture, &file.filename, &file.bytes).await?;
        storage.set_profile_picture(&current, Some(path)).await?
    } else if form.field("clear") == "true" {
        storage.set_profile_picture(&current, None).await?
    } else {
        storage.get_profile(&current).await?
    };
    if let Some(old) = old.filter(|o| profile.picture.as_ref() != Some(o)) {
        if let Err(e) = storage.discard_upload(&old).await {
            warn!("Could not remove replaced picture {}: {}", old, e);
        }
    }
    Ok(Json(ProfileView::new(profile, Some(&user))))
}

pub async fn profile_list(State(state): State<AppState>, session: Session) -> WebResult<Json<Vec<ProfileView>>> {
    require_login(&session).await?;
    let storage = state.storage.lock().await;
    let users = storage.list_all_users().await?;
    let profiles = storage.list_profiles().await?;
    let views = profiles
        .into_iter()
        .map(|p| {
            let user = users.iter().find(|u| u.username == p.username);
            ProfileView::new(p, user)
        })
        .collect();
    Ok(Json(views))
}
