mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use threadboard::web::{build_router, open_storage, AppState};

const BOUNDARY: &str = "threadboard-test-boundary";

async fn app(dir: &std::path::Path) -> Router {
    let config = common::test_config(dir);
    let storage = open_storage(&config).await.unwrap();
    build_router(AppState::new(storage, config))
}

struct Reply {
    status: StatusCode,
    cookie: Option<String>,
    body: Value,
}

async fn send(app: &Router, req: Request<Body>) -> Reply {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Reply { status, cookie, body }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::empty()).unwrap()
}

fn form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn multipart(uri: &str, fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>, cookie: Option<&str>) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n", BOUNDARY, name, value).as_bytes());
    }
    if let Some((name, filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY));
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn register(app: &Router, name: &str) {
    let email = format!("{}@example.com", name);
    let fields = [
        ("username", name),
        ("email", email.as_str()),
        ("password1", common::PASSWORD),
        ("password2", common::PASSWORD),
    ];
    let reply = send(app, multipart("/forum/register/", &fields, None, None)).await;
    assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
}

async fn login(app: &Router, name: &str) -> String {
    let body = format!("username={}&password={}&remember=true", name, common::PASSWORD);
    let reply = send(app, form("/forum/ajax_login/", &body, None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["result"].as_str().unwrap().contains("alert-success"));
    reply.cookie.expect("session cookie")
}

#[tokio::test]
async fn health_and_root_redirect() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    let reply = send(&app, get("/health", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "ok");

    let resp = app.clone().oneshot(get("/", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/forum/");
}

#[tokio::test]
async fn anonymous_writes_need_login() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    let reply = send(&app, multipart("/forum/add-category/", &[("name", "General")], None, None)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "Login required");
    assert_eq!(send(&app, get("/forum/messages/", None)).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(send(&app, get("/forum/users/", None)).await.status, StatusCode::UNAUTHORIZED);

    let reply = send(&app, get("/forum/", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["categories"].as_array().unwrap().is_empty());
    assert!(reply.body["user"].is_null());
}

#[tokio::test]
async fn failed_login_still_answers_200() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    register(&app, "alice").await;
    let reply = send(&app, form("/forum/ajax_login/", "username=alice&password=nope", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["result"].as_str().unwrap().contains("alert-warning"));
    assert!(reply.cookie.is_none());
}

#[tokio::test]
async fn registration_validates_passwords_and_names() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    let fields = [("username", "bob"), ("email", "bob@example.com"), ("password1", "password123"), ("password2", "password124")];
    assert_eq!(send(&app, multipart("/forum/register/", &fields, None, None)).await.status, StatusCode::BAD_REQUEST);

    register(&app, "bob").await;
    let fields = [("username", "bob"), ("email", "b2@example.com"), ("password1", "password123"), ("password2", "password123")];
    assert_eq!(send(&app, multipart("/forum/register/", &fields, None, None)).await.status, StatusCode::CONFLICT);
}

fn uploads_in(dir: &std::path::Path, kind: &str) -> usize {
    std::fs::read_dir(dir.join("media").join(kind)).unwrap().count()
}

#[tokio::test]
async fn rejected_picture_leaves_no_account() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    let fields = [
        ("username", "carol"),
        ("email", "carol@example.com"),
        ("password1", common::PASSWORD),
        ("password2", common::PASSWORD),
    ];
    let reply = send(&app, multipart("/forum/register/", &fields, Some(("picture", "me.svg", &b"<svg/>"[..])), None)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let body = format!("username=carol&password={}", common::PASSWORD);
    let reply = send(&app, form("/forum/ajax_login/", &body, None)).await;
    assert!(reply.body["result"].as_str().unwrap().contains("alert-warning"));

    register(&app, "carol").await;
    login(&app, "carol").await;

    // A good picture attached to a taken username is cleaned up with the failure
    let reply = send(&app, multipart("/forum/register/", &fields, Some(("picture", "me.png", &b"png"[..])), None)).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(uploads_in(tmp.path(), "profile_pics"), 0);
}

#[tokio::test]
async fn posting_flow_with_pagination_and_rollups() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    register(&app, "alice").await;
    let cookie = login(&app, "alice").await;
    let c = Some(cookie.as_str());

    let reply = send(&app, multipart("/forum/add-category/", &[("name", "Rust Talk")], Some(("image", "logo.png", &b"png"[..])), c)).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["slug"], "rust-talk");
    let image = reply.body["image"].as_str().unwrap().to_string();
    assert!(image.starts_with("/media/category_images/"));

    let served = send(&app, get(&image, None)).await;
    assert_eq!(served.status, StatusCode::OK);

    let reply = send(&app, form("/forum/category/rust-talk/add-thread/", "name=Hello+World&text=**first**", c)).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["thread"]["slug"], "hello-world");
    assert!(reply.body["post"]["html"].as_str().unwrap().contains("<strong>first</strong>"));

    for text in ["second", "third"] {
        let reply = send(&app, form("/forum/thread/rust-talk/hello-world/reply/", &format!("text={}", text), c)).await;
        assert_eq!(reply.status, StatusCode::CREATED);
    }

    let reply = send(&app, get("/forum/thread/rust-talk/hello-world/?page=2", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["page"]["number"], 2);
    assert_eq!(reply.body["page"]["total_pages"], 2);
    assert_eq!(reply.body["page"]["items"][0]["text"], "third");
    assert_eq!(reply.body["thread"]["num_posts"], 3);

    let reply = send(&app, get("/forum/thread/rust-talk/hello-world/?page=abc", None)).await;
    assert_eq!(reply.body["page"]["number"], 1);

    let reply = send(&app, get("/forum/", None)).await;
    let category = &reply.body["categories"][0];
    assert_eq!(category["num_threads"], 1);
    assert_eq!(category["num_posts"], 3);
    assert_eq!(category["last_activity"], "1 second ago");

    let reply = send(&app, get("/forum/category/rust-talk/", None)).await;
    assert_eq!(reply.body["page"]["items"][0]["name"], "Hello World");
}

#[tokio::test]
async fn thread_url_must_match_category() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    register(&app, "alice").await;
    let cookie = login(&app, "alice").await;
    let c = Some(cookie.as_str());
    send(&app, multipart("/forum/add-category/", &[("name", "One")], None, c)).await;
    send(&app, multipart("/forum/add-category/", &[("name", "Two")], None, c)).await;
    send(&app, form("/forum/category/one/add-thread/", "name=Topic", c)).await;

    assert_eq!(send(&app, get("/forum/thread/one/topic/", None)).await.status, StatusCode::OK);
    assert_eq!(send(&app, get("/forum/thread/two/topic/", None)).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, get("/forum/thread/one/Not%20A%20Slug/", None)).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, get("/forum/category/three/", None)).await.status, StatusCode::NOT_FOUND);
    let reply = send(&app, form("/forum/thread/two/topic/reply/", "text=hi", c)).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn moderation_permissions() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    register(&app, "alice").await;
    register(&app, "bob").await;
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;

    send(&app, multipart("/forum/add-category/", &[("name", "General")], None, Some(&alice))).await;
    let reply = send(&app, form("/forum/category/general/add-thread/", "name=Mine&text=hello", Some(&alice))).await;
    let post_id = reply.body["post"]["id"].as_str().unwrap().to_string();

    let delete_uri = format!("/forum/post/{}/delete/", post_id);
    assert_eq!(send(&app, form(&delete_uri, "", Some(&bob))).await.status, StatusCode::FORBIDDEN);
    assert_eq!(send(&app, form("/forum/thread/general/mine/edit/", "name=Hijacked", Some(&bob))).await.status, StatusCode::FORBIDDEN);
    assert_eq!(send(&app, form("/forum/thread/general/mine/delete/", "", Some(&alice))).await.status, StatusCode::FORBIDDEN);
    assert_eq!(send(&app, form("/forum/delete/general/", "", Some(&alice))).await.status, StatusCode::FORBIDDEN);
    assert_eq!(
        send(&app, multipart("/forum/edit/general/", &[("name", "Renamed")], None, Some(&alice))).await.status,
        StatusCode::FORBIDDEN
    );

    let reply = send(&app, form("/forum/thread/general/mine/edit/", "name=Still+Mine", Some(&alice))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["slug"], "mine");
    let reply = send(&app, form(&delete_uri, "", Some(&alice))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["thread"], "mine");
}

#[tokio::test]
async fn search_endpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    register(&app, "alice").await;
    let cookie = login(&app, "alice").await;
    send(&app, multipart("/forum/add-category/", &[("name", "Gardening")], None, Some(&cookie))).await;

    let reply = send(&app, form("/forum/search/", "object=category&text=GARD", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["object"], "category");
    assert_eq!(reply.body["results"][0]["slug"], "gardening");

    // Field names sent by the forum's own search bar
    let reply = send(&app, form("/forum/search/", "search_object=category&search_text=Gard", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["object"], "category");
    assert_eq!(reply.body["results"][0]["slug"], "gardening");

    let reply = send(&app, form("/forum/search/", "object=wizard&text=x", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["results"].as_array().unwrap().is_empty());

    let resp = app.clone().oneshot(get("/forum/search/", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn private_messages_over_http() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    register(&app, "alice").await;
    register(&app, "bob").await;
    let alice = login(&app, "alice").await;
    let bob = login(&app, "bob").await;

    let reply = send(&app, form("/forum/messages/bob/", "text=<b>hi</b>+bob", Some(&alice))).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let alice_copy = reply.body["id"].as_str().unwrap().to_string();

    let reply = send(&app, get("/forum/messages/", Some(&bob))).await;
    assert_eq!(reply.body[0]["is_with"], "alice");
    assert_eq!(reply.body[0]["message_count"], 1);

    let reply = send(&app, get("/forum/messages/alice/", Some(&bob))).await;
    assert_eq!(reply.body["page"]["total_items"], 1);
    assert!(reply.body["page"]["items"][0]["html"].as_str().unwrap().contains("<b>hi</b>"));

    let uri = format!("/forum/messages/bob/{}/delete/", alice_copy);
    assert_eq!(send(&app, form(&uri, "", Some(&alice))).await.status, StatusCode::OK);
    let reply = send(&app, get("/forum/messages/alice/", Some(&bob))).await;
    assert_eq!(reply.body["page"]["total_items"], 1);

    assert_eq!(send(&app, form("/forum/messages/alice/", "text=me", Some(&alice))).await.status, StatusCode::BAD_REQUEST);
    assert_eq!(send(&app, get("/forum/messages/nobody/", Some(&alice))).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, form("/forum/messages/bob/delete/", "", Some(&alice))).await.status, StatusCode::OK);
}

#[tokio::test]
async fn profiles_editable_only_by_owner() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    register(&app, "alice").await;
    register(&app, "bob").await;
    let alice = login(&app, "alice").await;

    let reply = send(&app, get("/forum/profile/bob/", Some(&alice))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["role"], "User");
    assert_eq!(send(&app, get("/forum/profile/ghost/", Some(&alice))).await.status, StatusCode::NOT_FOUND);

    let reply = send(&app, multipart("/forum/profile/bob/", &[], Some(("picture", "x.png", &b"png"[..])), Some(&alice))).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = send(&app, multipart("/forum/profile/alice/", &[], Some(("picture", "me.png", &b"png"[..])), Some(&alice))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["picture"].as_str().unwrap().starts_with("/media/profile_pics/"));

    let reply = send(&app, get("/forum/users/", Some(&alice))).await;
    assert_eq!(reply.body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn logout_and_password_change() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    register(&app, "alice").await;
    let cookie = login(&app, "alice").await;

    let wrong = "old_password=nope&new_password1=brandnew123&new_password2=brandnew123";
    assert_eq!(send(&app, form("/accounts/change-password/", wrong, Some(&cookie))).await.status, StatusCode::BAD_REQUEST);
    let right = format!("old_password={}&new_password1=brandnew123&new_password2=brandnew123", common::PASSWORD);
    let reply = send(&app, form("/accounts/change-password/", &right, Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::OK);
    let cookie = reply.cookie.unwrap_or(cookie);

    assert_eq!(send(&app, form("/accounts/logout/", "", Some(&cookie))).await.status, StatusCode::OK);
    assert_eq!(send(&app, get("/forum/messages/", Some(&cookie))).await.status, StatusCode::UNAUTHORIZED);

    let reply = send(&app, form("/forum/ajax_login/", "username=alice&password=brandnew123", None)).await;
    assert!(reply.body["result"].as_str().unwrap().contains("alert-success"));
}

#[tokio::test]
async fn stats_report_totals() {
    let tmp = tempfile::tempdir().unwrap();
    let app = app(tmp.path()).await;
    register(&app, "alice").await;
    let reply = send(&app, get("/forum/stats/", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["forum"]["total_users"], 1);
    assert!(reply.body["process"]["registrations"].as_u64().unwrap() >= 1);
}
