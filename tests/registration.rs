mod common;

use threadboard::storage::{Profile, StorageError, UploadKind};

#[tokio::test]
async fn every_user_gets_a_profile() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = common::seeded_storage(tmp.path()).await;
    let profiles = storage.list_profiles().await.unwrap();
    let names: Vec<&str> = profiles.iter().map(|p| p.username.as_str()).collect();
    assert_eq!(names, vec!["admin", "alice", "bob", "mod"]);
    assert!(profiles.iter().all(|p| p.picture.is_none()));
}

#[tokio::test]
async fn invalid_usernames_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut storage = common::fast_storage(tmp.path()).await;
    for bad in ["", "a", "../etc", "has space", "admin", "root"] {
        let res = storage.register_user(bad, "x@example.com", common::PASSWORD).await;
        assert!(matches!(res, Err(StorageError::Invalid(_))), "{:?} accepted", bad);
    }
    assert!(storage.list_all_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn profile_picture_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let mut storage = common::seeded_storage(tmp.path()).await;
    let path = storage.store_upload(UploadKind::ProfilePicture, "C:\\Users\\me\\face.JPG", b"jpeg").await.unwrap();
    assert!(path.starts_with("profile_pics/"));
    assert!(path.ends_with("_face.JPG"));

    let profile = storage.set_profile_picture("alice", Some(path.clone())).await.unwrap();
    assert_eq!(profile, Profile { username: "alice".into(), picture: Some(path) });
    let profile = storage.set_profile_picture("alice", None).await.unwrap();
    assert!(profile.picture.is_none());
    assert!(matches!(storage.get_profile("ghost").await, Err(StorageError::NotFound(_))));
}

#[tokio::test]
async fn login_records_timestamp() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = common::seeded_storage(tmp.path()).await;
    assert!(storage.get_user("bob").await.unwrap().unwrap().last_login.is_none());
    let user = storage.record_user_login("bob").await.unwrap();
    assert!(user.last_login.is_some());
    assert!(storage.get_user("bob").await.unwrap().unwrap().last_login.is_some());
}

#[tokio::test]
async fn level_changes_are_audited() {
    let tmp = tempfile::tempdir().unwrap();
    let mut storage = common::seeded_storage(tmp.path()).await;
    storage.update_user_level("bob", 5, "admin").await.unwrap();
    storage.update_user_level("bob", 1, "admin").await.unwrap();
    let audit = storage.get_admin_audit_page(1, 2).await.unwrap();
    assert_eq!(audit[0].action, "DEMOTE");
    assert_eq!(audit[1].action, "PROMOTE");
    assert_eq!(audit[1].details.as_deref(), Some("Level changed from 1 to 5"));
    assert!(storage.get_admin_audit_page(0, 2).await.unwrap().is_empty());
}

#[tokio::test]
async fn statistics_count_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let mut storage = common::seeded_storage(tmp.path()).await;
    storage.create_thread("general", "One", "alice", Some("a")).await.unwrap();
    storage.create_post("one", "bob", "b").await.unwrap();
    let stats = storage.get_statistics().await.unwrap();
    assert_eq!(stats.total_categories, 1);
    assert_eq!(stats.total_threads, 1);
    assert_eq!(stats.total_posts, 2);
    assert_eq!(stats.total_users, 4);
    assert_eq!(stats.moderator_count, 2);
    assert_eq!(stats.recent_registrations, 4);
}
