mod common;

use threadboard::storage::StorageError;

#[tokio::test]
async fn send_creates_both_sides() {
    let tmp = tempfile::tempdir().unwrap();
    let mut storage = common::seeded_storage(tmp.path()).await;
    storage.send_pm("alice", "bob", "hello").await.unwrap();
    storage.send_pm("bob", "alice", "hi back").await.unwrap();

    let alice = storage.get_conversation("alice", "bob").await.unwrap().unwrap();
    let bob = storage.get_conversation("bob", "alice").await.unwrap().unwrap();
    assert_eq!(alice.belongs_to, "alice");
    assert_eq!(alice.is_with, "bob");
    assert_eq!(bob.belongs_to, "bob");
    let texts: Vec<&str> = alice.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["hello", "hi back"]);
    assert_eq!(bob.messages.len(), 2);
    for (a, b) in alice.messages.iter().zip(bob.messages.iter()) {
        assert_ne!(a.id, b.id);
        assert_eq!(a.author, b.author);
    }
}

#[tokio::test]
async fn deleting_a_conversation_leaves_the_other_side() {
    let tmp = tempfile::tempdir().unwrap();
    let mut storage = common::seeded_storage(tmp.path()).await;
    storage.send_pm("alice", "bob", "secret").await.unwrap();
    storage.delete_conversation("bob", "alice").await.unwrap();

    assert!(storage.get_conversation("bob", "alice").await.unwrap().is_none());
    assert_eq!(storage.get_conversation("alice", "bob").await.unwrap().unwrap().messages.len(), 1);
    assert!(matches!(
        storage.delete_conversation("bob", "alice").await,
        Err(StorageError::NotFound(_))
    ));

    // A new message recreates bob's side with just that message
    storage.send_pm("alice", "bob", "again").await.unwrap();
    let bob = storage.get_conversation("bob", "alice").await.unwrap().unwrap();
    assert_eq!(bob.messages.len(), 1);
    assert_eq!(storage.get_conversation("alice", "bob").await.unwrap().unwrap().messages.len(), 2);
}

#[tokio::test]
async fn inbox_sorted_by_latest_message() {
    let tmp = tempfile::tempdir().unwrap();
    let mut storage = common::seeded_storage(tmp.path()).await;
    storage.send_pm("alice", "bob", "one").await.unwrap();
    storage.send_pm("alice", "mod", "two").await.unwrap();
    let order: Vec<String> = storage.list_conversations("alice").await.unwrap().into_iter().map(|c| c.is_with).collect();
    assert_eq!(order, vec!["mod", "bob"]);

    storage.send_pm("bob", "alice", "three").await.unwrap();
    let order: Vec<String> = storage.list_conversations("alice").await.unwrap().into_iter().map(|c| c.is_with).collect();
    assert_eq!(order, vec!["bob", "mod"]);
    assert!(storage.list_conversations("admin").await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_messages_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut storage = common::seeded_storage(tmp.path()).await;
    assert!(matches!(storage.send_pm("alice", "bob", "  \n ").await, Err(StorageError::Invalid(_))));
    assert!(matches!(storage.send_pm("alice", "ghost", "boo").await, Err(StorageError::NotFound(_))));
    assert!(matches!(
        storage.delete_pm("alice", "bob", "not-a-uuid").await,
        Err(StorageError::Invalid(_))
    ));
    assert!(storage.get_conversation("alice", "bob").await.unwrap().is_none());
}
