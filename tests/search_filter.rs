mod common;

use threadboard::storage::SearchResults;

async fn forum(dir: &std::path::Path) -> threadboard::storage::Storage {
    let mut storage = common::seeded_storage(dir).await;
    storage.create_category("Rust Language", None).await.unwrap();
    storage.create_category("Gardening", None).await.unwrap();
    storage.create_thread("rust-language", "Borrow checker woes", "alice", Some("The borrow checker hates me")).await.unwrap();
    storage.create_thread("gardening", "Tomatoes", "bob", Some("My tomatoes are RUSTY")).await.unwrap();
    storage.create_post("borrow-checker-woes", "bob", "Use Rc<RefCell<T>> sparingly").await.unwrap();
    storage
}

#[tokio::test]
async fn category_search_is_case_insensitive() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = forum(tmp.path()).await;
    match storage.search("category", "rust", 0).await.unwrap() {
        SearchResults::Categories(found) => {
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].slug, "rust-language");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn thread_search_matches_names_only() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = forum(tmp.path()).await;
    match storage.search("thread", "CHECKER", 0).await.unwrap() {
        SearchResults::Threads(found) => {
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].slug, "borrow-checker-woes");
        }
        other => panic!("unexpected {:?}", other),
    }
    // "rusty" appears in post text, not in any thread name
    assert!(storage.search("thread", "rusty", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn post_search_newest_first() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = forum(tmp.path()).await;
    match storage.search("post", "rust", 0).await.unwrap() {
        SearchResults::Posts(found) => {
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].thread, "tomatoes");
        }
        other => panic!("unexpected {:?}", other),
    }
    match storage.search("post", "", 0).await.unwrap() {
        SearchResults::Posts(found) => {
            assert_eq!(found.len(), 3);
            assert!(found.windows(2).all(|w| w[0].created_date >= w[1].created_date));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn limit_caps_results() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = forum(tmp.path()).await;
    assert_eq!(storage.search("category", "", 0).await.unwrap().len(), 3);
    assert_eq!(storage.search("category", "", 2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_kind_finds_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = forum(tmp.path()).await;
    let res = storage.search("profile", "alice", 0).await.unwrap();
    assert!(matches!(res, SearchResults::Empty));
    assert!(res.is_empty());
}

#[tokio::test]
async fn whitespace_is_part_of_the_needle() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = forum(tmp.path()).await;
    match storage.search("category", " ", 0).await.unwrap() {
        SearchResults::Categories(found) => {
            let slugs: Vec<&str> = found.iter().map(|c| c.slug.as_str()).collect();
            assert_eq!(slugs, vec!["rust-language"]);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(storage.search("thread", "tomatoes ", 0).await.unwrap().is_empty());
}
