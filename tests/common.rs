//! Test utilities & fixtures.
//! Every helper works in a fresh temp dir and uses cheap Argon2 params so
//! registrations don't dominate test time.

use argon2::Params;
use std::path::Path;
use threadboard::config::{Argon2Config, Config};
use threadboard::storage::Storage;

#[allow(dead_code)]
pub const PASSWORD: &str = "password123";

/// Storage over `dir` with a 1 MiB / 1 pass Argon2 setting.
#[allow(dead_code)]
pub async fn fast_storage(dir: &Path) -> Storage {
    let params = Params::new(1024, 1, 1, None).unwrap();
    Storage::new_with_params(dir.to_str().unwrap(), Some(params)).await.unwrap()
}

/// Storage with users alice, bob (users), mod (moderator) and admin, plus a "General" category.
#[allow(dead_code)]
pub async fn seeded_storage(dir: &Path) -> Storage {
    let mut storage = fast_storage(dir).await;
    for name in ["alice", "bob", "mod"] {
        storage.register_user(name, &format!("{}@example.com", name), PASSWORD).await.unwrap();
    }
    storage.update_user_level("mod", 5, "test").await.unwrap();
    storage.ensure_admin("admin", "admin@example.com", PASSWORD).await.unwrap();
    storage.create_category("General", None).await.unwrap();
    storage
}

/// Default config pointed at `dir`, logging off, cheap hashing.
#[allow(dead_code)]
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.to_str().unwrap().to_string();
    config.logging.level = "error".into();
    config.logging.file = None;
    config.logging.security_file = None;
    config.forum.posts_per_page = 2;
    config.security.argon2 = Some(Argon2Config { memory_kib: Some(1024), time_cost: Some(1), parallelism: Some(1) });
    config
}
