//! # Storage Module - Data Persistence Layer
//!
//! All forum state lives in JSON files below one data directory. Every write
//! takes an exclusive `fs2` lock on the destination, writes a temp file in the
//! same directory and renames it into place, so a crash never leaves a
//! half-written record behind.
//!
//! ```text
//! data/
//! ├── users/<name>.json                    ← accounts (percent-encoded names)
//! ├── profiles/<name>.json                 ← one profile per account
//! ├── categories.json                      ← slug → Category, with rollups
//! ├── threads/<slug>.json                  ← Thread records, with rollups
//! ├── posts/<thread>/<uuid>.json           ← Post records
//! ├── conversations/<owner>/<other>.json   ← one side of a PM exchange
//! ├── media/{category_images,profile_pics} ← uploaded images
//! └── admin_audit.log                      ← JSON lines, moderation trail
//! ```
//!
//! ## Rollups
//!
//! Categories and threads carry counters and "most recent post" timestamps.
//! They are maintained eagerly by the write operations in [`forum`]: creating
//! a post bumps its thread and category, deleting one recomputes them. The
//! server serializes all writers behind one lock, so the read-modify-write
//! cycles here never interleave.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use threadboard::storage::Storage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut storage = Storage::new("./data").await?;
//!     storage.register_user("alice", "alice@example.com", "correct horse").await?;
//!     storage.create_category("General", None).await?;
//!     let (thread, _) = storage.create_thread("general", "Hello", "alice", Some("First!")).await?;
//!     let posts = storage.list_posts(&thread.slug).await?;
//!     assert_eq!(posts.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod forum;
pub mod messages;
pub mod models;

pub use models::*;

use argon2::{Algorithm, Argon2, Params, Version};
use chrono::Utc;
use fs2::FileExt;
use log::{info, warn};
use password_hash::{PasswordHasher, PasswordVerifier};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::logutil::escape_log;
use crate::roles;
use crate::validation::{
    safe_filename, sanitize_upload_name, secure_json_parse, validate_admin_name, validate_email,
    validate_file_size, validate_user_name, SecurityError, UsernameError,
};

/// Upper bound for any single JSON record read from disk.
pub(crate) const MAX_RECORD_BYTES: usize = 1_000_000;
/// Conversations hold every message of an exchange, so they get more room.
pub(crate) const MAX_CONVERSATION_BYTES: usize = 16_000_000;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Password hash failure: {0}")]
    PasswordHash(String),
}

impl From<SecurityError> for StorageError {
    fn from(e: SecurityError) -> Self {
        StorageError::Invalid(e.to_string())
    }
}

impl From<UsernameError> for StorageError {
    fn from(e: UsernameError) -> Self {
        StorageError::Invalid(format!("Invalid username: {}", e))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Main storage interface
pub struct Storage {
    data_dir: String,
    argon2: Argon2<'static>,
    categories: CategoryIndex,
    max_post_bytes: usize,
    max_upload_bytes: usize,
    min_password_length: usize,
}

impl Storage {
    /// Open (creating if needed) the data directory with default Argon2 parameters.
    pub async fn new(data_dir: &str) -> StorageResult<Self> {
        Self::new_with_params(data_dir, None).await
    }

    /// Open the data directory with explicit Argon2 params.
    pub async fn new_with_params(data_dir: &str, params: Option<Params>) -> StorageResult<Self> {
        fs::create_dir_all(data_dir).await?;
        for sub in ["users", "profiles", "threads", "posts", "conversations", "media"] {
            fs::create_dir_all(Path::new(data_dir).join(sub)).await?;
        }
        for kind in [UploadKind::CategoryImage, UploadKind::ProfilePicture] {
            fs::create_dir_all(Path::new(data_dir).join("media").join(kind.dir_name())).await?;
        }
        let argon2 = match params {
            Some(p) => Argon2::new(Algorithm::Argon2id, Version::V0x13, p),
            None => Argon2::default(),
        };
        let categories = Self::load_categories(data_dir).await?;
        Ok(Storage {
            data_dir: data_dir.to_string(),
            argon2,
            categories,
            max_post_bytes: 20_000,
            max_upload_bytes: 2 * 1024 * 1024,
            min_password_length: 8,
        })
    }

    pub fn set_max_post_bytes(&mut self, max: usize) {
        self.max_post_bytes = max.max(1);
    }

    pub fn set_max_upload_bytes(&mut self, max: usize) {
        self.max_upload_bytes = max;
    }

    pub fn set_min_password_length(&mut self, min: usize) {
        self.min_password_length = min;
    }

    /// Return the base data directory path used by this storage instance
    pub fn base_dir(&self) -> &str {
        &self.data_dir
    }

    /// Directory uploaded images are written to (served under `/media`).
    pub fn media_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("media")
    }

    async fn load_categories(data_dir: &str) -> StorageResult<CategoryIndex> {
        let path = Path::new(data_dir).join("categories.json");
        match fs::read_to_string(&path).await {
            Ok(data) => {
                let cleaned = data.trim_start_matches('\0');
                Ok(serde_json::from_str(cleaned)?)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(CategoryIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn save_categories(&self) -> StorageResult<()> {
        let path = Path::new(&self.data_dir).join("categories.json");
        write_json_locked(&path, &self.categories).await
    }

    fn user_path(&self, username: &str) -> PathBuf {
        Path::new(&self.data_dir).join("users").join(format!("{}.json", safe_filename(username)))
    }

    fn profile_path(&self, username: &str) -> PathBuf {
        Path::new(&self.data_dir).join("profiles").join(format!("{}.json", safe_filename(username)))
    }

    fn hash_password(&self, password: &str) -> StorageResult<String> {
        let salt = password_hash::SaltString::generate(&mut rand::thread_rng());
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| StorageError::PasswordHash(e.to_string()))?;
        Ok(hash.to_string())
    }

    fn check_password_policy(&self, password: &str) -> StorageResult<()> {
        if password.chars().count() < self.min_password_length {
            return Err(StorageError::Invalid(format!(
                "Password too short (minimum {} characters)",
                self.min_password_length
            )));
        }
        if password.len() > 128 {
            return Err(StorageError::Invalid("Password too long".to_string()));
        }
        Ok(())
    }

    /// Register a new account and its profile; fails if the name is taken.
    pub async fn register_user(&mut self, username: &str, email: &str, password: &str) -> StorageResult<User> {
        let username = validate_user_name(username)?;
        self.create_account(&username, email, password, roles::LEVEL_USER).await
    }

    async fn create_account(&mut self, username: &str, email: &str, password: &str, level: u8) -> StorageResult<User> {
        let email = validate_email(email)?;
        self.check_password_policy(password)?;
        if self.user_exists_ci(username).await? {
            return Err(StorageError::AlreadyExists(format!("Username '{}'", username)));
        }

        let user = User {
            username: username.to_string(),
            email,
            user_level: level,
            password_hash: Some(self.hash_password(password)?),
            date_joined: Utc::now(),
            last_login: None,
        };
        write_json_locked(&self.user_path(username), &user).await?;
        write_json_locked(&self.profile_path(username), &Profile::empty(username)).await?;
        info!("Registered user {}", escape_log(username));
        Ok(user)
    }

    /// Case-insensitive existence check so "Alice" cannot shadow "alice".
    async fn user_exists_ci(&self, username: &str) -> StorageResult<bool> {
        if self.user_path(username).exists() {
            return Ok(true);
        }
        let lower = username.to_lowercase();
        Ok(self.list_all_users().await?.iter().any(|u| u.username.to_lowercase() == lower))
    }

    /// Create the administrator account, or promote it if it already exists.
    /// The password is reset either way.
    pub async fn ensure_admin(&mut self, username: &str, email: &str, password: &str) -> StorageResult<User> {
        let username = validate_admin_name(username)?;
        match self.get_user(&username).await? {
            Some(mut user) => {
                self.check_password_policy(password)?;
                user.password_hash = Some(self.hash_password(password)?);
                let old = user.user_level;
                user.user_level = roles::LEVEL_ADMIN;
                write_json_locked(&self.user_path(&username), &user).await?;
                if old != roles::LEVEL_ADMIN {
                    self.log_admin_action("PROMOTE", Some(&username), "system", Some(&format!("Level changed from {} to {}", old, roles::LEVEL_ADMIN))).await?;
                }
                Ok(user)
            }
            None => {
                let user = self.create_account(&username, email, password, roles::LEVEL_ADMIN).await?;
                self.log_admin_action("CREATE_ADMIN", Some(&username), "system", None).await?;
                Ok(user)
            }
        }
    }

    /// Verify a password; returns (user, matched).
    pub async fn verify_user_password(&self, username: &str, password: &str) -> StorageResult<(Option<User>, bool)> {
        if validate_admin_name(username).is_err() {
            return Ok((None, false));
        }
        if let Some(user) = self.get_user(username).await? {
            if let Some(stored) = &user.password_hash {
                let parsed = password_hash::PasswordHash::new(stored)
                    .map_err(|e| StorageError::PasswordHash(format!("Corrupt password hash: {}", e)))?;
                let ok = self.argon2.verify_password(password.as_bytes(), &parsed).is_ok();
                return Ok((Some(user), ok));
            }
            return Ok((Some(user), false));
        }
        Ok((None, false))
    }

    /// Record a successful login (updating last_login) and return the updated user.
    pub async fn record_user_login(&self, username: &str) -> StorageResult<User> {
        let mut user = self.require_user(username).await?;
        user.last_login = Some(Utc::now());
        write_json_locked(&self.user_path(username), &user).await?;
        Ok(user)
    }

    /// Replace a user's password hash.
    pub async fn update_user_password(&mut self, username: &str, new_password: &str) -> StorageResult<()> {
        self.check_password_policy(new_password)?;
        let mut user = self.require_user(username).await?;
        user.password_hash = Some(self.hash_password(new_password)?);
        write_json_locked(&self.user_path(username), &user).await?;
        Ok(())
    }

    /// Change a user's role level; audited.
    pub async fn update_user_level(&mut self, username: &str, new_level: u8, actor: &str) -> StorageResult<User> {
        if new_level == 0 {
            return Err(StorageError::Invalid("Invalid level".to_string()));
        }
        let mut user = self.require_user(username).await?;
        let old_level = user.user_level;
        user.user_level = new_level;
        write_json_locked(&self.user_path(username), &user).await?;

        let action = if new_level > old_level { "PROMOTE" } else { "DEMOTE" };
        let details = format!("Level changed from {} to {}", old_level, new_level);
        self.log_admin_action(action, Some(username), actor, Some(&details)).await?;
        Ok(user)
    }

    /// Get user information
    pub async fn get_user(&self, username: &str) -> StorageResult<Option<User>> {
        read_json_file(&self.user_path(username), 100_000).await
    }

    pub(crate) async fn require_user(&self, username: &str) -> StorageResult<User> {
        self.get_user(username)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("User '{}'", username)))
    }

    /// List all users sorted by username.
    pub async fn list_all_users(&self) -> StorageResult<Vec<User>> {
        let mut users: Vec<User> = read_json_dir(&Path::new(&self.data_dir).join("users"), 100_000).await?;
        users.sort_by(|a, b| a.username.to_lowercase().cmp(&b.username.to_lowercase()));
        Ok(users)
    }

    /// Profile for an existing user. A user without a profile file gets an empty one.
    pub async fn get_profile(&self, username: &str) -> StorageResult<Profile> {
        let user = self.require_user(username).await?;
        Ok(read_json_file(&self.profile_path(&user.username), 100_000)
            .await?
            .unwrap_or_else(|| Profile::empty(&user.username)))
    }

    /// Every user's profile, in username order.
    pub async fn list_profiles(&self) -> StorageResult<Vec<Profile>> {
        let mut out = Vec::new();
        for user in self.list_all_users().await? {
            let profile = read_json_file(&self.profile_path(&user.username), 100_000)
                .await?
                .unwrap_or_else(|| Profile::empty(&user.username));
            out.push(profile);
        }
        Ok(out)
    }

    pub async fn set_profile_picture(&mut self, username: &str, picture: Option<String>) -> StorageResult<Profile> {
        let mut profile = self.get_profile(username).await?;
        profile.picture = picture;
        write_json_locked(&self.profile_path(username), &profile).await?;
        Ok(profile)
    }

    /// Persist an uploaded image and return its path relative to the media directory.
    ///
    /// Names are `<kind>/<unix seconds>_<micros>_<sanitized name>`. A name that
    /// already exists gets a counter after the timestamp, so repeated uploads of
    /// `avatar.png` never overwrite each other.
    pub async fn store_upload(&self, kind: UploadKind, filename: &str, bytes: &[u8]) -> StorageResult<String> {
        if bytes.is_empty() {
            return Err(StorageError::Invalid("Uploaded file is empty".to_string()));
        }
        validate_file_size(bytes.len() as u64, self.max_upload_bytes as u64)?;
        let clean = sanitize_upload_name(filename)?;
        let now = Utc::now();
        let stamp = format!("{}_{:06}", now.timestamp(), now.timestamp_subsec_micros());
        let dir = self.media_dir().join(kind.dir_name());
        let mut counter = 0u32;
        let name = loop {
            let candidate = match counter {
                0 => format!("{}_{}", stamp, clean),
                n => format!("{}_{}_{}", stamp, n, clean),
            };
            match fs::OpenOptions::new().write(true).create_new(true).open(dir.join(&candidate)).await {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    break candidate;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    counter = counter.saturating_add(1);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        };
        let relative = format!("{}/{}", kind.dir_name(), name);
        info!("Stored upload {}", relative);
        Ok(relative)
    }

    /// Remove an upload previously returned by [Storage::store_upload].
    pub async fn discard_upload(&self, relative: &str) -> StorageResult<bool> {
        let mut parts = relative.split('/');
        let valid = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(kind), Some(name), None)
                if (kind == UploadKind::CategoryImage.dir_name() || kind == UploadKind::ProfilePicture.dir_name())
                    && !name.is_empty()
                    && !name.starts_with('.')
        );
        if !valid {
            return Err(StorageError::Invalid(format!("Not an upload path: {}", relative)));
        }
        remove_file_if_exists(&self.media_dir().join(relative)).await
    }

    /// Append an entry to the moderation audit trail
    pub async fn log_admin_action(&self, action: &str, target: Option<&str>, actor: &str, details: Option<&str>) -> StorageResult<()> {
        let path = Path::new(&self.data_dir).join("admin_audit.log");
        let entry = AdminAuditEntry {
            timestamp: Utc::now(),
            action: action.to_string(),
            target: target.map(|t| t.to_string()),
            actor: actor.to_string(),
            details: details.map(|d| d.to_string()),
        };
        let line = serde_json::to_string(&entry)? + "\n";
        append_file_locked(&path, &line).await
    }

    /// Fetch a page of audit entries (newest first). `page` is 1-based.
    pub async fn get_admin_audit_page(&self, page: usize, page_size: usize) -> StorageResult<Vec<AdminAuditEntry>> {
        if page == 0 {
            return Ok(vec![]);
        }
        let path = Path::new(&self.data_dir).join("admin_audit.log");
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let mut entries: Vec<AdminAuditEntry> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        // File order is oldest first
        entries.reverse();
        let start = (page - 1) * page_size;
        Ok(entries.into_iter().skip(start).take(page_size).collect())
    }

    /// Forum-wide totals for the status command and the stats endpoint.
    pub async fn get_statistics(&self) -> StorageResult<ForumStatistics> {
        let seven_days_ago = Utc::now() - chrono::Duration::days(7);
        let users = self.list_all_users().await?;
        let threads = self.all_threads().await?;
        Ok(ForumStatistics {
            total_categories: self.categories.categories.len() as u32,
            total_threads: threads.len() as u32,
            total_posts: threads.iter().map(|t| t.num_posts).sum(),
            total_users: users.len() as u32,
            moderator_count: users.iter().filter(|u| roles::can_moderate(u.user_level)).count() as u32,
            recent_registrations: users.iter().filter(|u| u.date_joined >= seven_days_ago).count() as u32,
        })
    }
}

/// Read and parse one JSON record; `Ok(None)` when the file does not exist.
pub(crate) async fn read_json_file<T: DeserializeOwned>(path: &Path, max_bytes: usize) -> StorageResult<Option<T>> {
    let metadata = match fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    validate_file_size(metadata.len(), max_bytes as u64)?;
    let content = fs::read_to_string(path).await?;
    let value = secure_json_parse(&content, max_bytes)
        .map_err(|e| StorageError::Invalid(format!("Corrupt record {:?}: {}", path, e)))?;
    Ok(Some(value))
}

/// Parse every `*.json` file in `dir`. Unreadable or corrupt files are skipped with a warning.
pub(crate) async fn read_json_dir<T: DeserializeOwned>(dir: &Path, max_bytes: usize) -> StorageResult<Vec<T>> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json_file::<T>(&path, max_bytes).await {
            Ok(Some(v)) => out.push(v),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable record {:?}: {}", path, e),
        }
    }
    Ok(out)
}

/// Serialize `value` and atomically replace `path` while holding an exclusive lock.
pub(crate) async fn write_json_locked<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    write_file_locked(path, &content).await
}

/// Write content to a file with exclusive locking
async fn write_file_locked(path: &Path, content: &str) -> StorageResult<()> {
    use std::fs::{File, OpenOptions};
    use std::io::Write;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    // fs2 has no async API; take the lock on the destination itself
    let lock_file = OpenOptions::new().create(true).truncate(false).read(true).write(true).open(path)?;
    lock_file.lock_exclusive()?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path.file_name().and_then(|s| s.to_str()).unwrap_or("record.json");
    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut tmp) => {
                tmp.write_all(content.as_bytes())?;
                tmp.flush()?;
                let _ = tmp.sync_all();
                break candidate;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    };

    std::fs::rename(&tmp_path, path)?;
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    drop(lock_file);
    Ok(())
}

/// Append to a log file with exclusive locking
async fn append_file_locked(path: &Path, content: &str) -> StorageResult<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    let _ = file.unlock();
    Ok(())
}

/// Remove a file, treating "already gone" as success.
pub(crate) async fn remove_file_if_exists(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
