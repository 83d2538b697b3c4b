//! Records persisted by [`Storage`](super::Storage).
//!
//! Category, Thread and Post carry denormalized rollups (`num_threads`,
//! `num_posts`, `most_recent_post`) that the storage layer keeps in step with
//! the underlying records on every write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::roles;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    #[serde(default = "default_user_level")]
    pub user_level: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub date_joined: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

fn default_user_level() -> u8 {
    roles::LEVEL_USER
}

/// Extra per-user data, one per [`User`], created at registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub username: String,
    /// Path relative to the media directory, e.g. `profile_pics/1700000000_000001_me.png`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl Profile {
    pub fn empty(username: &str) -> Self {
        Profile { username: username.to_string(), picture: None }
    }
}

/// A group of threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub most_recent_post: Option<DateTime<Utc>>,
    #[serde(default)]
    pub num_threads: u32,
    #[serde(default)]
    pub num_posts: u32,
    pub created_at: DateTime<Utc>,
}

/// All categories, persisted together in `categories.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CategoryIndex {
    #[serde(default)]
    pub categories: BTreeMap<String, Category>,
}

/// A collection of posts about one subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub name: String,
    pub slug: String,
    /// Slug of the owning category.
    pub category: String,
    pub author: String,
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub most_recent_post: Option<DateTime<Utc>>,
    #[serde(default)]
    pub num_posts: u32,
}

impl Thread {
    /// Latest post time, or creation time for a thread nobody has posted in yet.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.most_recent_post.unwrap_or(self.created_date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    /// Slug of the owning thread.
    pub thread: String,
    pub author: String,
    pub text: String,
    pub created_date: DateTime<Utc>,
}

impl Post {
    pub fn new(thread: &str, author: &str, text: String) -> Self {
        Post {
            id: Uuid::new_v4().to_string(),
            thread: thread.to_string(),
            author: author.to_string(),
            text,
            created_date: Utc::now(),
        }
    }
}

/// One participant's view of a private exchange with another user.
///
/// Every message lives twice: once in the sender's conversation and once in the
/// recipient's, so either side can delete without affecting the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub belongs_to: String,
    pub is_with: String,
    #[serde(default)]
    pub messages: Vec<Pm>,
}

impl Conversation {
    pub fn new(belongs_to: &str, is_with: &str) -> Self {
        Conversation { belongs_to: belongs_to.to_string(), is_with: is_with.to_string(), messages: Vec::new() }
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.messages.iter().map(|m| m.created_date).max()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pm {
    pub id: String,
    pub author: String,
    pub text: String,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub target: Option<String>,
    pub actor: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumStatistics {
    pub total_categories: u32,
    pub total_threads: u32,
    pub total_posts: u32,
    pub total_users: u32,
    pub moderator_count: u32,
    pub recent_registrations: u32, // joined in the last 7 days
}

/// Which record type a search runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Category,
    Thread,
    Post,
}

impl SearchKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "category" => Some(SearchKind::Category),
            "thread" => Some(SearchKind::Thread),
            "post" => Some(SearchKind::Post),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchKind::Category => "category",
            SearchKind::Thread => "thread",
            SearchKind::Post => "post",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SearchResults {
    Categories(Vec<Category>),
    Threads(Vec<Thread>),
    Posts(Vec<Post>),
    /// Unknown search object: nothing to search, nothing found.
    Empty,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        match self {
            SearchResults::Categories(v) => v.len(),
            SearchResults::Threads(v) => v.len(),
            SearchResults::Posts(v) => v.len(),
            SearchResults::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Media sub-directories uploads are sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    CategoryImage,
    ProfilePicture,
}

impl UploadKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            UploadKind::CategoryImage => "category_images",
            UploadKind::ProfilePicture => "profile_pics",
        }
    }
}
