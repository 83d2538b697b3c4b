//! JSON shapes returned by the handlers.
//!
//! Stored records are never serialized directly: post and pm bodies are
//! rendered to sanitized HTML here, media paths become `/media/...` URLs and
//! timestamps gain a humanized `last_activity`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::humanize::time_since;
use crate::markup::render_markdown;
use crate::storage::{Category, Conversation, Pm, Post, Profile, SearchResults, Thread, User};

fn media_url(path: &Option<String>) -> Option<String> {
    path.as_ref().map(|p| format!("/media/{}", p))
}

#[derive(Debug, Serialize)]
pub struct CategoryView {
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub num_threads: u32,
    pub num_posts: u32,
    pub most_recent_post: Option<DateTime<Utc>>,
    pub last_activity: String,
}

impl CategoryView {
    pub fn new(c: Category, now: DateTime<Utc>) -> Self {
        CategoryView {
            image: media_url(&c.image),
            last_activity: time_since(c.most_recent_post, now),
            name: c.name,
            slug: c.slug,
            num_threads: c.num_threads,
            num_posts: c.num_posts,
            most_recent_post: c.most_recent_post,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ThreadView {
    pub name: String,
    pub slug: String,
    pub category: String,
    pub author: String,
    pub created_date: DateTime<Utc>,
    pub num_posts: u32,
    pub most_recent_post: Option<DateTime<Utc>>,
    pub last_activity: String,
}

impl ThreadView {
    pub fn new(t: Thread, now: DateTime<Utc>) -> Self {
        ThreadView {
            last_activity: time_since(t.most_recent_post, now),
            name: t.name,
            slug: t.slug,
            category: t.category,
            author: t.author,
            created_date: t.created_date,
            num_posts: t.num_posts,
            most_recent_post: t.most_recent_post,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PostView {
    pub id: String,
    pub thread: String,
    pub author: String,
    pub text: String,
    pub html: String,
    pub created_date: DateTime<Utc>,
    pub age: String,
}

impl PostView {
    pub fn new(p: Post, now: DateTime<Utc>) -> Self {
        PostView {
            html: render_markdown(&p.text),
            age: time_since(Some(p.created_date), now),
            id: p.id,
            thread: p.thread,
            author: p.author,
            text: p.text,
            created_date: p.created_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PmView {
    pub id: String,
    pub author: String,
    pub html: String,
    pub created_date: DateTime<Utc>,
    pub age: String,
}

impl PmView {
    pub fn new(m: Pm, now: DateTime<Utc>) -> Self {
        PmView {
            html: render_markdown(&m.text),
            age: time_since(Some(m.created_date), now),
            id: m.id,
            author: m.author,
            created_date: m.created_date,
        }
    }
}

/// One row of the inbox.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub is_with: String,
    pub message_count: usize,
    pub last_message: Option<DateTime<Utc>>,
    pub last_activity: String,
}

impl ConversationSummary {
    pub fn new(c: &Conversation, now: DateTime<Utc>) -> Self {
        let last = c.last_activity();
        ConversationSummary {
            is_with: c.is_with.clone(),
            message_count: c.messages.len(),
            last_message: last,
            last_activity: time_since(last, now),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub username: String,
    pub picture: Option<String>,
    pub role: &'static str,
    pub date_joined: Option<DateTime<Utc>>,
}

impl ProfileView {
    pub fn new(profile: Profile, user: Option<&User>) -> Self {
        ProfileView {
            picture: media_url(&profile.picture),
            username: profile.username,
            role: user.map(|u| crate::roles::role_name(u.user_level)).unwrap_or("User"),
            date_joined: user.map(|u| u.date_joined),
        }
    }
}

/// Search results tagged by kind; `Empty` serializes as an empty list.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SearchView {
    Categories(Vec<CategoryView>),
    Threads(Vec<ThreadView>),
    Posts(Vec<PostView>),
}

impl SearchView {
    pub fn new(results: SearchResults, now: DateTime<Utc>) -> Self {
        match results {
            SearchResults::Categories(v) => SearchView::Categories(v.into_iter().map(|c| CategoryView::new(c, now)).collect()),
            SearchResults::Threads(v) => SearchView::Threads(v.into_iter().map(|t| ThreadView::new(t, now)).collect()),
            SearchResults::Posts(v) => SearchView::Posts(v.into_iter().map(|p| PostView::new(p, now)).collect()),
            SearchResults::Empty => SearchView::Categories(Vec::new()),
        }
    }
}
