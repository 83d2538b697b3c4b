//! # Threadboard - Discussion Forum
//!
//! Threadboard is a small discussion forum served over HTTP. Categories hold
//! threads, threads hold posts, every user has a profile, and users can swap
//! private messages.
//!
//! ## Features
//!
//! - **Forum Hierarchy**: Category → Thread → Post with post/thread counters and last-activity timestamps kept current on every write.
//! - **Search**: Case-insensitive substring search over category names, thread names or post text.
//! - **Private Messages**: Each participant owns an independent copy of a conversation.
//! - **Safe Rendering**: Markdown to HTML with an allow-list sanitizer in front of every response.
//! - **User Management**: Role levels (User, Moderator, Admin) with an audit trail for moderation.
//! - **Security**: Argon2id password hashing, input sanitization, locked atomic file writes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use threadboard::config::Config;
//! use threadboard::web::ForumServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let server = ForumServer::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`web`] - HTTP routes, sessions and JSON views
//! - [`storage`] - File-backed persistence and the rollup rules
//! - [`config`] - Configuration management and validation
//! - [`validation`] - Input validation and sanitization utilities
//! - [`markup`] - Markdown rendering and HTML sanitizing
//! - [`pagination`], [`humanize`] - Listing helpers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Web Router    │ ← axum handlers, sessions
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Storage       │ ← records, rollups, search
//! │   Layer         │
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   data/ (JSON)  │ ← locked atomic writes
//! └─────────────────┘
//! ```

pub mod config;
pub mod humanize;
pub mod logutil;
pub mod markup;
pub mod metrics;
pub mod pagination;
pub mod roles;
pub mod storage;
pub mod validation;
pub mod web;
