//! # Configuration Management Module
//!
//! Threadboard reads a single TOML file at startup. Every section maps onto a
//! typed struct; optional sections and fields fall back to the defaults below.
//!
//! ## Configuration Structure
//!
//! - [`ForumConfig`] - Forum identity, administrator account, page sizes
//! - [`ServerConfig`] - HTTP bind address and session cookie behaviour
//! - [`StorageConfig`] - Data directory and size limits
//! - [`LoggingConfig`] - Log level and optional log files
//! - [`SecurityConfig`] - Argon2 parameters and password policy
//!
//! ## Configuration File Format
//!
//! ```toml
//! [forum]
//! name = "Threadboard"
//! description = "A place to talk"
//! admin = "admin"
//! threads_per_page = 20
//! posts_per_page = 20
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [storage]
//! data_dir = "./data"
//! max_post_bytes = 20000
//!
//! [logging]
//! level = "info"
//! file = "threadboard.log"
//! ```
//!
//! Default categories are not part of the file: `threadboard init` seeds them into
//! `data/categories.json`.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub forum: ForumConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumConfig {
    pub name: String,
    pub description: String,
    /// Username promoted to admin by `threadboard create-admin`.
    pub admin: String,
    #[serde(default = "default_threads_per_page")]
    pub threads_per_page: usize,
    #[serde(default = "default_posts_per_page")]
    pub posts_per_page: usize,
    #[serde(default = "default_messages_per_page")]
    pub messages_per_page: usize,
    /// Maximum search results returned; 0 means no cap.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_threads_per_page() -> usize {
    20
}

fn default_posts_per_page() -> usize {
    20
}

fn default_messages_per_page() -> usize {
    50
}

fn default_search_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    /// Sessions expire after this many minutes without a request (unless the
    /// user logged in without "remember me", then they end with the browser).
    #[serde(default = "default_session_minutes")]
    pub session_inactivity_minutes: i64,
    /// Mark the session cookie `Secure` (enable behind TLS).
    #[serde(default)]
    pub secure_cookies: bool,
}

fn default_session_minutes() -> i64 {
    60 * 24 * 14
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            session_inactivity_minutes: default_session_minutes(),
            secure_cookies: false,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| anyhow!("Invalid server.bind '{}': {}", self.bind, e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    #[serde(default = "default_max_post_bytes")]
    pub max_post_bytes: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_post_bytes() -> usize {
    20_000
}

fn default_max_upload_bytes() -> usize {
    2 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Argon2Config {
    #[serde(default)]
    pub memory_kib: Option<u32>,
    #[serde(default)]
    pub time_cost: Option<u32>,
    #[serde(default)]
    pub parallelism: Option<u32>,
}

impl Argon2Config {
    /// Build Argon2 params when any field is set; `None` means library defaults.
    pub fn params(&self) -> Result<Option<argon2::Params>> {
        if self.memory_kib.is_none() && self.time_cost.is_none() && self.parallelism.is_none() {
            return Ok(None);
        }
        let params = argon2::Params::new(
            self.memory_kib.unwrap_or(argon2::Params::DEFAULT_M_COST),
            self.time_cost.unwrap_or(argon2::Params::DEFAULT_T_COST),
            self.parallelism.unwrap_or(argon2::Params::DEFAULT_P_COST),
            None,
        )
        .map_err(|e| anyhow!("Invalid argon2 parameters: {}", e))?;
        Ok(Some(params))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub argon2: Option<Argon2Config>,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

fn default_min_password_length() -> usize {
    8
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2: None,
            min_password_length: default_min_password_length(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.forum.threads_per_page == 0 || self.forum.posts_per_page == 0 || self.forum.messages_per_page == 0 {
            return Err(anyhow!("Page sizes must be at least 1"));
        }
        if self.storage.max_post_bytes == 0 {
            return Err(anyhow!("storage.max_post_bytes must be positive"));
        }
        if self.security.min_password_length < 4 {
            return Err(anyhow!("security.min_password_length must be at least 4"));
        }
        crate::validation::validate_admin_name(&self.forum.admin)
            .map_err(|e| anyhow!("Invalid forum.admin: {}", e))?;
        self.server.socket_addr()?;
        if let Some(a) = &self.security.argon2 {
            a.params()?;
        }
        Ok(())
    }

    /// Argon2 params from the security section, if configured.
    pub fn argon2_params(&self) -> Result<Option<argon2::Params>> {
        match &self.security.argon2 {
            Some(a) => a.params(),
            None => Ok(None),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            forum: ForumConfig {
                name: "Threadboard".to_string(),
                description: "A discussion forum".to_string(),
                admin: "admin".to_string(),
                threads_per_page: default_threads_per_page(),
                posts_per_page: default_posts_per_page(),
                messages_per_page: default_messages_per_page(),
                search_limit: default_search_limit(),
            },
            server: ServerConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                max_post_bytes: default_max_post_bytes(),
                max_upload_bytes: default_max_upload_bytes(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("threadboard.log".to_string()),
                security_file: Some("threadboard-security.log".to_string()),
            },
            security: SecurityConfig::default(),
        }
    }
}
