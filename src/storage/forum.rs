//! Categories, threads, posts and search.
//!
//! Every write here keeps the rollup fields on [`Category`] and [`Thread`] in
//! step with the posts underneath them. Creation applies increments directly;
//! deletion recomputes from what is left on disk.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::path::Path;
use tokio::fs;

use super::{
    read_json_dir, read_json_file, remove_file_if_exists, write_json_locked, Category, Post, SearchKind, SearchResults,
    Storage, StorageError, StorageResult, Thread, MAX_RECORD_BYTES,
};
use crate::logutil::escape_log;
use crate::roles;
use crate::validation::{
    sanitize_message_content, secure_post_dir, secure_post_path, secure_thread_path, validate_entity_name,
    validate_record_id, validate_slug, MAX_CATEGORY_NAME, MAX_THREAD_NAME, RESERVED_CATEGORY_SLUGS,
    RESERVED_THREAD_SLUGS,
};

impl Storage {
    // ----- categories -------------------------------------------------------

    /// All categories ordered by name (case-insensitive).
    pub fn list_categories(&self) -> Vec<Category> {
        let mut out: Vec<Category> = self.categories.categories.values().cloned().collect();
        out.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        out
    }

    pub fn get_category(&self, slug: &str) -> Option<Category> {
        self.categories.categories.get(slug).cloned()
    }

    fn require_category(&self, slug: &str) -> StorageResult<Category> {
        self.get_category(slug)
            .ok_or_else(|| StorageError::NotFound(format!("Category '{}'", slug)))
    }

    fn category_name_taken(&self, name: &str, except_slug: Option<&str>) -> bool {
        let lower = name.to_lowercase();
        self.categories
            .categories
            .values()
            .any(|c| Some(c.slug.as_str()) != except_slug && c.name.to_lowercase() == lower)
    }

    /// Create an empty category. The slug is derived from the name.
    pub async fn create_category(&mut self, name: &str, image: Option<String>) -> StorageResult<Category> {
        let (name, slug) = validate_entity_name(name, MAX_CATEGORY_NAME, RESERVED_CATEGORY_SLUGS)?;
        if self.categories.categories.contains_key(&slug) || self.category_name_taken(&name, None) {
            return Err(StorageError::AlreadyExists(format!("Category '{}'", name)));
        }
        let category = Category {
            name,
            slug: slug.clone(),
            image,
            most_recent_post: None,
            num_threads: 0,
            num_posts: 0,
            created_at: Utc::now(),
        };
        self.categories.categories.insert(slug, category.clone());
        self.save_categories().await?;
        info!("Created category {}", category.slug);
        Ok(category)
    }

    /// Rename a category and optionally replace its image. The slug never changes.
    pub async fn edit_category(&mut self, slug: &str, name: &str, image: Option<String>, actor: &str) -> StorageResult<Category> {
        let actor_user = self.require_user(actor).await?;
        if !roles::can_moderate(actor_user.user_level) {
            return Err(StorageError::PermissionDenied("Only moderators can edit categories".to_string()));
        }
        let mut category = self.require_category(slug)?;
        let (name, _) = validate_entity_name(name, MAX_CATEGORY_NAME, RESERVED_CATEGORY_SLUGS)?;
        if self.category_name_taken(&name, Some(slug)) {
            return Err(StorageError::AlreadyExists(format!("Category '{}'", name)));
        }
        category.name = name;
        let replaced = match image {
            Some(new_image) => category.image.replace(new_image).filter(|old| Some(old) != category.image.as_ref()),
            None => None,
        };
        self.categories.categories.insert(slug.to_string(), category.clone());
        self.save_categories().await?;
        if let Some(old) = replaced {
            self.discard_stale_upload(&old).await;
        }
        Ok(category)
    }

    /// Delete a category together with all of its threads and their posts.
    pub async fn delete_category(&mut self, slug: &str, actor: &str) -> StorageResult<()> {
        let actor_user = self.require_user(actor).await?;
        if !roles::can_administer(actor_user.user_level) {
            return Err(StorageError::PermissionDenied("Only administrators can delete categories".to_string()));
        }
        let category = self.require_category(slug)?;
        let threads: Vec<Thread> = self.all_threads().await?.into_iter().filter(|t| t.category == slug).collect();
        for thread in &threads {
            self.remove_thread_files(&thread.slug).await?;
        }
        self.categories.categories.remove(slug);
        self.save_categories().await?;

        let details = format!("name='{}' threads={} posts={}", category.name, threads.len(), category.num_posts);
        self.log_admin_action("DELETE_CATEGORY", Some(slug), actor, Some(&details)).await?;
        if let Some(image) = &category.image {
            self.discard_stale_upload(image).await;
        }
        info!("Deleted category {} ({} threads)", slug, threads.len());
        Ok(())
    }

    /// The record no longer points at this upload; a failed removal only warns.
    async fn discard_stale_upload(&self, relative: &str) {
        if let Err(e) = self.discard_upload(relative).await {
            warn!("Could not remove old upload {}: {}", relative, e);
        }
    }

    // ----- threads ----------------------------------------------------------

    pub async fn get_thread(&self, slug: &str) -> StorageResult<Option<Thread>> {
        let path = secure_thread_path(&self.data_dir, slug)?;
        read_json_file(&path, MAX_RECORD_BYTES).await
    }

    async fn require_thread(&self, slug: &str) -> StorageResult<Thread> {
        self.get_thread(slug)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Thread '{}'", slug)))
    }

    async fn save_thread(&self, thread: &Thread) -> StorageResult<()> {
        let path = secure_thread_path(&self.data_dir, &thread.slug)?;
        write_json_locked(&path, thread).await
    }

    /// Every thread in the forum, unordered.
    pub async fn all_threads(&self) -> StorageResult<Vec<Thread>> {
        read_json_dir(&Path::new(&self.data_dir).join("threads"), MAX_RECORD_BYTES).await
    }

    /// Threads of one category, most recently active first.
    pub async fn list_threads(&self, category_slug: &str) -> StorageResult<Vec<Thread>> {
        self.require_category(category_slug)?;
        let mut threads: Vec<Thread> = self
            .all_threads()
            .await?
            .into_iter()
            .filter(|t| t.category == category_slug)
            .collect();
        sort_by_activity(&mut threads);
        Ok(threads)
    }

    /// Open a thread in `category_slug`, optionally with its first post.
    pub async fn create_thread(
        &mut self,
        category_slug: &str,
        name: &str,
        author: &str,
        initial_post: Option<&str>,
    ) -> StorageResult<(Thread, Option<Post>)> {
        let mut category = self.require_category(category_slug)?;
        self.require_user(author).await?;
        let (name, slug) = validate_entity_name(name, MAX_THREAD_NAME, RESERVED_THREAD_SLUGS)?;
        // Check the post body up front so a bad body never leaves an empty thread behind
        let initial_text = match initial_post {
            Some(text) => Some(sanitize_message_content(text, self.max_post_bytes)?),
            None => None,
        };

        let lower = name.to_lowercase();
        if self.get_thread(&slug).await?.is_some()
            || self.all_threads().await?.iter().any(|t| t.name.to_lowercase() == lower)
        {
            return Err(StorageError::AlreadyExists(format!("Thread '{}'", name)));
        }

        let thread = Thread {
            name,
            slug,
            category: category.slug.clone(),
            author: author.to_string(),
            created_date: Utc::now(),
            most_recent_post: None,
            num_posts: 0,
        };
        self.save_thread(&thread).await?;

        category.num_threads = category.num_threads.saturating_add(1);
        self.categories.categories.insert(category.slug.clone(), category);
        self.save_categories().await?;
        info!("{} opened thread {} in {}", escape_log(author), thread.slug, category_slug);

        match initial_text {
            Some(text) => {
                let post = self.create_post(&thread.slug, author, &text).await?;
                let thread = self.require_thread(&thread.slug).await?;
                Ok((thread, Some(post)))
            }
            None => Ok((thread, None)),
        }
    }

    /// Rename a thread. Its slug stays the same so existing links keep working.
    pub async fn edit_thread(&mut self, slug: &str, name: &str, actor: &str) -> StorageResult<Thread> {
        let mut thread = self.require_thread(slug).await?;
        let actor_user = self.require_user(actor).await?;
        if !roles::can_modify(actor, actor_user.user_level, &thread.author) {
            return Err(StorageError::PermissionDenied("Only the author or a moderator can edit this thread".to_string()));
        }
        let (name, _) = validate_entity_name(name, MAX_THREAD_NAME, RESERVED_THREAD_SLUGS)?;
        let lower = name.to_lowercase();
        if self
            .all_threads()
            .await?
            .iter()
            .any(|t| t.slug != thread.slug && t.name.to_lowercase() == lower)
        {
            return Err(StorageError::AlreadyExists(format!("Thread '{}'", name)));
        }
        thread.name = name;
        self.save_thread(&thread).await?;
        Ok(thread)
    }

    /// Delete a thread and its posts, then roll the category back.
    pub async fn delete_thread(&mut self, slug: &str, actor: &str) -> StorageResult<()> {
        let actor_user = self.require_user(actor).await?;
        if !roles::can_moderate(actor_user.user_level) {
            return Err(StorageError::PermissionDenied("Only moderators can delete threads".to_string()));
        }
        let thread = self.require_thread(slug).await?;
        self.remove_thread_files(slug).await?;

        if let Some(mut category) = self.get_category(&thread.category) {
            category.num_threads = category.num_threads.saturating_sub(1);
            category.num_posts = category.num_posts.saturating_sub(thread.num_posts);
            category.most_recent_post = self.latest_post_in_category(&category.slug).await?;
            self.categories.categories.insert(category.slug.clone(), category);
            self.save_categories().await?;
        }

        let details = format!("name='{}' posts={}", thread.name, thread.num_posts);
        self.log_admin_action("DELETE_THREAD", Some(slug), actor, Some(&details)).await?;
        Ok(())
    }

    async fn remove_thread_files(&self, slug: &str) -> StorageResult<()> {
        let post_dir = secure_post_dir(&self.data_dir, slug)?;
        match fs::remove_dir_all(&post_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        remove_file_if_exists(&secure_thread_path(&self.data_dir, slug)?).await?;
        Ok(())
    }

    async fn latest_post_in_category(&self, category_slug: &str) -> StorageResult<Option<DateTime<Utc>>> {
        Ok(self
            .all_threads()
            .await?
            .iter()
            .filter(|t| t.category == category_slug)
            .filter_map(|t| t.most_recent_post)
            .max())
    }

    // ----- posts ------------------------------------------------------------

    /// Add a post to a thread and bump the thread and category rollups.
    pub async fn create_post(&mut self, thread_slug: &str, author: &str, text: &str) -> StorageResult<Post> {
        let mut thread = self.require_thread(thread_slug).await?;
        self.require_user(author).await?;
        let text = sanitize_message_content(text, self.max_post_bytes)?;
        let mut category = self.require_category(&thread.category)?;

        let post = Post::new(&thread.slug, author, text);

        thread.most_recent_post = Some(post.created_date);
        thread.num_posts = thread.num_posts.saturating_add(1);
        category.most_recent_post = Some(post.created_date);
        category.num_posts = category.num_posts.saturating_add(1);

        self.save_thread(&thread).await?;
        self.categories.categories.insert(category.slug.clone(), category);
        self.save_categories().await?;
        let path = secure_post_path(&self.data_dir, &thread.slug, &post.id)?;
        write_json_locked(&path, &post).await?;

        debug!("{} posted {} in {}", escape_log(author), post.id, thread.slug);
        Ok(post)
    }

    /// Posts of a thread, oldest first.
    pub async fn list_posts(&self, thread_slug: &str) -> StorageResult<Vec<Post>> {
        validate_slug(thread_slug)?;
        let dir = secure_post_dir(&self.data_dir, thread_slug)?;
        let mut posts: Vec<Post> = read_json_dir(&dir, MAX_RECORD_BYTES).await?;
        posts.sort_by(|a, b| a.created_date.cmp(&b.created_date).then_with(|| a.id.cmp(&b.id)));
        Ok(posts)
    }

    /// Find a post by id anywhere in the forum.
    pub async fn get_post(&self, id: &str) -> StorageResult<Option<Post>> {
        let id = validate_record_id(id)?;
        for thread in self.all_threads().await? {
            let path = secure_post_path(&self.data_dir, &thread.slug, &id)?;
            if let Some(post) = read_json_file::<Post>(&path, MAX_RECORD_BYTES).await? {
                return Ok(Some(post));
            }
        }
        Ok(None)
    }

    /// Remove a post (author or moderator) and recompute the thread and category rollups.
    pub async fn delete_post(&mut self, id: &str, actor: &str) -> StorageResult<Post> {
        let post = self
            .get_post(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Post '{}'", id)))?;
        let actor_user = self.require_user(actor).await?;
        if !roles::can_modify(actor, actor_user.user_level, &post.author) {
            return Err(StorageError::PermissionDenied("Only the author or a moderator can delete this post".to_string()));
        }

        remove_file_if_exists(&secure_post_path(&self.data_dir, &post.thread, &post.id)?).await?;

        let mut thread = self.require_thread(&post.thread).await?;
        thread.num_posts = thread.num_posts.saturating_sub(1);
        thread.most_recent_post = self.list_posts(&thread.slug).await?.iter().map(|p| p.created_date).max();
        self.save_thread(&thread).await?;

        if let Some(mut category) = self.get_category(&thread.category) {
            category.num_posts = category.num_posts.saturating_sub(1);
            category.most_recent_post = self.latest_post_in_category(&category.slug).await?;
            self.categories.categories.insert(category.slug.clone(), category);
            self.save_categories().await?;
        }

        if actor != post.author {
            let details = format!("thread={} author={}", post.thread, post.author);
            self.log_admin_action("DELETE_POST", Some(&post.id), actor, Some(&details)).await?;
        }
        Ok(post)
    }

    // ----- search -----------------------------------------------------------

    /// Case-insensitive substring search over category names, thread names or
    /// post text. The text is matched as given, whitespace included; empty text
    /// matches everything. `limit` caps the result count; 0 means no cap.
    pub async fn search(&self, kind: &str, text: &str, limit: usize) -> StorageResult<SearchResults> {
        let needle = text.to_lowercase();
        let matches = |haystack: &str| needle.is_empty() || haystack.to_lowercase().contains(&needle);
        let cap = if limit == 0 { usize::MAX } else { limit };

        let results = match SearchKind::parse(kind) {
            Some(SearchKind::Category) => SearchResults::Categories(
                self.list_categories().into_iter().filter(|c| matches(&c.name)).take(cap).collect(),
            ),
            Some(SearchKind::Thread) => {
                let mut threads: Vec<Thread> =
                    self.all_threads().await?.into_iter().filter(|t| matches(&t.name)).collect();
                sort_by_activity(&mut threads);
                threads.truncate(cap);
                SearchResults::Threads(threads)
            }
            Some(SearchKind::Post) => {
                let mut posts = Vec::new();
                for thread in self.all_threads().await? {
                    posts.extend(self.list_posts(&thread.slug).await?.into_iter().filter(|p| matches(&p.text)));
                }
                posts.sort_by(|a, b| b.created_date.cmp(&a.created_date));
                posts.truncate(cap);
                SearchResults::Posts(posts)
            }
            None => SearchResults::Empty,
        };
        Ok(results)
    }
}

fn sort_by_activity(threads: &mut [Thread]) {
    threads.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()).then_with(|| a.slug.cmp(&b.slug)));
}
