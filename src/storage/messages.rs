//! Private messages.
//!
//! An exchange between two users is stored as two [`Conversation`] files, one
//! under each participant. Sending appends a separate [`Pm`] copy to both, so
//! deleting a message or a whole conversation only ever touches the caller's
//! side.

use chrono::Utc;
use log::info;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{
    read_json_dir, read_json_file, remove_file_if_exists, write_json_locked, Conversation, Pm, Storage, StorageError,
    StorageResult, MAX_CONVERSATION_BYTES,
};
use crate::logutil::escape_log;
use crate::validation::{safe_filename, sanitize_message_content, validate_record_id};

impl Storage {
    fn conversation_dir(&self, owner: &str) -> PathBuf {
        Path::new(&self.data_dir).join("conversations").join(safe_filename(owner))
    }

    fn conversation_path(&self, owner: &str, other: &str) -> PathBuf {
        self.conversation_dir(owner).join(format!("{}.json", safe_filename(other)))
    }

    async fn load_conversation(&self, owner: &str, other: &str) -> StorageResult<Option<Conversation>> {
        read_json_file(&self.conversation_path(owner, other), MAX_CONVERSATION_BYTES).await
    }

    /// Send `text` from `from` to `to`. Returns the sender's copy.
    pub async fn send_pm(&mut self, from: &str, to: &str, text: &str) -> StorageResult<Pm> {
        if from == to {
            return Err(StorageError::Invalid("You cannot message yourself".to_string()));
        }
        self.require_user(from).await?;
        self.require_user(to).await?;
        let text = sanitize_message_content(text, self.max_post_bytes)?;
        let now = Utc::now();

        let mut outgoing = self.load_conversation(from, to).await?.unwrap_or_else(|| Conversation::new(from, to));
        let mut incoming = self.load_conversation(to, from).await?.unwrap_or_else(|| Conversation::new(to, from));

        let sender_copy = Pm { id: Uuid::new_v4().to_string(), author: from.to_string(), text: text.clone(), created_date: now };
        let recipient_copy = Pm { id: Uuid::new_v4().to_string(), author: from.to_string(), text, created_date: now };
        outgoing.messages.push(sender_copy.clone());
        incoming.messages.push(recipient_copy);

        write_json_locked(&self.conversation_path(from, to), &outgoing).await?;
        write_json_locked(&self.conversation_path(to, from), &incoming).await?;
        info!("PM {} -> {}", escape_log(from), escape_log(to));
        Ok(sender_copy)
    }

    /// The caller's conversations, most recent message first.
    pub async fn list_conversations(&self, user: &str) -> StorageResult<Vec<Conversation>> {
        let mut list: Vec<Conversation> = read_json_dir(&self.conversation_dir(user), MAX_CONVERSATION_BYTES).await?;
        list.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()).then_with(|| a.is_with.cmp(&b.is_with)));
        Ok(list)
    }

    /// The caller's side of the exchange with `other`, messages oldest first.
    pub async fn get_conversation(&self, user: &str, other: &str) -> StorageResult<Option<Conversation>> {
        let mut conversation = self.load_conversation(user, other).await?;
        if let Some(c) = conversation.as_mut() {
            c.messages.sort_by(|a, b| a.created_date.cmp(&b.created_date));
        }
        Ok(conversation)
    }

    /// Remove one message from the caller's side only.
    pub async fn delete_pm(&mut self, user: &str, other: &str, pm_id: &str) -> StorageResult<()> {
        let pm_id = validate_record_id(pm_id)?;
        let mut conversation = self
            .load_conversation(user, other)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Conversation with '{}'", other)))?;
        let before = conversation.messages.len();
        conversation.messages.retain(|m| m.id != pm_id);
        if conversation.messages.len() == before {
            return Err(StorageError::NotFound(format!("Message '{}'", pm_id)));
        }
        write_json_locked(&self.conversation_path(user, other), &conversation).await
    }

    /// Drop the caller's whole side of a conversation.
    pub async fn delete_conversation(&mut self, user: &str, other: &str) -> StorageResult<()> {
        if !remove_file_if_exists(&self.conversation_path(user, other)).await? {
            return Err(StorageError::NotFound(format!("Conversation with '{}'", other)));
        }
        Ok(())
    }
}
