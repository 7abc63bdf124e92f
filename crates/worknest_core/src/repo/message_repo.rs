//! Conversation and message repository.
//!
//! # Responsibility
//! - Manage `users/{uid}/conversations` and the per-conversation
//!   `messages` sub-collections.
//!
//! # Invariants
//! - The principal is always a participant of conversations it starts.
//! - Sending a message updates the conversation preview best-effort; a failed
//!   preview update never fails the send.
//! - Reading or unsubscribing never creates a message cache.

use crate::auth::AuthProvider;
use crate::config::RepositoryConfig;
use crate::model::conversation::{Conversation, Message};
use crate::model::{now_epoch_ms, DocumentData, ValidationError};
use crate::repo::error::RepoResult;
use crate::repo::optimistic::OptimisticCollection;
use crate::repo::{current_principal, relative_path, SessionScoped};
use crate::store::DocumentStore;
use log::warn;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const CONVERSATIONS: &str = "conversations";
const PREVIEW_CHARS: usize = 80;

/// Conversations and messages of the signed-in principal.
pub struct MessageRepository {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    config: RepositoryConfig,
    conversations: OptimisticCollection<Conversation>,
    messages: Mutex<HashMap<String, OptimisticCollection<Message>>>,
}

impl MessageRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        config: RepositoryConfig,
    ) -> Self {
        let conversations = OptimisticCollection::new(
            Arc::clone(&store),
            Arc::clone(&auth),
            relative_path(&[CONVERSATIONS]),
            config,
        );
        Self {
            store,
            auth,
            config,
            conversations,
            messages: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a conversation with `participant_uids`; the principal is added.
    pub fn start_conversation(
        &self,
        participant_uids: &[&str],
        title: Option<&str>,
    ) -> RepoResult<Conversation> {
        let principal = current_principal(self.auth.as_ref())?;
        let mut participants = vec![principal.uid.clone()];
        for uid in participant_uids.iter().map(|uid| uid.trim()) {
            if !uid.is_empty() && !participants.iter().any(|known| known == uid) {
                participants.push(uid.to_string());
            }
        }
        if participants.len() < 2 {
            return Err(ValidationError::BlankField {
                entity: "conversation",
                field: "participant_uids",
            }
            .into());
        }
        self.conversations.create(Conversation::new(
            participants,
            title.map(|text| text.trim().to_string()),
        ))
    }

    pub fn delete_conversation(&self, conversation_id: &str) -> RepoResult<()> {
        self.conversations.delete(conversation_id)?;
        let evicted = self.message_caches().remove(conversation_id);
        if let Some(messages) = evicted {
            messages.teardown();
        }
        Ok(())
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.items()
    }

    pub fn subscribe_conversations(&self) -> RepoResult<()> {
        self.conversations.subscribe()
    }

    pub fn refresh_conversations_if_empty(&self) -> RepoResult<bool> {
        self.conversations.refresh_if_empty()
    }

    pub fn conversation_collection(&self) -> &OptimisticCollection<Conversation> {
        &self.conversations
    }

    /// Cache of the messages of one conversation.
    pub fn message_collection(&self, conversation_id: &str) -> OptimisticCollection<Message> {
        self.message_caches()
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                OptimisticCollection::new(
                    Arc::clone(&self.store),
                    Arc::clone(&self.auth),
                    relative_path(&[CONVERSATIONS, conversation_id, "messages"]),
                    self.config,
                )
            })
            .clone()
    }

    /// Sends `text` as the principal, then refreshes the conversation preview.
    pub fn send_message(&self, conversation_id: &str, text: &str) -> RepoResult<Message> {
        let principal = current_principal(self.auth.as_ref())?;
        let message = self
            .message_collection(conversation_id)
            .create(Message::outgoing(principal.uid, text.trim()))?;

        if self.conversations.get(conversation_id).is_some() {
            let mut preview = DocumentData::new();
            preview.insert(
                "last_message".to_string(),
                json!(text.trim().chars().take(PREVIEW_CHARS).collect::<String>()),
            );
            preview.insert("updated_at".to_string(), json!(now_epoch_ms()));
            if let Err(err) = self.conversations.update_fields(conversation_id, preview) {
                warn!(
                    "event=conversation_preview module=repo status=error code={} error={}",
                    err.code(),
                    err
                );
            }
        }
        Ok(message)
    }

    pub fn delete_message(&self, conversation_id: &str, message_id: &str) -> RepoResult<()> {
        self.message_collection(conversation_id).delete(message_id)
    }

    pub fn mark_read(&self, conversation_id: &str, message_id: &str) -> RepoResult<Message> {
        self.message_collection(conversation_id)
            .update_field(message_id, "is_read", json!(true))
    }

    /// Deletes every message of a conversation in one batch.
    pub fn clear_conversation(&self, conversation_id: &str) -> RepoResult<usize> {
        self.message_collection(conversation_id).bulk_delete()
    }

    /// Cached messages; empty when the conversation has no cache yet.
    pub fn messages(&self, conversation_id: &str) -> Vec<Message> {
        let cached = self.message_caches().get(conversation_id).cloned();
        cached.map(|messages| messages.items()).unwrap_or_default()
    }

    pub fn subscribe_messages(&self, conversation_id: &str) -> RepoResult<()> {
        self.message_collection(conversation_id).subscribe()
    }

    pub fn unsubscribe_messages(&self, conversation_id: &str) {
        let cached = self.message_caches().get(conversation_id).cloned();
        if let Some(messages) = cached {
            messages.unsubscribe();
        }
    }

    fn message_caches(&self) -> MutexGuard<'_, HashMap<String, OptimisticCollection<Message>>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionScoped for MessageRepository {
    fn teardown(&self) {
        let caches = self.message_caches().drain().map(|(_, cache)| cache).collect::<Vec<_>>();
        for messages in caches {
            messages.teardown();
        }
        self.conversations.teardown();
    }
}
