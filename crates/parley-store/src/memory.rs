//! In-memory conversation store and user directory.
//!
//! Conversations live in a map keyed by conversation id, with a second
//! index from the normalized pair key to the id. Find-or-create resolves
//! concurrent duplicates through the pair-index entry, which is the
//! atomicity contract the engine requires of its storage collaborator.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parley_core::{
    AuthError, Authenticator, ConversationStore, ConversationView, MessageDraft, PairKey,
    StoreError, UserDirectory,
};
use parley_protocol::{ChatMessage, ConversationId, MessageId, PublicProfile, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// A stored conversation document.
#[derive(Debug, Clone)]
struct StoredConversation {
    id: ConversationId,
    participants: (UserId, UserId),
    messages: Vec<ChatMessage>,
    updated_at: u64,
}

impl StoredConversation {
    fn view(&self) -> ConversationView {
        ConversationView {
            id: self.id.clone(),
            participants: self.participants.clone(),
            messages: self.messages.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// In-memory conversation store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Pair index: normalized pair -> conversation id.
    pairs: DashMap<PairKey, ConversationId>,
    /// Conversation documents by id.
    conversations: DashMap<ConversationId, StoredConversation>,
    /// Conversation id sequence.
    next_conversation: AtomicU64,
    /// Message id sequence.
    next_message: AtomicU64,
    /// Logical clock; strictly increasing even within one millisecond.
    clock: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations held.
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Strictly-increasing timestamp in epoch milliseconds.
    fn tick(&self) -> u64 {
        let now = now_millis();
        let mut prev = self.clock.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .clock
                .compare_exchange(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(current) => prev = current,
            }
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find_or_create(&self, a: &str, b: &str) -> Result<ConversationId, StoreError> {
        let key = PairKey::new(a, b);

        match self.pairs.entry(key.clone()) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(vacant) => {
                let id = format!("c{}", self.next_conversation.fetch_add(1, Ordering::Relaxed) + 1);
                let (first, second) = key.participants();
                self.conversations.insert(
                    id.clone(),
                    StoredConversation {
                        id: id.clone(),
                        participants: (first.clone(), second.clone()),
                        messages: Vec::new(),
                        updated_at: self.tick(),
                    },
                );
                vacant.insert(id.clone());
                debug!(conversation = %id, a = %a, b = %b, "Created conversation");
                Ok(id)
            }
        }
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        draft: MessageDraft,
    ) -> Result<MessageId, StoreError> {
        let mut conversation = self
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;

        let id = format!("m{}", self.next_message.fetch_add(1, Ordering::Relaxed) + 1);
        let created_at = self.tick();

        conversation.messages.push(ChatMessage {
            id: id.clone(),
            text: draft.text,
            image_url: draft.image_url,
            video_url: draft.video_url,
            msg_by_user_id: draft.author,
            seen: false,
            created_at,
        });
        conversation.updated_at = created_at;

        Ok(id)
    }

    async fn conversation_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<ConversationView>, StoreError> {
        let key = PairKey::new(a, b);
        let Some(id) = self.pairs.get(&key).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };

        Ok(self.conversations.get(&id).map(|c| c.view()))
    }

    async fn mark_seen(&self, conversation_id: &str, author_id: &str) -> Result<u64, StoreError> {
        let mut conversation = self
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;

        let mut flipped = 0;
        for message in conversation
            .messages
            .iter_mut()
            .filter(|m| !m.seen && m.msg_by_user_id == author_id)
        {
            message.seen = true;
            flipped += 1;
        }

        Ok(flipped)
    }

    async fn conversations_for(&self, user_id: &str) -> Result<Vec<ConversationView>, StoreError> {
        let mut views: Vec<ConversationView> = self
            .conversations
            .iter()
            .filter(|entry| {
                entry.participants.0 == user_id || entry.participants.1 == user_id
            })
            .map(|entry| entry.view())
            .collect();

        views.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(views)
    }
}

/// In-memory user directory that doubles as the opaque-token
/// authenticator.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    profiles: DashMap<UserId, PublicProfile>,
    tokens: DashMap<String, UserId>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with a credential token.
    pub fn add_user(&self, profile: PublicProfile, token: impl Into<String>) {
        self.tokens.insert(token.into(), profile.id.clone());
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Number of registered users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.profiles.len()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn public_profile(&self, user_id: &str) -> Result<Option<PublicProfile>, StoreError> {
        Ok(self.profiles.get(user_id).map(|p| p.value().clone()))
    }
}

#[async_trait]
impl Authenticator for MemoryDirectory {
    async fn resolve_user(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let user_id = self
            .tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::InvalidToken)?;

        if !self.profiles.contains_key(&user_id) {
            return Err(AuthError::UnknownUser);
        }

        Ok(user_id)
    }
}
