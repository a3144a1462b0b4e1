//! Collaborator contracts.
//!
//! The engine delegates persistence, identity resolution, and profile
//! lookup to external collaborators. These traits are the whole of what
//! the engine requires from them; every implementation must keep the
//! listed operations atomic with respect to concurrent callers on the
//! same conversation.

use async_trait::async_trait;
use parley_protocol::{ChatMessage, ConversationId, MessageId, PublicProfile, UserId};
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Conversation id does not exist.
    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// Backend failure.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Authentication errors. All of these are fatal for the connection.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential supplied at handshake.
    #[error("Missing credential token")]
    MissingToken,

    /// Credential did not verify.
    #[error("Invalid credential token")]
    InvalidToken,

    /// Credential verified but names no known user.
    #[error("Token resolved to no known user")]
    UnknownUser,

    /// Backend failure.
    #[error("Authentication backend error: {0}")]
    Backend(String),
}

/// Normalized unordered conversation pair.
///
/// `(A, B)` and `(B, A)` produce the same key, so sender/receiver order
/// never matters for conversation lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    first: UserId,
    second: UserId,
}

impl PairKey {
    /// Build the key for a pair of participants, in either order.
    #[must_use]
    pub fn new(a: impl Into<UserId>, b: impl Into<UserId>) -> Self {
        let a = a.into();
        let b = b.into();
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    /// Check whether a user is one of the participants.
    #[must_use]
    pub fn contains(&self, user_id: &str) -> bool {
        self.first == user_id || self.second == user_id
    }

    /// The participants in normalized order.
    #[must_use]
    pub fn participants(&self) -> (&UserId, &UserId) {
        (&self.first, &self.second)
    }
}

/// A message draft prior to persistence.
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    /// Text body.
    pub text: Option<String>,
    /// Image attachment reference.
    pub image_url: Option<String>,
    /// Video attachment reference.
    pub video_url: Option<String>,
    /// Author of the message.
    pub author: UserId,
}

/// A conversation together with its ordered message list.
#[derive(Debug, Clone)]
pub struct ConversationView {
    /// Conversation identifier.
    pub id: ConversationId,
    /// The two participants, in normalized order.
    pub participants: (UserId, UserId),
    /// Messages in creation order.
    pub messages: Vec<ChatMessage>,
    /// Last-updated time, milliseconds since the Unix epoch.
    pub updated_at: u64,
}

impl ConversationView {
    /// The participant other than `user_id`.
    ///
    /// Falls back to the first participant when `user_id` is not part of
    /// the conversation.
    #[must_use]
    pub fn peer_of(&self, user_id: &str) -> &UserId {
        if self.participants.0 == user_id {
            &self.participants.1
        } else {
            &self.participants.0
        }
    }

    /// Most recent message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Count of unseen messages authored by `author`.
    #[must_use]
    pub fn unseen_from(&self, author: &str) -> u64 {
        self.messages
            .iter()
            .filter(|msg| !msg.seen && msg.msg_by_user_id == author)
            .count() as u64
    }
}

/// Persistent conversation storage.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Find the conversation for an unordered pair, creating it if absent.
    ///
    /// Idempotent with respect to the pair: concurrent duplicate calls
    /// must converge on a single conversation id.
    async fn find_or_create(&self, a: &str, b: &str) -> Result<ConversationId, StoreError>;

    /// Append a message and bump the conversation's last-updated time.
    async fn append_message(
        &self,
        conversation_id: &str,
        draft: MessageDraft,
    ) -> Result<MessageId, StoreError>;

    /// Fetch the conversation between two users with its message list.
    ///
    /// Absence is not an error.
    async fn conversation_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<ConversationView>, StoreError>;

    /// Flag every message authored by `author_id` in the conversation as
    /// seen. Idempotent; returns how many messages flipped.
    async fn mark_seen(&self, conversation_id: &str, author_id: &str) -> Result<u64, StoreError>;

    /// Every conversation the user participates in, ordered by last
    /// update, most recent first.
    async fn conversations_for(&self, user_id: &str) -> Result<Vec<ConversationView>, StoreError>;
}

/// Credential resolution at handshake time.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve an opaque token to a user identity.
    async fn resolve_user(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Public profile lookup.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch a user's public profile. Absence is not an error.
    async fn public_profile(&self, user_id: &str) -> Result<Option<PublicProfile>, StoreError>;
}
