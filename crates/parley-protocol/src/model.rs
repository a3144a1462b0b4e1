//! Shared wire data model.
//!
//! These types appear inside frames and in the collaborator contracts.
//! Field names serialize in camelCase to match the established wire
//! contract of the service.

use serde::{Deserialize, Serialize};

/// A user identifier.
pub type UserId = String;

/// A conversation identifier.
pub type ConversationId = String;

/// A message identifier.
pub type MessageId = String;

/// A single chat message.
///
/// At least one of `text`, `image_url`, or `video_url` is expected to be
/// set; the protocol does not enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message identifier assigned by storage.
    pub id: MessageId,
    /// Text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Image attachment reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Video attachment reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Author of the message.
    pub msg_by_user_id: UserId,
    /// Whether the recipient has acknowledged the message.
    pub seen: bool,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// Public profile of a user, as supplied by the directory collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Avatar reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Per-viewer projection of one conversation.
///
/// Derived on demand from storage plus the online registry; never
/// persisted or cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// The other participant.
    pub peer: PublicProfile,
    /// Whether the peer currently has at least one live session.
    pub online: bool,
    /// Most recent message in the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<ChatMessage>,
    /// Count of peer-authored messages the viewer has not seen.
    pub unseen_count: u64,
    /// Conversation last-updated time, milliseconds since the Unix epoch.
    pub updated_at: u64,
}
