//! Frame types for the Parley protocol.
//!
//! Frames are the events exchanged between clients and servers.
//! Each frame is serialized using MessagePack with named fields; the
//! `type` tag carries the event name established by the wire contract.

use serde::{Deserialize, Serialize};

use crate::model::{ChatMessage, ConversationSummary, PublicProfile, UserId};

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    Connect = 0x01,
    Connected = 0x02,
    MessagePage = 0x03,
    NewMessage = 0x04,
    Sidebar = 0x05,
    Seen = 0x06,
    OnlineUsers = 0x07,
    MessageUser = 0x08,
    Messages = 0x09,
    Conversations = 0x0A,
    Ping = 0x0B,
    Pong = 0x0C,
}

impl FrameType {
    /// Stable lowercase name, used for logging and metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Connect => "connect",
            FrameType::Connected => "connected",
            FrameType::MessagePage => "message-page",
            FrameType::NewMessage => "new-message",
            FrameType::Sidebar => "sidebar",
            FrameType::Seen => "seen",
            FrameType::OnlineUsers => "online-users",
            FrameType::MessageUser => "message-user",
            FrameType::Messages => "message",
            FrameType::Conversations => "conversation",
            FrameType::Ping => "ping",
            FrameType::Pong => "pong",
        }
    }
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, &'static str> {
        match value {
            0x01 => Ok(FrameType::Connect),
            0x02 => Ok(FrameType::Connected),
            0x03 => Ok(FrameType::MessagePage),
            0x04 => Ok(FrameType::NewMessage),
            0x05 => Ok(FrameType::Sidebar),
            0x06 => Ok(FrameType::Seen),
            0x07 => Ok(FrameType::OnlineUsers),
            0x08 => Ok(FrameType::MessageUser),
            0x09 => Ok(FrameType::Messages),
            0x0A => Ok(FrameType::Conversations),
            0x0B => Ok(FrameType::Ping),
            0x0C => Ok(FrameType::Pong),
            _ => Err("Invalid frame type"),
        }
    }
}

/// A protocol frame.
///
/// The `type` tags reuse the event names of the original wire contract,
/// including the space in `new message` and the casing of `onlineUser`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Handshake: the first frame a client must send.
    #[serde(rename = "connect")]
    Connect {
        /// Protocol major version the client speaks.
        version: u8,
        /// Opaque credential token, resolved by the authentication
        /// collaborator.
        token: String,
    },

    /// Handshake accepted.
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected {
        /// Unique connection identifier.
        connection_id: String,
        /// Negotiated protocol major version.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// Open the conversation view against a peer.
    #[serde(rename = "message-page", rename_all = "camelCase")]
    MessagePage {
        /// The peer whose profile and conversation are requested.
        user_id: UserId,
    },

    /// Send a message to a peer.
    #[serde(rename = "new message", rename_all = "camelCase")]
    NewMessage {
        /// Sending participant.
        sender: UserId,
        /// Receiving participant.
        receiver: UserId,
        /// Text body.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Image attachment reference.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        /// Video attachment reference.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_url: Option<String>,
        /// Author recorded on the stored message.
        msg_by_user_id: UserId,
    },

    /// Request the conversation summary list for a user.
    #[serde(rename = "sidebar", rename_all = "camelCase")]
    Sidebar {
        /// The user whose sidebar is requested.
        user_id: UserId,
    },

    /// Acknowledge every message authored by the given peer.
    #[serde(rename = "seen", rename_all = "camelCase")]
    Seen {
        /// Author whose messages are being acknowledged.
        msg_by_user_id: UserId,
    },

    /// Full online-user snapshot, broadcast on any presence change.
    #[serde(rename = "onlineUser")]
    OnlineUsers {
        /// Every user with at least one live session.
        users: Vec<UserId>,
    },

    /// Peer profile with computed presence, reply to `message-page`.
    #[serde(rename = "message-user")]
    MessageUser {
        /// The peer's public profile.
        user: PublicProfile,
        /// Whether the peer currently has a live session.
        online: bool,
    },

    /// Ordered message list for one conversation.
    #[serde(rename = "message")]
    Messages {
        /// Messages in creation order; empty when no conversation exists.
        messages: Vec<ChatMessage>,
    },

    /// Conversation summary list for one user.
    #[serde(rename = "conversation")]
    Conversations {
        /// Summaries ordered by last update, most recent first.
        conversations: Vec<ConversationSummary>,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from the ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Connect { .. } => FrameType::Connect,
            Frame::Connected { .. } => FrameType::Connected,
            Frame::MessagePage { .. } => FrameType::MessagePage,
            Frame::NewMessage { .. } => FrameType::NewMessage,
            Frame::Sidebar { .. } => FrameType::Sidebar,
            Frame::Seen { .. } => FrameType::Seen,
            Frame::OnlineUsers { .. } => FrameType::OnlineUsers,
            Frame::MessageUser { .. } => FrameType::MessageUser,
            Frame::Messages { .. } => FrameType::Messages,
            Frame::Conversations { .. } => FrameType::Conversations,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
        }
    }

    /// Create a new Connect frame at the current protocol version.
    #[must_use]
    pub fn connect(token: impl Into<String>) -> Self {
        Frame::Connect {
            version: crate::version::PROTOCOL_VERSION.major,
            token: token.into(),
        }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, version: u8, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version,
            heartbeat,
        }
    }

    /// Create a new MessagePage frame.
    #[must_use]
    pub fn message_page(user_id: impl Into<UserId>) -> Self {
        Frame::MessagePage {
            user_id: user_id.into(),
        }
    }

    /// Create a new Sidebar frame.
    #[must_use]
    pub fn sidebar(user_id: impl Into<UserId>) -> Self {
        Frame::Sidebar {
            user_id: user_id.into(),
        }
    }

    /// Create a new Seen frame.
    #[must_use]
    pub fn seen(msg_by_user_id: impl Into<UserId>) -> Self {
        Frame::Seen {
            msg_by_user_id: msg_by_user_id.into(),
        }
    }

    /// Create a new OnlineUsers snapshot frame.
    #[must_use]
    pub fn online_users(users: Vec<UserId>) -> Self {
        Frame::OnlineUsers { users }
    }

    /// Create a new MessageUser frame.
    #[must_use]
    pub fn message_user(user: PublicProfile, online: bool) -> Self {
        Frame::MessageUser { user, online }
    }

    /// Create a new Messages frame.
    #[must_use]
    pub fn messages(messages: Vec<ChatMessage>) -> Self {
        Frame::Messages { messages }
    }

    /// Create a new Conversations frame.
    #[must_use]
    pub fn conversations(conversations: Vec<ConversationSummary>) -> Self {
        Frame::Conversations { conversations }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type() {
        let page = Frame::message_page("u2");
        assert_eq!(page.frame_type(), FrameType::MessagePage);

        let seen = Frame::seen("u1");
        assert_eq!(seen.frame_type(), FrameType::Seen);
    }

    #[test]
    fn test_frame_type_conversion() {
        for byte in 0x01..=0x0C {
            let ft = FrameType::try_from(byte).unwrap();
            assert_eq!(u8::from(ft), byte);
        }
        assert!(FrameType::try_from(0x0D).is_err());
        assert!(FrameType::try_from(0).is_err());
    }

    #[test]
    fn test_wire_tags() {
        let frame = Frame::NewMessage {
            sender: "u1".into(),
            receiver: "u2".into(),
            text: Some("hi".into()),
            image_url: None,
            video_url: None,
            msg_by_user_id: "u1".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "new message");
        assert_eq!(json["msgByUserId"], "u1");

        let snapshot = Frame::online_users(vec!["u1".into()]);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["type"], "onlineUser");
    }
}
