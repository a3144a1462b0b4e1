//! # parley-protocol
//!
//! Wire protocol definitions for the Parley realtime chat service.
//!
//! This crate defines the binary protocol spoken between Parley clients and
//! servers: the event frames, the shared data model (messages, profiles,
//! conversation summaries), the MessagePack codec, and protocol versioning.
//!
//! ## Events
//!
//! - `connect` / `connected` - Handshake and authentication
//! - `message-page` / `message-user` / `message` - Open a conversation
//! - `new message` - Send a message to a peer
//! - `sidebar` / `conversation` - Conversation summary lists
//! - `seen` - Read-state acknowledgment
//! - `onlineUser` - Presence snapshot broadcast
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{Frame, codec};
//!
//! let frame = Frame::sidebar("u1");
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod model;
pub mod version;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{Frame, FrameType};
pub use model::{
    ChatMessage, ConversationId, ConversationSummary, MessageId, PublicProfile, UserId,
};
pub use version::{Version, PROTOCOL_VERSION};
