//! # parley-core
//!
//! In-process engine for the Parley realtime chat service.
//!
//! This crate provides the building blocks the server composes:
//!
//! - **OnlineRegistry** - Reference-counted presence tracking
//! - **Router** - Personal-channel fan-out and presence broadcast
//! - **Store contracts** - Traits the persistence collaborators implement
//! - **Summary** - Per-viewer conversation summary builder
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │   Session   │────▶│   Router    │────▶│ UserChannel  │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!        │                   │
//!        ▼                   ▼
//! ┌─────────────┐     ┌──────────────┐
//! │    Store    │     │OnlineRegistry│
//! └─────────────┘     └──────────────┘
//! ```

pub mod channel;
pub mod registry;
pub mod router;
pub mod store;
pub mod summary;

pub use channel::UserChannel;
pub use registry::OnlineRegistry;
pub use router::{Router, RouterConfig, RouterError};
pub use store::{
    AuthError, Authenticator, ConversationStore, ConversationView, MessageDraft, PairKey,
    StoreError, UserDirectory,
};
pub use summary::summaries_for;
