//! Personal delivery channels.
//!
//! Every authenticated user owns one channel, named by their user id.
//! Each of the user's sessions subscribes to it, so a single publish
//! reaches every device the user currently has connected.

use parley_protocol::Frame;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Maximum user-channel name length.
pub const MAX_USER_ID_LENGTH: usize = 128;

/// Default per-channel broadcast capacity.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Validate a user id used as a channel name.
///
/// # Errors
///
/// Returns an error message if the id is unusable as a channel name.
pub fn validate_user_id(user_id: &str) -> Result<(), &'static str> {
    if user_id.is_empty() {
        return Err("User id cannot be empty");
    }
    if user_id.len() > MAX_USER_ID_LENGTH {
        return Err("User id too long");
    }
    if !user_id.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("User id contains invalid characters");
    }
    Ok(())
}

/// A personal delivery channel for one user.
#[derive(Debug)]
pub struct UserChannel {
    /// Owning user id.
    user_id: String,
    /// Broadcast sender feeding every subscribed session.
    sender: broadcast::Sender<Arc<Frame>>,
    /// Connection ids of the subscribed sessions.
    sessions: HashSet<String>,
}

impl UserChannel {
    /// Create a channel with the default capacity.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self::with_capacity(user_id, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a channel with a specific capacity.
    #[must_use]
    pub fn with_capacity(user_id: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            user_id: user_id.into(),
            sender,
            sessions: HashSet::new(),
        }
    }

    /// Get the owning user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Number of subscribed sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Check if a connection is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, connection_id: &str) -> bool {
        self.sessions.contains(connection_id)
    }

    /// Subscribe a session to this channel.
    ///
    /// Returns a receiver for frames delivered to the user.
    pub fn subscribe(&mut self, connection_id: impl Into<String>) -> broadcast::Receiver<Arc<Frame>> {
        let conn_id = connection_id.into();
        self.sessions.insert(conn_id.clone());
        debug!(user = %self.user_id, connection = %conn_id, "Session subscribed");
        self.sender.subscribe()
    }

    /// Unsubscribe a session from this channel.
    ///
    /// Returns `true` if the session was subscribed.
    pub fn unsubscribe(&mut self, connection_id: &str) -> bool {
        let removed = self.sessions.remove(connection_id);
        if removed {
            debug!(user = %self.user_id, connection = %connection_id, "Session unsubscribed");
        }
        removed
    }

    /// Deliver a frame to every subscribed session.
    ///
    /// Returns the number of receivers that got the frame.
    pub fn publish(&self, frame: Frame) -> usize {
        trace!(user = %self.user_id, event = frame.frame_type().name(), "Delivering frame");
        self.sender.send(Arc::new(frame)).unwrap_or_default()
    }

    /// Check if the channel has no subscribed sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_creation() {
        let channel = UserChannel::new("u1");
        assert_eq!(channel.user_id(), "u1");
        assert_eq!(channel.session_count(), 0);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_channel_subscribe_unsubscribe() {
        let mut channel = UserChannel::new("u1");

        let _rx = channel.subscribe("conn-1");
        assert_eq!(channel.session_count(), 1);
        assert!(channel.is_subscribed("conn-1"));

        let _rx2 = channel.subscribe("conn-2");
        assert_eq!(channel.session_count(), 2);

        assert!(channel.unsubscribe("conn-1"));
        assert!(!channel.is_subscribed("conn-1"));
        assert!(!channel.unsubscribe("conn-1"));
    }

    #[test]
    fn test_user_id_validation() {
        assert!(validate_user_id("u1").is_ok());
        assert!(validate_user_id("65a9f0d2c1").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("\u{1}bad").is_err());

        let long_id = "a".repeat(MAX_USER_ID_LENGTH + 1);
        assert!(validate_user_id(&long_id).is_err());
    }

    #[tokio::test]
    async fn test_channel_publish_reaches_all_sessions() {
        let mut channel = UserChannel::new("u1");
        let mut rx1 = channel.subscribe("conn-1");
        let mut rx2 = channel.subscribe("conn-2");

        let count = channel.publish(Frame::online_users(vec!["u1".into()]));
        assert_eq!(count, 2);

        let frame1 = rx1.recv().await.unwrap();
        let frame2 = rx2.recv().await.unwrap();
        assert_eq!(*frame1, *frame2);
    }
}
