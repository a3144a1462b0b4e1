//! Fan-out router for personal channels.
//!
//! The router owns every user's personal channel plus one process-wide
//! broadcast used for presence snapshots. Multicast to "all sessions of
//! a user" is a single publish on the user's channel; no per-send scan
//! over connections.

use crate::channel::{validate_user_id, UserChannel};
use dashmap::DashMap;
use parley_protocol::{Frame, UserId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// User id unusable as a channel name.
    #[error("Invalid user channel: {0}")]
    InvalidChannel(&'static str),
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Per-user channel broadcast capacity.
    pub channel_capacity: usize,
    /// Process-wide broadcast capacity.
    pub broadcast_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            broadcast_capacity: 1024,
        }
    }
}

/// The fan-out router.
pub struct Router {
    /// Personal channels indexed by user id.
    channels: DashMap<UserId, UserChannel>,
    /// Connection subscriptions (connection_id -> user ids).
    subscriptions: DashMap<String, dashmap::DashSet<UserId>>,
    /// Process-wide broadcast, fed to every connection.
    broadcast: broadcast::Sender<Arc<Frame>>,
    /// Configuration.
    config: RouterConfig,
}

impl Router {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        info!("Creating router with config: {:?}", config);
        let (broadcast, _) = broadcast::channel(config.broadcast_capacity);
        Self {
            channels: DashMap::new(),
            subscriptions: DashMap::new(),
            broadcast,
            config,
        }
    }

    /// Subscribe a connection to a user's personal channel.
    ///
    /// Returns a receiver for frames delivered to that user.
    ///
    /// # Errors
    ///
    /// Returns an error if the user id is unusable as a channel name.
    pub fn subscribe(
        &self,
        connection_id: &str,
        user_id: &str,
    ) -> Result<broadcast::Receiver<Arc<Frame>>, RouterError> {
        validate_user_id(user_id).map_err(RouterError::InvalidChannel)?;

        let conn_subs = self
            .subscriptions
            .entry(connection_id.to_string())
            .or_default();

        let mut entry = self
            .channels
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user = %user_id, "Creating personal channel");
                UserChannel::with_capacity(user_id, self.config.channel_capacity)
            });

        let receiver = entry.subscribe(connection_id);
        conn_subs.insert(user_id.to_string());

        debug!(
            user = %user_id,
            connection = %connection_id,
            sessions = entry.session_count(),
            "Subscribed"
        );

        Ok(receiver)
    }

    /// Subscribe to the process-wide broadcast.
    #[must_use]
    pub fn subscribe_broadcast(&self) -> broadcast::Receiver<Arc<Frame>> {
        self.broadcast.subscribe()
    }

    /// Unsubscribe a connection from every channel it joined.
    pub fn unsubscribe_all(&self, connection_id: &str) {
        if let Some((_, users)) = self.subscriptions.remove(connection_id) {
            for user_id in users.iter() {
                if let Some(mut entry) = self.channels.get_mut(user_id.as_str()) {
                    entry.unsubscribe(connection_id);

                    if entry.is_empty() {
                        let name = user_id.clone();
                        drop(entry);
                        self.channels.remove(&name);
                        debug!(user = %name, "Deleted empty personal channel");
                    }
                }
            }
        }

        debug!(connection = %connection_id, "Unsubscribed from all channels");
    }

    /// Deliver a frame to every live session of a user.
    ///
    /// Returns the number of sessions that received the frame; a user
    /// with no live channel yields zero, not an error.
    pub fn send_to_user(&self, user_id: &str, frame: Frame) -> usize {
        if let Some(entry) = self.channels.get(user_id) {
            let count = entry.publish(frame);
            trace!(user = %user_id, recipients = count, "Delivered to user");
            count
        } else {
            trace!(user = %user_id, "No live sessions for user");
            0
        }
    }

    /// Deliver a frame to every connection.
    ///
    /// Returns the number of connections that received the frame.
    pub fn broadcast(&self, frame: Frame) -> usize {
        let count = self.broadcast.send(Arc::new(frame)).unwrap_or_default();
        trace!(recipients = count, "Broadcast frame");
        count
    }

    /// Check if a user currently has a live channel.
    #[must_use]
    pub fn has_channel(&self, user_id: &str) -> bool {
        self.channels.contains_key(user_id)
    }

    /// Number of sessions subscribed under a user id.
    #[must_use]
    pub fn session_count(&self, user_id: &str) -> usize {
        self.channels
            .get(user_id)
            .map(|entry| entry.session_count())
            .unwrap_or(0)
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            channel_count: self.channels.len(),
            connection_count: self.subscriptions.len(),
            total_subscriptions: self.subscriptions.iter().map(|s| s.len()).sum(),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Router statistics.
#[derive(Debug, Clone)]
pub struct RouterStats {
    /// Number of live personal channels.
    pub channel_count: usize,
    /// Number of connected sessions.
    pub connection_count: usize,
    /// Total number of subscriptions.
    pub total_subscriptions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_unsubscribe() {
        let router = Router::new();

        let rx = router.subscribe("conn-1", "u1").unwrap();
        assert!(router.has_channel("u1"));
        assert_eq!(router.session_count("u1"), 1);
        drop(rx);

        router.unsubscribe_all("conn-1");
        assert!(!router.has_channel("u1"));
    }

    #[test]
    fn test_send_reaches_every_session_of_user() {
        let router = Router::new();

        let mut rx1 = router.subscribe("conn-1", "u1").unwrap();
        let mut rx2 = router.subscribe("conn-2", "u1").unwrap();
        let mut rx_other = router.subscribe("conn-3", "u2").unwrap();

        let count = router.send_to_user("u1", Frame::sidebar("u1"));
        assert_eq!(count, 2);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn test_send_to_offline_user_is_noop() {
        let router = Router::new();
        assert_eq!(router.send_to_user("ghost", Frame::sidebar("ghost")), 0);
    }

    #[test]
    fn test_invalid_user_channel() {
        let router = Router::new();
        assert!(matches!(
            router.subscribe("conn-1", ""),
            Err(RouterError::InvalidChannel(_))
        ));
    }

    #[test]
    fn test_broadcast_reaches_all_connections() {
        let router = Router::new();

        let mut bcast1 = router.subscribe_broadcast();
        let mut bcast2 = router.subscribe_broadcast();

        let count = router.broadcast(Frame::online_users(vec!["u1".into()]));
        assert_eq!(count, 2);

        assert!(bcast1.try_recv().is_ok());
        assert!(bcast2.try_recv().is_ok());
    }

    #[test]
    fn test_unsubscribe_all_cleans_empty_channels() {
        let router = Router::new();

        let _rx1 = router.subscribe("conn-1", "u1").unwrap();
        let _rx2 = router.subscribe("conn-2", "u1").unwrap();

        router.unsubscribe_all("conn-1");
        assert!(router.has_channel("u1"));

        router.unsubscribe_all("conn-2");
        assert!(!router.has_channel("u1"));
    }

    #[test]
    fn test_stats() {
        let router = Router::new();

        let _rx1 = router.subscribe("conn-1", "u1").unwrap();
        let _rx2 = router.subscribe("conn-2", "u1").unwrap();
        let _rx3 = router.subscribe("conn-3", "u2").unwrap();

        let stats = router.stats();
        assert_eq!(stats.channel_count, 2);
        assert_eq!(stats.connection_count, 3);
        assert_eq!(stats.total_subscriptions, 3);
    }
}
