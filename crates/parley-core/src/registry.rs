//! Online-user registry.
//!
//! Tracks which users currently hold at least one live session. A user
//! may be connected from several devices at once, so entries carry a
//! live-session count: a user is online iff their count is non-zero.

use dashmap::DashMap;
use parley_protocol::UserId;
use std::sync::Arc;
use tracing::debug;

/// Shared registry of online users.
///
/// Cloning is cheap; all clones observe the same state. Constructed once
/// per process and handed to the router and session handlers.
#[derive(Debug, Clone, Default)]
pub struct OnlineRegistry {
    sessions: Arc<DashMap<UserId, usize>>,
}

impl OnlineRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new live session for a user.
    ///
    /// Returns `true` iff the user just came online (no prior session).
    pub fn connect(&self, user_id: &str) -> bool {
        let mut count = self.sessions.entry(user_id.to_string()).or_insert(0);
        *count += 1;
        let came_online = *count == 1;
        drop(count);

        if came_online {
            debug!(user = %user_id, "User came online");
        }
        came_online
    }

    /// Record the end of a live session for a user.
    ///
    /// Returns `true` iff this was the user's last session. A disconnect
    /// for an untracked user is a no-op.
    pub fn disconnect(&self, user_id: &str) -> bool {
        let went_offline = match self.sessions.get_mut(user_id) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };

        if went_offline {
            self.sessions.remove_if(user_id, |_, count| *count == 0);
            debug!(user = %user_id, "User went offline");
        }
        went_offline
    }

    /// Check whether a user has at least one live session.
    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.sessions.get(user_id).is_some_and(|count| *count > 0)
    }

    /// Full online snapshot, sorted for deterministic broadcasts.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .sessions
            .iter()
            .filter(|entry| *entry.value() > 0)
            .map(|entry| entry.key().clone())
            .collect();
        users.sort_unstable();
        users
    }

    /// Number of distinct online users.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.sessions.iter().filter(|entry| *entry.value() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_iff_live_session() {
        let registry = OnlineRegistry::new();
        assert!(!registry.is_online("u1"));

        assert!(registry.connect("u1"));
        assert!(registry.is_online("u1"));

        assert!(registry.disconnect("u1"));
        assert!(!registry.is_online("u1"));
    }

    #[test]
    fn test_multi_session_survives_single_disconnect() {
        let registry = OnlineRegistry::new();

        assert!(registry.connect("u1"));
        // Second device; the user was already online
        assert!(!registry.connect("u1"));

        // One device leaves; the other keeps the user online
        assert!(!registry.disconnect("u1"));
        assert!(registry.is_online("u1"));

        assert!(registry.disconnect("u1"));
        assert!(!registry.is_online("u1"));
    }

    #[test]
    fn test_disconnect_untracked_user() {
        let registry = OnlineRegistry::new();
        assert!(!registry.disconnect("ghost"));
        assert!(!registry.is_online("ghost"));
    }

    #[test]
    fn test_snapshot_sorted() {
        let registry = OnlineRegistry::new();
        registry.connect("u3");
        registry.connect("u1");
        registry.connect("u2");
        registry.disconnect("u2");

        assert_eq!(registry.snapshot(), vec!["u1".to_string(), "u3".to_string()]);
        assert_eq!(registry.online_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_connect_disconnect() {
        let registry = OnlineRegistry::new();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let reg = registry.clone();
            handles.push(tokio::spawn(async move {
                reg.connect("u1");
                reg.disconnect("u1");
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(!registry.is_online("u1"));
        assert_eq!(registry.online_count(), 0);
    }
}
