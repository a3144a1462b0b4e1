//! Conversation summary builder.
//!
//! Projects a user's conversations into the sidebar view: peer profile,
//! presence flag, last message, and unseen count, ordered by the
//! conversation's last update. Pure read; nothing is cached.

use crate::registry::OnlineRegistry;
use crate::store::{ConversationStore, StoreError, UserDirectory};
use parley_protocol::ConversationSummary;
use tracing::warn;

/// Build the conversation summary list for a user.
///
/// Conversations whose peer profile can no longer be resolved are
/// skipped with a warning rather than failing the whole list.
///
/// # Errors
///
/// Returns an error if the storage collaborator fails.
pub async fn summaries_for(
    store: &dyn ConversationStore,
    directory: &dyn UserDirectory,
    registry: &OnlineRegistry,
    user_id: &str,
) -> Result<Vec<ConversationSummary>, StoreError> {
    let mut conversations = store.conversations_for(user_id).await?;
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let mut summaries = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let peer_id = conversation.peer_of(user_id).clone();

        let peer = match directory.public_profile(&peer_id).await? {
            Some(profile) => profile,
            None => {
                warn!(user = %user_id, peer = %peer_id, "Peer profile missing, skipping conversation");
                continue;
            }
        };

        summaries.push(ConversationSummary {
            online: registry.is_online(&peer_id),
            last_message: conversation.last_message().cloned(),
            unseen_count: conversation.unseen_from(&peer_id),
            updated_at: conversation.updated_at,
            peer,
        });
    }

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ConversationView, MessageDraft};
    use async_trait::async_trait;
    use parley_protocol::{ChatMessage, ConversationId, MessageId, PublicProfile};
    use std::collections::HashMap;

    struct FixedStore {
        conversations: Vec<ConversationView>,
    }

    #[async_trait]
    impl ConversationStore for FixedStore {
        async fn find_or_create(&self, _a: &str, _b: &str) -> Result<ConversationId, StoreError> {
            unimplemented!("not exercised by the summary builder")
        }

        async fn append_message(
            &self,
            _conversation_id: &str,
            _draft: MessageDraft,
        ) -> Result<MessageId, StoreError> {
            unimplemented!("not exercised by the summary builder")
        }

        async fn conversation_between(
            &self,
            _a: &str,
            _b: &str,
        ) -> Result<Option<ConversationView>, StoreError> {
            unimplemented!("not exercised by the summary builder")
        }

        async fn mark_seen(&self, _conversation_id: &str, _author_id: &str) -> Result<u64, StoreError> {
            unimplemented!("not exercised by the summary builder")
        }

        async fn conversations_for(&self, user_id: &str) -> Result<Vec<ConversationView>, StoreError> {
            Ok(self
                .conversations
                .iter()
                .filter(|c| c.participants.0 == user_id || c.participants.1 == user_id)
                .cloned()
                .collect())
        }
    }

    struct FixedDirectory {
        profiles: HashMap<String, PublicProfile>,
    }

    #[async_trait]
    impl UserDirectory for FixedDirectory {
        async fn public_profile(&self, user_id: &str) -> Result<Option<PublicProfile>, StoreError> {
            Ok(self.profiles.get(user_id).cloned())
        }
    }

    fn profile(id: &str) -> PublicProfile {
        PublicProfile {
            id: id.into(),
            name: id.to_uppercase(),
            email: format!("{id}@example.com"),
            avatar_url: None,
        }
    }

    fn message(author: &str, seen: bool, created_at: u64) -> ChatMessage {
        ChatMessage {
            id: format!("m{created_at}"),
            text: Some("hello".into()),
            image_url: None,
            video_url: None,
            msg_by_user_id: author.into(),
            seen,
            created_at,
        }
    }

    fn conversation(id: &str, a: &str, b: &str, messages: Vec<ChatMessage>, updated_at: u64) -> ConversationView {
        ConversationView {
            id: id.into(),
            participants: (a.into(), b.into()),
            messages,
            updated_at,
        }
    }

    #[tokio::test]
    async fn test_summaries_ordered_most_recent_first() {
        let store = FixedStore {
            conversations: vec![
                conversation("c1", "u1", "u2", vec![message("u2", false, 10)], 10),
                conversation("c2", "u1", "u3", vec![message("u3", false, 20)], 20),
            ],
        };
        let directory = FixedDirectory {
            profiles: [("u2", profile("u2")), ("u3", profile("u3"))]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        let registry = OnlineRegistry::new();
        registry.connect("u3");

        let summaries = summaries_for(&store, &directory, &registry, "u1")
            .await
            .unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].peer.id, "u3");
        assert!(summaries[0].online);
        assert_eq!(summaries[1].peer.id, "u2");
        assert!(!summaries[1].online);
    }

    #[tokio::test]
    async fn test_unseen_counts_only_peer_authored() {
        let store = FixedStore {
            conversations: vec![conversation(
                "c1",
                "u1",
                "u2",
                vec![
                    message("u2", false, 1),
                    message("u2", false, 2),
                    message("u1", false, 3),
                    message("u2", true, 4),
                ],
                4,
            )],
        };
        let directory = FixedDirectory {
            profiles: [("u2".to_string(), profile("u2"))].into_iter().collect(),
        };
        let registry = OnlineRegistry::new();

        let summaries = summaries_for(&store, &directory, &registry, "u1")
            .await
            .unwrap();

        assert_eq!(summaries[0].unseen_count, 2);
        assert_eq!(
            summaries[0].last_message.as_ref().unwrap().created_at,
            4
        );
    }

    #[tokio::test]
    async fn test_missing_peer_profile_is_skipped() {
        let store = FixedStore {
            conversations: vec![
                conversation("c1", "u1", "gone", vec![], 10),
                conversation("c2", "u1", "u2", vec![], 5),
            ],
        };
        let directory = FixedDirectory {
            profiles: [("u2".to_string(), profile("u2"))].into_iter().collect(),
        };
        let registry = OnlineRegistry::new();

        let summaries = summaries_for(&store, &directory, &registry, "u1")
            .await
            .unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].peer.id, "u2");
    }

    #[tokio::test]
    async fn test_no_conversations_yields_empty_list() {
        let store = FixedStore {
            conversations: vec![],
        };
        let directory = FixedDirectory {
            profiles: HashMap::new(),
        };
        let registry = OnlineRegistry::new();

        let summaries = summaries_for(&store, &directory, &registry, "u1")
            .await
            .unwrap();
        assert!(summaries.is_empty());
    }
}
