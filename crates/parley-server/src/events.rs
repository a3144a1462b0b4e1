//! Authenticated event handlers.
//!
//! Each inbound event is handled independently: a failure here is
//! handler-local, reported to the dispatch site and never allowed to
//! terminate the connection or leak into sibling handlers. Direct
//! replies go to the requesting session's outbound queue; everything
//! addressed to a user goes through the router's personal channels.

use crate::handlers::AppState;
use crate::metrics;
use parley_core::{summaries_for, MessageDraft, StoreError};
use parley_protocol::{Frame, UserId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outbound queue of one session.
pub type ReplySender = mpsc::UnboundedSender<Arc<Frame>>;

/// Handler-local failures.
#[derive(Debug, Error)]
pub enum EventError {
    /// Storage collaborator failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Dispatch one authenticated event.
///
/// `session_user` is the identity bound at handshake time; `reply`
/// addresses only the requesting session.
///
/// # Errors
///
/// Returns an error when a collaborator fails; the caller logs and
/// counts it, and the connection lives on.
pub async fn handle_event(
    state: &AppState,
    session_user: &UserId,
    frame: Frame,
    reply: &ReplySender,
) -> Result<(), EventError> {
    match frame {
        Frame::MessagePage { user_id } => on_message_page(state, session_user, &user_id, reply).await,

        Frame::NewMessage {
            sender,
            receiver,
            text,
            image_url,
            video_url,
            msg_by_user_id,
        } => {
            let draft = MessageDraft {
                text,
                image_url,
                video_url,
                author: msg_by_user_id,
            };
            on_new_message(state, &sender, &receiver, draft).await
        }

        Frame::Sidebar { user_id } => on_sidebar(state, &user_id, reply).await,

        Frame::Seen { msg_by_user_id } => on_seen(state, session_user, &msg_by_user_id).await,

        Frame::Ping { timestamp } => {
            send_reply(reply, Frame::pong(timestamp));
            Ok(())
        }

        other => {
            warn!(
                user = %session_user,
                frame_type = other.frame_type().name(),
                "Unexpected frame type"
            );
            Ok(())
        }
    }
}

/// Broadcast the full online snapshot to every connection.
pub fn broadcast_presence(state: &AppState) {
    let users = state.registry.snapshot();
    metrics::set_online_users(users.len());
    state.router.broadcast(Frame::online_users(users));
}

/// Peer profile plus the conversation history against that peer.
async fn on_message_page(
    state: &AppState,
    session_user: &UserId,
    peer_id: &str,
    reply: &ReplySender,
) -> Result<(), EventError> {
    match state.directory.public_profile(peer_id).await? {
        Some(profile) => {
            let online = state.registry.is_online(peer_id);
            send_reply(reply, Frame::message_user(profile, online));
        }
        None => {
            debug!(peer = %peer_id, "Peer profile absent, skipping profile emit");
        }
    }

    let messages = state
        .store
        .conversation_between(session_user, peer_id)
        .await?
        .map(|view| view.messages)
        .unwrap_or_default();

    send_reply(reply, Frame::messages(messages));
    Ok(())
}

/// Persist a message and push fresh views to both participants.
async fn on_new_message(
    state: &AppState,
    sender: &UserId,
    receiver: &UserId,
    draft: MessageDraft,
) -> Result<(), EventError> {
    // The conversation must exist before the message is attached to it.
    let conversation_id = state.store.find_or_create(sender, receiver).await?;
    state.store.append_message(&conversation_id, draft).await?;

    let messages = state
        .store
        .conversation_between(sender, receiver)
        .await?
        .map(|view| view.messages)
        .unwrap_or_default();

    state
        .router
        .send_to_user(sender, Frame::messages(messages.clone()));
    state.router.send_to_user(receiver, Frame::messages(messages));

    deliver_summaries(state, sender).await?;
    deliver_summaries(state, receiver).await?;

    Ok(())
}

/// Emit the summary list for a user to the requesting session.
async fn on_sidebar(state: &AppState, user_id: &str, reply: &ReplySender) -> Result<(), EventError> {
    let summaries = summaries_for(
        state.store.as_ref(),
        state.directory.as_ref(),
        &state.registry,
        user_id,
    )
    .await?;

    send_reply(reply, Frame::conversations(summaries));
    Ok(())
}

/// Acknowledge every message the peer authored, then refresh both
/// participants' summary lists.
async fn on_seen(state: &AppState, session_user: &UserId, peer_id: &str) -> Result<(), EventError> {
    let Some(view) = state
        .store
        .conversation_between(session_user, peer_id)
        .await?
    else {
        debug!(user = %session_user, peer = %peer_id, "Seen for absent conversation");
        return Ok(());
    };

    state.store.mark_seen(&view.id, peer_id).await?;

    deliver_summaries(state, session_user).await?;
    deliver_summaries(state, peer_id).await?;

    Ok(())
}

/// Recompute and deliver a user's summaries to all their sessions.
async fn deliver_summaries(state: &AppState, user_id: &str) -> Result<(), EventError> {
    let summaries = summaries_for(
        state.store.as_ref(),
        state.directory.as_ref(),
        &state.registry,
        user_id,
    )
    .await?;

    state
        .router
        .send_to_user(user_id, Frame::conversations(summaries));
    Ok(())
}

fn send_reply(reply: &ReplySender, frame: Frame) {
    // A failed send means the session is already tearing down.
    let _ = reply.send(Arc::new(frame));
}
