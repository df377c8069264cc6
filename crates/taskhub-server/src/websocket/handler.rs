//! Inbound frame dispatch.
//!
//! Every rejection is answered with a unicast `error` frame; nothing here
//! ends the connection. Malformed frames and unknown kinds are logged and
//! dropped without a reply.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use serde_json::Value;
use taskhub_core::{
    ChatMessageEvent, FrameKind, InboundFrame, MessageType, OutboundFrame, PresenceEvent, RoomId,
    RoomKey, UserIdentity,
};
use taskhub_store::{ChatStore, MessageStore, NewMessage, ParticipantStore, StoreError};
use tracing::{Span, debug, instrument, warn};

use super::broadcast::Broadcaster;
use super::connection::ClientSession;
use super::registry::ConnectionRegistry;
use crate::metrics::{CHAT_MESSAGES_TOTAL, WS_FRAMES_TOTAL};

/// Reasons a chat request is rejected. `Display` is the text sent to the client.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The session has not joined the target room.
    #[error("You are not in this room")]
    NotInRoom,
    /// Chat content is empty or whitespace.
    #[error("Message content cannot be empty")]
    EmptyContent,
    /// The user is not a participant of the room.
    #[error("You are not a participant in this room")]
    NotParticipant,
    /// The participant is blocked or read-only.
    #[error("You cannot send messages to this room")]
    CannotSend,
    /// The store failed to persist the message.
    #[error("Failed to save message")]
    SaveFailed(#[source] StoreError),
    /// The store failed to answer a membership query.
    #[error("Failed to verify room membership")]
    MembershipLookup(#[source] StoreError),
}

/// Shared state every session handler needs.
pub struct ChatContext {
    /// Live sessions and rooms.
    pub registry: Arc<ConnectionRegistry>,
    /// Fan-out over `registry`.
    pub broadcaster: Broadcaster,
    /// Persistence collaborators.
    pub store: Arc<dyn ChatStore>,
}

impl ChatContext {
    /// Build a context with a broadcaster over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn ChatStore>) -> Self {
        Self {
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
            store,
        }
    }
}

/// Decode and dispatch one inbound text frame.
#[instrument(skip_all, fields(kind))]
pub async fn handle_frame(ctx: &ChatContext, session: &Arc<ClientSession>, text: &str) {
    let frame = match InboundFrame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(conn_id = %session.conn_id, error = %e, len = text.len(), "dropping malformed frame");
            return;
        }
    };
    session.touch();

    let kind = frame.kind();
    let _ = Span::current().record("kind", kind.as_str());
    counter!(WS_FRAMES_TOTAL, "kind" => kind.as_str()).increment(1);
    debug!(room_id = frame.room_id, "dispatching frame");

    let result = match kind {
        FrameKind::Chat => handle_chat(ctx, session, frame).await,
        FrameKind::JoinRoom => handle_join(ctx, session, frame.room_id).await,
        FrameKind::LeaveRoom => {
            handle_leave(ctx, session, frame.room_id);
            Ok(())
        }
        FrameKind::Typing => handle_typing(ctx, session, frame.room_id),
        FrameKind::Ping => {
            let _ = session.send_frame(&OutboundFrame::pong());
            Ok(())
        }
        FrameKind::Unknown => {
            warn!(kind = %frame.kind, "ignoring unknown frame kind");
            Ok(())
        }
    };

    if let Err(e) = result {
        debug!(error = %e, "request rejected");
        let _ = session.send_frame(&OutboundFrame::error(e.to_string()));
    }
}

async fn handle_chat(
    ctx: &ChatContext,
    session: &Arc<ClientSession>,
    frame: InboundFrame,
) -> Result<(), ChatError> {
    if !session.is_in_room(&RoomKey::from(frame.room_id)) {
        return Err(ChatError::NotInRoom);
    }
    if frame.content.trim().is_empty() {
        return Err(ChatError::EmptyContent);
    }
    let _ = post_message(
        ctx,
        &session.user,
        frame.room_id,
        frame.content,
        frame.message_type.unwrap_or_default(),
        frame.reply_to_id,
        frame.metadata,
    )
    .await?;
    Ok(())
}

/// Authorize, persist and broadcast a chat message.
///
/// Shared by the WebSocket `chat` frame and the REST send endpoint. The
/// caller checks room-session membership and empty content. Nothing is
/// broadcast unless the message was saved.
pub async fn post_message(
    ctx: &ChatContext,
    user: &UserIdentity,
    room_id: RoomId,
    content: String,
    message_type: MessageType,
    reply_to_id: Option<u64>,
    metadata: Option<Value>,
) -> Result<ChatMessageEvent, ChatError> {
    let participant = ctx
        .store
        .participant(room_id, user.id)
        .await
        .map_err(ChatError::MembershipLookup)?
        .ok_or(ChatError::NotParticipant)?;
    if !participant.can_write() {
        return Err(ChatError::CannotSend);
    }

    let saved = ctx
        .store
        .save_message(NewMessage {
            room_id,
            sender_id: user.id,
            sender_name: user.username.clone(),
            content: content.clone(),
            message_type,
            reply_to_id,
            metadata,
        })
        .await
        .map_err(|e| {
            warn!(room_id, user_id = user.id, error = %e, "failed to save message");
            ChatError::SaveFailed(e)
        })?;

    if let Err(e) = ctx
        .store
        .touch_room_last_message(room_id, saved.created_at)
        .await
    {
        warn!(room_id, error = %e, "failed to update room last message time");
    }

    let event = ChatMessageEvent {
        message_id: saved.id,
        room_id,
        sender_id: user.id,
        sender_name: user.username.clone(),
        content,
        message_type,
        reply_to_id,
        created_at: saved.created_at,
        timestamp: Utc::now(),
    };
    let delivered = ctx
        .broadcaster
        .to_room(&RoomKey::from(room_id), &OutboundFrame::Message(event.clone()));
    counter!(CHAT_MESSAGES_TOTAL).increment(1);
    debug!(room_id, message_id = saved.id, delivered, "chat message broadcast");
    Ok(event)
}

async fn handle_join(
    ctx: &ChatContext,
    session: &Arc<ClientSession>,
    room_id: RoomId,
) -> Result<(), ChatError> {
    let _participant = ctx
        .store
        .participant(room_id, session.user.id)
        .await
        .map_err(ChatError::MembershipLookup)?
        .ok_or(ChatError::NotParticipant)?;

    let key = RoomKey::from(room_id);
    if !ctx.registry.rooms().join(session, &key) && session.is_closed() {
        return Ok(());
    }
    let _ = session.send_frame(&OutboundFrame::room_joined(room_id));
    let _ = ctx.broadcaster.to_room(
        &key,
        &OutboundFrame::UserJoined(PresenceEvent::now(
            room_id,
            session.user.id,
            &session.user.username,
        )),
    );
    Ok(())
}

fn handle_leave(ctx: &ChatContext, session: &Arc<ClientSession>, room_id: RoomId) {
    let key = RoomKey::from(room_id);
    let _ = ctx.registry.rooms().leave(session, &key);
    let _ = session.send_frame(&OutboundFrame::room_left(room_id));
    let _ = ctx.broadcaster.to_room(
        &key,
        &OutboundFrame::UserLeft(PresenceEvent::now(
            room_id,
            session.user.id,
            &session.user.username,
        )),
    );
}

fn handle_typing(
    ctx: &ChatContext,
    session: &Arc<ClientSession>,
    room_id: RoomId,
) -> Result<(), ChatError> {
    let key = RoomKey::from(room_id);
    if !session.is_in_room(&key) {
        return Err(ChatError::NotInRoom);
    }
    let _ = ctx.broadcaster.to_room_except(
        &key,
        session.user.id,
        &OutboundFrame::Typing(PresenceEvent::now(
            room_id,
            session.user.id,
            &session.user.username,
        )),
    );
    Ok(())
}
