//! WebSocket session lifecycle: one read loop and one write loop per client,
//! from upgrade through teardown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use taskhub_core::{OutboundFrame, UserIdentity};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{Span, debug, info, instrument, warn};

use super::connection::ClientSession;
use super::handler::{ChatContext, handle_frame};
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

type WsSink = SplitSink<WebSocket, Message>;

/// Run a session for an upgraded, authenticated socket.
///
/// 1. Registers the session (tearing down any older session for the user).
///    A rejected registration gets an `error` frame and a close instead.
/// 2. Sends the `welcome` frame
/// 3. Spawns the write loop and runs the read loop on this task
/// 4. Unregisters on read-loop exit, then waits for the writer to drain
///
/// The read loop is the only path that starts teardown for its own session;
/// other paths (slow consumer, replacement, shutdown) go through the same
/// idempotent [`ConnectionRegistry::unregister`](super::registry::ConnectionRegistry::unregister)
/// and cancel the read loop.
#[instrument(skip_all, fields(conn_id, user_id = user.id))]
pub async fn run_session(
    socket: WebSocket,
    user: UserIdentity,
    ctx: Arc<ChatContext>,
    config: Arc<ServerConfig>,
) {
    let (ws_tx, ws_rx) = socket.split();
    let (tx, rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity.max(1));
    let session = Arc::new(ClientSession::new(user, tx));
    let _ = Span::current().record("conn_id", tracing::field::display(&session.conn_id));

    info!(username = %session.user.username, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let admitted = match ctx.registry.register(Arc::clone(&session)) {
        Ok(_) => {
            let _ = session.send_frame(&OutboundFrame::welcome(
                session.user.id,
                &session.user.username,
            ));
            true
        }
        Err(e) => {
            warn!(error = %e, "session rejected");
            let _ = session.send_frame(&OutboundFrame::error(e.to_string()));
            false
        }
    };

    let writer = tokio::spawn(write_loop(
        ws_tx,
        rx,
        Arc::clone(&session),
        Arc::clone(&config),
    ));

    if admitted {
        read_loop(ws_rx, &session, &ctx, &config).await;
    }

    let _ = ctx.registry.unregister(&session);
    if let Err(e) = writer.await {
        warn!(error = %e, "write loop task failed");
    }

    info!(
        dropped = session.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(session.age().as_secs_f64());
}

async fn read_loop(
    mut ws_rx: futures::stream::SplitStream<WebSocket>,
    session: &Arc<ClientSession>,
    ctx: &ChatContext,
    config: &ServerConfig,
) {
    let cancel = session.cancellation();
    let idle = config.pong_wait();
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                debug!("read loop cancelled");
                break;
            }
            next = timeout(idle, ws_rx.next()) => next,
        };
        let msg = match next {
            Err(_) => {
                info!(idle_secs = idle.as_secs(), "idle timeout, closing session");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "socket read failed");
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => handle_frame(ctx, session, text.as_str()).await,
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => handle_frame(ctx, session, text).await,
                Err(_) => warn!(len = data.len(), "dropping non-UTF8 binary frame"),
            },
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

async fn write_loop(
    mut ws_tx: WsSink,
    mut rx: mpsc::Receiver<Arc<String>>,
    session: Arc<ClientSession>,
    config: Arc<ServerConfig>,
) {
    let write_timeout = config.write_timeout();
    let mut ping = tokio::time::interval(config.ping_interval());
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            next = rx.recv() => {
                let Some(first) = next else {
                    let _ = timeout(write_timeout, ws_tx.send(Message::Close(None))).await;
                    break;
                };
                let payload = coalesce(&first, &mut rx);
                if !send_with_timeout(&mut ws_tx, Message::Text(payload.into()), write_timeout).await {
                    break;
                }
            }
            _ = ping.tick() => {
                if !send_with_timeout(&mut ws_tx, Message::Ping(Vec::new().into()), write_timeout).await {
                    break;
                }
            }
        }
    }

    session.cancel_io();
    let _ = timeout(write_timeout, ws_tx.close()).await;
}

/// Join `first` and everything already queued behind it with `\n`.
fn coalesce(first: &str, rx: &mut mpsc::Receiver<Arc<String>>) -> String {
    let mut payload = String::from(first);
    while let Ok(next) = rx.try_recv() {
        payload.push('\n');
        payload.push_str(&next);
    }
    payload
}

async fn send_with_timeout(ws_tx: &mut WsSink, msg: Message, limit: Duration) -> bool {
    match timeout(limit, ws_tx.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "socket write failed");
            false
        }
        Err(_) => {
            warn!(timeout_secs = limit.as_secs(), "socket write timed out");
            false
        }
    }
}
