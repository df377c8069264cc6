//! Per-connection session state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use taskhub_core::{ConnectionId, RoomKey, UserIdentity};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// One live WebSocket connection.
///
/// The session owns the sending half of its outbound queue. Teardown takes
/// the sender out, which closes the queue; the write loop drains what is
/// left and exits. The cancellation token stops the read loop.
pub struct ClientSession {
    /// Unique connection ID.
    pub conn_id: ConnectionId,
    /// Authenticated user.
    pub user: UserIdentity,
    /// When the connection was established.
    pub connected_at: Instant,
    tx: Mutex<Option<mpsc::Sender<Arc<String>>>>,
    cancel: CancellationToken,
    closed: AtomicBool,
    rooms: Mutex<HashSet<RoomKey>>,
    last_activity: Mutex<DateTime<Utc>>,
    dropped_messages: AtomicU64,
}

impl ClientSession {
    /// Create a session feeding the given outbound queue.
    pub fn new(user: UserIdentity, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            conn_id: ConnectionId::new(),
            user,
            connected_at: Instant::now(),
            tx: Mutex::new(Some(tx)),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            rooms: Mutex::new(HashSet::new()),
            last_activity: Mutex::new(Utc::now()),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Enqueue a pre-serialized frame without waiting.
    ///
    /// Returns `false` if the queue is full or already closed.
    pub fn send(&self, message: Arc<String>) -> bool {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        if tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize and enqueue a frame.
    pub fn send_frame<T: Serialize + ?Sized>(&self, frame: &T) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                warn!(conn_id = %self.conn_id, error = %e, "failed to serialize frame");
                false
            }
        }
    }

    /// Frames that could not be enqueued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Refresh the last-activity timestamp.
    pub fn touch(&self) {
        *self.last_activity.lock() = Utc::now();
    }

    /// Time of the last decoded inbound frame (or connection time).
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock()
    }

    /// Whether the session has joined `key`.
    pub fn is_in_room(&self, key: &RoomKey) -> bool {
        self.rooms.lock().contains(key)
    }

    /// Snapshot of joined rooms.
    pub fn joined_rooms(&self) -> Vec<RoomKey> {
        let mut rooms: Vec<RoomKey> = self.rooms.lock().iter().cloned().collect();
        rooms.sort();
        rooms
    }

    pub(crate) fn add_room(&self, key: RoomKey) {
        let _ = self.rooms.lock().insert(key);
    }

    pub(crate) fn remove_room(&self, key: &RoomKey) -> bool {
        self.rooms.lock().remove(key)
    }

    /// Flip the close-once guard. Only the first caller gets `true`.
    pub(crate) fn begin_close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Close the outbound queue and signal both loops to stop.
    pub(crate) fn shutdown_io(&self) {
        drop(self.tx.lock().take());
        self.cancel.cancel();
    }

    /// Ask the read loop to stop without tearing anything down.
    pub(crate) fn cancel_io(&self) {
        self.cancel.cancel();
    }

    /// Whether teardown has started.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Token cancelled when the session is torn down or its writer fails.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("conn_id", &self.conn_id)
            .field("user_id", &self.user.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn user(id: u64, name: &str) -> UserIdentity {
        UserIdentity {
            id,
            username: name.into(),
            role: "employee".into(),
        }
    }

    pub(crate) fn session_with_capacity(
        id: u64,
        capacity: usize,
    ) -> (Arc<ClientSession>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(ClientSession::new(user(id, &format!("user{id}")), tx)), rx)
    }

    pub(crate) fn session(id: u64) -> (Arc<ClientSession>, mpsc::Receiver<Arc<String>>) {
        session_with_capacity(id, 32)
    }

    #[tokio::test]
    async fn send_message_success() {
        let (s, mut rx) = session(1);
        assert!(s.send(Arc::new("hello".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn send_to_full_queue_counts_drop() {
        let (s, _rx) = session_with_capacity(1, 1);
        assert!(s.send(Arc::new("a".into())));
        assert!(!s.send(Arc::new("b".into())));
        assert_eq!(s.drop_count(), 1);
    }

    #[test]
    fn send_to_dropped_receiver_fails() {
        let (s, rx) = session(1);
        drop(rx);
        assert!(!s.send(Arc::new("a".into())));
    }

    #[tokio::test]
    async fn send_frame_serializes_json() {
        let (s, mut rx) = session(1);
        assert!(s.send_frame(&serde_json::json!({"type": "pong"})));
        let text = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "pong");
    }

    #[tokio::test]
    async fn shutdown_io_closes_queue_after_buffered_frames() {
        let (s, mut rx) = session(1);
        assert!(s.send(Arc::new("last".into())));
        s.shutdown_io();
        assert!(!s.send(Arc::new("late".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "last");
        assert!(rx.recv().await.is_none());
        assert!(s.cancellation().is_cancelled());
    }

    #[test]
    fn begin_close_only_once() {
        let (s, _rx) = session(1);
        assert!(!s.is_closed());
        assert!(s.begin_close());
        assert!(!s.begin_close());
        assert!(s.is_closed());
    }

    #[test]
    fn touch_advances_last_activity() {
        let (s, _rx) = session(1);
        let before = s.last_activity();
        std::thread::sleep(Duration::from_millis(5));
        s.touch();
        assert!(s.last_activity() > before);
    }

    #[test]
    fn room_set_bookkeeping() {
        let (s, _rx) = session(1);
        s.add_room(RoomKey::from(2));
        s.add_room(RoomKey::from(1));
        assert!(s.is_in_room(&RoomKey::from(1)));
        assert_eq!(s.joined_rooms(), vec![RoomKey::from(1), RoomKey::from(2)]);
        assert!(s.remove_room(&RoomKey::from(1)));
        assert!(!s.remove_room(&RoomKey::from(1)));
    }
}
