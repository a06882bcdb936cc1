//! Room-based fan-out for WebSocket connections.
//!
//! Every connection owns a bounded channel. Rooms are sets of connection
//! ids; emitting to a room serializes the frame once and pushes it into
//! each member's channel. A member whose channel is full misses that frame.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Frames buffered per connection before new ones are dropped.
pub const CONNECTION_BUFFER: usize = 64;

pub type ConnectionId = u64;

pub fn user_room(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

pub fn course_room(course_id: Uuid) -> String {
    format!("course:{}", course_id)
}

/// Outgoing frame.
#[derive(Serialize)]
struct Frame<'a, T: Serialize> {
    event: &'a str,
    data: &'a T,
}

/// Incoming frame. `data` is the course id for the room events.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Option<String>,
}

struct Member {
    sender: mpsc::Sender<Arc<str>>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct Rooms {
    members: HashMap<ConnectionId, Member>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    rooms: RwLock<Rooms>,
}

/// Shared registry of live connections and their rooms.
#[derive(Clone, Default)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns the receiving end of its channel.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(CONNECTION_BUFFER);

        let mut rooms = self.inner.rooms.write().unwrap_or_else(PoisonError::into_inner);
        rooms.members.insert(
            id,
            Member {
                sender,
                rooms: HashSet::new(),
            },
        );
        (id, receiver)
    }

    pub fn join(&self, id: ConnectionId, room: String) {
        let mut guard = self.inner.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let rooms = &mut *guard;
        let Some(member) = rooms.members.get_mut(&id) else {
            return;
        };
        member.rooms.insert(room.clone());
        rooms.rooms.entry(room).or_default().insert(id);
    }

    pub fn leave(&self, id: ConnectionId, room: &str) {
        let mut guard = self.inner.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let rooms = &mut *guard;
        if let Some(member) = rooms.members.get_mut(&id) {
            member.rooms.remove(room);
        }
        remove_from_room(&mut rooms.rooms, room, id);
    }

    /// Drops the connection and its memberships.
    pub fn disconnect(&self, id: ConnectionId) {
        let mut guard = self.inner.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let rooms = &mut *guard;
        if let Some(member) = rooms.members.remove(&id) {
            for room in &member.rooms {
                remove_from_room(&mut rooms.rooms, room, id);
            }
        }
    }

    pub fn room_size(&self, room: &str) -> usize {
        let rooms = self.inner.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms.rooms.get(room).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        let rooms = self.inner.rooms.read().unwrap_or_else(PoisonError::into_inner);
        rooms.members.len()
    }

    /// Sends `{event, data}` to every connection in `room`.
    ///
    /// Returns how many connections accepted the frame.
    pub fn emit<T: Serialize>(&self, room: &str, event: &str, data: &T) -> usize {
        let frame: Arc<str> = match sonic_rs::to_string(&Frame { event, data }) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!("Failed to encode {} frame: {}", event, e);
                return 0;
            }
        };

        let rooms = self.inner.rooms.read().unwrap_or_else(PoisonError::into_inner);
        let Some(ids) = rooms.rooms.get(room) else {
            return 0;
        };

        let mut delivered = 0;
        for id in ids {
            let Some(member) = rooms.members.get(id) else {
                continue;
            };
            match member.sender.try_send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Connection {} is lagging; dropped {} frame", id, event);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        tracing::debug!("📣 {} -> {} ({} delivered)", event, room, delivered);
        delivered
    }

    pub fn emit_to_user<T: Serialize>(&self, user_id: Uuid, event: &str, data: &T) -> usize {
        self.emit(&user_room(user_id), event, data)
    }

    pub fn emit_to_course<T: Serialize>(&self, course_id: Uuid, event: &str, data: &T) -> usize {
        self.emit(&course_room(course_id), event, data)
    }
}

fn remove_from_room(
    rooms: &mut HashMap<String, HashSet<ConnectionId>>,
    room: &str,
    id: ConnectionId,
) {
    if let Some(ids) = rooms.get_mut(room) {
        ids.remove(&id);
        if ids.is_empty() {
            rooms.remove(room);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload {
        title: &'static str,
    }

    #[tokio::test]
    async fn emits_reach_every_room_member() {
        let hub = NotificationHub::new();
        let course = Uuid::new_v4();
        let (a, mut rx_a) = hub.connect();
        let (b, mut rx_b) = hub.connect();
        let (_c, mut rx_c) = hub.connect();

        hub.join(a, course_room(course));
        hub.join(b, course_room(course));

        let delivered = hub.emit_to_course(course, "course-updated", &Payload { title: "Rust 101" });
        assert_eq!(delivered, 2);

        let frame = rx_a.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["event"], "course-updated");
        assert_eq!(json["data"]["title"], "Rust 101");
        assert_eq!(&*rx_b.recv().await.unwrap(), &*frame);
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn leaving_and_disconnecting_clean_up_rooms() {
        let hub = NotificationHub::new();
        let user = Uuid::new_v4();
        let course = Uuid::new_v4();
        let (id, _rx) = hub.connect();

        hub.join(id, user_room(user));
        hub.join(id, course_room(course));
        assert_eq!(hub.room_size(&course_room(course)), 1);

        hub.leave(id, &course_room(course));
        assert_eq!(hub.room_size(&course_room(course)), 0);
        assert_eq!(hub.emit_to_course(course, "ping", &()), 0);

        hub.disconnect(id);
        assert_eq!(hub.room_size(&user_room(user)), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn unknown_connections_cannot_join() {
        let hub = NotificationHub::new();
        hub.join(42, "course:x".to_string());
        assert_eq!(hub.room_size("course:x"), 0);
    }

    #[test]
    fn full_channels_drop_frames_instead_of_blocking() {
        let hub = NotificationHub::new();
        let user = Uuid::new_v4();
        let (id, _rx) = hub.connect();
        hub.join(id, user_room(user));

        for _ in 0..CONNECTION_BUFFER {
            assert_eq!(hub.emit_to_user(user, "tick", &1), 1);
        }
        assert_eq!(hub.emit_to_user(user, "tick", &1), 0);
    }

    #[test]
    fn client_frames_parse_with_and_without_data() {
        let join: ClientFrame =
            serde_json::from_str(r#"{"event":"join-course","data":"abc"}"#).unwrap();
        assert_eq!(join.event, "join-course");
        assert_eq!(join.data.as_deref(), Some("abc"));

        let bare: ClientFrame = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert!(bare.data.is_none());
    }
}
