use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::room::Room;

/// Lower bound of the candidate-port scan, matching the reference
/// implementation's starting point.
const PORT_SCAN_START: u16 = 1024;

/// Upper (exclusive) bound of the candidate-port scan.
const PORT_SCAN_END: u16 = 65534;

#[derive(Debug)]
pub enum RegistryError {
    AlreadyExists,
    NotExists,
    /// The 1024..65534 scan range was exhausted without finding a free port.
    ResourceExhausted,
    Io(std::io::Error),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for RegistryError {}

struct Inner {
    rooms: HashMap<String, Arc<Room>>,
    next_candidate_port: u16,
}

/// Process-wide mapping from room name to `Room`. A single lock guards both
/// the name map and the port counter (spec.md §4.1); the lock is released
/// before any blocking send to a client socket happens elsewhere.
pub struct RoomRegistry {
    inner: Mutex<Inner>,
}

impl RoomRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                rooms: HashMap::new(),
                next_candidate_port: PORT_SCAN_START,
            }),
        })
    }

    /// Creates a room, scanning upward from `nextCandidatePort` for a free
    /// TCP listener. Only `AddrInUse` triggers a retry; any other bind
    /// error is propagated.
    pub async fn create(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;

        if inner.rooms.contains_key(name) {
            return Err(RegistryError::AlreadyExists);
        }

        let mut candidate = inner.next_candidate_port;
        let listener = loop {
            if candidate >= PORT_SCAN_END {
                return Err(RegistryError::ResourceExhausted);
            }

            match TcpListener::bind(("0.0.0.0", candidate)).await {
                Ok(listener) => break listener,
                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    candidate += 1;
                    continue;
                }
                Err(e) => return Err(RegistryError::Io(e)),
            }
        };

        inner.next_candidate_port = candidate + 1;
        let room = Room::spawn(name.to_string(), candidate, listener);
        inner.rooms.insert(name.to_string(), room);
        Ok(())
    }

    /// Deletes a room: stops its dispatcher, tears down every member.
    pub async fn delete(&self, name: &str) -> Result<(), RegistryError> {
        let room = {
            let mut inner = self.inner.lock().await;
            inner.rooms.remove(name).ok_or(RegistryError::NotExists)?
        };

        room.teardown().await;
        Ok(())
    }

    /// Returns the room's port and its current member count.
    pub async fn join(&self, name: &str) -> Result<(u16, u32), RegistryError> {
        let inner = self.inner.lock().await;
        let room = inner.rooms.get(name).ok_or(RegistryError::NotExists)?;
        Ok((room.port, room.member_count() as u32))
    }

    /// Returns the names of all live rooms, in arbitrary order.
    pub async fn list(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.rooms.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_rejects_duplicate_name() {
        let registry = RoomRegistry::new();
        registry.create("r1").await.unwrap();
        assert!(matches!(
            registry.create("r1").await,
            Err(RegistryError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn delete_unknown_room_fails() {
        let registry = RoomRegistry::new();
        assert!(matches!(
            registry.delete("ghost").await,
            Err(RegistryError::NotExists)
        ));
    }

    #[tokio::test]
    async fn join_returns_port_and_member_count() {
        let registry = RoomRegistry::new();
        registry.create("r1").await.unwrap();
        let (port, members) = registry.join("r1").await.unwrap();
        assert!(port >= PORT_SCAN_START);
        assert_eq!(members, 0);
    }

    #[tokio::test]
    async fn two_rooms_get_distinct_ports() {
        let registry = RoomRegistry::new();
        registry.create("r1").await.unwrap();
        registry.create("r2").await.unwrap();
        let (p1, _) = registry.join("r1").await.unwrap();
        let (p2, _) = registry.join("r2").await.unwrap();
        assert_ne!(p1, p2);
    }

    #[tokio::test]
    async fn delete_then_recreate_succeeds() {
        let registry = RoomRegistry::new();
        registry.create("r1").await.unwrap();
        registry.delete("r1").await.unwrap();
        registry.create("r1").await.unwrap();
    }
}
