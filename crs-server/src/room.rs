use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

struct Member {
    id: u64,
    writer: Arc<AsyncMutex<OwnedWriteHalf>>,
}

/// Owns one room's listening socket, its connected members, and the
/// dispatcher task that accepts new connections and fans out chat bytes.
///
/// Member sockets are exclusively owned by the room once registered
/// (spec.md §3); `members` is a `parking_lot::Mutex` rather than the
/// registry's async lock because every access here is a quick push/remove,
/// never held across an `.await`.
pub struct Room {
    pub name: String,
    pub port: u16,
    members: SyncMutex<Vec<Member>>,
    next_member_id: AtomicU64,
    accept_task: JoinHandle<()>,
}

impl Room {
    /// Spawns the dispatcher task and returns the owning handle.
    pub fn spawn(name: String, port: u16, listener: TcpListener) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            let accept_task = tokio::spawn(async move {
                accept_loop(listener, weak).await;
            });

            Self {
                name,
                port,
                members: SyncMutex::new(Vec::new()),
                next_member_id: AtomicU64::new(0),
                accept_task,
            }
        })
    }

    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }

    fn add_member(&self, id: u64, writer: Arc<AsyncMutex<OwnedWriteHalf>>) {
        self.members.lock().push(Member { id, writer });
    }

    fn remove_member(&self, id: u64) {
        self.members.lock().retain(|m| m.id != id);
    }

    /// Fans `bytes` (received verbatim from `sender_id`) out to every other
    /// current member, in the order registered; no re-framing happens.
    async fn broadcast(&self, sender_id: u64, bytes: &[u8]) {
        let targets: Vec<(u64, Arc<AsyncMutex<OwnedWriteHalf>>)> = self
            .members
            .lock()
            .iter()
            .filter(|m| m.id != sender_id)
            .map(|m| (m.id, m.writer.clone()))
            .collect();

        for (id, writer) in targets {
            let mut writer = writer.lock().await;
            if let Err(e) = writer.write_all(bytes).await {
                if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::BrokenPipe) {
                    self.remove_member(id);
                } else {
                    log::warn!("room {}: write to member {id} failed: {e}", self.name);
                }
            }
        }
    }

    /// Stops accepting new connections, sends a DELETE teardown frame to
    /// every member, and closes all member sockets.
    pub async fn teardown(&self) {
        self.accept_task.abort();

        let members: Vec<Arc<AsyncMutex<OwnedWriteHalf>>> =
            self.members.lock().drain(..).map(|m| m.writer).collect();

        let frame = crs_wire::encode_delete_teardown();
        for writer in members {
            let mut writer = writer.lock().await;
            let _ = writer.write_all(&frame).await;
            let _ = writer.shutdown().await;
        }
    }
}

async fn accept_loop(listener: TcpListener, room: std::sync::Weak<Room>) {
    loop {
        let (socket, _addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("room accept failed: {e}");
                continue;
            }
        };

        let Some(room) = room.upgrade() else {
            break;
        };

        let _ = socket.set_nodelay(true);
        let (reader, writer) = socket.into_split();
        let writer = Arc::new(AsyncMutex::new(writer));
        let id = room.next_member_id.fetch_add(1, Ordering::Relaxed);
        room.add_member(id, writer);

        tokio::spawn(member_read_loop(room, id, reader));
    }
}

async fn member_read_loop(room: Arc<Room>, id: u64, mut reader: tokio::net::tcp::OwnedReadHalf) {
    let mut buf = vec![0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => room.broadcast(id, &buf[..n]).await,
            Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::BrokenPipe) => break,
            Err(e) => {
                log::warn!("room {}: read from member {id} failed: {e}", room.name);
                break;
            }
        }
    }

    room.remove_member(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpStream;

    async fn spawn_room() -> Arc<Room> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Room::spawn("r1".to_string(), port, listener)
    }

    #[tokio::test]
    async fn fan_out_excludes_sender() {
        let room = spawn_room().await;

        let mut a = TcpStream::connect(("127.0.0.1", room.port)).await.unwrap();
        let mut b = TcpStream::connect(("127.0.0.1", room.port)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        a.write_all(b"hello\0").await.unwrap();

        let mut buf = [0u8; 16];
        let n = b.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello\0");

        // `a` should not see its own message; confirm `b`'s send doesn't
        // arrive back at `a` either.
        b.write_all(b"hi\0").await.unwrap();
        let n = a.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hi\0");
    }

    #[tokio::test]
    async fn teardown_sends_delete_tag_and_closes() {
        let room = spawn_room().await;
        let mut a = TcpStream::connect(("127.0.0.1", room.port)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        room.teardown().await;

        let mut buf = [0u8; 16];
        let n = a.read(&mut buf).await.unwrap();
        assert!(crs_wire::is_delete_tag(&buf[..n]));

        let n = a.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
