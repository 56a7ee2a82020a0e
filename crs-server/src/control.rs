use std::net::SocketAddr;
use std::sync::Arc;

use crs_wire::{Command, Status};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::registry::{RegistryError, RoomRegistry};

/// Accepts one connection per control client, decodes command frames, and
/// replies with RESPONSE frames (spec.md §4.3). Recognised commands are
/// CREATE, DELETE, JOIN, LIST; JOIN terminates the handler regardless of
/// outcome, all others keep the connection open for further commands.
pub async fn run(port: u16, registry: Arc<RoomRegistry>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("control server listening on {port}");

    loop {
        let (socket, addr) = listener.accept().await?;
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, addr, registry).await {
                log::warn!("control connection {addr} ended: {e}");
            }
        });
    }
}

async fn handle_client(
    mut socket: TcpStream,
    addr: SocketAddr,
    registry: Arc<RoomRegistry>,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; 4096];

    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let command = match crs_wire::decode_command(&buf[..n]) {
            Ok(command) => command,
            Err(_) => {
                socket
                    .write_all(&crs_wire::encode_response_status(Status::FailureInvalid))
                    .await?;
                continue;
            }
        };

        log::debug!("{addr}: {command:?}");

        match command {
            Command::Create(name) => {
                let status = match registry.create(&name).await {
                    Ok(()) => Status::Success,
                    Err(RegistryError::AlreadyExists) => Status::FailureAlreadyExists,
                    Err(_) => Status::FailureUnknown,
                };
                socket
                    .write_all(&crs_wire::encode_response_status(status))
                    .await?;
            }
            Command::Delete(name) => {
                let status = match registry.delete(&name).await {
                    Ok(()) => Status::Success,
                    Err(RegistryError::NotExists) => Status::FailureNotExists,
                    Err(_) => Status::FailureUnknown,
                };
                socket
                    .write_all(&crs_wire::encode_response_status(status))
                    .await?;
            }
            Command::List => {
                let names = registry.list().await;
                socket
                    .write_all(&crs_wire::encode_response_list(&names))
                    .await?;
            }
            Command::Join(name) => {
                match registry.join(&name).await {
                    Ok((port, member_count)) => {
                        socket
                            .write_all(&crs_wire::encode_response_join_success(port, member_count))
                            .await?;
                    }
                    Err(_) => {
                        socket
                            .write_all(&crs_wire::encode_response_status(Status::FailureNotExists))
                            .await?;
                    }
                }
                // Per spec.md §4.3 the handler terminates after JOIN
                // regardless of whether it succeeded.
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_wire::{PendingRequest, ResponseTail};

    async fn start() -> (Arc<RoomRegistry>, SocketAddr) {
        let registry = RoomRegistry::new();
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let reg = registry.clone();
        tokio::spawn(async move {
            loop {
                let (socket, peer) = listener.accept().await.unwrap();
                let reg = reg.clone();
                tokio::spawn(handle_client(socket, peer, reg));
            }
        });
        (registry, addr)
    }

    #[tokio::test]
    async fn create_then_list_then_delete() {
        let (_registry, addr) = start().await;

        let mut conn = TcpStream::connect(addr).await.unwrap();
        conn.write_all(&crs_wire::encode_create("r1")).await.unwrap();
        let mut buf = [0u8; 64];
        let n = conn.read(&mut buf).await.unwrap();
        let resp = crs_wire::decode_response(&buf[..n], PendingRequest::Create).unwrap();
        assert_eq!(resp.status, crs_wire::Status::Success);

        conn.write_all(&crs_wire::encode_list()).await.unwrap();
        let n = conn.read(&mut buf).await.unwrap();
        let resp = crs_wire::decode_response(&buf[..n], PendingRequest::List).unwrap();
        assert_eq!(resp.tail, ResponseTail::List(vec!["r1".to_string()]));

        conn.write_all(&crs_wire::encode_delete("r1")).await.unwrap();
        let n = conn.read(&mut buf).await.unwrap();
        let resp = crs_wire::decode_response(&buf[..n], PendingRequest::Delete).unwrap();
        assert_eq!(resp.status, crs_wire::Status::Success);

        conn.write_all(&crs_wire::encode_list()).await.unwrap();
        let n = conn.read(&mut buf).await.unwrap();
        let resp = crs_wire::decode_response(&buf[..n], PendingRequest::List).unwrap();
        assert_eq!(resp.tail, ResponseTail::List(Vec::new()));
    }

    #[tokio::test]
    async fn join_terminates_handler_after_response() {
        let (_registry, addr) = start().await;

        let mut conn = TcpStream::connect(addr).await.unwrap();
        conn.write_all(&crs_wire::encode_create("r1")).await.unwrap();
        let mut buf = [0u8; 64];
        conn.read(&mut buf).await.unwrap();

        conn.write_all(&crs_wire::encode_join("r1")).await.unwrap();
        let n = conn.read(&mut buf).await.unwrap();
        let resp = crs_wire::decode_response(&buf[..n], PendingRequest::Join).unwrap();
        assert!(matches!(resp.tail, ResponseTail::Join { .. }));

        // Handler returned; the connection should now be closed from the
        // server side.
        conn.write_all(&crs_wire::encode_list()).await.unwrap();
        let n = conn.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn join_unknown_room_fails_not_exists() {
        let (_registry, addr) = start().await;
        let mut conn = TcpStream::connect(addr).await.unwrap();
        conn.write_all(&crs_wire::encode_join("ghost")).await.unwrap();
        let mut buf = [0u8; 64];
        let n = conn.read(&mut buf).await.unwrap();
        let resp = crs_wire::decode_response(&buf[..n], PendingRequest::Join).unwrap();
        assert_eq!(resp.status, crs_wire::Status::FailureNotExists);
    }
}
