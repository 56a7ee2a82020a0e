mod service;

use std::net::SocketAddr;
use std::sync::Arc;

use sns_core::{Persistence, UserRegistry};
use sns_proto::proto::sns_service_server::SnsServiceServer;
use tonic::transport::Server;

pub use service::SnsServiceImpl;

/// Loads persisted state from `data_dir` and serves the `SnsService` gRPC
/// API on `0.0.0.0:port` until the process is killed.
pub async fn run(port: u16, data_dir: std::path::PathBuf) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let persistence = Persistence::new(data_dir);
    let registry: Arc<UserRegistry> = UserRegistry::load(persistence).await?;

    log::info!("sns-server listening on {addr}");
    Server::builder()
        .add_service(SnsServiceServer::new(SnsServiceImpl::new(registry)))
        .serve(addr)
        .await?;

    Ok(())
}
