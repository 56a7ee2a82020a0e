pub mod control;
pub mod registry;
pub mod room;

pub use registry::{RegistryError, RoomRegistry};

/// Starts the control server on `port`, blocking until it errors out.
pub async fn run(port: u16) -> anyhow::Result<()> {
    let registry = RoomRegistry::new();
    control::run(port, registry).await
}
