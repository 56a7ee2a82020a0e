use std::path::PathBuf;

use clap::Parser;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Social-network service gRPC server.
///
/// Example: sns-server -p 3010
#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// Port the gRPC server listens on.
    #[arg(short = 'p', long, default_value_t = 3010)]
    port: u16,

    /// Directory holding the user index and per-user `.usr` files.
    #[arg(short, long, default_value = "sns-data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    simple_logger::init_with_level(log::Level::Info)?;
    sns_server::run(cli.port, cli.data_dir).await
}
