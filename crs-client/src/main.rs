use clap::Parser;

/// Chat-room service interactive client.
///
/// Example: crs-client localhost 9000
#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// Control server host.
    host: String,
    /// Control server port.
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    simple_logger::init_with_level(log::Level::Warn)?;
    crs_client::run(&cli.host, cli.port).await
}
