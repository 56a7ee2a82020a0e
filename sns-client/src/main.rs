use clap::Parser;

/// Social-network service interactive client.
///
/// Example: sns-client -h localhost -u alice -p 3010
#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// Server host.
    #[arg(short = 'h', long, default_value = "localhost")]
    host: String,

    /// Username to log in as.
    #[arg(short = 'u', long, default_value = "default")]
    username: String,

    /// Server port.
    #[arg(short = 'p', long, default_value = "3010")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    simple_logger::init_with_level(log::Level::Warn)?;
    sns_client::run(&cli.host, cli.port, &cli.username).await
}
