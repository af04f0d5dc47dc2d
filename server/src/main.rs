use clap::Parser;
use log::info;
use server::network::GameServer;

// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// UDP port of the primary socket; the secondary binds to port + 1
    #[clap(short, long, default_value = "47800")]
    port: u16,

    /// Maximum number of concurrently advertised games
    #[clap(short, long, default_value = "512")]
    max_games: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    // Print a message about setting RUST_LOG if not set
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Warning: RUST_LOG environment variable not set. Set it to display logs!");
        eprintln!("Recommended: RUST_LOG=info cargo run");
    }

    let args = Args::parse();
    info!("Starting lobby server on port {}", args.port);

    let mut server = GameServer::bind(args.port, args.max_games).await?;
    server.run().await;

    Ok(())
}
