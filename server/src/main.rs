use clap::Parser;
use log::{error, info};
use server::network::Server;

/// Main-method of the application.
/// Parses command-line arguments, binds the listener and serves clients
/// until the process is interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "4080")]
        port: u16,
        /// In-game day length in seconds, reported in the time handshake
        #[clap(short, long, default_value = "600")]
        day_length: u32,
    }

    env_logger::init();

    // Parse command line arguments
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, args.day_length).await?;

    // Handle shutdown gracefully
    tokio::select! {
        _ = server.run() => {
            error!("accept loop terminated unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
