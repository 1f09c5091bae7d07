//! CLI for RelayChat
//!
//! Subcommands:
//! - `server`: run the relay server
//! - `client`: connect to a relay and chat from the terminal

use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use relaychat::client::{ChatClient, LineProducer};
use relaychat::config::{Settings, load_config};
use relaychat::transport::start_websocket_server;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "relaychat", about = "A minimal WebSocket chat relay")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the relay server
    Server(AddrArgs),
    /// Connect to a relay server and chat from the terminal
    Client {
        #[command(flatten)]
        addr: AddrArgs,
        /// Full WebSocket URL, overrides --host and --port
        #[arg(long)]
        url: Option<String>,
    },
}

#[derive(Args)]
struct AddrArgs {
    /// Host to bind or connect to (default from config: 127.0.0.1)
    #[arg(long)]
    host: Option<String>,
    /// Port to bind or connect to (default from config: 8000)
    #[arg(long)]
    port: Option<u16>,
}

impl AddrArgs {
    fn apply(self, mut settings: Settings) -> Settings {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        settings
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    relaychat::utils::logging::init(&cli.log_level);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Command::Server(addr) => run_server(addr).await,
            Command::Client { addr, url } => run_client(addr, url).await,
        }
    });
    // the stdin producer may still be blocked on a read
    runtime.shutdown_background();

    ExitCode::from(exit_status(&result))
}

/// 0 on success, 1 on any failure (which is logged).
fn exit_status(result: &Result<(), Box<dyn std::error::Error>>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            1
        }
    }
}

async fn run_server(addr: AddrArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = addr.apply(load_config()?);
    let server_addr = settings.server_addr();

    tokio::select! {
        result = start_websocket_server(&server_addr, settings.relay.clone()) => {
            result?;
            error!("Relay server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_client(addr: AddrArgs, url: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let settings = addr.apply(load_config()?);
    let url = url.unwrap_or_else(|| settings.server_url());
    let timeout = Duration::from_secs(settings.client.connect_timeout_secs);

    let mut client = ChatClient::connect(&url, timeout).await?;
    let mut incoming = client.listen()?;
    let producer = client.spawn_producer(LineProducer::stdin())?;
    println!("Connected to {url}. Type a message and press enter, ctrl-d to quit.");

    let display = async {
        while let Some(message) = incoming.next().await {
            println!("{message}");
        }
    };

    tokio::select! {
        _ = display => {
            info!("Server closed the connection.");
        }
        _ = producer => {
            info!("Input closed.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted.");
        }
    }

    client.close().await;
    Ok(())
}
