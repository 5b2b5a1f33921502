use clap::{Parser, Subcommand};
use netshow::api::ApiServer;
use netshow::app::App;
use netshow::errors::ServiceError;
use netshow::mcp::server::run_stdio;
use netshow::mcp::sse::SseServer;

/// Read-only show command executor for Cisco network devices
#[derive(Parser)]
#[command(name = "netshow", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        /// Address to bind; overrides API_HOST
        #[arg(long)]
        host: Option<String>,
        /// Port to bind; overrides API_PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Speak MCP over stdin/stdout
    Mcp,
    /// Serve MCP over HTTP with Server-Sent Events
    McpSse {
        /// Address to bind; overrides MCP_HOST
        #[arg(long)]
        host: Option<String>,
        /// Port to bind; overrides MCP_PORT
        #[arg(long)]
        port: Option<u16>,
    },
}

async fn run(cli: Cli) -> Result<(), ServiceError> {
    let app = App::initialize()?;
    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| app.settings.api_host.clone());
            let port = port.unwrap_or(app.settings.api_port);
            ApiServer::new(app, host, port).run().await
        }
        Command::Mcp => run_stdio(app).await,
        Command::McpSse { host, port } => {
            let host = host.unwrap_or_else(|| app.settings.mcp_host.clone());
            let port = port.unwrap_or(app.settings.mcp_port);
            SseServer::new(app, host, port).run().await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("netshow: {}", err);
        std::process::exit(1);
    }
}
