use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use debug_bridge_core::{BridgeConfig, DebugBridge};
use debugger_mcp_server::{DapHost, ProtocolRouter, ServerConfig, SseServer};

#[derive(Parser, Debug)]
#[command(name = "debugger_mcp_server", version, about = "Debugger control server over SSE")]
struct Args {
    /// Interface to bind (overrides DEBUG_MCP_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides DEBUG_MCP_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Workspace root; repeat for several. The first one hosts launch.json.
    #[arg(long = "workspace")]
    workspaces: Vec<PathBuf>,

    /// Debug adapter command line (overrides DAP_ADAPTER_CMD)
    #[arg(long)]
    adapter_cmd: Option<String>,

    /// Per tool call timeout in milliseconds (overrides DEBUG_MCP_CALL_TIMEOUT_MS)
    #[arg(long)]
    call_timeout_ms: Option<u64>,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(cmd) = &self.adapter_cmd {
            config.adapter_command = Some(cmd.clone());
        }
        config
    }

    fn bridge_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::from_env();
        if !self.workspaces.is_empty() {
            config.workspace_roots = self.workspaces.clone();
        }
        if let Some(ms) = self.call_timeout_ms {
            config.call_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let server_config = args.server_config();
    let bridge_config = args.bridge_config();

    let workspace_root = bridge_config
        .workspace_roots
        .first()
        .cloned()
        .context("at least one workspace root is required")?;
    tracing::info!("Workspace root: {}", workspace_root.display());

    let host = Arc::new(DapHost::new(workspace_root, server_config.adapter_command.clone()));
    let bridge = DebugBridge::new(host.clone(), bridge_config);
    let router = Arc::new(ProtocolRouter::new(bridge));
    let server = SseServer::new(router, server_config.clone());

    let status = server
        .start(server_config.port)
        .await
        .context("failed to start SSE server")?;
    if let Some(address) = status.address {
        tracing::info!("Debugger server ready at http://{}/sse", address);
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    server.stop().await;
    host.shutdown().await;
    Ok(())
}
