//! SKC Ledger API Server binary
//!
//! HTTP REST API for the spreadsheet import/export codec.

use clap::Parser;
use skc_ledger::api::{run_api_server, ApiConfig};
use skc_ledger::config::LedgerConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "skc-server")]
#[command(version)]
#[command(about = "SKC Ledger API Server - HTTP REST API for SKC workbook import/export")]
#[command(long_about = r#"
SKC Ledger API Server - HTTP REST API

Provides RESTful endpoints for the workbook codec:
  - POST /api/v1/projects/{id}/import     - Import an .xlsx (multipart field "excel")
  - POST /api/v1/projects/{id}/export     - Export a project to .xlsx
  - GET  /api/v1/exports/{id}/download    - Download a stored export
  - GET  /api/v1/stats                    - Counts for the acting user

Additional endpoints:
  - GET  /health           - Health check
  - GET  /version          - Server version info

Every /api/v1 request identifies the acting user with an x-user-id header.

Features:
  - CORS enabled for cross-origin requests
  - Graceful shutdown on SIGINT/SIGTERM
  - JSON response format with request IDs
  - Tracing and structured logging

Example usage:
  skc-server                           # Start on localhost:8080
  skc-server --host 0.0.0.0 --port 3000

  curl -X POST http://localhost:8080/api/v1/projects/1/import \
    -H "x-user-id: 1" \
    -F "excel=@catalog.xlsx"
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "SKC_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "SKC_PORT")]
    port: u16,

    /// YAML config file (defaults apply when omitted)
    #[arg(short, long, env = "SKC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let ledger = LedgerConfig::load(args.config.as_deref())?;
    let config = ApiConfig {
        host: args.host,
        port: args.port,
    };

    run_api_server(config, ledger).await
}
