//! SKC Ledger API Server module
//!
//! HTTP REST surface over the spreadsheet codec.
//! Run with `skc serve` or `skc-server`.

pub mod handlers;
pub mod server;

pub use server::{build_router, init_tracing, run_api_server, ApiConfig, AppState};
