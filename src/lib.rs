//! SKC Ledger - product SKC inventory tracker with a spreadsheet codec
//!
//! Users own projects, projects group products, and each product carries a
//! list of SKC codes with a status. Projects move in and out of `.xlsx`
//! workbooks laid out as one two-column block per product.
//!
//! # Features
//!
//! - Import: column-pair workbooks → products and globally unique SKCs
//! - Export: project → workbook with merged headers and product thumbnails
//! - SQLite persistence with the code-uniqueness constraint as final arbiter
//! - CLI (`skc`) and HTTP API (`skc-server`)
//!
//! # Example
//!
//! ```no_run
//! use skc_ledger::excel::import_upload;
//! use skc_ledger::store::SqliteStore;
//! use std::path::Path;
//! use std::time::Duration;
//!
//! let mut store = SqliteStore::open("skc_ledger.db", Duration::from_secs(5))?;
//! let summary = import_upload(&mut store, 1, 1, Path::new("uploads/temp/catalog.xlsx"))?;
//!
//! println!("{}", summary.message());
//! # Ok::<(), skc_ledger::error::LedgerError>(())
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod excel;
pub mod store;
pub mod types;
pub mod upload;

// Re-export commonly used types
pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use types::{ExportManifest, Product, Project, Skc, Status};
