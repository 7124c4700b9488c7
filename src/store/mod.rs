//! Hierarchy store: the persistence boundary the spreadsheet codec talks to.
//!
//! The codec only reads and creates through [`HierarchyStore`]; lifecycle of
//! projects, products, and SKCs belongs to the store.

mod sqlite;

use std::path::PathBuf;

use crate::error::LedgerResult;
use crate::types::{Product, Skc, Status};

pub use sqlite::{SqliteStore, StoreTx};

/// Outcome of inserting an SKC under the global code-uniqueness constraint
#[derive(Debug, Clone, PartialEq)]
pub enum SkcInsert {
    Created(Skc),
    /// The storage constraint rejected the code (another writer got there first)
    Conflict,
}

pub trait HierarchyStore {
    /// Exact name match within the project
    fn resolve_product(&self, project_id: i64, name: &str) -> LedgerResult<Option<Product>>;

    fn create_product(&self, project_id: i64, name: &str) -> LedgerResult<Product>;

    /// Looks across every project and product, not just the caller's
    fn code_exists_globally(&self, code: &str) -> LedgerResult<bool>;

    fn create_skc(&self, product_id: i64, code: &str, status: Status) -> LedgerResult<SkcInsert>;

    /// Products in storage order
    fn list_products(&self, project_id: i64) -> LedgerResult<Vec<Product>>;

    /// SKCs ordered by status precedence, then code
    fn list_skcs(&self, product_id: i64) -> LedgerResult<Vec<Skc>>;

    fn primary_image_path(&self, product_id: i64) -> LedgerResult<Option<PathBuf>>;
}
