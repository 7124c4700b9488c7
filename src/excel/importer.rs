//! Excel importer implementation - workbook → products and SKCs

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::layout::{self, ColumnPair, FIRST_DATA_ROW, HEADER_ROW};
use crate::config::{has_extension, WORKBOOK_EXTENSIONS};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{HierarchyStore, SkcInsert, SqliteStore};

//==============================================================================
// Decoded layout
//==============================================================================

/// A data row below a product header
#[derive(Debug, Clone, PartialEq)]
pub enum DataRow {
    Record { row: u32, code: String, status: String },
    /// Exactly one of code / status present
    Incomplete { row: u32 },
}

/// One product's column pair, decoded
#[derive(Debug, Clone, PartialEq)]
pub struct ProductBlock {
    pub name: String,
    pub pair: ColumnPair,
    pub rows: Vec<DataRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub name: String,
    pub blocks: Vec<ProductBlock>,
}

//==============================================================================
// Reconciliation outcomes
//==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Code already present when checked
    Duplicate,
    /// Code accepted by the check but rejected by the storage constraint
    Conflict,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Created { id: i64, status_defaulted: bool },
    Skipped(SkipReason),
    Incomplete,
}

/// Aggregate counts of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported_count: usize,
    pub skipped_count: usize,
    pub incomplete_count: usize,
    pub defaulted_status_count: usize,
    pub products_created: usize,
}

impl ImportSummary {
    pub fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Created {
                status_defaulted, ..
            } => {
                self.imported_count += 1;
                if *status_defaulted {
                    self.defaulted_status_count += 1;
                }
            }
            RowOutcome::Skipped(_) => self.skipped_count += 1,
            RowOutcome::Incomplete => self.incomplete_count += 1,
        }
    }

    pub fn message(&self) -> String {
        let mut message = format!("Imported {} records", self.imported_count);
        if self.skipped_count > 0 {
            message.push_str(&format!(", skipped {} duplicates", self.skipped_count));
        }
        message
    }
}

//==============================================================================
// Importer
//==============================================================================

/// Reads a column-pair workbook and reconciles it into the hierarchy store
pub struct SkcImporter {
    path: PathBuf,
}

impl SkcImporter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Decode every worksheet into product blocks, in workbook order
    pub fn read_layout(&self) -> LedgerResult<Vec<SheetLayout>> {
        let mut workbook: Xlsx<_> = open_workbook(&self.path)?;
        let sheet_names = workbook.sheet_names().to_vec();

        let mut sheets = Vec::with_capacity(sheet_names.len());
        for sheet_name in sheet_names {
            let range = workbook.worksheet_range(&sheet_name)?;
            sheets.push(decode_sheet(&sheet_name, &range));
        }
        Ok(sheets)
    }

    /// Import into `project_id`. Callers own the transaction boundary.
    pub fn import<S: HierarchyStore + ?Sized>(
        &self,
        store: &S,
        project_id: i64,
    ) -> LedgerResult<ImportSummary> {
        let sheets = self.read_layout()?;
        reconcile_layout(store, project_id, &sheets)
    }
}

/// Reconcile decoded sheets into `project_id`, creating products on demand
pub fn reconcile_layout<S: HierarchyStore + ?Sized>(
    store: &S,
    project_id: i64,
    sheets: &[SheetLayout],
) -> LedgerResult<ImportSummary> {
    let mut summary = ImportSummary::default();

    for block in sheets.iter().flat_map(|sheet| &sheet.blocks) {
        let product = match store.resolve_product(project_id, &block.name)? {
            Some(product) => product,
            None => {
                summary.products_created += 1;
                store.create_product(project_id, &block.name)?
            }
        };

        for row in &block.rows {
            let outcome = match row {
                DataRow::Record { code, status, .. } => {
                    reconcile_row(store, product.id, code, status)?
                }
                DataRow::Incomplete { .. } => RowOutcome::Incomplete,
            };
            summary.record(&outcome);
        }
    }

    Ok(summary)
}

/// Decode one worksheet. Header-less pairs are dropped along with their data.
pub fn decode_sheet(name: &str, range: &Range<Data>) -> SheetLayout {
    let mut blocks = Vec::new();
    let Some((last_row, last_col)) = range.end() else {
        return SheetLayout {
            name: name.to_string(),
            blocks,
        };
    };
    // end() is 0-based; layout works in 1-based rows/columns
    let (last_row, last_col) = (last_row + 1, last_col + 1);

    let cell = |row: u32, col: u32| -> Option<String> {
        range
            .get_value((row - 1, col - 1))
            .and_then(layout::cell_text)
    };

    for pair in layout::column_pairs(last_col) {
        let Some(product_name) = cell(HEADER_ROW, pair.code) else {
            continue;
        };

        let mut rows = Vec::new();
        for row in FIRST_DATA_ROW..=last_row {
            match (cell(row, pair.code), cell(row, pair.status)) {
                (Some(code), Some(status)) => rows.push(DataRow::Record { row, code, status }),
                (None, None) => {}
                _ => rows.push(DataRow::Incomplete { row }),
            }
        }

        blocks.push(ProductBlock {
            name: product_name,
            pair,
            rows,
        });
    }

    SheetLayout {
        name: name.to_string(),
        blocks,
    }
}

/// Decide the fate of one record: skip a known code, otherwise create it
/// with its status (or the default when the label is unknown).
pub fn reconcile_row<S: HierarchyStore + ?Sized>(
    store: &S,
    product_id: i64,
    code: &str,
    status: &str,
) -> LedgerResult<RowOutcome> {
    let code = code.trim();
    if store.code_exists_globally(code)? {
        return Ok(RowOutcome::Skipped(SkipReason::Duplicate));
    }

    let (status, status_defaulted) = layout::resolve_status(status);

    match store.create_skc(product_id, code, status)? {
        SkcInsert::Created(skc) => Ok(RowOutcome::Created {
            id: skc.id,
            status_defaulted,
        }),
        SkcInsert::Conflict => Ok(RowOutcome::Skipped(SkipReason::Conflict)),
    }
}

//==============================================================================
// Uploaded-file import
//==============================================================================

/// Uploaded input file, removed when dropped
struct TempInput {
    path: PathBuf,
}

impl Drop for TempInput {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove import input");
            }
        }
    }
}

/// Import an uploaded workbook as one atomic unit.
///
/// The file at `path` is deleted whatever the outcome. Every product and SKC
/// created by this call is rolled back if any step fails.
pub fn import_upload(
    store: &mut SqliteStore,
    user_id: i64,
    project_id: i64,
    path: &Path,
) -> LedgerResult<ImportSummary> {
    let input = TempInput {
        path: path.to_path_buf(),
    };

    if !has_extension(&input.path, &WORKBOOK_EXTENSIONS) {
        return Err(LedgerError::Validation(format!(
            "Unsupported workbook format: {}",
            input.path.display()
        )));
    }
    let project = store.find_project(user_id, project_id)?;

    info!(project = %project.name, file = %input.path.display(), "importing workbook");

    // Decode outside the write lock
    let sheets = SkcImporter::new(&input.path).read_layout()?;

    let tx = store.transaction()?;
    let summary = reconcile_layout(&tx, project.id, &sheets)?;
    tx.touch_project(project.id)?;
    tx.commit()?;

    info!(
        imported = summary.imported_count,
        skipped = summary.skipped_count,
        incomplete = summary.incomplete_count,
        "import finished"
    );
    Ok(summary)
}
