//! Spreadsheet interchange codec
//!
//! Bidirectional mapping between the project hierarchy and a
//! two-column-per-product worksheet grid:
//! - Import: workbook (.xlsx / .xlsm) → products and SKCs
//! - Export: project → workbook (.xlsx) with merged headers and thumbnails

mod exporter;
mod importer;
pub mod layout;

pub use exporter::{export_filename, export_project, secure_filename, sheet_name, ProjectExporter};
pub use importer::{
    decode_sheet, import_upload, reconcile_layout, reconcile_row, DataRow, ImportSummary,
    ProductBlock, RowOutcome, SheetLayout, SkcImporter, SkipReason,
};
