//! Grid layout shared by import and export.
//!
//! A worksheet is a sequence of product blocks, each occupying a column pair:
//!
//! ```text
//!          col c          col c+1
//! row 1    product name (merged across the pair)
//! row 2    primary image (export only)
//! row 3    "SKC"          "状态"
//! row 4..  code           status
//! ```
//!
//! Rows and columns here are 1-based, as a spreadsheet user sees them.
//! Conversions to the 0-based indices of calamine / rust_xlsxwriter happen
//! through [`ColumnPair`] and [`row_index`].

use calamine::Data;

use crate::types::Status;

pub const HEADER_ROW: u32 = 1;
pub const IMAGE_ROW: u32 = 2;
pub const SUBHEADER_ROW: u32 = 3;
pub const FIRST_DATA_ROW: u32 = 4;

pub const CODE_SUBHEADER: &str = "SKC";
pub const STATUS_SUBHEADER: &str = "状态";

/// Square thumbnail edge in pixels
pub const THUMBNAIL_PX: u32 = 100;
/// Height of the image row, in points
pub const IMAGE_ROW_HEIGHT: f64 = 80.0;
/// Width of a column carrying an image, in character units
pub const IMAGE_COLUMN_WIDTH: f64 = 15.0;

/// Two adjacent columns holding one product's codes and statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnPair {
    /// 1-based column of the codes (and of the header)
    pub code: u32,
    /// 1-based column of the statuses
    pub status: u32,
}

impl ColumnPair {
    /// The `n`th pair, 0-based: 0 → (1, 2), 1 → (3, 4), …
    pub fn nth(n: usize) -> Self {
        let code = n as u32 * 2 + 1;
        Self {
            code,
            status: code + 1,
        }
    }

    pub fn code_index(&self) -> u16 {
        (self.code - 1) as u16
    }

    pub fn status_index(&self) -> u16 {
        (self.status - 1) as u16
    }

    /// Letter reference of the code column ("A", "C", …)
    pub fn code_letter(&self) -> String {
        column_letter(self.code_index() as usize)
    }
}

/// Pairs covering columns `1..=last_column`. An odd last column still opens
/// a pair; its status column simply reads as empty.
pub fn column_pairs(last_column: u32) -> impl Iterator<Item = ColumnPair> {
    let count = (last_column as usize).div_ceil(2);
    (0..count).map(ColumnPair::nth)
}

/// 0-based row index for a 1-based row
pub fn row_index(row: u32) -> u32 {
    row - 1
}

/// Convert column index to Excel column letter (0→A, 1→B, 25→Z, 26→AA, etc.)
pub fn column_letter(n: usize) -> String {
    let mut result = String::new();
    let mut num = n;

    loop {
        let remainder = num % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if num < 26 {
            break;
        }
        num = num / 26 - 1;
    }

    result
}

/// Text content of a cell, trimmed. `None` for empty, blank, or error cells.
pub fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => format_number(*f),
        Data::Int(i) => i.to_string(),
        Data::Bool(true) => "TRUE".to_string(),
        Data::Bool(false) => "FALSE".to_string(),
        other => other.to_string().trim().to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Integral floats lose the fractional part so numeric codes read as typed
fn format_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Lenient status resolution used by import: unknown labels fall back to the
/// default status. The flag reports whether the fallback was applied.
pub fn resolve_status(label: &str) -> (Status, bool) {
    match Status::from_label(label.trim()) {
        Some(status) => (status, false),
        None => (Status::default(), true),
    }
}
