use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::LedgerError;

//==============================================================================
// Status
//==============================================================================

/// Closed, ordered set of SKC status labels.
///
/// Declaration order is the precedence used for default sorting, and the
/// first entry is the fallback applied by spreadsheet import.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Status {
    #[default]
    #[serde(rename = "核价通过")]
    PricingApproved,
    #[serde(rename = "拉过库存")]
    StockPulled,
    #[serde(rename = "已下架")]
    Delisted,
    #[serde(rename = "价格待定")]
    PricePending,
    #[serde(rename = "减少库存为0")]
    StockZeroed,
    #[serde(rename = "改过体积")]
    VolumeChanged,
    #[serde(rename = "价格错误")]
    PriceError,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::PricingApproved,
        Status::StockPulled,
        Status::Delisted,
        Status::PricePending,
        Status::StockZeroed,
        Status::VolumeChanged,
        Status::PriceError,
    ];

    /// The business label stored in the database and written to workbooks
    pub fn label(self) -> &'static str {
        match self {
            Status::PricingApproved => "核价通过",
            Status::StockPulled => "拉过库存",
            Status::Delisted => "已下架",
            Status::PricePending => "价格待定",
            Status::StockZeroed => "减少库存为0",
            Status::VolumeChanged => "改过体积",
            Status::PriceError => "价格错误",
        }
    }

    /// Exact label match, no trimming or case folding
    pub fn from_label(label: &str) -> Option<Status> {
        Status::ALL.into_iter().find(|s| s.label() == label)
    }

    /// Position in the precedence order (0 = first)
    pub fn precedence(self) -> usize {
        self as usize
    }

    pub fn labels() -> Vec<&'static str> {
        Status::ALL.iter().map(|s| s.label()).collect()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::from_label(s)
            .ok_or_else(|| LedgerError::Validation(format!("Unknown status '{}'", s)))
    }
}

//==============================================================================
// Hierarchy entities
//==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub user_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub project_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skc {
    pub id: i64,
    pub code: String,
    pub status: Status,
    pub product_id: i64,
}

impl Skc {
    /// Status precedence first, code as tie-break
    pub fn precedence_cmp(a: &Skc, b: &Skc) -> Ordering {
        a.status.cmp(&b.status).then_with(|| a.code.cmp(&b.code))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductImage {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_path: PathBuf,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub product_id: i64,
    pub is_primary: bool,
}

/// Persisted record of a generated export workbook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportManifest {
    pub id: i64,
    pub filename: String,
    pub file_path: PathBuf,
    pub project_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub file_size: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserStats {
    pub project_count: i64,
    pub product_count: i64,
    pub skc_count: i64,
    pub image_count: i64,
}

/// Result of a direct (non-spreadsheet) bulk SKC create
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AddSkcsOutcome {
    pub added_count: usize,
    pub duplicate_codes: Vec<String>,
}

impl AddSkcsOutcome {
    pub fn message(&self) -> String {
        let mut message = format!("Added {} SKCs", self.added_count);
        if !self.duplicate_codes.is_empty() {
            let shown: Vec<&str> = self
                .duplicate_codes
                .iter()
                .take(5)
                .map(String::as_str)
                .collect();
            message.push_str(&format!(", skipped duplicates: {}", shown.join(", ")));
            if self.duplicate_codes.len() > 5 {
                message.push_str(&format!(" ({} in total)", self.duplicate_codes.len()));
            }
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_order_matches_precedence() {
        let mut shuffled = vec![Status::PriceError, Status::PricingApproved, Status::Delisted];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![Status::PricingApproved, Status::Delisted, Status::PriceError]
        );
        assert_eq!(Status::PricingApproved.precedence(), 0);
        assert_eq!(Status::PriceError.precedence(), 6);
    }

    #[test]
    fn test_status_default_is_first_label() {
        assert_eq!(Status::default(), Status::ALL[0]);
        assert_eq!(Status::default().label(), "核价通过");
    }

    #[test]
    fn test_status_from_label_is_exact() {
        assert_eq!(Status::from_label("已下架"), Some(Status::Delisted));
        assert_eq!(Status::from_label(" 已下架"), None);
        assert_eq!(Status::from_label("unknown-value"), None);
    }

    #[test]
    fn test_status_from_str_rejects_unknown() {
        let err = "delisted".parse::<Status>().unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!("价格错误".parse::<Status>().unwrap(), Status::PriceError);
    }

    #[test]
    fn test_status_serializes_as_label() {
        let json = serde_json::to_string(&Status::StockZeroed).unwrap();
        assert_eq!(json, "\"减少库存为0\"");
    }

    #[test]
    fn test_skc_precedence_cmp() {
        let skc = |code: &str, status| Skc {
            id: 0,
            code: code.to_string(),
            status,
            product_id: 1,
        };
        let mut skcs = vec![
            skc("B", Status::Delisted),
            skc("C", Status::PricingApproved),
            skc("A", Status::Delisted),
        ];
        skcs.sort_by(Skc::precedence_cmp);
        let codes: Vec<&str> = skcs.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_add_skcs_message_truncates_duplicates() {
        let outcome = AddSkcsOutcome {
            added_count: 2,
            duplicate_codes: (1..=7).map(|i| format!("D{}", i)).collect(),
        };
        assert_eq!(
            outcome.message(),
            "Added 2 SKCs, skipped duplicates: D1, D2, D3, D4, D5 (7 in total)"
        );
    }
}
