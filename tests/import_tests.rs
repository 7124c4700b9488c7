//! Workbook import tests
//!
//! Fixtures are written with rust_xlsxwriter using the column-pair layout:
//! row 1 product name, row 3 sub-headers, rows 4+ code/status.

use pretty_assertions::assert_eq;
use rust_xlsxwriter::Workbook;
use skc_ledger::config::LedgerConfig;
use skc_ledger::error::LedgerError;
use skc_ledger::excel::{import_upload, DataRow, SkcImporter};
use skc_ledger::store::{HierarchyStore, SqliteStore};
use skc_ledger::types::{Project, Status, User};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    config: LedgerConfig,
    store: SqliteStore,
    user: User,
    project: Project,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let config = LedgerConfig::rooted_at(dir.path());
    let store = SqliteStore::open(&config.database_path, Duration::from_secs(5)).unwrap();
    let user = store.create_user("alice").unwrap();
    let project = store.create_project(user.id, "Spring", None).unwrap();
    Fixture {
        dir,
        config,
        store,
        user,
        project,
    }
}

type Block<'a> = (&'a str, &'a [(&'a str, &'a str)]);

/// One worksheet, one column pair per block; empty strings leave the cell blank
fn write_blocks(path: &Path, blocks: &[Block]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (i, (name, rows)) in blocks.iter().enumerate() {
        let col = (i * 2) as u16;
        if !name.is_empty() {
            sheet.write_string(0, col, *name).unwrap();
        }
        sheet.write_string(2, col, "SKC").unwrap();
        sheet.write_string(2, col + 1, "状态").unwrap();
        for (offset, (code, status)) in rows.iter().enumerate() {
            let row = 3 + offset as u32;
            if !code.is_empty() {
                sheet.write_string(row, col, *code).unwrap();
            }
            if !status.is_empty() {
                sheet.write_string(row, col + 1, *status).unwrap();
            }
        }
    }
    workbook.save(path).unwrap();
}

fn workbook_at(fx: &Fixture, name: &str, blocks: &[Block]) -> PathBuf {
    let path = fx.dir.path().join(name);
    write_blocks(&path, blocks);
    path
}

// ═══════════════════════════════════════════════════════════════════════════
// RECONCILIATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_duplicate_within_batch_is_skipped() {
    let mut fx = fixture();
    let path = workbook_at(
        &fx,
        "batch.xlsx",
        &[
            ("Product A", &[("S1", "核价通过"), ("S1", "已下架")]),
            ("Product B", &[]),
        ],
    );

    let summary = import_upload(&mut fx.store, fx.user.id, fx.project.id, &path).unwrap();

    assert_eq!(summary.imported_count, 1);
    assert_eq!(summary.skipped_count, 1);
    assert_eq!(summary.products_created, 2);
    assert_eq!(summary.message(), "Imported 1 records, skipped 1 duplicates");

    let skc = fx.store.find_skc("S1").unwrap().unwrap();
    assert_eq!(skc.status, Status::PricingApproved);

    let products = fx.store.list_products(fx.project.id).unwrap();
    let names: Vec<_> = products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Product A", "Product B"]);
}

#[test]
fn test_reimport_is_idempotent() {
    let mut fx = fixture();
    let blocks: &[Block] = &[("Shoes", &[("SH-1", "核价通过"), ("SH-2", "价格待定")])];

    let first = workbook_at(&fx, "first.xlsx", blocks);
    let summary = import_upload(&mut fx.store, fx.user.id, fx.project.id, &first).unwrap();
    assert_eq!(summary.imported_count, 2);

    let second = workbook_at(&fx, "second.xlsx", blocks);
    let summary = import_upload(&mut fx.store, fx.user.id, fx.project.id, &second).unwrap();
    assert_eq!(summary.imported_count, 0);
    assert_eq!(summary.skipped_count, 2);
    assert_eq!(summary.products_created, 0);
    assert_eq!(fx.store.count_skcs().unwrap(), 2);
}

#[test]
fn test_code_owned_by_another_project_is_skipped() {
    let mut fx = fixture();
    let other = fx
        .store
        .create_project(fx.user.id, "Autumn", None)
        .unwrap();

    let first = workbook_at(&fx, "autumn.xlsx", &[("Boots", &[("X-1", "核价通过")])]);
    import_upload(&mut fx.store, fx.user.id, other.id, &first).unwrap();

    let second = workbook_at(&fx, "spring.xlsx", &[("Boots", &[("X-1", "已下架")])]);
    let summary = import_upload(&mut fx.store, fx.user.id, fx.project.id, &second).unwrap();
    assert_eq!(summary.skipped_count, 1);

    // original record untouched
    let skc = fx.store.find_skc("X-1").unwrap().unwrap();
    assert_eq!(skc.status, Status::PricingApproved);
}

#[test]
fn test_unknown_status_falls_back_to_default() {
    let mut fx = fixture();
    let path = workbook_at(
        &fx,
        "status.xlsx",
        &[("Hats", &[("H-1", "sold out"), ("H-2", "减少库存为0")])],
    );

    let summary = import_upload(&mut fx.store, fx.user.id, fx.project.id, &path).unwrap();
    assert_eq!(summary.imported_count, 2);
    assert_eq!(summary.defaulted_status_count, 1);

    assert_eq!(
        fx.store.find_skc("H-1").unwrap().unwrap().status,
        Status::PricingApproved
    );
    assert_eq!(
        fx.store.find_skc("H-2").unwrap().unwrap().status,
        Status::StockZeroed
    );
}

#[test]
fn test_half_filled_rows_are_incomplete() {
    let mut fx = fixture();
    let path = workbook_at(
        &fx,
        "half.xlsx",
        &[("Bags", &[("B-1", ""), ("", "已下架"), ("", ""), ("B-4", "改过体积")])],
    );

    let summary = import_upload(&mut fx.store, fx.user.id, fx.project.id, &path).unwrap();
    assert_eq!(summary.imported_count, 1);
    assert_eq!(summary.incomplete_count, 2);
    assert_eq!(summary.skipped_count, 0);
    assert!(fx.store.find_skc("B-1").unwrap().is_none());
}

#[test]
fn test_existing_product_is_reused() {
    let mut fx = fixture();
    let existing = fx.store.create_product(fx.project.id, "Socks").unwrap();

    let path = workbook_at(&fx, "socks.xlsx", &[("Socks", &[("SO-1", "拉过库存")])]);
    let summary = import_upload(&mut fx.store, fx.user.id, fx.project.id, &path).unwrap();

    assert_eq!(summary.products_created, 0);
    let skc = fx.store.find_skc("SO-1").unwrap().unwrap();
    assert_eq!(skc.product_id, existing.id);
}

// ═══════════════════════════════════════════════════════════════════════════
// LAYOUT DECODING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_pair_without_header_is_ignored() {
    let fx = fixture();
    let path = workbook_at(
        &fx,
        "gap.xlsx",
        &[
            ("Left", &[("L-1", "核价通过")]),
            ("", &[("ORPHAN", "核价通过")]),
            ("Right", &[("R-1", "已下架")]),
        ],
    );

    let sheets = SkcImporter::new(&path).read_layout().unwrap();
    assert_eq!(sheets.len(), 1);
    let names: Vec<_> = sheets[0].blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["Left", "Right"]);
    assert_eq!(sheets[0].blocks[1].pair.code, 5);
}

#[test]
fn test_odd_trailing_column_opens_a_pair() {
    let fx = fixture();
    let path = fx.dir.path().join("odd.xlsx");
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Pair").unwrap();
    sheet.write_string(3, 0, "P-1").unwrap();
    sheet.write_string(3, 1, "核价通过").unwrap();
    // header in column C only; its status column D is never written
    sheet.write_string(0, 2, "Lonely").unwrap();
    sheet.write_string(3, 2, "LO-1").unwrap();
    workbook.save(&path).unwrap();

    let sheets = SkcImporter::new(&path).read_layout().unwrap();
    let blocks = &sheets[0].blocks;
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[1].name, "Lonely");
    assert_eq!(blocks[1].rows, vec![DataRow::Incomplete { row: 4 }]);
}

#[test]
fn test_numeric_codes_read_as_typed() {
    let mut fx = fixture();
    let path = fx.dir.path().join("numeric.xlsx");
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Numbers").unwrap();
    sheet.write_number(3, 0, 10042).unwrap();
    sheet.write_string(3, 1, "核价通过").unwrap();
    workbook.save(&path).unwrap();

    let summary = import_upload(&mut fx.store, fx.user.id, fx.project.id, &path).unwrap();
    assert_eq!(summary.imported_count, 1);
    assert!(fx.store.find_skc("10042").unwrap().is_some());
}

#[test]
fn test_every_sheet_is_scanned() {
    let mut fx = fixture();
    let path = fx.dir.path().join("sheets.xlsx");
    let mut workbook = Workbook::new();
    for (sheet_name, product, code) in [("One", "Cups", "C-1"), ("Two", "Cups", "C-2")] {
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name).unwrap();
        sheet.write_string(0, 0, product).unwrap();
        sheet.write_string(3, 0, code).unwrap();
        sheet.write_string(3, 1, "核价通过").unwrap();
    }
    workbook.save(&path).unwrap();

    let summary = import_upload(&mut fx.store, fx.user.id, fx.project.id, &path).unwrap();
    assert_eq!(summary.imported_count, 2);
    assert_eq!(summary.products_created, 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// FAILURE PATHS AND INPUT CLEANUP
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_input_removed_after_success() {
    let mut fx = fixture();
    let path = workbook_at(&fx, "ok.xlsx", &[("Mugs", &[("M-1", "核价通过")])]);

    import_upload(&mut fx.store, fx.user.id, fx.project.id, &path).unwrap();
    assert!(!path.exists());
}

#[test]
fn test_corrupt_workbook_fails_and_removes_input() {
    let mut fx = fixture();
    let path = fx.dir.path().join("broken.xlsx");
    std::fs::write(&path, b"not a zip archive").unwrap();

    let err = import_upload(&mut fx.store, fx.user.id, fx.project.id, &path).unwrap_err();
    assert!(matches!(err, LedgerError::Workbook(_)));
    assert!(!path.exists());
    assert!(fx.store.list_products(fx.project.id).unwrap().is_empty());
}

#[test]
fn test_failure_mid_workbook_rolls_back_created_rows() {
    let mut fx = fixture();
    let conn = rusqlite::Connection::open(&fx.config.database_path).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_hats BEFORE INSERT ON products WHEN NEW.name = 'Hats'
         BEGIN SELECT RAISE(ABORT, 'products disabled'); END;",
    )
    .unwrap();
    let path = workbook_at(
        &fx,
        "partial.xlsx",
        &[
            ("Shoes", &[("SH-1", "核价通过"), ("SH-2", "已下架")]),
            ("Hats", &[("HA-1", "核价通过")]),
        ],
    );

    let err = import_upload(&mut fx.store, fx.user.id, fx.project.id, &path).unwrap_err();

    assert!(matches!(err, LedgerError::Storage(_)));
    assert!(!path.exists());
    assert!(fx.store.list_products(fx.project.id).unwrap().is_empty());
    assert_eq!(fx.store.find_skc("SH-1").unwrap(), None);
    assert_eq!(fx.store.count_skcs().unwrap(), 0);
}

#[test]
fn test_workbook_decoded_before_taking_write_lock() {
    let fx = fixture();
    let mut store =
        SqliteStore::open(&fx.config.database_path, Duration::from_millis(100)).unwrap();
    let locker = rusqlite::Connection::open(&fx.config.database_path).unwrap();
    locker.execute_batch("BEGIN IMMEDIATE").unwrap();
    let path = fx.dir.path().join("broken.xlsx");
    std::fs::write(&path, b"not a zip archive").unwrap();

    let err = import_upload(&mut store, fx.user.id, fx.project.id, &path).unwrap_err();

    assert!(matches!(err, LedgerError::Workbook(_)));
    assert!(!path.exists());
    locker.execute_batch("ROLLBACK").unwrap();
}

#[test]
fn test_unknown_project_fails_and_removes_input() {
    let mut fx = fixture();
    let path = workbook_at(&fx, "lost.xlsx", &[("Mugs", &[("M-1", "核价通过")])]);

    let err = import_upload(&mut fx.store, fx.user.id, 9999, &path).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    assert!(!path.exists());
    assert_eq!(fx.store.count_skcs().unwrap(), 0);
}

#[test]
fn test_foreign_project_is_not_found() {
    let mut fx = fixture();
    let mallory = fx.store.create_user("mallory").unwrap();
    let path = workbook_at(&fx, "steal.xlsx", &[("Mugs", &[("M-1", "核价通过")])]);

    let err = import_upload(&mut fx.store, mallory.id, fx.project.id, &path).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn test_unsupported_extension_is_rejected() {
    let mut fx = fixture();
    let path = fx.dir.path().join("codes.csv");
    std::fs::write(&path, "SKC,状态\n").unwrap();

    let err = import_upload(&mut fx.store, fx.user.id, fx.project.id, &path).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert!(!path.exists());
}

// ═══════════════════════════════════════════════════════════════════════════
// CONCURRENCY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_concurrent_imports_have_one_winner() {
    let fx = fixture();
    let workbooks: Vec<PathBuf> = (0..4)
        .map(|i| {
            workbook_at(
                &fx,
                &format!("race_{}.xlsx", i),
                &[("Racers", &[("RACE-1", "核价通过")])],
            )
        })
        .collect();

    let handles: Vec<_> = workbooks
        .into_iter()
        .map(|path| {
            let config = fx.config.clone();
            let (user_id, project_id) = (fx.user.id, fx.project.id);
            thread::spawn(move || {
                let mut store =
                    SqliteStore::open(&config.database_path, Duration::from_secs(30)).unwrap();
                import_upload(&mut store, user_id, project_id, &path).unwrap()
            })
        })
        .collect();

    let summaries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let imported: usize = summaries.iter().map(|s| s.imported_count).sum();
    let skipped: usize = summaries.iter().map(|s| s.skipped_count).sum();

    assert_eq!(imported, 1);
    assert_eq!(skipped, 3);
    assert_eq!(fx.store.count_skcs().unwrap(), 1);
    assert_eq!(fx.store.list_products(fx.project.id).unwrap().len(), 1);
}
