//! Hierarchy store integration tests

use pretty_assertions::assert_eq;
use skc_ledger::error::LedgerError;
use skc_ledger::store::{HierarchyStore, SqliteStore};
use skc_ledger::types::{Product, Status, User};
use std::path::Path;

fn setup() -> (SqliteStore, User, Product) {
    let store = SqliteStore::open_in_memory().unwrap();
    let user = store.create_user("alice").unwrap();
    let project = store.create_project(user.id, "Spring", None).unwrap();
    let product = store.create_product(project.id, "Shoes").unwrap();
    (store, user, product)
}

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// DIRECT BULK CREATE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_add_skcs_reports_duplicates() {
    let (mut store, _, product) = setup();
    store
        .add_skcs(product.id, &codes(&["A1"]), "核价通过")
        .unwrap();

    let outcome = store
        .add_skcs(product.id, &codes(&["A1", "A2", " ", "A3"]), "已下架")
        .unwrap();

    assert_eq!(outcome.added_count, 2);
    assert_eq!(outcome.duplicate_codes, vec!["A1".to_string()]);
    // existing code keeps its status
    assert_eq!(store.find_skc("A1").unwrap().unwrap().status, Status::PricingApproved);
    assert_eq!(store.find_skc("A3").unwrap().unwrap().status, Status::Delisted);
}

#[test]
fn test_add_skcs_duplicate_message_truncates() {
    let (mut store, _, product) = setup();
    let all: Vec<String> = (0..7).map(|i| format!("D{}", i)).collect();
    store.add_skcs(product.id, &all, "核价通过").unwrap();

    let outcome = store.add_skcs(product.id, &all, "核价通过").unwrap();
    let message = outcome.message();
    assert!(message.contains("D0, D1, D2, D3, D4"));
    assert!(!message.contains("D5"));
    assert!(message.contains("7"));
}

#[test]
fn test_add_skcs_rejects_unknown_status() {
    let (mut store, _, product) = setup();
    let err = store
        .add_skcs(product.id, &codes(&["A1"]), "on sale")
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(store.count_skcs().unwrap(), 0);
}

#[test]
fn test_add_skcs_rejects_empty_list() {
    let (mut store, _, product) = setup();
    assert!(matches!(
        store.add_skcs(product.id, &[], "核价通过"),
        Err(LedgerError::Validation(_))
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// BATCH STATUS UPDATE AND DELETE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_batch_update_status_is_strict() {
    let (mut store, user, product) = setup();
    store
        .add_skcs(product.id, &codes(&["A1", "A2"]), "核价通过")
        .unwrap();

    let err = store
        .batch_update_status(user.id, &codes(&["A1"]), "whatever")
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(store.find_skc("A1").unwrap().unwrap().status, Status::PricingApproved);

    let updated = store
        .batch_update_status(user.id, &codes(&["A1", "A2", "MISSING"]), "价格错误")
        .unwrap();
    assert_eq!(updated, 2);
    assert_eq!(store.find_skc("A2").unwrap().unwrap().status, Status::PriceError);
}

#[test]
fn test_batch_update_ignores_other_users_skcs() {
    let (mut store, _, product) = setup();
    let mallory = store.create_user("mallory").unwrap();
    store
        .add_skcs(product.id, &codes(&["A1"]), "核价通过")
        .unwrap();

    let err = store
        .batch_update_status(mallory.id, &codes(&["A1"]), "已下架")
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn test_batch_delete_frees_codes() {
    let (mut store, user, product) = setup();
    store
        .add_skcs(product.id, &codes(&["A1", "A2"]), "核价通过")
        .unwrap();

    assert_eq!(store.batch_delete(user.id, &codes(&["A1"])).unwrap(), 1);
    assert!(!store.code_exists_globally("A1").unwrap());
    assert!(store.code_exists_globally("A2").unwrap());

    let outcome = store
        .add_skcs(product.id, &codes(&["A1"]), "核价通过")
        .unwrap();
    assert_eq!(outcome.added_count, 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// IMAGES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_first_image_becomes_primary() {
    let (mut store, _, product) = setup();
    let first = store
        .add_image(product.id, Path::new("/img/a.png"), "a.png", Some("image/png"))
        .unwrap();
    let second = store
        .add_image(product.id, Path::new("/img/b.png"), "b.png", Some("image/png"))
        .unwrap();

    assert!(first.is_primary);
    assert!(!second.is_primary);
    assert_eq!(
        store.primary_image_path(product.id).unwrap(),
        Some(Path::new("/img/a.png").to_path_buf())
    );
}

#[test]
fn test_set_primary_image_keeps_one_primary() {
    let (mut store, user, product) = setup();
    store
        .add_image(product.id, Path::new("/img/a.png"), "a.png", None)
        .unwrap();
    let second = store
        .add_image(product.id, Path::new("/img/b.png"), "b.png", None)
        .unwrap();

    store.set_primary_image(user.id, second.id).unwrap();

    let images = store.list_images(product.id).unwrap();
    let primaries: Vec<_> = images.iter().filter(|i| i.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].id, second.id);
    assert_eq!(images[0].id, second.id);
}

#[test]
fn test_set_primary_image_unknown_is_not_found() {
    let (mut store, user, _) = setup();
    assert!(matches!(
        store.set_primary_image(user.id, 99),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn test_product_without_images_has_no_primary() {
    let (store, _, product) = setup();
    assert_eq!(store.primary_image_path(product.id).unwrap(), None);
}

// ═══════════════════════════════════════════════════════════════════════════
// STATS AND EXPORT RECORDS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_user_stats_counts_active_projects_only() {
    let (mut store, user, product) = setup();
    store
        .add_skcs(product.id, &codes(&["A1", "A2"]), "核价通过")
        .unwrap();
    store
        .add_image(product.id, Path::new("/img/a.png"), "a.png", None)
        .unwrap();
    let archived = store.create_project(user.id, "Old", None).unwrap();
    store.create_product(archived.id, "Legacy").unwrap();
    store.archive_project(user.id, archived.id).unwrap();

    let stats = store.user_stats(user.id).unwrap();
    assert_eq!(stats.project_count, 1);
    assert_eq!(stats.product_count, 1);
    assert_eq!(stats.skc_count, 2);
    assert_eq!(stats.image_count, 1);
}

#[test]
fn test_archived_project_stops_resolving() {
    let (store, user, product) = setup();
    store.archive_project(user.id, product.project_id).unwrap();

    assert!(matches!(
        store.find_project(user.id, product.project_id),
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        store.find_product(user.id, product.id),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn test_find_export_is_scoped_to_user() {
    let (store, user, product) = setup();
    let mallory = store.create_user("mallory").unwrap();
    let manifest = store
        .record_export(
            "Spring_20250101_000000.xlsx",
            Path::new("/exports/Spring_20250101_000000.xlsx"),
            product.project_id,
            user.id,
            chrono::Utc::now(),
            1234,
        )
        .unwrap();

    assert_eq!(store.find_export(user.id, manifest.id).unwrap().file_size, 1234);
    assert!(matches!(
        store.find_export(mallory.id, manifest.id),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn test_duplicate_username_is_rejected() {
    let (store, _, _) = setup();
    assert!(matches!(
        store.create_user("alice"),
        Err(LedgerError::Validation(_))
    ));
}
