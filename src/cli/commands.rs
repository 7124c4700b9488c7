use chrono::Local;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{LedgerConfig, IMAGE_EXTENSIONS, WORKBOOK_EXTENSIONS};
use crate::error::{LedgerError, LedgerResult};
use crate::excel::{export_project, import_upload, ImportSummary};
use crate::store::{HierarchyStore, SqliteStore};
use crate::types::{
    AddSkcsOutcome, ExportManifest, Product, ProductImage, Project, Skc, Status, User,
};
use crate::upload;

/// Open the configured database, creating it on first use
pub fn open_store(config: &LedgerConfig) -> LedgerResult<SqliteStore> {
    SqliteStore::open(
        &config.database_path,
        Duration::from_millis(config.busy_timeout_ms),
    )
}

fn resolve_user(store: &SqliteStore, username: &str) -> LedgerResult<User> {
    store.find_user(username)
}

/// Execute the init command
pub fn init(config: &LedgerConfig, admin: &str) -> LedgerResult<User> {
    println!("{}", "📦 SKC Ledger - Initialize".bold().green());
    println!("   Database: {}", config.database_path.display());

    fs::create_dir_all(config.temp_dir())?;
    fs::create_dir_all(config.image_dir())?;
    fs::create_dir_all(&config.export_dir)?;

    let store = open_store(config)?;
    let user = match store.find_user(admin) {
        Ok(user) => user,
        Err(LedgerError::NotFound(_)) => store.create_user(admin)?,
        Err(e) => return Err(e),
    };

    println!("{}", "✅ Ready".bold().green());
    println!("   User: {} (id {})\n", user.username.bright_blue(), user.id);
    Ok(user)
}

pub fn add_user(config: &LedgerConfig, username: &str) -> LedgerResult<User> {
    let store = open_store(config)?;
    let user = store.create_user(username)?;
    println!("✅ User {} created (id {})", user.username.bright_blue(), user.id);
    Ok(user)
}

pub fn add_project(
    config: &LedgerConfig,
    username: &str,
    name: &str,
    description: Option<&str>,
) -> LedgerResult<Project> {
    let store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let project = store.create_project(user.id, name, description)?;
    println!(
        "✅ Project {} created (id {})",
        project.name.bright_blue(),
        project.id
    );
    Ok(project)
}

pub fn list_projects(config: &LedgerConfig, username: &str) -> LedgerResult<Vec<Project>> {
    let store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let projects = store.list_projects(user.id)?;

    println!("{}", format!("📁 Projects of {}", user.username).bold());
    for project in &projects {
        let products = store.list_products(project.id)?.len();
        println!(
            "   {:>4}  {}  ({} products, updated {})",
            project.id,
            project.name.bright_blue(),
            products,
            project.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(projects)
}

/// Soft delete; the project's name becomes available again
pub fn archive_project(config: &LedgerConfig, username: &str, project_id: i64) -> LedgerResult<()> {
    let store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    store.archive_project(user.id, project_id)?;
    println!("✅ Project {} archived", project_id);
    Ok(())
}

pub fn add_product(
    config: &LedgerConfig,
    username: &str,
    project_id: i64,
    name: &str,
) -> LedgerResult<Product> {
    let store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let project = store.find_project(user.id, project_id)?;
    if store.resolve_product(project.id, name.trim())?.is_some() {
        return Err(LedgerError::Validation(format!(
            "Product '{}' already exists",
            name.trim()
        )));
    }
    let product = store.create_product(project.id, name)?;
    println!(
        "✅ Product {} created in {} (id {})",
        product.name.bright_blue(),
        project.name,
        product.id
    );
    Ok(product)
}

pub fn list_products(
    config: &LedgerConfig,
    username: &str,
    project_id: i64,
) -> LedgerResult<Vec<Product>> {
    let store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let project = store.find_project(user.id, project_id)?;
    let products = store.list_products(project.id)?;

    println!("{}", format!("📦 Products in {}", project.name).bold());
    for product in &products {
        let skcs = store.list_skcs(product.id)?.len();
        println!(
            "   {:>4}  {}  ({} SKCs)",
            product.id,
            product.name.bright_blue(),
            skcs
        );
    }
    Ok(products)
}

/// SKCs of a product in status precedence, then code order.
/// `status` must be a known label when given.
pub fn list_skcs(
    config: &LedgerConfig,
    username: &str,
    product_id: i64,
    status: Option<&str>,
) -> LedgerResult<Vec<Skc>> {
    let filter = match status {
        Some(label) => Some(Status::from_label(label).ok_or_else(|| {
            LedgerError::Validation(format!(
                "Invalid status '{}' (valid: {})",
                label,
                Status::labels().join(", ")
            ))
        })?),
        None => None,
    };

    let store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let product = store.find_product(user.id, product_id)?;
    let skcs: Vec<Skc> = store
        .list_skcs(product.id)?
        .into_iter()
        .filter(|skc| filter.map_or(true, |status| skc.status == status))
        .collect();

    println!("{}", format!("🏷  SKCs of {}", product.name).bold());
    for skc in &skcs {
        println!("   {:<20} {}", skc.code, skc.status.label());
    }
    Ok(skcs)
}

/// Execute the import command
///
/// The workbook is staged as a copy in the upload temp directory; the copy
/// is removed afterwards and the caller's file is left alone.
pub fn import(
    config: &LedgerConfig,
    username: &str,
    project_id: i64,
    file: PathBuf,
    verbose: bool,
) -> LedgerResult<ImportSummary> {
    println!("{}", "📦 SKC Ledger - Excel Import".bold().green());
    println!("   Project: {}", project_id);
    println!("   Input:   {}\n", file.display());

    let mut store = open_store(config)?;
    let user = resolve_user(&store, username)?;

    if verbose {
        println!("{}", "📖 Staging workbook...".cyan());
    }
    let staged = upload::stage_copy(&config.temp_dir(), &file, &WORKBOOK_EXTENSIONS)?;

    if verbose {
        println!("{}", "🔄 Reconciling SKCs...".cyan());
    }
    let summary = import_upload(&mut store, user.id, project_id, &staged)?;

    println!("{}", "✅ Import Complete!".bold().green());
    println!("   {}", summary.message());
    if verbose {
        println!("   Products created: {}", summary.products_created);
        println!("   Incomplete rows:  {}", summary.incomplete_count);
        println!("   Status defaulted: {}", summary.defaulted_status_count);
    }
    println!();
    Ok(summary)
}

/// Execute the export command
pub fn export(
    config: &LedgerConfig,
    username: &str,
    project_id: i64,
    verbose: bool,
) -> LedgerResult<ExportManifest> {
    println!("{}", "📦 SKC Ledger - Excel Export".bold().green());
    println!("   Project: {}\n", project_id);

    let store = open_store(config)?;
    let user = resolve_user(&store, username)?;

    if verbose {
        println!("{}", "📊 Rendering workbook...".cyan());
    }
    let manifest = export_project(&store, config, user.id, project_id, Local::now())?;

    println!("{}", "✅ Export Complete!".bold().green());
    println!("   Excel file: {}", manifest.file_path.display());
    println!("   Size:       {} bytes", manifest.file_size);
    println!("   Export id:  {}\n", manifest.id);
    Ok(manifest)
}

pub fn add_image(
    config: &LedgerConfig,
    username: &str,
    product_id: i64,
    file: &Path,
) -> LedgerResult<ProductImage> {
    let mut store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let product = store.find_product(user.id, product_id)?;

    let staged = upload::stage_copy(&config.image_dir(), file, &IMAGE_EXTENSIONS)?;
    let original = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let image = match store.add_image(
        product.id,
        &staged,
        &original,
        upload::image_mime_type(&staged),
    ) {
        Ok(image) => image,
        Err(e) => {
            let _ = fs::remove_file(&staged);
            return Err(e);
        }
    };

    println!(
        "✅ Image {} added to {}{}",
        image.id,
        product.name.bright_blue(),
        if image.is_primary { " (primary)" } else { "" }
    );
    Ok(image)
}

pub fn set_primary_image(config: &LedgerConfig, username: &str, image_id: i64) -> LedgerResult<()> {
    let mut store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    store.set_primary_image(user.id, image_id)?;
    println!("✅ Image {} is now primary", image_id);
    Ok(())
}

/// Images of a product, primary first
pub fn list_images(
    config: &LedgerConfig,
    username: &str,
    product_id: i64,
) -> LedgerResult<Vec<ProductImage>> {
    let store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let product = store.find_product(user.id, product_id)?;
    let images = store.list_images(product.id)?;

    println!("{}", format!("🖼  Images of {}", product.name).bold());
    for image in &images {
        println!(
            "   {:>4}  {}{}",
            image.id,
            image.original_filename,
            if image.is_primary { " (primary)" } else { "" }
        );
    }
    Ok(images)
}

/// Delete an image record and its stored file
pub fn delete_image(
    config: &LedgerConfig,
    username: &str,
    image_id: i64,
) -> LedgerResult<ProductImage> {
    let mut store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let image = store.delete_image(user.id, image_id)?;

    if image.file_path.exists() {
        fs::remove_file(&image.file_path)?;
    }
    println!("✅ Image {} deleted", image.id);
    Ok(image)
}

/// Direct bulk create with one status for every code
pub fn add_skcs(
    config: &LedgerConfig,
    username: &str,
    product_id: i64,
    codes: &[String],
    status: &str,
) -> LedgerResult<AddSkcsOutcome> {
    let mut store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let product = store.find_product(user.id, product_id)?;
    let outcome = store.add_skcs(product.id, codes, status)?;
    println!("✅ {}", outcome.message());
    Ok(outcome)
}

pub fn delete_skcs(config: &LedgerConfig, username: &str, codes: &[String]) -> LedgerResult<usize> {
    let mut store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let deleted = store.batch_delete(user.id, codes)?;
    println!("✅ Deleted {} SKCs", deleted);
    Ok(deleted)
}

/// Execute the status command (strict: unknown statuses are rejected)
pub fn update_status(
    config: &LedgerConfig,
    username: &str,
    status: &str,
    codes: &[String],
) -> LedgerResult<usize> {
    let mut store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let updated = match store.batch_update_status(user.id, codes, status) {
        Err(LedgerError::Validation(msg)) if Status::from_label(status).is_none() => {
            return Err(LedgerError::Validation(format!(
                "{} (valid: {})",
                msg,
                Status::labels().join(", ")
            )))
        }
        other => other?,
    };
    println!("✅ Updated {} SKCs to {}", updated, status.bright_blue());
    Ok(updated)
}

pub fn stats(config: &LedgerConfig, username: &str) -> LedgerResult<()> {
    let store = open_store(config)?;
    let user = resolve_user(&store, username)?;
    let stats = store.user_stats(user.id)?;
    println!("{}", format!("📊 {}", user.username).bold());
    println!("   Projects: {}", stats.project_count);
    println!("   Products: {}", stats.product_count);
    println!("   SKCs:     {}", stats.skc_count);
    println!("   Images:   {}", stats.image_count);
    Ok(())
}
