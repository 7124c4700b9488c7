//! Excel exporter implementation - project → column-pair workbook

use chrono::{DateTime, Local, Utc};
use regex::Regex;
use rust_xlsxwriter::{Format, FormatAlign, Image, Workbook, Worksheet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use super::layout::{
    self, ColumnPair, CODE_SUBHEADER, FIRST_DATA_ROW, HEADER_ROW, IMAGE_COLUMN_WIDTH,
    IMAGE_ROW, IMAGE_ROW_HEIGHT, STATUS_SUBHEADER, SUBHEADER_ROW, THUMBNAIL_PX,
};
use crate::config::LedgerConfig;
use crate::error::LedgerResult;
use crate::store::{HierarchyStore, SqliteStore};
use crate::types::{ExportManifest, Product, Project};

/// Renders one project into a workbook, one column pair per product
pub struct ProjectExporter<'a, S: HierarchyStore + ?Sized> {
    store: &'a S,
    project: &'a Project,
}

impl<'a, S: HierarchyStore + ?Sized> ProjectExporter<'a, S> {
    pub fn new(store: &'a S, project: &'a Project) -> Self {
        Self { store, project }
    }

    /// Encode the workbook to bytes
    pub fn render(&self) -> LedgerResult<Vec<u8>> {
        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold().set_align(FormatAlign::Center);

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name(&self.project.name))?;

        let products = self.store.list_products(self.project.id)?;
        for (index, product) in products.iter().enumerate() {
            let pair = ColumnPair::nth(index);
            self.write_block(worksheet, pair, product, &header_format)?;
        }

        Ok(workbook.save_to_buffer()?)
    }

    fn write_block(
        &self,
        worksheet: &mut Worksheet,
        pair: ColumnPair,
        product: &Product,
        header_format: &Format,
    ) -> LedgerResult<()> {
        let header_row = layout::row_index(HEADER_ROW);
        worksheet.merge_range(
            header_row,
            pair.code_index(),
            header_row,
            pair.status_index(),
            &product.name,
            header_format,
        )?;

        if let Some(image_path) = self.store.primary_image_path(product.id)? {
            self.embed_image(worksheet, pair, product, &image_path)?;
        }

        let subheader_row = layout::row_index(SUBHEADER_ROW);
        worksheet.write_string(subheader_row, pair.code_index(), CODE_SUBHEADER)?;
        worksheet.write_string(subheader_row, pair.status_index(), STATUS_SUBHEADER)?;

        let skcs = self.store.list_skcs(product.id)?;
        for (offset, skc) in skcs.iter().enumerate() {
            let row = layout::row_index(FIRST_DATA_ROW) + offset as u32;
            worksheet.write_string(row, pair.code_index(), &skc.code)?;
            worksheet.write_string(row, pair.status_index(), skc.status.label())?;
        }

        Ok(())
    }

    /// A missing or unreadable image degrades to "no image"; only sizing
    /// errors on the worksheet itself propagate.
    fn embed_image(
        &self,
        worksheet: &mut Worksheet,
        pair: ColumnPair,
        product: &Product,
        image_path: &Path,
    ) -> LedgerResult<()> {
        if !image_path.exists() {
            warn!(product = %product.name, path = %image_path.display(), "primary image missing on disk");
            return Ok(());
        }

        let image = match Image::new(image_path) {
            Ok(image) => image.set_scale_to_size(THUMBNAIL_PX, THUMBNAIL_PX, false),
            Err(e) => {
                warn!(product = %product.name, error = %e, "primary image not embeddable");
                return Ok(());
            }
        };

        let image_row = layout::row_index(IMAGE_ROW);
        if let Err(e) = worksheet.insert_image(image_row, pair.code_index(), &image) {
            warn!(
                product = %product.name,
                cell = %format!("{}{}", pair.code_letter(), IMAGE_ROW),
                error = %e,
                "image insert failed"
            );
            return Ok(());
        }
        worksheet.set_row_height(image_row, IMAGE_ROW_HEIGHT)?;
        worksheet.set_column_width(pair.code_index(), IMAGE_COLUMN_WIDTH)?;
        Ok(())
    }
}

/// Worksheet names cannot contain `[]:*?/\` and are limited to 31 characters
pub fn sheet_name(project_name: &str) -> String {
    let cleaned: String = project_name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').to_string();
    if cleaned.is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}_.\-]").expect("valid regex"))
}

/// Make a filename safe for storage: path separators and whitespace become
/// `_`, anything outside letters, digits, `_`, `.`, `-` is dropped, and
/// leading/trailing dots and underscores are trimmed.
pub fn secure_filename(name: &str) -> String {
    let joined = name
        .replace(['/', '\\'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    unsafe_chars()
        .replace_all(&joined, "")
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// `{project_name}_{YYYYMMDD_HHMMSS}.xlsx`, sanitized
pub fn export_filename(project_name: &str, timestamp: DateTime<Local>) -> String {
    let stem = secure_filename(project_name);
    let stem = if stem.is_empty() { "export" } else { stem.as_str() };
    format!("{}_{}.xlsx", stem, timestamp.format("%Y%m%d_%H%M%S"))
}

/// Create the first free file in `dir`: `name`, then `name_1`, `name_2`, …
///
/// The name is claimed with `create_new`, so concurrent exports never share a file.
fn claim_path(dir: &Path, filename: &str) -> io::Result<(String, PathBuf, File)> {
    let (stem, ext) = filename.rsplit_once('.').unwrap_or((filename, "xlsx"));
    let mut n = 0;
    loop {
        let name = if n == 0 {
            filename.to_string()
        } else {
            format!("{}_{}.{}", stem, n, ext)
        };
        let path = dir.join(&name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((name, path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "failed to remove export file");
    }
}

/// Render a project, write it under the export directory, and persist the
/// manifest that lets it be downloaded by id later.
pub fn export_project(
    store: &SqliteStore,
    config: &LedgerConfig,
    user_id: i64,
    project_id: i64,
    now: DateTime<Local>,
) -> LedgerResult<ExportManifest> {
    let project = store.find_project(user_id, project_id)?;
    let bytes = ProjectExporter::new(store, &project).render()?;

    fs::create_dir_all(&config.export_dir)?;
    let (filename, path, mut file) =
        claim_path(&config.export_dir, &export_filename(&project.name, now))?;
    if let Err(e) = file.write_all(&bytes) {
        drop(file);
        discard(&path);
        return Err(e.into());
    }
    drop(file);

    let manifest = match store.record_export(
        &filename,
        &path,
        project.id,
        user_id,
        now.with_timezone(&Utc),
        bytes.len() as i64,
    ) {
        Ok(manifest) => manifest,
        Err(e) => {
            discard(&path);
            return Err(e);
        }
    };

    info!(project = %project.name, path = %path.display(), size = manifest.file_size, "export written");
    Ok(manifest)
}
