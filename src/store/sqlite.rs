//! SQLite-backed hierarchy store

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::{HierarchyStore, SkcInsert};
use crate::error::{LedgerError, LedgerResult};
use crate::types::{
    AddSkcsOutcome, ExportManifest, Product, ProductImage, Project, Skc, Status, User, UserStats,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  username TEXT NOT NULL UNIQUE,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  description TEXT,
  user_id INTEGER NOT NULL REFERENCES users(id),
  is_active INTEGER NOT NULL DEFAULT 1,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_user_active_project_name
  ON projects(user_id, name) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS products (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  CONSTRAINT uq_project_product_name UNIQUE (project_id, name)
);

CREATE TABLE IF NOT EXISTS skcs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  code TEXT NOT NULL,
  status TEXT NOT NULL,
  product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  CONSTRAINT uq_skc_code UNIQUE (code)
);

CREATE INDEX IF NOT EXISTS idx_product_skc ON skcs(product_id, status);

CREATE TABLE IF NOT EXISTS product_images (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  filename TEXT NOT NULL,
  original_filename TEXT NOT NULL,
  file_path TEXT NOT NULL,
  file_size INTEGER,
  mime_type TEXT,
  product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
  uploaded_at TEXT NOT NULL,
  is_primary INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_product_image ON product_images(product_id, is_primary);

CREATE TABLE IF NOT EXISTS excel_exports (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  filename TEXT NOT NULL,
  file_path TEXT NOT NULL,
  project_id INTEGER NOT NULL REFERENCES projects(id),
  user_id INTEGER NOT NULL REFERENCES users(id),
  created_at TEXT NOT NULL,
  file_size INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_project_export ON excel_exports(project_id, created_at);
"#;

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.label()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let label = value.as_str()?;
        Status::from_label(label)
            .ok_or_else(|| FromSqlError::Other(format!("unknown status '{}'", label).into()))
    }
}

/// True when the error is the UNIQUE constraint on `skcs.code`
fn is_code_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, msg) => {
            e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                && msg.as_deref().is_some_and(|m| m.contains("skcs.code"))
        }
        _ => false,
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        project_id: row.get(2)?,
    })
}

fn skc_from_row(row: &Row<'_>) -> rusqlite::Result<Skc> {
    Ok(Skc {
        id: row.get(0)?,
        code: row.get(1)?,
        status: row.get(2)?,
        product_id: row.get(3)?,
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        user_id: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<ProductImage> {
    Ok(ProductImage {
        id: row.get(0)?,
        filename: row.get(1)?,
        original_filename: row.get(2)?,
        file_path: PathBuf::from(row.get::<_, String>(3)?),
        file_size: row.get(4)?,
        mime_type: row.get(5)?,
        product_id: row.get(6)?,
        is_primary: row.get(7)?,
    })
}

fn export_from_row(row: &Row<'_>) -> rusqlite::Result<ExportManifest> {
    Ok(ExportManifest {
        id: row.get(0)?,
        filename: row.get(1)?,
        file_path: PathBuf::from(row.get::<_, String>(2)?),
        project_id: row.get(3)?,
        user_id: row.get(4)?,
        created_at: row.get(5)?,
        file_size: row.get(6)?,
    })
}

/// Codec-facing queries, shared by the autocommit store and transactions
mod hierarchy {
    use super::*;

    pub fn resolve_product(
        conn: &Connection,
        project_id: i64,
        name: &str,
    ) -> LedgerResult<Option<Product>> {
        let product = conn
            .query_row(
                "SELECT id, name, project_id FROM products WHERE project_id = ?1 AND name = ?2",
                params![project_id, name],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    pub fn create_product(conn: &Connection, project_id: i64, name: &str) -> LedgerResult<Product> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation(
                "Product name cannot be empty".to_string(),
            ));
        }
        let now = Utc::now();
        conn.execute(
            "INSERT INTO products (name, project_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, project_id, now],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::Validation(format!("Product '{}' already exists", name))
            } else {
                LedgerError::Storage(e)
            }
        })?;
        Ok(Product {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            project_id,
        })
    }

    pub fn code_exists_globally(conn: &Connection, code: &str) -> LedgerResult<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM skcs WHERE code = ?1)",
            params![code],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn create_skc(
        conn: &Connection,
        product_id: i64,
        code: &str,
        status: Status,
    ) -> LedgerResult<SkcInsert> {
        let now = Utc::now();
        let inserted = conn.execute(
            "INSERT INTO skcs (code, status, product_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![code, status, product_id, now],
        );
        match inserted {
            Ok(_) => Ok(SkcInsert::Created(Skc {
                id: conn.last_insert_rowid(),
                code: code.to_string(),
                status,
                product_id,
            })),
            Err(e) if is_code_conflict(&e) => {
                debug!(code, "SKC code rejected by uniqueness constraint");
                Ok(SkcInsert::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_products(conn: &Connection, project_id: i64) -> LedgerResult<Vec<Product>> {
        let mut stmt =
            conn.prepare("SELECT id, name, project_id FROM products WHERE project_id = ?1 ORDER BY id")?;
        let products = stmt
            .query_map(params![project_id], product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    pub fn list_skcs(conn: &Connection, product_id: i64) -> LedgerResult<Vec<Skc>> {
        let mut stmt =
            conn.prepare("SELECT id, code, status, product_id FROM skcs WHERE product_id = ?1")?;
        let mut skcs = stmt
            .query_map(params![product_id], skc_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        skcs.sort_by(Skc::precedence_cmp);
        Ok(skcs)
    }

    pub fn primary_image_path(conn: &Connection, product_id: i64) -> LedgerResult<Option<PathBuf>> {
        let path: Option<String> = conn
            .query_row(
                "SELECT file_path FROM product_images
                 WHERE product_id = ?1 AND is_primary = 1 ORDER BY id LIMIT 1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path.map(PathBuf::from))
    }
}

macro_rules! delegate_hierarchy {
    ($ty:ty, $conn:ident => $expr:expr) => {
        impl HierarchyStore for $ty {
            fn resolve_product(&self, project_id: i64, name: &str) -> LedgerResult<Option<Product>> {
                let $conn = self;
                hierarchy::resolve_product($expr, project_id, name)
            }

            fn create_product(&self, project_id: i64, name: &str) -> LedgerResult<Product> {
                let $conn = self;
                hierarchy::create_product($expr, project_id, name)
            }

            fn code_exists_globally(&self, code: &str) -> LedgerResult<bool> {
                let $conn = self;
                hierarchy::code_exists_globally($expr, code)
            }

            fn create_skc(
                &self,
                product_id: i64,
                code: &str,
                status: Status,
            ) -> LedgerResult<SkcInsert> {
                let $conn = self;
                hierarchy::create_skc($expr, product_id, code, status)
            }

            fn list_products(&self, project_id: i64) -> LedgerResult<Vec<Product>> {
                let $conn = self;
                hierarchy::list_products($expr, project_id)
            }

            fn list_skcs(&self, product_id: i64) -> LedgerResult<Vec<Skc>> {
                let $conn = self;
                hierarchy::list_skcs($expr, product_id)
            }

            fn primary_image_path(&self, product_id: i64) -> LedgerResult<Option<PathBuf>> {
                let $conn = self;
                hierarchy::primary_image_path($expr, product_id)
            }
        }
    };
}

delegate_hierarchy!(SqliteStore, store => &store.conn);
delegate_hierarchy!(StoreTx<'_>, tx => &tx.tx);

/// Autocommit connection to the ledger database
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> LedgerResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> LedgerResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> LedgerResult<()> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Begin a write transaction; dropping the returned handle rolls back
    pub fn transaction(&mut self) -> LedgerResult<StoreTx<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(StoreTx { tx })
    }

    // ── users & projects ───────────────────────────────────────────────

    pub fn create_user(&self, username: &str) -> LedgerResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(LedgerError::Validation("Username cannot be empty".to_string()));
        }
        self.conn
            .execute(
                "INSERT INTO users (username, created_at) VALUES (?1, ?2)",
                params![username, Utc::now()],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerError::Validation(format!("User '{}' already exists", username))
                } else {
                    LedgerError::Storage(e)
                }
            })?;
        Ok(User {
            id: self.conn.last_insert_rowid(),
            username: username.to_string(),
        })
    }

    pub fn find_user(&self, username: &str) -> LedgerResult<User> {
        self.conn
            .query_row(
                "SELECT id, username FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| LedgerError::NotFound(format!("User '{}'", username)))
    }

    pub fn create_project(
        &self,
        user_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> LedgerResult<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation(
                "Project name cannot be empty".to_string(),
            ));
        }
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO projects (name, description, user_id, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?4)",
                params![name, description, user_id, now],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerError::Validation(format!("Project '{}' already exists", name))
                } else {
                    LedgerError::Storage(e)
                }
            })?;
        self.find_project(user_id, self.conn.last_insert_rowid())
    }

    /// Active project owned by `user_id`
    pub fn find_project(&self, user_id: i64, project_id: i64) -> LedgerResult<Project> {
        self.conn
            .query_row(
                "SELECT id, name, description, user_id, is_active, created_at, updated_at
                 FROM projects WHERE id = ?1 AND user_id = ?2 AND is_active = 1",
                params![project_id, user_id],
                project_from_row,
            )
            .optional()?
            .ok_or_else(|| LedgerError::NotFound(format!("Project {}", project_id)))
    }

    /// Active projects of `user_id`, most recently updated first
    pub fn list_projects(&self, user_id: i64) -> LedgerResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, user_id, is_active, created_at, updated_at
             FROM projects WHERE user_id = ?1 AND is_active = 1
             ORDER BY updated_at DESC, id DESC",
        )?;
        let projects = stmt
            .query_map(params![user_id], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    /// Soft delete: the project stops resolving but its rows remain
    pub fn archive_project(&self, user_id: i64, project_id: i64) -> LedgerResult<()> {
        let changed = self.conn.execute(
            "UPDATE projects SET is_active = 0, updated_at = ?3
             WHERE id = ?1 AND user_id = ?2 AND is_active = 1",
            params![project_id, user_id, Utc::now()],
        )?;
        if changed == 0 {
            return Err(LedgerError::NotFound(format!("Project {}", project_id)));
        }
        Ok(())
    }

    /// Product whose project is active and owned by `user_id`
    pub fn find_product(&self, user_id: i64, product_id: i64) -> LedgerResult<Product> {
        self.conn
            .query_row(
                "SELECT p.id, p.name, p.project_id FROM products p
                 JOIN projects pr ON pr.id = p.project_id
                 WHERE p.id = ?1 AND pr.user_id = ?2 AND pr.is_active = 1",
                params![product_id, user_id],
                product_from_row,
            )
            .optional()?
            .ok_or_else(|| LedgerError::NotFound(format!("Product {}", product_id)))
    }

    pub fn find_skc(&self, code: &str) -> LedgerResult<Option<Skc>> {
        let skc = self
            .conn
            .query_row(
                "SELECT id, code, status, product_id FROM skcs WHERE code = ?1",
                params![code],
                skc_from_row,
            )
            .optional()?;
        Ok(skc)
    }

    pub fn count_skcs(&self) -> LedgerResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM skcs", [], |row| row.get(0))?)
    }

    // ── direct SKC maintenance ─────────────────────────────────────────

    /// Bulk create with a single, validated status. Duplicates are reported,
    /// never updated.
    pub fn add_skcs(
        &mut self,
        product_id: i64,
        codes: &[String],
        status: &str,
    ) -> LedgerResult<AddSkcsOutcome> {
        if codes.is_empty() {
            return Err(LedgerError::Validation("SKC code list is empty".to_string()));
        }
        let status: Status = status.parse()?;

        let tx = self.transaction()?;
        let mut outcome = AddSkcsOutcome::default();
        for code in codes.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            if tx.code_exists_globally(code)? {
                outcome.duplicate_codes.push(code.to_string());
                continue;
            }
            match tx.create_skc(product_id, code, status)? {
                SkcInsert::Created(_) => outcome.added_count += 1,
                SkcInsert::Conflict => outcome.duplicate_codes.push(code.to_string()),
            }
        }
        tx.touch_product(product_id)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Strict status update: unknown statuses are rejected, not substituted
    pub fn batch_update_status(
        &mut self,
        user_id: i64,
        codes: &[String],
        status: &str,
    ) -> LedgerResult<usize> {
        if codes.is_empty() {
            return Err(LedgerError::Validation("SKC code list is empty".to_string()));
        }
        let status: Status = status.parse()?;

        let tx = self.transaction()?;
        let ids = tx.owned_skc_ids(user_id, codes)?;
        if ids.is_empty() {
            return Err(LedgerError::NotFound("No SKCs to update".to_string()));
        }
        let now = Utc::now();
        for id in &ids {
            tx.tx.execute(
                "UPDATE skcs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status, now, id],
            )?;
        }
        tx.commit()?;
        Ok(ids.len())
    }

    pub fn batch_delete(&mut self, user_id: i64, codes: &[String]) -> LedgerResult<usize> {
        if codes.is_empty() {
            return Err(LedgerError::Validation("SKC code list is empty".to_string()));
        }
        let tx = self.transaction()?;
        let ids = tx.owned_skc_ids(user_id, codes)?;
        if ids.is_empty() {
            return Err(LedgerError::NotFound("No SKCs to delete".to_string()));
        }
        for id in &ids {
            tx.tx.execute("DELETE FROM skcs WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(ids.len())
    }

    // ── images ─────────────────────────────────────────────────────────

    /// Register a stored image file. The first image of a product becomes primary.
    pub fn add_image(
        &mut self,
        product_id: i64,
        file_path: &Path,
        original_filename: &str,
        mime_type: Option<&str>,
    ) -> LedgerResult<ProductImage> {
        let file_size = std::fs::metadata(file_path).ok().map(|m| m.len() as i64);
        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let tx = self.transaction()?;
        let existing: i64 = tx.tx.query_row(
            "SELECT COUNT(*) FROM product_images WHERE product_id = ?1",
            params![product_id],
            |row| row.get(0),
        )?;
        let is_primary = existing == 0;
        tx.tx.execute(
            "INSERT INTO product_images
               (filename, original_filename, file_path, file_size, mime_type, product_id, uploaded_at, is_primary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                filename,
                original_filename,
                file_path.to_string_lossy().into_owned(),
                file_size,
                mime_type,
                product_id,
                Utc::now(),
                is_primary
            ],
        )?;
        let id = tx.tx.last_insert_rowid();
        tx.touch_product(product_id)?;
        tx.commit()?;

        Ok(ProductImage {
            id,
            filename,
            original_filename: original_filename.to_string(),
            file_path: file_path.to_path_buf(),
            file_size,
            mime_type: mime_type.map(str::to_string),
            product_id,
            is_primary,
        })
    }

    /// Make `image_id` the only primary image of its product
    pub fn set_primary_image(&mut self, user_id: i64, image_id: i64) -> LedgerResult<()> {
        let tx = self.transaction()?;
        let product_id: i64 = tx
            .tx
            .query_row(
                "SELECT i.product_id FROM product_images i
                 JOIN products p ON p.id = i.product_id
                 JOIN projects pr ON pr.id = p.project_id
                 WHERE i.id = ?1 AND pr.user_id = ?2 AND pr.is_active = 1",
                params![image_id, user_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| LedgerError::NotFound(format!("Image {}", image_id)))?;
        tx.tx.execute(
            "UPDATE product_images SET is_primary = 0 WHERE product_id = ?1 AND is_primary = 1",
            params![product_id],
        )?;
        tx.tx.execute(
            "UPDATE product_images SET is_primary = 1 WHERE id = ?1",
            params![image_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Images of a product, primary first, newest next
    pub fn list_images(&self, product_id: i64) -> LedgerResult<Vec<ProductImage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, filename, original_filename, file_path, file_size, mime_type, product_id, is_primary
             FROM product_images WHERE product_id = ?1
             ORDER BY is_primary DESC, uploaded_at DESC, id DESC",
        )?;
        let images = stmt
            .query_map(params![product_id], image_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(images)
    }

    /// Remove an image record owned by `user_id` and return it.
    /// The file on disk is left to the caller.
    pub fn delete_image(&mut self, user_id: i64, image_id: i64) -> LedgerResult<ProductImage> {
        let tx = self.transaction()?;
        let image = tx
            .tx
            .query_row(
                "SELECT i.id, i.filename, i.original_filename, i.file_path, i.file_size,
                        i.mime_type, i.product_id, i.is_primary
                 FROM product_images i
                 JOIN products p ON p.id = i.product_id
                 JOIN projects pr ON pr.id = p.project_id
                 WHERE i.id = ?1 AND pr.user_id = ?2 AND pr.is_active = 1",
                params![image_id, user_id],
                image_from_row,
            )
            .optional()?
            .ok_or_else(|| LedgerError::NotFound(format!("Image {}", image_id)))?;
        tx.tx.execute(
            "DELETE FROM product_images WHERE id = ?1",
            params![image_id],
        )?;
        tx.touch_product(image.product_id)?;
        tx.commit()?;
        Ok(image)
    }

    // ── exports ────────────────────────────────────────────────────────

    pub fn record_export(
        &self,
        filename: &str,
        file_path: &Path,
        project_id: i64,
        user_id: i64,
        created_at: DateTime<Utc>,
        file_size: i64,
    ) -> LedgerResult<ExportManifest> {
        self.conn.execute(
            "INSERT INTO excel_exports (filename, file_path, project_id, user_id, created_at, file_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                filename,
                file_path.to_string_lossy().into_owned(),
                project_id,
                user_id,
                created_at,
                file_size
            ],
        )?;
        Ok(ExportManifest {
            id: self.conn.last_insert_rowid(),
            filename: filename.to_string(),
            file_path: file_path.to_path_buf(),
            project_id,
            user_id,
            created_at,
            file_size,
        })
    }

    pub fn find_export(&self, user_id: i64, export_id: i64) -> LedgerResult<ExportManifest> {
        self.conn
            .query_row(
                "SELECT id, filename, file_path, project_id, user_id, created_at, file_size
                 FROM excel_exports WHERE id = ?1 AND user_id = ?2",
                params![export_id, user_id],
                export_from_row,
            )
            .optional()?
            .ok_or_else(|| LedgerError::NotFound(format!("Export {}", export_id)))
    }

    pub fn user_stats(&self, user_id: i64) -> LedgerResult<UserStats> {
        let stats = self.conn.query_row(
            "SELECT
               (SELECT COUNT(*) FROM projects WHERE user_id = ?1 AND is_active = 1),
               (SELECT COUNT(*) FROM products p JOIN projects pr ON pr.id = p.project_id
                  WHERE pr.user_id = ?1 AND pr.is_active = 1),
               (SELECT COUNT(*) FROM skcs s JOIN products p ON p.id = s.product_id
                  JOIN projects pr ON pr.id = p.project_id
                  WHERE pr.user_id = ?1 AND pr.is_active = 1),
               (SELECT COUNT(*) FROM product_images i JOIN products p ON p.id = i.product_id
                  JOIN projects pr ON pr.id = p.project_id
                  WHERE pr.user_id = ?1 AND pr.is_active = 1)",
            params![user_id],
            |row| {
                Ok(UserStats {
                    project_count: row.get(0)?,
                    product_count: row.get(1)?,
                    skc_count: row.get(2)?,
                    image_count: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }
}

/// Write transaction over the ledger. Rolls back on drop unless committed.
pub struct StoreTx<'a> {
    tx: Transaction<'a>,
}

impl StoreTx<'_> {
    pub fn commit(self) -> LedgerResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn touch_project(&self, project_id: i64) -> LedgerResult<()> {
        self.tx.execute(
            "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now(), project_id],
        )?;
        Ok(())
    }

    fn touch_product(&self, product_id: i64) -> LedgerResult<()> {
        let now = Utc::now();
        self.tx.execute(
            "UPDATE products SET updated_at = ?1 WHERE id = ?2",
            params![now, product_id],
        )?;
        self.tx.execute(
            "UPDATE projects SET updated_at = ?1
             WHERE id = (SELECT project_id FROM products WHERE id = ?2)",
            params![now, product_id],
        )?;
        Ok(())
    }

    fn owned_skc_ids(&self, user_id: i64, codes: &[String]) -> LedgerResult<Vec<i64>> {
        let placeholders = vec!["?"; codes.len()].join(", ");
        let sql = format!(
            "SELECT s.id FROM skcs s
             JOIN products p ON p.id = s.product_id
             JOIN projects pr ON pr.id = p.project_id
             WHERE pr.user_id = ? AND pr.is_active = 1 AND s.code IN ({})",
            placeholders
        );
        let mut args: Vec<&dyn ToSql> = vec![&user_id];
        args.extend(codes.iter().map(|c| c as &dyn ToSql));
        let mut stmt = self.tx.prepare(&sql)?;
        let ids = stmt
            .query_map(args.as_slice(), |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}
