use crate::config::BookFormat;
use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

const ENTRY_COLUMNS: &str =
    "path, format, title, cover_path, mtime, added_at, last_opened, position, progress";

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Catalog of documents under the library root
            CREATE TABLE IF NOT EXISTS books (
                path TEXT PRIMARY KEY,
                format TEXT NOT NULL,
                title TEXT NOT NULL,
                cover_path TEXT,
                mtime INTEGER NOT NULL,
                added_at INTEGER NOT NULL,
                last_opened INTEGER NOT NULL DEFAULT 0,
                position TEXT NOT NULL DEFAULT '',
                progress REAL NOT NULL DEFAULT 0
            );

            -- Keyword index, replaced whenever metadata is extracted
            CREATE TABLE IF NOT EXISTS book_keywords (
                path TEXT NOT NULL,
                keyword TEXT NOT NULL,
                PRIMARY KEY (path, keyword)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);
            CREATE INDEX IF NOT EXISTS idx_keywords_keyword ON book_keywords(keyword);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== RECONCILIATION ==========

    /// Persisted (path, mtime) projection of the catalog.
    pub fn catalog_mtimes(&self) -> Result<HashMap<String, i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT path, mtime FROM books")
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| AppError::Internal(format!("Failed to read catalog: {}", e)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect catalog: {}", e)))?;

        Ok(rows)
    }

    /// Insert a new entry together with its keywords.
    pub fn insert_entry(&self, entry: &CatalogEntry, keywords: &[String]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            &format!(
                "INSERT INTO books ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                ENTRY_COLUMNS
            ),
            params![
                entry.path,
                entry.format_label(),
                entry.title,
                entry.cover_path,
                entry.mtime,
                entry.added_at,
                entry.last_opened,
                entry.position,
                clamp_progress(entry.progress),
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to insert entry: {}", e)))?;

        replace_keywords(&tx, &entry.path, keywords)?;

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit entry: {}", e)))
    }

    /// Replace title, mtime, cover and keywords of an existing entry.
    ///
    /// Returns `false` if no entry exists for `path`; nothing is written then.
    pub fn update_entry(
        &self,
        path: &str,
        title: &str,
        mtime: i64,
        cover_path: Option<&str>,
        keywords: &[String],
    ) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        let rows = tx
            .execute(
                "UPDATE books SET title = ?1, mtime = ?2, cover_path = ?3 WHERE path = ?4",
                params![title, mtime, cover_path, path],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update entry: {}", e)))?;
        if rows == 0 {
            return Ok(false);
        }

        replace_keywords(&tx, path, keywords)?;

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit entry: {}", e)))?;
        Ok(true)
    }

    /// Delete an entry and its keywords.
    pub fn delete_entry(&self, path: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to begin transaction: {}", e)))?;

        tx.execute("DELETE FROM book_keywords WHERE path = ?1", params![path])
            .map_err(|e| AppError::Internal(format!("Failed to delete keywords: {}", e)))?;
        let rows = tx
            .execute("DELETE FROM books WHERE path = ?1", params![path])
            .map_err(|e| AppError::Internal(format!("Failed to delete entry: {}", e)))?;

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit delete: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== ENTRY OPERATIONS ==========

    /// Get entry by path.
    pub fn get_entry(&self, path: &str) -> Result<Option<CatalogEntry>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM books WHERE path = ?1", ENTRY_COLUMNS),
            params![path],
            Self::row_to_entry,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get entry: {}", e)))
    }

    /// Check whether an entry other than `except_path` references `cover_path`.
    pub fn cover_in_use(&self, cover_path: &str, except_path: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM books WHERE cover_path = ?1 AND path != ?2 LIMIT 1",
                params![cover_path, except_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to check cover usage: {}", e)))?;
        Ok(found.is_some())
    }

    /// Keywords of an entry, sorted.
    pub fn keywords_for(&self, path: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT keyword FROM book_keywords WHERE path = ?1 ORDER BY keyword")
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let keywords = stmt
            .query_map(params![path], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to get keywords: {}", e)))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect keywords: {}", e)))?;

        Ok(keywords)
    }

    /// Set last-opened to now.
    pub fn touch_last_opened(&self, path: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE books SET last_opened = ?1 WHERE path = ?2",
                params![now_timestamp(), path],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update last opened: {}", e)))?;
        Ok(rows > 0)
    }

    /// Record reading position and progress.
    pub fn update_progress(&self, path: &str, position: &str, progress: f64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE books SET position = ?1, progress = ?2 WHERE path = ?3",
                params![position, clamp_progress(progress), path],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update progress: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== LISTING ==========

    /// One page of the whole catalog.
    pub fn list_entries(&self, query: &ListQuery) -> Result<Listing> {
        self.select_page("", Vec::new(), query)
    }

    /// One page of entries whose title starts with `title_prefix` and that
    /// carry every keyword in `keywords`.
    ///
    /// With neither a prefix nor keywords the result is empty.
    pub fn search(
        &self,
        title_prefix: Option<&str>,
        keywords: &[String],
        query: &ListQuery,
    ) -> Result<Listing> {
        let keywords: BTreeSet<&str> = keywords.iter().map(String::as_str).collect();
        if title_prefix.is_none() && keywords.is_empty() {
            return Ok(Listing::default());
        }

        let mut clauses = Vec::new();
        let mut args = Vec::new();

        if !keywords.is_empty() {
            let placeholders = vec!["?"; keywords.len()].join(", ");
            clauses.push(format!(
                "path IN (SELECT path FROM book_keywords WHERE keyword IN ({}) \
                 GROUP BY path HAVING COUNT(DISTINCT keyword) = ?)",
                placeholders
            ));
            args.extend(keywords.iter().map(|k| Value::Text(k.to_string())));
            args.push(Value::Integer(keywords.len() as i64));
        }

        if let Some(prefix) = title_prefix {
            clauses.push("title LIKE ? ESCAPE '\\'".to_string());
            args.push(Value::Text(format!("{}%", escape_like(prefix))));
        }

        let filter = format!("WHERE {}", clauses.join(" AND "));
        self.select_page(&filter, args, query)
    }

    fn select_page(&self, filter: &str, mut args: Vec<Value>, query: &ListQuery) -> Result<Listing> {
        let sql = format!(
            "SELECT {} FROM books {} ORDER BY {} {}, path ASC LIMIT ? OFFSET ?",
            ENTRY_COLUMNS,
            filter,
            query.sort.column(),
            query.order.keyword()
        );
        // One extra row tells whether another page exists.
        args.push(Value::Integer(query.page_size as i64 + 1));
        args.push(Value::Integer(query.offset() as i64));

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let mut entries = stmt
            .query_map(params_from_iter(args), Self::row_to_entry)
            .map_err(|e| AppError::Internal(format!("Failed to list entries: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect entries: {}", e)))?;

        let has_more = entries.len() > query.page_size;
        entries.truncate(query.page_size);

        Ok(Listing { entries, has_more })
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogEntry> {
        let format: String = row.get(1)?;
        Ok(CatalogEntry {
            path: row.get(0)?,
            format: BookFormat::parse(&format),
            title: row.get(2)?,
            cover_path: row.get(3)?,
            mtime: row.get(4)?,
            added_at: row.get(5)?,
            last_opened: row.get(6)?,
            position: row.get(7)?,
            progress: row.get(8)?,
        })
    }
}

/// Delete-then-insert the keywords of `path` inside `tx`.
fn replace_keywords(tx: &Transaction<'_>, path: &str, keywords: &[String]) -> Result<()> {
    tx.execute("DELETE FROM book_keywords WHERE path = ?1", params![path])
        .map_err(|e| AppError::Internal(format!("Failed to clear keywords: {}", e)))?;

    let mut stmt = tx
        .prepare("INSERT OR IGNORE INTO book_keywords (path, keyword) VALUES (?1, ?2)")
        .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;
    for keyword in keywords {
        stmt.execute(params![path, keyword])
            .map_err(|e| AppError::Internal(format!("Failed to insert keyword: {}", e)))?;
    }
    Ok(())
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
