//! SQLite-backed entity and settings store with migrations
//!
//! Provides the relational side of the search core: PRD documents, test
//! cases and the `global_settings` key-value table.

use super::{DocumentKind, EntityStore, ImportBundle, PrdDocument, StoreError, TestCase};
use crate::settings::SettingsSource;
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Store over a pooled SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Open (or create) a database file and run migrations
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Pool(format!(
                        "Failed to create database directory {:?}: {}",
                        parent, e
                    ))
                })?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(16)
            .build(manager)
            .map_err(|e| StoreError::Pool(format!("Failed to create connection pool: {}", e)))?;

        Self::with_pool(pool)
    }

    /// Single-connection in-memory database
    pub fn in_memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory();
        // every pooled connection would otherwise get its own empty database
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(|e| StoreError::Pool(format!("Failed to create connection pool: {}", e)))?;

        Self::with_pool(pool)
    }

    fn with_pool(pool: DbPool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, StoreError> {
        self.pool
            .get()
            .map_err(|e| StoreError::Pool(format!("Failed to get connection: {}", e)))
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Run a blocking closure against a pooled connection off the async executor
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| StoreError::Pool(format!("Failed to get connection: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Insert or replace a PRD document
    pub fn insert_prd(&self, prd: &PrdDocument) -> Result<(), StoreError> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO prd_documents
                (id, project_id, app_version_id, module_id, code, title, content,
                 status, version, author, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                prd.id,
                prd.project_id,
                prd.app_version_id,
                prd.module_id,
                prd.code,
                prd.title,
                prd.content,
                prd.status,
                prd.version,
                prd.author,
                prd.created_at,
            ],
        )?;
        Ok(())
    }

    /// Insert or replace a test case
    pub fn insert_test_case(&self, tc: &TestCase) -> Result<(), StoreError> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO test_cases
                (id, project_id, app_version_id, module_id, prd_id, code, title,
                 precondition, expected_result, priority, type, status, version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                tc.id,
                tc.project_id,
                tc.app_version_id,
                tc.module_id,
                tc.prd_id,
                tc.code,
                tc.title,
                tc.precondition,
                tc.expected_result,
                tc.priority,
                tc.case_type,
                tc.status,
                tc.version,
                tc.created_at,
            ],
        )?;
        Ok(())
    }

    /// Delete a PRD by id; returns whether a row was removed
    pub fn delete_prd(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM prd_documents WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Insert or replace every document of a bundle; returns (prds, test cases)
    pub fn import(&self, bundle: &ImportBundle) -> Result<(usize, usize), StoreError> {
        for prd in &bundle.prds {
            self.insert_prd(prd)?;
        }
        for tc in &bundle.test_cases {
            self.insert_test_case(tc)?;
        }
        Ok((bundle.prds.len(), bundle.test_cases.len()))
    }

    /// Upsert a global setting
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO global_settings (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    /// All settings ordered by key
    pub fn list_settings(&self) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM global_settings ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, String)>, _>>()?;
        Ok(rows)
    }

    /// Single setting value
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM global_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

const PRD_COLUMNS: &str = "id, project_id, app_version_id, module_id, code, title, content, \
                           status, version, author, created_at";

const TEST_CASE_COLUMNS: &str = "id, project_id, app_version_id, module_id, prd_id, code, title, \
                                 precondition, expected_result, priority, type, status, version, \
                                 created_at";

fn prd_from_row(row: &Row<'_>) -> rusqlite::Result<PrdDocument> {
    Ok(PrdDocument {
        id: row.get(0)?,
        project_id: row.get(1)?,
        app_version_id: row.get(2)?,
        module_id: row.get(3)?,
        code: row.get(4)?,
        title: row.get(5)?,
        content: row.get(6)?,
        status: row.get(7)?,
        version: row.get(8)?,
        author: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn test_case_from_row(row: &Row<'_>) -> rusqlite::Result<TestCase> {
    Ok(TestCase {
        id: row.get(0)?,
        project_id: row.get(1)?,
        app_version_id: row.get(2)?,
        module_id: row.get(3)?,
        prd_id: row.get(4)?,
        code: row.get(5)?,
        title: row.get(6)?,
        precondition: row.get(7)?,
        expected_result: row.get(8)?,
        priority: row.get(9)?,
        case_type: row.get(10)?,
        status: row.get(11)?,
        version: row.get(12)?,
        created_at: row.get(13)?,
    })
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn get_prd(&self, id: &str) -> Result<PrdDocument, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM prd_documents WHERE id = ?1", PRD_COLUMNS);
            let prd = conn.query_row(&sql, params![id], prd_from_row).optional()?;
            prd.ok_or(StoreError::NotFound {
                kind: DocumentKind::Prd,
                id,
            })
        })
        .await
    }

    async fn get_test_case(&self, id: &str) -> Result<TestCase, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM test_cases WHERE id = ?1", TEST_CASE_COLUMNS);
            let tc = conn
                .query_row(&sql, params![id], test_case_from_row)
                .optional()?;
            tc.ok_or(StoreError::NotFound {
                kind: DocumentKind::TestCase,
                id,
            })
        })
        .await
    }

    async fn list_prds(&self) -> Result<Vec<PrdDocument>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM prd_documents ORDER BY created_at", PRD_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], prd_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn list_test_cases(&self) -> Result<Vec<TestCase>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM test_cases ORDER BY created_at", TEST_CASE_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], test_case_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

#[async_trait]
impl SettingsSource for SqliteStore {
    async fn get_by_keys(&self, keys: &[&str]) -> Result<Vec<(String, String)>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.with_conn(move |conn| {
            let placeholders = vec!["?"; keys.len()].join(", ");
            let sql = format!(
                "SELECT key, value FROM global_settings WHERE key IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(keys.iter()), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<Result<Vec<(String, String)>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: entities and settings
    r#"
    CREATE TABLE global_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        type TEXT NOT NULL DEFAULT 'string',
        description TEXT,
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE prd_documents (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        app_version_id TEXT NOT NULL,
        module_id TEXT,
        code TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'draft',
        version INTEGER NOT NULL DEFAULT 1,
        author TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    );

    CREATE INDEX idx_prd_project ON prd_documents(project_id);
    CREATE INDEX idx_prd_status ON prd_documents(status);

    CREATE TABLE test_cases (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        app_version_id TEXT NOT NULL,
        module_id TEXT,
        prd_id TEXT,
        code TEXT NOT NULL,
        title TEXT NOT NULL,
        precondition TEXT NOT NULL DEFAULT '',
        expected_result TEXT NOT NULL,
        priority TEXT NOT NULL DEFAULT 'medium',
        type TEXT NOT NULL DEFAULT 'functional',
        status TEXT NOT NULL DEFAULT 'active',
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );

    CREATE INDEX idx_test_cases_project ON test_cases(project_id);
    CREATE INDEX idx_test_cases_prd ON test_cases(prd_id);
    CREATE INDEX idx_test_cases_priority ON test_cases(priority);
    "#,
    // Migration 2: default search and embedding settings
    r#"
    INSERT OR IGNORE INTO global_settings (key, value, type, description) VALUES
        ('search_default_alpha', '1.0', 'float', 'Hybrid blend: 0 = keyword only, 1 = vector only'),
        ('search_default_limit', '10', 'int', 'Default number of search results'),
        ('search_default_threshold', '0.7', 'float', 'Default similarity threshold'),
        ('search_enable_hybrid', 'true', 'bool', 'Allow hybrid keyword + vector retrieval'),
        ('embedding_provider', 'mock', 'string', 'mock, openai, volcano_ark or fastembed'),
        ('embedding_api_key', '', 'secret', 'API key for the embedding provider'),
        ('embedding_base_url', '', 'string', 'Override for the provider base URL'),
        ('embedding_model', '', 'string', 'Embedding model name');
    "#,
];
