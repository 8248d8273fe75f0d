//! # SQLite Record Store
//!
//! [`RecordStore`] backed by a `sqlx` SQLite pool.
//!
//! ## Schema
//!
//! `migrate()` creates every table the engine needs:
//! - `content_sources`, `repos`, `repo_content_sources` - system of record
//! - `sync_results` - one row per synchronization attempt
//! - `packages`, `package_bits` - package metadata and downloaded bits
//! - `distributions`, `distribution_files` - distribution trees, bits inline
//! - `advisories` - advisory metadata, package and CVE lists as JSON
//! - `candidate_repos` - repositories discovered on content sources
//!
//! Timestamps are stored as Unix milliseconds.
//!
//! `create_sync_result` checks for a running result and inserts the new one
//! in a single statement, serialized per store. Nothing locks across
//! processes: two processes sharing one database can still both start the
//! same target.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::{
    AdvisoryDetails, AdvisorySyncReport, BridgeError, Configuration, ContentSource,
    ContentSourceId, ContentSourceType, DistributionDetails, DistributionFileDetails,
    DistributionFileRef, DistributionSyncReport, PackageDetails, PackageKey, PackageSyncReport,
    RecordStore, Repo, RepoId, RepoImportReport, SyncResult, SyncResultId, SyncStatus, SyncTarget,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_runtime::config::EngineConfig;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::apply_merge_rules;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS content_sources (
        id INTEGER PRIMARY KEY NOT NULL,
        name TEXT NOT NULL UNIQUE,
        type_name TEXT NOT NULL,
        type_display_name TEXT,
        configuration TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS repos (
        id INTEGER PRIMARY KEY NOT NULL,
        name TEXT NOT NULL UNIQUE,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS repo_content_sources (
        repo_id INTEGER NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
        source_id INTEGER NOT NULL REFERENCES content_sources(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        PRIMARY KEY (repo_id, source_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_results (
        id TEXT PRIMARY KEY NOT NULL,
        target_kind TEXT NOT NULL,
        target_id INTEGER NOT NULL,
        status TEXT NOT NULL,
        results TEXT NOT NULL DEFAULT '',
        start_time INTEGER NOT NULL,
        end_time INTEGER,
        percent_complete INTEGER NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 0,
        CONSTRAINT sync_results_target_check CHECK (target_kind IN ('source', 'repo'))
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_sync_results_target
        ON sync_results (target_kind, target_id, start_time)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS packages (
        repo_id INTEGER NOT NULL,
        source_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        version TEXT NOT NULL,
        package_type TEXT NOT NULL,
        architecture TEXT NOT NULL,
        display_name TEXT,
        file_name TEXT NOT NULL,
        file_created INTEGER,
        file_size INTEGER,
        sha256 TEXT,
        location TEXT NOT NULL,
        PRIMARY KEY (repo_id, source_id, name, version, package_type, architecture)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS package_bits (
        repo_id INTEGER NOT NULL,
        source_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        version TEXT NOT NULL,
        package_type TEXT NOT NULL,
        architecture TEXT NOT NULL,
        bits BLOB NOT NULL,
        PRIMARY KEY (repo_id, source_id, name, version, package_type, architecture)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS distributions (
        repo_id INTEGER NOT NULL,
        source_id INTEGER NOT NULL,
        label TEXT NOT NULL,
        dist_path TEXT NOT NULL,
        distribution_type TEXT NOT NULL,
        PRIMARY KEY (repo_id, source_id, label)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS distribution_files (
        repo_id INTEGER NOT NULL,
        source_id INTEGER NOT NULL,
        label TEXT NOT NULL,
        relative_filename TEXT NOT NULL,
        sha256 TEXT,
        last_modified INTEGER,
        file_size INTEGER,
        bits BLOB,
        PRIMARY KEY (repo_id, source_id, label, relative_filename)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS advisories (
        repo_id INTEGER NOT NULL,
        source_id INTEGER NOT NULL,
        advisory TEXT NOT NULL,
        advisory_type TEXT NOT NULL,
        synopsis TEXT NOT NULL,
        description TEXT,
        severity TEXT,
        issue_date INTEGER,
        packages TEXT NOT NULL DEFAULT '[]',
        cves TEXT NOT NULL DEFAULT '[]',
        PRIMARY KEY (repo_id, source_id, advisory)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS candidate_repos (
        source_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        parent_name TEXT,
        PRIMARY KEY (source_id, name)
    )
    "#,
];

/// SQLite implementation of [`RecordStore`]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    /// Serializes sync result creation across the pool's connections
    create_lock: Mutex<()>,
}

impl SqliteRecordStore {
    /// Wrap an existing pool. Call [`SqliteRecordStore::migrate`] before use
    /// if the schema may be missing.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            create_lock: Mutex::new(()),
        }
    }

    /// Open a pool from the engine configuration and create the schema.
    ///
    /// In-memory databases are limited to one connection, since every
    /// SQLite connection to `:memory:` opens a separate database.
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let max_connections = if config.database_url.contains(":memory:") {
            1
        } else {
            config.max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!("Record store ready at {}", config.database_url);
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create missing tables. Safe to call repeatedly.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        }
        debug!("Record store schema up to date");
        Ok(())
    }

    /// Insert or replace a content source
    pub async fn save_source(&self, source: &ContentSource) -> Result<()> {
        let configuration = serde_json::to_string(&source.configuration)?;
        sqlx::query(
            r#"
            INSERT INTO content_sources (
                id, name, type_name, type_display_name, configuration
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                type_name = excluded.type_name,
                type_display_name = excluded.type_display_name,
                configuration = excluded.configuration
            "#,
        )
        .bind(source.id.get())
        .bind(&source.name)
        .bind(&source.source_type.name)
        .bind(&source.source_type.display_name)
        .bind(configuration)
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Insert or replace a repo, its content sources and their order
    pub async fn save_repo(&self, repo: &Repo) -> Result<()> {
        for source in &repo.content_sources {
            self.save_source(source).await?;
        }

        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO repos (id, name, description) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description
            "#,
        )
        .bind(repo.id.get())
        .bind(&repo.name)
        .bind(&repo.description)
        .execute(&mut *tx)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        sqlx::query("DELETE FROM repo_content_sources WHERE repo_id = ?")
            .bind(repo.id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        for (position, source) in repo.content_sources.iter().enumerate() {
            sqlx::query(
                "INSERT INTO repo_content_sources (repo_id, source_id, position) VALUES (?, ?, ?)",
            )
            .bind(repo.id.get())
            .bind(source.id.get())
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        }

        commit(tx).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))
    }

    async fn find_sync_result(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        id: SyncResultId,
    ) -> Result<Option<SyncResult>> {
        let row = sqlx::query_as::<_, SyncResultRow>(
            r#"
            SELECT id, target_kind, target_id, status, results,
                   start_time, end_time, percent_complete, version
            FROM sync_results
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        row.map(SyncResult::try_from).transpose()
    }

    async fn package_exists(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        key: &PackageKey,
    ) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM packages
            WHERE repo_id = ? AND source_id = ?
              AND name = ? AND version = ? AND package_type = ? AND architecture = ?
            "#,
        )
        .bind(repo.get())
        .bind(source.get())
        .bind(&key.name)
        .bind(&key.version)
        .bind(&key.package_type)
        .bind(&key.architecture)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        Ok(count > 0)
    }
}

async fn commit(tx: Transaction<'static, Sqlite>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))
}

fn to_millis(time: &DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| BridgeError::DatabaseError(format!("Invalid timestamp: {}", millis)))
}

fn optional_millis(millis: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    millis.map(from_millis).transpose()
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct ContentSourceRow {
    id: i64,
    name: String,
    type_name: String,
    type_display_name: Option<String>,
    configuration: String,
}

impl TryFrom<ContentSourceRow> for ContentSource {
    type Error = BridgeError;

    fn try_from(row: ContentSourceRow) -> Result<Self> {
        let configuration: Configuration = serde_json::from_str(&row.configuration)?;
        Ok(ContentSource {
            id: ContentSourceId(row.id),
            name: row.name,
            source_type: ContentSourceType {
                name: row.type_name,
                display_name: row.type_display_name,
            },
            configuration,
        })
    }
}

#[derive(Debug, FromRow)]
struct SyncResultRow {
    id: String,
    target_kind: String,
    target_id: i64,
    status: String,
    results: String,
    start_time: i64,
    end_time: Option<i64>,
    percent_complete: i64,
    version: i64,
}

impl TryFrom<SyncResultRow> for SyncResult {
    type Error = BridgeError;

    fn try_from(row: SyncResultRow) -> Result<Self> {
        let percent_complete = u32::try_from(row.percent_complete).map_err(|_| {
            BridgeError::DatabaseError(format!("Invalid percent_complete: {}", row.percent_complete))
        })?;

        Ok(SyncResult {
            id: SyncResultId::from_string(&row.id)?,
            target: SyncTarget::from_parts(&row.target_kind, row.target_id)?,
            status: row.status.parse()?,
            results: row.results,
            start_time: from_millis(row.start_time)?,
            end_time: optional_millis(row.end_time)?,
            percent_complete,
            version: row.version,
        })
    }
}

#[derive(Debug, FromRow)]
struct PackageRow {
    name: String,
    version: String,
    package_type: String,
    architecture: String,
    display_name: Option<String>,
    file_name: String,
    file_created: Option<i64>,
    file_size: Option<i64>,
    sha256: Option<String>,
    location: String,
}

impl TryFrom<PackageRow> for PackageDetails {
    type Error = BridgeError;

    fn try_from(row: PackageRow) -> Result<Self> {
        Ok(PackageDetails {
            key: PackageKey {
                name: row.name,
                version: row.version,
                package_type: row.package_type,
                architecture: row.architecture,
            },
            display_name: row.display_name,
            file_name: row.file_name,
            file_created: optional_millis(row.file_created)?,
            file_size: row.file_size.map(|size| size as u64),
            sha256: row.sha256,
            location: row.location,
        })
    }
}

#[derive(Debug, FromRow)]
struct DistributionRow {
    label: String,
    dist_path: String,
    distribution_type: String,
}

#[derive(Debug, FromRow)]
struct DistributionFileRow {
    label: String,
    dist_path: String,
    relative_filename: String,
    sha256: Option<String>,
    last_modified: Option<i64>,
    file_size: Option<i64>,
}

impl DistributionFileRow {
    fn details(&self) -> Result<DistributionFileDetails> {
        Ok(DistributionFileDetails {
            relative_filename: self.relative_filename.clone(),
            sha256: self.sha256.clone(),
            last_modified: optional_millis(self.last_modified)?,
            file_size: self.file_size.map(|size| size as u64),
        })
    }
}

#[derive(Debug, FromRow)]
struct AdvisoryRow {
    advisory: String,
    advisory_type: String,
    synopsis: String,
    description: Option<String>,
    severity: Option<String>,
    issue_date: Option<i64>,
    packages: String,
    cves: String,
}

impl TryFrom<AdvisoryRow> for AdvisoryDetails {
    type Error = BridgeError;

    fn try_from(row: AdvisoryRow) -> Result<Self> {
        Ok(AdvisoryDetails {
            advisory: row.advisory,
            advisory_type: row.advisory_type,
            synopsis: row.synopsis,
            description: row.description,
            severity: row.severity,
            issue_date: optional_millis(row.issue_date)?,
            packages: serde_json::from_str(&row.packages)?,
            cves: serde_json::from_str(&row.cves)?,
        })
    }
}

// ============================================================================
// RecordStore
// ============================================================================

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn load_source(&self, id: ContentSourceId) -> Result<Option<ContentSource>> {
        let row = sqlx::query_as::<_, ContentSourceRow>(
            r#"
            SELECT id, name, type_name, type_display_name, configuration
            FROM content_sources
            WHERE id = ?
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        row.map(ContentSource::try_from).transpose()
    }

    async fn load_sources(&self) -> Result<Vec<ContentSource>> {
        let rows = sqlx::query_as::<_, ContentSourceRow>(
            r#"
            SELECT id, name, type_name, type_display_name, configuration
            FROM content_sources
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(ContentSource::try_from).collect()
    }

    async fn load_repo(&self, id: RepoId) -> Result<Option<Repo>> {
        let row = sqlx::query_as::<_, (i64, String, Option<String>)>(
            "SELECT id, name, description FROM repos WHERE id = ?",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        let Some((repo_id, name, description)) = row else {
            return Ok(None);
        };

        let sources = sqlx::query_as::<_, ContentSourceRow>(
            r#"
            SELECT s.id, s.name, s.type_name, s.type_display_name, s.configuration
            FROM content_sources s
            JOIN repo_content_sources rcs ON rcs.source_id = s.id
            WHERE rcs.repo_id = ?
            ORDER BY rcs.position
            "#,
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        Ok(Some(Repo {
            id: RepoId(repo_id),
            name,
            description,
            content_sources: sources
                .into_iter()
                .map(ContentSource::try_from)
                .collect::<Result<Vec<_>>>()?,
        }))
    }

    async fn create_sync_result(&self, result: SyncResult) -> Result<Option<SyncResult>> {
        let _guard = self.create_lock.lock().await;

        let inserted = sqlx::query(
            r#"
            INSERT INTO sync_results (
                id, target_kind, target_id, status, results,
                start_time, end_time, percent_complete, version
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM sync_results
                WHERE target_kind = ? AND target_id = ?
                  AND status NOT IN (?, ?, ?)
            )
            "#,
        )
        .bind(result.id.as_str())
        .bind(result.target.kind())
        .bind(result.target.raw_id())
        .bind(result.status.as_str())
        .bind(&result.results)
        .bind(to_millis(&result.start_time))
        .bind(result.end_time.as_ref().map(to_millis))
        .bind(i64::from(result.percent_complete))
        .bind(result.version)
        .bind(result.target.kind())
        .bind(result.target.raw_id())
        .bind(SyncStatus::Success.as_str())
        .bind(SyncStatus::Failure.as_str())
        .bind(SyncStatus::Cancelled.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?
        .rows_affected();

        if inserted == 0 {
            debug!("{} already has a running sync result", result.target);
            return Ok(None);
        }
        Ok(Some(result))
    }

    async fn merge_sync_result(&self, result: SyncResult) -> Result<SyncResult> {
        let mut tx = self.begin().await?;
        let stored = self
            .find_sync_result(&mut tx, result.id)
            .await?
            .ok_or_else(|| BridgeError::NotFound(format!("sync result {}", result.id)))?;

        let merged = apply_merge_rules(&stored, result)?;
        sqlx::query(
            r#"
            UPDATE sync_results SET
                status = ?,
                results = ?,
                start_time = ?,
                end_time = ?,
                percent_complete = ?,
                version = ?
            WHERE id = ?
            "#,
        )
        .bind(merged.status.as_str())
        .bind(&merged.results)
        .bind(to_millis(&merged.start_time))
        .bind(merged.end_time.as_ref().map(to_millis))
        .bind(i64::from(merged.percent_complete))
        .bind(merged.version)
        .bind(merged.id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        commit(tx).await?;
        Ok(merged)
    }

    async fn load_latest_sync_result(&self, target: SyncTarget) -> Result<Option<SyncResult>> {
        let row = sqlx::query_as::<_, SyncResultRow>(
            r#"
            SELECT id, target_kind, target_id, status, results,
                   start_time, end_time, percent_complete, version
            FROM sync_results
            WHERE target_kind = ? AND target_id = ?
            ORDER BY start_time DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(target.kind())
        .bind(target.raw_id())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        row.map(SyncResult::try_from).transpose()
    }

    async fn load_sync_result(&self, id: SyncResultId) -> Result<Option<SyncResult>> {
        let mut tx = self.begin().await?;
        let result = self.find_sync_result(&mut tx, id).await?;
        commit(tx).await?;
        Ok(result)
    }

    async fn request_cancel(&self, repo: RepoId) -> Result<bool> {
        let Some(latest) = self.load_latest_sync_result(SyncTarget::Repo(repo)).await? else {
            return Ok(false);
        };
        if latest.is_terminal() {
            return Ok(false);
        }

        let updated = sqlx::query(
            r#"
            UPDATE sync_results SET status = ?, version = version + 1
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(SyncStatus::Cancelling.as_str())
        .bind(latest.id.as_str())
        .bind(latest.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        Ok(updated.rows_affected() > 0)
    }

    async fn import_candidate_repos(
        &self,
        source: ContentSourceId,
        report: &RepoImportReport,
    ) -> Result<usize> {
        let mut tx = self.begin().await?;
        let mut imported = 0;

        for details in &report.repos {
            let known = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM repos WHERE name = ?")
                .bind(&details.name)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
            if known > 0 {
                continue;
            }

            let inserted = sqlx::query(
                r#"
                INSERT OR IGNORE INTO candidate_repos (source_id, name, description, parent_name)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(source.get())
            .bind(&details.name)
            .bind(&details.description)
            .bind(&details.parent_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

            imported += inserted.rows_affected() as usize;
        }

        commit(tx).await?;
        Ok(imported)
    }

    async fn list_packages(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<PackageDetails>> {
        let rows = sqlx::query_as::<_, PackageRow>(
            r#"
            SELECT name, version, package_type, architecture, display_name,
                   file_name, file_created, file_size, sha256, location
            FROM packages
            WHERE repo_id = ? AND source_id = ?
            ORDER BY name, version, package_type, architecture
            "#,
        )
        .bind(repo.get())
        .bind(source.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(PackageDetails::try_from).collect()
    }

    async fn merge_package_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &PackageSyncReport,
    ) -> Result<()> {
        let mut tx = self.begin().await?;

        // Deleted packages lose their bits; updated ones need them downloaded again
        for package in report.deleted_packages.iter().chain(&report.updated_packages) {
            sqlx::query(
                r#"
                DELETE FROM package_bits
                WHERE repo_id = ? AND source_id = ?
                  AND name = ? AND version = ? AND package_type = ? AND architecture = ?
                "#,
            )
            .bind(repo.get())
            .bind(source.get())
            .bind(&package.key.name)
            .bind(&package.key.version)
            .bind(&package.key.package_type)
            .bind(&package.key.architecture)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        }

        for package in &report.deleted_packages {
            sqlx::query(
                r#"
                DELETE FROM packages
                WHERE repo_id = ? AND source_id = ?
                  AND name = ? AND version = ? AND package_type = ? AND architecture = ?
                "#,
            )
            .bind(repo.get())
            .bind(source.get())
            .bind(&package.key.name)
            .bind(&package.key.version)
            .bind(&package.key.package_type)
            .bind(&package.key.architecture)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        }

        for package in report.new_packages.iter().chain(&report.updated_packages) {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO packages (
                    repo_id, source_id, name, version, package_type, architecture,
                    display_name, file_name, file_created, file_size, sha256, location
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(repo.get())
            .bind(source.get())
            .bind(&package.key.name)
            .bind(&package.key.version)
            .bind(&package.key.package_type)
            .bind(&package.key.architecture)
            .bind(&package.display_name)
            .bind(&package.file_name)
            .bind(package.file_created.as_ref().map(to_millis))
            .bind(package.file_size.map(|size| size as i64))
            .bind(&package.sha256)
            .bind(&package.location)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        }

        commit(tx).await
    }

    async fn packages_missing_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<PackageDetails>> {
        let rows = sqlx::query_as::<_, PackageRow>(
            r#"
            SELECT p.name, p.version, p.package_type, p.architecture, p.display_name,
                   p.file_name, p.file_created, p.file_size, p.sha256, p.location
            FROM packages p
            LEFT JOIN package_bits b
              ON b.repo_id = p.repo_id AND b.source_id = p.source_id
             AND b.name = p.name AND b.version = p.version
             AND b.package_type = p.package_type AND b.architecture = p.architecture
            WHERE p.repo_id = ? AND p.source_id = ? AND b.name IS NULL
            ORDER BY p.name, p.version, p.package_type, p.architecture
            "#,
        )
        .bind(repo.get())
        .bind(source.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(PackageDetails::try_from).collect()
    }

    async fn save_package_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        key: &PackageKey,
        bits: Bytes,
    ) -> Result<()> {
        if !self.package_exists(repo, source, key).await? {
            return Err(BridgeError::NotFound(format!("package {}-{}", key.name, key.version)));
        }

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO package_bits (
                repo_id, source_id, name, version, package_type, architecture, bits
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(repo.get())
        .bind(source.get())
        .bind(&key.name)
        .bind(&key.version)
        .bind(&key.package_type)
        .bind(&key.architecture)
        .bind(bits.to_vec())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn list_distributions(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<DistributionDetails>> {
        let rows = sqlx::query_as::<_, DistributionRow>(
            r#"
            SELECT label, dist_path, distribution_type
            FROM distributions
            WHERE repo_id = ? AND source_id = ?
            ORDER BY label
            "#,
        )
        .bind(repo.get())
        .bind(source.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        let files = sqlx::query_as::<_, DistributionFileRow>(
            r#"
            SELECT f.label, d.dist_path, f.relative_filename, f.sha256, f.last_modified, f.file_size
            FROM distribution_files f
            JOIN distributions d
              ON d.repo_id = f.repo_id AND d.source_id = f.source_id AND d.label = f.label
            WHERE f.repo_id = ? AND f.source_id = ?
            ORDER BY f.label, f.relative_filename
            "#,
        )
        .bind(repo.get())
        .bind(source.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        let mut distributions: BTreeMap<String, DistributionDetails> = rows
            .into_iter()
            .map(|row| {
                let details =
                    DistributionDetails::new(row.label.clone(), row.dist_path, row.distribution_type);
                (row.label, details)
            })
            .collect();

        for file in files {
            if let Some(distribution) = distributions.get_mut(&file.label) {
                distribution.files.push(file.details()?);
            }
        }

        Ok(distributions.into_values().collect())
    }

    async fn merge_distribution_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &DistributionSyncReport,
    ) -> Result<()> {
        let mut tx = self.begin().await?;

        // A new distribution with a known label replaces the old tree
        for distribution in report
            .deleted_distributions
            .iter()
            .chain(&report.new_distributions)
        {
            sqlx::query(
                "DELETE FROM distribution_files WHERE repo_id = ? AND source_id = ? AND label = ?",
            )
            .bind(repo.get())
            .bind(source.get())
            .bind(&distribution.label)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

            sqlx::query("DELETE FROM distributions WHERE repo_id = ? AND source_id = ? AND label = ?")
                .bind(repo.get())
                .bind(source.get())
                .bind(&distribution.label)
                .execute(&mut *tx)
                .await
                .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        }

        for distribution in &report.new_distributions {
            sqlx::query(
                r#"
                INSERT INTO distributions (repo_id, source_id, label, dist_path, distribution_type)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(repo.get())
            .bind(source.get())
            .bind(&distribution.label)
            .bind(&distribution.dist_path)
            .bind(&distribution.distribution_type)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

            for file in &distribution.files {
                sqlx::query(
                    r#"
                    INSERT INTO distribution_files (
                        repo_id, source_id, label, relative_filename,
                        sha256, last_modified, file_size
                    ) VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(repo.get())
                .bind(source.get())
                .bind(&distribution.label)
                .bind(&file.relative_filename)
                .bind(&file.sha256)
                .bind(file.last_modified.as_ref().map(to_millis))
                .bind(file.file_size.map(|size| size as i64))
                .execute(&mut *tx)
                .await
                .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
            }
        }

        commit(tx).await
    }

    async fn distribution_files_missing_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<DistributionFileRef>> {
        let rows = sqlx::query_as::<_, DistributionFileRow>(
            r#"
            SELECT f.label, d.dist_path, f.relative_filename, f.sha256, f.last_modified, f.file_size
            FROM distribution_files f
            JOIN distributions d
              ON d.repo_id = f.repo_id AND d.source_id = f.source_id AND d.label = f.label
            WHERE f.repo_id = ? AND f.source_id = ? AND f.bits IS NULL
            ORDER BY f.label, f.relative_filename
            "#,
        )
        .bind(repo.get())
        .bind(source.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                Ok(DistributionFileRef {
                    file: row.details()?,
                    label: row.label,
                    dist_path: row.dist_path,
                })
            })
            .collect()
    }

    async fn save_distribution_bits(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        file: &DistributionFileRef,
        bits: Bytes,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE distribution_files SET bits = ?
            WHERE repo_id = ? AND source_id = ? AND label = ? AND relative_filename = ?
            "#,
        )
        .bind(bits.to_vec())
        .bind(repo.get())
        .bind(source.get())
        .bind(&file.label)
        .bind(&file.file.relative_filename)
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(BridgeError::NotFound(format!(
                "distribution file {}",
                file.location()
            )));
        }
        Ok(())
    }

    async fn list_advisories(
        &self,
        repo: RepoId,
        source: ContentSourceId,
    ) -> Result<Vec<AdvisoryDetails>> {
        let rows = sqlx::query_as::<_, AdvisoryRow>(
            r#"
            SELECT advisory, advisory_type, synopsis, description, severity,
                   issue_date, packages, cves
            FROM advisories
            WHERE repo_id = ? AND source_id = ?
            ORDER BY advisory
            "#,
        )
        .bind(repo.get())
        .bind(source.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(AdvisoryDetails::try_from).collect()
    }

    async fn merge_advisory_report(
        &self,
        repo: RepoId,
        source: ContentSourceId,
        report: &AdvisorySyncReport,
    ) -> Result<()> {
        let mut tx = self.begin().await?;

        for advisory in &report.deleted_advisories {
            sqlx::query("DELETE FROM advisories WHERE repo_id = ? AND source_id = ? AND advisory = ?")
                .bind(repo.get())
                .bind(source.get())
                .bind(&advisory.advisory)
                .execute(&mut *tx)
                .await
                .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        }

        for advisory in report
            .new_advisories
            .iter()
            .chain(&report.updated_advisories)
        {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO advisories (
                    repo_id, source_id, advisory, advisory_type, synopsis,
                    description, severity, issue_date, packages, cves
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(repo.get())
            .bind(source.get())
            .bind(&advisory.advisory)
            .bind(&advisory.advisory_type)
            .bind(&advisory.synopsis)
            .bind(&advisory.description)
            .bind(&advisory.severity)
            .bind(advisory.issue_date.as_ref().map(to_millis))
            .bind(serde_json::to_string(&advisory.packages)?)
            .bind(serde_json::to_string(&advisory.cves)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        }

        commit(tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{DistributionFileDetails, RepoDetails};
    use chrono::Duration;
    use sqlx::sqlite::SqliteConnectOptions;
    use std::sync::Arc;

    async fn create_test_store() -> SqliteRecordStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteRecordStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn source(id: i64) -> ContentSource {
        ContentSource::new(
            id,
            format!("disk-{}", id),
            ContentSourceType::new("disk"),
            Configuration::new().with("rootDirectory", "/srv/content"),
        )
    }

    fn package(name: &str) -> PackageDetails {
        let mut details = PackageDetails::new(
            PackageKey {
                name: name.to_string(),
                version: "abc123".to_string(),
                package_type: "file".to_string(),
                architecture: "noarch".to_string(),
            },
            name,
            format!("base/{}", name),
        );
        details.file_size = Some(42);
        details.file_created = DateTime::from_timestamp_millis(1_700_000_000_000);
        details
    }

    #[tokio::test]
    async fn test_migrate_is_repeatable() {
        let store = create_test_store().await;
        store.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_repo_round_trip_keeps_source_order() {
        let store = create_test_store().await;
        let repo = Repo::new(1, "base").with_source(source(2)).with_source(source(1));
        store.save_repo(&repo).await.unwrap();

        let loaded = store.load_repo(RepoId(1)).await.unwrap().unwrap();
        assert_eq!(loaded, repo);
        assert_eq!(store.load_sources().await.unwrap().len(), 2);
        assert!(store.load_repo(RepoId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_result_lifecycle() {
        let store = create_test_store().await;
        let target = SyncTarget::Repo(RepoId(1));

        let created = store
            .create_sync_result(SyncResult::new(target, Utc::now()))
            .await
            .unwrap()
            .unwrap();
        assert!(store
            .create_sync_result(SyncResult::new(target, Utc::now()))
            .await
            .unwrap()
            .is_none());

        let mut progress = created.clone();
        progress.status = SyncStatus::PackageMetadata;
        progress.percent_complete = 50;
        progress.append_results("halfway");
        let merged = store.merge_sync_result(progress).await.unwrap();
        assert_eq!(merged.version, 1);

        assert!(store.request_cancel(RepoId(1)).await.unwrap());
        let mut late_progress = merged.clone();
        late_progress.status = SyncStatus::PackageBits;
        let merged = store.merge_sync_result(late_progress).await.unwrap();
        assert_eq!(merged.status, SyncStatus::Cancelling);

        let mut cancelled = merged.clone();
        cancelled.status = SyncStatus::Cancelled;
        cancelled.end_time = Some(Utc::now());
        store.merge_sync_result(cancelled).await.unwrap();

        let latest = store.load_latest_sync_result(target).await.unwrap().unwrap();
        assert_eq!(latest.status, SyncStatus::Cancelled);
        assert_eq!(latest.results, "halfway");
        assert_eq!(latest.percent_complete, 50);
        assert!(latest.end_time.is_some());
        assert_eq!(latest.version, 4);
    }

    #[tokio::test]
    async fn test_concurrent_creates_admit_one_run() {
        let dir = tempfile::tempdir().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("records.db"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .unwrap();
        let store = Arc::new(SqliteRecordStore::new(pool));
        store.migrate().await.unwrap();
        let target = SyncTarget::Repo(RepoId(7));

        let attempts = (0..8).map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create_sync_result(SyncResult::new(target, Utc::now()))
                    .await
            })
        });
        let created = futures::future::join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .filter(Option::is_some)
            .count();

        assert_eq!(created, 1);
        let running = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sync_results WHERE target_kind = ? AND target_id = ?",
        )
        .bind(target.kind())
        .bind(target.raw_id())
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(running, 1);
    }

    #[tokio::test]
    async fn test_latest_sync_result_by_start_time() {
        let store = create_test_store().await;
        let target = SyncTarget::Source(ContentSourceId(3));
        let now = Utc::now();

        let mut first = SyncResult::new(target, now - Duration::hours(1));
        first.status = SyncStatus::Success;
        store.create_sync_result(first).await.unwrap();
        let second = store
            .create_sync_result(SyncResult::new(target, now))
            .await
            .unwrap()
            .unwrap();

        let latest = store.load_latest_sync_result(target).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(
            store.load_sync_result(second.id).await.unwrap().unwrap().id,
            second.id
        );
    }

    #[tokio::test]
    async fn test_merge_unknown_result_is_not_found() {
        let store = create_test_store().await;
        let orphan = SyncResult::new(SyncTarget::Repo(RepoId(1)), Utc::now());
        assert!(matches!(
            store.merge_sync_result(orphan).await,
            Err(BridgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_package_bits_bookkeeping() {
        let store = create_test_store().await;
        let (repo, source) = (RepoId(1), ContentSourceId(1));

        let mut report = PackageSyncReport::default();
        report.add_new_package(package("a.bin"));
        report.add_new_package(package("b.bin"));
        store.merge_package_report(repo, source, &report).await.unwrap();

        let listed = store.list_packages(repo, source).await.unwrap();
        assert_eq!(listed, vec![package("a.bin"), package("b.bin")]);

        store
            .save_package_bits(repo, source, &package("a.bin").key, Bytes::from_static(b"aaaa"))
            .await
            .unwrap();
        assert_eq!(
            store.packages_missing_bits(repo, source).await.unwrap(),
            vec![package("b.bin")]
        );

        let missing_key = package("zzz").key;
        assert!(matches!(
            store
                .save_package_bits(repo, source, &missing_key, Bytes::new())
                .await,
            Err(BridgeError::NotFound(_))
        ));

        let mut update = PackageSyncReport::default();
        update.add_updated_package(package("a.bin"));
        update.add_deleted_package(package("b.bin"));
        store.merge_package_report(repo, source, &update).await.unwrap();
        assert_eq!(
            store.packages_missing_bits(repo, source).await.unwrap(),
            vec![package("a.bin")]
        );
    }

    #[tokio::test]
    async fn test_distribution_files_missing_bits() {
        let store = create_test_store().await;
        let (repo, source) = (RepoId(1), ContentSourceId(1));

        let mut distribution = DistributionDetails::new("dvd", "dists/dvd", "kickstart");
        for name in ["images/boot.iso", "treeinfo"] {
            distribution.files.push(DistributionFileDetails {
                relative_filename: name.to_string(),
                sha256: None,
                last_modified: None,
                file_size: Some(7),
            });
        }
        let mut report = DistributionSyncReport::default();
        report.add_new_distribution(distribution.clone());
        store
            .merge_distribution_report(repo, source, &report)
            .await
            .unwrap();

        assert_eq!(
            store.list_distributions(repo, source).await.unwrap(),
            vec![distribution]
        );

        let missing = store
            .distribution_files_missing_bits(repo, source)
            .await
            .unwrap();
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].location(), "dists/dvd/images/boot.iso");

        store
            .save_distribution_bits(repo, source, &missing[0], Bytes::from_static(b"iso"))
            .await
            .unwrap();
        assert_eq!(
            store
                .distribution_files_missing_bits(repo, source)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_advisories_and_candidates() {
        let store = create_test_store().await;
        let (repo, source) = (RepoId(1), ContentSourceId(1));

        let mut advisory = AdvisoryDetails::new("RHSA-2024:0001", "security", "Fix overflow");
        advisory.cves = vec!["CVE-2024-0001".to_string()];
        let mut report = AdvisorySyncReport::default();
        report.add_new_advisory(advisory.clone());
        store.merge_advisory_report(repo, source, &report).await.unwrap();
        assert_eq!(
            store.list_advisories(repo, source).await.unwrap(),
            vec![advisory]
        );

        store.save_repo(&Repo::new(1, "base")).await.unwrap();
        let mut candidates = RepoImportReport::default();
        candidates.add_repo(RepoDetails::new("base"));
        candidates.add_repo(RepoDetails::new("extras"));
        assert_eq!(
            store.import_candidate_repos(source, &candidates).await.unwrap(),
            1
        );
        assert_eq!(
            store.import_candidate_repos(source, &candidates).await.unwrap(),
            0
        );
    }
}
