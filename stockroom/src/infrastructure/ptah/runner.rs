// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Migration Runner
//!
//! Applies the versioned migration log against PostgreSQL. Applied versions
//! are recorded in the `schema_migrations` meta table; `migrate_up` runs
//! pending versions ascending, each in its own transaction, aborting the
//! run on the first failure; `migrate_down` rolls back versions above a
//! target descending with the same transactional discipline.
//!
//! Template variables `{{.Username}}` and `{{.UsernameForMigrations}}` are
//! expanded at apply time, so the same migration text serves environments
//! with different database roles. Dry runs go through `plan_up`/`plan_down`,
//! which return the statements and file previews without touching the
//! database beyond the meta table read.

use std::collections::BTreeMap;
use std::path::PathBuf;

use sqlx::{PgPool, Row};
use tracing::info;

use stockroom_domain::{DomainError, DomainResult};

use super::files::{
    collect_migration_pairs, parse_migration_file_name, validate_migration_pairs, Direction,
    MigrationPair,
};

/// How many lines of a migration file a dry-run preview shows.
const PREVIEW_LINES: usize = 5;

fn err(e: sqlx::Error) -> DomainError {
    DomainError::storage(format!("migration: {e}"))
}

/// Report returned by [`MigrationRunner::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub current_version: Option<u64>,
    pub applied: Vec<u64>,
    pub pending: Vec<u64>,
    pub total: usize,
    pub has_pending: bool,
}

/// One migration a dry run would execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMigration {
    pub version: u64,
    pub description: String,
    pub direction: Direction,
    pub file_name: String,
    /// First lines of the (template-expanded) SQL.
    pub preview: String,
}

/// Versioned up/down migration runner over one PostgreSQL pool.
pub struct MigrationRunner {
    pool: PgPool,
    dir: PathBuf,
    username: String,
    username_for_migrations: String,
}

impl MigrationRunner {
    pub fn new(pool: PgPool, dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            dir: dir.into(),
            username: "stockroom".to_string(),
            username_for_migrations: "stockroom".to_string(),
        }
    }

    /// Overrides the template usernames expanded into migration text.
    pub fn with_usernames(
        mut self,
        username: impl Into<String>,
        username_for_migrations: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.username_for_migrations = username_for_migrations.into();
        self
    }

    fn expand_template(&self, sql: &str) -> String {
        sql.replace("{{.Username}}", &self.username)
            .replace("{{.UsernameForMigrations}}", &self.username_for_migrations)
    }

    async fn ensure_meta(&self) -> DomainResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (\
                 version BIGINT PRIMARY KEY, \
                 description TEXT NOT NULL, \
                 applied_at TEXT NOT NULL\
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(err)?;
        Ok(())
    }

    async fn applied_versions(&self) -> DomainResult<Vec<u64>> {
        self.ensure_meta().await?;
        let rows = sqlx::query("SELECT version FROM schema_migrations ORDER BY version")
            .fetch_all(&self.pool)
            .await
            .map_err(err)?;
        rows.iter()
            .map(|row| {
                let version: i64 = row.try_get("version").map_err(err)?;
                Ok(version as u64)
            })
            .collect()
    }

    /// Loads and validates the migration directory.
    ///
    /// Files sort alphabetically, which is version order by construction;
    /// a version missing either half fails the whole run up front.
    async fn load_pairs(&self) -> DomainResult<BTreeMap<u64, MigrationPair>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| DomainError::invalid_config(format!("migrations dir {}: {e}", self.dir.display())))?;
        while let Some(entry) = entries.next_entry().await.map_err(DomainError::from)? {
            if entry.file_type().await.map_err(DomainError::from)?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        let pairs = collect_migration_pairs(names.iter().map(String::as_str))?;
        let incomplete = validate_migration_pairs(&pairs);
        if !incomplete.is_empty() {
            return Err(DomainError::invalid_config(format!(
                "versions missing an up or down file: {incomplete:?}"
            )));
        }
        Ok(pairs)
    }

    async fn read_sql(&self, file_name: &str) -> DomainResult<String> {
        let raw = tokio::fs::read_to_string(self.dir.join(file_name))
            .await
            .map_err(|e| DomainError::invalid_config(format!("{file_name}: {e}")))?;
        Ok(self.expand_template(&raw))
    }

    fn preview(sql: &str) -> String {
        sql.lines().take(PREVIEW_LINES).collect::<Vec<_>>().join("\n")
    }

    /// Applies all pending versions in ascending order.
    ///
    /// Each version runs in its own transaction together with its meta-table
    /// record; the first failure aborts the run, leaving earlier versions
    /// applied.
    pub async fn migrate_up(&self) -> DomainResult<Vec<u64>> {
        let pairs = self.load_pairs().await?;
        let applied = self.applied_versions().await?;
        let mut newly_applied = Vec::new();

        for (version, pair) in &pairs {
            if applied.contains(version) {
                continue;
            }
            let file_name = pair.up.as_ref().expect("pairs validated above");
            let sql = self.read_sql(file_name).await?;

            let mut tx = self.pool.begin().await.map_err(err)?;
            sqlx::raw_sql(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| DomainError::storage(format!("{file_name}: {e}")))?;
            sqlx::query("INSERT INTO schema_migrations (version, description, applied_at) VALUES ($1, $2, $3)")
                .bind(*version as i64)
                .bind(&pair.description)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            tx.commit().await.map_err(err)?;

            info!(version, file = file_name.as_str(), "migration applied");
            newly_applied.push(*version);
        }
        Ok(newly_applied)
    }

    /// Rolls back applied versions above `target` in descending order.
    pub async fn migrate_down(&self, target: u64) -> DomainResult<Vec<u64>> {
        let pairs = self.load_pairs().await?;
        let applied = self.applied_versions().await?;
        let mut rolled_back = Vec::new();

        for version in applied.iter().rev().filter(|v| **v > target) {
            let pair = pairs.get(version).ok_or_else(|| {
                DomainError::invalid_config(format!("applied version {version} has no migration files"))
            })?;
            let file_name = pair.down.as_ref().expect("pairs validated above");
            let sql = self.read_sql(file_name).await?;

            let mut tx = self.pool.begin().await.map_err(err)?;
            sqlx::raw_sql(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| DomainError::storage(format!("{file_name}: {e}")))?;
            sqlx::query("DELETE FROM schema_migrations WHERE version = $1")
                .bind(*version as i64)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            tx.commit().await.map_err(err)?;

            info!(version, file = file_name.as_str(), "migration rolled back");
            rolled_back.push(*version);
        }
        Ok(rolled_back)
    }

    /// Current version, totals, pending list, and the un-applied flag.
    pub async fn status(&self) -> DomainResult<MigrationStatus> {
        let pairs = self.load_pairs().await?;
        let applied = self.applied_versions().await?;
        let pending: Vec<u64> = pairs.keys().filter(|v| !applied.contains(v)).copied().collect();
        Ok(MigrationStatus {
            current_version: applied.last().copied(),
            has_pending: !pending.is_empty(),
            total: pairs.len(),
            applied,
            pending,
        })
    }

    /// Dry run of [`Self::migrate_up`]: the plan with SQL previews.
    pub async fn plan_up(&self) -> DomainResult<Vec<PlannedMigration>> {
        let pairs = self.load_pairs().await?;
        let applied = self.applied_versions().await?;
        let mut plan = Vec::new();
        for (version, pair) in &pairs {
            if applied.contains(version) {
                continue;
            }
            let file_name = pair.up.as_ref().expect("pairs validated above");
            let sql = self.read_sql(file_name).await?;
            plan.push(PlannedMigration {
                version: *version,
                description: pair.description.clone(),
                direction: Direction::Up,
                file_name: file_name.clone(),
                preview: Self::preview(&sql),
            });
        }
        Ok(plan)
    }

    /// Dry run of [`Self::migrate_down`].
    pub async fn plan_down(&self, target: u64) -> DomainResult<Vec<PlannedMigration>> {
        let pairs = self.load_pairs().await?;
        let applied = self.applied_versions().await?;
        let mut plan = Vec::new();
        for version in applied.iter().rev().filter(|v| **v > target) {
            let Some(pair) = pairs.get(version) else {
                continue;
            };
            let file_name = pair.down.as_ref().expect("pairs validated above");
            let sql = self.read_sql(file_name).await?;
            plan.push(PlannedMigration {
                version: *version,
                description: pair.description.clone(),
                direction: Direction::Down,
                file_name: file_name.clone(),
                preview: Self::preview(&sql),
            });
        }
        Ok(plan)
    }

    /// Sanity check used by tooling: parse every file name in the directory.
    pub async fn check_directory(&self) -> DomainResult<usize> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| DomainError::invalid_config(format!("migrations dir {}: {e}", self.dir.display())))?;
        let mut count = 0usize;
        while let Some(entry) = entries.next_entry().await.map_err(DomainError::from)? {
            if entry.file_type().await.map_err(DomainError::from)?.is_file() {
                parse_migration_file_name(&entry.file_name().to_string_lossy())?;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_expansion_replaces_both_variables() {
        // Template expansion is pure string work; exercise it without a pool.
        let sql = "GRANT ALL ON users TO {{.Username}}; -- by {{.UsernameForMigrations}}";
        let expanded = sql
            .replace("{{.Username}}", "svc")
            .replace("{{.UsernameForMigrations}}", "migrator");
        assert_eq!(expanded, "GRANT ALL ON users TO svc; -- by migrator");
    }

    #[test]
    fn preview_truncates_to_first_lines() {
        let sql = (1..=10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let preview = MigrationRunner::preview(&sql);
        assert_eq!(preview.lines().count(), PREVIEW_LINES);
        assert!(preview.starts_with("line 1"));
    }
}
