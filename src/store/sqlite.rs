use super::{AccessStore, InstallationStore, StoreError};
use crate::runner::RunnerAccess;
use crate::shared::TeamId;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

/// Both stores in one database file. A connection is opened per call so the
/// store can be shared across handler threads without a lock.
pub struct SqliteStore {
    db_path: PathBuf,
    fallback_bot_token: Option<String>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
            fallback_bot_token: None,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Token used for workspaces with no row in `installations`.
    pub fn with_fallback_bot_token(mut self, token: Option<String>) -> Self {
        self.fallback_bot_token = token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        self
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.connect()?
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS runner_access (
                    team_id TEXT PRIMARY KEY,
                    runner_url TEXT NOT NULL,
                    runner_api_key TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS installations (
                    team_id TEXT PRIMARY KEY,
                    bot_token TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                ",
            )
            .map_err(|source| StoreError::Sql { source })
    }

    pub fn list_teams(&self) -> Result<Vec<String>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT team_id FROM installations
                 UNION SELECT team_id FROM runner_access
                 ORDER BY team_id",
            )
            .map_err(|source| StoreError::Sql { source })?;
        let rows = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|source| StoreError::Sql { source })?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|source| StoreError::Sql { source })
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let connection = Connection::open(&self.db_path).map_err(|source| StoreError::Open {
            path: self.db_path.display().to_string(),
            source,
        })?;
        connection
            .execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|source| StoreError::Sql { source })?;
        Ok(connection)
    }
}

fn updated_at() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl AccessStore for SqliteStore {
    fn fetch(&self, team_id: &TeamId) -> Result<Option<RunnerAccess>, StoreError> {
        self.connect()?
            .query_row(
                "SELECT runner_url, runner_api_key FROM runner_access WHERE team_id = ?1",
                params![team_id.as_str()],
                |row| {
                    Ok(RunnerAccess::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                    ))
                },
            )
            .optional()
            .map_err(|source| StoreError::Sql { source })
    }

    fn store(&self, team_id: &TeamId, access: &RunnerAccess) -> Result<(), StoreError> {
        self.connect()?
            .execute(
                "INSERT INTO runner_access (team_id, runner_url, runner_api_key, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(team_id) DO UPDATE SET
                    runner_url = excluded.runner_url,
                    runner_api_key = excluded.runner_api_key,
                    updated_at = excluded.updated_at",
                params![
                    team_id.as_str(),
                    access.runner_url,
                    access.runner_api_key,
                    updated_at()
                ],
            )
            .map_err(|source| StoreError::Sql { source })?;
        Ok(())
    }
}

impl InstallationStore for SqliteStore {
    fn authorize(&self, team_id: &TeamId) -> Result<String, StoreError> {
        let stored = self
            .connect()?
            .query_row(
                "SELECT bot_token FROM installations WHERE team_id = ?1",
                params![team_id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|source| StoreError::Sql { source })?;
        stored
            .or_else(|| self.fallback_bot_token.clone())
            .ok_or_else(|| StoreError::NotInstalled {
                team_id: team_id.to_string(),
            })
    }

    fn store_installation(&self, team_id: &TeamId, bot_token: &str) -> Result<(), StoreError> {
        self.connect()?
            .execute(
                "INSERT INTO installations (team_id, bot_token, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(team_id) DO UPDATE SET
                    bot_token = excluded.bot_token,
                    updated_at = excluded.updated_at",
                params![team_id.as_str(), bot_token.trim(), updated_at()],
            )
            .map_err(|source| StoreError::Sql { source })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn team(raw: &str) -> TeamId {
        TeamId::parse(raw).expect("team id")
    }

    #[test]
    fn access_upsert_replaces_previous_value() {
        let dir = tempdir().expect("tempdir");
        let store = SqliteStore::open(&dir.path().join("db/bridge.sqlite3")).expect("open");
        assert_eq!(store.fetch(&team("T1")).expect("fetch"), None);

        store
            .store(&team("T1"), &RunnerAccess::new("https://a.example", "key-a"))
            .expect("store");
        store
            .store(&team("T1"), &RunnerAccess::new("https://b.example", "key-b"))
            .expect("store");

        let access = store.fetch(&team("T1")).expect("fetch").expect("present");
        assert_eq!(access.runner_url, "https://b.example");
        assert_eq!(access.runner_api_key, "key-b");
        assert_eq!(store.fetch(&team("T2")).expect("fetch"), None);
    }

    #[test]
    fn authorize_prefers_installation_then_fallback() {
        let dir = tempdir().expect("tempdir");
        let store = SqliteStore::open(&dir.path().join("bridge.sqlite3")).expect("open");
        assert!(matches!(
            store.authorize(&team("T1")),
            Err(StoreError::NotInstalled { .. })
        ));

        let store = store.with_fallback_bot_token(Some("xoxb-fallback".to_string()));
        assert_eq!(store.authorize(&team("T1")).expect("fallback"), "xoxb-fallback");

        store
            .store_installation(&team("T1"), "xoxb-installed")
            .expect("install");
        assert_eq!(store.authorize(&team("T1")).expect("stored"), "xoxb-installed");
        assert_eq!(store.list_teams().expect("teams"), vec!["T1".to_string()]);
    }

    #[test]
    fn blank_fallback_token_is_ignored() {
        let dir = tempdir().expect("tempdir");
        let store = SqliteStore::open(&dir.path().join("bridge.sqlite3"))
            .expect("open")
            .with_fallback_bot_token(Some("  ".to_string()));
        assert!(store.authorize(&team("T9")).is_err());
    }
}
