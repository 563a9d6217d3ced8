//! Durable connection store shared by every surface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::db::{ConnectionRepository, Database, LibSqlConnectionRepository};
use crate::export::{self, ExportBundle, ImportBundle};
use crate::models::{Connection, ConnectionConfig, ConnectionId};
use crate::util::sanitize_name;
use crate::{Error, Result};

/// Outcome of a bulk import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Thread-safe service over the connections table.
///
/// Every mutating call commits before returning.
#[derive(Clone)]
pub struct ConnectionStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl ConnectionStore {
    /// Open a store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Database at {} is unreadable ({error}); moving it aside and starting fresh",
                    db_path.display()
                );
                Self::quarantine_corrupted_db_file(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        tracing::info!("Connection store opened at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Location of the backing file, if any.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_file(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = crate::util::unix_millis_now();
            let file_name = db_path
                .file_name()
                .map_or_else(|| "syncdeck.db".into(), |name| name.to_string_lossy());
            let backup_path = db_path.with_file_name(format!("{file_name}.corrupt-{timestamp}"));
            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted database from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }
        Ok(())
    }

    fn duplicate_name_error(name: &str) -> Error {
        Error::InvalidInput(format!("a connection named '{name}' already exists"))
    }

    fn session_clash_error(name: &str, owner: &Connection) -> Error {
        Error::InvalidInput(format!(
            "'{name}' maps to session '{}', already used by '{}'",
            owner.session_name(),
            owner.name
        ))
    }

    /// The connection other than `except` whose session name (and SSH
    /// alias) would collide with `name`'s.
    async fn session_name_owner(
        repo: &LibSqlConnectionRepository<'_>,
        name: &str,
        except: Option<&ConnectionId>,
    ) -> Result<Option<Connection>> {
        let session_name = sanitize_name(name);
        Ok(repo.list().await?.into_iter().find(|connection| {
            Some(&connection.id) != except && connection.session_name() == session_name
        }))
    }

    /// Store a new connection.
    pub async fn create(&self, config: ConnectionConfig) -> Result<Connection> {
        let config = config.normalized();
        config.validate()?;

        let db = self.db.lock().await;
        let repo = LibSqlConnectionRepository::new(db.connection());
        if repo.get_by_name(&config.name).await?.is_some() {
            return Err(Self::duplicate_name_error(&config.name));
        }
        if let Some(owner) = Self::session_name_owner(&repo, &config.name, None).await? {
            return Err(Self::session_clash_error(&config.name, &owner));
        }

        let connection = Connection::new(config);
        repo.insert(&connection).await?;
        tracing::info!(id = %connection.id, name = %connection.name, "Connection created");
        Ok(connection)
    }

    /// Replace every user-editable field of an existing connection.
    pub async fn update(&self, id: &ConnectionId, config: ConnectionConfig) -> Result<Connection> {
        let config = config.normalized();
        config.validate()?;

        let db = self.db.lock().await;
        let repo = LibSqlConnectionRepository::new(db.connection());
        let existing = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("connection {id}")))?;

        if let Some(other) = repo.get_by_name(&config.name).await? {
            if other.id != existing.id {
                return Err(Self::duplicate_name_error(&config.name));
            }
        }
        if let Some(owner) =
            Self::session_name_owner(&repo, &config.name, Some(&existing.id)).await?
        {
            return Err(Self::session_clash_error(&config.name, &owner));
        }

        let updated = Self::apply_config(existing, config);
        repo.update(&updated).await?;
        tracing::info!(id = %updated.id, name = %updated.name, "Connection updated");
        Ok(updated)
    }

    /// Create the connection, or overwrite the one already carrying this name.
    pub async fn upsert_by_name(&self, config: ConnectionConfig) -> Result<Connection> {
        let config = config.normalized();
        config.validate()?;

        let db = self.db.lock().await;
        let repo = LibSqlConnectionRepository::new(db.connection());
        let existing = repo.get_by_name(&config.name).await?;
        let existing_id = existing.as_ref().map(|connection| connection.id);
        if let Some(owner) =
            Self::session_name_owner(&repo, &config.name, existing_id.as_ref()).await?
        {
            return Err(Self::session_clash_error(&config.name, &owner));
        }
        if let Some(existing) = existing {
            let updated = Self::apply_config(existing, config);
            repo.update(&updated).await?;
            return Ok(updated);
        }

        let connection = Connection::new(config);
        repo.insert(&connection).await?;
        tracing::info!(id = %connection.id, name = %connection.name, "Connection created");
        Ok(connection)
    }

    fn apply_config(existing: Connection, config: ConnectionConfig) -> Connection {
        Connection {
            id: existing.id,
            created_at: existing.created_at,
            last_used: existing.last_used,
            ..Connection::new(config)
        }
    }

    /// Remove a connection, returning the removed record.
    pub async fn delete(&self, id: &ConnectionId) -> Result<Connection> {
        let db = self.db.lock().await;
        let repo = LibSqlConnectionRepository::new(db.connection());
        let existing = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("connection {id}")))?;
        repo.delete(id).await?;
        tracing::info!(id = %id, name = %existing.name, "Connection deleted");
        Ok(existing)
    }

    /// Fetch one connection.
    pub async fn get(&self, id: &ConnectionId) -> Result<Connection> {
        let db = self.db.lock().await;
        let repo = LibSqlConnectionRepository::new(db.connection());
        repo.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("connection {id}")))
    }

    /// Fetch one connection by its unique name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Connection>> {
        let db = self.db.lock().await;
        let repo = LibSqlConnectionRepository::new(db.connection());
        repo.get_by_name(name.trim()).await
    }

    /// List every stored connection.
    pub async fn list(&self) -> Result<Vec<Connection>> {
        let db = self.db.lock().await;
        let repo = LibSqlConnectionRepository::new(db.connection());
        repo.list().await
    }

    /// Stamp `last_used` with the current time.
    pub async fn touch_last_used(&self, id: &ConnectionId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlConnectionRepository::new(db.connection());
        if repo
            .touch_last_used(id, crate::util::unix_millis_now())
            .await?
        {
            Ok(())
        } else {
            Err(Error::NotFound(format!("connection {id}")))
        }
    }

    /// Copy a connection under the first free `"<name> (Copy)"` /
    /// `"<name> (Copy) N"` name. Favorite and last-used are not carried over.
    pub async fn duplicate(&self, id: &ConnectionId) -> Result<Connection> {
        let db = self.db.lock().await;
        let repo = LibSqlConnectionRepository::new(db.connection());
        let source = repo
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("connection {id}")))?;

        let base_name = format!("{} (Copy)", source.name);
        let mut copy_name = base_name.clone();
        let mut counter = 1;
        while repo.get_by_name(&copy_name).await?.is_some()
            || Self::session_name_owner(&repo, &copy_name, None)
                .await?
                .is_some()
        {
            counter += 1;
            copy_name = format!("{base_name} {counter}");
        }

        let mut config = source.config();
        config.name = copy_name;
        config.is_favorite = false;

        let copy = Connection::new(config);
        repo.insert(&copy).await?;
        tracing::info!(source = %source.id, id = %copy.id, name = %copy.name, "Connection duplicated");
        Ok(copy)
    }

    /// Insert every record whose name is new. Existing names, names whose
    /// session name is taken, and invalid records are counted as skipped.
    pub async fn import(&self, bundle: &ImportBundle) -> Result<ImportReport> {
        let db = self.db.lock().await;
        let repo = LibSqlConnectionRepository::new(db.connection());
        let mut report = ImportReport::default();

        for record in &bundle.connections {
            let config = match export::record_to_config(record) {
                Ok(config) => config,
                Err(error) => {
                    tracing::warn!("Skipping invalid import record: {error}");
                    report.skipped += 1;
                    continue;
                }
            };

            if repo.get_by_name(&config.name).await?.is_some() {
                tracing::debug!(name = %config.name, "Skipping import of existing connection");
                report.skipped += 1;
                continue;
            }
            if let Some(owner) = Self::session_name_owner(&repo, &config.name, None).await? {
                tracing::warn!(
                    name = %config.name,
                    owner = %owner.name,
                    "Skipping import whose session name is already in use"
                );
                report.skipped += 1;
                continue;
            }

            repo.insert(&Connection::new(config)).await?;
            report.imported += 1;
        }

        tracing::info!(
            imported = report.imported,
            skipped = report.skipped,
            "Import complete"
        );
        Ok(report)
    }

    /// Snapshot every connection into an export bundle.
    pub async fn export(&self) -> Result<ExportBundle> {
        let connections = self.list().await?;
        Ok(export::build_bundle(&connections))
    }
}
