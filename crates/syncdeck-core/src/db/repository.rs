//! Connection repository implementation

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::models::{Connection, ConnectionId};
use libsql::{params, Connection as LibSqlConnection, Value};

const SELECT_COLUMNS: &str = "SELECT id, name, host, port, username, remote_path, local_path, ssh_key_path, sync_mode, tags, is_favorite, created_at, last_used FROM connections";

/// Trait for connection storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ConnectionRepository {
    /// Insert a new record. The caller has already checked name uniqueness.
    async fn insert(&self, connection: &Connection) -> Result<()>;

    /// Replace every field of an existing record
    async fn update(&self, connection: &Connection) -> Result<()>;

    /// Get a connection by ID
    async fn get(&self, id: &ConnectionId) -> Result<Option<Connection>>;

    /// Get a connection by its unique name
    async fn get_by_name(&self, name: &str) -> Result<Option<Connection>>;

    /// List all connections, oldest first
    async fn list(&self) -> Result<Vec<Connection>>;

    /// Delete a connection; returns whether a row was removed
    async fn delete(&self, id: &ConnectionId) -> Result<bool>;

    /// Set `last_used`; returns whether a row was updated
    async fn touch_last_used(&self, id: &ConnectionId, at: i64) -> Result<bool>;
}

/// libSQL implementation of `ConnectionRepository`
pub struct LibSqlConnectionRepository<'a> {
    conn: &'a LibSqlConnection,
}

impl<'a> LibSqlConnectionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a LibSqlConnection) -> Self {
        Self { conn }
    }

    fn optional_text(value: Option<&str>) -> Value {
        value.map_or(Value::Null, |text| Value::Text(text.to_string()))
    }

    fn optional_integer(value: Option<i64>) -> Value {
        value.map_or(Value::Null, Value::Integer)
    }

    fn row_optional_text(row: &libsql::Row, idx: i32) -> Result<Option<String>> {
        match row.get_value(idx)? {
            Value::Null => Ok(None),
            Value::Text(text) => Ok(Some(text)),
            other => Err(Error::Database(format!(
                "unexpected value in column {idx}: {other:?}"
            ))),
        }
    }

    fn row_optional_integer(row: &libsql::Row, idx: i32) -> Result<Option<i64>> {
        match row.get_value(idx)? {
            Value::Null => Ok(None),
            Value::Integer(value) => Ok(Some(value)),
            other => Err(Error::Database(format!(
                "unexpected value in column {idx}: {other:?}"
            ))),
        }
    }

    /// Parse a connection from a database row
    fn parse_connection(row: &libsql::Row) -> Result<Connection> {
        let id: String = row.get(0)?;
        let port: i64 = row.get(3)?;
        let sync_mode: String = row.get(8)?;
        let tags: String = row.get(9)?;
        let tags: BTreeSet<String> = serde_json::from_str(&tags).unwrap_or_default();

        Ok(Connection {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid connection id '{id}'")))?,
            name: row.get(1)?,
            host: row.get(2)?,
            port: u16::try_from(port)
                .map_err(|_| Error::Database(format!("invalid port {port}")))?,
            username: row.get(4)?,
            remote_path: row.get(5)?,
            local_path: row.get(6)?,
            ssh_key_path: Self::row_optional_text(row, 7)?,
            sync_mode: sync_mode.parse()?,
            tags,
            is_favorite: row.get::<i32>(10)? != 0,
            created_at: row.get(11)?,
            last_used: Self::row_optional_integer(row, 12)?,
        })
    }

    async fn query_one(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Option<Connection>> {
        let mut rows = self.conn.query(sql, params).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_connection(&row)?)),
            None => Ok(None),
        }
    }
}

impl ConnectionRepository for LibSqlConnectionRepository<'_> {
    async fn insert(&self, connection: &Connection) -> Result<()> {
        let tags = serde_json::to_string(&connection.tags)?;
        self.conn
            .execute(
                "INSERT INTO connections (id, name, host, port, username, remote_path, local_path, ssh_key_path, sync_mode, tags, is_favorite, created_at, last_used)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    connection.id.as_str(),
                    connection.name.as_str(),
                    connection.host.as_str(),
                    i64::from(connection.port),
                    connection.username.as_str(),
                    connection.remote_path.as_str(),
                    connection.local_path.as_str(),
                    Self::optional_text(connection.ssh_key_path.as_deref()),
                    connection.sync_mode.as_str(),
                    tags,
                    i32::from(connection.is_favorite),
                    connection.created_at,
                    Self::optional_integer(connection.last_used)
                ],
            )
            .await?;
        Ok(())
    }

    async fn update(&self, connection: &Connection) -> Result<()> {
        let tags = serde_json::to_string(&connection.tags)?;
        let affected = self
            .conn
            .execute(
                "UPDATE connections SET name = ?, host = ?, port = ?, username = ?, remote_path = ?, local_path = ?,
                 ssh_key_path = ?, sync_mode = ?, tags = ?, is_favorite = ?, last_used = ? WHERE id = ?",
                params![
                    connection.name.as_str(),
                    connection.host.as_str(),
                    i64::from(connection.port),
                    connection.username.as_str(),
                    connection.remote_path.as_str(),
                    connection.local_path.as_str(),
                    Self::optional_text(connection.ssh_key_path.as_deref()),
                    connection.sync_mode.as_str(),
                    tags,
                    i32::from(connection.is_favorite),
                    Self::optional_integer(connection.last_used),
                    connection.id.as_str()
                ],
            )
            .await?;

        if affected == 0 {
            return Err(Error::NotFound(format!("connection {}", connection.id)));
        }
        Ok(())
    }

    async fn get(&self, id: &ConnectionId) -> Result<Option<Connection>> {
        self.query_one(&format!("{SELECT_COLUMNS} WHERE id = ?"), [id.as_str()])
            .await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Connection>> {
        self.query_one(&format!("{SELECT_COLUMNS} WHERE name = ?"), [name])
            .await
    }

    async fn list(&self) -> Result<Vec<Connection>> {
        let mut rows = self
            .conn
            .query(&format!("{SELECT_COLUMNS} ORDER BY created_at ASC, id ASC"), ())
            .await?;

        let mut connections = Vec::new();
        while let Some(row) = rows.next().await? {
            connections.push(Self::parse_connection(&row)?);
        }
        Ok(connections)
    }

    async fn delete(&self, id: &ConnectionId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM connections WHERE id = ?", [id.as_str()])
            .await?;
        Ok(affected > 0)
    }

    async fn touch_last_used(&self, id: &ConnectionId, at: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "UPDATE connections SET last_used = ? WHERE id = ?",
                params![at, id.as_str()],
            )
            .await?;
        Ok(affected > 0)
    }
}
