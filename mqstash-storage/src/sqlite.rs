//! SQLite storage backend.
//!
//! This module provides a persistent SQLite implementation of all storage traits.
//! Suitable for single-node deployments requiring persistence across restarts.
//!
//! Property columns come from [`PropertyColumns`]; the `connections` table
//! stores the same set with a `push_props_` prefix. Timestamps are stored as
//! milliseconds since the Unix epoch.

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mqstash_core::QoS;
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension, Row};

use crate::{
    ConnectionRecord, ConnectionRecordStore, MessageField, MessageRecord, MessageRecordStore,
    PropertyColumns, Result, StorageError,
};

/// Column prefix of the push-prop shadow in the `connections` table.
const PUSH_PROPS_PREFIX: &str = "push_props_";

const MESSAGE_COLUMNS: &[&str] = &[
    "id",
    "connection_id",
    "topic",
    "payload",
    "qos",
    "retain",
    "out",
    "create_at",
];

const CONNECTION_COLUMNS: &[&str] = &["id", "client_id", "create_at", "update_at"];

/// Upper bound of ids bound into a single `DELETE ... IN (...)` statement.
const DELETE_CHUNK: usize = 500;

/// SQLite storage backend implementing all storage traits.
///
/// Uses a single SQLite connection protected by a mutex. For high-concurrency
/// scenarios, consider using a connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create a new SQLite store with the given database path.
    ///
    /// Creates the parent directory, the database file and the tables if they
    /// don't exist.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::OperationFailed(e.to_string()))?;

        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                connection_id TEXT,
                topic TEXT,
                payload BLOB,
                qos INTEGER,
                retain INTEGER,
                out INTEGER,
                create_at INTEGER,
                {message_props}
            );

            CREATE INDEX IF NOT EXISTS idx_messages_connection
                ON messages(connection_id);

            CREATE TABLE IF NOT EXISTS connections (
                id TEXT PRIMARY KEY,
                client_id TEXT,
                create_at INTEGER NOT NULL,
                update_at INTEGER,
                {push_props}
            );
            ",
            message_props = PropertyColumns::column_defs(""),
            push_props = PropertyColumns::column_defs(PUSH_PROPS_PREFIX),
        ))?;

        Ok(())
    }

    /// Execute a blocking operation on the tokio runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StorageError::OperationFailed(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::OperationFailed(e.to_string()))?
    }
}

fn qos_to_int(qos: QoS) -> i32 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
        QoS::Invalid => -1,
    }
}

fn int_to_qos(val: i32) -> QoS {
    match val {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::Invalid,
    }
}

fn millis_to_datetime(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn message_column_list() -> String {
    let mut columns: Vec<String> = MESSAGE_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend(PropertyColumns::column_names(""));
    columns.join(", ")
}

fn connection_column_list() -> String {
    let mut columns: Vec<String> = CONNECTION_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend(PropertyColumns::column_names(PUSH_PROPS_PREFIX));
    columns.join(", ")
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    let payload: Option<Vec<u8>> = row.get(3)?;
    let qos: Option<i32> = row.get(4)?;
    let create_at: Option<i64> = row.get(7)?;

    Ok(MessageRecord {
        id: row.get(0)?,
        connection_id: row.get(1)?,
        topic: row.get(2)?,
        payload: payload.map(Bytes::from),
        qos: qos.map(int_to_qos),
        retain: row.get(5)?,
        out: row.get(6)?,
        create_at: create_at.map(|ms| millis_to_datetime(7, ms)).transpose()?,
        properties: PropertyColumns::from_row(row, MESSAGE_COLUMNS.len())?,
    })
}

fn message_values(record: &MessageRecord) -> Vec<Value> {
    let mut values = vec![
        Value::from(record.id.clone()),
        Value::from(record.connection_id.clone()),
        Value::from(record.topic.clone()),
        Value::from(record.payload.as_ref().map(|b| b.to_vec())),
        Value::from(record.qos.map(qos_to_int)),
        Value::from(record.retain),
        Value::from(record.out),
        Value::from(record.create_at.map(|t| t.timestamp_millis())),
    ];
    values.extend(record.properties.to_sql_values());
    values
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<ConnectionRecord> {
    let create_at: i64 = row.get(2)?;
    let update_at: Option<i64> = row.get(3)?;

    Ok(ConnectionRecord {
        id: row.get(0)?,
        client_id: row.get(1)?,
        create_at: millis_to_datetime(2, create_at)?,
        update_at: update_at.map(|ms| millis_to_datetime(3, ms)).transpose()?,
        push_props: PropertyColumns::from_row(row, CONNECTION_COLUMNS.len())?,
    })
}

fn connection_values(record: &ConnectionRecord) -> Vec<Value> {
    let mut values = vec![
        Value::from(record.id.clone()),
        Value::from(record.client_id.clone()),
        Value::from(record.create_at.timestamp_millis()),
        Value::from(record.update_at.map(|t| t.timestamp_millis())),
    ];
    values.extend(record.push_props.to_sql_values());
    values
}

#[async_trait]
impl MessageRecordStore for SqliteStore {
    async fn find_message(&self, id: &str) -> Result<Option<MessageRecord>> {
        let id = id.to_string();

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages WHERE id = ?1",
                message_column_list()
            ))?;

            Ok(stmt.query_row(params![id], message_from_row).optional()?)
        })
        .await
    }

    async fn save_message(&self, record: &MessageRecord) -> Result<MessageRecord> {
        let record = record.clone();

        self.blocking(move |conn| {
            let values = message_values(&record);
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO messages ({}) VALUES ({})",
                    message_column_list(),
                    placeholders(values.len())
                ),
                params_from_iter(values),
            )?;
            Ok(record)
        })
        .await
    }

    async fn delete_messages(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.to_vec();

        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            for chunk in ids.chunks(DELETE_CHUNK) {
                tx.execute(
                    &format!(
                        "DELETE FROM messages WHERE id IN ({})",
                        placeholders(chunk.len())
                    ),
                    params_from_iter(chunk),
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn query_messages(
        &self,
        field: MessageField,
        value: &str,
    ) -> Result<Vec<MessageRecord>> {
        let value = value.to_string();

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages WHERE {} = ?1 ORDER BY create_at, id",
                message_column_list(),
                field.column()
            ))?;
            let rows = stmt.query_map(params![value], message_from_row)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
    }
}

#[async_trait]
impl ConnectionRecordStore for SqliteStore {
    async fn find_connection(&self, id: &str) -> Result<Option<ConnectionRecord>> {
        let id = id.to_string();

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM connections WHERE id = ?1",
                connection_column_list()
            ))?;

            Ok(stmt.query_row(params![id], connection_from_row).optional()?)
        })
        .await
    }

    async fn save_connection(&self, record: &ConnectionRecord) -> Result<ConnectionRecord> {
        let record = record.clone();

        self.blocking(move |conn| {
            let values = connection_values(&record);
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO connections ({}) VALUES ({})",
                    connection_column_list(),
                    placeholders(values.len())
                ),
                params_from_iter(values),
            )?;
            Ok(record)
        })
        .await
    }

    async fn delete_connection(&self, id: &str) -> Result<()> {
        let id = id.to_string();

        self.blocking(move |conn| {
            conn.execute("DELETE FROM connections WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    async fn list_connections(&self) -> Result<Vec<String>> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare("SELECT id FROM connections ORDER BY id")?;
            let rows = stmt.query_map([], |row| row.get(0))?;

            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            Ok(ids)
        })
        .await
    }
}
