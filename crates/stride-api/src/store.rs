//! Authoritative activity store backed by libSQL.
//!
//! Every write stamps `last_modified` from a store-wide clock that never
//! repeats or runs backwards, so `modified_since` cursors see each change
//! exactly once. Deletions keep a tombstone row.

use libsql::{params, Builder, Connection, Database as LibSqlDatabase, Value};
use stride_core::models::RemoteId;
use stride_core::remote::{ActivityPayload, ListFilter, RemoteActivity};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;

const SCHEMA: [&str; 2] = [
    r"
    CREATE TABLE IF NOT EXISTS activities (
        id TEXT PRIMARY KEY NOT NULL,
        client_id TEXT UNIQUE,
        body TEXT NOT NULL,
        last_modified INTEGER NOT NULL,
        deleted_at INTEGER
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_activities_last_modified ON activities(last_modified)",
];

const COLUMNS: &str = "id, client_id, body, last_modified, deleted_at";

/// Result of a create call
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    New(RemoteActivity),
    /// A record with the same `client_id` already existed
    Existing(RemoteActivity),
}

pub struct ActivityStore {
    inner: Mutex<StoreInner>,
    max_page: usize,
}

struct StoreInner {
    _db: LibSqlDatabase,
    conn: Connection,
    clock: i64,
}

impl StoreInner {
    fn tick(&mut self) -> i64 {
        self.clock = chrono::Utc::now().timestamp_millis().max(self.clock + 1);
        self.clock
    }

    async fn find(&self, column: &str, value: &str) -> Result<Option<RemoteActivity>, AppError> {
        let sql = format!("SELECT {COLUMNS} FROM activities WHERE {column} = ?");
        let mut rows = self.conn.query(&sql, [value]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_live(&self, id: &str) -> Result<RemoteActivity, AppError> {
        self.find("id", id)
            .await?
            .filter(|record| !record.is_deleted())
            .ok_or_else(|| AppError::not_found(format!("activity {id}")))
    }
}

impl ActivityStore {
    /// Open the store at `path`, or in memory when `None`.
    pub async fn open(path: Option<&str>, max_page: usize) -> Result<Self, AppError> {
        let db = Builder::new_local(path.unwrap_or(":memory:"))
            .build()
            .await?;
        let conn = db.connect()?;
        for statement in SCHEMA {
            conn.execute(statement, ()).await?;
        }

        let mut rows = conn
            .query("SELECT COALESCE(MAX(last_modified), 0) FROM activities", ())
            .await?;
        let clock = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };

        Ok(Self {
            inner: Mutex::new(StoreInner {
                _db: db,
                conn,
                clock,
            }),
            max_page: max_page.max(1),
        })
    }

    /// Records modified after the cursor, oldest first.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<RemoteActivity>, AppError> {
        let limit = filter
            .limit
            .map_or(self.max_page, |limit| limit.clamp(1, self.max_page));

        let mut sql = format!("SELECT {COLUMNS} FROM activities WHERE last_modified > ?");
        if !filter.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        sql.push_str(" ORDER BY last_modified ASC, id ASC LIMIT ?");

        let inner = self.inner.lock().await;
        let mut rows = inner
            .conn
            .query(
                &sql,
                params![filter.modified_since.unwrap_or(i64::MIN), limit as i64],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(parse_record(&row)?);
        }
        Ok(records)
    }

    /// Store a new record, or return the one already created for the same `client_id`.
    pub async fn create(&self, payload: ActivityPayload) -> Result<Created, AppError> {
        payload
            .validate()
            .map_err(|error| AppError::bad_request(error.to_string()))?;

        let mut inner = self.inner.lock().await;
        if let Some(client_id) = payload.client_id.as_deref() {
            if let Some(existing) = inner.find("client_id", client_id).await? {
                return Ok(Created::Existing(existing));
            }
        }

        let id = RemoteId::new(Uuid::now_v7().to_string())
            .map_err(|error| AppError::internal(error.to_string()))?;
        let last_modified = inner.tick();
        let record = RemoteActivity::from_payload(id, payload, last_modified);

        inner
            .conn
            .execute(
                "INSERT INTO activities (id, client_id, body, last_modified, deleted_at)
                 VALUES (?, ?, ?, ?, NULL)",
                params![
                    record.id.as_str(),
                    nullable(record.client_id.clone()),
                    encode_body(&record)?,
                    record.last_modified
                ],
            )
            .await?;

        Ok(Created::New(record))
    }

    /// Replace the content of a live record. The `client_id` never changes.
    pub async fn update(
        &self,
        id: &str,
        payload: ActivityPayload,
    ) -> Result<RemoteActivity, AppError> {
        payload
            .validate()
            .map_err(|error| AppError::bad_request(error.to_string()))?;

        let mut inner = self.inner.lock().await;
        let existing = inner.find_live(id).await?;
        let last_modified = inner.tick();
        let mut record = RemoteActivity::from_payload(existing.id, payload, last_modified);
        record.client_id = existing.client_id;

        inner
            .conn
            .execute(
                "UPDATE activities SET body = ?, last_modified = ? WHERE id = ?",
                params![encode_body(&record)?, record.last_modified, id],
            )
            .await?;

        Ok(record)
    }

    /// Tombstone a live record.
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        inner.find_live(id).await?;
        let at = inner.tick();

        inner
            .conn
            .execute(
                "UPDATE activities SET deleted_at = ?, last_modified = ? WHERE id = ?",
                params![at, at, id],
            )
            .await?;
        Ok(())
    }
}

fn nullable<T: Into<Value>>(value: Option<T>) -> Value {
    value.map_or(Value::Null, Into::into)
}

/// Activity content minus the columns stored separately.
fn encode_body(record: &RemoteActivity) -> Result<String, AppError> {
    let payload = ActivityPayload {
        client_id: None,
        kind: record.kind,
        start_time: record.start_time,
        end_time: record.end_time,
        duration_secs: record.duration_secs,
        distance_meters: record.distance_meters,
        route: record.route.clone(),
        metrics: record.metrics,
        notes: record.notes.clone(),
        tags: record.tags.clone(),
    };
    Ok(serde_json::to_string(&payload)?)
}

fn parse_record(row: &libsql::Row) -> Result<RemoteActivity, AppError> {
    let id = RemoteId::new(row.get::<String>(0)?)
        .map_err(|error| AppError::internal(error.to_string()))?;
    let client_id = row.get::<Option<String>>(1)?;
    let mut payload: ActivityPayload = serde_json::from_str(&row.get::<String>(2)?)?;
    payload.client_id = client_id;

    let mut record = RemoteActivity::from_payload(id, payload, row.get::<i64>(3)?);
    record.deleted_at = row.get::<Option<i64>>(4)?;
    Ok(record)
}
