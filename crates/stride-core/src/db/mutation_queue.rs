//! Durable mutation queue

use crate::error::{Error, Result};
use crate::models::{ActivityId, MutationEntry, MutationOp, NewMutation, RemoteId};
use crate::util::now_millis;
use libsql::{params, Connection};

use super::nullable;

/// Trait for mutation queue operations (async)
#[allow(async_fn_in_trait)]
pub trait MutationQueue {
    /// Append an entry; returns its queue ID
    async fn enqueue(&self, mutation: &NewMutation) -> Result<i64>;

    /// Outstanding entries in enqueue order
    async fn list_pending(&self) -> Result<Vec<MutationEntry>>;

    async fn remove(&self, entry_id: i64) -> Result<()>;

    /// Record a failed attempt; returns the new retry count
    async fn increment_retry(&self, entry_id: i64) -> Result<u32>;

    /// Drop every entry that references `activity_id`
    async fn remove_for_activity(&self, activity_id: &ActivityId) -> Result<u64>;

    /// Whether any entry references `activity_id`
    async fn has_pending_for(&self, activity_id: &ActivityId) -> Result<bool>;

    /// Whether an update or delete for `activity_id` is queued
    async fn has_pending_edits_for(&self, activity_id: &ActivityId) -> Result<bool>;

    async fn count(&self) -> Result<usize>;

    async fn clear(&self) -> Result<u64>;
}

/// libSQL implementation of `MutationQueue`
pub struct LibSqlMutationQueue<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMutationQueue<'a> {
    /// Create a new queue view over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &libsql::Row) -> Result<MutationEntry> {
        let operation: String = row.get(1)?;
        let activity_id: String = row.get(2)?;
        let remote_id: Option<String> = row.get(3)?;
        let payload: Option<String> = row.get(4)?;
        let retry_count: i64 = row.get(6)?;

        Ok(MutationEntry {
            id: row.get(0)?,
            operation: operation.parse()?,
            activity_id: activity_id.parse().map_err(|_| {
                Error::Database(format!("Invalid activity ID in queue: {activity_id}"))
            })?,
            remote_id: remote_id.map(RemoteId::new).transpose()?,
            payload: payload
                .map(|payload| serde_json::from_str(&payload))
                .transpose()?,
            enqueued_at: row.get(5)?,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            last_attempt_at: row.get(7)?,
        })
    }
}

impl MutationQueue for LibSqlMutationQueue<'_> {
    async fn enqueue(&self, mutation: &NewMutation) -> Result<i64> {
        let payload = mutation
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO mutation_queue (operation, activity_id, remote_id, payload, enqueued_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    mutation.operation.as_str(),
                    mutation.activity_id.as_str(),
                    nullable(mutation.remote_id.as_ref().map(RemoteId::as_str)),
                    nullable(payload),
                    now_millis()
                ],
            )
            .await?;

        let entry_id = self.conn.last_insert_rowid();
        tracing::debug!(
            entry_id,
            operation = mutation.operation.as_str(),
            activity = %mutation.activity_id,
            "Enqueued mutation"
        );
        Ok(entry_id)
    }

    async fn list_pending(&self) -> Result<Vec<MutationEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, operation, activity_id, remote_id, payload, enqueued_at,
                        retry_count, last_attempt_at
                 FROM mutation_queue
                 ORDER BY enqueued_at ASC, id ASC",
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    async fn remove(&self, entry_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM mutation_queue WHERE id = ?", [entry_id])
            .await?;
        Ok(())
    }

    async fn increment_retry(&self, entry_id: i64) -> Result<u32> {
        let rows = self
            .conn
            .execute(
                "UPDATE mutation_queue SET retry_count = retry_count + 1, last_attempt_at = ?
                 WHERE id = ?",
                params![now_millis(), entry_id],
            )
            .await?;
        if rows == 0 {
            return Err(Error::NotFound(format!("mutation {entry_id}")));
        }

        let mut rows = self
            .conn
            .query(
                "SELECT retry_count FROM mutation_queue WHERE id = ?",
                [entry_id],
            )
            .await?;
        let retry_count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => return Err(Error::NotFound(format!("mutation {entry_id}"))),
        };
        Ok(u32::try_from(retry_count).unwrap_or(u32::MAX))
    }

    async fn remove_for_activity(&self, activity_id: &ActivityId) -> Result<u64> {
        Ok(self
            .conn
            .execute(
                "DELETE FROM mutation_queue WHERE activity_id = ?",
                [activity_id.as_str()],
            )
            .await?)
    }

    async fn has_pending_for(&self, activity_id: &ActivityId) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM mutation_queue WHERE activity_id = ?)",
                [activity_id.as_str()],
            )
            .await?;
        Ok(match rows.next().await? {
            Some(row) => row.get::<i32>(0)? != 0,
            None => false,
        })
    }

    async fn has_pending_edits_for(&self, activity_id: &ActivityId) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM mutation_queue
                 WHERE activity_id = ? AND operation <> ?)",
                [activity_id.as_str(), MutationOp::Create.as_str().to_string()],
            )
            .await?;
        Ok(match rows.next().await? {
            Some(row) => row.get::<i32>(0)? != 0,
            None => false,
        })
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM mutation_queue", ())
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn clear(&self) -> Result<u64> {
        Ok(self.conn.execute("DELETE FROM mutation_queue", ()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{ActivityKind, NewActivity};
    use crate::remote::ActivityPayload;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn payload() -> ActivityPayload {
        ActivityPayload::from(
            &NewActivity::finished_now(ActivityKind::Run, 3000.0, 1800)
                .into_activity()
                .unwrap(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_preserves_fifo_order() {
        let db = setup().await;
        let queue = LibSqlMutationQueue::new(db.connection());
        let id = ActivityId::new();

        queue
            .enqueue(&NewMutation::create(id, payload()))
            .await
            .unwrap();
        queue
            .enqueue(&NewMutation::update(
                id,
                Some(RemoteId::new("r").unwrap()),
                payload(),
            ))
            .await
            .unwrap();
        queue
            .enqueue(&NewMutation::delete(id, Some(RemoteId::new("r").unwrap())))
            .await
            .unwrap();

        let ops = queue
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.operation)
            .collect::<Vec<_>>();
        assert_eq!(
            ops,
            vec![MutationOp::Create, MutationOp::Update, MutationOp::Delete]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_entry_snapshot_roundtrip() {
        let db = setup().await;
        let queue = LibSqlMutationQueue::new(db.connection());
        let id = ActivityId::new();
        let snapshot = payload();

        queue
            .enqueue(&NewMutation::create(id, snapshot.clone()))
            .await
            .unwrap();

        let entry = queue.list_pending().await.unwrap().remove(0);
        assert_eq!(entry.activity_id, id);
        assert_eq!(entry.payload, Some(snapshot));
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.last_attempt_at, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_increment_retry_and_remove() {
        let db = setup().await;
        let queue = LibSqlMutationQueue::new(db.connection());
        let entry_id = queue
            .enqueue(&NewMutation::delete(ActivityId::new(), None))
            .await
            .unwrap();

        assert_eq!(queue.increment_retry(entry_id).await.unwrap(), 1);
        assert_eq!(queue.increment_retry(entry_id).await.unwrap(), 2);
        let entry = queue.list_pending().await.unwrap().remove(0);
        assert!(entry.last_attempt_at.is_some());

        queue.remove(entry_id).await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 0);
        assert!(queue.increment_retry(entry_id).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_for_activity() {
        let db = setup().await;
        let queue = LibSqlMutationQueue::new(db.connection());
        let a = ActivityId::new();
        let b = ActivityId::new();

        queue.enqueue(&NewMutation::create(a, payload())).await.unwrap();
        queue.enqueue(&NewMutation::delete(a, None)).await.unwrap();
        queue.enqueue(&NewMutation::create(b, payload())).await.unwrap();

        assert!(queue.has_pending_for(&a).await.unwrap());
        assert_eq!(queue.remove_for_activity(&a).await.unwrap(), 2);
        assert!(!queue.has_pending_for(&a).await.unwrap());
        assert_eq!(queue.count().await.unwrap(), 1);

        queue.clear().await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_edits_ignore_the_create() {
        let db = setup().await;
        let queue = LibSqlMutationQueue::new(db.connection());
        let id = ActivityId::new();

        queue.enqueue(&NewMutation::create(id, payload())).await.unwrap();
        assert!(queue.has_pending_for(&id).await.unwrap());
        assert!(!queue.has_pending_edits_for(&id).await.unwrap());

        queue
            .enqueue(&NewMutation::update(id, None, payload()))
            .await
            .unwrap();
        assert!(queue.has_pending_edits_for(&id).await.unwrap());
    }
}
