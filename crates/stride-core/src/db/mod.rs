//! Database layer for Stride

mod activity_repository;
mod connection;
mod migrations;
mod mutation_queue;
mod settings_repository;

use libsql::{Connection, Value};

use crate::error::Result;

pub use activity_repository::{ActivityRepository, LibSqlActivityRepository};
pub use connection::Database;
pub use mutation_queue::{LibSqlMutationQueue, MutationQueue};
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository};

/// Bind an optional value, mapping `None` to SQL `NULL`
pub(crate) fn nullable<T: Into<Value>>(value: Option<T>) -> Value {
    value.map_or(Value::Null, Into::into)
}

/// Open a write transaction on `conn`
pub(crate) async fn begin(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN IMMEDIATE", ()).await?;
    Ok(())
}

/// Commit on success, roll back on failure, and pass the result through
pub(crate) async fn finish<T>(conn: &Connection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            if let Err(e) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
            Ok(value)
        }
        Err(error) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(error)
        }
    }
}
