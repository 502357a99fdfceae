use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use thiserror::Error;
use uuid::Uuid;

type DbPool = Pool<AsyncPgConnection>;

// The registry lives in a database this service does not own; only the
// columns the existence probe touches are declared here.
diesel::table! {
    users (id) {
        id -> Uuid,
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user registry unreachable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// Read-only capability over the user registry: "does user U exist?".
///
/// Existence is re-checked per request; nothing is cached. The trait seam
/// exists so the coordinator can be handed a stub registry in tests.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: Uuid) -> Result<bool, DirectoryError>;
}

/// Production directory backed by a read-only pool onto the user database.
pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn exists(&self, user_id: Uuid) -> Result<bool, DirectoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| DirectoryError::Unavailable(anyhow::anyhow!(e)))?;

        let count: i64 = users::table
            .filter(users::id.eq(user_id))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(|e| DirectoryError::Unavailable(anyhow::anyhow!(e)))?;

        Ok(count > 0)
    }
}
