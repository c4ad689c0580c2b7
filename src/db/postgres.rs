use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::db::models::{RefreshTokenRecord, User};
use crate::db::store::{CredentialStore, SessionStore, MAX_CHAIN_DEPTH};
use crate::error::{AppError, AuthError};

/// Postgres-backed credential and session store.
///
/// Rotation relies on the database's transactional guarantees rather than
/// in-process locks, so multiple service instances can share one database.
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }

    /// Revoke `start` and every successor, walking the predecessor index
    /// forward inside the caller's transaction.
    async fn revoke_chain_forward(
        transaction: &mut Transaction<'_, Postgres>,
        start: Uuid,
    ) -> Result<(), AppError> {
        let mut current = start;
        for _ in 0..MAX_CHAIN_DEPTH {
            sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
                .bind(current)
                .execute(&mut **transaction)
                .await?;

            let successor: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM refresh_tokens WHERE predecessor_id = $1 FOR UPDATE")
                    .bind(current)
                    .fetch_optional(&mut **transaction)
                    .await?;

            match successor {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password_hash, is_active, created_at, updated_at \
             FROM users WHERE username = $1 OR email = $1",
        )
        .bind(identifier)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create(&self, subject_id: Uuid, ttl_secs: i64) -> Result<RefreshTokenRecord, AppError> {
        let record = RefreshTokenRecord::new(subject_id, ttl_secs, None);

        sqlx::query(
            "INSERT INTO refresh_tokens (id, subject_id, issued_at, expires_at, revoked, predecessor_id) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.subject_id)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.predecessor_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(record)
    }

    async fn rotate(&self, record_id: Uuid) -> Result<RefreshTokenRecord, AppError> {
        let mut transaction = self.pool.as_ref().begin().await?;

        // Row lock makes concurrent rotations of the same id serialize here;
        // the loser then observes revoked = TRUE.
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, subject_id, issued_at, expires_at, revoked, predecessor_id \
             FROM refresh_tokens WHERE id = $1 FOR UPDATE",
        )
        .bind(record_id)
        .fetch_optional(&mut *transaction)
        .await?;

        let record = match record {
            Some(r) => r,
            None => return Err(AuthError::InvalidToken.into()),
        };

        if record.revoked {
            Self::revoke_chain_forward(&mut transaction, record_id).await?;
            transaction.commit().await?;
            return Err(AuthError::TokenReplay.into());
        }

        if record.is_expired() {
            sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
                .bind(record_id)
                .execute(&mut *transaction)
                .await?;
            transaction.commit().await?;
            return Err(AuthError::TokenExpired.into());
        }

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
            .bind(record_id)
            .execute(&mut *transaction)
            .await?;

        // The successor inherits the chain's absolute expiry; a rotation
        // chain never outlives the login that created it.
        let mut successor = RefreshTokenRecord::new(record.subject_id, 0, Some(record_id));
        successor.expires_at = record.expires_at;

        sqlx::query(
            "INSERT INTO refresh_tokens (id, subject_id, issued_at, expires_at, revoked, predecessor_id) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(successor.id)
        .bind(successor.subject_id)
        .bind(successor.issued_at)
        .bind(successor.expires_at)
        .bind(successor.revoked)
        .bind(successor.predecessor_id)
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(successor)
    }

    async fn revoke(&self, record_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
            .bind(record_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn revoke_all_for_subject(&self, subject_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE \
             WHERE subject_id = $1 AND expires_at > $2",
        )
        .bind(subject_id)
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn is_valid(&self, record_id: Uuid) -> Result<bool, AppError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, subject_id, issued_at, expires_at, revoked, predecessor_id \
             FROM refresh_tokens WHERE id = $1",
        )
        .bind(record_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(record.map(|r| !r.revoked && !r.is_expired()).unwrap_or(false))
    }

    async fn purge_expired(&self, grace_secs: i64) -> Result<u64, AppError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(grace_secs);
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(cutoff)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
