use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::{RefreshTokenRecord, User};
use crate::error::AppError;

/// Longest rotation chain the store will walk when revoking. Chains grow by
/// one per refresh, so anything deeper than this indicates corrupted data.
pub const MAX_CHAIN_DEPTH: usize = 64;

/// Read-only view of the external user store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a credential record by username or email.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError>;
}

/// Persistence contract for refresh-token records.
///
/// Implementations are the sole writer of these records. All operations must
/// be safe under concurrent invocation; `rotate` must be linearizable per
/// record id (of N concurrent rotations of one id, exactly one succeeds).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new chain root for `subject_id`.
    async fn create(&self, subject_id: Uuid, ttl_secs: i64) -> Result<RefreshTokenRecord, AppError>;

    /// Atomically consume a record and insert its successor.
    ///
    /// Fails with `InvalidToken` if the record is absent, `TokenExpired` if
    /// past its expiry, and `TokenReplay` if already revoked. A replay also
    /// revokes every record reachable forward through the chain, since reuse
    /// of a consumed id signals theft of a rotated token.
    async fn rotate(&self, record_id: Uuid) -> Result<RefreshTokenRecord, AppError>;

    /// Mark a record revoked. Idempotent; absent records are a no-op.
    async fn revoke(&self, record_id: Uuid) -> Result<(), AppError>;

    /// Revoke every non-expired record for a subject.
    async fn revoke_all_for_subject(&self, subject_id: Uuid) -> Result<(), AppError>;

    /// True iff the record exists, is not revoked, and is not expired.
    async fn is_valid(&self, record_id: Uuid) -> Result<bool, AppError>;

    /// Delete records expired for longer than `grace_secs`. Returns the
    /// number of rows removed.
    async fn purge_expired(&self, grace_secs: i64) -> Result<u64, AppError>;
}
