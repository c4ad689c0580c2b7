use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{RefreshTokenRecord, User};
use crate::db::store::{CredentialStore, SessionStore, MAX_CHAIN_DEPTH};
use crate::error::{AppError, AuthError};

/// In-memory credential store for development and tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn set_active(&self, user_id: Uuid, active: bool) {
        if let Some(user) = self.users.write().await.get_mut(&user_id) {
            user.is_active = active;
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.username == identifier || u.email == identifier)
            .cloned())
    }
}

/// In-memory session store.
///
/// A single write lock covers the whole read-check-revoke-insert sequence of
/// `rotate`, which gives the same linearizability the Postgres store gets
/// from a row-locking transaction.
#[derive(Default)]
pub struct MemorySessionStore {
    records: Arc<RwLock<HashMap<Uuid, RefreshTokenRecord>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke `start` and everything reachable forward through the chain.
    /// Must be called with the write lock held.
    fn revoke_chain_forward(records: &mut HashMap<Uuid, RefreshTokenRecord>, start: Uuid) {
        let mut current = start;
        for _ in 0..MAX_CHAIN_DEPTH {
            if let Some(record) = records.get_mut(&current) {
                record.revoked = true;
            }
            let successor = records
                .values()
                .find(|r| r.predecessor_id == Some(current))
                .map(|r| r.id);
            match successor {
                Some(next) => current = next,
                None => break,
            }
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, subject_id: Uuid, ttl_secs: i64) -> Result<RefreshTokenRecord, AppError> {
        let record = RefreshTokenRecord::new(subject_id, ttl_secs, None);
        self.records.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn rotate(&self, record_id: Uuid) -> Result<RefreshTokenRecord, AppError> {
        let mut records = self.records.write().await;

        let record = match records.get(&record_id) {
            Some(r) => r.clone(),
            None => return Err(AuthError::InvalidToken.into()),
        };

        if record.revoked {
            Self::revoke_chain_forward(&mut records, record_id);
            return Err(AuthError::TokenReplay.into());
        }

        if record.is_expired() {
            if let Some(r) = records.get_mut(&record_id) {
                r.revoked = true;
            }
            return Err(AuthError::TokenExpired.into());
        }

        if let Some(r) = records.get_mut(&record_id) {
            r.revoked = true;
        }

        // The successor inherits the chain's absolute expiry; a rotation
        // chain never outlives the login that created it.
        let mut successor = RefreshTokenRecord::new(record.subject_id, 0, Some(record_id));
        successor.expires_at = record.expires_at;
        records.insert(successor.id, successor.clone());

        Ok(successor)
    }

    async fn revoke(&self, record_id: Uuid) -> Result<(), AppError> {
        if let Some(record) = self.records.write().await.get_mut(&record_id) {
            record.revoked = true;
        }
        Ok(())
    }

    async fn revoke_all_for_subject(&self, subject_id: Uuid) -> Result<(), AppError> {
        let now = Utc::now();
        for record in self.records.write().await.values_mut() {
            if record.subject_id == subject_id && record.expires_at > now {
                record.revoked = true;
            }
        }
        Ok(())
    }

    async fn is_valid(&self, record_id: Uuid) -> Result<bool, AppError> {
        let records = self.records.read().await;
        Ok(records
            .get(&record_id)
            .map(|r| !r.revoked && !r.is_expired())
            .unwrap_or(false))
    }

    async fn purge_expired(&self, grace_secs: i64) -> Result<u64, AppError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(grace_secs);
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.expires_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rotate_consumes_record() {
        let store = MemorySessionStore::new();
        let subject = Uuid::new_v4();
        let root = store.create(subject, 3600).await.unwrap();

        let successor = store.rotate(root.id).await.unwrap();
        assert_eq!(successor.subject_id, subject);
        assert_eq!(successor.predecessor_id, Some(root.id));
        assert!(!store.is_valid(root.id).await.unwrap());
        assert!(store.is_valid(successor.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_replay_revokes_whole_chain() {
        let store = MemorySessionStore::new();
        let root = store.create(Uuid::new_v4(), 3600).await.unwrap();
        let second = store.rotate(root.id).await.unwrap();
        let third = store.rotate(second.id).await.unwrap();

        // Replaying the consumed root takes the live tail down with it.
        let err = store.rotate(root.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::AuthError(AuthError::TokenReplay)
        ));
        assert!(!store.is_valid(third.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_rotate_absent_record() {
        let store = MemorySessionStore::new();
        let err = store.rotate(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::AuthError(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_rotate_expired_record() {
        let store = MemorySessionStore::new();
        let root = store.create(Uuid::new_v4(), -1).await.unwrap();
        let err = store.rotate(root.id).await.unwrap_err();
        assert!(matches!(err, AppError::AuthError(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent_and_absent_tolerant() {
        let store = MemorySessionStore::new();
        let root = store.create(Uuid::new_v4(), 3600).await.unwrap();

        store.revoke(root.id).await.unwrap();
        store.revoke(root.id).await.unwrap();
        store.revoke(Uuid::new_v4()).await.unwrap();

        assert!(!store.is_valid(root.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all_for_subject() {
        let store = MemorySessionStore::new();
        let subject = Uuid::new_v4();
        let other = Uuid::new_v4();
        let a = store.create(subject, 3600).await.unwrap();
        let b = store.create(subject, 3600).await.unwrap();
        let c = store.create(other, 3600).await.unwrap();

        store.revoke_all_for_subject(subject).await.unwrap();

        assert!(!store.is_valid(a.id).await.unwrap());
        assert!(!store.is_valid(b.id).await.unwrap());
        assert!(store.is_valid(c.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired_honors_grace() {
        let store = MemorySessionStore::new();
        let expired = store.create(Uuid::new_v4(), -7200).await.unwrap();
        let live = store.create(Uuid::new_v4(), 3600).await.unwrap();

        let purged = store.purge_expired(3600).await.unwrap();
        assert_eq!(purged, 1);

        let records = store.records.read().await;
        assert!(!records.contains_key(&expired.id));
        assert!(records.contains_key(&live.id));
    }

    #[tokio::test]
    async fn test_credential_store_lookup() {
        let store = MemoryCredentialStore::new();
        let user = User::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "$argon2id$fake".to_string(),
        );
        store.insert(user.clone()).await;

        let by_name = store.find_by_identifier("alice").await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(user.id));

        let by_email = store.find_by_identifier("alice@example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(user.id));

        assert!(store.find_by_identifier("bob").await.unwrap().is_none());
    }
}
