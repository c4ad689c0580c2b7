use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Credential record. Owned by the user store; this crate only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string. Never logged and never serialized outward.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One link in a refresh-token rotation chain.
///
/// `predecessor_id` points at the record this one replaced; a chain is the
/// transitive closure of that pointer starting from a login's root record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub predecessor_id: Option<Uuid>,
}

impl RefreshTokenRecord {
    pub fn new(subject_id: Uuid, ttl_secs: i64, predecessor_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject_id,
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_secs),
            revoked: false,
            predecessor_id,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_live_root() {
        let subject = Uuid::new_v4();
        let record = RefreshTokenRecord::new(subject, 3600, None);
        assert_eq!(record.subject_id, subject);
        assert!(!record.revoked);
        assert!(record.predecessor_id.is_none());
        assert!(!record.is_expired());
    }

    #[test]
    fn test_record_expiry() {
        let record = RefreshTokenRecord::new(Uuid::new_v4(), -1, None);
        assert!(record.is_expired());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "$argon2id$fake".to_string(),
        );
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("password_hash"));
    }
}
