//! Core authentication flows: login, refresh, logout, verify.
//!
//! The service orchestrates the credential store, the session store, and
//! the token codec. Access-token verification is stateless; refresh-token
//! validity is decided by the session store through rotation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password::{self, DUMMY_HASH};
use crate::auth::token::{Claims, TokenCodec, TokenType};
use crate::config::AuthConfig;
use crate::db::models::RefreshTokenRecord;
use crate::db::store::{CredentialStore, SessionStore};
use crate::error::{AppError, AuthError, DatabaseError};

/// The pair of bearer credentials returned by login and refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    codec: TokenCodec,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    op_deadline: Duration,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        auth_config: &AuthConfig,
        op_deadline: Duration,
    ) -> Self {
        Self {
            credentials,
            sessions,
            codec: TokenCodec::new(&auth_config.jwt_secret, &auth_config.previous_jwt_secrets),
            access_ttl_secs: auth_config.access_token_ttl_secs,
            refresh_ttl_secs: auth_config.refresh_token_ttl_secs,
            op_deadline,
        }
    }

    /// Authenticate credentials and open a new session.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<TokenPair, AppError> {
        let user = self
            .with_deadline(self.credentials.find_by_identifier(identifier))
            .await?;

        let user = match user {
            Some(user) => user,
            None => {
                // Burn the same hashing cost as a real mismatch so a lookup
                // miss is not observable through response timing.
                password::verify_password(password, DUMMY_HASH);
                warn!(identifier = %identifier, "login failed");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !password::verify_password(password, &user.password_hash) {
            warn!(identifier = %identifier, "login failed");
            return Err(AuthError::InvalidCredentials.into());
        }

        // Status is checked only after a successful hash match so a disabled
        // account costs the same as an active one.
        if !user.is_active {
            warn!(subject = %user.id, "login rejected for disabled account");
            return Err(AuthError::AccountDisabled.into());
        }

        let record = self
            .with_deadline(self.sessions.create(user.id, self.refresh_ttl_secs))
            .await?;

        info!(subject = %user.id, "login succeeded");
        self.mint_pair(&record)
    }

    /// Exchange a refresh token for a new token pair, consuming it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self.codec.verify(refresh_token, TokenType::Refresh)?;
        let record_id = Uuid::parse_str(&claims.jti).map_err(|_| AuthError::InvalidToken)?;

        let record = match self.with_deadline(self.sessions.rotate(record_id)).await {
            Ok(record) => record,
            Err(AppError::AuthError(AuthError::TokenReplay)) => {
                warn!(
                    subject = %claims.sub,
                    record_id = %record_id,
                    "refresh token replay detected; rotation chain revoked"
                );
                return Err(AuthError::TokenReplay.into());
            }
            Err(e) => return Err(e),
        };

        self.mint_pair(&record)
    }

    /// Revoke the session behind a refresh token.
    ///
    /// Idempotent, and deliberately silent about whether the token ever
    /// existed; only transient store failures surface.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        let claims = match self.codec.verify(refresh_token, TokenType::Refresh) {
            Ok(claims) => claims,
            Err(AppError::AuthError(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let record_id = match Uuid::parse_str(&claims.jti) {
            Ok(id) => id,
            Err(_) => return Ok(()),
        };

        self.with_deadline(self.sessions.revoke(record_id)).await?;
        info!(subject = %claims.sub, "logout");
        Ok(())
    }

    /// Revoke every live session for a subject (logout everywhere).
    pub async fn logout_all(&self, subject_id: Uuid) -> Result<(), AppError> {
        self.with_deadline(self.sessions.revoke_all_for_subject(subject_id))
            .await?;
        info!(subject = %subject_id, "all sessions revoked");
        Ok(())
    }

    /// Verify an access token. Pure check against signature and clock; no
    /// store access, so protected requests never touch the database.
    pub fn verify(&self, access_token: &str) -> Result<Claims, AppError> {
        self.codec.verify(access_token, TokenType::Access)
    }

    /// Swap the signing key; previously minted tokens stay verifiable
    /// until they expire.
    pub fn rotate_signing_key(&self, new_secret: &str) -> Result<(), AppError> {
        self.codec.rotate_key(new_secret)
    }

    /// Garbage-collect records expired for longer than the grace period.
    pub async fn purge_expired(&self, grace_secs: i64) -> Result<u64, AppError> {
        self.with_deadline(self.sessions.purge_expired(grace_secs))
            .await
    }

    fn mint_pair(&self, record: &RefreshTokenRecord) -> Result<TokenPair, AppError> {
        let access_token =
            self.codec
                .mint(record.subject_id, TokenType::Access, self.access_ttl_secs)?;

        // The refresh token is a signed envelope around the record: its jti
        // is the record id and its expiry mirrors the record's.
        let refresh_claims = Claims {
            sub: record.subject_id.to_string(),
            iat: record.issued_at.timestamp(),
            exp: record.expires_at.timestamp(),
            typ: TokenType::Refresh,
            jti: record.id.to_string(),
        };
        let refresh_token = self.codec.mint_claims(&refresh_claims)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl_secs,
        })
    }

    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.op_deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(DatabaseError::Timeout(format!(
                "store operation exceeded {:?} deadline",
                self.op_deadline
            ))
            .into()),
        }
    }
}
