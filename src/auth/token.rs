//! Signed token minting and verification.
//!
//! Access and refresh tokens are compact HS256 JWTs tagged with a `typ`
//! claim so one can never be presented where the other is expected. The
//! codec holds the process-wide signing key set: new tokens are always
//! minted with the current key, while tokens minted before a rotation stay
//! verifiable under a bounded set of previous keys until they expire.

use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, AuthError};

/// Retired keys kept verifiable after a rotation.
const MAX_PREVIOUS_KEYS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // Subject ID
    pub iat: i64,      // Issued at
    pub exp: i64,      // Expiration time
    pub typ: TokenType,
    pub jti: String,   // Token ID; for refresh tokens, the record ID
}

impl Claims {
    pub fn subject(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken.into())
    }
}

#[derive(Clone)]
struct SigningKey {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn from_secret(secret: &str) -> Self {
        Self {
            kid: derive_kid(secret),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Key id stamped into the token header, derived from the secret so
/// configuration only ever carries the secrets themselves.
fn derive_kid(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..8])
}

struct KeySet {
    current: SigningKey,
    previous: Vec<SigningKey>,
}

impl KeySet {
    fn find(&self, kid: &str) -> Option<&SigningKey> {
        if self.current.kid == kid {
            return Some(&self.current);
        }
        self.previous.iter().find(|k| k.kid == kid)
    }
}

pub struct TokenCodec {
    // Readers clone the Arc and verify against an immutable snapshot, so an
    // in-flight verification never observes a half-rotated key set.
    keys: RwLock<Arc<KeySet>>,
}

impl TokenCodec {
    pub fn new(secret: &str, previous_secrets: &[String]) -> Self {
        let keys = KeySet {
            current: SigningKey::from_secret(secret),
            previous: previous_secrets
                .iter()
                .take(MAX_PREVIOUS_KEYS)
                .map(|s| SigningKey::from_secret(s))
                .collect(),
        };
        Self {
            keys: RwLock::new(Arc::new(keys)),
        }
    }

    fn snapshot(&self) -> Result<Arc<KeySet>, AppError> {
        self.keys
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| AppError::InternalError("signing key lock poisoned".to_string()))
    }

    /// Swap in a new current signing key. Tokens minted under the old key
    /// remain verifiable until their natural expiry.
    pub fn rotate_key(&self, new_secret: &str) -> Result<(), AppError> {
        let mut guard = self
            .keys
            .write()
            .map_err(|_| AppError::InternalError("signing key lock poisoned".to_string()))?;

        let old = Arc::clone(&guard);
        let mut previous = Vec::with_capacity(MAX_PREVIOUS_KEYS);
        previous.push(old.current.clone());
        previous.extend(
            old.previous
                .iter()
                .take(MAX_PREVIOUS_KEYS - 1)
                .cloned(),
        );

        *guard = Arc::new(KeySet {
            current: SigningKey::from_secret(new_secret),
            previous,
        });
        Ok(())
    }

    pub fn mint(&self, subject: Uuid, typ: TokenType, ttl_secs: i64) -> Result<String, AppError> {
        self.mint_at(subject, typ, ttl_secs, Utc::now())
    }

    /// Mint with an explicit issue instant.
    pub fn mint_at(
        &self,
        subject: Uuid,
        typ: TokenType,
        ttl_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + ttl_secs,
            typ,
            jti: Uuid::new_v4().to_string(),
        };
        self.mint_claims(&claims)
    }

    /// Sign a fully-specified claim set with the current key.
    pub fn mint_claims(&self, claims: &Claims) -> Result<String, AppError> {
        let snapshot = self.snapshot()?;
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(snapshot.current.kid.clone());

        encode(&header, claims, &snapshot.current.encoding)
            .map_err(|e| AppError::InternalError(format!("token encoding failed: {}", e)))
    }

    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AppError> {
        self.verify_at(token, expected, Utc::now())
    }

    /// Verify against an explicit instant: signature integrity first, then
    /// expiry (`now >= exp` is expired), then the type tag.
    pub fn verify_at(
        &self,
        token: &str,
        expected: TokenType,
        now: DateTime<Utc>,
    ) -> Result<Claims, AppError> {
        let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;
        let kid = header.kid.ok_or(AuthError::InvalidToken)?;

        let snapshot = self.snapshot()?;
        let key = snapshot.find(&kid).ok_or(AuthError::InvalidToken)?;

        // Expiry is checked below against the caller's instant, not by the
        // decoder, so the boundary is exact and clock-controllable.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Claims>(token, &key.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)?;

        if now.timestamp() >= claims.exp {
            return Err(AuthError::TokenExpired.into());
        }

        if claims.typ != expected {
            return Err(AuthError::WrongTokenType.into());
        }

        Ok(claims)
    }
}
