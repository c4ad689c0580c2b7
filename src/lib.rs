pub mod auth;
pub mod config;
pub mod db;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use actix_web::HttpResponse;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, AuthenticatedUser, TokenPair};
pub use db::{CredentialStore, PgStore, RefreshTokenRecord, SessionStore, User};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    /// Wire the service against the Postgres store from configuration.
    pub async fn new(config: Settings) -> Result<Self> {
        let store = Arc::new(
            PgStore::new_with_options(
                &config.database.url,
                config.database.max_connections,
                Duration::from_secs(config.database.operation_deadline_secs),
            )
            .await?,
        );

        sqlx::migrate!("./migrations")
            .run(store.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(error::DatabaseError::QueryError(e.to_string()))
            })?;

        Ok(Self::with_stores(config, store.clone(), store))
    }

    /// Wire the service against explicit store implementations (used by the
    /// development profile and the test suite with in-memory stores).
    pub fn with_stores(
        config: Settings,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let deadline = Duration::from_secs(config.database.operation_deadline_secs);
        let auth_service = Arc::new(AuthService::new(
            credentials,
            sessions,
            &config.auth,
            deadline,
        ));

        Self {
            config: Arc::new(config),
            auth_service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryCredentialStore, MemorySessionStore};

    #[tokio::test]
    async fn test_app_state_clone_shares_service() {
        let config = Settings::new_for_test().expect("Failed to load test config");
        let state = AppState::with_stores(
            config,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemorySessionStore::new()),
        );

        let cloned = state.clone();

        // Verify Arc references are shared
        assert!(Arc::ptr_eq(&state.config, &cloned.config));
        assert!(Arc::ptr_eq(&state.auth_service, &cloned.auth_service));
    }

    #[tokio::test]
    async fn test_health_check_shape() {
        let response = health_check().await;
        assert_eq!(response.status(), actix_web::http::StatusCode::OK);
    }
}
