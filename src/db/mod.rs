//! Persistence layer for the token authority.
//!
//! This module owns the credential-record and refresh-token models, the
//! store contracts the auth service depends on, and the Postgres and
//! in-memory implementations of those contracts.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::{MemoryCredentialStore, MemorySessionStore};
pub use models::{RefreshTokenRecord, User};
pub use postgres::PgStore;
pub use store::{CredentialStore, SessionStore};
