#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Bookish shared crate
//!
//! Domain records and the persistence layer used by the API server.

pub mod db;
pub mod models;
pub mod store;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use models::{ActivationToken, Role, User, DEFAULT_ROLE};
pub use store::{
    AccountStore, InMemoryAccountStore, PgAccountStore, SharedStore, StoreError, StoreResult,
};
