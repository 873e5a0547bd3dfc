//! Store abstractions for the catalog
//!
//! The web layer and the identicon backfill loop both talk to the catalog
//! through the traits in [`traits`], so either can run against the
//! PostgreSQL-backed [`crate::database::Database`] or the
//! [`InMemoryStore`] used in tests.

pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::*;
