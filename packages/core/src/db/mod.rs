//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management
//! - Schema for the four strategy tables and the closure side table
//! - Explicit transactions around every mutation
//! - Row decoding helpers shared by the strategies
//!
//! # Architecture
//!
//! The hierarchy engine only needs a small set of storage capabilities: fetch
//! by id, predicate scans, bulk update and bulk delete by predicate, all inside
//! a transaction. libsql (embedded, SQLite-compatible) provides them as plain
//! parameterized SQL, both on disk and in memory for tests.

mod database;
mod error;
pub mod rows;

pub use database::{DatabaseService, Transaction, IN_MEMORY_PATH};
pub use error::DatabaseError;
