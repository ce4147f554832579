//! # Matchtally Database Crate
//!
//! This crate acts as a high-level, application-specific interface to the
//! relational store. It is the system's "permanent archive" of decks and
//! match results.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Adapter:** This crate encapsulates all database-specific logic.
//!   It provides a clean, abstract API to the rest of the application, hiding
//!   the underlying SQL and driver details.
//! - **One API, Two Backends:** Queries run through `sqlx`'s `Any` driver, so
//!   the same code serves the embedded SQLite file and a PostgreSQL server.
//!   The backend is chosen by the persistence selector in `configuration`.
//! - **Swappable Pool:** The pool lives behind a lock so the embedded file can
//!   be replaced by a restore without restarting the process.
//!
//! ## Public API
//!
//! - `connect`: Establishes the connection pool for the selected store.
//! - `run_migrations`: Applies the bundled migrations of the active backend.
//! - `Database`: The shared connection handle (snapshot and file replacement).
//! - `DbRepository`: All data access methods for users, decks and results.
//! - `DbError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod password;
pub mod query;
pub mod repository;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{Backend, Database, connect, prepare_sqlite_file, run_migrations};
pub use error::DbError;
pub use repository::{
    DbRepository, ImportBatch, ImportCounters, ImportedDeck, ImportedResult, UNSPECIFIED_DECK,
};
