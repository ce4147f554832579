//! # Matchtally Backup Crate
//!
//! Moves data in and out of the system as ZIP archives.
//!
//! ## Architectural Principles
//!
//! - **Validate, Then Write:** An uploaded archive is fully parsed and checked
//!   before any file next to the working database is touched.
//! - **Atomic Swap:** A restore stages the new file beside the working one and
//!   renames it into place while the connection pool is closed, so readers
//!   never observe a partial file.
//!
//! ## Public API
//!
//! - `BackupService`: Export and restore of the embedded SQLite database.
//! - `export_user_data` / `import_user_data`: The per-user CSV archive, which
//!   works with either store.
//! - `BackupError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod archive;
pub mod error;
pub mod service;
pub mod user_data;

// Re-export the key components to create a clean, public-facing API.
pub use error::BackupError;
pub use service::{BackupService, DEFAULT_MAX_DATABASE_BYTES, RestoreSummary};
pub use user_data::{export_user_data, import_user_data, parse_user_data};
