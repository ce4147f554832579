//! # Matchtally Analytics Engine
//!
//! This crate turns recorded match results into win-rate statistics. It acts
//! as the "unbiased judge" of how each deck performs.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of external systems.
//!   It depends only on `core-types` (Layer 0).
//! - **Stateless Calculation:** The `ReportEngine` is a stateless calculator. It takes
//!   a slice of results as input and produces a `StatsReport` as output, which
//!   makes the aggregation identical for both storage backends.
//!
//! ## Public API
//!
//! - `ReportEngine`: The main struct that contains the calculation logic.
//! - `StatsReport`, `Tally`, `GroupTally`, `MatchupTally`: The report structures.
//! - `AnalyticsError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod engine;
pub mod error;
pub mod report;

// Re-export the key components to create a clean, public-facing API.
pub use engine::ReportEngine;
pub use error::AnalyticsError;
pub use report::{GroupTally, MatchupTally, StatsReport, Tally, UNKNOWN_OPPONENT, WIN_RATE_DP};
