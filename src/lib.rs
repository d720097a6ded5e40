//! Podium: Olympic Games results into a star-schema warehouse
//!
//! This crate loads the Guardian Olympic medal dataset (`winter.csv`, `summer.csv`,
//! `dictionary.csv`) into a SQLite warehouse shaped as a star schema: nine dimension
//! tables and one fact table with a row per medal awarded.
//!
//! 1. **Schema Pass** -- Drop every table and recreate dimensions, then the fact table
//! 2. **Source Pass** -- Read all three CSV files into typed records; bad years or
//!    missing columns fail here, before anything is loaded
//! 3. **Dimension Pass** -- Insert the distinct values of each attribute; surrogate
//!    keys are assigned by the database. Seasons are seeded, countries come from the
//!    reference file
//! 4. **Fact Pass** -- Fetch every natural-key to surrogate-key mapping once, resolve
//!    each record, and bulk insert the facts
//!
//! Every run is a full refresh. Each pass commits on its own; the first error ends the
//! run and the connection is closed regardless.
//!
//! # Key Modules
//!
//! - [`source`] -- CSV reading, header normalization, footnote stripping
//! - [`schema`] -- Dimension catalogue and DDL
//! - [`resolve`] -- Distinct-value computation and dimension loads
//! - [`fact`] -- Key maps and record-to-fact mapping
//! - [`loader`] -- Bulk insert followed by commit
//! - [`warehouse`] -- Database trait and the SQLite implementation
//! - [`verify`] -- Distinctness, referential and row-count checks
//! - [`pipeline`] -- Run context and phase ordering
//! - [`stats`] -- Per-run counters and JSON report
//! - [`models`] -- Typed records, seasons, fact rows
//! - [`config`] -- File names and defaults
//!
//! # Example Usage
//!
//! ```bash
//! # Full refresh from a directory holding the three CSV files
//! podium load -d data/ --database olympics.db -v
//!
//! # Check the loaded warehouse against its source files
//! podium verify --database olympics.db -d data/
//! ```

pub mod config;
pub mod fact;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod resolve;
pub mod schema;
pub mod source;
pub mod stats;
pub mod verify;
pub mod warehouse;
