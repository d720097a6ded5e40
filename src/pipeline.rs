//! The batch run, top to bottom.
//!
//! Schema → read sources → dimensions → facts. Each phase commits on its own and
//! nothing is retried: the first error ends the run. The warehouse is closed on
//! every exit path, including after a failed phase.

use crate::fact::load_facts;
use crate::resolve::load_dimensions;
use crate::schema::create_tables;
use crate::source::{SourceData, SourceFiles};
use crate::stats::LoadStats;
use crate::warehouse::{SqliteWarehouse, Warehouse};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

/// Where to read from and where to load into.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub data_dir: PathBuf,
    pub database: PathBuf,
}

/// Everything a run needs, opened once and handed to each phase by reference.
pub struct EtlContext<W: Warehouse> {
    pub warehouse: W,
    pub files: SourceFiles,
}

impl<W: Warehouse> EtlContext<W> {
    pub fn new(warehouse: W, files: SourceFiles) -> Self {
        Self { warehouse, files }
    }

    /// Runs `body` against this context, then closes the warehouse whatever the
    /// outcome. The body's error wins over a close error.
    pub fn scoped<T>(mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = body(&mut self);
        let closed = self.warehouse.close();
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                error!(error = %close_err, "Failed to close warehouse after error");
                Err(e)
            }
        }
    }

    /// The full refresh: every table is rebuilt from the source files.
    pub fn run(&mut self) -> Result<LoadStats> {
        let start = Instant::now();
        let mut stats = LoadStats::default();

        create_tables(&mut self.warehouse).context("Schema phase failed")?;

        let data = SourceData::read(&self.files).context("Source phase failed")?;
        stats.winter_records = data.winter.len();
        stats.summer_records = data.summer.len();
        stats.countries_read = data.countries.len();

        let dims = load_dimensions(&mut self.warehouse, &data).context("Dimension phase failed")?;
        for (dim, rows) in dims {
            stats.record_dimension(dim, rows);
        }

        let facts = load_facts(&mut self.warehouse, &data).context("Fact phase failed")?;
        stats.fact_rows = facts.rows.len();
        stats.unresolved_countries = facts.unresolved_countries;

        stats.duration_secs = start.elapsed().as_secs_f64();
        info!(
            facts = stats.fact_rows,
            dimension_rows = stats.dimension_total(),
            duration_secs = stats.duration_secs,
            "Load complete"
        );
        Ok(stats)
    }
}

/// Opens the SQLite warehouse, runs the full refresh, and closes it again.
pub fn run(config: &LoadConfig) -> Result<LoadStats> {
    let files = SourceFiles::locate(&config.data_dir)?;
    let warehouse = open_warehouse(&config.database)?;
    EtlContext::new(warehouse, files).scoped(|ctx| ctx.run())
}

/// Drops and recreates the schema without loading anything.
pub fn recreate_schema(database: &Path) -> Result<()> {
    let mut warehouse = open_warehouse(database)?;
    let result = create_tables(&mut warehouse);
    let closed = warehouse.close();
    result.and(closed)
}

pub fn open_warehouse(database: &Path) -> Result<SqliteWarehouse> {
    info!(path = %database.display(), "Opening warehouse");
    SqliteWarehouse::open(database)
}
