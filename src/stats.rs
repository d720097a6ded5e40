use crate::schema::Dimension;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Counters collected during one load run
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadStats {
    pub winter_records: usize,
    pub summer_records: usize,
    pub countries_read: usize,
    /// Rows inserted per dimension table
    pub dimension_rows: BTreeMap<String, usize>,
    pub fact_rows: usize,
    pub unresolved_countries: usize,
    pub duration_secs: f64,
}

impl LoadStats {
    pub fn record_dimension(&mut self, dimension: Dimension, rows: usize) {
        self.dimension_rows
            .insert(dimension.table().to_string(), rows);
    }

    pub fn source_records(&self) -> usize {
        self.winter_records + self.summer_records
    }

    pub fn dimension_total(&self) -> usize {
        self.dimension_rows.values().sum()
    }

    pub fn print_summary(&self) {
        println!();
        println!("=== Summary ===");
        println!("Total time:           {:.2}s", self.duration_secs);
        println!();
        println!("Winter records:       {}", self.winter_records);
        println!("Summer records:       {}", self.summer_records);
        println!("Source records:       {}", self.source_records());
        println!("Countries read:       {}", self.countries_read);
        for (table, rows) in &self.dimension_rows {
            println!("{:<22}{}", format!("{table}:"), rows);
        }
        println!("Fact rows:            {}", self.fact_rows);
        println!("Unresolved countries: {}", self.unresolved_countries);
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create report: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        writer.flush()?;
        Ok(())
    }
}
