//! Integrity checks over a loaded warehouse.

use crate::config::FACT_TABLE;
use crate::schema::Dimension;
use crate::warehouse::{Value, Warehouse};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct IntegrityReport {
    /// Dimension tables whose natural key repeats, with the number of repeated keys
    pub duplicate_keys: Vec<(&'static str, i64)>,
    /// Fact foreign-key columns pointing at a row that does not exist
    pub dangling_keys: Vec<(&'static str, i64)>,
    /// Fact foreign-key columns left NULL, country excluded
    pub missing_keys: Vec<(&'static str, i64)>,
    pub fact_rows: i64,
    pub expected_fact_rows: Option<usize>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.duplicate_keys.is_empty()
            && self.dangling_keys.is_empty()
            && self.missing_keys.is_empty()
            && self.row_count_matches()
    }

    pub fn row_count_matches(&self) -> bool {
        self.expected_fact_rows
            .map_or(true, |expected| expected as i64 == self.fact_rows)
    }

    pub fn print_summary(&self) {
        println!();
        println!("=== Integrity ===");
        println!("Fact rows:            {}", self.fact_rows);
        if let Some(expected) = self.expected_fact_rows {
            println!("Source records:       {expected}");
        }
        for (table, n) in &self.duplicate_keys {
            println!("Duplicate keys:       {table} ({n})");
        }
        for (column, n) in &self.dangling_keys {
            println!("Dangling references:  {column} ({n})");
        }
        for (column, n) in &self.missing_keys {
            println!("Missing references:   {column} ({n})");
        }
        println!();
        println!("{}", if self.is_ok() { "OK" } else { "FAILED" });
    }
}

fn count<W: Warehouse + ?Sized>(wh: &mut W, sql: &str) -> Result<i64> {
    let rows = wh.fetch_all(sql)?;
    Ok(rows
        .first()
        .and_then(|row| row.first())
        .and_then(Value::as_i64)
        .unwrap_or(0))
}

/// Runs every check. `expected_fact_rows` enables the row-count conservation check.
pub fn check<W: Warehouse + ?Sized>(
    wh: &mut W,
    expected_fact_rows: Option<usize>,
) -> Result<IntegrityReport> {
    let mut report = IntegrityReport {
        expected_fact_rows,
        ..Default::default()
    };

    for dim in Dimension::ALL {
        let table = dim.table();
        let keys = dim.key_columns().join(", ");
        let duplicates = count(
            wh,
            &format!(
                "SELECT COUNT(*) FROM (SELECT {keys} FROM {table} GROUP BY {keys} HAVING COUNT(*) > 1)"
            ),
        )
        .with_context(|| format!("Distinctness check failed on {table}"))?;
        if duplicates > 0 {
            report.duplicate_keys.push((table, duplicates));
        }

        let id = dim.id_column();
        let dangling = count(
            wh,
            &format!(
                "SELECT COUNT(*) FROM {FACT_TABLE} f LEFT JOIN {table} d ON f.{id} = d.{id} \
                 WHERE f.{id} IS NOT NULL AND d.{id} IS NULL"
            ),
        )
        .with_context(|| format!("Reference check failed on {id}"))?;
        if dangling > 0 {
            report.dangling_keys.push((id, dangling));
        }

        if dim != Dimension::Country {
            let missing = count(
                wh,
                &format!("SELECT COUNT(*) FROM {FACT_TABLE} WHERE {id} IS NULL"),
            )?;
            if missing > 0 {
                report.missing_keys.push((id, missing));
            }
        }
    }

    report.fact_rows = count(wh, &format!("SELECT COUNT(*) FROM {FACT_TABLE}"))?;

    if report.is_ok() {
        info!(facts = report.fact_rows, "Integrity checks passed");
    } else {
        warn!(
            duplicates = report.duplicate_keys.len(),
            dangling = report.dangling_keys.len(),
            missing = report.missing_keys.len(),
            facts = report.fact_rows,
            expected = ?report.expected_fact_rows,
            "Integrity checks failed"
        );
    }
    Ok(report)
}

/// The natural keys of one dimension, rendered as text, for comparing runs.
pub fn natural_keys<W: Warehouse + ?Sized>(
    wh: &mut W,
    dimension: Dimension,
) -> Result<BTreeSet<String>> {
    let sql = format!(
        "SELECT {} FROM {}",
        dimension.key_columns().join(", "),
        dimension.table()
    );
    let rows = wh.fetch_all(&sql)?;
    Ok(rows
        .iter()
        .map(|row| row.iter().map(render).collect::<Vec<_>>().join("|"))
        .collect())
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Text(s) => s.clone(),
    }
}
