//! Star schema for the Olympic results warehouse.
//!
//! Nine dimension tables, each with an identity surrogate key and a unique natural
//! key, and one fact table referencing every dimension with `ON DELETE CASCADE`.

use crate::config::FACT_TABLE;
use crate::warehouse::Warehouse;
use anyhow::{Context, Result};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    City,
    Season,
    Sport,
    Medal,
    Country,
    Year,
    Event,
    Athlete,
    Gender,
}

impl Dimension {
    /// Creation order. Also the column order of the fact table's foreign keys.
    pub const ALL: [Dimension; 9] = [
        Dimension::City,
        Dimension::Season,
        Dimension::Sport,
        Dimension::Medal,
        Dimension::Country,
        Dimension::Year,
        Dimension::Event,
        Dimension::Athlete,
        Dimension::Gender,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Dimension::City => "dim_city",
            Dimension::Season => "dim_season",
            Dimension::Sport => "dim_sport",
            Dimension::Medal => "dim_medal",
            Dimension::Country => "dim_country",
            Dimension::Year => "dim_year",
            Dimension::Event => "dim_event",
            Dimension::Athlete => "dim_athlete",
            Dimension::Gender => "dim_gender",
        }
    }

    pub fn id_column(&self) -> &'static str {
        match self {
            Dimension::City => "city_id",
            Dimension::Season => "season_id",
            Dimension::Sport => "sport_id",
            Dimension::Medal => "medal_id",
            Dimension::Country => "country_id",
            Dimension::Year => "year_id",
            Dimension::Event => "event_id",
            Dimension::Athlete => "athlete_id",
            Dimension::Gender => "gender_id",
        }
    }

    /// Columns making up the natural key, in unique-constraint order.
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Dimension::City => &["city_name"],
            Dimension::Season => &["season_name"],
            Dimension::Sport => &["sport_name"],
            Dimension::Medal => &["medal_color"],
            Dimension::Country => &["country_code", "country_name"],
            Dimension::Year => &["year"],
            Dimension::Event => &["event_name"],
            Dimension::Athlete => &["athlete_name"],
            Dimension::Gender => &["gender_name"],
        }
    }

    pub fn create_statement(&self) -> String {
        let table = self.table();
        let id = self.id_column();
        let name = table.trim_start_matches("dim_");
        match self {
            Dimension::Country => format!(
                "CREATE TABLE {table} (
    {id} INTEGER PRIMARY KEY AUTOINCREMENT,
    country_code CHAR(3),
    country_name VARCHAR(128),
    country_gdp_per_cap REAL,
    country_population INTEGER,
    CONSTRAINT {name}_unique UNIQUE (country_code, country_name)
)"
            ),
            Dimension::Year => format!(
                "CREATE TABLE {table} (
    {id} INTEGER PRIMARY KEY AUTOINCREMENT,
    year INTEGER,
    CONSTRAINT {name}_unique UNIQUE (year)
)"
            ),
            _ => {
                let key = self.key_columns()[0];
                format!(
                    "CREATE TABLE {table} (
    {id} INTEGER PRIMARY KEY AUTOINCREMENT,
    {key} VARCHAR(128),
    CONSTRAINT {name}_unique UNIQUE ({key})
)"
                )
            }
        }
    }
}

pub fn fact_create_statement() -> String {
    let mut columns = vec!["    id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    columns.extend(
        Dimension::ALL
            .iter()
            .map(|d| format!("    {} INTEGER", d.id_column())),
    );
    columns.extend(Dimension::ALL.iter().map(|d| {
        format!(
            "    FOREIGN KEY ({id}) REFERENCES {table}({id}) ON DELETE CASCADE",
            id = d.id_column(),
            table = d.table()
        )
    }));
    format!("CREATE TABLE {FACT_TABLE} (\n{}\n)", columns.join(",\n"))
}

/// Drops a table, discarding any error. Used in place of a conditional drop so the
/// same sequence works on engines without `IF EXISTS`.
fn drop_if_exists<W: Warehouse + ?Sized>(wh: &mut W, table: &str) {
    if let Err(e) = wh.execute(&format!("DROP TABLE {table}")) {
        debug!(table, error = %e, "Drop skipped");
    }
}

/// Drops every warehouse table and recreates the schema, dimensions before the fact
/// table, then commits. A failed create leaves the schema partial and is fatal.
pub fn create_tables<W: Warehouse + ?Sized>(wh: &mut W) -> Result<()> {
    drop_if_exists(wh, FACT_TABLE);
    for dim in Dimension::ALL {
        drop_if_exists(wh, dim.table());
    }

    for dim in Dimension::ALL {
        wh.execute(&dim.create_statement())
            .with_context(|| format!("Failed to create {}", dim.table()))?;
    }
    wh.execute(&fact_create_statement())
        .with_context(|| format!("Failed to create {FACT_TABLE}"))?;

    wh.commit().context("Failed to commit schema")?;
    info!(tables = Dimension::ALL.len() + 1, "Schema recreated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{SqliteWarehouse, Value};

    fn table_names(wh: &mut SqliteWarehouse) -> Vec<String> {
        wh.fetch_all("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .unwrap()
            .into_iter()
            .filter_map(|row| row[0].as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn creates_all_tables_on_empty_database() {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        create_tables(&mut wh).unwrap();

        let names = table_names(&mut wh);
        assert_eq!(names.len(), 10);
        assert!(names.contains(&FACT_TABLE.to_string()));
        for dim in Dimension::ALL {
            assert!(names.contains(&dim.table().to_string()), "{}", dim.table());
        }
    }

    #[test]
    fn recreate_discards_existing_rows() {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        create_tables(&mut wh).unwrap();
        wh.execute("INSERT INTO dim_city (city_name) VALUES ('Oslo')")
            .unwrap();
        wh.commit().unwrap();

        create_tables(&mut wh).unwrap();
        let rows = wh.fetch_all("SELECT * FROM dim_city").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn natural_key_is_unique() {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        create_tables(&mut wh).unwrap();
        wh.execute("INSERT INTO dim_sport (sport_name) VALUES ('Skiing')")
            .unwrap();
        let err = wh
            .execute("INSERT INTO dim_sport (sport_name) VALUES ('Skiing')")
            .unwrap_err();
        assert!(format!("{err:#}").contains("UNIQUE"));
    }

    #[test]
    fn country_unique_on_code_and_name() {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        create_tables(&mut wh).unwrap();
        wh.execute("INSERT INTO dim_country (country_code, country_name) VALUES ('NOR', 'Norway')")
            .unwrap();
        wh.execute("INSERT INTO dim_country (country_code, country_name) VALUES ('NOR', 'Norge')")
            .unwrap();
        assert!(wh
            .execute("INSERT INTO dim_country (country_code, country_name) VALUES ('NOR', 'Norway')")
            .is_err());
    }

    #[test]
    fn fact_rows_cascade_on_dimension_delete() {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        create_tables(&mut wh).unwrap();
        wh.execute("INSERT INTO dim_city (city_name) VALUES ('Oslo')")
            .unwrap();
        wh.execute(&format!("INSERT INTO {FACT_TABLE} (city_id) VALUES (1)"))
            .unwrap();
        wh.execute("DELETE FROM dim_city WHERE city_id = 1").unwrap();

        let rows = wh
            .fetch_all(&format!("SELECT COUNT(*) FROM {FACT_TABLE}"))
            .unwrap();
        assert_eq!(rows[0][0], Value::Integer(0));
    }

    #[test]
    fn fact_rejects_dangling_foreign_key() {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        create_tables(&mut wh).unwrap();
        let result = wh.execute(&format!("INSERT INTO {FACT_TABLE} (city_id) VALUES (42)"));
        assert!(result.is_err());
    }

    #[test]
    fn fact_statement_references_every_dimension() {
        let ddl = fact_create_statement();
        for dim in Dimension::ALL {
            assert!(ddl.contains(&format!("REFERENCES {}({})", dim.table(), dim.id_column())));
        }
        assert_eq!(ddl.matches("ON DELETE CASCADE").count(), 9);
    }
}
