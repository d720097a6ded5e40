//! Dimension loading: distinct natural keys in, one row per key out.
//!
//! Surrogate keys are assigned by the database on insert. Values are inserted in
//! sorted order so that unchanged input yields the same keys on every run.

use crate::loader::load_rows;
use crate::models::{CountryRecord, ResultRecord, Season};
use crate::schema::Dimension;
use crate::source::SourceData;
use crate::warehouse::{Value, Warehouse};
use anyhow::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

/// Distinct values of each data-derived attribute across both result files.
#[derive(Debug, Default)]
pub struct DistinctValues {
    pub cities: FxHashSet<String>,
    pub sports: FxHashSet<String>,
    pub medals: FxHashSet<String>,
    pub years: FxHashSet<i64>,
    pub events: FxHashSet<String>,
    pub athletes: FxHashSet<String>,
    pub genders: FxHashSet<String>,
}

impl DistinctValues {
    pub fn collect<'a>(records: impl IntoIterator<Item = &'a ResultRecord>) -> Self {
        let mut values = Self::default();
        for rec in records {
            values.cities.insert(rec.city.clone());
            values.sports.insert(rec.sport.clone());
            values.medals.insert(rec.medal.clone());
            values.years.insert(rec.year);
            values.events.insert(rec.event.clone());
            values.athletes.insert(rec.athlete.clone());
            values.genders.insert(rec.gender.clone());
        }
        values
    }

    /// Single-column dimensions paired with their sorted rows, in load order.
    fn rows(&self) -> Vec<(Dimension, Vec<Vec<Value>>)> {
        vec![
            (Dimension::City, text_rows(&self.cities)),
            (Dimension::Sport, text_rows(&self.sports)),
            (Dimension::Medal, text_rows(&self.medals)),
            (Dimension::Year, year_rows(&self.years)),
            (Dimension::Event, text_rows(&self.events)),
            (Dimension::Athlete, text_rows(&self.athletes)),
            (Dimension::Gender, text_rows(&self.genders)),
        ]
    }
}

fn text_rows(values: &FxHashSet<String>) -> Vec<Vec<Value>> {
    let mut sorted: Vec<&String> = values.iter().collect();
    sorted.sort_unstable();
    sorted
        .into_iter()
        .map(|v| vec![Value::from(v.as_str())])
        .collect()
}

fn year_rows(values: &FxHashSet<i64>) -> Vec<Vec<Value>> {
    let mut sorted: Vec<i64> = values.iter().copied().collect();
    sorted.sort_unstable();
    sorted.into_iter().map(|y| vec![Value::from(y)]).collect()
}

/// Loads every dimension, each one committed on its own.
///
/// Expects freshly created tables. A natural key that already exists fails the
/// load with the uniqueness violation rather than being skipped.
pub fn load_dimensions<W: Warehouse + ?Sized>(
    wh: &mut W,
    data: &SourceData,
) -> Result<FxHashMap<Dimension, usize>> {
    let distinct = DistinctValues::collect(data.winter.iter().chain(data.summer.iter()));

    let mut loaded = FxHashMap::default();
    for (dim, rows) in distinct.rows() {
        let n = load_rows(wh, dim.table(), dim.key_columns(), &rows)?;
        loaded.insert(dim, n);
    }
    loaded.insert(Dimension::Season, load_seasons(wh)?);
    loaded.insert(Dimension::Country, load_countries(wh, &data.countries)?);

    info!(
        dimensions = loaded.len(),
        rows = loaded.values().sum::<usize>(),
        "Dimensions loaded"
    );
    Ok(loaded)
}

/// Seeds the two fixed seasons. Not derived from the data.
pub fn load_seasons<W: Warehouse + ?Sized>(wh: &mut W) -> Result<usize> {
    let rows: Vec<Vec<Value>> = Season::ALL
        .iter()
        .map(|s| vec![Value::from(s.as_str())])
        .collect();
    load_rows(wh, Dimension::Season.table(), Dimension::Season.key_columns(), &rows)
}

/// One row per reference record; the dictionary is taken as already deduplicated.
pub fn load_countries<W: Warehouse + ?Sized>(
    wh: &mut W,
    countries: &[CountryRecord],
) -> Result<usize> {
    let rows: Vec<Vec<Value>> = countries
        .iter()
        .map(|c| {
            vec![
                Value::from(c.code.clone()),
                Value::from(c.name.clone()),
                Value::from(c.gdp_per_capita),
                Value::from(c.population),
            ]
        })
        .collect();
    load_rows(
        wh,
        Dimension::Country.table(),
        &[
            "country_code",
            "country_name",
            "country_gdp_per_cap",
            "country_population",
        ],
        &rows,
    )
}
