//! Fact mapping: raw result records to fully resolved surrogate-key rows.
//!
//! Every dimension's natural-key to surrogate-key mapping is fetched into memory once,
//! before the first record is mapped, so mapping never touches the database.

use crate::config::FACT_TABLE;
use crate::loader::load_rows;
use crate::models::{FactRow, ResultRecord, Season};
use crate::schema::Dimension;
use crate::source::SourceData;
use crate::warehouse::{Value, Warehouse};
use anyhow::{bail, Context, Result};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::fmt::Display;
use std::hash::Hash;
use tracing::{debug, info, warn};

/// A value usable as a dimension's natural key.
pub trait NaturalKey: Hash + Eq + Display + Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl NaturalKey for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl NaturalKey for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

/// Natural key to surrogate key for one dimension.
#[derive(Debug)]
pub struct KeyMap<K> {
    dimension: Dimension,
    keys: FxHashMap<K, i64>,
}

impl<K: NaturalKey> KeyMap<K> {
    /// The first pair seen for a key wins; later ones are logged and ignored.
    pub fn from_pairs(dimension: Dimension, pairs: impl IntoIterator<Item = (K, i64)>) -> Self {
        let mut keys = FxHashMap::default();
        for (key, id) in pairs {
            match keys.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
                Entry::Occupied(slot) => warn!(
                    table = dimension.table(),
                    key = %slot.key(),
                    kept = *slot.get(),
                    ignored = id,
                    "Natural key maps to more than one row"
                ),
            }
        }
        Self { dimension, keys }
    }

    /// Reads `(id, key)` for every row of a single-key dimension.
    pub fn fetch<W: Warehouse + ?Sized>(wh: &mut W, dimension: Dimension) -> Result<Self> {
        let sql = format!(
            "SELECT {id}, {} FROM {} ORDER BY {id}",
            dimension.key_columns()[0],
            dimension.table(),
            id = dimension.id_column(),
        );
        let rows = wh
            .fetch_all(&sql)
            .with_context(|| format!("Failed to fetch keys from {}", dimension.table()))?;
        Ok(Self::from_pairs(dimension, key_pairs(dimension, &rows, 1)?))
    }

    pub fn get(&self, key: &K) -> Option<i64> {
        self.keys.get(key).copied()
    }

    /// Lookup that must succeed. A miss means resolution and mapping disagree on the
    /// source data.
    pub fn require(&self, key: &K) -> Result<i64> {
        match self.get(key) {
            Some(id) => Ok(id),
            None => bail!(
                "No {} row for natural key '{}'",
                self.dimension.table(),
                key
            ),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Reads `(id, key)` pairs where the key sits in column `key_index`.
fn key_pairs<K: NaturalKey>(
    dimension: Dimension,
    rows: &[Vec<Value>],
    key_index: usize,
) -> Result<Vec<(K, i64)>> {
    let mut pairs = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.first().and_then(Value::as_i64);
        let key = row.get(key_index).and_then(K::from_value);
        match (id, key) {
            (Some(id), Some(key)) => pairs.push((key, id)),
            // NULL keys (a blank dictionary cell) stay out of the map.
            (Some(_), None) => continue,
            (None, _) => bail!("Malformed row in {}: {:?}", dimension.table(), row),
        }
    }
    Ok(pairs)
}

/// Countries are looked up by name, then by code; a miss on both is allowed.
///
/// Several dictionary rows may share a name or a code. The one loaded first,
/// i.e. the lowest `country_id`, wins.
#[derive(Debug)]
pub struct CountryKeys {
    by_name: KeyMap<String>,
    by_code: KeyMap<String>,
}

impl CountryKeys {
    pub fn fetch<W: Warehouse + ?Sized>(wh: &mut W) -> Result<Self> {
        let dim = Dimension::Country;
        let sql = format!(
            "SELECT {id}, country_code, country_name FROM {} ORDER BY {id}",
            dim.table(),
            id = dim.id_column(),
        );
        let rows = wh
            .fetch_all(&sql)
            .with_context(|| format!("Failed to fetch keys from {}", dim.table()))?;
        Ok(Self {
            by_code: KeyMap::from_pairs(dim, key_pairs(dim, &rows, 1)?),
            by_name: KeyMap::from_pairs(dim, key_pairs(dim, &rows, 2)?),
        })
    }

    pub fn resolve(&self, country: &str) -> Option<i64> {
        let key = country.trim();
        if key.is_empty() {
            return None;
        }
        let key = key.to_string();
        self.by_name.get(&key).or_else(|| self.by_code.get(&key))
    }
}

/// In-memory lookup tables for every dimension.
#[derive(Debug)]
pub struct DimensionKeys {
    pub cities: KeyMap<String>,
    pub seasons: KeyMap<String>,
    pub sports: KeyMap<String>,
    pub medals: KeyMap<String>,
    pub countries: CountryKeys,
    pub years: KeyMap<i64>,
    pub events: KeyMap<String>,
    pub athletes: KeyMap<String>,
    pub genders: KeyMap<String>,
}

impl DimensionKeys {
    pub fn fetch<W: Warehouse + ?Sized>(wh: &mut W) -> Result<Self> {
        let keys = Self {
            cities: KeyMap::fetch(wh, Dimension::City)?,
            seasons: KeyMap::fetch(wh, Dimension::Season)?,
            sports: KeyMap::fetch(wh, Dimension::Sport)?,
            medals: KeyMap::fetch(wh, Dimension::Medal)?,
            countries: CountryKeys::fetch(wh)?,
            years: KeyMap::fetch(wh, Dimension::Year)?,
            events: KeyMap::fetch(wh, Dimension::Event)?,
            athletes: KeyMap::fetch(wh, Dimension::Athlete)?,
            genders: KeyMap::fetch(wh, Dimension::Gender)?,
        };
        debug!(
            cities = keys.cities.len(),
            athletes = keys.athletes.len(),
            events = keys.events.len(),
            "Dimension keys fetched"
        );
        Ok(keys)
    }

    pub fn season(&self, season: Season) -> Result<i64> {
        self.seasons.require(&season.as_str().to_string())
    }

    /// Resolves one record. Only the country may come back unresolved.
    pub fn map_record(&self, season_id: i64, rec: &ResultRecord) -> Result<FactRow> {
        Ok(FactRow {
            city_id: self.cities.require(&rec.city)?,
            season_id,
            sport_id: self.sports.require(&rec.sport)?,
            medal_id: self.medals.require(&rec.medal)?,
            country_id: self.countries.resolve(&rec.country),
            year_id: self.years.require(&rec.year)?,
            event_id: self.events.require(&rec.event)?,
            athlete_id: self.athletes.require(&rec.athlete)?,
            gender_id: self.genders.require(&rec.gender)?,
        })
    }
}

/// Facts for all records, winter file first, source order kept within each file.
#[derive(Debug, Default)]
pub struct MappedFacts {
    pub rows: Vec<FactRow>,
    pub unresolved_countries: usize,
}

pub fn map_facts(keys: &DimensionKeys, data: &SourceData) -> Result<MappedFacts> {
    let mut mapped = MappedFacts {
        rows: Vec::with_capacity(data.result_count()),
        unresolved_countries: 0,
    };

    for (season, records) in data.by_season() {
        let season_id = keys.season(season)?;
        for (i, rec) in records.iter().enumerate() {
            let row = keys
                .map_record(season_id, rec)
                .with_context(|| format!("Record {} of {}", i + 1, season.file_name()))?;
            if row.country_id.is_none() {
                debug!(season = %season, country = %rec.country, "Country not resolved");
                mapped.unresolved_countries += 1;
            }
            mapped.rows.push(row);
        }
    }
    Ok(mapped)
}

pub const FACT_COLUMNS: [&str; 9] = [
    "city_id",
    "season_id",
    "sport_id",
    "medal_id",
    "country_id",
    "year_id",
    "event_id",
    "athlete_id",
    "gender_id",
];

fn fact_values(row: &FactRow) -> Vec<Value> {
    vec![
        Value::from(row.city_id),
        Value::from(row.season_id),
        Value::from(row.sport_id),
        Value::from(row.medal_id),
        Value::from(row.country_id),
        Value::from(row.year_id),
        Value::from(row.event_id),
        Value::from(row.athlete_id),
        Value::from(row.gender_id),
    ]
}

/// Fetches keys, maps every record, and bulk-inserts the facts with one commit.
pub fn load_facts<W: Warehouse + ?Sized>(wh: &mut W, data: &SourceData) -> Result<MappedFacts> {
    let keys = DimensionKeys::fetch(wh)?;
    let mapped = map_facts(&keys, data)?;

    let rows: Vec<Vec<Value>> = mapped.rows.iter().map(fact_values).collect();
    load_rows(wh, FACT_TABLE, &FACT_COLUMNS, &rows)?;

    info!(
        facts = mapped.rows.len(),
        unresolved_countries = mapped.unresolved_countries,
        "Facts loaded"
    );
    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CountryRecord;
    use crate::resolve::load_dimensions;
    use crate::schema::create_tables;
    use crate::warehouse::SqliteWarehouse;

    fn record(city: &str, country: &str) -> ResultRecord {
        ResultRecord {
            city: city.to_string(),
            sport: "Skiing".to_string(),
            medal: "Gold".to_string(),
            year: 1952,
            event: "Slalom".to_string(),
            athlete: "A. Name".to_string(),
            gender: "Men".to_string(),
            country: country.to_string(),
        }
    }

    fn sample() -> SourceData {
        SourceData {
            winter: vec![record("Oslo", "Norway"), record("Oslo", "Atlantis")],
            summer: vec![record("Helsinki", "NOR")],
            countries: vec![CountryRecord {
                code: Some("NOR".to_string()),
                name: Some("Norway".to_string()),
                gdp_per_capita: None,
                population: None,
            }],
        }
    }

    fn loaded(data: &SourceData) -> SqliteWarehouse {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        create_tables(&mut wh).unwrap();
        load_dimensions(&mut wh, data).unwrap();
        wh
    }

    #[test]
    fn require_names_the_dimension_on_miss() {
        let map = KeyMap::from_pairs(Dimension::City, [("Oslo".to_string(), 1)]);
        assert_eq!(map.require(&"Oslo".to_string()).unwrap(), 1);

        let err = map.require(&"Paris".to_string()).unwrap_err();
        assert!(err.to_string().contains("dim_city"));
        assert!(err.to_string().contains("Paris"));
    }

    #[test]
    fn maps_one_fact_per_record_in_order() {
        let data = sample();
        let mut wh = loaded(&data);
        let keys = DimensionKeys::fetch(&mut wh).unwrap();
        let mapped = map_facts(&keys, &data).unwrap();

        assert_eq!(mapped.rows.len(), 3);
        let winter = keys.season(Season::Winter).unwrap();
        let summer = keys.season(Season::Summer).unwrap();
        assert_eq!(mapped.rows[0].season_id, winter);
        assert_eq!(mapped.rows[1].season_id, winter);
        assert_eq!(mapped.rows[2].season_id, summer);
        assert_eq!(
            mapped.rows[2].city_id,
            keys.cities.get(&"Helsinki".to_string()).unwrap()
        );
    }

    #[test]
    fn unknown_country_maps_to_null() {
        let data = sample();
        let mut wh = loaded(&data);
        let keys = DimensionKeys::fetch(&mut wh).unwrap();
        let mapped = map_facts(&keys, &data).unwrap();

        assert!(mapped.rows[0].country_id.is_some());
        assert_eq!(mapped.rows[1].country_id, None);
        assert_eq!(mapped.unresolved_countries, 1);
    }

    #[test]
    fn country_falls_back_to_code() {
        let data = sample();
        let mut wh = loaded(&data);
        let keys = DimensionKeys::fetch(&mut wh).unwrap();
        let mapped = map_facts(&keys, &data).unwrap();
        assert_eq!(mapped.rows[2].country_id, mapped.rows[0].country_id);
    }

    fn country(code: Option<&str>, name: Option<&str>) -> CountryRecord {
        CountryRecord {
            code: code.map(str::to_string),
            name: name.map(str::to_string),
            gdp_per_capita: None,
            population: None,
        }
    }

    #[test]
    fn blank_country_never_matches_blank_dictionary_cell() {
        let mut data = sample();
        data.countries.push(country(None, Some("Kosovo")));
        data.countries.push(country(Some("XYZ"), None));
        data.winter.push(record("Oslo", ""));
        let mut wh = loaded(&data);
        let keys = DimensionKeys::fetch(&mut wh).unwrap();
        let mapped = map_facts(&keys, &data).unwrap();

        // Winter records come first, so the blank one is third.
        assert_eq!(mapped.rows[2].country_id, None);
        assert_eq!(mapped.unresolved_countries, 2);
        assert_eq!(keys.countries.resolve("   "), None);
    }

    #[test]
    fn first_country_row_wins_on_shared_name() {
        let mut data = sample();
        data.countries.push(country(Some("NRW"), Some("Norway")));
        let mut wh = loaded(&data);
        let keys = DimensionKeys::fetch(&mut wh).unwrap();

        let ids = wh
            .fetch_all("SELECT country_id FROM dim_country ORDER BY country_id")
            .unwrap();
        let first = ids[0][0].as_i64().unwrap();
        let second = ids[1][0].as_i64().unwrap();
        assert_eq!(keys.countries.resolve("Norway"), Some(first));
        assert_eq!(keys.countries.resolve("NRW"), Some(second));
    }

    #[test]
    fn from_pairs_keeps_first_duplicate() {
        let map = KeyMap::from_pairs(
            Dimension::Country,
            [("Norway".to_string(), 1), ("Norway".to_string(), 2)],
        );
        assert_eq!(map.get(&"Norway".to_string()), Some(1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn missing_non_country_key_is_fatal() {
        let data = sample();
        let mut wh = loaded(&data);
        let keys = DimensionKeys::fetch(&mut wh).unwrap();

        let mut drifted = sample();
        drifted.summer.push(record("Paris", "Norway"));
        let err = map_facts(&keys, &drifted).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("dim_city"));
        assert!(msg.contains("summer.csv"));
    }

    #[test]
    fn load_facts_inserts_every_row() {
        let data = sample();
        let mut wh = loaded(&data);
        let mapped = load_facts(&mut wh, &data).unwrap();
        assert_eq!(mapped.rows.len(), 3);

        let count = wh
            .fetch_all(&format!("SELECT COUNT(*), COUNT(country_id) FROM {FACT_TABLE}"))
            .unwrap();
        assert_eq!(count[0], vec![Value::Integer(3), Value::Integer(2)]);
    }
}
