use serde::{Deserialize, Deserializer};
use std::fmt;

use crate::config::{SUMMER_FILE, WINTER_FILE};

/// Which games a result file belongs to. Seeded into `dim_season` as a fixed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Season {
    Winter,
    Summer,
}

impl Season {
    /// Creation order of the seeded rows.
    pub const ALL: [Season; 2] = [Season::Winter, Season::Summer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Summer => "summer",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Season::Winter => WINTER_FILE,
            Season::Summer => SUMMER_FILE,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One medal row from `winter.csv` or `summer.csv`. Other columns are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "Sport")]
    pub sport: String,
    #[serde(rename = "Medal")]
    pub medal: String,
    #[serde(rename = "Year")]
    pub year: i64,
    #[serde(rename = "Event")]
    pub event: String,
    #[serde(rename = "Athlete")]
    pub athlete: String,
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "Country")]
    pub country: String,
}

/// One row of `dictionary.csv`, keyed by whitespace-stripped headers.
///
/// A blank `Code` or `Country` cell is `None` and is stored as NULL, so it can
/// never match a result record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CountryRecord {
    #[serde(rename = "Code", deserialize_with = "blank_as_none")]
    pub code: Option<String>,
    #[serde(rename = "Country", deserialize_with = "blank_as_none")]
    pub name: Option<String>,
    #[serde(rename = "GDPperCapita", default, deserialize_with = "csv::invalid_option")]
    pub gdp_per_capita: Option<f64>,
    #[serde(rename = "Population", default, deserialize_with = "csv::invalid_option")]
    pub population: Option<i64>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// A fully resolved fact: one surrogate key per dimension, country optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactRow {
    pub city_id: i64,
    pub season_id: i64,
    pub sport_id: i64,
    pub medal_id: i64,
    pub country_id: Option<i64>,
    pub year_id: i64,
    pub event_id: i64,
    pub athlete_id: i64,
    pub gender_id: i64,
}
