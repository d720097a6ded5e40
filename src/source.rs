//! Reading the downloaded dataset.
//!
//! All three files are read fully into memory before any load step begins; the
//! dataset is small and every later phase needs random access to the records.

use crate::config::{DICTIONARY_FILE, FOOTNOTE_MARKERS};
use crate::models::{CountryRecord, ResultRecord, Season};
use anyhow::{bail, Context, Result};
use csv::{Reader, StringRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::info;

static FOOTNOTE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"[{}]+", regex::escape(FOOTNOTE_MARKERS))).unwrap()
});

/// Paths of the three input files inside a data directory.
#[derive(Debug, Clone)]
pub struct SourceFiles {
    pub winter: PathBuf,
    pub summer: PathBuf,
    pub dictionary: PathBuf,
}

impl SourceFiles {
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            winter: dir.join(Season::Winter.file_name()),
            summer: dir.join(Season::Summer.file_name()),
            dictionary: dir.join(DICTIONARY_FILE),
        }
    }

    /// Like [`SourceFiles::in_dir`], but fails unless every file is present.
    pub fn locate(data_dir: impl AsRef<Path>) -> Result<Self> {
        let files = Self::in_dir(data_dir);
        for path in files.all() {
            if !path.is_file() {
                bail!(
                    "Missing source file: {}\n\
                     Download the Olympic Games dataset into this directory first.",
                    path.display()
                );
            }
        }
        Ok(files)
    }

    pub fn results(&self, season: Season) -> &Path {
        match season {
            Season::Winter => &self.winter,
            Season::Summer => &self.summer,
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.winter, &self.summer, &self.dictionary]
    }
}

/// The whole dataset, typed and validated.
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    pub winter: Vec<ResultRecord>,
    pub summer: Vec<ResultRecord>,
    pub countries: Vec<CountryRecord>,
}

impl SourceData {
    pub fn read(files: &SourceFiles) -> Result<Self> {
        let data = Self {
            winter: read_results(files.results(Season::Winter))?,
            summer: read_results(files.results(Season::Summer))?,
            countries: read_countries(&files.dictionary)?,
        };
        info!(
            winter = data.winter.len(),
            summer = data.summer.len(),
            countries = data.countries.len(),
            "Source files read"
        );
        Ok(data)
    }

    pub fn records(&self, season: Season) -> &[ResultRecord] {
        match season {
            Season::Winter => &self.winter,
            Season::Summer => &self.summer,
        }
    }

    /// Result records grouped by file, winter first.
    pub fn by_season(&self) -> impl Iterator<Item = (Season, &[ResultRecord])> {
        Season::ALL.into_iter().map(move |s| (s, self.records(s)))
    }

    pub fn result_count(&self) -> usize {
        self.winter.len() + self.summer.len()
    }
}

fn open(path: &Path) -> Result<Reader<BufReader<File>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open source file: {}", path.display()))?;
    Ok(Reader::from_reader(BufReader::new(file)))
}

pub fn read_results(path: &Path) -> Result<Vec<ResultRecord>> {
    let mut reader = open(path)?;
    parse_results(&mut reader).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn read_countries(path: &Path) -> Result<Vec<CountryRecord>> {
    let mut reader = open(path)?;
    parse_countries(&mut reader).with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_results<R: Read>(reader: &mut Reader<R>) -> Result<Vec<ResultRecord>> {
    let mut records = Vec::new();
    for result in reader.deserialize() {
        records.push(result?);
    }
    Ok(records)
}

fn parse_countries<R: Read>(reader: &mut Reader<R>) -> Result<Vec<CountryRecord>> {
    let headers = normalize_headers(reader.headers()?);
    reader.set_headers(headers);

    let mut records = Vec::new();
    for result in reader.deserialize() {
        let mut record: CountryRecord = result?;
        record.name = record
            .name
            .as_deref()
            .map(strip_footnotes)
            .filter(|name| !name.is_empty());
        records.push(record);
    }
    Ok(records)
}

/// `GDP per Capita` -> `GDPperCapita`
fn normalize_headers(headers: &StringRecord) -> StringRecord {
    headers
        .iter()
        .map(|h| h.split_whitespace().collect::<String>())
        .collect()
}

/// `France*` -> `France`
pub fn strip_footnotes(name: &str) -> String {
    FOOTNOTE_REGEX.replace_all(name, "").trim().to_string()
}
