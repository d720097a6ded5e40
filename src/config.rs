/// Result file for the winter games
pub const WINTER_FILE: &str = "winter.csv";

/// Result file for the summer games
pub const SUMMER_FILE: &str = "summer.csv";

/// Country reference file (code, name, GDP per capita, population)
pub const DICTIONARY_FILE: &str = "dictionary.csv";

/// Fact table holding one row per medal observation
pub const FACT_TABLE: &str = "fact_olympic_events";

/// Default location of the downloaded dataset
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default SQLite warehouse file
pub const DEFAULT_DATABASE: &str = "olympics.db";

/// Characters used as footnote markers in country display names
pub const FOOTNOTE_MARKERS: &str = "*†‡";
