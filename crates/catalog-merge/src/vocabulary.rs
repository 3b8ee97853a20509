//! Localized selection texts, marker tokens and column names.
//!
//! The defaults are the Persian labels the catalog spreadsheets and the selection UI use. A
//! JSON file with any subset of the fields overrides them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Country selections meaning "do not filter".
    pub all_countries:  Vec<String>,
    pub only_domestic:  String,
    pub only_foreign:   String,
    /// Token whose presence marks a domestic title.
    pub domestic_token: String,
    pub mixed_age:      String,
    pub all_genres:     String,
    pub film_marker:    String,
    pub series_marker:  String,
    pub columns:        ColumnNames,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub country: String,
    pub age:     String,
    pub genre:   String,
    pub kind:    String,
    pub publish: String,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            all_countries:  vec!["همه کشورها".into(), "----------".into()],
            only_domestic:  "فقط ایرانی".into(),
            only_foreign:   "فقط خارجی".into(),
            domestic_token: "ایران".into(),
            mixed_age:      "ترکیبی".into(),
            all_genres:     "انواع ژانر".into(),
            film_marker:    "فیلم".into(),
            series_marker:  "سریال".into(),
            columns:        ColumnNames::default(),
        }
    }
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            country: "country".into(),
            age:     "age".into(),
            genre:   "genre".into(),
            kind:    "type".into(),
            publish: "publish".into(),
        }
    }
}

impl Vocabulary {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        crate::config::read_json(path.as_ref())
    }
}
