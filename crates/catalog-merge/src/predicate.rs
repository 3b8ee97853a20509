//! The typed predicate set a run filters with, and its construction from raw UI selections.

use bon::Builder;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::vocabulary::Vocabulary;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CountryFilter {
    #[default]
    All,
    OnlyDomestic,
    OnlyForeign,
    Token(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AgeFilter {
    #[default]
    Mixed,
    /// Raw age label such as `"12 سال"`; only its first digit run is matched.
    Token(String),
}

impl AgeFilter {
    /// First run of digits in the label. `None` for mixed or a label without digits.
    pub fn age_number(&self) -> Option<&str> {
        let AgeFilter::Token(label) = self else {
            return None;
        };
        let start = label.find(|c: char| c.is_numeric())?;
        let rest = &label[start..];
        let end = rest.find(|c: char| !c.is_numeric()).unwrap_or(rest.len());
        Some(&rest[..end])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GenreFilter {
    #[default]
    All,
    Token(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Film,
    Series,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaType {
    pub include_film:   bool,
    pub include_series: bool,
}

impl MediaType {
    pub fn film_only() -> Self {
        Self {
            include_film:   true,
            include_series: false,
        }
    }

    pub fn series_only() -> Self {
        Self {
            include_film:   false,
            include_series: true,
        }
    }

    /// The kind to keep, when exactly one of the two flags is set.
    pub fn selected(&self) -> Option<MediaKind> {
        match (self.include_film, self.include_series) {
            (true, false) => Some(MediaKind::Film),
            (false, true) => Some(MediaKind::Series),
            _ => None,
        }
    }
}

/// Inclusive publish-date window. An inverted window is valid and matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end:   NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN),
            end:   NaiveDate::from_ymd_opt(2030, 1, 1).unwrap_or(NaiveDate::MAX),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
pub struct PredicateSet {
    #[builder(default)]
    pub country:       CountryFilter,
    #[builder(default)]
    pub age:           AgeFilter,
    #[builder(default)]
    pub genre:         GenreFilter,
    #[builder(default)]
    pub media_type:    MediaType,
    #[builder(default)]
    pub date_range:    DateRange,
    /// Output row cap; 0 means unlimited.
    #[builder(default)]
    pub display_count: usize,
}

/// Filter choices exactly as the host collected them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selection {
    pub country:       String,
    pub age:           String,
    pub genre:         String,
    pub film:          bool,
    pub series:        bool,
    pub start_date:    NaiveDate,
    pub end_date:      NaiveDate,
    pub display_count: usize,
}

impl Default for Selection {
    fn default() -> Self {
        let range = DateRange::default();
        // blank texts mean "no filter" under any vocabulary
        Self {
            country:       String::new(),
            age:           String::new(),
            genre:         String::new(),
            film:          false,
            series:        false,
            start_date:    range.start,
            end_date:      range.end,
            display_count: 0,
        }
    }
}

impl PredicateSet {
    /// Interprets raw selection texts against the vocabulary's sentinels.
    ///
    /// Blank texts count as "no filter".
    pub fn from_selection(selection: &Selection, vocabulary: &Vocabulary) -> Self {
        let country = selection.country.trim();
        let country = if country.is_empty()
            || vocabulary
                .all_countries
                .iter()
                .any(|sentinel| sentinel.trim() == country)
        {
            CountryFilter::All
        } else if country == vocabulary.only_domestic.trim() {
            CountryFilter::OnlyDomestic
        } else if country == vocabulary.only_foreign.trim() {
            CountryFilter::OnlyForeign
        } else {
            CountryFilter::Token(country.to_string())
        };

        let age = selection.age.trim();
        let age = if age.is_empty() || age == vocabulary.mixed_age.trim() {
            AgeFilter::Mixed
        } else {
            AgeFilter::Token(age.to_string())
        };

        let genre = selection.genre.trim();
        let genre = if genre.is_empty() || genre == vocabulary.all_genres.trim() {
            GenreFilter::All
        } else {
            GenreFilter::Token(genre.to_string())
        };

        PredicateSet {
            country,
            age,
            genre,
            media_type: MediaType {
                include_film:   selection.film,
                include_series: selection.series,
            },
            date_range: DateRange::new(selection.start_date, selection.end_date),
            display_count: selection.display_count,
        }
    }
}
