//! Schema-aware application of a [`PredicateSet`] to one source table.
//!
//! Each predicate compiles to a [`ColumnFilter`] bound to one column. Whether a filter runs on a
//! given table is decided once, against the table as loaded, by [`applicability`]: the column must
//! exist, carry at least one non-missing value, and the filter must not be its no-op sentinel.
//! The same predicate set can therefore filter one source and skip another.

use std::fmt;

use tracing::debug;

use crate::{
    dates::parse_publish_date,
    matcher::Matcher,
    predicate::{AgeFilter, CountryFilter, DateRange, GenreFilter, MediaKind, PredicateSet},
    table::{Row, Table},
    vocabulary::Vocabulary,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateKind {
    Country,
    Age,
    Genre,
    MediaType,
    PublishDate,
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PredicateKind::Country => "country",
            PredicateKind::Age => "age",
            PredicateKind::Genre => "genre",
            PredicateKind::MediaType => "media type",
            PredicateKind::PublishDate => "publish date",
        };
        f.write_str(name)
    }
}

/// What a compiled filter checks on a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowTest {
    /// Keep rows whose cell matches.
    Matches(Matcher),
    /// Keep rows whose cell is present and does not match.
    PresentWithout(Matcher),
    /// Keep rows whose cell parses as a date inside the range; unparsable cells are dropped.
    PublishedWithin(DateRange),
}

impl RowTest {
    pub fn keeps(&self, cell: Option<&str>) -> bool {
        match self {
            RowTest::Matches(matcher) => matcher.matches(cell),
            RowTest::PresentWithout(matcher) => cell.is_some() && !matcher.matches(cell),
            RowTest::PublishedWithin(range) => cell
                .and_then(parse_publish_date)
                .is_some_and(|date| range.contains(date)),
        }
    }
}

/// A predicate bound to its column. `test == None` is the no-op sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFilter {
    pub kind:   PredicateKind,
    pub column: String,
    pub test:   Option<RowTest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Applicability {
    Applicable,
    NoOp,
    MissingColumn,
    EmptyColumn,
}

/// Decides whether a filter runs, from column presence, column data and the no-op sentinel.
pub fn applicability(column_present: bool, column_has_data: bool, is_no_op: bool) -> Applicability {
    if !column_present {
        Applicability::MissingColumn
    } else if !column_has_data {
        Applicability::EmptyColumn
    } else if is_no_op {
        Applicability::NoOp
    } else {
        Applicability::Applicable
    }
}

impl ColumnFilter {
    pub fn applicability_for(&self, table: &Table) -> Applicability {
        applicability(
            table.has_column(&self.column),
            table.column_has_data(&self.column),
            self.test.is_none(),
        )
    }

    pub fn keeps(&self, row: &Row) -> bool {
        self.test
            .as_ref()
            .is_none_or(|test| test.keeps(row.get(&self.column)))
    }
}

/// Compiles the predicate set into per-column filters, in application order.
pub fn compile(predicates: &PredicateSet, vocabulary: &Vocabulary) -> Vec<ColumnFilter> {
    let columns = &vocabulary.columns;

    let country = match &predicates.country {
        CountryFilter::All => None,
        CountryFilter::OnlyDomestic => Some(RowTest::Matches(Matcher::contains(
            &vocabulary.domestic_token,
        ))),
        CountryFilter::OnlyForeign => Some(RowTest::PresentWithout(Matcher::contains(
            &vocabulary.domestic_token,
        ))),
        CountryFilter::Token(token) => Some(RowTest::Matches(Matcher::delimited_token(token))),
    };

    let age = predicates
        .age
        .age_number()
        .map(|number| RowTest::Matches(Matcher::whole_word(number)));

    let genre = match &predicates.genre {
        GenreFilter::All => None,
        GenreFilter::Token(token) => Some(RowTest::Matches(Matcher::delimited_token(token))),
    };

    let media = predicates.media_type.selected().map(|kind| {
        let marker = match kind {
            MediaKind::Film => &vocabulary.film_marker,
            MediaKind::Series => &vocabulary.series_marker,
        };
        RowTest::Matches(Matcher::contains(marker))
    });

    vec![
        ColumnFilter {
            kind:   PredicateKind::Country,
            column: columns.country.clone(),
            test:   country,
        },
        ColumnFilter {
            kind:   PredicateKind::Age,
            column: columns.age.clone(),
            test:   age,
        },
        ColumnFilter {
            kind:   PredicateKind::Genre,
            column: columns.genre.clone(),
            test:   genre,
        },
        ColumnFilter {
            kind:   PredicateKind::MediaType,
            column: columns.kind.clone(),
            test:   media,
        },
        ColumnFilter {
            kind:   PredicateKind::PublishDate,
            column: columns.publish.clone(),
            test:   Some(RowTest::PublishedWithin(predicates.date_range)),
        },
    ]
}

/// The predicate set compiled against a vocabulary, ready to filter any number of tables.
#[derive(Debug, Clone)]
pub struct PredicateApplier {
    filters: Vec<ColumnFilter>,
}

impl PredicateApplier {
    pub fn new(predicates: &PredicateSet, vocabulary: &Vocabulary) -> Self {
        Self {
            filters: compile(predicates, vocabulary),
        }
    }

    pub fn filters(&self) -> &[ColumnFilter] {
        &self.filters
    }

    /// Filters that will run against `table`, decided before any row is removed.
    pub fn plan<'a>(&'a self, table: &Table) -> Vec<&'a ColumnFilter> {
        self.filters
            .iter()
            .filter(|filter| {
                let decision = filter.applicability_for(table);
                debug!(predicate = %filter.kind, column = %filter.column, ?decision, "applicability");
                decision == Applicability::Applicable
            })
            .collect()
    }

    /// Returns the rows of `table` passing every applicable filter.
    pub fn apply(&self, table: Table) -> Table {
        let active = self.plan(&table);
        if active.is_empty() {
            return table;
        }
        let before = table.len();
        let filtered = table.retain(|row| active.iter().all(|filter| filter.keeps(row)));
        debug!(before, after = filtered.len(), filters = active.len(), "filtered table");
        filtered
    }
}
