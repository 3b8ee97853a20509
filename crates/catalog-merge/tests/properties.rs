use catalog_merge::{
    applier::{Applicability, PredicateApplier, PredicateKind},
    dates::parse_publish_date,
    pipeline,
    prelude::*,
};
use chrono::NaiveDate;
use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};

const CASES: u32 = 128;

const COLUMNS: [&str; 5] = ["country", "age", "genre", "type", "publish"];

const COUNTRIES: &[&str] = &[
    "ایران",
    "آمریکا",
    "ایران, فرانسه",
    "Iranian-descent",
    "France Iran",
    "iran",
];
const AGES: &[&str] = &["12 سال", "120", "+12", "18 سال", "12سال"];
const GENRES: &[&str] = &["درام", "اکشن, درام", "ملودرام", "کمدی", "Drama"];
const TYPES: &[&str] = &["فیلم", "سریال", "فیلم سینمایی", "مستند"];
const PUBLISHED: &[&str] = &["2019-01-01", "2020-12-31", "2021-06-01", "نامشخص", "2020", "2018-12-31"];

fn cell(pool: &'static [&'static str]) -> impl Strategy<Value = Option<&'static str>> {
    prop::option::of(prop::sample::select(pool))
}

fn arb_table() -> impl Strategy<Value = Table> {
    let row = (
        cell(COUNTRIES),
        cell(AGES),
        cell(GENRES),
        cell(TYPES),
        cell(PUBLISHED),
    );
    (prop::collection::vec(row, 0..24), prop::array::uniform5(any::<bool>())).prop_map(
        |(rows, present)| {
            let columns: Vec<&str> = COLUMNS
                .iter()
                .zip(present)
                .filter(|(_, keep)| *keep)
                .map(|(c, _)| *c)
                .collect();
            let mut table = Table::new(columns.iter().copied().chain(["title"]));
            for (idx, (country, age, genre, kind, publish)) in rows.into_iter().enumerate() {
                let mut row = Row::new();
                row.set("title", Some(format!("t{idx}")));
                for (column, value) in COLUMNS.iter().zip([country, age, genre, kind, publish]) {
                    if columns.contains(column) {
                        row.set(*column, value.map(str::to_string));
                    }
                }
                table.push_row(row);
            }
            table
        },
    )
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn arb_predicates() -> impl Strategy<Value = PredicateSet> {
    let country = prop::sample::select(vec![
        CountryFilter::All,
        CountryFilter::OnlyDomestic,
        CountryFilter::OnlyForeign,
        CountryFilter::Token("iran".into()),
        CountryFilter::Token("ایران".into()),
    ]);
    let age = prop::sample::select(vec![
        AgeFilter::Mixed,
        AgeFilter::Token("12 سال".into()),
        AgeFilter::Token("18".into()),
    ]);
    let genre = prop::sample::select(vec![GenreFilter::All, GenreFilter::Token("درام".into())]);
    let range = prop::sample::select(vec![
        DateRange::new(date(2019, 1, 1), date(2020, 12, 31)),
        DateRange::new(date(2000, 1, 1), date(2030, 1, 1)),
        DateRange::new(date(2021, 1, 1), date(2019, 1, 1)),
    ]);
    (country, age, genre, any::<bool>(), any::<bool>(), range).prop_map(
        |(country, age, genre, include_film, include_series, date_range)| PredicateSet {
            country,
            age,
            genre,
            media_type: MediaType {
                include_film,
                include_series,
            },
            date_range,
            display_count: 0,
        },
    )
}

fn tokens(cell: &str, split: impl Fn(char) -> bool) -> Vec<String> {
    cell.to_lowercase()
        .split(split)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reference semantics for one predicate on one cell, written independently of the matchers.
fn oracle(kind: PredicateKind, predicates: &PredicateSet, cell: Option<&str>) -> bool {
    let Some(cell) = cell else {
        return false;
    };
    let lower = cell.to_lowercase();
    match kind {
        PredicateKind::Country => match &predicates.country {
            CountryFilter::All => true,
            CountryFilter::OnlyDomestic => lower.contains("ایران"),
            CountryFilter::OnlyForeign => !lower.contains("ایران"),
            CountryFilter::Token(token) => tokens(cell, |c| c == ',' || c.is_whitespace())
                .contains(&token.to_lowercase()),
        },
        PredicateKind::Age => match predicates.age.age_number() {
            None => true,
            Some(number) => tokens(cell, |c| !(c.is_alphanumeric() || c == '_'))
                .contains(&number.to_string()),
        },
        PredicateKind::Genre => match &predicates.genre {
            GenreFilter::All => true,
            GenreFilter::Token(token) => tokens(cell, |c| c == ',' || c.is_whitespace())
                .contains(&token.to_lowercase()),
        },
        PredicateKind::MediaType => match predicates.media_type.selected() {
            None => true,
            Some(MediaKind::Film) => lower.contains("فیلم"),
            Some(MediaKind::Series) => lower.contains("سریال"),
        },
        PredicateKind::PublishDate => {
            parse_publish_date(cell).is_some_and(|d| predicates.date_range.contains(d))
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: CASES,
        .. ProptestConfig::default()
    })]

    #[test]
    fn survivors_are_exactly_rows_passing_applicable_filters(
        table in arb_table(),
        predicates in arb_predicates(),
    ) {
        let applier = PredicateApplier::new(&predicates, &Vocabulary::default());
        let applicable: Vec<_> = applier
            .filters()
            .iter()
            .filter(|f| f.applicability_for(&table) == Applicability::Applicable)
            .map(|f| (f.kind, f.column.clone()))
            .collect();

        let expected: Vec<Row> = table
            .rows()
            .iter()
            .filter(|row| {
                applicable
                    .iter()
                    .all(|(kind, column)| oracle(*kind, &predicates, row.get(column)))
            })
            .cloned()
            .collect();

        let out = applier.apply(table);
        prop_assert_eq!(out.rows(), expected.as_slice());
    }

    #[test]
    fn domestic_and_foreign_partition_present_countries(table in arb_table()) {
        let vocabulary = Vocabulary::default();
        let domestic = PredicateApplier::new(
            &PredicateSet::builder().country(CountryFilter::OnlyDomestic).build(),
            &vocabulary,
        );
        let foreign = PredicateApplier::new(
            &PredicateSet::builder().country(CountryFilter::OnlyForeign).build(),
            &vocabulary,
        );
        // the date filter is orthogonal here
        let mut table = table;
        table.drop_column("publish");
        prop_assume!(table.column_has_data("country"));

        let d = domestic.apply(table.clone());
        let f = foreign.apply(table.clone());
        let present = table.rows().iter().filter(|r| !r.is_missing("country")).count();
        prop_assert_eq!(d.len() + f.len(), present);
        for row in d.rows() {
            prop_assert!(!f.rows().contains(row));
        }
    }

    #[test]
    fn unparsable_publish_rows_never_survive(
        table in arb_table(),
        predicates in arb_predicates(),
    ) {
        let out = PredicateApplier::new(&predicates, &Vocabulary::default()).apply(table);
        if out.column_has_data("publish") {
            for row in out.rows() {
                let parsed = row.get("publish").and_then(parse_publish_date);
                prop_assert!(parsed.is_some_and(|d| predicates.date_range.contains(d)));
            }
        }
    }

    #[test]
    fn dedup_is_idempotent_and_leaves_no_duplicates(
        tables in prop::collection::vec(arb_table(), 1..4),
    ) {
        // strip titles so duplicates are likely
        let tables: Vec<Table> = tables
            .into_iter()
            .map(|mut t| {
                t.drop_column("title");
                t
            })
            .collect();
        let (once, _) = pipeline::dedup(pipeline::concat(tables));
        for (i, a) in once.rows().iter().enumerate() {
            for b in &once.rows()[i + 1..] {
                prop_assert_ne!(a, b);
            }
        }
        let (twice, removed) = pipeline::dedup(once.clone());
        prop_assert_eq!(removed, 0);
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn sample_respects_display_count(
        table in arb_table(),
        display_count in 0usize..30,
        seed in any::<u64>(),
    ) {
        let before = table.len();
        let mut rng = StdRng::seed_from_u64(seed);
        let (out, sampled) = pipeline::sample(table, display_count, &mut rng);
        if display_count == 0 || before <= display_count {
            prop_assert_eq!(out.len(), before);
            prop_assert!(!sampled);
        } else {
            prop_assert_eq!(out.len(), display_count);
            prop_assert!(sampled);
        }
    }
}
