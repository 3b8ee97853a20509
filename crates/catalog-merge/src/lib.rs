//! Filter, merge, deduplicate and sample catalog spreadsheets from several platforms.
//!
//! Each platform ships its own catalog with a loosely shared schema (`country`, `age`, `genre`,
//! `type`, `publish`, plus anything else). A run:
//!
//! 1. loads every selected source ([`loader`]),
//! 2. applies the predicate set to each source on its own ([`applier`]); a filter whose column
//!    is absent or empty in a source is skipped for that source,
//! 3. concatenates and deduplicates the survivors and samples them down to the display count
//!    ([`pipeline`]),
//! 4. writes one output sheet atomically ([`writer`]).
//!
//! [`orchestrator::run`] drives the whole sequence and reports progress to an observer.
//!
//! ```no_run
//! use catalog_merge::prelude::*;
//!
//! let request = RunRequest::builder()
//!     .sources(vec![SourceDescriptor::new("filimo", "filimo.xlsx")])
//!     .predicates(PredicateSet::builder().country(CountryFilter::OnlyDomestic).build())
//!     .output("out.xlsx")
//!     .build();
//! let summary = run(&request, &NoProgress, &CancelFlag::new()).unwrap();
//! println!("{} rows", summary.rows);
//! ```

#![deny(unused_must_use)]

pub mod applier;
pub mod config;
pub mod dates;
pub mod error;
pub mod loader;
pub mod matcher;
pub mod orchestrator;
pub mod pipeline;
pub mod predicate;
pub mod table;
pub mod vocabulary;
pub mod writer;

pub mod prelude {
    pub use crate::applier::{Applicability, ColumnFilter, PredicateApplier, PredicateKind};
    pub use crate::config::{RunConfig, load_vocabulary};
    pub use crate::error::{ConfigError, FailureKind, LoadError, RunError, WriteError};
    pub use crate::loader::load_table;
    pub use crate::matcher::Matcher;
    pub use crate::orchestrator::{
        CancelFlag, NoProgress, ProgressObserver, RunRequest, RunState, RunSummary,
        SourceDescriptor, run,
    };
    pub use crate::predicate::{
        AgeFilter, CountryFilter, DateRange, GenreFilter, MediaKind, MediaType, PredicateSet,
        Selection,
    };
    pub use crate::table::{Cell, Row, Table};
    pub use crate::vocabulary::Vocabulary;
    pub use crate::writer::write_table;
}
