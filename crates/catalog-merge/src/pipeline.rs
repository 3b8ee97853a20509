//! Merge, deduplicate and sample the per-source filtered tables.

use std::collections::HashSet;

use rand::Rng;
use tracing::debug;

use crate::table::Table;

/// Concatenates tables, outer-joining their headers in first-seen order.
///
/// Empty tables contribute no columns.
pub fn concat<I>(tables: I) -> Table
where
    I: IntoIterator<Item = Table>,
{
    let mut merged = Table::default();
    for table in tables {
        if table.is_empty() {
            continue;
        }
        for column in table.columns() {
            merged.add_column(column.as_str());
        }
        for row in table.into_rows() {
            merged.push_row(row);
        }
    }
    merged
}

/// Removes rows identical across every column, keeping the first occurrence.
/// Returns the number of rows removed.
pub fn dedup(table: Table) -> (Table, usize) {
    let before = table.len();
    let mut seen = HashSet::with_capacity(before);
    let deduped = {
        let columns = table.columns().to_vec();
        table.retain(|row| {
            let key: Vec<Option<String>> = columns
                .iter()
                .map(|column| row.get(column).map(str::to_string))
                .collect();
            seen.insert(key)
        })
    };
    let removed = before - deduped.len();
    debug!(before, removed, "deduplicated merged table");
    (deduped, removed)
}

/// Draws `display_count` rows uniformly without replacement when the table is larger.
///
/// A count of 0 keeps everything. Returns whether sampling happened.
pub fn sample<R: Rng + ?Sized>(table: Table, display_count: usize, rng: &mut R) -> (Table, bool) {
    if display_count == 0 || table.len() <= display_count {
        return (table, false);
    }
    let total = table.len();
    let picked = rand::seq::index::sample(rng, total, display_count);

    let columns = table.columns().to_vec();
    let mut slots: Vec<_> = table.into_rows().into_iter().map(Some).collect();
    let mut sampled = Table::new(columns);
    for idx in picked.iter() {
        if let Some(row) = slots[idx].take() {
            sampled.push_row(row);
        }
    }
    debug!(total, kept = sampled.len(), "sampled merged table");
    (sampled, true)
}
