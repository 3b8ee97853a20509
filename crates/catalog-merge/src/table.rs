use std::collections::BTreeMap;

/// A single cell value. `None` is the missing marker.
pub type Cell = Option<String>;

/// Normalizes raw cell text: whitespace-only text becomes missing.
pub fn normalize_cell(raw: &str) -> Cell {
    if raw.trim().is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// One row as a sparse mapping from column name to text. Columns without an entry are missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Row {
    cells: BTreeMap<String, String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn is_missing(&self, column: &str) -> bool {
        !self.cells.contains_key(column)
    }

    /// Sets a cell; `None` clears it back to missing.
    pub fn set(&mut self, column: impl Into<String>, value: Cell) {
        let column = column.into();
        match value {
            Some(text) => {
                self.cells.insert(column, text);
            },
            None => {
                self.cells.remove(&column);
            },
        }
    }

    pub fn remove(&mut self, column: &str) -> Cell {
        self.cells.remove(column)
    }

    /// Non-missing cells in column-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, normalize_cell(value.as_ref()));
        }
        row
    }
}

/// Ordered rows plus the ordered header they were read with.
///
/// The header is the table's schema: a column may be listed while every row is missing in it,
/// which is how "column present but empty" is represented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Table::default();
        for column in columns {
            table.add_column(column);
        }
        table
    }

    /// Appends a column to the header if it is not already present.
    pub fn add_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.has_column(&column) {
            self.columns.push(column);
        }
    }

    /// Appends a row, extending the header with any column the row carries that is unknown.
    pub fn push_row(&mut self, row: Row) {
        let unknown: Vec<String> = row
            .iter()
            .filter(|(column, _)| !self.has_column(column))
            .map(|(column, _)| column.to_string())
            .collect();
        self.columns.extend(unknown);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// True when the column exists and at least one row carries a non-missing value in it.
    pub fn column_has_data(&self, column: &str) -> bool {
        self.has_column(column) && self.rows.iter().any(|row| !row.is_missing(column))
    }

    /// Keeps only rows matching `keep`, producing the filtered table.
    pub fn retain<F>(mut self, mut keep: F) -> Self
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(|row| keep(row));
        self
    }

    /// Removes a column from the header and from every row.
    pub fn drop_column(&mut self, column: &str) {
        self.columns.retain(|c| c != column);
        for row in &mut self.rows {
            row.remove(column);
        }
    }

    /// Cell values of a row laid out in header order.
    pub fn row_values<'a>(&'a self, row: &'a Row) -> impl Iterator<Item = Option<&'a str>> {
        self.columns.iter().map(move |column| row.get(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_cells_are_missing() {
        assert_eq!(normalize_cell("  \t "), None);
        assert_eq!(normalize_cell(""), None);
        assert_eq!(normalize_cell(" x "), Some(" x ".to_string()));
    }

    #[test]
    fn column_presence_and_data() {
        let mut table = Table::new(["country", "age"]);
        table.push_row([("country", "ایران"), ("age", "  ")].into_iter().collect());
        assert!(table.has_column("age"));
        assert!(!table.column_has_data("age"));
        assert!(table.column_has_data("country"));
        assert!(!table.column_has_data("genre"));
    }

    #[test]
    fn push_row_extends_header() {
        let mut table = Table::new(["a"]);
        table.push_row([("b", "1")].into_iter().collect());
        assert_eq!(table.columns(), ["a", "b"]);
    }

    #[test]
    fn drop_column_clears_rows() {
        let mut table = Table::new(["a", "scratch"]);
        table.push_row([("a", "1"), ("scratch", "2")].into_iter().collect());
        table.drop_column("scratch");
        assert_eq!(table.columns(), ["a"]);
        assert!(table.rows()[0].is_missing("scratch"));
    }
}
