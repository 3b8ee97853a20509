use std::{
    io::Write,
    path::{Path, PathBuf},
};

use rust_xlsxwriter::Workbook;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{
    error::WriteError,
    loader::{FileType, detect_file_type, format_float},
    table::Table,
};

const SHEET_NAME: &str = "Sheet1";

/// Writes `table` to `path` as one sheet with a header row and no index column.
///
/// The file is produced next to its destination and renamed into place, so `path` is either
/// untouched or complete.
pub fn write_table<P: AsRef<Path>>(table: &Table, path: P) -> Result<(), WriteError> {
    let path = path.as_ref();
    let bytes = match detect_file_type(path) {
        FileType::Spreadsheet if is_xlsx(path) => render_xlsx(table)?,
        FileType::Csv => render_delimited(table, b',')?,
        FileType::Tsv => render_delimited(table, b'\t')?,
        _ => return Err(WriteError::UnsupportedFormat(path.display().to_string())),
    };

    let mut tmp = NamedTempFile::new_in(parent_dir(path))?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;

    debug!(path = %path.display(), rows = table.len(), bytes = bytes.len(), "wrote output");
    Ok(())
}

fn is_xlsx(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn render_xlsx(table: &Table) -> Result<Vec<u8>, WriteError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, name) in table.columns().iter().enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }
    for (idx, row) in table.rows().iter().enumerate() {
        let row_num = (idx + 1) as u32;
        for (col, value) in table.row_values(row).enumerate() {
            match value.map(|text| (text, numeric_value(text))) {
                Some((_, Some(number))) => {
                    worksheet.write_number(row_num, col as u16, number)?;
                },
                Some((text, None)) => {
                    worksheet.write_string(row_num, col as u16, text)?;
                },
                None => {},
            }
        }
    }
    Ok(workbook.save_to_buffer()?)
}

/// A cell is written as a number only when it reads back as the same text, so codes like `007`
/// and values like `1e3` stay strings.
fn numeric_value(text: &str) -> Option<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|number| number.is_finite() && format_float(*number) == text)
}

fn render_delimited(table: &Table, delimiter: u8) -> Result<Vec<u8>, WriteError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    wtr.write_record(table.columns())?;
    for row in table.rows() {
        wtr.write_record(table.row_values(row).map(Option::unwrap_or_default))?;
    }
    wtr.into_inner()
        .map_err(|err| WriteError::Io(err.into_error()))
}
