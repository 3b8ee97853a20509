use std::{collections::HashSet, path::Path};

use calamine::{Data, Reader, open_workbook_auto};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::LoadError,
    table::{Row, Table, normalize_cell},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Csv,
    Tsv,
    Spreadsheet,
    Unknown,
}

pub fn detect_file_type(path: &Path) -> FileType {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => FileType::Csv,
        "tsv" | "tab" => FileType::Tsv,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => FileType::Spreadsheet,
        _ => FileType::Unknown,
    }
}

/// Reads one source file into a table. Whitespace-only cells become missing.
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<Table, LoadError> {
    let path = path.as_ref();
    let table = match detect_file_type(path) {
        FileType::Csv => load_delimited(path, b',')?,
        FileType::Tsv => load_delimited(path, b'\t')?,
        FileType::Spreadsheet => load_spreadsheet(path)?,
        FileType::Unknown => {
            return Err(LoadError::UnsupportedFormat(path.display().to_string()));
        },
    };
    debug!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        "loaded source table"
    );
    Ok(table)
}

fn load_delimited(path: &Path, delimiter: u8) -> Result<Table, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;

    let headers = rdr.headers()?.clone();
    if headers.is_empty() {
        return Err(LoadError::NoHeader);
    }
    let names = header_names(headers.iter());

    let mut table = Table::new(names.iter().cloned());
    for record in rdr.records() {
        let record = record?;
        table.push_row(build_row(&names, record.iter().map(normalize_cell)));
    }
    Ok(table)
}

fn load_spreadsheet(path: &Path) -> Result<Table, LoadError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range_at(0).ok_or(LoadError::NoSheet)??;

    let mut rows = range.rows();
    let header = rows.next().ok_or(LoadError::NoHeader)?;
    let names = header_names(header.iter().map(|cell| cell_text(cell).unwrap_or_default()));

    let mut table = Table::new(names.iter().cloned());
    for cells in rows {
        table.push_row(build_row(&names, cells.iter().map(cell_text)));
    }
    Ok(table)
}

/// Trimmed header names; blank header cells get a positional `column_<n>` name and repeated
/// names get a `.1`, `.2`, ... suffix so no column shadows another.
fn header_names<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = name.as_ref().trim();
            let base = if name.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                name.to_string()
            };
            let mut unique = base.clone();
            let mut suffix = 0;
            while !seen.insert(unique.clone()) {
                suffix += 1;
                unique = format!("{base}.{suffix}");
            }
            unique
        })
        .collect()
}

fn build_row<I>(names: &[String], cells: I) -> Row
where
    I: Iterator<Item = Option<String>>,
{
    let mut row = Row::new();
    // cells beyond the header width have no column to land in
    for (name, cell) in names.iter().zip(cells) {
        if cell.is_some() {
            row.set(name.as_str(), cell);
        }
    }
    row
}

/// Stringifies a spreadsheet cell the way it reads on screen; blanks and errors are missing.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => normalize_cell(s),
        Data::Int(v) => Some(v.to_string()),
        Data::Float(v) => Some(format_float(*v)),
        Data::Bool(v) => Some(v.to_string()),
        Data::DateTime(v) => Some(excel_serial_to_text(v.as_f64())),
    }
}

pub(crate) fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// Converts an Excel serial date (days since 1899-12-30) to ISO text.
fn excel_serial_to_text(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30) else {
        return format_float(serial);
    };
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    let Some(datetime) = epoch
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.checked_add_signed(Duration::days(days)))
        .and_then(|day| day.checked_add_signed(Duration::seconds(seconds)))
    else {
        return format_float(serial);
    };
    if seconds == 0 {
        datetime.format("%Y-%m-%d").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
