//! Tabular loader: reads each side's declared files into the read-only table cache.
//!
//! A missing file or one that fails to parse leaves its logical table absent; the
//! problem is logged and recorded in the [`LoadReport`] but never aborts the load.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, Reader, open_workbook_auto};
use encoding_rs::Encoding;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    data::{Cell, Value, infer_cell},
    frame::Frame,
    io_utils,
};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];
const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv", "tab", "psv", "txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Target => write!(f, "target"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableKey {
    pub side: Side,
    pub name: String,
}

/// Loaded tables keyed by `(side, logical name)`. Populated once, then only read.
#[derive(Debug, Default)]
pub struct TableCache {
    tables: BTreeMap<TableKey, Frame>,
    empty: Frame,
}

impl TableCache {
    pub fn insert(&mut self, side: Side, name: &str, frame: Frame) -> Result<()> {
        let key = TableKey {
            side,
            name: name.to_string(),
        };
        if self.tables.contains_key(&key) {
            bail!("{side} table '{name}' is already loaded");
        }
        self.tables.insert(key, frame);
        Ok(())
    }

    pub fn get(&self, side: Side, name: &str) -> Option<&Frame> {
        self.tables.get(&TableKey {
            side,
            name: name.to_string(),
        })
    }

    /// Absent tables read as an empty frame.
    pub fn frame_or_empty(&self, side: Side, name: &str) -> &Frame {
        self.get(side, name).unwrap_or(&self.empty)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadStatus {
    Loaded { rows: usize, columns: usize },
    Missing,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadEntry {
    pub side: Side,
    pub table: String,
    pub file: PathBuf,
    #[serde(flatten)]
    pub status: LoadStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub entries: Vec<LoadEntry>,
}

impl LoadReport {
    pub fn loaded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, LoadStatus::Loaded { .. }))
            .count()
    }
}

/// Loads every `{logical name -> file name}` entry found under `dir` into `cache`.
pub fn load_side(
    cache: &mut TableCache,
    report: &mut LoadReport,
    side: Side,
    dir: &Path,
    files: &BTreeMap<String, String>,
    encoding: &'static Encoding,
) {
    info!("Loading {side} tables from {dir:?}");
    for (table, filename) in files {
        let path = dir.join(filename);
        let status = if !path.is_file() {
            debug!("  {side} table '{table}': {path:?} not found");
            LoadStatus::Missing
        } else {
            match load_table(&path, encoding).and_then(|frame| {
                let status = LoadStatus::Loaded {
                    rows: frame.len(),
                    columns: frame.width(),
                };
                info!(
                    "  ✓ Loaded {side} table '{table}' from {filename}: {} row(s), columns {:?}",
                    frame.len(),
                    frame.columns()
                );
                cache.insert(side, table, frame)?;
                Ok(status)
            }) {
                Ok(status) => status,
                Err(err) => {
                    warn!("  ✗ Skipping {side} table '{table}' ({filename}): {err:#}");
                    LoadStatus::Failed {
                        reason: format!("{err:#}"),
                    }
                }
            }
        };
        report.entries.push(LoadEntry {
            side,
            table: table.clone(),
            file: path,
            status,
        });
    }
}

/// Reads one file, dispatching on its extension. Spreadsheets contribute their first
/// sheet only.
pub fn load_table(path: &Path, encoding: &'static Encoding) -> Result<Frame> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        load_spreadsheet(path)
    } else if DELIMITED_EXTENSIONS.contains(&ext.as_str()) {
        load_delimited(path, encoding)
    } else {
        Err(anyhow!("unsupported file format '.{ext}'"))
    }
}

fn load_delimited(path: &Path, encoding: &'static Encoding) -> Result<Frame> {
    let delimiter = io_utils::resolve_input_delimiter(path);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers of {path:?}"))?;
    let headers = unique_headers(headers);
    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", row_idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} of {path:?}", row_idx + 2))?;
        if decoded.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(decoded.iter().map(|field| infer_cell(field)).collect());
    }
    Ok(Frame::from_rows(headers, rows))
}

fn load_spreadsheet(path: &Path) -> Result<Frame> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Opening workbook {path:?}"))?;
    let sheet_count = workbook.sheet_names().len();
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook has no sheets"))?
        .with_context(|| format!("Reading first sheet of {path:?}"))?;
    if sheet_count > 1 {
        debug!("{path:?} has {sheet_count} sheets; only the first is read");
    }
    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_row.iter().map(header_text).collect::<Vec<_>>(),
        None => return Ok(Frame::default()),
    };
    let headers = unique_headers(headers);
    let body = rows
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| row.iter().map(spreadsheet_cell).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    Ok(Frame::from_rows(headers, body))
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Empty => String::new(),
        other => spreadsheet_cell(other)
            .map(|v| v.as_display())
            .unwrap_or_default(),
    }
}

fn spreadsheet_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) if s.trim().is_empty() => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Int(i) => Some(Value::Integer(*i)),
        Data::Float(f) => Some(Value::Float(*f)),
        Data::Bool(b) => Some(Value::Boolean(*b)),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(parsed) if parsed.time() == chrono::NaiveTime::MIN => {
                Some(Value::Date(parsed.date()))
            }
            Some(parsed) => Some(Value::DateTime(parsed)),
            None => Some(Value::Float(dt.as_f64())),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Value::String(s.clone())),
    }
}

/// Blank headers become `Unnamed: <idx>` and repeats get a `.<n>` suffix, so every
/// column of a loaded table is addressable by a distinct name.
fn unique_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, header)| {
            let base = if header.trim().is_empty() {
                format!("Unnamed: {idx}")
            } else {
                header
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}
