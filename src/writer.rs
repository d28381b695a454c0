//! Output writer: one `Merged_<name>.csv` per non-empty output table.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use encoding_rs::Encoding;
use log::{info, warn};
use regex::Regex;
use serde::Serialize;

use crate::{data::render_cell, io_utils, merge::MergedTables};

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s/\\]+").expect("static regex"));

#[derive(Debug, Clone, Serialize)]
pub struct WrittenTable {
    pub table: String,
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Skipped {
    pub table: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteReport {
    pub written: Vec<WrittenTable>,
    pub skipped: Vec<Skipped>,
}

impl WriteReport {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.written.iter().map(|w| w.path.clone()).collect()
    }

    pub fn path_for(&self, table: &str) -> Option<&Path> {
        self.written
            .iter()
            .find(|w| w.table == table)
            .map(|w| w.path.as_path())
    }
}

/// `Customer Extras/v2` → `Merged_Customer_Extras_v2.csv`.
pub fn output_file_name(table: &str) -> String {
    format!("Merged_{}.csv", file_stem(table))
}

fn file_stem(table: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(table.trim(), "_").into_owned()
}

/// Distinct table names can sanitize to the same file; later ones get `_2`, `_3`, ...
fn unclaimed_file_name(table: &str, claimed: &mut HashSet<String>) -> String {
    let mut name = output_file_name(table);
    let mut counter = 2;
    while claimed.contains(&name.to_lowercase()) {
        name = format!("Merged_{}_{counter}.csv", file_stem(table));
        counter += 1;
    }
    claimed.insert(name.to_lowercase());
    name
}

/// Writes every table with rows. A table that fails to serialize is logged and
/// recorded as skipped; the others are still written.
pub fn write_tables(tables: &MergedTables, dir: &Path, encoding: &'static Encoding) -> WriteReport {
    let mut report = WriteReport::default();
    let mut claimed = HashSet::new();
    for table in tables.iter() {
        if table.frame.is_empty() {
            info!("Skipping {}: no records", table.name);
            report.skipped.push(Skipped {
                table: table.name.clone(),
                reason: "no records".into(),
            });
            continue;
        }
        let file_name = unclaimed_file_name(&table.name, &mut claimed);
        if file_name != output_file_name(&table.name) {
            warn!("{} shares its file name with another table; writing {file_name}", table.name);
        }
        let path = dir.join(file_name);
        let rows = table
            .frame
            .rows()
            .iter()
            .map(|row| row.iter().map(render_cell).collect::<Vec<_>>());
        match io_utils::write_csv(&path, table.frame.columns(), rows, encoding) {
            Ok(()) => {
                info!(
                    "✓ Wrote {} ({} records, {} columns) to {:?}",
                    table.name,
                    table.frame.len(),
                    table.frame.width(),
                    path
                );
                report.written.push(WrittenTable {
                    table: table.name.clone(),
                    path,
                    rows: table.frame.len(),
                    columns: table.frame.width(),
                });
            }
            Err(err) => {
                warn!("✗ Failed to write {}: {err:#}", table.name);
                report.skipped.push(Skipped {
                    table: table.name.clone(),
                    reason: format!("{err:#}"),
                });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Value, frame::Frame, merge::TableOrigin};
    use encoding_rs::UTF_8;
    use std::fs;

    #[test]
    fn file_names_replace_whitespace_and_separators() {
        assert_eq!(output_file_name("Deposit Accounts"), "Merged_Deposit_Accounts.csv");
        assert_eq!(output_file_name("a/b\\c  d"), "Merged_a_b_c_d.csv");
    }

    #[test]
    fn empty_tables_are_skipped_and_values_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let mut tables = MergedTables::default();
        tables.insert(
            "Customer",
            Frame::from_rows(
                vec!["id".into(), "balance".into()],
                vec![vec![Some(Value::from("C1")), Some(Value::Float(12.0))]],
            ),
            TableOrigin::Plan,
        );
        tables.insert("Addresses", Frame::new(vec!["id".into()]), TableOrigin::Append);
        let report = write_tables(&tables, dir.path(), UTF_8);
        assert_eq!(report.written.len(), 1);
        assert_eq!(report.skipped[0].table, "Addresses");
        let contents = fs::read_to_string(dir.path().join("Merged_Customer.csv")).unwrap();
        assert_eq!(contents, "\"id\",\"balance\"\n\"C1\",\"12\"\n");
    }

    #[test]
    fn tables_sanitizing_to_one_name_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut tables = MergedTables::default();
        for (name, id) in [("A B", "1"), ("A/B", "2"), ("A  B", "3")] {
            let frame = Frame::from_rows(vec!["id".into()], vec![vec![Some(Value::from(id))]]);
            tables.insert(name, frame, TableOrigin::Plan);
        }
        let report = write_tables(&tables, dir.path(), UTF_8);
        assert_eq!(report.written.len(), 3);
        assert_eq!(report.path_for("A B"), Some(dir.path().join("Merged_A_B.csv").as_path()));
        assert_eq!(report.path_for("A/B"), Some(dir.path().join("Merged_A_B_2.csv").as_path()));
        let third = fs::read_to_string(dir.path().join("Merged_A_B_3.csv")).unwrap();
        assert!(third.contains("\"3\""));
    }

    #[test]
    fn unwritable_table_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Merged_Blocked.csv")).unwrap();
        let mut tables = MergedTables::default();
        let frame = Frame::from_rows(vec!["id".into()], vec![vec![Some(Value::from("1"))]]);
        tables.insert("Blocked", frame.clone(), TableOrigin::Plan);
        tables.insert("Open", frame, TableOrigin::Plan);
        let report = write_tables(&tables, dir.path(), UTF_8);
        assert_eq!(report.written.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.path_for("Open").is_some());
    }
}
