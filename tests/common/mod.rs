#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use bank_merge::MergeRequest;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory with `source/`, `target/` and `out/` sub-directories that is
/// removed on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let workspace = Self {
            temp_dir: tempdir().expect("temp dir"),
        };
        fs::create_dir_all(workspace.source_dir()).expect("source dir");
        fs::create_dir_all(workspace.target_dir()).expect("target dir");
        workspace
    }

    /// A workspace pre-populated with the two fixture banks and their mapping.
    pub fn with_fixture_banks() -> Self {
        let workspace = Self::new();
        copy_dir(&fixture_path("bank1"), &workspace.source_dir());
        copy_dir(&fixture_path("bank2"), &workspace.target_dir());
        fs::copy(fixture_path("mapping.json"), workspace.mapping_path()).expect("copy mapping");
        workspace
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn source_dir(&self) -> PathBuf {
        self.path().join("source")
    }

    pub fn target_dir(&self) -> PathBuf {
        self.path().join("target")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.path().join("mapping.json")
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write temp file");
        path
    }

    pub fn write_mapping(&self, json: &str) -> PathBuf {
        self.write("mapping.json", json)
    }

    pub fn request(&self) -> MergeRequest {
        MergeRequest {
            mapping: self.mapping_path(),
            source_dir: self.source_dir(),
            target_dir: self.target_dir(),
            output_dir: self.output_dir(),
            output_encoding: None,
        }
    }
}

fn copy_dir(from: &Path, to: &Path) {
    for entry in fs::read_dir(from).expect("read fixture dir") {
        let entry = entry.expect("fixture entry");
        fs::copy(entry.path(), to.join(entry.file_name())).expect("copy fixture");
    }
}

/// Reads a written table into its headers and rows keyed by column name. Empty
/// fields come back as `None`.
pub fn read_table(path: &Path) -> (Vec<String>, Vec<HashMap<String, Option<String>>>) {
    let mut reader = csv::Reader::from_path(path).expect("open output table");
    let headers = reader
        .headers()
        .expect("headers")
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let rows = reader
        .records()
        .map(|record| {
            let record = record.expect("record");
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(|v| (!v.is_empty()).then(|| v.to_string())))
                .collect()
        })
        .collect();
    (headers, rows)
}

/// Finds the row whose `column` equals `value`.
pub fn row_where<'a>(
    rows: &'a [HashMap<String, Option<String>>],
    column: &str,
    value: &str,
) -> &'a HashMap<String, Option<String>> {
    rows.iter()
        .find(|row| row.get(column).and_then(|v| v.as_deref()) == Some(value))
        .unwrap_or_else(|| panic!("no row with {column} = {value}"))
}

pub fn cell<'a>(row: &'a HashMap<String, Option<String>>, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|v| v.as_deref())
}
