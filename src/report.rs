//! Merge report: `MERGE_DOCUMENTATION.md` for people and `merge_report.json` for tools.

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Local;
use itertools::Itertools;
use log::info;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    audit::CompletenessAudit,
    loader::{LoadEntry, LoadStatus, Side},
    mapping::MappingSpecification,
    merge::{AppendSummary, ExtrasSummary, MergeRun, PlanSummary, TableOrigin},
    writer::Skipped,
};

pub const DOCUMENTATION_FILE: &str = "MERGE_DOCUMENTATION.md";
pub const JSON_REPORT_FILE: &str = "merge_report.json";

const LISTED_COLUMNS: usize = 8;

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    source_dataset: &'a str,
    target_dataset: &'a str,
    mapping_version: Option<&'a str>,
    elapsed_ms: u128,
    statistics: Statistics,
    loaded: &'a [LoadEntry],
    tables: Vec<JsonTable<'a>>,
    skipped: &'a [Skipped],
    plans: &'a [PlanSummary],
    appends: &'a [AppendSummary],
    extras: &'a [ExtrasSummary],
    transform_failures: Vec<TransformFailure<'a>>,
    audit: &'a CompletenessAudit,
}

#[derive(Debug, Serialize)]
struct Statistics {
    total_mappings: usize,
    output_tables: usize,
    total_records: usize,
}

#[derive(Debug, Serialize)]
struct JsonTable<'a> {
    name: &'a str,
    origin: TableOrigin,
    records: usize,
    columns: &'a [String],
    file: Option<String>,
    sha256: Option<String>,
}

#[derive(Debug, Serialize)]
struct TransformFailure<'a> {
    mapping: &'a str,
    applied: usize,
    failures: usize,
}

/// Writes both report files and returns their paths.
pub fn write_report(dir: &Path, spec: &MappingSpecification, run: &MergeRun) -> Result<Vec<PathBuf>> {
    let generated_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let doc_path = dir.join(DOCUMENTATION_FILE);
    fs::write(&doc_path, render_documentation(spec, run, &generated_at))
        .with_context(|| format!("Writing {doc_path:?}"))?;

    let json_path = dir.join(JSON_REPORT_FILE);
    let report = build_json_report(spec, run, generated_at)?;
    let json = serde_json::to_string_pretty(&report).context("Serializing merge report")?;
    fs::write(&json_path, json).with_context(|| format!("Writing {json_path:?}"))?;

    info!("✓ Documentation generated: {doc_path:?}");
    Ok(vec![doc_path, json_path])
}

fn statistics(spec: &MappingSpecification, run: &MergeRun) -> Statistics {
    Statistics {
        total_mappings: spec.mappings.len(),
        output_tables: run.tables.len(),
        total_records: run.tables.iter().map(|t| t.frame.len()).sum(),
    }
}

pub fn render_documentation(spec: &MappingSpecification, run: &MergeRun, generated_at: &str) -> String {
    let source = spec.source_name();
    let target = spec.target_name();
    let mut doc = String::new();

    let _ = writeln!(doc, "# Bank Data Merge Documentation\n");
    let _ = writeln!(doc, "**Generated:** {generated_at}\n");
    let _ = writeln!(doc, "## Overview\n");
    let _ = writeln!(
        doc,
        "This dataset represents the merged banking data from {source} and {target} systems.\n"
    );
    let _ = writeln!(doc, "## Source Datasets\n");
    let _ = writeln!(doc, "- **{source}**: source side ({} table(s) loaded)", loaded_count(run, true));
    let _ = writeln!(doc, "- **{target}**: target side ({} table(s) loaded)\n", loaded_count(run, false));

    let _ = writeln!(doc, "## Merge Strategy\n");
    for plan in &run.plans {
        let _ = writeln!(
            doc,
            "- **{}**: {} ← {} ({:?}, {} matched pair(s), {} mapping(s) applied)",
            plan.output_table,
            plan.right_table,
            plan.left_table,
            plan.mode,
            plan.matched_pairs,
            plan.mappings_applied.len()
        );
    }
    for append in &run.appends {
        let _ = writeln!(
            doc,
            "- **{}**: {} target row(s) + {} row(s) appended from {}",
            append.output_table,
            append.target_rows,
            append.appended_rows,
            append.sources.join(", ")
        );
    }
    for extras in &run.extras {
        let _ = writeln!(
            doc,
            "- **{}**: {} preserved column(s) from {} as {:?}, linked by `{}`",
            extras.output_table,
            extras.columns.len(),
            extras.source_table,
            extras.placement,
            extras.link_key
        );
    }

    let _ = writeln!(doc, "\n### Applied Transformations:\n");
    match &spec.applied_transformations {
        Some(transformations) if !transformations.is_empty() => {
            for t in transformations {
                let _ = writeln!(doc, "- **{}.{}**: {}", t.table, t.column, t.description);
            }
        }
        _ => {
            let _ = writeln!(doc, "- Transformations applied according to mapping specifications");
        }
    }

    let _ = writeln!(doc, "\n## Output Tables\n");
    for table in run.tables.iter() {
        let columns = table.frame.columns();
        let _ = writeln!(doc, "### {}", table.name);
        let _ = writeln!(doc, "- **Records**: {}", table.frame.len());
        let _ = writeln!(doc, "- **Columns**: {}", columns.len());
        if !columns.is_empty() {
            let more = if columns.len() > LISTED_COLUMNS { "..." } else { "" };
            let _ = writeln!(
                doc,
                "- **Column names**: {}{more}",
                columns.iter().take(LISTED_COLUMNS).join(", ")
            );
        }
        let _ = writeln!(doc);
    }
    for skipped in &run.written.skipped {
        let _ = writeln!(doc, "- {} not written: {}", skipped.table, skipped.reason);
    }

    let _ = writeln!(doc, "\n## Data Quality Notes\n");
    let failing = run
        .transform_stats
        .iter()
        .filter(|(_, stats)| stats.failures > 0)
        .collect_vec();
    if failing.is_empty() {
        let _ = writeln!(doc, "- Every transformed value was converted successfully");
    }
    for (id, stats) in failing {
        let _ = writeln!(
            doc,
            "- Mapping `{id}`: {} of {} value(s) kept unchanged",
            stats.failures, stats.applied
        );
    }
    if run.audit.is_complete() {
        let _ = writeln!(
            doc,
            "- All {} referenced source column(s) are represented in the output",
            run.audit.coverage.len()
        );
    } else {
        for label in run.audit.unplaced_labels() {
            let _ = writeln!(doc, "- **Unplaced**: `{label}` is not represented in any output table");
        }
    }

    let stats = statistics(spec, run);
    let _ = writeln!(doc, "\n## Mapping Statistics\n");
    let _ = writeln!(doc, "- **Total Mappings**: {}", stats.total_mappings);
    let _ = writeln!(doc, "- **Output Tables**: {}", stats.output_tables);
    let _ = writeln!(doc, "- **Total Records**: {}", stats.total_records);
    doc
}

fn loaded_count(run: &MergeRun, source: bool) -> usize {
    run.load
        .entries
        .iter()
        .filter(|e| (e.side == Side::Source) == source)
        .filter(|e| matches!(e.status, LoadStatus::Loaded { .. }))
        .count()
}

fn build_json_report<'a>(
    spec: &'a MappingSpecification,
    run: &'a MergeRun,
    generated_at: String,
) -> Result<JsonReport<'a>> {
    let tables = run
        .tables
        .iter()
        .map(|table| {
            let written = run.written.path_for(&table.name);
            let sha256 = written.map(file_sha256).transpose()?;
            Ok(JsonTable {
                name: &table.name,
                origin: table.origin,
                records: table.frame.len(),
                columns: table.frame.columns(),
                file: written.map(|p| p.display().to_string()),
                sha256,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(JsonReport {
        generated_at,
        source_dataset: spec.source_name(),
        target_dataset: spec.target_name(),
        mapping_version: spec.version.as_deref(),
        elapsed_ms: run.elapsed.as_millis(),
        statistics: statistics(spec, run),
        loaded: &run.load.entries,
        tables,
        skipped: &run.written.skipped,
        plans: &run.plans,
        appends: &run.appends,
        extras: &run.extras,
        transform_failures: run
            .transform_stats
            .iter()
            .filter(|(_, stats)| stats.failures > 0)
            .map(|(id, stats)| TransformFailure {
                mapping: id,
                applied: stats.applied,
                failures: stats.failures,
            })
            .collect(),
        audit: &run.audit,
    })
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Hashing {path:?}"))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Value, frame::Frame};

    #[test]
    fn documentation_lists_tables_and_statistics() {
        let spec = MappingSpecification::from_json_str(
            r#"{"source_dataset": {"name": "Alpha"}, "target_dataset": {"name": "Beta"},
                "applied_transformations": [{"table": "Customer", "column": "phone", "description": "E.164"}]}"#,
        )
        .unwrap();
        let mut run = MergeRun::default();
        let columns = (0..10).map(|i| format!("c{i}")).collect::<Vec<_>>();
        run.tables.insert(
            "Customer",
            Frame::from_rows(columns, vec![vec![Some(Value::from("x"))]]),
            TableOrigin::Plan,
        );
        let doc = render_documentation(&spec, &run, "2024-01-01 00:00:00");
        assert!(doc.contains("merged banking data from Alpha and Beta"));
        assert!(doc.contains("- **Customer.phone**: E.164"));
        assert!(doc.contains("c0, c1, c2, c3, c4, c5, c6, c7..."));
        assert!(doc.contains("- **Total Records**: 1"));
    }

    #[test]
    fn sha256_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
