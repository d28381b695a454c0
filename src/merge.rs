//! The merge pipeline: load → plans → append plans → extras → audit → write → report.
//!
//! Every stage receives the read-only table cache plus the arena of output tables
//! built so far and hands back new tables; nothing is shared between plans except the
//! cache.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::mpsc::{self, RecvTimeoutError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Result;
use encoding_rs::UTF_8;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::{
    append,
    audit::{self, CompletenessAudit, Landing},
    error::{MergeError, MergeResult},
    extras::{self, Placement},
    frame::Frame,
    interpret::{self, ProjectionTarget},
    io_utils,
    join::{self, JoinMode},
    loader::{self, LoadReport, Side, TableCache},
    mapping::MappingSpecification,
    report,
    transform::TransformStats,
    writer::{self, WriteReport},
};

#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub mapping: PathBuf,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub output_dir: PathBuf,
    /// `encoding_rs` label for the written tables; UTF-8 when absent.
    pub output_encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableOrigin {
    Plan,
    Append,
    Extras,
}

#[derive(Debug, Clone)]
pub struct MergedTable {
    pub name: String,
    pub frame: Frame,
    pub origin: TableOrigin,
}

/// Output tables in creation order, unique by name.
#[derive(Debug, Default)]
pub struct MergedTables {
    tables: Vec<MergedTable>,
}

impl MergedTables {
    /// Adds `name`, or replaces the frame of an existing table of that name while
    /// keeping its position and origin.
    pub fn insert(&mut self, name: &str, frame: Frame, origin: TableOrigin) {
        match self.tables.iter_mut().find(|t| t.name == name) {
            Some(existing) => existing.frame = frame,
            None => self.tables.push(MergedTable {
                name: name.to_string(),
                frame,
                origin,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Frame> {
        self.tables.iter().find(|t| t.name == name).map(|t| &t.frame)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergedTable> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// What one output plan did, for the report.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub output_table: String,
    pub left_table: String,
    pub right_table: String,
    pub left_rows: usize,
    pub right_rows: usize,
    pub mode: JoinMode,
    pub matched_pairs: usize,
    pub collapsed_rows: usize,
    pub mappings_applied: Vec<String>,
    pub dropped_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppendSummary {
    pub output_table: String,
    pub sources: Vec<String>,
    pub target_rows: usize,
    pub appended_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtrasSummary {
    pub output_table: String,
    pub placement: Placement,
    pub source_table: String,
    pub link_key: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub origin: TableOrigin,
    pub rows: usize,
    pub columns: usize,
    pub file: Option<PathBuf>,
}

/// Everything the report generator needs, gathered while the pipeline runs.
#[derive(Debug, Default)]
pub struct MergeRun {
    pub load: LoadReport,
    pub tables: MergedTables,
    pub plans: Vec<PlanSummary>,
    pub appends: Vec<AppendSummary>,
    pub extras: Vec<ExtrasSummary>,
    pub landings: Vec<Landing>,
    pub transform_stats: BTreeMap<String, TransformStats>,
    pub audit: CompletenessAudit,
    pub written: WriteReport,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub output_dir: PathBuf,
    /// Table files followed by the report files.
    pub produced_files: Vec<PathBuf>,
    pub tables: Vec<TableSummary>,
    pub unplaced_columns: Vec<String>,
    /// Set when the report could not be written; the merge itself still succeeded.
    pub report_error: Option<String>,
}

/// Runs the whole merge synchronously.
pub fn run_merge(request: &MergeRequest) -> MergeResult<MergeOutcome> {
    let spec = MappingSpecification::load(&request.mapping)?;
    fs::create_dir_all(&request.output_dir).map_err(|source| MergeError::OutputDir {
        path: request.output_dir.clone(),
        source,
    })?;
    execute(&spec, request).map_err(|err| {
        error!("Merge failed: {err:#}");
        MergeError::from(err)
    })
}

/// Runs the merge on a worker thread so the caller's thread stays free.
pub fn spawn_merge(request: MergeRequest) -> JoinHandle<MergeResult<MergeOutcome>> {
    thread::spawn(move || run_merge(&request))
}

/// Runs the merge off-thread and waits at most `timeout` for it. A timed-out worker is
/// left to finish in the background; whatever it already wrote stays on disk.
pub fn run_merge_with_timeout(request: MergeRequest, timeout: Duration) -> MergeResult<MergeOutcome> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let _ = sender.send(run_merge(&request));
    });
    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!("Merge did not finish within {timeout:?}");
            Err(MergeError::TimedOut(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(MergeError::Worker),
    }
}

fn execute(spec: &MappingSpecification, request: &MergeRequest) -> Result<MergeOutcome> {
    let started = Instant::now();
    let output_encoding = io_utils::resolve_encoding(request.output_encoding.as_deref())?;
    info!(
        "Merging {} into {} ({} mapping(s))",
        spec.source_name(),
        spec.target_name(),
        spec.mappings.len()
    );

    let mut cache = TableCache::default();
    let mut run = MergeRun::default();
    loader::load_side(
        &mut cache,
        &mut run.load,
        Side::Source,
        &request.source_dir,
        &spec.source_files(),
        UTF_8,
    );
    loader::load_side(
        &mut cache,
        &mut run.load,
        Side::Target,
        &request.target_dir,
        &spec.target_files(),
        UTF_8,
    );
    info!("Loaded {} table(s)", cache.len());

    run_output_plans(spec, &cache, &mut run);
    run_append_plans(spec, &cache, &mut run);
    route_extras(spec, &cache, &mut run);

    run.audit = audit::audit(spec, &cache, &run.landings, &run.tables);
    run.written = writer::write_tables(&run.tables, &request.output_dir, output_encoding);
    run.elapsed = started.elapsed();

    let mut produced_files = run.written.paths();
    let report_error = match report::write_report(&request.output_dir, spec, &run) {
        Ok(paths) => {
            produced_files.extend(paths);
            None
        }
        Err(err) => {
            warn!("Merge report could not be written: {err:#}");
            Some(format!("{err:#}"))
        }
    };

    let tables = run
        .tables
        .iter()
        .map(|table| TableSummary {
            name: table.name.clone(),
            origin: table.origin,
            rows: table.frame.len(),
            columns: table.frame.width(),
            file: run.written.path_for(&table.name).map(Path::to_path_buf),
        })
        .collect();
    info!(
        "Merge completed in {:.2?}: {} table(s), {} file(s) in {:?}",
        run.elapsed,
        run.tables.len(),
        produced_files.len(),
        request.output_dir
    );
    Ok(MergeOutcome {
        output_dir: request.output_dir.clone(),
        produced_files,
        tables,
        unplaced_columns: run.audit.unplaced_labels(),
        report_error,
    })
}

fn run_output_plans(spec: &MappingSpecification, cache: &TableCache, run: &mut MergeRun) {
    let primary_key = spec.primary_key();
    for plan in spec.output_plans() {
        let mappings = spec.mappings_by_ids(&plan.use_mappings);
        let left = cache.frame_or_empty(Side::Source, &plan.join.left.table);
        let right = cache.frame_or_empty(Side::Target, &plan.join.right.table);
        debug!(
            "{}: {} mapping(s), left '{}' ({} rows), right '{}' ({} rows)",
            plan.output_table,
            mappings.len(),
            plan.join.left.table,
            left.len(),
            plan.join.right.table,
            right.len()
        );
        let projection = interpret::project(
            left,
            &mappings,
            ProjectionTarget {
                output_table: &plan.output_table,
                primary_key,
            },
        );
        for (id, stats) in &projection.stats {
            run.transform_stats.entry(id.clone()).or_default().absorb(stats);
        }
        let applied = projection.applied.clone();
        let outcome = join::merge_plan(projection.frame, right, &plan, &mappings);

        for id in &applied {
            if let Some(mapping) = spec.mapping(id) {
                run.landings.push(Landing::mapped(mapping, &plan.output_table));
            }
        }
        run.plans.push(PlanSummary {
            output_table: plan.output_table.clone(),
            left_table: plan.join.left.table.clone(),
            right_table: plan.join.right.table.clone(),
            left_rows: left.len(),
            right_rows: right.len(),
            mode: outcome.mode,
            matched_pairs: outcome.matched_pairs,
            collapsed_rows: outcome.collapsed_rows,
            mappings_applied: applied,
            dropped_columns: outcome.dropped_columns,
        });
        run.tables
            .insert(&plan.output_table, outcome.frame, TableOrigin::Plan);
    }
}

fn run_append_plans(spec: &MappingSpecification, cache: &TableCache, run: &mut MergeRun) {
    let primary_key = spec.primary_key();
    for plan in spec.append_plans() {
        if run.tables.contains(&plan.output_table) {
            debug!("{}: produced by an output plan; append skipped", plan.output_table);
            continue;
        }
        let mappings = spec
            .mappings_for_table(&plan.output_table)
            .into_iter()
            .filter(|m| !m.is_stray())
            .collect::<Vec<_>>();
        if mappings.is_empty() {
            debug!("{}: no mapping targets this table; append skipped", plan.output_table);
            continue;
        }
        let Some(outcome) = append::run(&plan, cache, &mappings, primary_key) else {
            debug!("{}: none of {:?} loaded", plan.output_table, plan.sources);
            continue;
        };
        for (id, stats) in &outcome.projection.stats {
            run.transform_stats.entry(id.clone()).or_default().absorb(stats);
        }
        for id in &outcome.projection.applied {
            if let Some(mapping) = spec.mapping(id) {
                run.landings.push(Landing::mapped(mapping, &plan.output_table));
            }
        }
        run.appends.push(AppendSummary {
            output_table: plan.output_table.clone(),
            sources: outcome.sources,
            target_rows: outcome.target_rows,
            appended_rows: outcome.appended_rows,
        });
        run.tables
            .insert(&plan.output_table, outcome.frame, TableOrigin::Append);
    }
}

fn route_extras(spec: &MappingSpecification, cache: &TableCache, run: &mut MergeRun) {
    let strays = spec.stray_mappings();
    if strays.is_empty() {
        return;
    }
    for routed in extras::route(&strays, cache, &run.tables) {
        for (id, stats) in &routed.stats {
            run.transform_stats.entry(id.clone()).or_default().absorb(stats);
        }
        for (id, column) in &routed.columns {
            if let Some(mapping) = spec.mapping(id) {
                run.landings.push(Landing::routed(
                    mapping,
                    routed.placement,
                    &routed.output_table,
                    column,
                ));
            }
        }
        run.extras.push(ExtrasSummary {
            output_table: routed.output_table.clone(),
            placement: routed.placement,
            source_table: routed.source_table.clone(),
            link_key: routed.link_key.clone(),
            columns: routed.columns.iter().map(|(_, c)| c.clone()).collect(),
        });
        run.tables
            .insert(&routed.output_table, routed.frame, TableOrigin::Extras);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut tables = MergedTables::default();
        tables.insert("A", Frame::default(), TableOrigin::Plan);
        tables.insert("B", Frame::default(), TableOrigin::Append);
        tables.insert("A", Frame::new(vec!["x".into()]), TableOrigin::Extras);
        let names = tables.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(tables.get("A").map(Frame::width), Some(1));
        assert_eq!(tables.iter().next().map(|t| t.origin), Some(TableOrigin::Plan));
    }

    #[test]
    fn missing_mapping_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let request = MergeRequest {
            mapping: dir.path().join("absent.json"),
            source_dir: dir.path().to_path_buf(),
            target_dir: dir.path().to_path_buf(),
            output_dir: dir.path().join("out"),
            output_encoding: None,
        };
        assert!(matches!(run_merge(&request), Err(MergeError::MappingRead { .. })));
    }

    #[test]
    fn unknown_output_encoding_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = dir.path().join("mapping.json");
        fs::write(&mapping, r#"{"mappings": []}"#).unwrap();
        let request = MergeRequest {
            mapping,
            source_dir: dir.path().to_path_buf(),
            target_dir: dir.path().to_path_buf(),
            output_dir: dir.path().join("out"),
            output_encoding: Some("klingon".into()),
        };
        assert!(matches!(run_merge(&request), Err(MergeError::Failed(_))));
    }
}
