pub mod append;
pub mod audit;
pub mod cli;
pub mod data;
pub mod defaults;
pub mod error;
pub mod extras;
pub mod frame;
pub mod interpret;
pub mod io_utils;
pub mod join;
pub mod loader;
pub mod mapping;
pub mod merge;
pub mod report;
pub mod table;
pub mod transform;
pub mod writer;

use std::{env, sync::OnceLock, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info, warn};

use crate::cli::{Cli, Commands};
use crate::mapping::{FieldMapping, MappingSpecification};

pub use error::{MergeError, MergeResult};
pub use merge::{MergeOutcome, MergeRequest, run_merge, run_merge_with_timeout, spawn_merge};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("bank_merge", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Merge(args) => handle_merge(&args),
        Commands::Plans(args) => handle_plans(&args),
        Commands::Mappings(args) => handle_mappings(&args),
    }
}

fn handle_merge(args: &cli::MergeArgs) -> Result<()> {
    let request = MergeRequest {
        mapping: args.mapping.clone(),
        source_dir: args.source_dir.clone(),
        target_dir: args.target_dir.clone(),
        output_dir: args.output_dir.clone(),
        output_encoding: args.output_encoding.clone(),
    };
    info!(
        "Merging with {:?}: source {:?}, target {:?} -> {:?}",
        request.mapping, request.source_dir, request.target_dir, request.output_dir
    );
    let outcome = match args.timeout_secs {
        Some(secs) => run_merge_with_timeout(request, Duration::from_secs(secs)),
        None => run_merge(&request),
    }?;
    if let Some(reason) = &outcome.report_error {
        warn!("Merged tables were written but the report failed: {reason}");
    }
    for path in &outcome.produced_files {
        println!("{}", path.display());
    }
    Ok(())
}

fn load_spec(path: &std::path::Path) -> Result<MappingSpecification> {
    MappingSpecification::load(path).with_context(|| format!("Loading mapping specification {path:?}"))
}

fn handle_plans(args: &cli::PlansArgs) -> Result<()> {
    let spec = load_spec(&args.mapping)?;
    let declared = spec.output_plans.is_some();
    let rows = spec
        .output_plans()
        .iter()
        .map(|plan| {
            vec![
                plan.output_table.clone(),
                plan.join.kind.label().to_string(),
                format!("{} [{}]", plan.join.left.table, plan.join.left.on.join(", ")),
                format!("{} [{}]", plan.join.right.table, plan.join.right.on.join(", ")),
                match &plan.dedupe.tie_breaker {
                    Some(column) => format!("{} by {column}", plan.dedupe.strategy.label()),
                    None => plan.dedupe.strategy.label().to_string(),
                },
                plan.use_mappings.len().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    info!(
        "{} output plan(s) ({})",
        rows.len(),
        if declared { "declared" } else { "built-in" }
    );
    table::print_table(
        &["output", "join", "left", "right", "dedupe", "mappings"],
        &rows,
    );

    let appends = spec
        .append_plans()
        .iter()
        .map(|plan| {
            vec![
                plan.output_table.clone(),
                plan.sources.join(" + "),
                plan.keys
                    .iter()
                    .map(|k| format!("{} <- {}", k.column, k.from))
                    .collect::<Vec<_>>()
                    .join(", "),
            ]
        })
        .collect::<Vec<_>>();
    if !appends.is_empty() {
        println!();
        table::print_table(&["append", "sources", "keys"], &appends);
    }
    Ok(())
}

fn handle_mappings(args: &cli::MappingsArgs) -> Result<()> {
    let spec = load_spec(&args.mapping)?;
    let mappings = match &args.table {
        Some(table) => spec.mappings_for_table(table),
        None => spec.mappings.iter().collect(),
    };
    let rows = mappings.iter().map(|m| mapping_row(m)).collect::<Vec<_>>();
    info!("{} mapping(s)", rows.len());
    table::print_table(
        &["id", "source", "target", "transform", "confidence", "extras"],
        &rows,
    );
    Ok(())
}

fn mapping_row(mapping: &FieldMapping) -> Vec<String> {
    vec![
        mapping.id.clone(),
        format!("{}.{}", mapping.source.table, mapping.source.column),
        format!("{}.{}", mapping.target.table, mapping.target.column),
        mapping.transform.label(),
        mapping
            .confidence
            .map(|c| format!("{c:.2}"))
            .unwrap_or_default(),
        mapping
            .extra_field_handling
            .as_ref()
            .map(|h| format!("{} -> {} via {}", h.method.label(), h.target_table, h.link_key))
            .unwrap_or_default(),
    ]
}
