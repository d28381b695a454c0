//! Normalized and transaction tables: several same-shape source tables are stacked,
//! projected through the mappings of the output table, given deterministic keys and
//! appended below whatever rows the target side already holds.

use log::{debug, info};

use crate::{
    data::Value,
    frame::Frame,
    interpret::{self, Projection, ProjectionTarget},
    loader::{Side, TableCache},
    mapping::{AppendPlan, DerivedKey, FieldMapping},
    transform::custom::namespaced_id,
};

#[derive(Debug)]
pub struct AppendOutcome {
    pub frame: Frame,
    pub target_rows: usize,
    pub appended_rows: usize,
    pub sources: Vec<String>,
    pub projection: Projection,
}

/// Stacks the plan's present source tables. `None` when none of them was loaded.
pub fn stack_sources(cache: &TableCache, plan: &AppendPlan) -> Option<(Frame, Vec<String>)> {
    let mut used = Vec::new();
    let mut stacked: Option<Frame> = None;
    for name in &plan.sources {
        let Some(frame) = cache.get(Side::Source, name) else {
            debug!("{}: source table '{name}' not loaded", plan.output_table);
            continue;
        };
        used.push(name.clone());
        stacked = Some(match stacked {
            Some(acc) => acc.append(frame),
            None => frame.clone(),
        });
    }
    stacked.map(|frame| (frame, used))
}

pub fn run(
    plan: &AppendPlan,
    cache: &TableCache,
    mappings: &[&FieldMapping],
    primary_key: &str,
) -> Option<AppendOutcome> {
    let (stacked, sources) = stack_sources(cache, plan)?;
    let mut projection = interpret::project(
        &stacked,
        mappings,
        ProjectionTarget {
            output_table: &plan.output_table,
            primary_key,
        },
    );
    for key in &plan.keys {
        if let Some(values) = derived_key(&stacked, key) {
            projection.frame.set_column(&key.column, values);
        }
    }

    let target = cache.frame_or_empty(Side::Target, &plan.output_table);
    let frame = if target.width() > 0 {
        target.append(&projection.frame)
    } else {
        projection.frame.clone()
    };
    info!(
        "✓ {} assembled from {:?}: {} target row(s) + {} appended",
        plan.output_table,
        sources,
        target.len(),
        projection.frame.len()
    );
    Some(AppendOutcome {
        target_rows: target.len(),
        appended_rows: projection.frame.len(),
        frame,
        sources,
        projection,
    })
}

fn derived_key(source: &Frame, key: &DerivedKey) -> Option<Vec<Option<Value>>> {
    let Some(values) = source.column_values(&key.from) else {
        debug!("Derived key '{}': column '{}' not present", key.column, key.from);
        return None;
    };
    Some(
        values
            .iter()
            .map(|cell| {
                cell.as_ref().map(|value| {
                    Value::String(namespaced_id(key.namespace.as_deref(), &value.as_display()))
                })
            })
            .collect(),
    )
}
