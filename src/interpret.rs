//! Mapping interpreter: projects a source table into target-shaped columns.
//!
//! Only mapped columns appear in the projection. Mappings whose source column is not
//! in the table are skipped silently, since one specification is shared by several
//! file variants. Stray mappings are left to the extras router. When two mappings
//! fill the same target column the first one wins; the later source column is left
//! unapplied so the audit reports it.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::{
    data::{Cell, Value},
    defaults::NATURAL_KEYS,
    frame::Frame,
    mapping::FieldMapping,
    transform::{TransformStats, custom::namespaced_id},
};

/// Where the projection is headed; used to derive synthetic primary keys.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionTarget<'a> {
    pub output_table: &'a str,
    pub primary_key: &'a str,
}

#[derive(Debug, Default)]
pub struct Projection {
    pub frame: Frame,
    /// Ids of the mappings that produced a column, in application order.
    pub applied: Vec<String>,
    pub stats: BTreeMap<String, TransformStats>,
}

pub fn project(source: &Frame, mappings: &[&FieldMapping], target: ProjectionTarget<'_>) -> Projection {
    let mut projection = Projection::default();
    for mapping in mappings.iter().filter(|m| !m.is_stray()) {
        let Some(values) = source.column_values(&mapping.source.column) else {
            debug!(
                "Mapping '{}': column '{}' not present; skipped",
                mapping.id, mapping.source.column
            );
            continue;
        };
        if projection.frame.has_column(&mapping.target.column) {
            warn!(
                "Mapping '{}': {}.{} is already filled by an earlier mapping; '{}' not applied",
                mapping.id, target.output_table, mapping.target.column, mapping.source.column
            );
            continue;
        }
        let stats = projection.stats.entry(mapping.id.clone()).or_default();
        let mut column = values
            .iter()
            .map(|cell| mapping.transform.apply_tracked(cell, stats))
            .collect::<Vec<_>>();

        if mapping.target.column == target.primary_key && mapping.transform.is_identifier_generation() {
            if let Some(keys) = synthetic_keys(source, target.output_table) {
                column = keys;
            }
        }
        projection.frame.set_column(&mapping.target.column, column);
        projection.applied.push(mapping.id.clone());
    }
    projection
}

/// Derives primary keys from the first natural key column present in `source`,
/// salting account-style keys with the output table name.
pub fn synthetic_keys(source: &Frame, output_table: &str) -> Option<Vec<Cell>> {
    let (column, salted) = NATURAL_KEYS
        .iter()
        .find(|(column, _)| source.has_column(column))?;
    let namespace = salted.then(|| output_table.to_lowercase());
    let values = source.column_values(column)?;
    Some(
        values
            .iter()
            .map(|cell| {
                cell.as_ref().map(|value| {
                    Value::String(namespaced_id(namespace.as_deref(), &value.as_display()))
                })
            })
            .collect(),
    )
}
