//! Extras router: preserves fields that have no semantic counterpart in the target
//! schema.
//!
//! Stray mappings are grouped by their declared target table. Each group becomes
//! either extension columns on an existing output table (`extend_table`) or an
//! independently joinable side table (`extras_table`). A group is never dropped
//! unless it would carry nothing beyond its link key.

use std::collections::{BTreeMap, HashMap, HashSet};

use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    data::Cell,
    frame::Frame,
    loader::{Side, TableCache},
    mapping::{ExtrasMethod, FieldMapping},
    merge::MergedTables,
    transform::TransformStats,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Extension,
    SideTable,
}

/// One routed group, ready to be placed into the arena of output tables.
#[derive(Debug)]
pub struct RoutedExtras {
    pub output_table: String,
    pub placement: Placement,
    /// For extensions, the whole extended table; for side tables, the side table.
    pub frame: Frame,
    pub source_table: String,
    pub link_key: String,
    /// `(mapping id, column the values landed in)`. Empty for the overflow table of
    /// unmatched extension rows, whose columns are already accounted for.
    pub columns: Vec<(String, String)>,
    pub stats: BTreeMap<String, TransformStats>,
}

struct StrayFrame {
    frame: Frame,
    link_column: Option<usize>,
    columns: Vec<(String, String)>,
    stats: BTreeMap<String, TransformStats>,
}

pub fn route(strays: &[&FieldMapping], cache: &TableCache, tables: &MergedTables) -> Vec<RoutedExtras> {
    let mut groups: BTreeMap<&str, Vec<&FieldMapping>> = BTreeMap::new();
    for &mapping in strays {
        if let Some(handling) = &mapping.extra_field_handling {
            groups.entry(handling.target_table.as_str()).or_default().push(mapping);
        }
    }

    let mut taken: HashSet<String> = HashSet::new();
    let mut routed = Vec::new();
    for (target_table, group) in groups {
        let Some(handling) = group[0].extra_field_handling.as_ref() else {
            continue;
        };
        let source_table = group[0].source.table.as_str();
        let Some(source) = cache.get(Side::Source, source_table) else {
            debug!("Extras '{target_table}': source table '{source_table}' not loaded");
            continue;
        };
        let foreign = group
            .iter()
            .filter(|m| m.source.table != source_table)
            .map(|m| m.id.as_str())
            .collect::<Vec<_>>();
        if !foreign.is_empty() {
            warn!(
                "Extras '{target_table}': mappings {foreign:?} read from another table than '{source_table}' and cannot share its link key"
            );
        }

        let stray = build_stray_frame(source, &group, source_table, &handling.link_key);
        if stray.columns.is_empty() {
            debug!("Extras '{target_table}': nothing beyond the link key; skipped");
            continue;
        }
        if stray.link_column.is_none() {
            warn!(
                "Extras '{target_table}': link key '{}' missing from '{source_table}'; rows cannot be linked back",
                handling.link_key
            );
        }

        let existing = tables.get(target_table);
        let extendable = handling.method == ExtrasMethod::ExtendTable
            && stray.link_column.is_some()
            && existing.is_some_and(|frame| frame.has_column(&handling.link_key));
        if handling.method == ExtrasMethod::ExtendTable && !extendable {
            warn!(
                "Extras '{target_table}': cannot extend (table or link key '{}' missing); writing a side table instead",
                handling.link_key
            );
        }

        match existing {
            Some(frame) if extendable => {
                let (extended, columns, leftover) = extend(frame, &stray, &handling.link_key);
                info!(
                    "✓ Extended {target_table} with {} column(s) from {source_table}",
                    columns.len()
                );
                routed.push(RoutedExtras {
                    output_table: target_table.to_string(),
                    placement: Placement::Extension,
                    frame: extended,
                    source_table: source_table.to_string(),
                    link_key: handling.link_key.clone(),
                    columns,
                    stats: stray.stats.clone(),
                });
                if !leftover.is_empty() {
                    let name = unique_name(&format!("{target_table}_Extras"), tables, &mut taken);
                    warn!(
                        "Extras '{target_table}': {} row(s) matched no '{}' value; kept in {name}",
                        leftover.len(),
                        handling.link_key
                    );
                    routed.push(RoutedExtras {
                        output_table: name,
                        placement: Placement::SideTable,
                        frame: Frame::from_rows(stray.frame.columns().to_vec(), leftover),
                        source_table: source_table.to_string(),
                        link_key: handling.link_key.clone(),
                        columns: Vec::new(),
                        stats: BTreeMap::new(),
                    });
                }
            }
            _ => {
                let base = if existing.is_some() {
                    format!("{target_table}_Extras")
                } else {
                    target_table.to_string()
                };
                let name = unique_name(&base, tables, &mut taken);
                info!(
                    "✓ Created side table {name}: {} row(s), {} preserved column(s)",
                    stray.frame.len(),
                    stray.columns.len()
                );
                routed.push(RoutedExtras {
                    output_table: name,
                    placement: Placement::SideTable,
                    frame: stray.frame,
                    source_table: source_table.to_string(),
                    link_key: handling.link_key.clone(),
                    columns: stray.columns,
                    stats: stray.stats,
                });
            }
        }
    }
    routed
}

fn build_stray_frame(
    source: &Frame,
    group: &[&FieldMapping],
    source_table: &str,
    link_key: &str,
) -> StrayFrame {
    let mut frame = Frame::default();
    if let Some(values) = source.column_values(link_key) {
        frame.set_column(link_key, values);
    }
    let mut columns = Vec::new();
    let mut stats = BTreeMap::new();
    for mapping in group.iter().filter(|m| m.source.table == source_table) {
        let Some(values) = source.column_values(&mapping.source.column) else {
            continue;
        };
        if mapping.target.column == link_key {
            debug!("Extras mapping '{}' targets the link key itself; skipped", mapping.id);
            continue;
        }
        let entry: &mut TransformStats = stats.entry(mapping.id.clone()).or_default();
        let transformed = values
            .iter()
            .map(|cell| mapping.transform.apply_tracked(cell, entry))
            .collect::<Vec<_>>();
        frame.set_column(&mapping.target.column, transformed);
        columns.push((mapping.id.clone(), mapping.target.column.clone()));
    }
    StrayFrame {
        link_column: frame.column_index(link_key),
        frame,
        columns,
        stats,
    }
}

/// Attaches the stray columns to `table`, matching rows on `link_key`. Returns the
/// extended table, the columns as named in it, and the stray rows that found no
/// partner (including repeats of an already used key).
fn extend(
    table: &Frame,
    stray: &StrayFrame,
    link_key: &str,
) -> (Frame, Vec<(String, String)>, Vec<Vec<Cell>>) {
    let Some(link_idx) = stray.link_column else {
        return (table.clone(), Vec::new(), stray.frame.rows().to_vec());
    };
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for (idx, row) in stray.frame.rows().iter().enumerate() {
        if let Some(value) = &row[link_idx] {
            by_key.entry(value.as_display()).or_insert(idx);
        }
    }

    let mut extended = table.clone();
    let placed = stray
        .columns
        .iter()
        .map(|(id, column)| {
            let name = if extended.has_column(column) {
                format!("{column}_extra")
            } else {
                column.clone()
            };
            (id.clone(), column.clone(), name)
        })
        .collect_vec();

    let mut used = vec![false; stray.frame.len()];
    let partners = table
        .column_values(link_key)
        .unwrap_or_default()
        .into_iter()
        .map(|cell| {
            let idx = by_key.get(&cell?.as_display()).copied()?;
            used[idx] = true;
            Some(idx)
        })
        .collect_vec();

    for (_, column, name) in &placed {
        let Some(src_idx) = stray.frame.column_index(column) else {
            continue;
        };
        let values = partners
            .iter()
            .map(|partner| partner.and_then(|p| stray.frame.rows()[p][src_idx].clone()))
            .collect();
        extended.set_column(name, values);
    }

    let leftover = stray
        .frame
        .rows()
        .iter()
        .zip(used)
        .filter(|(_, used)| !used)
        .map(|(row, _)| row.clone())
        .collect();
    let columns = placed.into_iter().map(|(id, _, name)| (id, name)).collect();
    (extended, columns, leftover)
}

fn unique_name(base: &str, tables: &MergedTables, taken: &mut HashSet<String>) -> String {
    let mut name = base.to_string();
    let mut counter = 2;
    while tables.contains(&name) || taken.contains(&name) {
        name = format!("{base}_{counter}");
        counter += 1;
    }
    taken.insert(name.clone());
    name
}
