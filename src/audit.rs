//! Completeness audit: locates every mapped source column in the output tables.
//!
//! A column referenced by a mapping must end up as a mapped target column, an
//! extension column or an extras-table column. Columns found nowhere (a mapping no plan
//! consumed, or a target column dropped when a table was narrowed to its schema) are
//! reported as unplaced.

use std::collections::BTreeSet;

use log::{info, warn};
use serde::Serialize;

use crate::{
    extras::Placement,
    loader::{Side, TableCache},
    mapping::{FieldMapping, MappingSpecification},
    merge::MergedTables,
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnLocation {
    Mapped { table: String, column: String },
    Extension { table: String, column: String },
    Extras { table: String, column: String },
}

impl ColumnLocation {
    pub fn table(&self) -> &str {
        match self {
            ColumnLocation::Mapped { table, .. }
            | ColumnLocation::Extension { table, .. }
            | ColumnLocation::Extras { table, .. } => table,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            ColumnLocation::Mapped { column, .. }
            | ColumnLocation::Extension { column, .. }
            | ColumnLocation::Extras { column, .. } => column,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ColumnLocation::Mapped { .. } => "mapped",
            ColumnLocation::Extension { .. } => "extension",
            ColumnLocation::Extras { .. } => "extras",
        }
    }
}

/// Where the values read by one mapping were written.
#[derive(Debug, Clone)]
pub struct Landing {
    pub mapping_id: String,
    pub source_table: String,
    pub source_column: String,
    pub location: ColumnLocation,
}

impl Landing {
    pub fn mapped(mapping: &FieldMapping, output_table: &str) -> Self {
        Landing {
            mapping_id: mapping.id.clone(),
            source_table: mapping.source.table.clone(),
            source_column: mapping.source.column.clone(),
            location: ColumnLocation::Mapped {
                table: output_table.to_string(),
                column: mapping.target.column.clone(),
            },
        }
    }

    pub fn routed(mapping: &FieldMapping, placement: Placement, table: &str, column: &str) -> Self {
        let (table, column) = (table.to_string(), column.to_string());
        Landing {
            mapping_id: mapping.id.clone(),
            source_table: mapping.source.table.clone(),
            source_column: mapping.source.column.clone(),
            location: match placement {
                Placement::Extension => ColumnLocation::Extension { table, column },
                Placement::SideTable => ColumnLocation::Extras { table, column },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnCoverage {
    pub source_table: String,
    pub source_column: String,
    pub locations: Vec<ColumnLocation>,
}

impl ColumnCoverage {
    pub fn label(&self) -> String {
        format!("{}.{}", self.source_table, self.source_column)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompletenessAudit {
    pub coverage: Vec<ColumnCoverage>,
}

impl CompletenessAudit {
    pub fn unplaced(&self) -> impl Iterator<Item = &ColumnCoverage> {
        self.coverage.iter().filter(|c| c.locations.is_empty())
    }

    pub fn unplaced_labels(&self) -> Vec<String> {
        self.unplaced().map(ColumnCoverage::label).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.unplaced().next().is_none()
    }
}

pub fn audit(
    spec: &MappingSpecification,
    cache: &TableCache,
    landings: &[Landing],
    tables: &MergedTables,
) -> CompletenessAudit {
    let referenced: BTreeSet<(&str, &str)> = spec
        .mappings
        .iter()
        .filter(|m| {
            cache
                .get(Side::Source, &m.source.table)
                .is_some_and(|frame| frame.has_column(&m.source.column))
        })
        .map(|m| (m.source.table.as_str(), m.source.column.as_str()))
        .collect();

    let coverage = referenced
        .into_iter()
        .map(|(table, column)| {
            let locations = landings
                .iter()
                .filter(|l| l.source_table == table && l.source_column == column)
                .map(|l| &l.location)
                .filter(|location| {
                    tables
                        .get(location.table())
                        .is_some_and(|frame| frame.has_column(location.column()))
                })
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            ColumnCoverage {
                source_table: table.to_string(),
                source_column: column.to_string(),
                locations,
            }
        })
        .collect::<Vec<_>>();

    let result = CompletenessAudit { coverage };
    for column in result.unplaced() {
        warn!("Column {} is not represented in any output table", column.label());
    }
    info!(
        "Completeness audit: {} referenced column(s), {} unplaced",
        result.coverage.len(),
        result.unplaced().count()
    );
    result
}
