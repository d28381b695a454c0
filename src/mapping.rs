//! The mapping specification: an immutable recipe describing how source-bank columns
//! land in the target bank's tables.
//!
//! The document is produced upstream (schema inference plus a suggested mapping) and
//! arrives as JSON, or YAML when the file carries a `.yaml`/`.yml` extension. Keys use
//! the upstream snake_case spelling; camelCase aliases are accepted as well.
//! Anything the document leaves out (file names, output plans, append plans) falls
//! back to the built-in defaults in [`crate::defaults`].

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
};

use log::{debug, info, warn};
use serde::Deserialize;

use crate::{
    defaults,
    error::{MergeError, MergeResult},
    transform::Transform,
};

pub const DEFAULT_PRIMARY_KEY: &str = "encodedKey";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingSpecification {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, alias = "sourceDataset")]
    pub source_dataset: DatasetDescriptor,
    #[serde(default, alias = "targetDataset")]
    pub target_dataset: DatasetDescriptor,
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,
    #[serde(default, alias = "outputPlans")]
    pub output_plans: Option<Vec<OutputPlan>>,
    #[serde(default, alias = "appendPlans")]
    pub append_plans: Option<Vec<AppendPlan>>,
    #[serde(default, alias = "appliedTransformations")]
    pub applied_transformations: Option<Vec<AppliedTransformation>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub files: Option<BTreeMap<String, String>>,
    #[serde(default, alias = "primaryKey")]
    pub primary_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    pub id: String,
    #[serde(default)]
    pub domain: Option<String>,
    pub source: ColumnRef,
    pub target: ColumnRef,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "extraFieldHandling")]
    pub extra_field_handling: Option<ExtraFieldHandling>,
}

impl FieldMapping {
    /// Stray fields are owned by the extras router, never by a plan projection.
    pub fn is_stray(&self) -> bool {
        self.extra_field_handling.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtrasMethod {
    ExtendTable,
    #[serde(other)]
    ExtrasTable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtraFieldHandling {
    #[serde(default = "preserve_action")]
    pub action: String,
    #[serde(default = "extras_method")]
    pub method: ExtrasMethod,
    #[serde(alias = "targetTable")]
    pub target_table: String,
    #[serde(alias = "linkKey")]
    pub link_key: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ExtrasMethod {
    pub fn label(self) -> &'static str {
        match self {
            ExtrasMethod::ExtendTable => "extend_table",
            ExtrasMethod::ExtrasTable => "extras_table",
        }
    }
}

fn preserve_action() -> String {
    "preserve".to_string()
}

fn extras_method() -> ExtrasMethod {
    ExtrasMethod::ExtrasTable
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKind {
    FullOuter,
    Left,
    Right,
    Inner,
    Unsupported(String),
}

impl From<String> for JoinKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "full_outer" | "outer" | "full" => JoinKind::FullOuter,
            "left" | "left_outer" => JoinKind::Left,
            "right" | "right_outer" => JoinKind::Right,
            "inner" => JoinKind::Inner,
            _ => JoinKind::Unsupported(value),
        }
    }
}

impl JoinKind {
    pub fn label(&self) -> &str {
        match self {
            JoinKind::FullOuter => "full_outer",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Inner => "inner",
            JoinKind::Unsupported(kind) => kind,
        }
    }
}

impl<'de> Deserialize<'de> for JoinKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(JoinKind::from)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinSide {
    pub table: String,
    #[serde(default)]
    pub on: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinSpec {
    #[serde(rename = "type", alias = "kind")]
    pub kind: JoinKind,
    pub left: JoinSide,
    pub right: JoinSide,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DedupeStrategy {
    #[default]
    PreferNonNull,
    PreferRightNonNull,
    PreferLeftNonNull,
    PreferLatest,
    Unsupported(String),
}

impl From<String> for DedupeStrategy {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prefer_non_null" => DedupeStrategy::PreferNonNull,
            "prefer_right_non_null" => DedupeStrategy::PreferRightNonNull,
            "prefer_left_non_null" => DedupeStrategy::PreferLeftNonNull,
            "prefer_latest" | "latest" => DedupeStrategy::PreferLatest,
            _ => DedupeStrategy::Unsupported(value),
        }
    }
}

impl<'de> Deserialize<'de> for DedupeStrategy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(DedupeStrategy::from)
    }
}

impl DedupeStrategy {
    pub fn label(&self) -> &str {
        match self {
            DedupeStrategy::PreferNonNull => "prefer_non_null",
            DedupeStrategy::PreferRightNonNull => "prefer_right_non_null",
            DedupeStrategy::PreferLeftNonNull => "prefer_left_non_null",
            DedupeStrategy::PreferLatest => "prefer_latest",
            DedupeStrategy::Unsupported(name) => name,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DedupeSpec {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub strategy: DedupeStrategy,
    #[serde(default, alias = "tieBreaker")]
    pub tie_breaker: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputPlan {
    #[serde(alias = "outputTable")]
    pub output_table: String,
    pub join: JoinSpec,
    #[serde(default)]
    pub dedupe: DedupeSpec,
    #[serde(default, alias = "useMappings")]
    pub use_mappings: Vec<String>,
}

/// A deterministic key synthesized from a natural-key column of each appended row.
#[derive(Debug, Clone, Deserialize)]
pub struct DerivedKey {
    pub column: String,
    pub from: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Concatenates same-shape source tables, projects them through the mappings of
/// `output_table` and appends the result below the target rows.
#[derive(Debug, Clone, Deserialize)]
pub struct AppendPlan {
    #[serde(alias = "outputTable")]
    pub output_table: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub keys: Vec<DerivedKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppliedTransformation {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub description: String,
}

impl MappingSpecification {
    pub fn load(path: &Path) -> MergeResult<Self> {
        let contents = fs::read_to_string(path).map_err(|source| MergeError::MappingRead {
            path: path.to_path_buf(),
            source,
        })?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        let parsed = if is_yaml {
            serde_yaml::from_str::<MappingSpecification>(&contents).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<MappingSpecification>(&contents).map_err(|e| e.to_string())
        };
        let spec = parsed.map_err(|message| MergeError::MappingParse {
            path: path.to_path_buf(),
            message,
        })?;
        spec.validate().map_err(|message| MergeError::MappingParse {
            path: path.to_path_buf(),
            message,
        })?;
        info!(
            "Loaded mapping specification {:?}: {} mapping(s), {} declared output plan(s)",
            path,
            spec.mappings.len(),
            spec.output_plans.as_ref().map_or(0, Vec::len)
        );
        Ok(spec)
    }

    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let spec: MappingSpecification = serde_json::from_str(json).map_err(|e| e.to_string())?;
        spec.validate()?;
        Ok(spec)
    }

    /// Structural checks only: mapping ids are unique and every reference names both a
    /// table and a column.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for mapping in &self.mappings {
            if !seen.insert(mapping.id.as_str()) {
                return Err(format!("duplicate mapping id '{}'", mapping.id));
            }
            for (side, reference) in [("source", &mapping.source), ("target", &mapping.target)] {
                if reference.table.trim().is_empty() || reference.column.trim().is_empty() {
                    return Err(format!(
                        "mapping '{}' has an incomplete {side} reference",
                        mapping.id
                    ));
                }
            }
            if let Some(handling) = &mapping.extra_field_handling {
                if handling.action != "preserve" {
                    warn!(
                        "Mapping '{}' declares extra field action '{}'; treating it as 'preserve'",
                        mapping.id, handling.action
                    );
                }
            }
        }
        if let Some(plans) = &self.output_plans {
            for plan in plans {
                for id in &plan.use_mappings {
                    if !seen.contains(id.as_str()) {
                        debug!(
                            "Output plan '{}' references unknown mapping '{id}'",
                            plan.output_table
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub fn source_name(&self) -> &str {
        self.source_dataset.name.as_deref().unwrap_or("Bank1")
    }

    pub fn target_name(&self) -> &str {
        self.target_dataset.name.as_deref().unwrap_or("Bank2")
    }

    pub fn primary_key(&self) -> &str {
        self.target_dataset
            .primary_key
            .as_deref()
            .unwrap_or(DEFAULT_PRIMARY_KEY)
    }

    /// A declared file map replaces the built-in one; tables it leaves out are not loaded.
    pub fn source_files(&self) -> BTreeMap<String, String> {
        declared_or_default(defaults::SOURCE_FILES, self.source_dataset.files.as_ref())
    }

    pub fn target_files(&self) -> BTreeMap<String, String> {
        declared_or_default(defaults::TARGET_FILES, self.target_dataset.files.as_ref())
    }

    pub fn mapping(&self, id: &str) -> Option<&FieldMapping> {
        self.mappings.iter().find(|m| m.id == id)
    }

    /// Mappings whose target is `target_table`, in document order.
    pub fn mappings_for_table(&self, target_table: &str) -> Vec<&FieldMapping> {
        self.mappings
            .iter()
            .filter(|m| m.target.table == target_table)
            .collect()
    }

    /// Mappings named by `ids`, in document order regardless of the order of `ids`.
    pub fn mappings_by_ids(&self, ids: &[String]) -> Vec<&FieldMapping> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.mappings
            .iter()
            .filter(|m| wanted.contains(m.id.as_str()))
            .collect()
    }

    pub fn stray_mappings(&self) -> Vec<&FieldMapping> {
        self.mappings.iter().filter(|m| m.is_stray()).collect()
    }

    pub fn output_plans(&self) -> Vec<OutputPlan> {
        match &self.output_plans {
            Some(plans) => plans.clone(),
            None => defaults::output_plans(self),
        }
    }

    pub fn append_plans(&self) -> Vec<AppendPlan> {
        match &self.append_plans {
            Some(plans) => plans.clone(),
            None => defaults::append_plans(),
        }
    }
}

fn declared_or_default(
    defaults: &[(&str, &str)],
    declared: Option<&BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    match declared {
        Some(declared) => declared.clone(),
        None => defaults
            .iter()
            .map(|(table, file)| (table.to_string(), file.to_string()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::CustomRule;

    const SAMPLE: &str = r#"{
        "version": "mapping-2.0",
        "source_dataset": {"name": "Alpha", "files": {"Customer": "alpha_customers.csv"}},
        "target_dataset": {"name": "Beta"},
        "mappings": [
            {"id": "m2", "source": {"table": "Customer", "column": "givenName"},
             "target": {"table": "Customer", "column": "firstName"},
             "transform": {"type": "identity", "params": {}}, "confidence": 0.9},
            {"id": "m1", "source": {"table": "Customer", "column": "customerId"},
             "target": {"table": "Customer", "column": "encodedKey"},
             "transform": {"type": "custom", "params": {"rule": "Generate UUID"}}},
            {"id": "m3", "source": {"table": "Customer", "column": "nickname"},
             "target": {"table": "Customer_Extras", "column": "nickname"},
             "extra_field_handling": {"action": "preserve", "method": "extras_table",
                "target_table": "Customer_Extras", "link_key": "customerId"}}
        ],
        "output_plans": [
            {"output_table": "Customer",
             "join": {"type": "full_outer", "left": {"table": "Customer", "on": ["customerId"]},
                      "right": {"table": "Customer", "on": ["id"]}},
             "dedupe": {"keys": ["id"], "strategy": "prefer_non_null", "tie_breaker": "creationDate"},
             "use_mappings": ["m1", "m2"]}
        ]
    }"#;

    #[test]
    fn parses_upstream_document() {
        let spec = MappingSpecification::from_json_str(SAMPLE).unwrap();
        assert_eq!(spec.source_name(), "Alpha");
        assert_eq!(spec.primary_key(), "encodedKey");
        assert_eq!(
            spec.mapping("m1").unwrap().transform,
            Transform::Custom(CustomRule::DeterministicId)
        );
        let plan = &spec.output_plans()[0];
        assert_eq!(plan.join.kind, JoinKind::FullOuter);
        assert_eq!(plan.dedupe.tie_breaker.as_deref(), Some("creationDate"));
        assert_eq!(spec.stray_mappings().len(), 1);
    }

    #[test]
    fn lookups_follow_document_order() {
        let spec = MappingSpecification::from_json_str(SAMPLE).unwrap();
        let ids = |ms: Vec<&FieldMapping>| ms.into_iter().map(|m| m.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(spec.mappings_for_table("Customer")), ["m2", "m1"]);
        assert_eq!(
            ids(spec.mappings_by_ids(&["m1".to_string(), "m2".to_string()])),
            ["m2", "m1"]
        );
    }

    #[test]
    fn declared_files_replace_the_built_in_map() {
        let spec = MappingSpecification::from_json_str(SAMPLE).unwrap();
        let files = spec.source_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files["Customer"], "alpha_customers.csv");
        let targets = spec.target_files();
        assert_eq!(targets["Loan Accounts"], "Bank2_Mock_Loan_Accounts.xlsx");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let doc = r#"{"mappings": [
            {"id": "x", "source": {"table": "A", "column": "a"}, "target": {"table": "B", "column": "b"}},
            {"id": "x", "source": {"table": "A", "column": "c"}, "target": {"table": "B", "column": "d"}}
        ]}"#;
        let err = MappingSpecification::from_json_str(doc).unwrap_err();
        assert!(err.contains("duplicate mapping id"));
    }

    #[test]
    fn camel_case_aliases_are_accepted() {
        let doc = r#"{"targetDataset": {"name": "T", "primaryKey": "id"},
            "mappings": [{"id": "a", "source": {"table": "S", "column": "x"},
                "target": {"table": "S_Extras", "column": "x"},
                "extraFieldHandling": {"method": "extend_table", "targetTable": "S_Extras", "linkKey": "k"}}],
            "outputPlans": []}"#;
        let spec = MappingSpecification::from_json_str(doc).unwrap();
        assert_eq!(spec.primary_key(), "id");
        let handling = spec.mappings[0].extra_field_handling.as_ref().unwrap();
        assert_eq!(handling.method, ExtrasMethod::ExtendTable);
        assert!(spec.output_plans().is_empty());
    }

    #[test]
    fn unknown_strategies_and_join_types_are_kept_for_reporting() {
        assert_eq!(
            DedupeStrategy::from("keep_first".to_string()),
            DedupeStrategy::Unsupported("keep_first".into())
        );
        assert_eq!(JoinKind::from("Full Outer".to_string()), JoinKind::FullOuter);
        assert_eq!(
            JoinKind::from("cross".to_string()),
            JoinKind::Unsupported("cross".into())
        );
    }
}
