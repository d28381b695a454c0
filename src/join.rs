//! Join & dedupe engine for one output plan.
//!
//! The transformed source frame (left) is aligned to the target table (right), joined
//! on the declared keys, conflicts are resolved per column with the plan's dedupe
//! strategy, rows sharing the dedupe keys are collapsed, and the result is finalized to
//! the target table's column set.

use std::{cmp::Ordering, collections::HashMap};

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    data::{Cell, Value},
    frame::Frame,
    mapping::{DedupeSpec, DedupeStrategy, FieldMapping, JoinKind, OutputPlan},
    transform::temporal,
};

const KEY_SEPARATOR: &str = "\u{1f}";

static FALLBACK_STRATEGY: DedupeStrategy = DedupeStrategy::PreferNonNull;

/// How a plan's rows were combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    Joined,
    LeftOnly,
    RightOnly,
    /// Keys could not be resolved; both sides were stacked.
    Appended,
    /// The join type is not supported; the transformed source frame stands alone.
    Degraded,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub frame: Frame,
    pub mode: JoinMode,
    pub matched_pairs: usize,
    pub collapsed_rows: usize,
    /// Source-only columns removed when the result was narrowed to the target schema.
    pub dropped_columns: Vec<String>,
}

/// Runs ALIGN → JOIN → RESOLVE → DEDUPE → FINALIZE for `plan`.
pub fn merge_plan(
    left: Frame,
    right: &Frame,
    plan: &OutputPlan,
    mappings: &[&FieldMapping],
) -> JoinOutcome {
    let mut left = left;
    for column in right.columns() {
        left.ensure_column(column);
    }

    let (combined, mode, matched_pairs) = if !left.is_empty() && !right.is_empty() {
        match plan.join.kind {
            JoinKind::Unsupported(ref kind) => {
                warn!(
                    "{}: join type '{kind}' is not supported; keeping the transformed source rows only",
                    plan.output_table
                );
                (left.clone(), JoinMode::Degraded, 0)
            }
            ref kind => match resolve_keys(&left, right, plan, mappings) {
                Some((left_keys, right_keys)) => {
                    let (frame, matched) =
                        join_frames(&left, right, &left_keys, &right_keys, kind, &plan.dedupe);
                    (frame, JoinMode::Joined, matched)
                }
                None => {
                    warn!(
                        "{}: join keys {:?} / {:?} cannot be resolved; appending both sides",
                        plan.output_table, plan.join.left.on, plan.join.right.on
                    );
                    (right.append(&left), JoinMode::Appended, 0)
                }
            },
        }
    } else if !left.is_empty() {
        (left.clone(), JoinMode::LeftOnly, 0)
    } else {
        (right.clone(), JoinMode::RightOnly, 0)
    };

    let (deduped, collapsed_rows) = dedupe(&combined, &plan.dedupe);

    let (frame, dropped_columns) = if right.width() > 0 {
        let dropped = deduped
            .columns()
            .iter()
            .filter(|c| !right.has_column(c))
            .cloned()
            .collect::<Vec<_>>();
        if !dropped.is_empty() {
            warn!(
                "{}: columns {:?} are not part of the target schema and were dropped",
                plan.output_table, dropped
            );
        }
        (deduped.select(right.columns()), dropped)
    } else {
        (deduped, Vec::new())
    };

    info!(
        "✓ {} processed: {} record(s) ({:?}, {} matched pair(s), {} collapsed)",
        plan.output_table,
        frame.len(),
        mode,
        matched_pairs,
        collapsed_rows
    );
    JoinOutcome {
        frame,
        mode,
        matched_pairs,
        collapsed_rows,
        dropped_columns,
    }
}

/// Maps the declared `on` columns onto columns that exist in each frame. A left key
/// naming a source column is translated through the plan's mappings to the target
/// column it was projected into.
fn resolve_keys(
    left: &Frame,
    right: &Frame,
    plan: &OutputPlan,
    mappings: &[&FieldMapping],
) -> Option<(Vec<String>, Vec<String>)> {
    let mut left_on = plan.join.left.on.clone();
    let mut right_on = plan.join.right.on.clone();
    if left_on.is_empty() || right_on.is_empty() {
        return None;
    }
    if left_on.len() != right_on.len() {
        warn!(
            "{}: key lists differ in length; matching on the first column only",
            plan.output_table
        );
        left_on.truncate(1);
        right_on.truncate(1);
    }
    let left_keys = left_on
        .iter()
        .zip(right_on.iter())
        .map(|(key, right_key)| {
            if left.has_column(key) {
                return Some(key.clone());
            }
            let candidates = mappings
                .iter()
                .filter(|m| &m.source.column == key && left.has_column(&m.target.column))
                .collect::<Vec<_>>();
            candidates
                .iter()
                .find(|m| &m.target.column == right_key)
                .or_else(|| candidates.first())
                .map(|m| m.target.column.clone())
        })
        .collect::<Option<Vec<_>>>()?;
    if right_on.iter().any(|key| !right.has_column(key)) {
        return None;
    }
    debug!(
        "{}: joining left {:?} with right {:?}",
        plan.output_table, left_keys, right_on
    );
    Some((left_keys, right_on))
}

fn key_indices(frame: &Frame, keys: &[String]) -> Vec<usize> {
    keys.iter()
        .filter_map(|key| frame.column_index(key))
        .collect()
}

/// Null key parts never match anything.
fn build_key(row: &[Cell], indices: &[usize]) -> Option<String> {
    let mut parts = Vec::with_capacity(indices.len());
    for idx in indices {
        parts.push(row.get(*idx)?.as_ref()?.as_display());
    }
    Some(parts.join(KEY_SEPARATOR))
}

fn join_frames(
    left: &Frame,
    right: &Frame,
    left_keys: &[String],
    right_keys: &[String],
    kind: &JoinKind,
    dedupe: &DedupeSpec,
) -> (Frame, usize) {
    let left_indices = key_indices(left, left_keys);
    let right_indices = key_indices(right, right_keys);

    let mut lookup: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in right.rows().iter().enumerate() {
        if let Some(key) = build_key(row, &right_indices) {
            lookup.entry(key).or_default().push(idx);
        }
    }

    let combiner = Combiner::new(left, right, dedupe);
    let include_unmatched_left = matches!(kind, JoinKind::Left | JoinKind::FullOuter);
    let include_unmatched_right = matches!(kind, JoinKind::Right | JoinKind::FullOuter);
    let mut matched = vec![false; right.len()];
    let mut matched_pairs = 0usize;
    let mut rows = Vec::new();

    for left_row in left.rows() {
        let bucket = build_key(left_row, &left_indices).and_then(|key| lookup.get(&key));
        match bucket {
            Some(bucket) => {
                for &right_idx in bucket {
                    matched[right_idx] = true;
                    matched_pairs += 1;
                    rows.push(combiner.combine(Some(left_row), Some(&right.rows()[right_idx])));
                }
            }
            None if include_unmatched_left => rows.push(combiner.combine(Some(left_row), None)),
            None => {}
        }
    }

    if include_unmatched_right {
        for (idx, right_row) in right.rows().iter().enumerate() {
            if !matched[idx] {
                rows.push(combiner.combine(None, Some(right_row)));
            }
        }
    }

    (Frame::from_rows(combiner.columns, rows), matched_pairs)
}

/// Builds output rows over `right columns + left-only columns`, resolving each shared
/// column with the dedupe strategy.
struct Combiner<'a> {
    columns: Vec<String>,
    left_map: Vec<Option<usize>>,
    right_map: Vec<Option<usize>>,
    strategy: &'a DedupeStrategy,
    left_tie: Option<usize>,
    right_tie: Option<usize>,
}

impl<'a> Combiner<'a> {
    fn new(left: &Frame, right: &Frame, dedupe: &'a DedupeSpec) -> Self {
        let mut columns = right.columns().to_vec();
        columns.extend(
            left.columns()
                .iter()
                .filter(|c| !right.has_column(c))
                .cloned(),
        );
        let left_map = columns.iter().map(|c| left.column_index(c)).collect();
        let right_map = columns.iter().map(|c| right.column_index(c)).collect();
        let strategy = effective_strategy(dedupe);
        let (left_tie, right_tie) = match (strategy, dedupe.tie_breaker.as_deref()) {
            (DedupeStrategy::PreferLatest, Some(column)) => {
                (left.column_index(column), right.column_index(column))
            }
            _ => (None, None),
        };
        Combiner {
            columns,
            left_map,
            right_map,
            strategy,
            left_tie,
            right_tie,
        }
    }

    fn combine(&self, left: Option<&Vec<Cell>>, right: Option<&Vec<Cell>>) -> Vec<Cell> {
        let pick = |row: Option<&Vec<Cell>>, idx: Option<usize>| -> Cell {
            row.zip(idx).and_then(|(r, i)| r[i].clone())
        };
        let recency = tie_breaker_order(
            &pick(left, self.left_tie),
            &pick(right, self.right_tie),
        );
        self.left_map
            .iter()
            .zip(self.right_map.iter())
            .map(|(l, r)| resolve(pick(left, *l), pick(right, *r), self.strategy, recency))
            .collect()
    }
}

fn effective_strategy(dedupe: &DedupeSpec) -> &DedupeStrategy {
    match &dedupe.strategy {
        DedupeStrategy::Unsupported(name) => {
            warn!("Dedupe strategy '{name}' is not supported; using prefer_non_null");
            &FALLBACK_STRATEGY
        }
        DedupeStrategy::PreferLatest if dedupe.tie_breaker.is_none() => {
            warn!("prefer_latest needs a tie_breaker column; using prefer_non_null");
            &FALLBACK_STRATEGY
        }
        strategy => {
            if let (Some(column), false) = (
                dedupe.tie_breaker.as_deref(),
                matches!(strategy, DedupeStrategy::PreferLatest),
            ) {
                debug!("tie_breaker '{column}' is not used by {}", strategy.label());
            }
            strategy
        }
    }
}

/// Orders the two tie-breaker values, reading date-like text as dates. `None` when
/// either side is missing.
fn tie_breaker_order(left: &Cell, right: &Cell) -> Option<Ordering> {
    let (left, right) = (left.as_ref()?, right.as_ref()?);
    let as_temporal = |value: &Value| match value {
        Value::String(s) => temporal::parse_naive_datetime(s)
            .map(Value::DateTime)
            .or_else(|_| temporal::parse_naive_date(s).map(Value::Date))
            .unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    };
    Some(as_temporal(left).compare(&as_temporal(right)))
}

/// Picks the surviving value for one column of a matched pair.
///
/// `prefer_non_null` and `prefer_right_non_null` keep the target-side value unless it
/// is null; `prefer_left_non_null` mirrors that; `prefer_latest` prefers the side with
/// the greater tie-breaker and falls back to `prefer_non_null` on ties or nulls.
pub fn resolve(left: Cell, right: Cell, strategy: &DedupeStrategy, recency: Option<Ordering>) -> Cell {
    let prefer_left = match strategy {
        DedupeStrategy::PreferLeftNonNull => true,
        DedupeStrategy::PreferLatest => recency == Some(Ordering::Greater),
        DedupeStrategy::PreferNonNull
        | DedupeStrategy::PreferRightNonNull
        | DedupeStrategy::Unsupported(_) => false,
    };
    if prefer_left {
        left.or(right)
    } else {
        right.or(left)
    }
}

/// Collapses rows that share non-null values for every dedupe key, folding later rows
/// into the first occurrence as if they were the target side.
pub fn dedupe(frame: &Frame, spec: &DedupeSpec) -> (Frame, usize) {
    let keys = spec
        .keys
        .iter()
        .filter(|k| frame.has_column(k))
        .cloned()
        .collect::<Vec<_>>();
    if keys.is_empty() || frame.len() < 2 {
        return (frame.clone(), 0);
    }
    let indices = key_indices(frame, &keys);
    let strategy = effective_strategy(spec);
    let tie = match (strategy, spec.tie_breaker.as_deref()) {
        (DedupeStrategy::PreferLatest, Some(column)) => frame.column_index(column),
        _ => None,
    };

    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(frame.len());
    let mut collapsed = 0usize;
    for row in frame.rows() {
        match build_key(row, &indices) {
            Some(key) => match first_seen.get(&key) {
                Some(&slot) => {
                    let existing = &rows[slot];
                    let recency = tie.and_then(|i| tie_breaker_order(&existing[i], &row[i]));
                    let merged: Vec<Cell> = existing
                        .iter()
                        .zip(row.iter())
                        .map(|(l, r)| resolve(l.clone(), r.clone(), strategy, recency))
                        .collect();
                    rows[slot] = merged;
                    collapsed += 1;
                }
                None => {
                    first_seen.insert(key, rows.len());
                    rows.push(row.clone());
                }
            },
            None => rows.push(row.clone()),
        }
    }
    debug!(
        "dedupe on {keys:?}: {} distinct key(s), {collapsed} collapsed",
        first_seen.len()
    );
    (Frame::from_rows(frame.columns().to_vec(), rows), collapsed)
}
