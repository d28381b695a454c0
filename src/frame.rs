//! In-memory tables shared by every pipeline stage.
//!
//! A [`Frame`] is an ordered list of rows over an ordered, duplicate-free column
//! list. Stages never mutate a frame they received; they build a new one, with the
//! exception of additive column assignment while a frame is still being assembled.

use crate::data::{Cell, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        let mut frame = Frame::default();
        for column in columns {
            frame.ensure_column(&column);
        }
        frame
    }

    /// Builds a frame from rows already laid out in `columns` order. Short rows are
    /// padded with nulls and long rows truncated.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut frame = Frame::new(columns);
        let width = frame.columns.len();
        frame.rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        frame
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    pub fn column_values(&self, name: &str) -> Option<Vec<Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].clone()).collect())
    }

    /// Appends a null-filled column when `name` is not present yet.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    /// Assigns `values` to `name`, replacing an existing column of that name. When the
    /// frame has no rows yet it adopts the length of `values`.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) {
        if self.rows.is_empty() && !values.is_empty() {
            self.rows = vec![vec![None; self.columns.len()]; values.len()];
        }
        let idx = self.ensure_column(name);
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row[idx] = values.next().flatten();
        }
    }

    /// Returns a copy with its columns restricted to, and ordered as, `columns`.
    /// Unknown names become null-filled columns.
    pub fn select(&self, columns: &[String]) -> Frame {
        let indices = columns
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Vec<_>>();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|idx| idx.and_then(|i| row[i].clone()))
                    .collect()
            })
            .collect();
        Frame::from_rows(columns.to_vec(), rows)
    }

    /// Concatenates `other` below `self`. The column set becomes the union, keeping
    /// `self`'s order first.
    pub fn append(&self, other: &Frame) -> Frame {
        let mut columns = self.columns.clone();
        for column in &other.columns {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        let mut combined = self.select(&columns);
        let tail = other.select(&columns);
        combined.rows.extend(tail.rows);
        combined
    }
}
