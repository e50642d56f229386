//! Result rows and decoding into records, scalars and maps.
//!
//! Records describe themselves through a static field registry ([`FieldNode`] tree),
//! usually generated by `#[derive(Record)]`. A [`ScanPlan`] flattens that tree once per
//! result set and maps every result column to the path of the field that receives it.
//! Columns without a matching field are discarded.

use crate::error::{SqlResult, TrySqlError};
use crate::value::{FromValue, Value};
use indexmap::IndexMap;
use std::sync::Arc;

/// Column-keyed row, in result column order.
pub type RowMap = IndexMap<String, Value>;

/// A single result row with its values already converted to [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the named column (first match if the name repeats).
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Convert the named column.
    pub fn try_get<T: FromValue>(&self, column: &str) -> SqlResult<T> {
        let value = self
            .get(column)
            .cloned()
            .ok_or_else(|| TrySqlError::decode(column, "column not found"))?;
        T::from_value(value).map_err(|e| TrySqlError::decode(column, e))
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn into_map(self) -> RowMap {
        self.columns.iter().cloned().zip(self.values).collect()
    }
}

/// A full result set: the live column list plus its rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rows {
    columns: Arc<[String]>,
    rows: Vec<Row>,
}

impl Rows {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Missing trailing values are filled with `NULL`, extras are dropped.
    pub fn push(&mut self, mut values: Vec<Value>) {
        values.resize(self.columns.len(), Value::Null);
        self.rows.push(Row {
            columns: Arc::clone(&self.columns),
            values,
        });
    }

    /// Builder-style [`Rows::push`].
    pub fn with_row(mut self, values: Vec<Value>) -> Self {
        self.push(values);
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

// ==================== Record registry ====================

/// One entry of a record's field registry.
#[derive(Debug, Clone, Copy)]
pub enum FieldNode {
    /// A field filled from the column of the given name.
    Leaf {
        field: &'static str,
        column: &'static str,
    },
    /// A promoted sub-record matched against the same column set.
    Branch {
        field: &'static str,
        nodes: fn() -> &'static [FieldNode],
    },
}

impl FieldNode {
    pub const fn leaf(field: &'static str, column: &'static str) -> Self {
        Self::Leaf { field, column }
    }

    pub const fn branch(field: &'static str, nodes: fn() -> &'static [FieldNode]) -> Self {
        Self::Branch { field, nodes }
    }

    pub fn field(&self) -> &'static str {
        match self {
            Self::Leaf { field, .. } | Self::Branch { field, .. } => *field,
        }
    }
}

/// A destination type that result rows can be decoded into.
///
/// `set_field` receives the index path of a leaf in [`Record::fields`]: one index per
/// level, the last one naming the leaf. Implementations for embedded branches forward the
/// remaining path to the sub-record, allocating optional sub-records on first use.
pub trait Record: Default + Send {
    fn fields() -> &'static [FieldNode];

    fn set_field(&mut self, path: &[usize], value: Value) -> SqlResult<()>;
}

impl<T: Record> Record for Box<T> {
    fn fields() -> &'static [FieldNode] {
        T::fields()
    }

    fn set_field(&mut self, path: &[usize], value: Value) -> SqlResult<()> {
        (**self).set_field(path, value)
    }
}

/// Error for a path that does not name a leaf of the record. Used by generated code.
pub fn invalid_field_path(record: &'static str, path: &[usize]) -> TrySqlError {
    TrySqlError::Other(format!("{record}: no field at path {path:?}"))
}

/// Column index to field path mapping for one record type and one column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    targets: Vec<Option<Vec<usize>>>,
}

impl ScanPlan {
    pub fn new<T: Record>(columns: &[String]) -> Self {
        Self::from_fields(T::fields(), columns)
    }

    pub fn from_fields(fields: &[FieldNode], columns: &[String]) -> Self {
        let mut leaves = Vec::new();
        flatten(fields, &mut Vec::new(), &mut leaves);

        // Later leaves overwrite earlier ones, so the last matching field wins.
        let mut targets = vec![None; columns.len()];
        for (column, path) in leaves {
            for (i, name) in columns.iter().enumerate() {
                if name == column {
                    targets[i] = Some(path.clone());
                }
            }
        }
        Self { targets }
    }

    /// Field path receiving column `index`, `None` if the column is discarded.
    pub fn target(&self, index: usize) -> Option<&[usize]> {
        self.targets.get(index).and_then(|t| t.as_deref())
    }

    pub fn decode<T: Record>(&self, row: Row) -> SqlResult<T> {
        let mut record = T::default();
        self.decode_into(&mut record, row)?;
        Ok(record)
    }

    pub fn decode_into<T: Record>(&self, record: &mut T, row: Row) -> SqlResult<()> {
        for (target, value) in self.targets.iter().zip(row.values) {
            if let Some(path) = target {
                record.set_field(path, value)?;
            }
        }
        Ok(())
    }
}

fn flatten(
    nodes: &[FieldNode],
    prefix: &mut Vec<usize>,
    out: &mut Vec<(&'static str, Vec<usize>)>,
) {
    for (i, node) in nodes.iter().enumerate() {
        prefix.push(i);
        match node {
            FieldNode::Leaf { column, .. } => out.push((*column, prefix.clone())),
            FieldNode::Branch { nodes, .. } => flatten(nodes(), prefix, out),
        }
        prefix.pop();
    }
}

// ==================== Result shapes ====================

/// Decode every row into a fresh record.
pub fn decode_records<T: Record>(rows: Rows) -> SqlResult<Vec<T>> {
    let plan = ScanPlan::new::<T>(rows.columns());
    rows.into_iter().map(|row| plan.decode(row)).collect()
}

/// Decode the first row, if any.
pub fn decode_first_record<T: Record>(rows: Rows) -> SqlResult<Option<T>> {
    let plan = ScanPlan::new::<T>(rows.columns());
    rows.into_iter().next().map(|row| plan.decode(row)).transpose()
}

/// Convert the first column of a row.
pub fn decode_scalar<T: FromValue>(row: Row) -> SqlResult<T> {
    let column = row.columns.first().cloned().unwrap_or_default();
    let value = row
        .values
        .into_iter()
        .next()
        .ok_or_else(|| TrySqlError::decode(column.as_str(), "result has no columns"))?;
    T::from_value(value).map_err(|e| TrySqlError::decode(column, e))
}

pub fn decode_scalars<T: FromValue>(rows: Rows) -> SqlResult<Vec<T>> {
    rows.into_iter().map(decode_scalar).collect()
}

pub fn decode_maps(rows: Rows) -> Vec<RowMap> {
    rows.into_iter().map(Row::into_map).collect()
}
