//! Query result access
//!
//! [`QueryResult`] wraps a materialized result set (or the affected-row
//! count of an update) with typed, NULL-safe accessors. Rows are visited
//! with a cursor: call [`QueryResult::next`] to advance, then read cells by
//! index or by column name.

use crate::driver::ResultData;
use tracing::warn;

/// Resolves a column reference (either a zero-based index or a name)
/// against the result's field list.
pub trait ColumnIndex {
    fn resolve(&self, field_names: &[String]) -> Option<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, field_names: &[String]) -> Option<usize> {
        if *self < field_names.len() {
            Some(*self)
        } else {
            None
        }
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, field_names: &[String]) -> Option<usize> {
        field_names.iter().position(|name| name == self)
    }
}

/// Result of one executed statement.
///
/// Getter failures are non-fatal by design: a NULL cell, an unknown column,
/// a missing current row or an unparsable value all produce the type's
/// default (empty string / 0 / 0.0 / false) and a warning log.
#[derive(Debug)]
pub struct QueryResult {
    field_names: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
    affected_rows: u64,
    has_result_set: bool,
    /// `None` = positioned before the first row
    cursor: Option<usize>,
}

impl QueryResult {
    /// Wrap a materialized result set
    pub(crate) fn from_data(data: ResultData) -> Self {
        Self {
            field_names: data.field_names,
            rows: data.rows,
            affected_rows: 0,
            has_result_set: true,
            cursor: None,
        }
    }

    /// Wrap the outcome of a statement that produced no result set
    pub(crate) fn from_affected(affected_rows: u64) -> Self {
        Self {
            field_names: Vec::new(),
            rows: Vec::new(),
            affected_rows,
            has_result_set: false,
            cursor: None,
        }
    }

    /// Advance to the next row. Returns `false` past the last row.
    pub fn next(&mut self) -> bool {
        let next = match self.cursor {
            None => 0,
            Some(i) => i + 1,
        };
        if next < self.rows.len() {
            self.cursor = Some(next);
            true
        } else {
            false
        }
    }

    /// Reposition before the first row
    pub fn reset(&mut self) -> bool {
        self.cursor = None;
        true
    }

    /// Number of columns
    pub fn field_count(&self) -> u32 {
        self.field_names.len() as u32
    }

    /// Total rows in the materialized set
    pub fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }

    /// Rows affected by an INSERT/UPDATE/DELETE
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Column names in result order
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Whether the result set has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the statement produced a result set at all (as opposed to an
    /// empty one)
    pub fn has_result_set(&self) -> bool {
        self.has_result_set
    }

    fn cell<I: ColumnIndex>(&self, column: I) -> Option<&Option<String>> {
        let row = match self.cursor {
            Some(i) => &self.rows[i],
            None => {
                warn!("result accessed with no current row, call next() first");
                return None;
            }
        };
        match column.resolve(&self.field_names) {
            Some(index) => row.get(index),
            None => {
                warn!("unknown result column requested");
                None
            }
        }
    }

    /// String value of a cell; NULL and lookup failures yield `""`
    pub fn get_string<I: ColumnIndex>(&self, column: I) -> String {
        match self.cell(column) {
            Some(Some(value)) => value.clone(),
            _ => String::new(),
        }
    }

    /// Integer value of a cell; NULL and conversion failures yield 0
    pub fn get_int<I: ColumnIndex>(&self, column: I) -> i32 {
        self.parse_cell(column, 0)
    }

    /// 64-bit integer value of a cell; NULL and conversion failures yield 0
    pub fn get_long<I: ColumnIndex>(&self, column: I) -> i64 {
        self.parse_cell(column, 0)
    }

    /// Floating point value of a cell; NULL and conversion failures yield 0.0
    pub fn get_double<I: ColumnIndex>(&self, column: I) -> f64 {
        self.parse_cell(column, 0.0)
    }

    /// Boolean value of a cell: nonzero integers and `true` are true
    pub fn get_bool<I: ColumnIndex>(&self, column: I) -> bool {
        match self.cell(column) {
            Some(Some(value)) => match value.as_str() {
                "true" | "TRUE" | "True" => true,
                other => other.parse::<i64>().map(|n| n != 0).unwrap_or(false),
            },
            _ => false,
        }
    }

    /// Whether a cell is SQL NULL; lookup failures also report true
    pub fn is_null<I: ColumnIndex>(&self, column: I) -> bool {
        match self.cell(column) {
            Some(Some(_)) => false,
            _ => true,
        }
    }

    fn parse_cell<I, T>(&self, column: I, default: T) -> T
    where
        I: ColumnIndex,
        T: std::str::FromStr + Copy,
    {
        match self.cell(column) {
            Some(Some(value)) => match value.parse() {
                Ok(parsed) => parsed,
                Err(_) => {
                    warn!(value = %value, "result cell not convertible, returning default");
                    default
                }
            },
            _ => default,
        }
    }
}
