//! Statements sent to the data store and the rows they return.
//!
//! A [`Statement`] carries one SQL string plus positional bind parameters;
//! values never get spliced into the SQL text. Rows come back as
//! column-name keyed maps so callers can read whatever a statement selects.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use uuid::Uuid;

use super::StoreError;

/// Positional bind parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    /// Bound as `text`; cast in SQL where another type is expected.
    Text(String),
    /// Bound as `uuid`.
    Uuid(Uuid),
    /// Bound as `numeric`.
    Decimal(Decimal),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for SqlParam {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<Decimal> for SqlParam {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

/// One SQL statement with its bind parameters.
///
/// # Examples
///
/// ```
/// use backend_validator::domain::ports::{SqlParam, Statement};
///
/// let statement = Statement::new("SELECT id FROM auth.users WHERE email = $1")
///     .bind("admin@example.com");
/// assert_eq!(statement.params(), &[SqlParam::Text("admin@example.com".into())]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: Cow<'static, str>,
    params: Vec<SqlParam>,
}

impl Statement {
    /// Create a statement without parameters.
    pub fn new(sql: impl Into<Cow<'static, str>>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append the next positional parameter.
    #[must_use]
    pub fn bind(mut self, param: impl Into<SqlParam>) -> Self {
        self.params.push(param.into());
        self
    }

    /// SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bind parameters in positional order.
    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }
}

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`, or a `void` procedure result.
    Null,
    /// `bool`.
    Bool(bool),
    /// Any integer width, widened.
    Int(i64),
    /// `real` or `double precision`.
    Float(f64),
    /// `numeric`.
    Decimal(Decimal),
    /// Text types and anything cast to `text`.
    Text(String),
    /// `uuid`.
    Uuid(Uuid),
    /// `json` or `jsonb`.
    Json(serde_json::Value),
}

impl SqlValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Uuid(_) => "uuid",
            Self::Json(_) => "json",
        }
    }
}

/// Errors raised when reading typed values out of a [`ResultRow`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    #[error("column `{column}` missing from result row")]
    Missing { column: String },
    #[error("column `{column}` is null")]
    Null { column: String },
    #[error("column `{column}` holds {found}, expected {expected}")]
    Mismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Read a nullable column: SQL `NULL` becomes `None`, while missing or
/// mistyped columns still fail.
pub fn nullable<T>(read: Result<T, RowError>) -> Result<Option<T>, RowError> {
    match read {
        Ok(value) => Ok(Some(value)),
        Err(RowError::Null { .. }) => Ok(None),
        Err(error) => Err(error),
    }
}

impl From<RowError> for StoreError {
    fn from(error: RowError) -> Self {
        Self::query(error.to_string())
    }
}

fn unparsable_text(column: &str, expected: &'static str) -> RowError {
    RowError::Mismatch {
        column: column.to_owned(),
        expected,
        found: "text",
    }
}

/// A result row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    columns: BTreeMap<String, SqlValue>,
}

impl ResultRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column insert.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: SqlValue) -> Self {
        self.insert(column, value);
        self
    }

    /// Insert or replace a column value.
    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.columns.insert(column.into(), value);
    }

    /// Raw column value, if present.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    /// Column names in sorted order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    fn non_null(&self, column: &str) -> Result<&SqlValue, RowError> {
        match self.columns.get(column) {
            None => Err(RowError::Missing {
                column: column.to_owned(),
            }),
            Some(SqlValue::Null) => Err(RowError::Null {
                column: column.to_owned(),
            }),
            Some(value) => Ok(value),
        }
    }

    fn mismatch(column: &str, expected: &'static str, found: &SqlValue) -> RowError {
        RowError::Mismatch {
            column: column.to_owned(),
            expected,
            found: found.type_name(),
        }
    }

    /// Read a UUID column; canonical text is accepted as well.
    pub fn uuid(&self, column: &str) -> Result<Uuid, RowError> {
        match self.non_null(column)? {
            SqlValue::Uuid(value) => Ok(*value),
            SqlValue::Text(raw) => {
                Uuid::parse_str(raw).map_err(|_| unparsable_text(column, "uuid"))
            }
            other => Err(Self::mismatch(column, "uuid", other)),
        }
    }

    /// Read a text column.
    pub fn text(&self, column: &str) -> Result<&str, RowError> {
        match self.non_null(column)? {
            SqlValue::Text(value) => Ok(value),
            other => Err(Self::mismatch(column, "text", other)),
        }
    }

    /// Read a numeric column as a decimal.
    pub fn decimal(&self, column: &str) -> Result<Decimal, RowError> {
        match self.non_null(column)? {
            SqlValue::Decimal(value) => Ok(*value),
            SqlValue::Int(value) => Ok(Decimal::from(*value)),
            SqlValue::Text(raw) => Decimal::from_str(raw).map_err(|_| unparsable_text(column, "decimal")),
            other => Err(Self::mismatch(column, "decimal", other)),
        }
    }

    /// Read a boolean column.
    pub fn bool(&self, column: &str) -> Result<bool, RowError> {
        match self.non_null(column)? {
            SqlValue::Bool(value) => Ok(*value),
            other => Err(Self::mismatch(column, "bool", other)),
        }
    }
}

impl FromIterator<(String, SqlValue)> for ResultRow {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
