//! Decode PostgreSQL rows into column-name keyed [`ResultRow`]s.
//!
//! Decoding is driven by the column's declared type so statements can be
//! written without a matching Rust struct. Columns of any other type are
//! refused; statements cast enumerations and composites to `text`.

use rust_decimal::Decimal;
use sqlx::postgres::{PgColumn, PgRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use uuid::Uuid;

use crate::domain::ports::{ResultRow, SqlValue, StoreError};

use super::pg_error_mapping::map_sqlx_error;

/// Decoder chosen for a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Void,
    Bool,
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Numeric,
    Uuid,
    Json,
    Text,
    /// Custom, composite, or temporal types with no decoder.
    Unsupported,
}

impl ColumnKind {
    fn from_type_name(name: &str) -> Self {
        match name {
            "VOID" => Self::Void,
            "BOOL" => Self::Bool,
            "INT2" => Self::SmallInt,
            "INT4" => Self::Int,
            "INT8" => Self::BigInt,
            "FLOAT4" => Self::Real,
            "FLOAT8" => Self::Double,
            "NUMERIC" => Self::Numeric,
            "UUID" => Self::Uuid,
            "JSON" | "JSONB" => Self::Json,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => Self::Text,
            _ => Self::Unsupported,
        }
    }
}

/// Decode every column of `row`.
pub(crate) fn decode_row(row: &PgRow) -> Result<ResultRow, StoreError> {
    row.columns()
        .iter()
        .map(|column| decode_column(row, column).map(|value| (column.name().to_owned(), value)))
        .collect()
}

/// Decode the first column of the first row, or `Null` when there is none.
pub(crate) fn first_value(rows: &[PgRow]) -> Result<SqlValue, StoreError> {
    let Some(row) = rows.first() else {
        return Ok(SqlValue::Null);
    };
    let Some(column) = row.columns().first() else {
        return Ok(SqlValue::Null);
    };
    decode_column(row, column)
}

fn unsupported_column(column: &str, type_name: &str) -> StoreError {
    StoreError::query(format!(
        "column `{column}` has type {type_name} with no decoder; cast it to text"
    ))
}

fn decode_column(row: &PgRow, column: &PgColumn) -> Result<SqlValue, StoreError> {
    let index = column.ordinal();
    let type_name = column.type_info().name();
    let kind = ColumnKind::from_type_name(type_name);
    if row.try_get_raw(index).map_err(map_sqlx_error)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let value = match kind {
        ColumnKind::Void => SqlValue::Null,
        ColumnKind::Bool => SqlValue::Bool(row.try_get(index).map_err(map_sqlx_error)?),
        ColumnKind::SmallInt => {
            SqlValue::Int(i64::from(row.try_get::<i16, _>(index).map_err(map_sqlx_error)?))
        }
        ColumnKind::Int => {
            SqlValue::Int(i64::from(row.try_get::<i32, _>(index).map_err(map_sqlx_error)?))
        }
        ColumnKind::BigInt => SqlValue::Int(row.try_get(index).map_err(map_sqlx_error)?),
        ColumnKind::Real => {
            SqlValue::Float(f64::from(row.try_get::<f32, _>(index).map_err(map_sqlx_error)?))
        }
        ColumnKind::Double => SqlValue::Float(row.try_get(index).map_err(map_sqlx_error)?),
        ColumnKind::Numeric => {
            SqlValue::Decimal(row.try_get::<Decimal, _>(index).map_err(map_sqlx_error)?)
        }
        ColumnKind::Uuid => SqlValue::Uuid(row.try_get::<Uuid, _>(index).map_err(map_sqlx_error)?),
        ColumnKind::Json => SqlValue::Json(
            row.try_get::<serde_json::Value, _>(index)
                .map_err(map_sqlx_error)?,
        ),
        ColumnKind::Text => SqlValue::Text(row.try_get(index).map_err(map_sqlx_error)?),
        ColumnKind::Unsupported => return Err(unsupported_column(column.name(), type_name)),
    };
    Ok(value)
}
