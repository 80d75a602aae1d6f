//! Row codec: turns raw driver values into JSON-safe values.
//!
//! Binary values are encoded by column name, not by type: a column literally
//! named `Signature` is emitted as base64, every other binary column as
//! lowercase hex. Nulls stay `null`; everything else is stringified, with
//! dates, times and decimals rendered in their usual textual form
//! (`2024-05-01 10:00:00`, `91.50`).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Value};
use sqlx::{
    mysql::MySqlRow,
    postgres::PgRow,
    sqlite::SqliteRow,
    types::{
        chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc},
        Decimal,
    },
    Column, ColumnIndex, Row, TypeInfo, ValueRef,
};

/// Column whose binary payload is base64-encoded instead of hex-encoded.
pub const SIGNATURE_COLUMN: &str = "Signature";

/// JSON-ready mapping produced from one database row.
pub type DecodedRecord = Map<String, Value>;

/// A driver value before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Column names plus positionally aligned raw rows, as fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consumes the fetched rows and encodes each one.
    pub fn into_records(self) -> Vec<DecodedRecord> {
        let RowSet { columns, rows } = self;
        rows.into_iter()
            .map(|row| decode_row(&columns, row))
            .collect()
    }
}

/// Encodes a single value according to its column name.
pub fn encode_value(column: &str, value: RawValue) -> Value {
    match value {
        RawValue::Bytes(bytes) if column == SIGNATURE_COLUMN => Value::String(STANDARD.encode(bytes)),
        RawValue::Bytes(bytes) => Value::String(hex::encode(bytes)),
        RawValue::Null => Value::Null,
        RawValue::Bool(flag) => Value::String(flag.to_string()),
        RawValue::Int(number) => Value::String(number.to_string()),
        RawValue::Float(number) => Value::String(number.to_string()),
        RawValue::Text(text) => Value::String(text),
    }
}

/// Zips column names with a row's values. A repeated column name keeps the
/// last value.
pub fn decode_row(columns: &[String], row: Vec<RawValue>) -> DecodedRecord {
    columns
        .iter()
        .zip(row)
        .map(|(column, value)| (column.clone(), encode_value(column, value)))
        .collect()
}

pub(crate) fn column_names<R: Row>(row: &R) -> Vec<String> {
    row.columns()
        .iter()
        .map(|column| column.name().to_owned())
        .collect()
}

/// Type name of the value at `index`, or `None` for SQL NULL.
fn value_type<R>(row: &R, index: usize) -> Result<Option<String>, sqlx::Error>
where
    R: Row,
    usize: ColumnIndex<R>,
{
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(None);
    }
    Ok(Some(raw.type_info().name().to_owned()))
}

/// SQLite reports the storage class of each value. A declared `BOOLEAN`
/// column still stores integers, so the declaration decides between the two.
/// Dates and decimals arrive as TEXT, INTEGER or REAL and keep that form.
pub(crate) fn sqlite_values(row: &SqliteRow) -> Result<Vec<RawValue>, sqlx::Error> {
    (0..row.len()).map(|index| sqlite_value(row, index)).collect()
}

fn sqlite_value(row: &SqliteRow, index: usize) -> Result<RawValue, sqlx::Error> {
    let Some(storage) = value_type(row, index)? else {
        return Ok(RawValue::Null);
    };
    let declared = row.column(index).type_info().name();

    let value = match storage.as_str() {
        "BOOLEAN" => RawValue::Bool(row.try_get_unchecked(index)?),
        "INTEGER" if declared == "BOOLEAN" => RawValue::Bool(row.try_get_unchecked(index)?),
        "INTEGER" => RawValue::Int(row.try_get_unchecked(index)?),
        "REAL" => RawValue::Float(row.try_get_unchecked(index)?),
        "BLOB" => RawValue::Bytes(row.try_get_unchecked(index)?),
        _ => RawValue::Text(row.try_get_unchecked(index)?),
    };
    Ok(value)
}

pub(crate) fn mysql_values(row: &MySqlRow) -> Result<Vec<RawValue>, sqlx::Error> {
    (0..row.len()).map(|index| mysql_value(row, index)).collect()
}

fn mysql_value(row: &MySqlRow, index: usize) -> Result<RawValue, sqlx::Error> {
    let Some(type_name) = value_type(row, index)? else {
        return Ok(RawValue::Null);
    };

    let value = match type_name.as_str() {
        "BOOLEAN" => RawValue::Bool(row.try_get(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            RawValue::Int(row.try_get(index)?)
        }
        unsigned if unsigned.ends_with(" UNSIGNED") => {
            RawValue::Text(row.try_get::<u64, _>(index)?.to_string())
        }
        "FLOAT" => RawValue::Text(row.try_get::<f32, _>(index)?.to_string()),
        "DOUBLE" => RawValue::Float(row.try_get(index)?),
        "DECIMAL" => RawValue::Text(row.try_get::<Decimal, _>(index)?.to_string()),
        "DATE" => RawValue::Text(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "TIME" => RawValue::Text(row.try_get::<NaiveTime, _>(index)?.to_string()),
        "DATETIME" | "TIMESTAMP" => {
            RawValue::Text(row.try_get::<NaiveDateTime, _>(index)?.to_string())
        }
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            RawValue::Bytes(row.try_get(index)?)
        }
        _ => RawValue::Text(row.try_get(index)?),
    };
    Ok(value)
}

pub(crate) fn postgres_values(row: &PgRow) -> Result<Vec<RawValue>, sqlx::Error> {
    (0..row.len()).map(|index| postgres_value(row, index)).collect()
}

fn postgres_value(row: &PgRow, index: usize) -> Result<RawValue, sqlx::Error> {
    let Some(type_name) = value_type(row, index)? else {
        return Ok(RawValue::Null);
    };

    let value = match type_name.as_str() {
        "BOOL" => RawValue::Bool(row.try_get(index)?),
        "INT2" => RawValue::Int(row.try_get::<i16, _>(index)?.into()),
        "INT4" => RawValue::Int(row.try_get::<i32, _>(index)?.into()),
        "INT8" => RawValue::Int(row.try_get(index)?),
        "FLOAT4" => RawValue::Text(row.try_get::<f32, _>(index)?.to_string()),
        "FLOAT8" => RawValue::Float(row.try_get(index)?),
        "NUMERIC" => RawValue::Text(row.try_get::<Decimal, _>(index)?.to_string()),
        "DATE" => RawValue::Text(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "TIME" => RawValue::Text(row.try_get::<NaiveTime, _>(index)?.to_string()),
        "TIMESTAMP" => RawValue::Text(row.try_get::<NaiveDateTime, _>(index)?.to_string()),
        "TIMESTAMPTZ" => RawValue::Text(format_timestamptz(row.try_get(index)?)),
        "BYTEA" => RawValue::Bytes(row.try_get(index)?),
        _ => RawValue::Text(row.try_get(index)?),
    };
    Ok(value)
}

/// `2024-05-01 10:00:00+00:00`, fractional seconds only when present.
fn format_timestamptz(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string()
}
