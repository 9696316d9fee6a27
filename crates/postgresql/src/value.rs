//! Conversion between PostgreSQL wire values and [`Value`].

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use mirror_core::Value;
use reconcile::{ReconcileError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::Row;

/// Convert column `index` of `row` into a [`Value`].
pub fn convert_postgres_value(row: &Row, index: usize) -> Result<Value> {
    let column = &row.columns()[index];
    let pg_type = column.type_();
    let shape = |e: tokio_postgres::Error| {
        ReconcileError::DataShape(format!(
            "column '{}' of type {pg_type}: {e}",
            column.name()
        ))
    };

    let value: Value = match *pg_type {
        Type::BOOL => row.try_get::<_, Option<bool>>(index).map_err(shape)?.into(),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)
            .map_err(shape)?
            .map_or(Value::Null, |i| Value::Int(i as i64)),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(index)
            .map_err(shape)?
            .map_or(Value::Null, |i| Value::Int(i as i64)),
        Type::INT8 => row.try_get::<_, Option<i64>>(index).map_err(shape)?.into(),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)
            .map_err(shape)?
            .map_or(Value::Null, |f| Value::Float(f as f64)),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index).map_err(shape)?.into(),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(index)
            .map_err(shape)?
            .map_or(Value::Null, Value::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(index).map_err(shape)?.into()
        }
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)
            .map_err(shape)?
            .map_or(Value::Null, |ts| Value::Timestamp(ts.and_utc())),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)
            .map_err(shape)?
            .into(),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(index)
            .map_err(shape)?
            .map_or(Value::Null, Value::Date),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(index)
            .map_err(shape)?
            .map_or(Value::Null, Value::Time),
        Type::UUID => row.try_get::<_, Option<uuid::Uuid>>(index).map_err(shape)?.into(),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(index)
            .map_err(shape)?
            .map_or(Value::Null, Value::Json),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(index)
            .map_err(shape)?
            .map_or(Value::Null, Value::Bytes),
        // Enums and domains over text still decode as strings
        _ => row.try_get::<_, Option<String>>(index).map_err(shape)?.into(),
    };
    Ok(value)
}

/// All columns of `row`, in order.
pub fn convert_row(row: &Row) -> Result<Vec<Value>> {
    (0..row.columns().len())
        .map(|index| convert_postgres_value(row, index))
        .collect()
}

/// Binds a [`Value`] as a statement parameter.
///
/// The parameter type is whatever the server inferred for the placeholder,
/// so values are coerced to it: integers narrow with a range check,
/// timestamps drop their zone for `timestamp` columns, and anything can be
/// written into a text column. Unsupported pairs fail with a type error.
#[derive(Debug)]
pub struct PgParam<'a>(pub &'a Value);

fn text_like(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME)
}

fn midnight(date: &NaiveDate) -> std::result::Result<NaiveDateTime, &'static str> {
    date.and_hms_opt(0, 0, 0).ok_or("date has no midnight")
}

impl ToSql for PgParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql_checked(ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                _ if text_like(ty) => i.to_string().to_sql(ty, out),
                _ => i.to_sql_checked(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*f)?.to_sql(ty, out),
                _ if text_like(ty) => f.to_string().to_sql(ty, out),
                _ => f.to_sql_checked(ty, out),
            },
            Value::Decimal(d) => match *ty {
                Type::FLOAT8 => d
                    .to_f64()
                    .ok_or("decimal out of range for double precision")?
                    .to_sql(ty, out),
                Type::INT8 => d
                    .to_i64()
                    .filter(|_| d.fract().is_zero())
                    .ok_or("decimal is not a bigint")?
                    .to_sql(ty, out),
                _ if text_like(ty) => d.to_string().to_sql(ty, out),
                _ => d.to_sql_checked(ty, out),
            },
            Value::Text(s) => match *ty {
                Type::UUID => s.parse::<uuid::Uuid>()?.to_sql(ty, out),
                _ => s.as_str().to_sql_checked(ty, out),
            },
            Value::Timestamp(ts) => match *ty {
                Type::TIMESTAMP => ts.naive_utc().to_sql(ty, out),
                Type::DATE => ts.date_naive().to_sql(ty, out),
                _ if text_like(ty) => ts.to_rfc3339().to_sql(ty, out),
                _ => ts.to_sql_checked(ty, out),
            },
            Value::Date(d) => match *ty {
                Type::TIMESTAMP => midnight(d)?.to_sql(ty, out),
                Type::TIMESTAMPTZ => midnight(d)?.and_utc().to_sql(ty, out),
                _ if text_like(ty) => d.to_string().to_sql(ty, out),
                _ => d.to_sql_checked(ty, out),
            },
            Value::Time(t) if text_like(ty) => t.to_string().to_sql(ty, out),
            Value::Time(t) => t.to_sql_checked(ty, out),
            Value::Uuid(u) if text_like(ty) => u.to_string().to_sql(ty, out),
            Value::Uuid(u) => u.to_sql_checked(ty, out),
            Value::Json(j) if text_like(ty) => j.to_string().to_sql(ty, out),
            Value::Json(j) => j.to_sql_checked(ty, out),
            Value::Bytes(b) => b.as_slice().to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn encode(value: &Value, ty: &Type) -> std::result::Result<Vec<u8>, String> {
        let mut out = BytesMut::new();
        match PgParam(value).to_sql_checked(ty, &mut out) {
            Ok(IsNull::No) => Ok(out.to_vec()),
            Ok(IsNull::Yes) => Ok(Vec::new()),
            Err(e) => Err(e.to_string()),
        }
    }

    #[test]
    fn test_int_narrows_to_column_width() {
        assert_eq!(encode(&Value::Int(7), &Type::INT4).unwrap(), 7i32.to_be_bytes());
        assert_eq!(encode(&Value::Int(7), &Type::INT2).unwrap(), 7i16.to_be_bytes());
        assert_eq!(encode(&Value::Int(7), &Type::INT8).unwrap(), 7i64.to_be_bytes());
        assert!(encode(&Value::Int(70_000), &Type::INT2).is_err());
    }

    #[test]
    fn test_null_binds_as_sql_null() {
        let mut out = BytesMut::new();
        let result = PgParam(&Value::Null).to_sql_checked(&Type::INT4, &mut out);
        assert!(matches!(result, Ok(IsNull::Yes)));
    }

    #[test]
    fn test_text_into_integer_is_rejected() {
        assert!(encode(&Value::from("abc"), &Type::INT4).is_err());
    }

    #[test]
    fn test_anything_writes_into_text() {
        assert_eq!(encode(&Value::Int(42), &Type::TEXT).unwrap(), b"42");
        assert_eq!(encode(&Value::from("x"), &Type::VARCHAR).unwrap(), b"x");
    }

    #[test]
    fn test_timestamp_into_timestamp_without_zone() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let naive = encode(&Value::Timestamp(ts), &Type::TIMESTAMP).unwrap();
        let zoned = encode(&Value::Timestamp(ts), &Type::TIMESTAMPTZ).unwrap();
        // both are microseconds since 2000-01-01 UTC
        assert_eq!(naive, zoned);
    }

    #[test]
    fn test_text_into_uuid_column() {
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let from_text = encode(&Value::from(id), &Type::UUID).unwrap();
        let from_uuid = encode(&Value::Uuid(id.parse().unwrap()), &Type::UUID).unwrap();
        assert_eq!(from_text, from_uuid);
    }
}
