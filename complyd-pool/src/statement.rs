use complyd_core::{DataAccessError, Result};
use postgres::types::{ToSql, Type};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, PgConnection, Row, TypeInfo};

/// How much of the result set the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchMode {
    /// Every row.
    All,
    /// The first row, if any.
    One,
    /// No rows; only the affected-row count.
    None,
}

/// A positional statement parameter.
///
/// Both drivers bind these in order (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryParam {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Uuid(uuid::Uuid),
    Null,
}

impl std::fmt::Display for QueryParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryParam::Text(v) => write!(f, "{}", v),
            QueryParam::Int(v) => write!(f, "{}", v),
            QueryParam::Float(v) => write!(f, "{}", v),
            QueryParam::Bool(v) => write!(f, "{}", v),
            QueryParam::Uuid(v) => write!(f, "{}", v),
            QueryParam::Null => write!(f, "NULL"),
        }
    }
}

/// Result of a statement execution, shaped by the requested fetch mode.
///
/// Rows are rendered as JSON objects keyed by column name so results can
/// round-trip through the cache facade's structured-text codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryOutcome {
    Rows(Vec<Value>),
    Row(Option<Value>),
    Affected(u64),
}

impl QueryOutcome {
    /// Number of rows carried by this outcome.
    pub fn row_count(&self) -> usize {
        match self {
            QueryOutcome::Rows(rows) => rows.len(),
            QueryOutcome::Row(row) => usize::from(row.is_some()),
            QueryOutcome::Affected(_) => 0,
        }
    }
}

fn float_value(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

/// Renders one sqlx row as a JSON object, decoding by declared column
/// type. Unrecognized types decode as text when the driver allows it and
/// null otherwise.
pub(crate) fn pg_row_to_json(row: &PgRow) -> Value {
    let mut map = Map::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let name = column.name().to_string();
        let value = match column.type_info().name() {
            "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, Value::String),
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::Number(v.into())),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::Number(v.into())),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::Number(v.into())),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| float_value(v as f64)),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, float_value),
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, Value::Bool),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::String(v.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::String(v.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::String(v.to_string())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::String(v.to_string())),
            "JSON" | "JSONB" => row
                .try_get::<Option<Value>, _>(idx)
                .ok()
                .flatten()
                .unwrap_or(Value::Null),
            other => {
                tracing::debug!(column = %name, pg_type = other, "column type not mapped, trying text");
                row.try_get::<Option<String>, _>(idx)
                    .ok()
                    .flatten()
                    .map_or(Value::Null, Value::String)
            }
        };
        map.insert(name, value);
    }
    Value::Object(map)
}

/// Renders one blocking-driver row as a JSON object.
pub(crate) fn sync_row_to_json(row: &postgres::Row) -> Value {
    let mut map = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let ty = column.type_();
        let value = if *ty == Type::TEXT
            || *ty == Type::VARCHAR
            || *ty == Type::BPCHAR
            || *ty == Type::NAME
        {
            row.try_get::<_, Option<String>>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, Value::String)
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::Number(v.into()))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::Number(v.into()))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::Number(v.into()))
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| float_value(v as f64))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, float_value)
        } else if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, Value::Bool)
        } else if *ty == Type::UUID {
            row.try_get::<_, Option<uuid::Uuid>>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::String(v.to_string()))
        } else if *ty == Type::TIMESTAMPTZ {
            row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::String(v.to_rfc3339()))
        } else if *ty == Type::TIMESTAMP {
            row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |v| Value::String(v.to_string()))
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            row.try_get::<_, Option<Value>>(idx)
                .ok()
                .flatten()
                .unwrap_or(Value::Null)
        } else {
            tracing::debug!(column = %name, pg_type = %ty, "column type not mapped");
            Value::Null
        };
        map.insert(name, value);
    }
    Value::Object(map)
}

fn bind_params<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &[QueryParam],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    let mut bound = query;
    for param in params {
        bound = match param {
            QueryParam::Text(v) => bound.bind(v.clone()),
            QueryParam::Int(v) => bound.bind(*v),
            QueryParam::Float(v) => bound.bind(*v),
            QueryParam::Bool(v) => bound.bind(*v),
            QueryParam::Uuid(v) => bound.bind(*v),
            QueryParam::Null => bound.bind(Option::<String>::None),
        };
    }
    bound
}

pub(crate) async fn run_async_statement(
    conn: &mut PgConnection,
    query: &str,
    params: &[QueryParam],
    mode: FetchMode,
) -> Result<QueryOutcome> {
    match mode {
        FetchMode::All => {
            let rows = bind_params(sqlx::query(query), params)
                .fetch_all(&mut *conn)
                .await?;
            Ok(QueryOutcome::Rows(rows.iter().map(pg_row_to_json).collect()))
        }
        FetchMode::One => {
            let row = bind_params(sqlx::query(query), params)
                .fetch_optional(&mut *conn)
                .await?;
            Ok(QueryOutcome::Row(row.as_ref().map(pg_row_to_json)))
        }
        FetchMode::None => {
            let done = bind_params(sqlx::query(query), params)
                .execute(&mut *conn)
                .await?;
            Ok(QueryOutcome::Affected(done.rows_affected()))
        }
    }
}

static SQL_NULL: Option<&str> = None;

fn as_sql_params(params: &[QueryParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|param| match param {
            QueryParam::Text(v) => v as &(dyn ToSql + Sync),
            QueryParam::Int(v) => v as &(dyn ToSql + Sync),
            QueryParam::Float(v) => v as &(dyn ToSql + Sync),
            QueryParam::Bool(v) => v as &(dyn ToSql + Sync),
            QueryParam::Uuid(v) => v as &(dyn ToSql + Sync),
            QueryParam::Null => &SQL_NULL as &(dyn ToSql + Sync),
        })
        .collect()
}

pub(crate) fn execution_error(err: postgres::Error) -> DataAccessError {
    DataAccessError::Execution(err.to_string())
}

pub(crate) fn run_sync_statement<C: postgres::GenericClient>(
    client: &mut C,
    query: &str,
    params: &[QueryParam],
    mode: FetchMode,
) -> Result<QueryOutcome> {
    let sql_params = as_sql_params(params);
    match mode {
        FetchMode::All => {
            let rows = client
                .query(query, &sql_params)
                .map_err(execution_error)?;
            Ok(QueryOutcome::Rows(rows.iter().map(sync_row_to_json).collect()))
        }
        FetchMode::One => {
            let row = client
                .query_opt(query, &sql_params)
                .map_err(execution_error)?;
            Ok(QueryOutcome::Row(row.as_ref().map(sync_row_to_json)))
        }
        FetchMode::None => {
            let affected = client
                .execute(query, &sql_params)
                .map_err(execution_error)?;
            Ok(QueryOutcome::Affected(affected))
        }
    }
}
