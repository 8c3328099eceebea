//! [`Connection`] adapter over `tokio-postgres`.
//!
//! Commands carry named parameters (`@BuyerId`); PostgreSQL wants positional
//! ones (`$1`). Each `;`-separated statement is rewritten on its own, binding
//! only the parameters it references.

use crate::command::{Command, DbParameter};
use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::Value;
use bytes::BytesMut;
use std::error::Error;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => {
                if *ty == Type::INT2 {
                    i16::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*i as f64).to_sql(ty, out)
                } else {
                    i.to_sql(ty, out)
                }
            }
            Value::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Value::String(s) => s.to_sql(ty, out),
            Value::Bytes(b) => b.to_sql(ty, out),
            Value::Date(d) => d.to_sql(ty, out),
            Value::DateTime(d) => d.to_sql(ty, out),
            Value::DateTimeUtc(d) => d.to_sql(ty, out),
            Value::Uuid(u) => u.to_sql(ty, out),
            Value::Json(j) => j.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// One statement rewritten to positional parameters.
#[derive(Debug)]
pub(crate) struct Positional<'a> {
    pub sql: String,
    pub values: Vec<&'a Value>,
}

/// Rewrite named parameters in `statement` to `$n`, numbered by first use.
///
/// Text inside single-quoted literals is left alone, as is any prefixed
/// token that names no parameter.
pub(crate) fn to_positional<'a>(statement: &str, parameters: &'a [DbParameter]) -> Positional<'a> {
    let Some(prefix) = parameters.first().and_then(|p| p.name.chars().next()) else {
        return Positional {
            sql: statement.to_string(),
            values: Vec::new(),
        };
    };
    let mut sql = String::with_capacity(statement.len());
    let mut order: Vec<&'a DbParameter> = Vec::new();
    let mut chars = statement.char_indices().peekable();
    let mut in_literal = false;
    while let Some((start, c)) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
            sql.push(c);
            continue;
        }
        if in_literal || c != prefix {
            sql.push(c);
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(i, next)) = chars.peek() {
            if next.is_alphanumeric() || next == '_' {
                end = i + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let token = &statement[start..end];
        match parameters.iter().find(|p| p.name == token) {
            Some(parameter) => {
                let position = match order.iter().position(|p| p.name == parameter.name) {
                    Some(i) => i,
                    None => {
                        order.push(parameter);
                        order.len() - 1
                    }
                };
                sql.push_str(&format!("${}", position + 1));
            }
            None => sql.push_str(token),
        }
    }
    Positional {
        sql,
        values: order.into_iter().map(|p| &p.value).collect(),
    }
}

fn column_value(row: &tokio_postgres::Row, idx: usize) -> OrmResult<Value> {
    let column = &row.columns()[idx];
    let ty = column.type_();
    let decode = |e: tokio_postgres::Error| OrmError::decode(column.name(), e.to_string());
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx).map_err(decode)?.map(Value::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .map_err(decode)?
            .map(|v| Value::Int(v.into()))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .map_err(decode)?
            .map(|v| Value::Int(v.into()))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx).map_err(decode)?.map(Value::Int)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .map_err(decode)?
            .map(|v| Value::Float(v.into()))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx).map_err(decode)?.map(Value::Float)
    } else if *ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(idx).map_err(decode)?.map(Value::Bytes)
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<chrono::NaiveDate>>(idx)
            .map_err(decode)?
            .map(Value::Date)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map_err(decode)?
            .map(Value::DateTime)
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .map_err(decode)?
            .map(Value::DateTimeUtc)
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<uuid::Uuid>>(idx).map_err(decode)?.map(Value::Uuid)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<serde_json::Value>>(idx)
            .map_err(decode)?
            .map(Value::Json)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME {
        row.try_get::<_, Option<String>>(idx).map_err(decode)?.map(Value::String)
    } else {
        return Err(OrmError::decode(
            column.name(),
            format!("unsupported column type {ty}"),
        ));
    };
    Ok(value.unwrap_or(Value::Null))
}

fn convert_row(row: &tokio_postgres::Row) -> OrmResult<Row> {
    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..row.len())
        .map(|idx| column_value(row, idx))
        .collect::<OrmResult<Vec<_>>>()?;
    Ok(Row::new(columns, values))
}

/// A [`Connection`] over a `tokio_postgres::Client`.
pub struct PgConnection {
    client: tokio_postgres::Client,
}

impl PgConnection {
    pub fn new(client: tokio_postgres::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    pub fn into_inner(self) -> tokio_postgres::Client {
        self.client
    }

    async fn run_query(&self, statement: &str, parameters: &[DbParameter]) -> OrmResult<Vec<Row>> {
        let positional = to_positional(statement, parameters);
        let params: Vec<&(dyn ToSql + Sync)> = positional
            .values
            .iter()
            .map(|v| *v as &(dyn ToSql + Sync))
            .collect();
        let rows = self.client.query(positional.sql.as_str(), &params).await?;
        rows.iter().map(convert_row).collect()
    }
}

impl Connection for PgConnection {
    async fn execute(&self, command: &Command) -> OrmResult<u64> {
        let mut affected = 0;
        for statement in command.statements() {
            let positional = to_positional(statement, &command.parameters);
            let params: Vec<&(dyn ToSql + Sync)> = positional
                .values
                .iter()
                .map(|v| *v as &(dyn ToSql + Sync))
                .collect();
            affected += self.client.execute(positional.sql.as_str(), &params).await?;
        }
        Ok(affected)
    }

    async fn query(&self, command: &Command) -> OrmResult<Vec<Row>> {
        let mut last = Vec::new();
        for statement in command.statements() {
            last = self.run_query(statement, &command.parameters).await?;
        }
        Ok(last)
    }

    async fn query_multi(&self, command: &Command) -> OrmResult<Vec<Vec<Row>>> {
        let mut sets = Vec::new();
        for statement in command.statements() {
            sets.push(self.run_query(statement, &command.parameters).await?);
        }
        Ok(sets)
    }
}
