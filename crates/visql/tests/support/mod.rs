//! Entities and an in-memory connection shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use visql::{Command, Connection, Entity, FieldSource, FromRow, OrmResult, Row, Value};

#[derive(Debug, Clone, PartialEq, Entity, FromRow)]
#[visql(table = "orders")]
pub struct Order {
    #[visql(key, auto_increment)]
    pub id: i64,
    pub amount: i64,
    pub buyer_id: i64,
    pub remark: Option<String>,
    #[visql(has_many(Detail, foreign_key = "OrderId"))]
    pub details: Vec<Detail>,
}

impl Order {
    pub fn new(amount: i64, buyer_id: i64) -> Self {
        Self {
            id: 0,
            amount,
            buyer_id,
            remark: None,
            details: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Entity, FromRow)]
pub struct Buyer {
    #[visql(key)]
    pub id: i64,
    pub name: String,
    pub level: i64,
}

#[derive(Debug, Clone, PartialEq, Entity, FromRow)]
#[visql(table = "order_detail")]
pub struct Detail {
    #[visql(key, auto_increment)]
    pub id: i64,
    pub order_id: i64,
    pub amount: i64,
}

#[derive(FieldSource)]
pub struct OrderKey {
    pub id: i64,
}

/// Records every command and answers queries from a queue of row sets.
#[derive(Default)]
pub struct RecordingConnection {
    commands: Mutex<Vec<Command>>,
    results: Mutex<VecDeque<Vec<Row>>>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(self, rows: Vec<Row>) -> Self {
        self.results.lock().unwrap().push_back(rows);
        self
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.commands().into_iter().map(|c| c.sql).collect()
    }
}

impl Connection for RecordingConnection {
    async fn execute(&self, command: &Command) -> OrmResult<u64> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(command.statements().count() as u64)
    }

    async fn query(&self, command: &Command) -> OrmResult<Vec<Row>> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(self.results.lock().unwrap().pop_front().unwrap_or_default())
    }
}

pub fn row(columns: &[&str], values: Vec<Value>) -> Row {
    Row::new(columns.iter().map(|c| c.to_string()).collect(), values)
}

/// An `orders` row as the database labels it.
pub fn order_row(id: i64, amount: i64, buyer_id: i64) -> Row {
    row(
        &["id", "amount", "buyer_id", "remark"],
        vec![id.into(), amount.into(), buyer_id.into(), Value::Null],
    )
}
