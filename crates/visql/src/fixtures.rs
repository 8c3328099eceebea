//! Hand-written entities and an in-memory connection shared by unit tests.

use crate::command::Command;
use crate::connection::Connection;
use crate::error::OrmResult;
use crate::expr::{Expr, ParamId};
use crate::mapping::{
    Entity, EntityMap, FieldAccessor, FieldHandle, FieldSource, MemberMap, Navigation,
};
use crate::row::{FromRow, Row};
use std::collections::VecDeque;
use std::sync::Mutex;

// ==================== Entities ====================

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Order {
    pub(crate) id: i64,
    pub(crate) amount: i64,
    pub(crate) buyer_id: i64,
}

#[derive(Clone, Copy)]
pub(crate) struct OrderFields(ParamId);

impl FieldHandle for OrderFields {
    fn from_param(id: ParamId) -> Self {
        OrderFields(id)
    }

    fn param_id(&self) -> ParamId {
        self.0
    }
}

impl OrderFields {
    pub(crate) fn id(&self) -> Expr {
        self.member("Id")
    }
    pub(crate) fn amount(&self) -> Expr {
        self.member("Amount")
    }
    pub(crate) fn buyer_id(&self) -> Expr {
        self.member("BuyerId")
    }
    pub(crate) fn shipped_at(&self) -> Expr {
        self.member("ShippedAt")
    }
    pub(crate) fn is_paid(&self) -> Expr {
        self.member("IsPaid")
    }
    pub(crate) fn remark(&self) -> Expr {
        self.member("Remark")
    }
}

impl FieldSource for Order {
    fn field_accessors() -> Vec<FieldAccessor<Self>> {
        vec![
            FieldAccessor { member: "Id", get: |o: &Order| o.id.into() },
            FieldAccessor { member: "Amount", get: |o: &Order| o.amount.into() },
            FieldAccessor { member: "BuyerId", get: |o: &Order| o.buyer_id.into() },
        ]
    }
}

impl FromRow for Order {
    fn from_row(row: &Row) -> crate::error::OrmResult<Self> {
        Ok(Order {
            id: row.get("Id")?,
            amount: row.get("Amount")?,
            buyer_id: row.get("BuyerId")?,
        })
    }
}

impl Entity for Order {
    type Fields = OrderFields;

    fn entity_map() -> EntityMap {
        EntityMap::new("Order", "order")
            .member(MemberMap::new("Id", "id").key().auto_increment())
            .member(MemberMap::new("Amount", "amount"))
            .member(MemberMap::new("BuyerId", "buyer_id"))
            .member(MemberMap::new("ShippedAt", "shipped_at"))
            .member(MemberMap::new("IsPaid", "is_paid").boolean())
            .member(MemberMap::new("Remark", "remark"))
            .member(MemberMap::navigation(
                "Details",
                Navigation {
                    target: Detail::entity_type(),
                    foreign_key: "OrderId".into(),
                    is_many: true,
                },
            ))
            .member(MemberMap::navigation(
                "FirstDetail",
                Navigation {
                    target: Detail::entity_type(),
                    foreign_key: "OrderId".into(),
                    is_many: false,
                },
            ))
    }
}

#[derive(Debug, Default)]
pub(crate) struct Buyer {
    pub(crate) id: i64,
}

#[derive(Clone, Copy)]
pub(crate) struct BuyerFields(ParamId);

impl FieldHandle for BuyerFields {
    fn from_param(id: ParamId) -> Self {
        BuyerFields(id)
    }

    fn param_id(&self) -> ParamId {
        self.0
    }
}

impl BuyerFields {
    pub(crate) fn id(&self) -> Expr {
        self.member("Id")
    }
    pub(crate) fn name(&self) -> Expr {
        self.member("Name")
    }
    pub(crate) fn level(&self) -> Expr {
        self.member("Level")
    }
}

impl FieldSource for Buyer {
    fn field_accessors() -> Vec<FieldAccessor<Self>> {
        vec![FieldAccessor { member: "Id", get: |b: &Buyer| b.id.into() }]
    }
}

impl FromRow for Buyer {
    fn from_row(row: &Row) -> crate::error::OrmResult<Self> {
        Ok(Buyer { id: row.get("Id")? })
    }
}

impl Entity for Buyer {
    type Fields = BuyerFields;

    fn entity_map() -> EntityMap {
        EntityMap::new("Buyer", "buyer")
            .member(MemberMap::new("Id", "id").key())
            .member(MemberMap::new("Name", "name"))
            .member(MemberMap::new("Level", "level"))
    }
}

#[derive(Debug, Default)]
pub(crate) struct Detail {
    pub(crate) id: i64,
}

#[derive(Clone, Copy)]
pub(crate) struct DetailFields(ParamId);

impl FieldHandle for DetailFields {
    fn from_param(id: ParamId) -> Self {
        DetailFields(id)
    }

    fn param_id(&self) -> ParamId {
        self.0
    }
}

impl DetailFields {
    pub(crate) fn order_id(&self) -> Expr {
        self.member("OrderId")
    }
    pub(crate) fn amount(&self) -> Expr {
        self.member("Amount")
    }
}

impl FieldSource for Detail {
    fn field_accessors() -> Vec<FieldAccessor<Self>> {
        vec![FieldAccessor { member: "Id", get: |d: &Detail| d.id.into() }]
    }
}

impl FromRow for Detail {
    fn from_row(row: &Row) -> crate::error::OrmResult<Self> {
        Ok(Detail { id: row.get("Id")? })
    }
}

impl Entity for Detail {
    type Fields = DetailFields;

    fn entity_map() -> EntityMap {
        EntityMap::new("Detail", "detail")
            .member(MemberMap::new("Id", "id").key())
            .member(MemberMap::new("OrderId", "order_id"))
            .member(MemberMap::new("Amount", "amount"))
    }
}

pub(crate) const ORDER_COLUMNS: &str = "a.id,a.amount,a.buyer_id,a.shipped_at,a.is_paid,a.remark";


/// Key-only parameter object for `Order`.
pub(crate) struct OrderKey {
    pub(crate) id: i64,
}

impl FieldSource for OrderKey {
    fn field_accessors() -> Vec<FieldAccessor<Self>> {
        vec![FieldAccessor { member: "Id", get: |k: &OrderKey| k.id.into() }]
    }
}

// ==================== Connection ====================

/// Records every command and answers queries from a queue of row sets.
#[derive(Default)]
pub(crate) struct RecordingConnection {
    pub(crate) commands: Mutex<Vec<Command>>,
    results: Mutex<VecDeque<Vec<Row>>>,
    affected: u64,
}

impl RecordingConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn affecting(mut self, rows: u64) -> Self {
        self.affected = rows;
        self
    }

    /// Queue the rows returned by the next `query`.
    pub(crate) fn returning(self, rows: Vec<Row>) -> Self {
        if let Ok(mut results) = self.results.lock() {
            results.push_back(rows);
        }
        self
    }

    pub(crate) fn sql(&self) -> Vec<String> {
        self.commands
            .lock()
            .map(|c| c.iter().map(|c| c.sql.clone()).collect())
            .unwrap_or_default()
    }

    fn record(&self, command: &Command) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.clone());
        }
    }
}

impl Connection for RecordingConnection {
    async fn execute(&self, command: &Command) -> OrmResult<u64> {
        self.record(command);
        Ok(self.affected)
    }

    async fn query(&self, command: &Command) -> OrmResult<Vec<Row>> {
        self.record(command);
        Ok(self
            .results
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_default())
    }
}

pub(crate) fn row(columns: &[&str], values: Vec<crate::value::Value>) -> Row {
    Row::new(columns.iter().map(|c| c.to_string()).collect(), values)
}
