//! Fixed-shape command compilation.
//!
//! A [`CommandShape`] is the SQL layout of one command kind for one entity:
//! literal text interleaved with parameter slots. Typed sources bind slots
//! through their derived [`FieldAccessor`] table; dictionary sources look each
//! member up by name on every call.

use super::{Command, CommandKind, DbParameter};
use crate::error::{OrmError, OrmResult};
use crate::mapping::{EntityMap, FieldAccessor, FieldSource, MemberMap};
use crate::provider::OrmProvider;
use crate::value::Value;
use std::collections::HashMap;

const DICTIONARY_SOURCE: &str = "HashMap<String, Value>";

#[derive(Debug, Clone)]
enum Piece {
    Text(String),
    Param(usize),
}

#[derive(Debug, Clone)]
struct BoundMember {
    member: String,
    native_type: Option<String>,
}

/// SQL layout of a fixed-shape command.
///
/// Rendered as `head`, then the `row` pieces once per input row joined by
/// `separator`, then `tail`. `bind_only` members are bound without appearing
/// in the rendered text (raw SQL already names them).
#[derive(Debug, Clone, Default)]
pub(crate) struct CommandShape {
    head: String,
    row: Vec<Piece>,
    separator: &'static str,
    tail: String,
    members: Vec<BoundMember>,
    bind_only: Vec<usize>,
}

impl CommandShape {
    fn text(&mut self, text: &str) {
        match self.row.last_mut() {
            Some(Piece::Text(last)) => last.push_str(text),
            _ => self.row.push(Piece::Text(text.to_string())),
        }
    }

    fn slot(&mut self, member: &MemberMap) -> usize {
        if let Some(index) = self
            .members
            .iter()
            .position(|m| m.member == member.member_name)
        {
            return index;
        }
        self.members.push(BoundMember {
            member: member.member_name.clone(),
            native_type: member.native_type.clone(),
        });
        self.members.len() - 1
    }

    fn param(&mut self, member: &MemberMap) {
        let index = self.slot(member);
        self.row.push(Piece::Param(index));
    }

    fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.member.as_str())
    }

    /// Render for `rows` input rows. Batched shapes suffix parameter names
    /// with `_<row>`.
    fn render(
        &self,
        provider: &dyn OrmProvider,
        rows: usize,
        batched: bool,
        mut value: impl FnMut(usize, usize) -> OrmResult<Value>,
    ) -> OrmResult<Command> {
        let prefix = provider.parameter_prefix();
        let name = |member: &str, row: usize| {
            if batched {
                format!("{prefix}{member}_{row}")
            } else {
                format!("{prefix}{member}")
            }
        };
        let mut sql = self.head.clone();
        let mut parameters: Vec<DbParameter> = Vec::new();
        for row in 0..rows {
            if row > 0 {
                sql.push_str(self.separator);
            }
            for piece in &self.row {
                match piece {
                    Piece::Text(text) => sql.push_str(text),
                    Piece::Param(index) => {
                        let member = &self.members[*index];
                        let name = name(&member.member, row);
                        sql.push_str(&name);
                        if !parameters.iter().any(|p| p.name == name) {
                            let v = value(row, *index)?;
                            parameters.push(provider.create_parameter(
                                name,
                                v,
                                member.native_type.as_deref(),
                            ));
                        }
                    }
                }
            }
        }
        sql.push_str(&self.tail);
        for index in &self.bind_only {
            let member = &self.members[*index];
            let v = value(0, *index)?;
            parameters.push(provider.create_parameter(
                name(&member.member, 0),
                v,
                member.native_type.as_deref(),
            ));
        }
        Ok(Command::new(sql, parameters))
    }
}

/// Describes the source a shape is compiled against.
struct Source<'a> {
    type_name: &'a str,
    has: &'a dyn Fn(&str) -> bool,
}

impl Source<'_> {
    fn require(&self, map: &EntityMap, member: &MemberMap) -> OrmResult<()> {
        if (self.has)(&member.member_name) {
            Ok(())
        } else {
            Err(OrmError::missing_field(
                self.type_name,
                &map.type_name,
                &member.member_name,
            ))
        }
    }
}

fn key_members(map: &EntityMap) -> OrmResult<Vec<&MemberMap>> {
    let keys: Vec<&MemberMap> = map.key_members().map(|m| m.as_ref()).collect();
    if keys.is_empty() {
        return Err(OrmError::Mapping(format!(
            "entity '{}' has no key member",
            map.type_name
        )));
    }
    Ok(keys)
}

fn where_keys(shape: &mut CommandShape, provider: &dyn OrmProvider, keys: &[&MemberMap]) {
    shape.text(" WHERE ");
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            shape.text(" AND ");
        }
        shape.text(&format!("{}=", provider.field_name(&key.field_name)));
        shape.param(key);
    }
}

fn insert_shape(
    provider: &dyn OrmProvider,
    map: &EntityMap,
    source: &Source<'_>,
    batched: bool,
) -> OrmResult<CommandShape> {
    let columns: Vec<&MemberMap> = map
        .columns()
        .map(|m| m.as_ref())
        .filter(|m| m.is_insertable() && (source.has)(&m.member_name))
        .collect();
    if columns.is_empty() {
        return Err(OrmError::invalid_argument(format!(
            "{} provides no insertable member of '{}'",
            source.type_name, map.type_name
        )));
    }
    let mut shape = CommandShape {
        separator: ";",
        ..CommandShape::default()
    };
    let names: Vec<String> = columns
        .iter()
        .map(|m| provider.field_name(&m.field_name))
        .collect();
    shape.text(&format!(
        "INSERT INTO {} ({}) VALUES(",
        provider.table_name(&map.table_name),
        names.join(",")
    ));
    for (i, member) in columns.iter().enumerate() {
        if i > 0 {
            shape.text(",");
        }
        shape.param(member);
    }
    shape.text(")");
    if !batched {
        if let Some(identity) = map.auto_increment_field() {
            shape.tail = provider.select_identity_sql(identity);
        }
    }
    Ok(shape)
}

fn delete_shape(
    provider: &dyn OrmProvider,
    map: &EntityMap,
    source: &Source<'_>,
    batched: bool,
) -> OrmResult<CommandShape> {
    let keys = key_members(map)?;
    for key in &keys {
        source.require(map, key)?;
    }
    let table = provider.table_name(&map.table_name);
    let mut shape = CommandShape::default();
    match (batched, keys.as_slice()) {
        (true, [key]) => {
            shape.head = format!(
                "DELETE FROM {table} WHERE {} IN (",
                provider.field_name(&key.field_name)
            );
            shape.param(key);
            shape.separator = ",";
            shape.tail = ")".to_string();
        }
        _ => {
            shape.separator = ";";
            shape.text(&format!("DELETE FROM {table}"));
            where_keys(&mut shape, provider, &keys);
        }
    }
    Ok(shape)
}

fn get_shape(
    provider: &dyn OrmProvider,
    map: &EntityMap,
    source: &Source<'_>,
) -> OrmResult<CommandShape> {
    let keys = key_members(map)?;
    for key in &keys {
        source.require(map, key)?;
    }
    let mut shape = CommandShape::default();
    shape.text(&format!(
        "SELECT {} FROM {}",
        select_list(provider, map),
        provider.table_name(&map.table_name)
    ));
    where_keys(&mut shape, provider, &keys);
    Ok(shape)
}

fn update_shape(
    provider: &dyn OrmProvider,
    map: &EntityMap,
    source: &Source<'_>,
) -> OrmResult<CommandShape> {
    let keys = key_members(map)?;
    for key in &keys {
        source.require(map, key)?;
    }
    let assigned: Vec<&MemberMap> = map
        .columns()
        .map(|m| m.as_ref())
        .filter(|m| !m.is_key && !m.is_auto_increment && (source.has)(&m.member_name))
        .collect();
    if assigned.is_empty() {
        return Err(OrmError::invalid_argument(format!(
            "{} provides no updatable member of '{}'",
            source.type_name, map.type_name
        )));
    }
    let mut shape = CommandShape::default();
    shape.text(&format!("UPDATE {} SET ", provider.table_name(&map.table_name)));
    for (i, member) in assigned.iter().enumerate() {
        if i > 0 {
            shape.text(",");
        }
        shape.text(&format!("{}=", provider.field_name(&member.field_name)));
        shape.param(member);
    }
    where_keys(&mut shape, provider, &keys);
    Ok(shape)
}

fn raw_shape<'a>(
    provider: &dyn OrmProvider,
    sql: &str,
    members: impl Iterator<Item = &'a str>,
) -> OrmResult<CommandShape> {
    if sql.trim().is_empty() {
        return Err(OrmError::invalid_argument("SQL text is empty"));
    }
    let prefix = provider.parameter_prefix();
    let mut shape = CommandShape {
        head: sql.to_string(),
        ..CommandShape::default()
    };
    for member in members {
        if contains_token(sql, &format!("{prefix}{member}")) {
            shape.members.push(BoundMember {
                member: member.to_string(),
                native_type: None,
            });
            shape.bind_only.push(shape.members.len() - 1);
        }
    }
    Ok(shape)
}

/// Column list of a by-key SELECT, in declaration order.
pub(crate) fn select_list(provider: &dyn OrmProvider, map: &EntityMap) -> String {
    map.columns()
        .map(|m| provider.field_name(&m.field_name))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether `name` occurs in `sql` not followed by another identifier character.
fn contains_token(sql: &str, name: &str) -> bool {
    sql.match_indices(name).any(|(at, _)| {
        sql[at + name.len()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
    })
}

fn compile_shape(
    kind: CommandKind,
    provider: &dyn OrmProvider,
    map: &EntityMap,
    source: &Source<'_>,
    sql: Option<&str>,
    member_names: &[&str],
) -> OrmResult<CommandShape> {
    match kind {
        CommandKind::Insert => insert_shape(provider, map, source, false),
        CommandKind::InsertBatch => insert_shape(provider, map, source, true),
        CommandKind::Delete => delete_shape(provider, map, source, false),
        CommandKind::DeleteBatch => delete_shape(provider, map, source, true),
        CommandKind::Get => get_shape(provider, map, source),
        CommandKind::UpdateBy => update_shape(provider, map, source),
        CommandKind::RawSql => {
            let sql = sql.ok_or_else(|| OrmError::invalid_argument("raw SQL command without SQL"))?;
            raw_shape(provider, sql, member_names.iter().copied())
        }
    }
}

/// A compiled command initializer for parameter type `P`.
pub struct TypedInitializer<P> {
    kind: CommandKind,
    shape: CommandShape,
    accessors: Vec<FieldAccessor<P>>,
}

impl<P> std::fmt::Debug for TypedInitializer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedInitializer")
            .field("kind", &self.kind)
            .field("members", &self.shape.member_names().collect::<Vec<_>>())
            .finish()
    }
}

impl<P: FieldSource> TypedInitializer<P> {
    pub fn compile(
        kind: CommandKind,
        provider: &dyn OrmProvider,
        map: &EntityMap,
        sql: Option<&str>,
    ) -> OrmResult<Self> {
        let all = P::field_accessors();
        let names: Vec<&str> = all.iter().map(|a| a.member).collect();
        let has = |member: &str| names.contains(&member);
        let source = Source {
            type_name: std::any::type_name::<P>(),
            has: &has,
        };
        let shape = compile_shape(kind, provider, map, &source, sql, &names)?;
        let accessors = shape
            .member_names()
            .map(|member| {
                all.iter()
                    .find(|a| a.member == member)
                    .copied()
                    .ok_or_else(|| OrmError::missing_field(source.type_name, &map.type_name, member))
            })
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(Self {
            kind,
            shape,
            accessors,
        })
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Build the command for one value.
    pub fn init(&self, provider: &dyn OrmProvider, source: &P) -> OrmResult<Command> {
        self.shape
            .render(provider, 1, false, |_, slot| Ok((self.accessors[slot].get)(source)))
    }

    /// Build one batched command for `rows`.
    pub fn init_batch(&self, provider: &dyn OrmProvider, rows: &[P]) -> OrmResult<Command> {
        if rows.is_empty() {
            return Err(OrmError::invalid_argument("batch is empty"));
        }
        self.shape.render(provider, rows.len(), true, |row, slot| {
            Ok((self.accessors[slot].get)(&rows[row]))
        })
    }
}

fn lookup(map: &EntityMap, values: &HashMap<String, Value>, member: &str) -> OrmResult<Value> {
    values
        .get(member)
        .cloned()
        .ok_or_else(|| OrmError::missing_field(DICTIONARY_SOURCE, &map.type_name, member))
}

/// Build a command from a dictionary of member values. Never cached: the
/// shape depends on which keys are present.
pub fn init_from_map(
    kind: CommandKind,
    provider: &dyn OrmProvider,
    map: &EntityMap,
    values: &HashMap<String, Value>,
    sql: Option<&str>,
) -> OrmResult<Command> {
    let has = |member: &str| values.contains_key(member);
    let source = Source {
        type_name: DICTIONARY_SOURCE,
        has: &has,
    };
    let names: Vec<&str> = values.keys().map(String::as_str).collect();
    let shape = compile_shape(kind, provider, map, &source, sql, &names)?;
    if kind.is_batch() {
        return shape.render(provider, 1, true, |_, slot| {
            lookup(map, values, &shape.members[slot].member)
        });
    }
    shape.render(provider, 1, false, |_, slot| {
        lookup(map, values, &shape.members[slot].member)
    })
}

/// Build one batched command from dictionaries; the first row decides the
/// column set and every later row must provide it.
pub fn init_batch_from_maps(
    kind: CommandKind,
    provider: &dyn OrmProvider,
    map: &EntityMap,
    rows: &[HashMap<String, Value>],
) -> OrmResult<Command> {
    let first = rows
        .first()
        .ok_or_else(|| OrmError::invalid_argument("batch is empty"))?;
    let has = |member: &str| first.contains_key(member);
    let source = Source {
        type_name: DICTIONARY_SOURCE,
        has: &has,
    };
    let shape = compile_shape(kind, provider, map, &source, None, &[])?;
    shape.render(provider, rows.len(), true, |row, slot| {
        lookup(map, &rows[row], &shape.members[slot].member)
    })
}

/// Key parameters for a by-key command from a dictionary, in key order.
pub(crate) fn key_parameters(
    provider: &dyn OrmProvider,
    map: &EntityMap,
    values: &HashMap<String, Value>,
) -> OrmResult<Vec<DbParameter>> {
    let prefix = provider.parameter_prefix();
    key_members(map)?
        .into_iter()
        .map(|key| {
            let value = lookup(map, values, &key.member_name)?;
            Ok(provider.create_parameter(
                format!("{prefix}{}", key.member_name),
                value,
                key.native_type.as_deref(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MemberMap;
    use crate::provider::{MySqlProvider, OracleProvider, PostgreSqlProvider};

    struct Order {
        id: i64,
        amount: i32,
        buyer_id: i64,
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

    fn order_map() -> EntityMap {
        EntityMap::new("Order", "order")
            .member(MemberMap::new("Id", "id").key().auto_increment())
            .member(MemberMap::new("Amount", "amount"))
            .member(MemberMap::new("BuyerId", "buyer_id"))
    }

    fn line_map() -> EntityMap {
        EntityMap::new("OrderLine", "order_line")
            .member(MemberMap::new("OrderId", "order_id").key())
            .member(MemberMap::new("LineNo", "line_no").key())
            .member(MemberMap::new("Qty", "qty"))
    }

    fn order(id: i64) -> Order {
        Order {
            id,
            amount: 10,
            buyer_id: 5,
        }
    }

    #[test]
    fn insert_skips_auto_increment_and_appends_identity() {
        let provider = MySqlProvider::new();
        let init = TypedInitializer::<Order>::compile(CommandKind::Insert, &provider, &order_map(), None)
            .unwrap();
        let cmd = init.init(&provider, &order(0)).unwrap();
        assert_eq!(
            cmd.sql,
            "INSERT INTO order (amount,buyer_id) VALUES(@Amount,@BuyerId);SELECT LAST_INSERT_ID()"
        );
        assert_eq!(cmd.parameter("@BuyerId"), Some(&Value::Int(5)));
        assert_eq!(cmd.parameters.len(), 2);
    }

    #[test]
    fn postgres_insert_returns_key() {
        let provider = PostgreSqlProvider::new();
        let init = TypedInitializer::<Order>::compile(CommandKind::Insert, &provider, &order_map(), None)
            .unwrap();
        let cmd = init.init(&provider, &order(0)).unwrap();
        assert!(cmd.sql.ends_with(" RETURNING id"), "{}", cmd.sql);
    }

    #[test]
    fn single_key_batch_delete_uses_in_list() {
        let provider = MySqlProvider::new();
        let init =
            TypedInitializer::<Order>::compile(CommandKind::DeleteBatch, &provider, &order_map(), None)
                .unwrap();
        let cmd = init
            .init_batch(&provider, &[order(1), order(2), order(3)])
            .unwrap();
        assert_eq!(cmd.sql, "DELETE FROM order WHERE id IN (@Id_0,@Id_1,@Id_2)");
        assert_eq!(cmd.parameter("@Id_2"), Some(&Value::Int(3)));
    }

    #[test]
    fn composite_key_batch_delete_emits_one_statement_per_row() {
        let provider = MySqlProvider::new();
        let rows: Vec<HashMap<String, Value>> = (0..3)
            .map(|i| {
                HashMap::from([
                    ("OrderId".to_string(), Value::Int(7)),
                    ("LineNo".to_string(), Value::Int(i)),
                ])
            })
            .collect();
        let cmd =
            init_batch_from_maps(CommandKind::DeleteBatch, &provider, &line_map(), &rows).unwrap();
        assert_eq!(cmd.statements().count(), 3);
        assert_eq!(
            cmd.sql,
            "DELETE FROM order_line WHERE order_id=@OrderId_0 AND line_no=@LineNo_0;\
             DELETE FROM order_line WHERE order_id=@OrderId_1 AND line_no=@LineNo_1;\
             DELETE FROM order_line WHERE order_id=@OrderId_2 AND line_no=@LineNo_2"
        );
        assert_eq!(cmd.parameters.len(), 6);
    }

    #[test]
    fn missing_key_member_names_the_source() {
        let provider = MySqlProvider::new();
        let values = HashMap::from([("Qty".to_string(), Value::Int(1))]);
        let err = init_from_map(CommandKind::Delete, &provider, &line_map(), &values, None)
            .unwrap_err();
        match err {
            OrmError::MissingField {
                source_type,
                member,
                ..
            } => {
                assert_eq!(source_type, DICTIONARY_SOURCE);
                assert_eq!(member, "OrderId");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn raw_sql_binds_only_whole_tokens() {
        let provider = MySqlProvider::new();
        let init = TypedInitializer::<Order>::compile(
            CommandKind::RawSql,
            &provider,
            &order_map(),
            Some("SELECT * FROM order WHERE id=@Id OR buyer_id=@BuyerIdX"),
        )
        .unwrap();
        let cmd = init.init(&provider, &order(9)).unwrap();
        assert_eq!(cmd.parameters.len(), 1);
        assert_eq!(cmd.parameter("@Id"), Some(&Value::Int(9)));
    }

    #[test]
    fn update_by_sets_non_key_columns() {
        let provider = OracleProvider::new();
        let init =
            TypedInitializer::<Order>::compile(CommandKind::UpdateBy, &provider, &order_map(), None)
                .unwrap();
        let cmd = init.init(&provider, &order(4)).unwrap();
        assert_eq!(
            cmd.sql,
            "UPDATE order SET amount=:Amount,buyer_id=:BuyerId WHERE id=:Id"
        );
    }

    #[test]
    fn get_selects_all_columns_by_key() {
        let provider = MySqlProvider::new();
        let values = HashMap::from([("Id".to_string(), Value::Int(1))]);
        let cmd = init_from_map(CommandKind::Get, &provider, &order_map(), &values, None).unwrap();
        assert_eq!(cmd.sql, "SELECT id,amount,buyer_id FROM order WHERE id=@Id");
    }
}
