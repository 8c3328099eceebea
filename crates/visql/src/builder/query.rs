use super::Orm;
use crate::command::Command;
use crate::connection::{Connection, query_logged, query_multi_logged};
use crate::error::{OrmError, OrmResult};
use crate::expr::Expr;
use crate::lambda::{Lambda, lambda};
use crate::mapping::Entity;
use crate::row::{FromRow, Row};
use crate::visitor::{BuiltQuery, JoinType, QueryDef, QueryVisitor};
use std::collections::HashMap;
use std::marker::PhantomData;

/// One page of results plus the total row count of the unpaged query.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub items: Vec<R>,
    pub total: u64,
    /// 1-based.
    pub index: u64,
    pub size: u64,
}

impl<R> Page<R> {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.size.max(1))
    }

    pub fn has_next(&self) -> bool {
        self.index < self.total_pages()
    }
}

/// A parent row with the rows of each included navigation, keyed by the
/// navigation member.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<R> {
    pub item: R,
    pub related: HashMap<String, Vec<Row>>,
}

impl<R> Loaded<R> {
    /// Decode the rows loaded for the navigation `member`.
    pub fn related<C: FromRow>(&self, member: &str) -> OrmResult<Vec<C>> {
        self.related
            .get(member)
            .ok_or_else(|| OrmError::invalid_argument(format!("`{member}` was not included")))?
            .iter()
            .map(C::from_row)
            .collect()
    }
}

/// SELECT facade.
#[must_use = "builders do nothing until executed"]
pub struct QueryBuilder<T: Entity> {
    orm: Orm,
    visitor: QueryVisitor,
    _marker: PhantomData<T>,
}

impl<T: Entity> QueryBuilder<T> {
    pub(crate) fn new(orm: Orm) -> Self {
        let visitor = QueryVisitor::new(
            orm.provider.clone(),
            orm.maps.clone(),
            T::entity_type(),
        );
        Self {
            orm,
            visitor,
            _marker: PhantomData,
        }
    }

    fn op(mut self, f: impl FnOnce(&mut QueryVisitor) -> OrmResult<()>) -> OrmResult<Self> {
        f(&mut self.visitor)?;
        Ok(self)
    }

    // ==================== Tables ====================

    /// Read the first table from a derived-table SQL text.
    pub fn from_sql(self, sql: impl Into<String>) -> OrmResult<Self> {
        self.op(|v| v.from_sql(sql))
    }

    /// Add `U` as a comma-joined table.
    pub fn from<U: Entity>(self) -> OrmResult<Self> {
        self.op(|v| v.from(U::entity_type()))
    }

    pub fn inner_join<U: Entity>(self, on: Lambda) -> OrmResult<Self> {
        self.op(|v| v.join(JoinType::Inner, U::entity_type(), &on))
    }

    pub fn left_join<U: Entity>(self, on: Lambda) -> OrmResult<Self> {
        self.op(|v| v.join(JoinType::Left, U::entity_type(), &on))
    }

    pub fn right_join<U: Entity>(self, on: Lambda) -> OrmResult<Self> {
        self.op(|v| v.join(JoinType::Right, U::entity_type(), &on))
    }

    // ==================== Clauses ====================

    pub fn where_(self, predicate: Lambda) -> OrmResult<Self> {
        self.op(|v| v.where_(&predicate))
    }

    pub fn and(self, predicate: Lambda) -> OrmResult<Self> {
        self.op(|v| v.and(&predicate))
    }

    pub fn group_by(self, keys: Lambda) -> OrmResult<Self> {
        self.op(|v| v.group_by(&keys))
    }

    pub fn having(self, predicate: Lambda) -> OrmResult<Self> {
        self.op(|v| v.having(&predicate))
    }

    pub fn order_by(self, key: Lambda) -> OrmResult<Self> {
        self.op(|v| v.order_by(&key, false))
    }

    pub fn order_by_desc(self, key: Lambda) -> OrmResult<Self> {
        self.op(|v| v.order_by(&key, true))
    }

    pub fn select(self, projection: Lambda) -> OrmResult<Self> {
        self.op(|v| v.select(&projection))
    }

    pub fn distinct(mut self) -> Self {
        self.visitor.distinct();
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.visitor.skip(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.visitor.take(n);
        self
    }

    /// Page `index` (1-based) of `size` rows; the command also counts the
    /// unpaged rows.
    pub fn page(self, index: u64, size: u64) -> OrmResult<Self> {
        self.op(|v| v.page(index, size))
    }

    pub fn union(self, query: impl Into<QueryDef>) -> OrmResult<Self> {
        let query = query.into();
        self.op(|v| v.union(&query, false))
    }

    pub fn union_all(self, query: impl Into<QueryDef>) -> OrmResult<Self> {
        let query = query.into();
        self.op(|v| v.union(&query, true))
    }

    /// Eager-load a navigation member; see [`fetch_all_loaded`](Self::fetch_all_loaded).
    pub fn include(self, member: &str) -> OrmResult<Self> {
        self.op(|v| v.include(member))
    }

    // ==================== Output ====================

    pub fn build(self) -> OrmResult<BuiltQuery> {
        self.visitor.build_sql()
    }

    pub fn to_sql(self) -> OrmResult<Command> {
        Ok(self.build()?.command)
    }

    async fn rows<C: Connection>(orm: &Orm, conn: &C, built: &BuiltQuery) -> OrmResult<Vec<Row>> {
        let mut rows = query_logged(conn, orm.config(), "query", &built.command).await?;
        let labels = built.labels();
        for row in &mut rows {
            row.relabel(&labels);
        }
        Ok(rows)
    }

    pub async fn fetch_all<R: FromRow, C: Connection>(self, conn: &C) -> OrmResult<Vec<R>> {
        let orm = self.orm.clone();
        let built = self.build()?;
        if built.is_paged() {
            return Err(OrmError::invalid_argument("paged queries are read with to_page"));
        }
        Self::rows(&orm, conn, &built)
            .await?
            .iter()
            .map(R::from_row)
            .collect()
    }

    pub async fn fetch_first<R: FromRow, C: Connection>(self, conn: &C) -> OrmResult<Option<R>> {
        let orm = self.orm.clone();
        let built = self.build()?;
        Self::rows(&orm, conn, &built)
            .await?
            .first()
            .map(R::from_row)
            .transpose()
    }

    /// `SELECT COUNT(1)` over the current filters.
    pub async fn count<C: Connection>(self, conn: &C) -> OrmResult<i64> {
        let orm = self.orm.clone();
        let built = self.select(lambda::<T>(|_| Expr::count()))?.build()?;
        let rows = query_logged(conn, orm.config(), "count", &built.command).await?;
        match rows.first() {
            Some(row) => row.get_by_index(0),
            None => Ok(0),
        }
    }

    /// Fetch page `index` (1-based) of `size` rows with the total count, in
    /// one command.
    pub async fn to_page<R: FromRow, C: Connection>(
        self,
        conn: &C,
        index: u64,
        size: u64,
    ) -> OrmResult<Page<R>> {
        let orm = self.orm.clone();
        let built = self.page(index, size)?.build()?;
        let mut sets = query_multi_logged(conn, orm.config(), "page", &built.command).await?;
        if sets.len() != 2 {
            return Err(OrmError::Other(format!(
                "paged query returned {} result sets, expected 2",
                sets.len()
            )));
        }
        let mut rows = sets.pop().unwrap_or_default();
        let total: i64 = match sets.pop().unwrap_or_default().first() {
            Some(row) => row.get_by_index(0)?,
            None => 0,
        };
        let labels = built.labels();
        for row in &mut rows {
            row.relabel(&labels);
        }
        Ok(Page {
            items: rows.iter().map(R::from_row).collect::<OrmResult<_>>()?,
            total: u64::try_from(total).unwrap_or(0),
            index: index.max(1),
            size,
        })
    }

    /// Fetch the rows and every included navigation, one secondary query
    /// per navigation. Children are grouped per parent by matching their
    /// foreign key to the parent key.
    pub async fn fetch_all_loaded<R: FromRow, C: Connection>(
        self,
        conn: &C,
    ) -> OrmResult<Vec<Loaded<R>>> {
        let orm = self.orm.clone();
        let built = self.build()?;
        if !built.has_include() {
            return Err(OrmError::invalid_argument("no navigation was included"));
        }
        let rows = Self::rows(&orm, conn, &built).await?;
        let mut loaded_sets = Vec::new();
        for include in built.build_include_sql(&rows)? {
            let mut children = query_logged(conn, orm.config(), "include", &include.command).await?;
            let labels: Vec<String> = include.reader_fields.iter().map(|f| f.label.clone()).collect();
            for child in &mut children {
                child.relabel(&labels);
            }
            loaded_sets.push((include, children));
        }

        rows.iter()
            .map(|row| {
                let mut related: HashMap<String, Vec<Row>> = built
                    .included_members()
                    .map(|member| (member.to_string(), Vec::new()))
                    .collect();
                for (include, children) in &loaded_sets {
                    let key = row.get_value(&include.parent_key);
                    let matching = children
                        .iter()
                        .filter(|child| key.is_some() && child.get_value(&include.foreign_key) == key)
                        .cloned()
                        .collect();
                    related.insert(include.member.clone(), matching);
                }
                Ok(Loaded {
                    item: R::from_row(row)?,
                    related,
                })
            })
            .collect()
    }
}
