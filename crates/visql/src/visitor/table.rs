use crate::error::OrmResult;
use crate::mapping::{EntityMap, EntityMapProvider, EntityType};
use std::sync::Arc;

/// How a table joins the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

impl JoinType {
    pub fn sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        }
    }
}

/// One table participating in a statement.
#[derive(Debug, Clone)]
pub struct TableSegment {
    pub entity: EntityType,
    mapper: Option<Arc<EntityMap>>,
    pub alias: String,
    /// `None` for the first table and comma-joined FROM entries.
    pub join_type: Option<JoinType>,
    pub on_sql: Option<String>,
    /// SQL of a derived table standing in for the entity's table.
    pub body: Option<String>,
}

impl TableSegment {
    pub fn new(entity: EntityType, alias: String) -> Self {
        Self {
            entity,
            mapper: None,
            alias,
            join_type: None,
            on_sql: None,
            body: None,
        }
    }

    /// The entity map, fetched on first use.
    pub fn mapper(&mut self, maps: &dyn EntityMapProvider) -> OrmResult<Arc<EntityMap>> {
        if let Some(map) = &self.mapper {
            return Ok(Arc::clone(map));
        }
        let map = maps.entity_map(&self.entity)?;
        self.mapper = Some(Arc::clone(&map));
        Ok(map)
    }

    /// The entity map if already fetched.
    pub fn resolved_mapper(&self) -> Option<&Arc<EntityMap>> {
        self.mapper.as_ref()
    }
}

/// Alias for the table at `index`: `a`, `b`, ..., `z`, then `t26`, `t27`, ...
pub fn alias_for(index: usize) -> String {
    if index < 26 {
        ((b'a' + index as u8) as char).to_string()
    } else {
        format!("t{index}")
    }
}
