//! Entity mapping metadata.
//!
//! An [`EntityMap`] describes how one Rust type maps onto a table: the table
//! name, the ordered [`MemberMap`]s and which of them form the key. Maps are
//! normally produced by `#[derive(Entity)]` and resolved at runtime through an
//! [`EntityMapProvider`], by default the process-wide [`MapRegistry`].

use crate::error::{OrmError, OrmResult};
use crate::expr::{Expr, ParamId};
use crate::row::FromRow;
use crate::value::Value;
use dashmap::DashMap;
use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Identity of a mapped Rust type.
#[derive(Clone, Copy)]
pub struct EntityType {
    id: TypeId,
    name: &'static str,
    build: fn() -> EntityMap,
}

impl EntityType {
    pub fn of<T: Entity>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            build: T::entity_map,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified Rust type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Unqualified type name, used in error messages.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }

    pub(crate) fn build_map(&self) -> EntityMap {
        (self.build)()
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityType {}

impl std::hash::Hash for EntityType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityType").field(&self.name).finish()
    }
}

/// A has-one/has-many relation declared on an entity.
#[derive(Debug, Clone)]
pub struct Navigation {
    /// The related entity.
    pub target: EntityType,
    /// Member on the target entity that holds the parent key.
    pub foreign_key: String,
    /// Whether the relation yields a collection.
    pub is_many: bool,
}

/// Per-member mapping metadata.
#[derive(Debug, Clone)]
pub struct MemberMap {
    pub member_name: String,
    pub field_name: String,
    pub is_key: bool,
    pub is_auto_increment: bool,
    pub is_ignored: bool,
    pub navigation: Option<Navigation>,
    pub native_type: Option<String>,
    /// The member holds a boolean and may stand alone as a condition.
    pub is_boolean: bool,
}

impl MemberMap {
    /// A plain column mapping.
    pub fn new(member_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            member_name: member_name.into(),
            field_name: field_name.into(),
            is_key: false,
            is_auto_increment: false,
            is_ignored: false,
            navigation: None,
            native_type: None,
            is_boolean: false,
        }
    }

    /// A relation member; it never maps to a column.
    pub fn navigation(member_name: impl Into<String>, navigation: Navigation) -> Self {
        let member_name = member_name.into();
        Self {
            field_name: member_name.clone(),
            member_name,
            is_key: false,
            is_auto_increment: false,
            is_ignored: false,
            navigation: Some(navigation),
            native_type: None,
            is_boolean: false,
        }
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.is_auto_increment = true;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.is_ignored = true;
        self
    }

    pub fn boolean(mut self) -> Self {
        self.is_boolean = true;
        self
    }

    pub fn native_type(mut self, native_type: impl Into<String>) -> Self {
        self.native_type = Some(native_type.into());
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.navigation.is_some()
    }

    /// Whether the member is backed by a column.
    pub fn is_column(&self) -> bool {
        !self.is_ignored && self.navigation.is_none()
    }

    /// Whether an INSERT writes this member.
    pub fn is_insertable(&self) -> bool {
        self.is_column() && !self.is_auto_increment
    }
}

/// Per-entity mapping metadata.
#[derive(Debug, Clone)]
pub struct EntityMap {
    pub type_name: String,
    pub table_name: String,
    members: Vec<Arc<MemberMap>>,
}

impl EntityMap {
    pub fn new(type_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table_name: table_name.into(),
            members: Vec::new(),
        }
    }

    /// Append a member, keeping declaration order.
    pub fn member(mut self, member: MemberMap) -> Self {
        self.members.push(Arc::new(member));
        self
    }

    pub fn members(&self) -> &[Arc<MemberMap>] {
        &self.members
    }

    /// Members that map to columns, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &Arc<MemberMap>> {
        self.members.iter().filter(|m| m.is_column())
    }

    pub fn key_members(&self) -> impl Iterator<Item = &Arc<MemberMap>> {
        self.members.iter().filter(|m| m.is_key && m.is_column())
    }

    pub fn is_auto_increment(&self) -> bool {
        self.members.iter().any(|m| m.is_auto_increment)
    }

    pub fn auto_increment_field(&self) -> Option<&Arc<MemberMap>> {
        self.members.iter().find(|m| m.is_auto_increment)
    }

    pub fn try_member(&self, name: &str) -> Option<&Arc<MemberMap>> {
        self.members.iter().find(|m| m.member_name == name)
    }

    /// Like [`try_member`](Self::try_member) but names the missing member.
    pub fn member_or_err(&self, name: &str) -> OrmResult<&Arc<MemberMap>> {
        self.try_member(name)
            .ok_or_else(|| OrmError::missing_member(&self.type_name, name))
    }

    /// Reject duplicate member names and keyless auto-increment setups.
    pub fn validate(&self) -> OrmResult<()> {
        let mut seen = HashSet::with_capacity(self.members.len());
        for member in &self.members {
            if !seen.insert(member.member_name.as_str()) {
                return Err(OrmError::Mapping(format!(
                    "duplicate member '{}' on entity '{}'",
                    member.member_name, self.type_name
                )));
            }
        }
        if self.members.iter().filter(|m| m.is_auto_increment).count() > 1 {
            return Err(OrmError::Mapping(format!(
                "entity '{}' declares more than one auto-increment member",
                self.type_name
            )));
        }
        Ok(())
    }
}

/// Reads one member of a value as a [`Value`].
pub struct FieldAccessor<T: ?Sized> {
    pub member: &'static str,
    pub get: fn(&T) -> Value,
}

impl<T: ?Sized> Clone for FieldAccessor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for FieldAccessor<T> {}

impl<T: ?Sized> fmt::Debug for FieldAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("member", &self.member)
            .finish()
    }
}

/// A type whose named members can be bound as command parameters.
///
/// `#[derive(FieldSource)]` generates the accessor table; entities get it from
/// `#[derive(Entity)]`.
pub trait FieldSource: Send + Sync + 'static {
    fn field_accessors() -> Vec<FieldAccessor<Self>>;
}

/// Field handles handed to lambda bodies (`OrderFields`, ...).
pub trait FieldHandle {
    fn from_param(id: ParamId) -> Self;

    fn param_id(&self) -> ParamId;

    /// The whole parameter, e.g. to project every column of its table.
    fn this(&self) -> Expr {
        Expr::Parameter(self.param_id())
    }

    /// Member access by name, for members without a generated accessor.
    fn member(&self, name: &str) -> Expr {
        Expr::member(self.param_id(), name)
    }
}

/// A mapped entity type.
pub trait Entity: FieldSource + FromRow + Sized {
    type Fields: FieldHandle;

    fn entity_map() -> EntityMap;

    fn entity_type() -> EntityType {
        EntityType::of::<Self>()
    }
}

/// Source of entity maps consumed by the visitors.
pub trait EntityMapProvider: Send + Sync {
    fn entity_map(&self, entity: &EntityType) -> OrmResult<Arc<EntityMap>>;
}

/// Process-wide entity map store.
///
/// Maps are built on first use from the entity's derived metadata and cached
/// for the lifetime of the registry. [`register`](Self::register) overrides
/// the derived map for a type.
#[derive(Debug, Default)]
pub struct MapRegistry {
    maps: DashMap<TypeId, Arc<EntityMap>>,
}

impl MapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an explicit map for `T`, replacing any cached one.
    pub fn register<T: Entity>(&self, map: EntityMap) -> OrmResult<()> {
        map.validate()?;
        self.maps.insert(TypeId::of::<T>(), Arc::new(map));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl EntityMapProvider for MapRegistry {
    fn entity_map(&self, entity: &EntityType) -> OrmResult<Arc<EntityMap>> {
        if let Some(map) = self.maps.get(&entity.type_id()) {
            return Ok(Arc::clone(&map));
        }
        let map = entity.build_map();
        map.validate()?;
        let map = self
            .maps
            .entry(entity.type_id())
            .or_insert_with(|| Arc::new(map));
        Ok(Arc::clone(&map))
    }
}
