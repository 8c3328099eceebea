//! Derive macros for visql
//!
//! Provides `#[derive(Entity)]`, `#[derive(FieldSource)]` and
//! `#[derive(FromRow)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod attrs;
mod entity;
mod field_source;
mod from_row;

/// Derive `Entity` (and `FieldSource`) for a struct.
///
/// # Example
///
/// ```ignore
/// use visql::{Entity, FromRow};
///
/// #[derive(Entity, FromRow)]
/// #[visql(table = "order")]
/// struct Order {
///     #[visql(key, auto_increment)]
///     id: i64,
///     buyer_id: i64,
///     #[visql(column = "note")]
///     remark: Option<String>,
///     #[visql(has_many(Detail, foreign_key = "OrderId"))]
///     details: Vec<Detail>,
/// }
///
/// let l = visql::lambda::<Order>(|o| o.buyer_id().eq(7));
/// ```
///
/// # Generated
///
/// - `OrderFields` - field handle with one method per mapped column
/// - `impl FieldSource for Order` - accessors for mapped columns
/// - `impl Entity for Order` - the entity map
///
/// # Attributes
///
/// - `#[visql(table = "name")]` - table name (default: struct name in snake_case)
/// - `#[visql(key)]` - key member (repeat for composite keys)
/// - `#[visql(auto_increment)]` - generated by the database, skipped on insert
/// - `#[visql(ignore)]` - not mapped to a column
/// - `#[visql(column = "name")]` - column name (default: field name)
/// - `#[visql(member = "Name")]` - member name (default: field name in UpperCamelCase)
/// - `#[visql(native_type = "...")]` - provider type hint for parameters
/// - `#[visql(has_many(Target, foreign_key = "Member"))]`,
///   `#[visql(has_one(...))]` - navigation loaded with `include`
#[proc_macro_derive(Entity, attributes(visql))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    entity::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive `FieldSource` for a parameter object.
///
/// Every named field is bound under its member name; `#[visql(member = "...")]`
/// renames it and `#[visql(ignore)]` skips it.
///
/// ```ignore
/// #[derive(FieldSource)]
/// struct OrderKey {
///     id: i64,
/// }
///
/// orm.delete::<Order>().by_key(&OrderKey { id: 7 })?;
/// ```
#[proc_macro_derive(FieldSource, attributes(visql))]
pub fn derive_field_source(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    field_source::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive `FromRow` for a struct.
///
/// Columns are read by member label, which is what the query facades label
/// rows with. Navigation and ignored fields are set to `Default::default()`.
#[proc_macro_derive(FromRow, attributes(visql))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_row::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
