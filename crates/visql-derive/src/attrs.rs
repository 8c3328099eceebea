//! `#[visql(...)]` attribute parsing shared by the derives.

use heck::{ToSnakeCase, ToUpperCamelCase};
use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::{Data, DeriveInput, Field, Fields, LitStr, Result};

/// A `has_many(...)` / `has_one(...)` navigation.
pub(crate) struct NavigationAttr {
    pub target: syn::Path,
    /// Member on the target holding this entity's key.
    pub foreign_key: String,
    pub is_many: bool,
}

#[derive(Default)]
pub(crate) struct FieldAttrs {
    pub key: bool,
    pub auto_increment: bool,
    pub ignore: bool,
    pub column: Option<String>,
    pub member: Option<String>,
    pub native_type: Option<String>,
    pub navigation: Option<NavigationAttr>,
}

/// One named field with its resolved member and column names.
pub(crate) struct FieldSpec<'a> {
    pub ident: &'a syn::Ident,
    pub ty: &'a syn::Type,
    pub member: String,
    pub column: String,
    pub attrs: FieldAttrs,
}

impl FieldSpec<'_> {
    /// Whether the field holds a mapped column value (not a navigation or
    /// an ignored field).
    pub fn is_column(&self) -> bool {
        !self.attrs.ignore && self.attrs.navigation.is_none()
    }

    /// Whether the field is `bool` or `Option<bool>`.
    pub fn is_boolean(&self) -> bool {
        is_bool_type(self.ty)
    }
}

fn is_bool_type(ty: &syn::Type) -> bool {
    let syn::Type::Path(path) = ty else {
        return false;
    };
    let Some(last) = path.path.segments.last() else {
        return false;
    };
    if last.ident == "bool" {
        return true;
    }
    if last.ident != "Option" {
        return false;
    }
    match &last.arguments {
        syn::PathArguments::AngleBracketed(args) => matches!(
            args.args.first(),
            Some(syn::GenericArgument::Type(inner)) if is_bool_type(inner)
        ),
        _ => false,
    }
}

pub(crate) fn named_fields<'a>(
    input: &'a DeriveInput,
    derive: &str,
) -> Result<&'a Punctuated<Field, Comma>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(&fields.named),
            _ => Err(syn::Error::new_spanned(
                input,
                format!("{derive} can only be derived for structs with named fields"),
            )),
        },
        _ => Err(syn::Error::new_spanned(
            input,
            format!("{derive} can only be derived for structs"),
        )),
    }
}

fn parse_navigation(meta: &syn::meta::ParseNestedMeta<'_>, is_many: bool) -> Result<NavigationAttr> {
    let mut target = None;
    let mut foreign_key = None;
    meta.parse_nested_meta(|inner| {
        if inner.path.is_ident("foreign_key") {
            foreign_key = Some(inner.value()?.parse::<LitStr>()?.value());
        } else if target.is_none() {
            target = Some(inner.path.clone());
        } else {
            return Err(inner.error("unexpected navigation argument"));
        }
        Ok(())
    })?;
    let target = target.ok_or_else(|| meta.error("navigation requires a target entity"))?;
    let foreign_key =
        foreign_key.ok_or_else(|| meta.error("navigation requires foreign_key = \"...\""))?;
    Ok(NavigationAttr {
        target,
        foreign_key,
        is_many,
    })
}

pub(crate) fn field_attrs(field: &Field) -> Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("visql")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("key") {
                attrs.key = true;
            } else if meta.path.is_ident("auto_increment") {
                attrs.auto_increment = true;
            } else if meta.path.is_ident("ignore") {
                attrs.ignore = true;
            } else if meta.path.is_ident("column") {
                attrs.column = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("member") {
                attrs.member = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("native_type") {
                attrs.native_type = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("has_many") {
                attrs.navigation = Some(parse_navigation(&meta, true)?);
            } else if meta.path.is_ident("has_one") {
                attrs.navigation = Some(parse_navigation(&meta, false)?);
            } else {
                return Err(meta.error("unknown visql field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

/// Fields in declaration order. Member names default to the field name in
/// UpperCamelCase, columns to the field name.
pub(crate) fn field_specs<'a>(input: &'a DeriveInput, derive: &str) -> Result<Vec<FieldSpec<'a>>> {
    named_fields(input, derive)?
        .iter()
        .map(|field| {
            let ident = field
                .ident
                .as_ref()
                .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
            let attrs = field_attrs(field)?;
            let name = ident.to_string();
            let name = name.strip_prefix("r#").unwrap_or(&name);
            Ok(FieldSpec {
                ident,
                ty: &field.ty,
                member: attrs
                    .member
                    .clone()
                    .unwrap_or_else(|| name.to_upper_camel_case()),
                column: attrs.column.clone().unwrap_or_else(|| name.to_string()),
                attrs,
            })
        })
        .collect()
}

/// Table from `#[visql(table = "...")]`, else the struct name in snake_case.
pub(crate) fn table_name(input: &DeriveInput) -> Result<String> {
    let mut table = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("visql")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                table = Some(meta.value()?.parse::<LitStr>()?.value());
                Ok(())
            } else {
                Err(meta.error("unknown visql struct attribute"))
            }
        })?;
    }
    Ok(table.unwrap_or_else(|| input.ident.to_string().to_snake_case()))
}
