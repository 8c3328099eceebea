//! Entity derive macro implementation
//!
//! Generates, for `struct Order`:
//!
//! - `OrderFields`: the field handle lambda bodies receive, with one method
//!   per mapped column returning its member-access `Expr`;
//! - `impl FieldSource for Order`;
//! - `impl Entity for Order` with the `EntityMap` built from the field
//!   attributes.

use crate::attrs::{FieldSpec, field_specs, table_name};
use crate::field_source::field_source_impl;
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{DeriveInput, Result};

fn member_map(field: &FieldSpec<'_>) -> TokenStream {
    let member = &field.member;
    let column = &field.column;
    if let Some(nav) = &field.attrs.navigation {
        let target = &nav.target;
        let foreign_key = &nav.foreign_key;
        let is_many = nav.is_many;
        return quote! {
            ::visql::MemberMap::navigation(#member, ::visql::Navigation {
                target: <#target as ::visql::Entity>::entity_type(),
                foreign_key: ::std::string::String::from(#foreign_key),
                is_many: #is_many,
            })
        };
    }
    let mut map = quote! { ::visql::MemberMap::new(#member, #column) };
    if field.attrs.key {
        map = quote! { #map.key() };
    }
    if field.attrs.auto_increment {
        map = quote! { #map.auto_increment() };
    }
    if field.attrs.ignore {
        map = quote! { #map.ignored() };
    }
    if field.is_boolean() {
        map = quote! { #map.boolean() };
    }
    if let Some(native) = &field.attrs.native_type {
        map = quote! { #map.native_type(#native) };
    }
    map
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }
    let name = &input.ident;
    let vis = &input.vis;
    let fields = field_specs(&input, "Entity")?;
    let table = table_name(&input)?;
    let type_name = name.to_string();
    let handle = format_ident!("{}Fields", name);

    let handle_methods = fields.iter().filter(|f| f.is_column()).map(|f| {
        let ident = f.ident;
        let member = &f.member;
        let doc = format!("`{}` (column `{}`).", f.member, f.column);
        quote! {
            #[doc = #doc]
            pub fn #ident(&self) -> ::visql::Expr {
                ::visql::Expr::member(self.0, #member)
            }
        }
    });
    let members = fields.iter().map(member_map);
    let field_source = field_source_impl(&input, &fields);
    let handle_doc = format!("Field handle of [`{type_name}`] for lambda bodies.");

    Ok(quote! {
        #[doc = #handle_doc]
        #[derive(Clone, Copy, Debug)]
        #vis struct #handle(::visql::ParamId);

        impl ::visql::FieldHandle for #handle {
            fn from_param(id: ::visql::ParamId) -> Self {
                #handle(id)
            }

            fn param_id(&self) -> ::visql::ParamId {
                self.0
            }
        }

        impl #handle {
            #(#handle_methods)*
        }

        #field_source

        impl ::visql::Entity for #name {
            type Fields = #handle;

            fn entity_map() -> ::visql::EntityMap {
                ::visql::EntityMap::new(#type_name, #table)
                    #(.member(#members))*
            }
        }
    })
}
