//! FieldSource derive macro implementation

use crate::attrs::{FieldSpec, field_specs};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Result};

/// The `impl FieldSource` block for `fields` that hold column values.
pub(crate) fn field_source_impl(input: &DeriveInput, fields: &[FieldSpec<'_>]) -> TokenStream {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let accessors = fields.iter().filter(|f| f.is_column()).map(|f| {
        let ident = f.ident;
        let member = &f.member;
        quote! {
            ::visql::FieldAccessor {
                member: #member,
                get: |source: &Self| ::visql::Value::from(::core::clone::Clone::clone(&source.#ident)),
            }
        }
    });
    quote! {
        impl #impl_generics ::visql::FieldSource for #name #ty_generics #where_clause {
            fn field_accessors() -> ::std::vec::Vec<::visql::FieldAccessor<Self>> {
                ::std::vec![#(#accessors),*]
            }
        }
    }
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let fields = field_specs(&input, "FieldSource")?;
    Ok(field_source_impl(&input, &fields))
}
