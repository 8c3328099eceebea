//! FromRow derive macro implementation

use crate::attrs::field_specs;
use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Result};

/// Rows are read by member label; navigation and ignored fields start from
/// `Default`.
pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let fields = field_specs(&input, "FromRow")?;

    let field_extracts = fields.iter().map(|f| {
        let ident = f.ident;
        if f.is_column() {
            let member = &f.member;
            quote! { #ident: row.get(#member)? }
        } else {
            quote! { #ident: ::core::default::Default::default() }
        }
    });

    Ok(quote! {
        impl #impl_generics ::visql::FromRow for #name #ty_generics #where_clause {
            fn from_row(row: &::visql::Row) -> ::visql::OrmResult<Self> {
                Ok(Self {
                    #(#field_extracts),*
                })
            }
        }
    })
}
