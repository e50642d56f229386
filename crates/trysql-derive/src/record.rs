//! Record derive macro implementation

use crate::common::syn_types::option_inner;
use heck::ToSnakeCase;
use proc_macro2::{Literal, TokenStream};
use quote::quote;
use syn::{Data, DeriveInput, Fields, Result};

/// Parsed `#[trysql(...)]` field attribute.
#[derive(Default)]
struct FieldAttr {
    column: Option<String>,
    embed: bool,
    skip: bool,
}

impl syn::parse::Parse for FieldAttr {
    fn parse(input: syn::parse::ParseStream) -> Result<Self> {
        let mut attr = FieldAttr::default();

        while !input.is_empty() {
            let ident: syn::Ident = input.parse()?;
            if ident == "embed" {
                attr.embed = true;
            } else if ident == "skip" {
                attr.skip = true;
            } else if ident == "column" {
                let _: syn::Token![=] = input.parse()?;
                let value: syn::LitStr = input.parse()?;
                attr.column = Some(value.value());
            } else {
                return Err(syn::Error::new_spanned(
                    &ident,
                    "expected one of `column = \"...\"`, `embed`, `skip`",
                ));
            }

            if input.peek(syn::Token![,]) {
                let _: syn::Token![,] = input.parse()?;
            } else {
                break;
            }
        }

        if !input.is_empty() {
            return Err(input.error("unexpected tokens in #[trysql(...)]"));
        }
        Ok(attr)
    }
}

fn field_attr(field: &syn::Field) -> Result<FieldAttr> {
    let mut merged = FieldAttr::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("trysql") {
            continue;
        }
        let parsed: FieldAttr = attr.parse_args()?;
        merged.embed |= parsed.embed;
        merged.skip |= parsed.skip;
        if parsed.column.is_some() {
            merged.column = parsed.column;
        }
    }
    if merged.embed && merged.column.is_some() {
        return Err(syn::Error::new_spanned(
            field,
            "an embedded record has no column of its own",
        ));
    }
    Ok(merged)
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Record can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Record can only be derived for structs",
            ));
        }
    };

    let mut nodes = Vec::new();
    let mut arms = Vec::new();

    for field in fields {
        let attr = field_attr(field)?;
        if attr.skip {
            continue;
        }

        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let field_name = ident.to_string();
        let field_name = field_name.trim_start_matches("r#");
        let index = Literal::usize_unsuffixed(nodes.len());

        if attr.embed {
            let (nested, optional) = match option_inner(&field.ty) {
                Some(inner) => (inner, true),
                None => (&field.ty, false),
            };
            nodes.push(quote! {
                ::trysql::FieldNode::branch(
                    #field_name,
                    <#nested as ::trysql::Record>::fields,
                )
            });
            let target = if optional {
                quote! { self.#ident.get_or_insert_with(::core::default::Default::default) }
            } else {
                quote! { &mut self.#ident }
            };
            arms.push(quote! {
                [#index, rest @ ..] => ::trysql::Record::set_field(#target, rest, value),
            });
        } else {
            let column = attr
                .column
                .unwrap_or_else(|| field_name.to_snake_case());
            nodes.push(quote! {
                ::trysql::FieldNode::leaf(#field_name, #column)
            });
            arms.push(quote! {
                [#index] => {
                    self.#ident = ::trysql::FromValue::from_value(value)
                        .map_err(|e| ::trysql::TrySqlError::decode(#column, e))?;
                    Ok(())
                }
            });
        }
    }

    let count = nodes.len();
    let record_name = name.to_string();

    Ok(quote! {
        impl ::trysql::Record for #name {
            fn fields() -> &'static [::trysql::FieldNode] {
                static FIELDS: [::trysql::FieldNode; #count] = [#(#nodes),*];
                &FIELDS
            }

            #[allow(unused_variables)]
            fn set_field(
                &mut self,
                path: &[usize],
                value: ::trysql::Value,
            ) -> ::trysql::SqlResult<()> {
                match path {
                    #(#arms)*
                    _ => Err(::trysql::row::invalid_field_path(#record_name, path)),
                }
            }
        }
    })
}
