//! Derive macros for trysql
//!
//! Provides `#[derive(Record)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod common;
mod record;

/// Derive the `Record` trait for a struct, so result rows can be decoded into it.
///
/// The struct must also implement `Default`; fields without a matching column keep
/// their default value.
///
/// # Example
///
/// ```ignore
/// use trysql::Record;
///
/// #[derive(Debug, Default, Record)]
/// struct Base {
///     id: i64,
///     created_at: Option<chrono::NaiveDateTime>,
/// }
///
/// #[derive(Debug, Default, Record)]
/// struct User {
///     #[trysql(embed)]
///     base: Option<Box<Base>>,
///     #[trysql(column = "user_name")]
///     name: String,
///     #[trysql(skip)]
///     cached: Vec<String>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[trysql(column = "name")]` - Map field to a different column name
/// - `#[trysql(embed)]` - Promote the fields of a nested record into this one. An
///   `Option<T>` field is filled in on the first matching column.
/// - `#[trysql(skip)]` - Never fill this field from a row
#[proc_macro_derive(Record, attributes(trysql))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
