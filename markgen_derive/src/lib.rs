//! Marker attributes recognised by markgen plugins.
//!
//! The attributes generate nothing themselves. They keep annotated code
//! compiling and check that each marker sits on the kind of item its plugin
//! expects. Arguments are validated by the plugins at generation time.

use proc_macro::TokenStream;
use quote::ToTokens;
use syn::{FnArg, Item, parse_macro_input};

fn expect_item(item: Item, marker: &str, accepts: fn(&Item) -> bool, expected: &str) -> TokenStream {
    if accepts(&item) {
        return item.into_token_stream().into();
    }
    syn::Error::new_spanned(&item, format!("#[{}] can only be used on {}", marker, expected))
        .to_compile_error()
        .into()
}

/// Marks a fieldless enum as a set of bit flags.
#[proc_macro_attribute]
pub fn nice_flags(_args: TokenStream, input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as Item);
    expect_item(item, "nice_flags", |i| matches!(i, Item::Enum(_)), "enums")
}

/// Marks a struct for `with_<field>` copy methods.
#[proc_macro_attribute]
pub fn data_object(_args: TokenStream, input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as Item);
    expect_item(
        item,
        "data_object",
        |i| matches!(i, Item::Struct(s) if matches!(s.fields, syn::Fields::Named(_))),
        "structs with named fields",
    )
}

/// Registers a function as the parser of its output type.
#[proc_macro_attribute]
pub fn parser(_args: TokenStream, input: TokenStream) -> TokenStream {
    let item = parse_macro_input!(input as Item);
    expect_item(item, "parser", |i| matches!(i, Item::Fn(_)), "functions")
}

/// Exposes a function as a terminal command.
///
/// Parameters may carry `#[argument(parser = "..")]`; those attributes are
/// removed here since Rust has no parameter attribute macros.
#[proc_macro_attribute]
pub fn command(_args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item = parse_macro_input!(input as Item);
    if let Item::Fn(function) = &mut item {
        for input in function.sig.inputs.iter_mut() {
            if let FnArg::Typed(pat) = input {
                pat.attrs.retain(|attr| !attr.path().is_ident("argument"));
            }
        }
    }
    expect_item(item, "command", |i| matches!(i, Item::Fn(_)), "functions")
}
