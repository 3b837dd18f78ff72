//! `#[derive(Schema)]`.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{parse_quote, Attribute, Data, DeriveInput, Error, Fields, GenericParam, LitStr, Result};

/// Field or type options read from `#[schema(..)]` and `#[serde(..)]`.
#[derive(Debug, Default)]
struct Options {
    rename: Option<String>,
    skip: bool,
}

impl Options {
    fn from_attrs(attrs: &[Attribute]) -> Result<Self> {
        let mut options = Self::default();
        for attr in attrs {
            let own = attr.path().is_ident("schema");
            if !own && !attr.path().is_ident("serde") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let name = if meta.input.peek(syn::token::Paren) {
                        // rename(serialize = "..", deserialize = "..")
                        let mut serialized = None;
                        meta.parse_nested_meta(|inner| {
                            let value: LitStr = inner.value()?.parse()?;
                            if inner.path.is_ident("serialize") {
                                serialized = Some(value.value());
                            }
                            Ok(())
                        })?;
                        serialized
                    } else {
                        let name: LitStr = meta.value()?.parse()?;
                        Some(name.value())
                    };
                    // #[schema] wins over #[serde]
                    if let Some(name) = name {
                        if own || options.rename.is_none() {
                            options.rename = Some(name);
                        }
                    }
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                    options.skip = true;
                } else if own {
                    return Err(meta.error("unsupported schema attribute"));
                } else if meta.input.peek(syn::Token![=]) {
                    // other serde options are not ours to validate
                    let _: syn::Expr = meta.value()?.parse()?;
                } else if meta.input.peek(syn::token::Paren) {
                    meta.parse_nested_meta(|_| Ok(()))?;
                }
                Ok(())
            })?;
        }
        Ok(options)
    }
}

pub fn derive_schema(mut input: DeriveInput) -> Result<TokenStream> {
    let ident = &input.ident;
    let type_name = Options::from_attrs(&input.attrs)?
        .rename
        .unwrap_or_else(|| ident.to_string());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => {
                let mut pushes = Vec::new();
                for field in &named.named {
                    let options = Options::from_attrs(&field.attrs)?;
                    if options.skip {
                        continue;
                    }
                    let name = match options.rename {
                        Some(name) => name,
                        None => field
                            .ident
                            .as_ref()
                            .map(|i| i.to_string().trim_start_matches("r#").to_string())
                            .unwrap_or_default(),
                    };
                    let ty = &field.ty;
                    pushes.push(quote! {
                        ::tether_core::push_field::<#ty>(&mut values, #name, depth);
                    });
                }
                pushes
            }
            // positional fields have no name to advertise
            Fields::Unnamed(_) | Fields::Unit => Vec::new(),
        },
        Data::Enum(_) => Vec::new(),
        Data::Union(_) => {
            return Err(Error::new_spanned(
                ident,
                "Schema cannot be derived for unions",
            ))
        }
    };

    for param in &mut input.generics.params {
        if let GenericParam::Type(param) = param {
            param.bounds.push(parse_quote!(::tether_core::Schema));
        }
    }
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields_fn = if fields.is_empty() {
        TokenStream::new()
    } else {
        quote! {
            fn fields(depth: usize) -> ::std::vec::Vec<::tether_core::Value> {
                let mut values = ::std::vec::Vec::new();
                #(#fields)*
                values
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::tether_core::Schema for #ident #ty_generics #where_clause {
            fn type_name() -> ::std::string::String {
                ::std::string::String::from(#type_name)
            }

            #fields_fn
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(input: DeriveInput) -> String {
        derive_schema(input).unwrap().to_string()
    }

    #[test]
    fn test_named_fields() {
        let out = expand(parse_quote! {
            struct HelloRequest {
                name: String,
                tags: Vec<String>,
            }
        });
        assert!(out.contains("String :: from (\"HelloRequest\")"));
        assert!(out.contains("push_field :: < String > (& mut values , \"name\" , depth)"));
        assert!(out.contains("\"tags\""));
    }

    #[test]
    fn test_rename_and_skip() {
        let out = expand(parse_quote! {
            #[serde(rename = "Greeting")]
            struct Hello {
                #[serde(rename = "fullName")]
                name: String,
                #[schema(skip)]
                cache: Vec<u8>,
                #[serde(default, skip_serializing)]
                secret: String,
                #[serde(rename = "ignored")]
                #[schema(rename = "kept")]
                both: u32,
            }
        });
        assert!(out.contains("\"Greeting\""));
        assert!(out.contains("\"fullName\""));
        assert!(!out.contains("\"cache\""));
        assert!(!out.contains("\"secret\""));
        assert!(out.contains("\"kept\""));
        assert!(!out.contains("\"ignored\""));
    }

    #[test]
    fn test_serde_rename_per_direction() {
        let out = expand(parse_quote! {
            struct Hello {
                #[serde(rename(serialize = "outName", deserialize = "inName"))]
                name: String,
                #[serde(rename(deserialize = "inOnly"))]
                id: u64,
            }
        });
        assert!(out.contains("\"outName\""));
        assert!(!out.contains("\"inName\""));
        assert!(!out.contains("\"inOnly\""));
        assert!(out.contains("\"id\""));
    }

    #[test]
    fn test_tuple_struct_has_no_fields() {
        let out = expand(parse_quote! {
            struct Id(u64);
        });
        assert!(!out.contains("fn fields"));
    }

    #[test]
    fn test_generic_params_are_bounded() {
        let out = expand(parse_quote! {
            struct Page<T> {
                items: Vec<T>,
            }
        });
        assert!(out.contains("T : :: tether_core :: Schema"));
    }

    #[test]
    fn test_union_is_rejected() {
        let input: DeriveInput = parse_quote! {
            union Bits { a: u32, b: f32 }
        };
        assert!(derive_schema(input).is_err());
    }

    #[test]
    fn test_unknown_schema_attribute() {
        let input: DeriveInput = parse_quote! {
            struct Hello {
                #[schema(flatten)]
                name: String,
            }
        };
        assert!(derive_schema(input).is_err());
    }
}
