//! Code generation for the handler macro.

mod dispatch;
mod endpoints;

use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemImpl, Result};

use crate::parse::{HandlerArgs, HandlerDefinition};

/// Re-emit the impl block and add a `Handler` implementation for its type.
pub fn generate_handler(args: HandlerArgs, item: ItemImpl) -> Result<TokenStream> {
    let handler = HandlerDefinition::parse(args, item)?;

    let original = &handler.original;
    let (impl_generics, _, where_clause) = original.generics.split_for_impl();
    let self_ty = &original.self_ty;
    let name = &handler.name;

    let endpoints = endpoints::generate_endpoints(&handler);
    let call = dispatch::generate_call(&handler);

    Ok(quote! {
        #original

        impl #impl_generics ::tether_core::Handler for #self_ty #where_clause {
            fn name(&self) -> &str {
                #name
            }

            #endpoints

            #call
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_handler() {
        let item: ItemImpl = syn::parse_quote! {
            impl Greeter {
                pub async fn hello(&self, ctx: Context, req: Hello) -> Result<Reply, Error> {
                    todo!()
                }
            }
        };

        let tokens = generate_handler(HandlerArgs::default(), item).unwrap();
        let file: syn::File = syn::parse2(tokens).unwrap();
        assert_eq!(file.items.len(), 2);
        assert!(matches!(&file.items[1], syn::Item::Impl(i) if i.trait_.is_some()));
    }

    #[test]
    fn test_handler_without_endpoints() {
        let item: ItemImpl = syn::parse_quote! {
            impl Health {
                pub fn status(&self) -> u8 {
                    0
                }
            }
        };

        let tokens = generate_handler(HandlerArgs::default(), item).unwrap();
        let file: syn::File = syn::parse2(tokens.clone()).unwrap();
        assert_eq!(file.items.len(), 2);
        let tokens = tokens.to_string();
        assert!(tokens.contains(":: std :: vec ! []"));
        assert!(!tokens.contains("wrong streaming mode"));
    }

    #[test]
    fn test_generic_handler_keeps_bounds() {
        let item: ItemImpl = syn::parse_quote! {
            impl<S: Store> Cache<S> where S: Clone {
                pub async fn get(&self, ctx: Context, key: Key) -> Result<Entry, Error> {
                    todo!()
                }
            }
        };

        let tokens = generate_handler(HandlerArgs::default(), item).unwrap().to_string();
        assert!(tokens.contains(":: tether_core :: Handler for Cache < S >"));
        assert!(tokens.contains("\"Cache\""));
    }
}
