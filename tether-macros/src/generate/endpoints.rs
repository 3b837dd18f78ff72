//! Generate `Handler::endpoints`.

use proc_macro2::TokenStream;
use quote::quote;

use crate::parse::{HandlerDefinition, MethodKind};

pub fn generate_endpoints(handler: &HandlerDefinition) -> TokenStream {
    let descriptors = handler.methods.iter().map(|method| {
        let rpc_name = &method.rpc_name;
        let request = &method.request;
        let response = &method.response;

        let (kind, response_value) = match method.kind {
            MethodKind::Unary => (
                quote!(Unary),
                quote!(<#response as ::tether_core::Schema>::value(0)),
            ),
            // stream-in endpoints only report success or failure
            MethodKind::StreamIn => (
                quote!(StreamIn),
                quote!(::core::option::Option::Some(::tether_core::error_only_value())),
            ),
            MethodKind::StreamOut => (
                quote!(StreamOut),
                quote!(<#response as ::tether_core::Schema>::value(0)),
            ),
        };

        quote! {
            ::tether_core::EndpointDescriptor::new(
                #rpc_name,
                ::tether_core::EndpointKind::#kind,
                <#request as ::tether_core::Schema>::value(0),
                #response_value,
            )
        }
    });

    quote! {
        fn endpoints(&self) -> ::std::vec::Vec<::tether_core::EndpointDescriptor> {
            ::std::vec![#(#descriptors),*]
        }
    }
}
