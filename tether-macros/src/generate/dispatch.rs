//! Generate `Handler::call`.

use proc_macro2::TokenStream;
use quote::quote;

use crate::parse::{HandlerDefinition, MethodKind};

pub fn generate_call(handler: &HandlerDefinition) -> TokenStream {
    let name = &handler.name;

    let arms = handler.methods.iter().map(|method| {
        let ident = &method.ident;
        let rpc_name = &method.rpc_name;
        let request = &method.request;

        match method.kind {
            MethodKind::Unary => quote! {
                (#rpc_name, ::tether_core::Payload::Unary(body)) => {
                    let request: #request = ::tether_core::wire::from_bytes(&body)?;
                    let response = self
                        .#ident(ctx, request)
                        .await
                        .map_err(::core::convert::Into::<::tether_core::TetherError>::into)?;
                    ::core::result::Result::Ok(::tether_core::wire::to_bytes(&response)?)
                }
            },
            MethodKind::StreamIn => quote! {
                (#rpc_name, ::tether_core::Payload::StreamIn(inbound)) => {
                    let response = self
                        .#ident(::tether_core::Streaming::new(inbound))
                        .await
                        .map_err(::core::convert::Into::<::tether_core::TetherError>::into)?;
                    ::core::result::Result::Ok(::tether_core::wire::to_bytes(&response)?)
                }
            },
            MethodKind::StreamOut => quote! {
                (#rpc_name, ::tether_core::Payload::StreamOut(body, outbound)) => {
                    let request: #request = ::tether_core::wire::from_bytes(&body)?;
                    self.#ident(request, ::tether_core::Sender::new(outbound))
                        .await
                        .map_err(::core::convert::Into::<::tether_core::TetherError>::into)?;
                    ::core::result::Result::Ok(::std::vec::Vec::new())
                }
            },
        }
    });

    let rpc_names: Vec<_> = handler.methods.iter().map(|method| &method.rpc_name).collect();
    let wrong_mode = (!rpc_names.is_empty()).then(|| {
        quote! {
            (#(#rpc_names)|*, _) => ::core::result::Result::Err(
                ::tether_core::TetherError::InvalidRequest(::std::format!(
                    "{}.{} called with the wrong streaming mode",
                    #name,
                    method,
                )),
            ),
        }
    });

    quote! {
        #[allow(unused_variables)]
        fn call<'a>(
            &'a self,
            method: &'a str,
            ctx: ::tether_core::Context,
            payload: ::tether_core::Payload,
        ) -> ::tether_core::__private::BoxFuture<
            'a,
            ::core::result::Result<::std::vec::Vec<u8>, ::tether_core::TetherError>,
        > {
            ::std::boxed::Box::pin(async move {
                match (method, payload) {
                    #(#arms)*
                    #wrong_mode
                    (other, _) => ::core::result::Result::Err(
                        ::tether_core::TetherError::MethodNotFound(::std::format!(
                            "{}.{}",
                            #name,
                            other,
                        )),
                    ),
                }
            })
        }
    }
}
