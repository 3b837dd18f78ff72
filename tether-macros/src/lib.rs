//! # tether-macros
//!
//! Proc macros for the tether RPC framework.
//!
//! - `#[handler]` turns an inherent impl block into a `tether_core::Handler`,
//!   deriving the advertised endpoints from the method signatures.
//! - `#[derive(Schema)]` describes a request or response type for endpoint
//!   advertisement.
//!
//! Generated code refers to `::tether_core`, so crates using these macros
//! depend on `tether-core` directly.

mod generate;
mod parse;
mod schema;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput, ItemImpl};

/// Serve the `pub async fn` methods of an impl block as RPC endpoints.
///
/// Methods are classified by their parameters (receiver included):
///
/// | signature | endpoint |
/// |---|---|
/// | `(&self, ctx: Context, req: Req) -> Result<Resp, E>` | unary |
/// | `(&self, req: Req, tx: Sender<Item>) -> Result<(), E>` | server stream (`streamOut`) |
/// | `(&self, rx: Streaming<Item>) -> Result<Resp, E>` | client stream (`streamIn`) |
///
/// Anything else is left alone and not advertised. Endpoints are named
/// `"<Type>.<Method>"` with the method in PascalCase; `E` must convert into
/// `TetherError`, and request/response types implement `Schema` and rkyv's
/// `Archive`/`Serialize`/`Deserialize`.
///
/// ## Example
///
/// ```rust,ignore
/// use tether_core::{Context, TetherError};
///
/// pub struct Greeter;
///
/// #[tether_macros::handler]
/// impl Greeter {
///     pub async fn say_hello(&self, ctx: Context, req: HelloRequest) -> Result<HelloReply, TetherError> {
///         Ok(HelloReply { message: format!("hello {}", req.name) })
///     }
/// }
/// // advertised as "Greeter.SayHello"
/// ```
///
/// `#[handler(name = "Other")]` overrides the type name.
#[proc_macro_attribute]
pub fn handler(attr: TokenStream, input: TokenStream) -> TokenStream {
    let mut args = parse::HandlerArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(meta));
    parse_macro_input!(attr with parser);
    let item = parse_macro_input!(input as ItemImpl);

    match generate::generate_handler(args, item) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derive `tether_core::Schema` for a struct or enum.
///
/// Named struct fields are listed under their name, honoring
/// `#[serde(rename = "..")]` and `#[schema(rename = "..")]`; fields marked
/// `skip` are omitted, as are positional fields.
#[proc_macro_derive(Schema, attributes(schema))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match schema::derive_schema(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
