//! Parsing for the handler macro.

use syn::meta::ParseNestedMeta;
use syn::{
    Error, FnArg, GenericArgument, ImplItem, ImplItemFn, ItemImpl, LitStr, PathArguments, Result,
    ReturnType, Type, Visibility,
};

/// Arguments passed to `#[handler]`.
#[derive(Debug, Default)]
pub struct HandlerArgs {
    /// Overrides the advertised handler name.
    pub name: Option<String>,
}

impl HandlerArgs {
    pub fn parse(&mut self, meta: ParseNestedMeta) -> Result<()> {
        if meta.path.is_ident("name") {
            let name: LitStr = meta.value()?.parse()?;
            self.name = Some(name.value());
            Ok(())
        } else {
            Err(meta.error("unsupported handler argument, expected `name = \"...\"`"))
        }
    }
}

/// Parsed handler impl block.
#[derive(Debug)]
pub struct HandlerDefinition {
    /// Advertised handler name.
    pub name: String,
    /// Methods recognized as RPC endpoints, in declaration order.
    pub methods: Vec<MethodDefinition>,
    /// Original impl block (re-emitted unchanged).
    pub original: ItemImpl,
}

/// Streaming mode of a method, derived from its arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// `(&self, ctx, request) -> Result<Response, E>`
    Unary,
    /// `(&self, Streaming<T>) -> Result<Response, E>`
    StreamIn,
    /// `(&self, request, Sender<T>) -> Result<(), E>`
    StreamOut,
}

/// Parsed RPC method.
#[derive(Debug)]
pub struct MethodDefinition {
    pub ident: syn::Ident,
    /// Advertised PascalCase name.
    pub rpc_name: String,
    pub kind: MethodKind,
    /// Request type, or the item type of a request stream.
    pub request: Type,
    /// Response type, or the item type of a response stream.
    pub response: Type,
}

impl HandlerDefinition {
    /// Parse an impl block; methods that do not have an RPC shape are skipped.
    pub fn parse(args: HandlerArgs, item: ItemImpl) -> Result<Self> {
        if let Some((_, path, _)) = &item.trait_ {
            return Err(Error::new_spanned(
                path,
                "#[handler] goes on an inherent impl block, not a trait impl",
            ));
        }

        let name = match args.name {
            Some(name) => name,
            None => type_name(&item.self_ty)?,
        };

        let mut methods = Vec::new();
        for impl_item in &item.items {
            if let ImplItem::Fn(method) = impl_item {
                if let Some(method) = MethodDefinition::parse(method)? {
                    methods.push(method);
                }
            }
        }

        Ok(Self {
            name,
            methods,
            original: item,
        })
    }
}

impl MethodDefinition {
    /// Classify a method. `Ok(None)` means it is not an RPC method.
    pub fn parse(method: &ImplItemFn) -> Result<Option<Self>> {
        let sig = &method.sig;
        if !matches!(method.vis, Visibility::Public(_)) || sig.asyncness.is_none() {
            return Ok(None);
        }
        match sig.inputs.first() {
            Some(FnArg::Receiver(recv)) if recv.reference.is_some() && recv.mutability.is_none() => {}
            _ => return Ok(None),
        }

        let args: Vec<&Type> = sig
            .inputs
            .iter()
            .skip(1)
            .filter_map(|arg| match arg {
                FnArg::Typed(pat) => Some(pat.ty.as_ref()),
                FnArg::Receiver(_) => None,
            })
            .collect();

        let (kind, request, response) = match args.as_slice() {
            [stream] => match generic_of(stream, "Streaming") {
                Some(item) => (MethodKind::StreamIn, item, ok_type(&sig.output)?),
                None => return Ok(None),
            },
            [request, last] => match generic_of(last, "Sender") {
                Some(item) => {
                    ok_type(&sig.output)?;
                    (MethodKind::StreamOut, (*request).clone(), item)
                }
                None => (MethodKind::Unary, (*last).clone(), ok_type(&sig.output)?),
            },
            _ => return Ok(None),
        };

        Ok(Some(Self {
            ident: sig.ident.clone(),
            rpc_name: to_pascal_case(&sig.ident.to_string()),
            kind,
            request,
            response,
        }))
    }
}

/// Last path segment of the impl's self type.
fn type_name(ty: &Type) -> Result<String> {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .ok_or_else(|| Error::new_spanned(ty, "expected a named type")),
        _ => Err(Error::new_spanned(
            ty,
            "#[handler] needs a named type; pass `name = \"...\"` otherwise",
        )),
    }
}

/// `T` when `ty` is `Wrapper<T>` (matched on the last path segment).
fn generic_of(ty: &Type, wrapper: &str) -> Option<Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty.clone()),
        _ => None,
    })
}

/// `T` of a `Result<T, E>` return type.
fn ok_type(output: &ReturnType) -> Result<Type> {
    if let ReturnType::Type(_, ty) = output {
        if let Some(ok) = generic_of(ty, "Result") {
            return Ok(ok);
        }
    }
    Err(Error::new_spanned(
        output,
        "RPC methods must return Result<T, E>",
    ))
}

/// Convert snake_case to PascalCase.
pub fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect()
}
