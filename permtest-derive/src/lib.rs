//! # Permtest Derive
//!
//! Procedural macros for the permtest permission conformance framework.
//!
//! Test discovery happens at build time: the macros generate the tables the runner reads
//! instead of inspecting types while running.
//!
//! ## Macros
//!
//! - `#[permtest::module(...)]` - Declares a struct as a permission test module
//! - `#[permtest::tests]` - Collects the `#[permission_test(...)]` methods of an impl block
//! - `#[permtest::main]` - Generates the `run()` function returning every registered module
//!
//! These macros are automatically re-exported by the main `permtest` crate,
//! so users typically don't need to import this crate directly.

extern crate proc_macro;

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{
    parse::Parse, parse_macro_input, punctuated::Punctuated, Expr, ExprArray,
    ExprLit, FnArg, ImplItem, ImplItemFn, ItemFn, ItemImpl, ItemStruct, Lit, LitStr, Meta,
    ReturnType, Signature, Token, Type,
};

fn lit_str(expr: &Expr) -> syn::Result<LitStr> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Ok(s.clone()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn lit_bool(expr: &Expr) -> syn::Result<bool> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Bool(b), ..
        }) => Ok(b.value),
        other => Err(syn::Error::new_spanned(other, "expected a boolean literal")),
    }
}

fn str_array(expr: &Expr) -> syn::Result<Vec<LitStr>> {
    match expr {
        Expr::Array(ExprArray { elems, .. }) => elems.iter().map(lit_str).collect(),
        other => Err(syn::Error::new_spanned(
            other,
            "expected an array of string literals",
        )),
    }
}

/// Represents arguments in the module attribute
/// `#[module(name = "..", label = "..", prflabel = "..", priority = 1, sync)]`.
#[derive(Default)]
struct ModuleArgs {
    name: Option<LitStr>,
    label: Option<LitStr>,
    prflabel: Option<LitStr>,
    priority: Option<Expr>,
    sync: bool,
}

impl Parse for ModuleArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut args = ModuleArgs::default();
        for meta in Punctuated::<Meta, Token![,]>::parse_terminated(input)? {
            match &meta {
                Meta::Path(path) if path.is_ident("sync") => args.sync = true,
                Meta::NameValue(nv) if nv.path.is_ident("sync") => args.sync = lit_bool(&nv.value)?,
                Meta::NameValue(nv) if nv.path.is_ident("name") => {
                    args.name = Some(lit_str(&nv.value)?)
                }
                Meta::NameValue(nv) if nv.path.is_ident("label") => {
                    args.label = Some(lit_str(&nv.value)?)
                }
                Meta::NameValue(nv) if nv.path.is_ident("prflabel") => {
                    args.prflabel = Some(lit_str(&nv.value)?)
                }
                Meta::NameValue(nv) if nv.path.is_ident("priority") => {
                    args.priority = Some(nv.value.clone())
                }
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "unknown module argument; expected name, label, prflabel, priority or sync",
                    ))
                }
            }
        }
        Ok(args)
    }
}

/// Represents arguments in the field attribute
/// `#[preference(label = "..", key = "..", default = false)]`.
struct PreferenceArgs {
    label: LitStr,
    key: Option<LitStr>,
    default: bool,
}

impl Parse for PreferenceArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut label = None;
        let mut key = None;
        let mut default = false;
        for meta in Punctuated::<Meta, Token![,]>::parse_terminated(input)? {
            match &meta {
                Meta::NameValue(nv) if nv.path.is_ident("label") => label = Some(lit_str(&nv.value)?),
                Meta::NameValue(nv) if nv.path.is_ident("key") => key = Some(lit_str(&nv.value)?),
                Meta::NameValue(nv) if nv.path.is_ident("default") => default = lit_bool(&nv.value)?,
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "unknown preference argument; expected label, key or default",
                    ))
                }
            }
        }
        let label = label.ok_or_else(|| input.error("preference requires a label"))?;
        Ok(PreferenceArgs {
            label,
            key,
            default,
        })
    }
}

/// Represents arguments in the method attribute
/// `#[permission_test("CAMERA", sdk_min = 28, required = ["..."], ignore)]`.
struct PermissionTestArgs {
    permission: LitStr,
    sdk_min: Option<Expr>,
    sdk_max: Option<Expr>,
    required: Vec<LitStr>,
    requested: Vec<LitStr>,
    development_protection: bool,
    ignore: bool,
}

impl Parse for PermissionTestArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let permission: LitStr = input.parse()?;
        let mut args = PermissionTestArgs {
            permission,
            sdk_min: None,
            sdk_max: None,
            required: Vec::new(),
            requested: Vec::new(),
            development_protection: false,
            ignore: false,
        };
        if input.is_empty() {
            return Ok(args);
        }
        input.parse::<Token![,]>()?;

        for meta in Punctuated::<Meta, Token![,]>::parse_terminated(input)? {
            match &meta {
                Meta::Path(path) if path.is_ident("development_protection") => {
                    args.development_protection = true
                }
                Meta::Path(path) if path.is_ident("ignore") => args.ignore = true,
                Meta::NameValue(nv) if nv.path.is_ident("development_protection") => {
                    args.development_protection = lit_bool(&nv.value)?
                }
                Meta::NameValue(nv) if nv.path.is_ident("ignore") => args.ignore = lit_bool(&nv.value)?,
                Meta::NameValue(nv) if nv.path.is_ident("sdk_min") => {
                    args.sdk_min = Some(nv.value.clone())
                }
                Meta::NameValue(nv) if nv.path.is_ident("sdk_max") => {
                    args.sdk_max = Some(nv.value.clone())
                }
                Meta::NameValue(nv) if nv.path.is_ident("required") => {
                    args.required = str_array(&nv.value)?
                }
                Meta::NameValue(nv) if nv.path.is_ident("requested") => {
                    args.requested = str_array(&nv.value)?
                }
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "unknown permission_test argument",
                    ))
                }
            }
        }
        Ok(args)
    }
}

/// Builds the `TestDescriptor` expression of a test method.
fn descriptor_tokens(args: &PermissionTestArgs, method: &str) -> proc_macro2::TokenStream {
    let permission = &args.permission;
    let mut tokens = quote! { ::permtest::TestDescriptor::new(#permission, #method) };
    if let Some(sdk_min) = &args.sdk_min {
        tokens = quote! { #tokens.sdk_min(#sdk_min) };
    }
    if let Some(sdk_max) = &args.sdk_max {
        tokens = quote! { #tokens.sdk_max(#sdk_max) };
    }
    if !args.required.is_empty() {
        let required = &args.required;
        tokens = quote! { #tokens.required([#(#required),*]) };
    }
    if !args.requested.is_empty() {
        let requested = &args.requested;
        tokens = quote! { #tokens.requested([#(#requested),*]) };
    }
    if args.development_protection {
        tokens = quote! { #tokens.development_protection(true) };
    }
    if args.ignore {
        tokens = quote! { #tokens.ignore(true) };
    }
    tokens
}

#[derive(Debug, Eq, PartialEq)]
enum ErrorCrate {
    /// `ProbeResult` or anything else the type checker has to accept as is.
    Probe,
    /// `eyre::Result` or `anyhow::Result`, converted into a probe failure.
    Foreign,
}

/// Inspects a test method's signature to determine which result type it returns.
///
/// Due to the inherent limitations of proc macros, `eyre` and `anyhow` results are only
/// detected when referenced by their fully qualified path (for example, `eyre::Result`).
fn inspect_error_crate(sig: &Signature) -> syn::Result<ErrorCrate> {
    match &sig.output {
        ReturnType::Default => Err(syn::Error::new_spanned(
            sig,
            "permission tests must return permtest::ProbeResult",
        )),
        ReturnType::Type(_, ty) => {
            let Type::Path(type_path) = ty.as_ref() else {
                return Ok(ErrorCrate::Probe);
            };

            let path = &type_path.path;
            match (path.segments.first(), path.segments.last()) {
                (Some(first), Some(last))
                    if (first.ident == "eyre" || first.ident == "anyhow")
                        && last.ident == "Result" =>
                {
                    Ok(ErrorCrate::Foreign)
                }
                _ => Ok(ErrorCrate::Probe),
            }
        }
    }
}

/// Test methods take `&self` and nothing else.
fn check_receiver(sig: &Signature) -> syn::Result<()> {
    if sig.asyncness.is_some() {
        return Err(syn::Error::new_spanned(
            sig,
            "permission tests run on their own thread and can not be async",
        ));
    }
    match (sig.inputs.first(), sig.inputs.len()) {
        (Some(FnArg::Receiver(receiver)), 1)
            if receiver.reference.is_some() && receiver.mutability.is_none() =>
        {
            Ok(())
        }
        _ => Err(syn::Error::new_spanned(
            &sig.inputs,
            "permission tests take `&self` and no other arguments",
        )),
    }
}

fn test_case_tokens(
    args: &PermissionTestArgs,
    method: &ImplItemFn,
) -> syn::Result<proc_macro2::TokenStream> {
    check_receiver(&method.sig)?;
    let ident = &method.sig.ident;
    let descriptor = descriptor_tokens(args, &ident.to_string());
    let run = match inspect_error_crate(&method.sig)? {
        ErrorCrate::Probe => quote! { Self::#ident },
        ErrorCrate::Foreign => quote! {
            |module: &Self| module.#ident().map_err(::permtest::ProbeError::from)
        },
    };
    Ok(quote! { ::permtest::TestCase::new(#descriptor, #run) })
}

/// Declares a struct as a permission test module.
///
/// The struct has to implement `Default` and `permtest::PermissionModule`. Its test methods
/// are declared with [`macro@tests`].
///
/// # Usage
///
/// ```rust,ignore
/// #[permtest::module(name = "Core Test Cases", label = "Run Core Tests", priority = 1)]
/// #[derive(Default)]
/// struct CoreTestModule {
///     #[preference(label = "Enable runtime confirmation", key = "core_enable_runtime")]
///     enable_runtime: bool,
/// }
/// ```
///
/// # Arguments
///
/// - `name` - display name, defaults to the struct name
/// - `label`, `prflabel` - button and settings labels
/// - `priority` - sort key of the "all modules" suite
/// - `sync` - run the module's tests one at a time
///
/// Fields can declare boolean preferences with `#[preference(label, key, default)]`. The key
/// defaults to the field name.
#[proc_macro_attribute]
pub fn module(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as ModuleArgs);
    let mut item = parse_macro_input!(input as ItemStruct);

    if !item.generics.params.is_empty() {
        return syn::Error::new_spanned(&item.generics, "permission test modules can not be generic")
            .to_compile_error()
            .into();
    }

    let mut preferences = Vec::new();
    for field in item.fields.iter_mut() {
        let Some(pos) = field
            .attrs
            .iter()
            .position(|attr| attr.path().is_ident("preference"))
        else {
            continue;
        };
        let attr = field.attrs.remove(pos);
        let preference = match attr.parse_args::<PreferenceArgs>() {
            Ok(preference) => preference,
            Err(e) => return e.to_compile_error().into(),
        };
        let label = preference.label;
        let key = preference.key.map(|k| k.value()).unwrap_or_else(|| {
            field
                .ident
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        });
        let default = preference.default;
        preferences.push(quote! { ::permtest::PreferenceDecl::bool(#label, #key, #default) });
    }

    let ident = &item.ident;
    let type_name = ident.to_string();
    let name = args
        .name
        .map(|name| name.value())
        .unwrap_or_else(|| type_name.clone());
    let label = args
        .label
        .map(|label| label.value())
        .unwrap_or_else(|| "module label".into());
    let prflabel = args
        .prflabel
        .map(|prflabel| prflabel.value())
        .unwrap_or_else(|| "prflabel".into());
    let priority = args.priority.unwrap_or_else(|| syn::parse_quote!(0));
    let sync = args.sync;

    let output = quote! {
        #item

        impl ::permtest::ModuleMetadata for #ident {
            fn declaration() -> ::permtest::ModuleDeclaration {
                ::permtest::ModuleDeclaration {
                    name: #name.into(),
                    label: #label.into(),
                    prflabel: #prflabel.into(),
                    priority: #priority,
                    sync: #sync,
                }
            }

            fn preferences() -> ::std::vec::Vec<::permtest::PreferenceDecl> {
                ::std::vec![#(#preferences),*]
            }
        }

        // Submit module to inventory for discovery
        ::permtest::inventory::submit! {
            ::permtest::ModuleRegistration {
                name: #type_name,
                factory: || ::permtest::Module::new(<#ident as ::std::default::Default>::default()),
            }
        }
    };

    output.into()
}

/// Collects the test methods of a module.
///
/// Every method annotated with `#[permission_test("PERMISSION", ...)]` becomes a test case,
/// in declaration order. Methods take `&self` and return `permtest::ProbeResult`;
/// `eyre::Result<()>` and `anyhow::Result<()>` are accepted too and fail the test with the
/// returned error.
///
/// # Usage
///
/// ```rust,ignore
/// #[permtest::tests]
/// impl CoreTestModule {
///     #[permission_test("CAMERA", sdk_min = 28)]
///     fn test_camera(&self) -> permtest::ProbeResult {
///         camera::open(0)?;
///         Ok(())
///     }
///
///     #[permission_test("BLUETOOTH_SCAN", required = ["BLUETOOTH_CONNECT"], ignore)]
///     fn test_bluetooth_scan(&self) -> eyre::Result<()> {
///         Ok(())
///     }
/// }
/// ```
///
/// # Arguments
///
/// - the permission, bare names are put in the `android.permission` namespace
/// - `sdk_min`, `sdk_max` - supported SDK range, inclusive
/// - `required` - permissions that have to be granted for the test to run
/// - `requested` - permissions the test asks for
/// - `development_protection` - the permission is development protected
/// - `ignore` - always report the test as bypassed
#[proc_macro_attribute]
pub fn tests(_args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item = parse_macro_input!(input as ItemImpl);

    let mut cases = Vec::new();
    for impl_item in item.items.iter_mut() {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let Some(pos) = method
            .attrs
            .iter()
            .position(|attr| attr.path().is_ident("permission_test"))
        else {
            continue;
        };
        let attr = method.attrs.remove(pos);
        let case = attr
            .parse_args::<PermissionTestArgs>()
            .and_then(|args| test_case_tokens(&args, method));
        match case {
            Ok(case) => cases.push(case),
            Err(e) => return e.to_compile_error().into(),
        }
    }

    let self_ty = &item.self_ty;
    let (impl_generics, _, where_clause) = item.generics.split_for_impl();
    let output = quote! {
        #item

        impl #impl_generics ::permtest::PermissionTests for #self_ty #where_clause {
            fn test_cases() -> ::std::vec::Vec<::permtest::TestCase<Self>> {
                ::std::vec![#(#cases),*]
            }
        }
    };

    output.into()
}

/// Generates the module discovery code for permtest.
///
/// This attribute should be applied to your main function alongside `#[tokio::main]`.
/// It generates a `run()` function returning a `permtest::Catalog` of every struct
/// declared with `#[permtest::module]` in the binary.
///
/// # Usage
///
/// ```rust,ignore
/// #[permtest::main]
/// #[tokio::main]
/// async fn main() -> eyre::Result<()> {
///     let catalog = run();
///     let app = permtest::App::new();
///     app.run(catalog).await?;
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn main(_args: TokenStream, input: TokenStream) -> TokenStream {
    let main_fn = parse_macro_input!(input as ItemFn);
    let run = format_ident!("run", span = main_fn.sig.ident.span());

    let output = quote! {
        fn #run() -> ::permtest::Catalog {
            let mut catalog = ::permtest::Catalog::new();

            // Use inventory to discover all registered modules
            for module in ::permtest::inventory::iter::<::permtest::ModuleRegistration> {
                catalog.add_module(module.name, module.factory);
            }

            catalog
        }

        #main_fn
    };

    output.into()
}

#[cfg(test)]
mod test {
    use super::{ErrorCrate, ModuleArgs, PermissionTestArgs, PreferenceArgs};
    use quote::quote;
    use test_case::test_case;

    #[test_case("fn foo(&self) -> ProbeResult" => ErrorCrate::Probe; "probe result")]
    #[test_case("fn foo(&self) -> permtest::ProbeResult" => ErrorCrate::Probe; "qualified probe result")]
    #[test_case("fn foo(&self) -> eyre::Result<()>" => ErrorCrate::Foreign; "eyre")]
    #[test_case("fn foo(&self) -> anyhow::Result<()>" => ErrorCrate::Foreign; "anyhow")]
    #[test_case("fn foo(&self) -> Result<(), ProbeError>" => ErrorCrate::Probe; "std result")]
    fn inspect_error_crate(s: &str) -> ErrorCrate {
        let sig: syn::Signature = syn::parse_str(s).expect("failed to parse function signature");
        super::inspect_error_crate(&sig).expect("failed to inspect return type")
    }

    #[test]
    fn unit_return_is_rejected() {
        let sig: syn::Signature = syn::parse_str("fn foo(&self)").unwrap();
        assert!(super::inspect_error_crate(&sig).is_err());
    }

    #[test_case("fn foo(&self) -> ProbeResult" => true; "shared receiver")]
    #[test_case("fn foo(&mut self) -> ProbeResult" => false; "mutable receiver")]
    #[test_case("fn foo() -> ProbeResult" => false; "no receiver")]
    #[test_case("fn foo(&self, a: u32) -> ProbeResult" => false; "extra argument")]
    #[test_case("async fn foo(&self) -> ProbeResult" => false; "async")]
    fn check_receiver(s: &str) -> bool {
        let sig: syn::Signature = syn::parse_str(s).expect("failed to parse function signature");
        super::check_receiver(&sig).is_ok()
    }

    #[test_case("" => ("".to_string(), false, "".to_string()); "empty")]
    #[test_case("name = \"Core Test Cases\", priority = 1" => ("Core Test Cases".to_string(), false, "1".to_string()); "name and priority")]
    #[test_case("sync" => ("".to_string(), true, "".to_string()); "sync flag")]
    #[test_case("sync = false, label = \"Run\"" => ("".to_string(), false, "".to_string()); "sync false")]
    fn module_args(s: &str) -> (String, bool, String) {
        let args: ModuleArgs = syn::parse_str(s).expect("failed to parse module args");
        let priority = args.priority.map(|p| quote!(#p).to_string());
        (
            args.name.map(|n| n.value()).unwrap_or_default(),
            args.sync,
            priority.unwrap_or_default(),
        )
    }

    #[test]
    fn unknown_module_arg() {
        assert!(syn::parse_str::<ModuleArgs>("flavor = \"x\"").is_err());
    }

    #[test]
    fn preference_args() {
        let args: PreferenceArgs =
            syn::parse_str("label = \"Enable\", default = true").expect("failed to parse");
        assert_eq!(args.label.value(), "Enable");
        assert!(args.key.is_none());
        assert!(args.default);
        assert!(syn::parse_str::<PreferenceArgs>("key = \"k\"").is_err());
    }

    #[test_case("\"CAMERA\"" => quote! {
        ::permtest::TestDescriptor::new("CAMERA", "test_foo")
    }.to_string(); "permission only")]
    #[test_case("\"CAMERA\", sdk_min = 28, sdk_max = 33" => quote! {
        ::permtest::TestDescriptor::new("CAMERA", "test_foo").sdk_min(28).sdk_max(33)
    }.to_string(); "sdk range")]
    #[test_case("\"BLUETOOTH_SCAN\", required = [\"BLUETOOTH_CONNECT\"], requested = [\"A\", \"B\"]" => quote! {
        ::permtest::TestDescriptor::new("BLUETOOTH_SCAN", "test_foo")
            .required(["BLUETOOTH_CONNECT"])
            .requested(["A", "B"])
    }.to_string(); "permission lists")]
    #[test_case("\"WRITE_SECURE_SETTINGS\", development_protection, ignore" => quote! {
        ::permtest::TestDescriptor::new("WRITE_SECURE_SETTINGS", "test_foo")
            .development_protection(true)
            .ignore(true)
    }.to_string(); "flags")]
    fn descriptor(s: &str) -> String {
        let args: PermissionTestArgs = syn::parse_str(s).expect("failed to parse test args");
        super::descriptor_tokens(&args, "test_foo").to_string()
    }

    #[test_case("required = [\"A\"]"; "missing permission")]
    #[test_case("\"CAMERA\", required = \"A\""; "required is not an array")]
    #[test_case("\"CAMERA\", sdk = 3"; "unknown argument")]
    fn invalid_permission_test_args(s: &str) {
        assert!(syn::parse_str::<PermissionTestArgs>(s).is_err());
    }
}
