//! `#[test_timeout::timeout]` runs a synchronous test body on a watchdog
//! thread and fails the test if it has not finished within the deadline.
//!
//! The deadline defaults to 30 seconds, can be set per test with
//! `#[test_timeout::timeout(5)]`, and is capped for the whole run by the
//! `TEST_TIMEOUT_SECS` environment variable.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, ItemFn, LitInt};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut timeout_secs = DEFAULT_TIMEOUT_SECS;

    if !attr.is_empty() {
        let lit = parse_macro_input!(attr as LitInt);
        timeout_secs = match lit.base10_parse::<u64>() {
            Ok(0) => {
                return syn::Error::new_spanned(&lit, "timeout must be greater than zero")
                    .to_compile_error()
                    .into();
            }
            Ok(secs) => secs,
            Err(err) => return err.to_compile_error().into(),
        };
    }

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_some() {
        return syn::Error::new_spanned(
            &sig.ident,
            "timeout attribute expects a synchronous test function",
        )
        .to_compile_error()
        .into();
    }
    if !sig.inputs.is_empty() {
        return syn::Error::new_spanned(&sig.inputs, "test functions take no arguments")
            .to_compile_error()
            .into();
    }

    let test_name = sig.ident.to_string();
    let filtered_attrs: Vec<Attribute> = attrs
        .into_iter()
        .filter(|attr| !is_test_attribute(attr))
        .collect();

    TokenStream::from(quote! {
        #[test]
        #(#filtered_attrs)*
        #vis #sig {
            let requested = #timeout_secs;
            let secs = std::env::var("TEST_TIMEOUT_SECS")
                .ok()
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|cap| *cap > 0)
                .map_or(requested, |cap| requested.min(cap));
            let deadline = std::time::Duration::from_secs(secs);
            let (sender, receiver) = std::sync::mpsc::channel();
            let _watched = std::thread::Builder::new()
                .name(format!("test:{}", #test_name))
                .spawn(move || {
                    let result =
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| #block));
                    let _ = sender.send(result);
                })
                .expect("spawn test thread");
            match receiver.recv_timeout(deadline) {
                Ok(Ok(_)) => {}
                Ok(Err(payload)) => std::panic::resume_unwind(payload),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("{} timed out after {}s", #test_name, secs)
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("{} exited before reporting a result", #test_name)
                }
            }
        }
    })
}

fn is_test_attribute(attr: &Attribute) -> bool {
    let mut segments = attr.path().segments.iter();
    matches!((segments.next(), segments.next()), (Some(first), None) if first.ident == "test")
}
