// lib.rs - Root of macro crate
use proc_macro::TokenStream;

mod impl_id;

/// Stamp a stable type identifier onto an implementation of `Message`,
/// `Coroutine` or `Shortcircuit` and register its deserializer.
///
/// ```ignore
/// #[impl_id("8f1c7a0e-0b8e-4d0c-9c4a-2f1d5f0e6a11")]
/// impl Message for Ping {}
/// ```
#[proc_macro_attribute]
pub fn impl_id(args: TokenStream, input: TokenStream) -> TokenStream {
    impl_id::impl_id_attr_impl(args, input)
}
