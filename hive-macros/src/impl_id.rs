use proc_macro::TokenStream;
use quote::quote;
use syn::parse_macro_input;

pub(crate) fn impl_id_attr_impl(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as syn::LitStr);
    let input = parse_macro_input!(input as syn::ItemImpl);

    match generate_impl_id_attr_impl(input, args) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

// Implementations

#[derive(Clone, Copy)]
enum Kind {
    Message,
    Coroutine,
    Shortcircuit,
}

fn generate_impl_id_attr_impl(
    input: syn::ItemImpl,
    args: syn::LitStr,
) -> syn::Result<proc_macro2::TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "impl_id can not be used on generic implementations",
        ));
    }

    let trait_path = &input
        .trait_
        .as_ref()
        .ok_or_else(|| {
            syn::Error::new_spanned(
                input.clone(),
                "impl_id can only be used on trait implementations",
            )
        })?
        .1;

    let trait_name = &trait_path
        .segments
        .last()
        .ok_or_else(|| syn::Error::new_spanned(trait_path, "Expected a trait path"))?
        .ident;

    let kind = match trait_name.to_string().as_str() {
        "Message" => Kind::Message,
        "Coroutine" => Kind::Coroutine,
        "Shortcircuit" => Kind::Shortcircuit,
        _ => {
            return Err(syn::Error::new_spanned(
                trait_name,
                "impl_id can only be used on Message, Coroutine or Shortcircuit implementations",
            ));
        }
    };

    uuid_checked(&args)?;

    let input = methods_inserted(input, kind)?;
    let type_tag_tokens = type_tag_tokens(&input, &args);
    let submit_register_fn_tokens = submit_register_fn_tokens(&input, kind);

    Ok(quote! {
        #input

        #type_tag_tokens

        #submit_register_fn_tokens
    })
}

// Helper functions

fn uuid_checked(args: &syn::LitStr) -> syn::Result<()> {
    let value = args.value();
    let groups: Vec<&str> = value.split('-').collect();
    let lens: Vec<usize> = groups.iter().map(|g| g.len()).collect();

    let well_formed = lens == [8, 4, 4, 4, 12]
        && groups
            .iter()
            .all(|g| g.chars().all(|c| c.is_ascii_hexdigit()));

    match well_formed {
        true => Ok(()),
        false => Err(syn::Error::new_spanned(
            args,
            "impl_id expects a hyphenated uuid literal",
        )),
    }
}

fn type_tag_tokens(input: &syn::ItemImpl, args: &syn::LitStr) -> proc_macro2::TokenStream {
    let type_name = &input.self_ty;

    quote! {
        impl ::hive::base::TypeTag for #type_name {
            const IMPL_ID: ::hive::base::ImplId = ::hive::__private::uuid::uuid!(#args);
        }
    }
}

fn submit_register_fn_tokens(input: &syn::ItemImpl, kind: Kind) -> proc_macro2::TokenStream {
    let type_name = &input.self_ty;

    let register_fn = match kind {
        Kind::Message => quote! { ::hive::registry::RegisterMessageFn },
        Kind::Coroutine => quote! { ::hive::registry::RegisterCoroutineFn },
        Kind::Shortcircuit => quote! { ::hive::registry::RegisterShortcircuitFn },
    };

    let wrap = match kind {
        Kind::Shortcircuit => quote! { ::std::sync::Arc::new },
        _ => quote! { ::std::boxed::Box::new },
    };

    quote! {
        ::hive::__private::inventory::submit! {
            #register_fn(|registry| {
                registry.register(
                    <#type_name as ::hive::base::TypeTag>::IMPL_ID,
                    ::std::any::type_name::<#type_name>(),
                    |bytes| {
                        Ok(#wrap(::hive::__private::postcard::from_bytes::<#type_name>(bytes)?))
                    },
                );
            })
        }
    }
}

fn methods_inserted(mut input: syn::ItemImpl, kind: Kind) -> syn::Result<syn::ItemImpl> {
    let mut methods = vec![
        quote! {
            #[doc(hidden)]
            fn __impl_id(&self) -> ::hive::base::ImplId {
                <Self as ::hive::base::TypeTag>::IMPL_ID
            }
        },
        quote! {
            #[doc(hidden)]
            fn __erased(&self) -> &dyn ::hive::__private::erased_serde::Serialize {
                self
            }
        },
    ];

    if let Kind::Message = kind {
        methods.push(quote! {
            #[doc(hidden)]
            fn __clone_box(&self) -> ::std::boxed::Box<dyn ::hive::message::Message> {
                ::std::boxed::Box::new(::std::clone::Clone::clone(self))
            }
        });
        methods.push(quote! {
            #[doc(hidden)]
            fn __as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        });
    }

    for method in methods {
        let item: syn::ImplItemFn = syn::parse2(method)?;
        input.items.push(syn::ImplItem::Fn(item));
    }

    Ok(input)
}
