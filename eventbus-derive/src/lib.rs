//! Derive and attribute macros for eventbus.
//!
//! This crate provides `#[derive(Event)]`, which describes an event type and
//! its place in an event hierarchy, and `#[subscriber]`, which turns the
//! `#[subscribe_event]` methods of an `impl` block into a subscriber
//! description.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{quote, ToTokens};
use syn::spanned::Spanned;
use syn::{
    parse_macro_input, Data, DeriveInput, Fields, FnArg, Ident, ImplItem, ImplItemFn, ItemImpl,
    LitBool, LitStr, Member, Meta, Path, Type,
};

/// Derives the Event trait for structs and enums.
///
/// Type attributes, inside `#[event(...)]`:
///
/// * `abstract`: listeners may not be registered for the type.
/// * `cancellable`: the type can be canceled. Requires a `bool` field marked
///   `#[event(canceled)]`. Subtypes of a cancellable type inherit both the
///   capability and the state, so they need neither.
///
/// A `#[event(canceled)]` field on a subtype is only used when no ancestor
/// stores the cancellation state.
/// * `markers(A, B)`: marker types checked by marker-type buses.
///
/// Field attributes:
///
/// * `#[event(parent)]`: the field holds the parent event.
/// * `#[event(canceled)]`: the field holds the cancellation state.
///
/// # Examples
///
/// ```rust
/// use eventbus::Event;
///
/// #[derive(Event, Debug)]
/// #[event(abstract)]
/// struct ServerEvent;
///
/// #[derive(Event, Debug)]
/// #[event(cancellable)]
/// struct ServerStopping {
///     #[event(parent)]
///     base: ServerEvent,
///     #[event(canceled)]
///     canceled: bool,
/// }
/// ```
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_event(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Implements `Subscriber` for the type of an inherent `impl` block.
///
/// Every method marked `#[subscribe_event]` becomes a listener method.
/// Methods taking `&self` are registered with `EventBus::register`, methods
/// without a receiver with `EventBus::register_static`. A listener method
/// takes the event as `&mut E` or `&E` and returns `()` or a `Result`.
///
/// `#[subscribe_event]` accepts `priority = Highest | High | Normal | Low |
/// Lowest` and `receive_canceled = true`. `#[subscriber]` itself accepts
/// `supertypes(A, B)` naming subscriber types this one builds on.
///
/// # Examples
///
/// ```rust
/// use eventbus::{subscriber, Event};
///
/// #[derive(Event, Debug)]
/// struct Tick;
///
/// struct Logger;
///
/// #[subscriber]
/// impl Logger {
///     #[subscribe_event(priority = Lowest, receive_canceled = true)]
///     fn on_tick(&self, _tick: &mut Tick) {}
///
///     #[subscribe_event]
///     fn on_tick_static(_tick: &Tick) -> Result<(), String> {
///         Ok(())
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn subscriber(attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = parse_macro_input!(item as ItemImpl);
    expand_subscriber(attr.into(), item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Default)]
struct EventOptions {
    is_abstract: bool,
    cancellable: bool,
    markers: Vec<Path>,
}

fn parse_event_options(input: &DeriveInput) -> syn::Result<EventOptions> {
    let mut options = EventOptions::default();
    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("event")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("abstract") {
                options.is_abstract = true;
                Ok(())
            } else if meta.path.is_ident("cancellable") || meta.path.is_ident("cancelable") {
                options.cancellable = true;
                Ok(())
            } else if meta.path.is_ident("markers") {
                meta.parse_nested_meta(|marker| {
                    options.markers.push(marker.path);
                    Ok(())
                })
            } else {
                Err(meta.error("expected `abstract`, `cancellable` or `markers(..)`"))
            }
        })?;
    }
    Ok(options)
}

#[derive(Default)]
struct EventFields {
    parent: Option<(Member, Type)>,
    canceled: Option<Member>,
}

fn parse_event_fields(fields: &Fields) -> syn::Result<EventFields> {
    let mut found = EventFields::default();
    for (position, field) in fields.iter().enumerate() {
        let member = match &field.ident {
            Some(ident) => Member::Named(ident.clone()),
            None => Member::Unnamed(position.into()),
        };
        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("event")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("parent") {
                    if found.parent.is_some() {
                        return Err(meta.error("an event has at most one parent field"));
                    }
                    found.parent = Some((member.clone(), field.ty.clone()));
                    Ok(())
                } else if meta.path.is_ident("canceled") {
                    if found.canceled.is_some() {
                        return Err(meta.error("an event has at most one canceled field"));
                    }
                    found.canceled = Some(member.clone());
                    Ok(())
                } else {
                    Err(meta.error("expected `parent` or `canceled`"))
                }
            })?;
        }
    }
    Ok(found)
}

fn expand_event(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "generic event types are not supported",
        ));
    }

    let name = &input.ident;
    let name_lit = LitStr::new(&name.to_string(), name.span());
    let options = parse_event_options(input)?;
    let fields = match &input.data {
        Data::Struct(data) => parse_event_fields(&data.fields)?,
        Data::Enum(_) => EventFields::default(),
        Data::Union(_) => {
            return Err(syn::Error::new(
                Span::call_site(),
                "Event cannot be derived for union types",
            ))
        }
    };

    if options.cancellable && fields.canceled.is_none() {
        return Err(syn::Error::new(
            name.span(),
            "cancellable events need a `bool` field marked #[event(canceled)]",
        ));
    }
    let cancellable = options.cancellable || fields.canceled.is_some();
    let is_abstract = options.is_abstract;

    let with_parent = fields.parent.as_ref().map(|(_, ty)| {
        quote! { .with_parent::<#ty>() }
    });
    let markers = &options.markers;
    let with_markers = (!markers.is_empty()).then(|| {
        quote! {
            .with_markers({
                const MARKERS: &[fn() -> ::std::any::TypeId] =
                    &[#(::std::any::TypeId::of::<#markers>),*];
                MARKERS
            })
        }
    });

    let (upcast_parent_ref, upcast_parent_mut) = match &fields.parent {
        Some((member, _)) => (
            quote! { ::eventbus::Event::upcast_ref(&self.#member, target) },
            quote! { ::eventbus::Event::upcast_mut(&mut self.#member, target) },
        ),
        None => (
            quote! { ::std::option::Option::None },
            quote! { ::std::option::Option::None },
        ),
    };

    let cancel_methods = match (&fields.canceled, &fields.parent) {
        (Some(member), Some((parent, _))) => quote! {
            fn canceled_flag(&self) -> ::std::option::Option<&bool> {
                ::eventbus::Event::canceled_flag(&self.#parent)
                    .or(::std::option::Option::Some(&self.#member))
            }

            fn canceled_flag_mut(&mut self) -> ::std::option::Option<&mut bool> {
                if let ::std::option::Option::Some(flag) =
                    ::eventbus::Event::canceled_flag_mut(&mut self.#parent)
                {
                    return ::std::option::Option::Some(flag);
                }
                ::std::option::Option::Some(&mut self.#member)
            }
        },
        (Some(member), None) => quote! {
            fn canceled_flag(&self) -> ::std::option::Option<&bool> {
                ::std::option::Option::Some(&self.#member)
            }

            fn canceled_flag_mut(&mut self) -> ::std::option::Option<&mut bool> {
                ::std::option::Option::Some(&mut self.#member)
            }
        },
        (None, Some((member, _))) => quote! {
            fn canceled_flag(&self) -> ::std::option::Option<&bool> {
                ::eventbus::Event::canceled_flag(&self.#member)
            }

            fn canceled_flag_mut(&mut self) -> ::std::option::Option<&mut bool> {
                ::eventbus::Event::canceled_flag_mut(&mut self.#member)
            }
        },
        (None, None) => TokenStream2::new(),
    };

    Ok(quote! {
        impl ::eventbus::Event for #name {
            fn kind() -> ::eventbus::EventKind {
                ::eventbus::EventKind::new::<Self>(#name_lit)
                    #with_parent
                    .with_abstract(#is_abstract)
                    .with_cancellable(#cancellable)
                    #with_markers
            }

            fn event_kind(&self) -> ::eventbus::EventKind {
                <Self as ::eventbus::Event>::kind()
            }

            fn upcast_ref(
                &self,
                target: ::std::any::TypeId,
            ) -> ::std::option::Option<&dyn ::std::any::Any> {
                if target == ::std::any::TypeId::of::<Self>() {
                    return ::std::option::Option::Some(self as &dyn ::std::any::Any);
                }
                #upcast_parent_ref
            }

            fn upcast_mut(
                &mut self,
                target: ::std::any::TypeId,
            ) -> ::std::option::Option<&mut dyn ::std::any::Any> {
                if target == ::std::any::TypeId::of::<Self>() {
                    return ::std::option::Option::Some(self as &mut dyn ::std::any::Any);
                }
                #upcast_parent_mut
            }

            #cancel_methods
        }
    })
}

const PRIORITIES: [&str; 5] = ["Highest", "High", "Normal", "Low", "Lowest"];

struct ListenerOptions {
    priority: Ident,
    receive_canceled: bool,
}

fn parse_listener_options(attr: &syn::Attribute) -> syn::Result<ListenerOptions> {
    let mut options = ListenerOptions {
        priority: Ident::new("Normal", attr.span()),
        receive_canceled: false,
    };
    if matches!(attr.meta, Meta::Path(_)) {
        return Ok(options);
    }
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("priority") {
            let value: Ident = meta.value()?.parse()?;
            let canonical = PRIORITIES
                .iter()
                .find(|priority| priority.eq_ignore_ascii_case(&value.to_string()))
                .ok_or_else(|| {
                    syn::Error::new(
                        value.span(),
                        "expected one of Highest, High, Normal, Low, Lowest",
                    )
                })?;
            options.priority = Ident::new(canonical, value.span());
            Ok(())
        } else if meta.path.is_ident("receive_canceled") {
            options.receive_canceled = if meta.input.peek(syn::Token![=]) {
                meta.value()?.parse::<LitBool>()?.value
            } else {
                true
            };
            Ok(())
        } else {
            Err(meta.error("expected `priority` or `receive_canceled`"))
        }
    })?;
    Ok(options)
}

fn parse_supertypes(attr: TokenStream2) -> syn::Result<Vec<Path>> {
    let mut supertypes = Vec::new();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("supertypes") {
            meta.parse_nested_meta(|nested| {
                supertypes.push(nested.path);
                Ok(())
            })
        } else {
            Err(meta.error("expected `supertypes(..)`"))
        }
    });
    syn::parse::Parser::parse2(parser, attr)?;
    Ok(supertypes)
}

fn type_name(ty: &Type) -> String {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .unwrap_or_default(),
        other => other.to_token_stream().to_string(),
    }
}

fn describe_method(method: &ImplItemFn, options: &ListenerOptions) -> syn::Result<TokenStream2> {
    let ident = &method.sig.ident;
    let name_lit = LitStr::new(&ident.to_string(), ident.span());

    let mut is_static = true;
    let mut params = Vec::new();
    for input in &method.sig.inputs {
        match input {
            FnArg::Receiver(receiver) => {
                if receiver.reference.is_none() || receiver.mutability.is_some() {
                    return Err(syn::Error::new(
                        receiver.span(),
                        "listener methods take `&self`; use interior mutability for state",
                    ));
                }
                is_static = false;
            }
            FnArg::Typed(typed) => params.push(&*typed.ty),
        }
    }

    let event_param = match params.as_slice() {
        [Type::Reference(reference)] => Some((&*reference.elem, reference.mutability.is_some())),
        _ => None,
    };

    let (param_types, invoker) = match event_param {
        Some((event, mutable)) => {
            let argument = if mutable {
                quote! { event }
            } else {
                quote! { &*event }
            };
            let invoker = if is_static {
                quote! {
                    ::eventbus::Invoker::Static(|event: &mut dyn ::eventbus::Event| {
                        ::eventbus::subscriber::invoke_as::<#event, _>(event, |event| {
                            Self::#ident(#argument)
                        })
                    })
                }
            } else {
                quote! {
                    ::eventbus::Invoker::Instance(|this: &Self, event: &mut dyn ::eventbus::Event| {
                        ::eventbus::subscriber::invoke_as::<#event, _>(event, |event| {
                            this.#ident(#argument)
                        })
                    })
                }
            };
            (
                vec![quote! { ::eventbus::ParamType::event::<#event>() }],
                quote! { ::std::option::Option::Some(#invoker) },
            )
        }
        None => {
            let others = params.iter().map(|ty| {
                let name = LitStr::new(&ty.to_token_stream().to_string(), ty.span());
                quote! { ::eventbus::ParamType::other(#name) }
            });
            (others.collect(), quote! { ::std::option::Option::None })
        }
    };

    let priority = &options.priority;
    let receive_canceled = options.receive_canceled;
    Ok(quote! {
        ::eventbus::SubscribeMethod {
            name: #name_lit,
            params: ::std::vec![#(#param_types),*],
            is_static: #is_static,
            priority: ::eventbus::EventPriority::#priority,
            receive_canceled: #receive_canceled,
            invoker: #invoker,
        }
    })
}

fn expand_subscriber(attr: TokenStream2, mut item: ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new(
            path.span(),
            "#[subscriber] goes on an inherent impl block",
        ));
    }
    let supertypes = parse_supertypes(attr)?;

    let mut methods = Vec::new();
    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let Some(position) = method
            .attrs
            .iter()
            .position(|attr| attr.path().is_ident("subscribe_event"))
        else {
            continue;
        };
        let attr = method.attrs.remove(position);
        let options = parse_listener_options(&attr)?;
        methods.push(describe_method(method, &options)?);
    }

    let self_ty = &item.self_ty;
    let name_lit = LitStr::new(&type_name(self_ty), self_ty.span());
    let (impl_generics, _, where_clause) = item.generics.split_for_impl();

    Ok(quote! {
        #item

        impl #impl_generics ::eventbus::Subscriber for #self_ty #where_clause {
            fn describe() -> ::eventbus::SubscriberClass<Self> {
                ::eventbus::SubscriberClass {
                    name: #name_lit,
                    methods: ::std::vec![#(#methods),*],
                    supertypes: ::std::vec![
                        #(::eventbus::SupertypeInfo::of::<#supertypes>()),*
                    ],
                }
            }
        }
    })
}
