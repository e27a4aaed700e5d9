use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, LitStr};

fn split_on_capital_letters(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut start = 0;

    for (i, c) in s.char_indices().skip(1) {
        if c.is_uppercase() {
            words.push(s[start..i].to_owned());
            start = i;
        }
    }

    words.push(s[start..].to_owned());
    words
}

fn wildcards(fields: &syn::Fields) -> Vec<proc_macro2::TokenStream> {
    vec![quote!(_); fields.len()]
}

/// Derives `name()` and `description()` const accessors on an error enum.
///
/// Variants are documented with one of:
/// * `#[error("message")]` a static message
/// * `#[generate]` a message built from the variant name (`MissingSock` -> "missing sock")
/// * `#[wrap]` delegates to the description of the single wrapped error
#[proc_macro_derive(BpfError, attributes(error, generate, wrap))]
pub fn error_derive(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    let enum_name = &input.ident;

    let data_enum = match input.data {
        syn::Data::Enum(data_enum) => data_enum,
        _ => panic!("BpfError can only be derived on enums"),
    };

    let mut desc_arms = vec![];
    let mut name_arms = vec![];

    for v in data_enum.variants.iter() {
        let name = &v.ident;
        let name_str = name.to_string();

        let err_attr = v.attrs.iter().find(|&attr| attr.path().is_ident("error"));
        let gen_attr = v
            .attrs
            .iter()
            .find(|&attr| attr.path().is_ident("generate"));
        let wrap_attr = v.attrs.iter().find(|&attr| attr.path().is_ident("wrap"));

        let pattern = if matches!(v.fields, syn::Fields::Unit) {
            quote!(Self::#name)
        } else {
            let w = wildcards(&v.fields);
            quote!(Self::#name(#(#w),*))
        };

        name_arms.push(quote!(#pattern => #name_str,));

        if let Some(err_attr) = err_attr {
            let msg: LitStr = err_attr
                .parse_args()
                .expect("#[error] expects a string literal");
            desc_arms.push(quote!(#pattern => #msg,));
            continue;
        }

        if gen_attr.is_some() {
            let msg = split_on_capital_letters(&name_str)
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect::<Vec<String>>()
                .join(" ");
            desc_arms.push(quote!(#pattern => #msg,));
            continue;
        }

        if wrap_attr.is_some() {
            if !(v.fields.len() == 1 && matches!(v.fields, syn::Fields::Unnamed(_))) {
                panic!("#[wrap] variant must hold exactly one unnamed field");
            }
            desc_arms.push(quote!(Self::#name(v) => v.description(),));
            continue;
        }

        panic!("variant {name_str} needs one of #[error], #[generate] or #[wrap]");
    }

    quote!(
        impl #enum_name {
            #[inline(always)]
            pub const fn name(&self) -> &'static str {
                match self {
                    #(#name_arms)*
                }
            }

            #[inline(always)]
            pub const fn description(&self) -> &'static str {
                match self {
                    #(#desc_arms)*
                }
            }
        }

        impl core::fmt::Display for #enum_name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.description())
            }
        }
    )
    .into()
}

/// Derives string conversions on a field-less enum: `as_str()`,
/// `variants()`, `try_from_uint()` and `FromStr`. The string defaults to
/// the variant name and can be overridden with `#[str("...")]`.
#[proc_macro_derive(StrEnum, attributes(str))]
pub fn str_enum_derive(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    let enum_name = &input.ident;

    let data_enum = match input.data {
        syn::Data::Enum(data_enum) => data_enum,
        _ => panic!("StrEnum can only be derived on enums"),
    };

    let mut as_str_arms = vec![];
    let mut from_str_arms = vec![];
    let mut from_uint_checks = vec![];
    let mut variants = vec![];

    for v in data_enum.variants.iter() {
        let name = &v.ident;

        if !v.fields.is_empty() {
            panic!("StrEnum variants cannot hold values");
        }

        let s = match v.attrs.iter().find(|&attr| attr.path().is_ident("str")) {
            Some(attr) => {
                let lit: LitStr = attr
                    .parse_args()
                    .expect("#[str] expects a string literal");
                lit.value()
            }
            None => name.to_string(),
        };

        as_str_arms.push(quote!(Self::#name => #s,));
        from_str_arms.push(quote!(#s => Ok(Self::#name),));
        from_uint_checks.push(quote!(
            if v == Self::#name as u64 {
                return Ok(Self::#name);
            }
        ));
        variants.push(quote!(Self::#name,));
    }

    let variants_len = variants.len();

    quote!(
        impl core::str::FromStr for #enum_name {
            type Err = &'static str;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    #(#from_str_arms)*
                    _ => Err("unknown variant string"),
                }
            }
        }

        impl #enum_name {
            pub const fn variants() -> [Self; #variants_len] {
                [
                    #(#variants)*
                ]
            }

            #[inline(always)]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    #(#as_str_arms)*
                }
            }

            pub fn try_from_uint<T: Into<u64>>(v: T) -> Result<Self, &'static str> {
                let v: u64 = v.into();
                #(#from_uint_checks)*
                Err("unknown variant value")
            }
        }
    )
    .into()
}
