//! Procedural macros for consensus encoding and decoding.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Derives `Encodable` and `Decodable` for a struct by encoding every field
/// in declaration order.
///
/// The generated code refers to `crate::consensus` and `crate::io`, so the
/// macro is meant to be used inside `blockdump-common` only. Decoding is
/// implemented through `consensus_decode_from_finite_reader`; the default
/// `consensus_decode` of the trait caps the reader at `MAX_VEC_SIZE`.
///
/// # Example
///
/// ```ignore
/// use blockdump_derive::ConsensusCodec;
///
/// #[derive(ConsensusCodec)]
/// pub struct Ping {
///     nonce: u64,
/// }
/// ```
#[proc_macro_derive(ConsensusCodec)]
pub fn derive_consensus_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        Data::Enum(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "ConsensusCodec can only be derived for structs",
            ));
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "ConsensusCodec cannot be derived for unions",
            ));
        }
    };

    let (encode_body, constructor) = match fields {
        Fields::Named(named) => {
            let idents: Vec<_> = named.named.iter().filter_map(|f| f.ident.as_ref()).collect();
            let encode = quote! {
                #(
                    len = len.saturating_add(
                        crate::consensus::Encodable::consensus_encode(&self.#idents, writer)?,
                    );
                )*
            };
            let construct = quote! {
                #name {
                    #(
                        #idents: crate::consensus::Decodable::consensus_decode_from_finite_reader(
                            reader,
                        )?,
                    )*
                }
            };
            (encode, construct)
        }
        Fields::Unnamed(unnamed) => {
            let indices: Vec<_> = (0..unnamed.unnamed.len()).map(syn::Index::from).collect();
            let decoders = indices.iter().map(|_| {
                quote! { crate::consensus::Decodable::consensus_decode_from_finite_reader(reader)? }
            });
            let encode = quote! {
                #(
                    len = len.saturating_add(
                        crate::consensus::Encodable::consensus_encode(&self.#indices, writer)?,
                    );
                )*
            };
            let construct = quote! { #name(#(#decoders),*) };
            (encode, construct)
        }
        Fields::Unit => {
            return Err(syn::Error::new_spanned(
                input,
                "ConsensusCodec cannot be derived for unit structs",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics crate::consensus::Encodable for #name #ty_generics #where_clause {
            #[inline]
            fn consensus_encode<W: crate::io::Write + ?Sized>(
                &self,
                writer: &mut W,
            ) -> core::result::Result<usize, crate::io::Error> {
                let mut len: usize = 0;
                #encode_body
                Ok(len)
            }
        }

        impl #impl_generics crate::consensus::Decodable for #name #ty_generics #where_clause {
            #[inline]
            fn consensus_decode_from_finite_reader<R: crate::io::Read + ?Sized>(
                reader: &mut R,
            ) -> core::result::Result<Self, crate::consensus::EncodeDecodeError> {
                Ok(#constructor)
            }
        }
    })
}
