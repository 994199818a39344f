//! Wrappers for byte buffers that travel as base64 text
//!
//! Keys, signatures and nonces exchanged with a token authority are raw
//! bytes in memory but base64 strings on the wire. The wrappers in this crate
//! hold the raw bytes and only pay for encoding when the value is serialized,
//! displayed, or debugged.
//!
//! # Supported encodings
//!
//! [`Base64`] wraps bytes that serialize in the standard base64 alphabet with
//! padding.
//!
//! [`Base64Mime`] uses the same alphabet but breaks the output into lines of
//! at most 76 characters separated by `\r\n`, the way MIME encoders do. When
//! decoding, line breaks and other ASCII whitespace are ignored.
//!
//! # Example
//!
//! ```
//! use hysky_base64::Base64;
//!
//! let data = Base64::from_raw("hello, world!".as_bytes());
//! assert_eq!(data.to_string(), "aGVsbG8sIHdvcmxkIQ==");
//! assert_eq!(format!("{:?}", data), "`aGVsbG8sIHdvcmxkIQ==`");
//! ```
//!
//! # Serde
//!
//! With the `serde` feature enabled, the wrappers serialize as a base64
//! string in their encoding and deserialize by decoding such a string.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_must_use
)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::{error::Error, fmt};

use base64::engine::{general_purpose::STANDARD, Engine};

/// An error while decoding a value which is not properly formatted
/// base64 data
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidBase64Data {
    source: base64::DecodeError,
}

impl From<base64::DecodeError> for InvalidBase64Data {
    fn from(err: base64::DecodeError) -> Self {
        Self { source: err }
    }
}

impl fmt::Display for InvalidBase64Data {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid base64 data")
    }
}

impl Error for InvalidBase64Data {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Maximum number of encoded characters on one MIME line
const MIME_LINE_LEN: usize = 76;
const MIME_LINE_SEPARATOR: &str = "\r\n";

fn encode_standard(raw: &[u8]) -> String {
    STANDARD.encode(raw)
}

fn decode_standard(enc: &[u8]) -> Result<Vec<u8>, InvalidBase64Data> {
    Ok(STANDARD.decode(enc)?)
}

fn encode_mime(raw: &[u8]) -> String {
    let flat = STANDARD.encode(raw);
    let lines = flat.len().div_ceil(MIME_LINE_LEN);
    let mut out =
        String::with_capacity(flat.len() + lines.saturating_sub(1) * MIME_LINE_SEPARATOR.len());

    // The standard alphabet is pure ASCII, so splitting on bytes is safe.
    for (idx, line) in flat.as_bytes().chunks(MIME_LINE_LEN).enumerate() {
        if idx > 0 {
            out.push_str(MIME_LINE_SEPARATOR);
        }
        out.extend(line.iter().map(|&b| char::from(b)));
    }

    out
}

fn decode_mime(enc: &[u8]) -> Result<Vec<u8>, InvalidBase64Data> {
    let compact: Vec<u8> = enc
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    decode_standard(&compact)
}

macro_rules! b64_builder {
    {
        $(#[$meta:meta])*
        $v:vis struct $ty:ident ($encode:path, $decode:path);
    } => {
        #[derive(Clone, Eq, PartialEq, Hash)]
        $(#[$meta])*
        ///
        /// Data is held in memory in its raw form. Costs of encoding are only
        /// incurred when serializing or displaying the value.
        #[must_use]
        $v struct $ty(Vec<u8>);

        impl $ty {
            /// Creates an empty buffer
            #[inline]
            pub const fn new() -> Self {
                Self(Vec::new())
            }

            /// Creates a new buffer from raw (not yet encoded) bytes
            ///
            /// To decode a base64-encoded buffer, use [`from_encoded()`][Self::from_encoded()].
            #[inline]
            pub fn from_raw<T: Into<Vec<u8>>>(raw: T) -> Self {
                Self(raw.into())
            }

            /// Decodes a base64-encoded value into a new owned buffer
            pub fn from_encoded<T: AsRef<[u8]>>(enc: T) -> Result<Self, InvalidBase64Data> {
                Ok(Self($decode(enc.as_ref())?))
            }

            /// Provides access to the raw bytes
            #[inline]
            #[must_use]
            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            /// Unwraps the underlying buffer
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> Vec<u8> {
                self.0
            }

            /// Encodes the buffer into its textual form
            #[must_use]
            pub fn encode(&self) -> String {
                $encode(&self.0)
            }

            /// Number of raw bytes held
            #[inline]
            #[must_use]
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// Whether the buffer is empty
            #[inline]
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<Vec<u8>> for $ty {
            #[inline]
            fn from(buf: Vec<u8>) -> Self {
                Self(buf)
            }
        }

        impl From<&'_ [u8]> for $ty {
            #[inline]
            fn from(slice: &[u8]) -> Self {
                Self::from_raw(slice)
            }
        }

        impl From<$ty> for Vec<u8> {
            #[inline]
            fn from(val: $ty) -> Self {
                val.0
            }
        }

        impl AsRef<[u8]> for $ty {
            #[inline]
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(&self.encode())
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "`{}`", self.encode())
            }
        }

        /// Serialize the underlying byte array as a base64 string
        #[cfg(feature = "serde")]
        #[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
        impl ::serde::Serialize for $ty {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.encode())
            }
        }

        /// Deserialize a base64 string and decode it into a byte array
        #[cfg(feature = "serde")]
        #[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
        impl<'de> ::serde::Deserialize<'de> for $ty {
            fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let enc = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                Self::from_encoded(enc).map_err(::serde::de::Error::custom)
            }
        }
    }
}

b64_builder! {
    /// Owned data to be encoded as standard base64
    ///
    /// Encoding alphabet: `A`-`Z`, `a`-`z`, `0`-`9`, `+`, `/`
    ///
    /// Padding character: `=`
    pub struct Base64(encode_standard, decode_standard);
}

b64_builder! {
    /// Owned data to be encoded as MIME base64
    ///
    /// Uses the standard alphabet and padding, with the output broken into
    /// lines of at most 76 characters joined by `\r\n`.
    pub struct Base64Mime(encode_mime, decode_mime);
}

impl From<Base64Mime> for Base64 {
    fn from(val: Base64Mime) -> Self {
        Self(val.0)
    }
}

impl From<Base64> for Base64Mime {
    fn from(val: Base64) -> Self {
        Self(val.0)
    }
}
