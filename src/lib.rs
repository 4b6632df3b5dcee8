//! Random-access compression for collections of short strings.
//!
//! `pairzip` trains a token dictionary of up to 65,536 entries from the
//! input corpus and re-parses every string into fixed-width 16-bit token
//! ids. Each string decompresses independently through table-indexed byte
//! copies, which makes the codec a fit for database columns of
//! identifiers, URLs, log keys and similar short repetitive values.
//!
//! Two codecs are provided. [`PairZip`] places no limit on token length.
//! [`PairZip16`] caps tokens at 16 bytes, which lets it keep all matcher
//! keys in pairs of machine words and decompress with fixed-size copies.
//!
//! # Quick start
//!
//! ```
//! use pairzip::PairZip16;
//!
//! let strings = ["user_000001", "user_000002", "user_000003"];
//!
//! let mut codec = PairZip16::new();
//! codec.compress_strings(&strings).unwrap();
//!
//! // Output buffers need 15 bytes of trailing slack for the fixed-size
//! // token copies.
//! let mut buf = vec![0u8; codec.decompressed_len(1) + 15];
//! let written = codec.decompress_string(1, &mut buf);
//! assert_eq!(&buf[..written], b"user_000002");
//! ```
//!
//! Training shuffles the corpus with a fresh seed on every call, so the
//! compressed representation is not bit-stable across runs; only the
//! decompressed contents are. [`CompressOptions`] can pin the seed.

mod codec;
mod error;
mod matcher;

pub use codec::{flatten_strings, CompressOptions, PairZip, PairZip16};
pub use error::{Error, Result};
pub use matcher::{PrefixMatcher, PrefixMatcher16, StaticPrefixMatcher16, MAX_TOKEN_LEN};
