//! Shared primitives for the memory-polish workspace.
//!
//! Everything here is deliberately dependency-light and side-effect free
//! (apart from `fsio`, which owns the atomic-write discipline the rest of
//! the pipeline relies on for crash safety):
//!
//! - `digest`: SHA-256 content addressing,
//! - `fsio`: write-temp-verify-rename atomic I/O and safe moves/copies,
//! - `vecmath`: cosine/Levenshtein and the small vector helpers the
//!   similarity engine needs.

pub mod digest;
pub mod fsio;
pub mod vecmath;

pub use digest::{is_sha256_hex, sha256_hex};
pub use fsio::{copy_safe, move_safe, write_atomic};
