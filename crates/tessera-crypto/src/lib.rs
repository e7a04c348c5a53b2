//! # tessera-crypto: Content addressing for `Tessera`
//!
//! Offloaded payloads are named by the SHA-256 of their bytes. This crate
//! owns that mapping so every component hashes the same way:
//!
//! - [`content_hash`]: one-shot digest of a byte slice
//! - [`ContentHasher`]: incremental digest for streamed input
//! - [`verify_content`]: recompute-and-compare used on every resolve

mod sha256;

pub use sha256::{ContentHasher, content_hash, verify_content};
