//! # mapkv-core
//!
//! An embedded key-value store for mobile and desktop processes. Each
//! namespace persists small typed values in a single memory-mapped
//! append-only log, with a CRC-tracked meta file recording commit state.
//!
//! ## Features
//!
//! - **Write amplification ≈ 1**: edits and deletes append records; space is
//!   reclaimed by an occasional full rewrite, never per-key.
//! - **Crash safety**: the meta file anchors a `lastConfirmed` commit point;
//!   a torn append rolls back to it on the next mount.
//! - **Multi-process sharing**: shared mappings plus recursive byte-range
//!   locks let several processes serve the same namespace.
//! - **Encryption at rest**: AES-128 CFB over the payload stream, with a
//!   fresh random IV per rewrite.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mapkv_core::{Store, StoreMode};
//!
//! fn main() -> mapkv_core::Result<()> {
//!     let kv = Store::open("/tmp/mapkv", "unit", StoreMode::SingleProcess, None)?;
//!
//!     kv.set_i32("launch-count", kv.get_i32("launch-count", 0) + 1);
//!     kv.set_string("user", "alice");
//!
//!     assert_eq!(kv.get_string("user").as_deref(), Some("alice"));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod checksum;
pub mod codec;
pub mod crypt;
#[cfg(test)]
mod crypt_tests;
pub mod error;
pub mod file;
pub mod meta;
pub mod store;

pub use error::{CorruptKind, DecodeError, Error, RecoverStrategy, Result};
pub use store::{RecoverHandler, Store, StoreMode, SyncMode};
