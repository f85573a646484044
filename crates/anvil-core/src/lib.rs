//! Core data model for the anvil incremental build engine.
//!
//! This crate is pure: it defines the dependency-graph abstraction, the
//! build-target identity, and the fingerprinting model (content hashes,
//! rule keys, ABI keys) without performing any filesystem or process IO.
//! Everything that touches disk or spawns tools lives in `anvil-engine`.
//!
//! # Modules
//!
//! - [`target`]: `BuildTarget`, the opaque, totally-ordered node identity
//! - [`graph`]: `MutableGraph` builder and the frozen `ImmutableGraph`
//! - [`hash`]: `ContentHash`, a blake3 digest newtype
//! - [`key`]: `RuleKey` computation and the memoized per-build key arena
//! - [`abi`]: `AbiKey`, the interface-only fingerprint with its empty sentinel
//! - [`error`]: `CoreError` covering all core failure modes

pub mod abi;
pub mod error;
pub mod graph;
pub mod hash;
pub mod key;
pub mod target;

// Re-export commonly used types
pub use abi::AbiKey;
pub use error::CoreError;
pub use graph::{ImmutableGraph, MutableGraph};
pub use hash::ContentHash;
pub use key::{RuleKey, RuleKeyBuilder, RuleKeyCache};
pub use target::BuildTarget;
