//! Core error types for anvil-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! all anticipated failure modes in the core data model.

use thiserror::Error;

/// Core errors produced by the anvil-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The graph contains at least one cycle and cannot be frozen.
    #[error("graph is not acyclic")]
    NotAcyclic,

    /// A rule key was requested before the keys of its dependencies were
    /// computed. The engine must fill the key arena in topological order,
    /// so hitting this is a programming error, not a user error.
    #[error("rule key for '{node}' requested before it was computed")]
    DependencyKeyNotReady { node: String },

    /// A hex string could not be parsed back into a content hash.
    #[error("invalid content hash: '{input}'")]
    InvalidHash { input: String },

    /// A build target string did not match `//base/path:name[#flavor]`.
    #[error("invalid build target: '{input}'")]
    InvalidTarget { input: String },
}
