//! Engine error types.
//!
//! [`EngineError`] covers every failure mode outside the pure core:
//! missing rules and inputs, step failures (recorded against the owning
//! rule, never crashing the engine), and store/IO problems.

use std::path::PathBuf;

use anvil_core::CoreError;
use thiserror::Error;

/// Errors produced by the anvil-engine crate.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A core-model invariant failed (cyclic graph, unready key, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A declared dependency has no registered rule.
    #[error("no rule registered for target {target}")]
    RuleNotFound { target: String },

    /// A declared input file does not exist or cannot be read.
    #[error("missing input file: {}", path.display())]
    MissingInput { path: PathBuf },

    /// A step reported a non-zero exit status. Rule-scoped: the owning
    /// rule fails and its transitive dependents are never attempted.
    #[error("step '{step}' for {target} exited with code {exit_code}")]
    StepFailed {
        target: String,
        step: String,
        exit_code: i32,
    },

    /// A rule's step-construction logic needed state a dependency did not
    /// provide (e.g. a class manifest that was never accumulated).
    #[error("class manifest for {target} is not available")]
    ManifestNotReady { target: String },

    /// Failure persisting or reading the build-record store. Note that a
    /// *corrupt* store entry is not an error: it is a forced cache miss.
    #[error("record store error: {reason}")]
    Store { reason: String },

    /// Filesystem failure outside any step (steps report their own
    /// failures through exit codes).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
