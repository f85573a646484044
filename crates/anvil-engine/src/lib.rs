//! Execution half of the build system: steps, rules, caching, and the
//! parallel executor.
//!
//! `anvil-core` owns the pure data model (targets, graphs, keys);
//! this crate owns everything that touches the world. The pieces:
//!
//! - [`step`]: atomic build actions with exit-code semantics, plus the
//!   [`step::ExecutionContext`] they run against.
//! - [`rule`]: the [`rule::BuildRule`] trait every rule kind implements,
//!   and the optional [`rule::AbiRule`] capability.
//! - [`rules`]: concrete rule kinds (file export, class manifests,
//!   packaging).
//! - [`record`]: the build-record store consulted for cache decisions.
//! - [`hash_cache`]: memoized content hashing of input files.
//! - [`executor`]: graph planning, rule-key computation, the cache
//!   decision ladder, and the worker pool.
//!
//! A typical invocation constructs an [`executor::BuildEngine`] over an
//! [`step::ExecutionContext`] and a [`record::RecordStore`], registers
//! rules, and calls [`executor::BuildEngine::build`].

pub mod context;
pub mod error;
pub mod executor;
pub mod hash_cache;
pub mod record;
pub mod rule;
pub mod rules;
pub mod step;

pub use context::{BuildContext, BuildableContext};
pub use error::EngineError;
pub use executor::{BuildEngine, BuildOptions, BuildSummary, RuleOutcome};
pub use hash_cache::FileHashCache;
pub use record::{BuildRecord, InMemoryRecordStore, JsonFileStore, RecordStore};
pub use rule::{AbiRule, BuildRule};
pub use rules::{ClassManifestRule, ExportFileRule, PackageRule};
pub use step::{ExecutionContext, Step, Toolchain};
