//! Per-invocation build environment and the recording surface.
//!
//! [`BuildContext`] is the environment a rule's step-construction logic
//! consumes. [`BuildableContext`] is the surface a rule's steps write
//! back: produced artifact paths and arbitrary metadata key/value pairs,
//! persisted by the record store and consulted on the next invocation's
//! incrementality checks.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Durable metadata key: the ABI key of this rule's own output.
pub const ABI_KEY_METADATA: &str = "abi_key";

/// Durable metadata key: the ABI key aggregated over this rule's
/// dependencies, compared on the next build for the ABI-based skip.
pub const ABI_KEY_FOR_DEPS_METADATA: &str = "abi_key_for_deps";

/// Durable metadata key: a rule's approximate resource footprint, an
/// opaque numeric string consumed by downstream capacity decisions.
pub const FOOTPRINT_ESTIMATE_METADATA: &str = "footprint_estimate";

/// Per-invocation environment handed to `BuildRule::build_steps`.
#[derive(Debug, Clone)]
pub struct BuildContext {
    gen_dir: PathBuf,
}

impl BuildContext {
    pub fn new(gen_dir: impl Into<PathBuf>) -> Self {
        BuildContext {
            gen_dir: gen_dir.into(),
        }
    }

    /// Project-relative root for generated outputs.
    pub fn gen_dir(&self) -> &Path {
        &self.gen_dir
    }
}

/// What one rule execution produced: artifact paths and metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedWork {
    pub artifacts: BTreeSet<PathBuf>,
    pub metadata: BTreeMap<String, String>,
}

/// Cloneable recording handle shared between a rule and its steps.
///
/// Interior-mutable accumulator: a rule is only ever executed by the
/// thread that claimed it, so the lock is uncontended; cloning the
/// handle into record steps mirrors how rules close over the recording
/// surface when constructing their step sequences.
#[derive(Debug, Clone, Default)]
pub struct BuildableContext {
    inner: Arc<Mutex<RecordedWork>>,
}

impl BuildableContext {
    pub fn new() -> Self {
        BuildableContext::default()
    }

    /// Registers a produced artifact path (project-relative).
    pub fn record_artifact(&self, path: impl Into<PathBuf>) {
        self.lock().artifacts.insert(path.into());
    }

    /// Records a metadata key/value pair.
    pub fn add_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().metadata.insert(key.into(), value.into());
    }

    pub fn recorded_artifacts(&self) -> BTreeSet<PathBuf> {
        self.lock().artifacts.clone()
    }

    pub fn metadata_value(&self, key: &str) -> Option<String> {
        self.lock().metadata.get(key).cloned()
    }

    /// Snapshot of everything recorded so far.
    pub fn snapshot(&self) -> RecordedWork {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordedWork> {
        self.inner.lock().expect("buildable context lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_artifacts_and_metadata() {
        let buildable = BuildableContext::new();
        buildable.record_artifact("gen/foo/bar.pack");
        buildable.add_metadata(ABI_KEY_METADATA, "abc123");

        let recorded = buildable.snapshot();
        assert_eq!(
            recorded.artifacts,
            BTreeSet::from([PathBuf::from("gen/foo/bar.pack")])
        );
        assert_eq!(
            recorded.metadata.get(ABI_KEY_METADATA).map(String::as_str),
            Some("abc123")
        );
    }

    #[test]
    fn clones_share_the_accumulator() {
        let buildable = BuildableContext::new();
        let handle = buildable.clone();
        handle.add_metadata("k", "v");
        assert_eq!(buildable.metadata_value("k").as_deref(), Some("v"));
    }
}
