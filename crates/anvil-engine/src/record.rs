//! The build-record store: per-rule keys, artifacts, and metadata from
//! the last successful build.
//!
//! [`RecordStore`] is the storage contract; [`InMemoryRecordStore`] and
//! [`JsonFileStore`] are first-class backends with identical semantics.
//! A record that cannot be read back (missing, unreadable, malformed) is
//! a *forced cache miss*, never a fatal error: the rule is rebuilt and
//! the record rewritten.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anvil_core::{AbiKey, BuildTarget, RuleKey};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::context::{ABI_KEY_FOR_DEPS_METADATA, ABI_KEY_METADATA};
use crate::error::EngineError;

/// Everything recorded for one rule after a successful execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// The rule key the outputs were built with.
    pub rule_key: RuleKey,
    /// Output paths actually produced (project-relative).
    pub artifacts: BTreeSet<PathBuf>,
    /// Metadata mapping; opaque strings to the engine apart from the
    /// ABI keys it compares.
    pub metadata: BTreeMap<String, String>,
}

impl BuildRecord {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The recorded dependency-aggregate ABI key, if present and well
    /// formed. A malformed value reads as `None`: a forced miss.
    pub fn abi_key_for_deps(&self) -> Option<AbiKey> {
        self.parse_abi(ABI_KEY_FOR_DEPS_METADATA)
    }

    /// The recorded ABI key of this rule's own output.
    pub fn abi_key(&self) -> Option<AbiKey> {
        self.parse_abi(ABI_KEY_METADATA)
    }

    fn parse_abi(&self, key: &str) -> Option<AbiKey> {
        let raw = self.metadata_value(key)?;
        match AbiKey::parse(raw) {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(key, raw, "malformed ABI key in build record; forcing miss");
                None
            }
        }
    }
}

/// Storage contract for build records, keyed by node identity.
///
/// `store` takes `&self`: backends must support safe concurrent update,
/// and the engine guarantees at most one writer per target.
pub trait RecordStore: Send + Sync {
    fn load(&self, target: &BuildTarget) -> Option<BuildRecord>;
    fn store(&self, target: &BuildTarget, record: BuildRecord);
    fn targets(&self) -> Vec<BuildTarget>;
}

/// Ephemeral backend for tests and single-invocation use.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: DashMap<BuildTarget, BuildRecord>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        InMemoryRecordStore::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn load(&self, target: &BuildTarget) -> Option<BuildRecord> {
        self.records.get(target).map(|entry| entry.clone())
    }

    fn store(&self, target: &BuildTarget, record: BuildRecord) {
        self.records.insert(target.clone(), record);
    }

    fn targets(&self) -> Vec<BuildTarget> {
        let mut targets: Vec<BuildTarget> =
            self.records.iter().map(|entry| entry.key().clone()).collect();
        targets.sort();
        targets
    }
}

/// Durable backend: one JSON file mapping target strings to records.
///
/// Loading tolerates a missing or corrupt file by starting empty (every
/// rule becomes a cache miss); [`JsonFileStore::persist`] rewrites the
/// whole file in sorted target order.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: DashMap<BuildTarget, BuildRecord>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = DashMap::new();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, BuildRecord>>(&contents)
            {
                Ok(parsed) => {
                    for (raw_target, record) in parsed {
                        match BuildTarget::parse(&raw_target) {
                            Ok(target) => {
                                records.insert(target, record);
                            }
                            Err(_) => {
                                tracing::warn!(
                                    target = raw_target,
                                    "unparseable target in record store; dropping entry"
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "corrupt record store; treating all rules as cache misses"
                    );
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "unreadable record store; treating all rules as cache misses"
                );
            }
        }
        JsonFileStore { path, records }
    }

    /// Writes all records back to disk.
    pub fn persist(&self) -> Result<(), EngineError> {
        let sorted: BTreeMap<String, BuildRecord> = self
            .records
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().clone()))
            .collect();
        let json = serde_json::to_string_pretty(&sorted).map_err(|e| EngineError::Store {
            reason: e.to_string(),
        })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self, target: &BuildTarget) -> Option<BuildRecord> {
        self.records.get(target).map(|entry| entry.clone())
    }

    fn store(&self, target: &BuildTarget, record: BuildRecord) {
        self.records.insert(target.clone(), record);
    }

    fn targets(&self) -> Vec<BuildTarget> {
        let mut targets: Vec<BuildTarget> =
            self.records.iter().map(|entry| entry.key().clone()).collect();
        targets.sort();
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::{ContentHash, RuleKeyBuilder};
    use tempfile::TempDir;

    fn sample_record() -> BuildRecord {
        let abi = AbiKey::of_class_manifest(
            [("com/example/Foo", &ContentHash::of_bytes(b"cafebabe"))]
                .into_iter()
                .map(|(s, h)| (s, h)),
        );
        BuildRecord {
            rule_key: RuleKeyBuilder::new("package").set_field("v", "1").build(),
            artifacts: BTreeSet::from([PathBuf::from("gen/foo/bar.pack")]),
            metadata: BTreeMap::from([
                (ABI_KEY_METADATA.to_string(), abi.to_hex()),
                (ABI_KEY_FOR_DEPS_METADATA.to_string(), abi.to_hex()),
            ]),
        }
    }

    #[test]
    fn in_memory_round_trip() {
        let store = InMemoryRecordStore::new();
        let target = BuildTarget::new("foo", "bar");
        assert!(store.load(&target).is_none());

        store.store(&target, sample_record());
        assert_eq!(store.load(&target).unwrap(), sample_record());
        assert_eq!(store.targets(), vec![target]);
    }

    #[test]
    fn json_store_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        let target = BuildTarget::new("foo", "bar").with_flavor("pack");

        let store = JsonFileStore::open(&path);
        store.store(&target, sample_record());
        store.persist().unwrap();

        let reloaded = JsonFileStore::open(&path);
        assert_eq!(reloaded.load(&target).unwrap(), sample_record());
    }

    #[test]
    fn corrupt_store_file_is_a_forced_miss_not_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "{ this is not json").unwrap();

        let store = JsonFileStore::open(&path);
        assert!(store.targets().is_empty());
        assert!(store.load(&BuildTarget::new("foo", "bar")).is_none());
    }

    #[test]
    fn malformed_abi_metadata_reads_as_none() {
        let mut record = sample_record();
        record
            .metadata
            .insert(ABI_KEY_FOR_DEPS_METADATA.to_string(), "garbage".to_string());
        assert!(record.abi_key_for_deps().is_none());
        assert!(record.abi_key().is_some());
    }
}
