//! ABI keys: fingerprints of a rule's externally visible surface only.
//!
//! Where a [`RuleKey`](crate::key::RuleKey) changes whenever anything
//! about a rule or its transitive inputs changes, an [`AbiKey`] is
//! derived from the produced interface alone (the sorted set of exported
//! symbol names and their content hashes). A consumer whose dependencies'
//! ABI keys all match the previously recorded values may reuse its
//! cached output even though the producers' rule keys changed.
//!
//! A rule that exports nothing yields the well-defined [`AbiKey::empty`]
//! sentinel rather than an error; "nothing to consume" is an ordinary,
//! cacheable state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hash::ContentHash;

/// Fingerprint of an externally observable interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbiKey(ContentHash);

impl AbiKey {
    /// The sentinel for an empty interface: the digest of zero bytes.
    ///
    /// Used both when a rule produced no output at all and when it
    /// produced output with no exported symbols; consumers treat the two
    /// identically.
    pub fn empty() -> Self {
        AbiKey(ContentHash::of_bytes(&[]))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// Digests a class manifest: `(symbol name, content hash)` entries,
    /// which callers must supply in sorted symbol order (iterate a BTree
    /// container, never a hash map). No entries yields the sentinel.
    ///
    /// The fold mirrors the durable manifest artifact line format
    /// (`<symbol><space><hex hash>`), so the key is stable across any
    /// process that can reproduce the manifest.
    pub fn of_class_manifest<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a ContentHash)>,
    {
        let mut hasher = blake3::Hasher::new();
        let mut saw_entry = false;
        for (symbol, hash) in entries {
            saw_entry = true;
            hasher.update(symbol.as_bytes());
            hasher.update(b" ");
            hasher.update(hash.to_hex().as_bytes());
            hasher.update(b"\n");
        }
        if !saw_entry {
            return Self::empty();
        }
        AbiKey(ContentHash::from_bytes(*hasher.finalize().as_bytes()))
    }

    /// Aggregates the ABI keys of a rule's dependencies, in the rule's
    /// declared dependency order. No dependencies yields the sentinel.
    pub fn for_deps<'a, I>(keys: I) -> Self
    where
        I: IntoIterator<Item = &'a AbiKey>,
    {
        let mut hasher = blake3::Hasher::new();
        let mut saw_key = false;
        for key in keys {
            saw_key = true;
            hasher.update(key.0.as_bytes());
        }
        if !saw_key {
            return Self::empty();
        }
        AbiKey(ContentHash::from_bytes(*hasher.finalize().as_bytes()))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn parse(input: &str) -> Result<Self, CoreError> {
        ContentHash::parse(input).map(AbiKey)
    }
}

impl fmt::Display for AbiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn manifest(entries: &[(&str, &[u8])]) -> BTreeMap<String, ContentHash> {
        entries
            .iter()
            .map(|(symbol, bytes)| (symbol.to_string(), ContentHash::of_bytes(bytes)))
            .collect()
    }

    fn abi_of(manifest: &BTreeMap<String, ContentHash>) -> AbiKey {
        AbiKey::of_class_manifest(manifest.iter().map(|(s, h)| (s.as_str(), h)))
    }

    #[test]
    fn empty_manifest_yields_the_sentinel() {
        let key = abi_of(&manifest(&[]));
        assert_eq!(key, AbiKey::empty());
        assert!(key.is_empty());
    }

    #[test]
    fn manifest_key_is_deterministic() {
        let entries = manifest(&[("com/example/Foo", b"cafebabe")]);
        assert_eq!(abi_of(&entries), abi_of(&entries));
        assert!(!abi_of(&entries).is_empty());
    }

    #[test]
    fn symbol_content_change_changes_the_key() {
        let before = manifest(&[("com/example/Foo", b"cafebabe")]);
        let after = manifest(&[("com/example/Foo", b"deadbeef")]);
        assert_ne!(abi_of(&before), abi_of(&after));
    }

    #[test]
    fn added_symbol_changes_the_key() {
        let one = manifest(&[("com/example/Foo", b"cafebabe")]);
        let two = manifest(&[
            ("com/example/Bar", b"f00d"),
            ("com/example/Foo", b"cafebabe"),
        ]);
        assert_ne!(abi_of(&one), abi_of(&two));
    }

    #[test]
    fn deps_aggregate_is_order_sensitive() {
        let a = abi_of(&manifest(&[("A", b"1")]));
        let b = abi_of(&manifest(&[("B", b"2")]));
        assert_ne!(AbiKey::for_deps([&a, &b]), AbiKey::for_deps([&b, &a]));
    }

    #[test]
    fn no_deps_yields_the_sentinel() {
        assert_eq!(
            AbiKey::for_deps(std::iter::empty::<&AbiKey>()),
            AbiKey::empty()
        );
    }

    #[test]
    fn hex_round_trip() {
        let key = abi_of(&manifest(&[("com/example/Foo", b"cafebabe")]));
        assert_eq!(AbiKey::parse(&key.to_hex()).unwrap(), key);
    }
}
