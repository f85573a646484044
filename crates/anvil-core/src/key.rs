//! Rule-key computation: the content fingerprint that decides staleness.
//!
//! A [`RuleKey`] is a deterministic digest over a rule's declared input
//! contents, its configuration fields, and the already-computed keys of
//! its direct dependencies, in the order the rule declares them. Same
//! rule definition + same dependency keys produce a byte-identical key
//! on every machine; wall-clock time, file timestamps, and execution
//! order never enter the fold.
//!
//! Keys for an entire graph live in a [`RuleKeyCache`], a memoized arena
//! filled in topological order (dependencies strictly before dependents).
//! Reading a key that has not been computed yet is a programming error,
//! surfaced as [`CoreError::DependencyKeyNotReady`].

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hash::ContentHash;

/// The content+dependency fingerprint of a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleKey(ContentHash);

impl RuleKey {
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn parse(input: &str) -> Result<Self, CoreError> {
        ContentHash::parse(input).map(RuleKey)
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered fold of rule details into a [`RuleKey`].
///
/// Every entry is framed with a discriminant tag and length-prefixed
/// fields, so two different detail sequences can never collide by
/// concatenation (`("ab","c")` vs `("a","bc")`).
#[derive(Debug)]
pub struct RuleKeyBuilder {
    hasher: blake3::Hasher,
}

impl RuleKeyBuilder {
    /// Starts a key for the given rule type. The type participates in the
    /// key so that two rule kinds with identical details stay distinct.
    pub fn new(rule_type: &str) -> Self {
        let mut builder = RuleKeyBuilder {
            hasher: blake3::Hasher::new(),
        };
        builder.entry(b'T', rule_type.as_bytes(), &[]);
        builder
    }

    /// Folds in a named configuration field.
    pub fn set_field(mut self, name: &str, value: &str) -> Self {
        self.entry(b'F', name.as_bytes(), value.as_bytes());
        self
    }

    /// Folds in a named input by its content hash.
    pub fn set_input(mut self, name: &str, hash: &ContentHash) -> Self {
        self.entry(b'I', name.as_bytes(), hash.as_bytes());
        self
    }

    /// Folds in a direct dependency's key. Callers must add dependencies
    /// in the rule's declared order, not hash-table iteration order.
    pub fn add_dep_key(mut self, dep: &RuleKey) -> Self {
        self.entry(b'D', dep.0.as_bytes(), &[]);
        self
    }

    pub fn build(self) -> RuleKey {
        RuleKey(ContentHash::from_bytes(*self.hasher.finalize().as_bytes()))
    }

    fn entry(&mut self, tag: u8, name: &[u8], value: &[u8]) {
        self.hasher.update(&[tag]);
        self.hasher.update(&(name.len() as u64).to_le_bytes());
        self.hasher.update(name);
        self.hasher.update(&(value.len() as u64).to_le_bytes());
        self.hasher.update(value);
    }
}

/// Memoized per-build arena of node identity to rule key.
#[derive(Debug)]
pub struct RuleKeyCache<T>
where
    T: Clone + Eq + Hash + fmt::Display,
{
    keys: HashMap<T, RuleKey>,
}

impl<T> RuleKeyCache<T>
where
    T: Clone + Eq + Hash + fmt::Display,
{
    pub fn new() -> Self {
        RuleKeyCache {
            keys: HashMap::new(),
        }
    }

    /// The computed key for `node`, or [`CoreError::DependencyKeyNotReady`]
    /// if the engine has not reached it yet.
    pub fn get(&self, node: &T) -> Result<&RuleKey, CoreError> {
        self.keys
            .get(node)
            .ok_or_else(|| CoreError::DependencyKeyNotReady {
                node: node.to_string(),
            })
    }

    pub fn insert(&mut self, node: T, key: RuleKey) {
        self.keys.insert(node, key);
    }
}

impl<T> Default for RuleKeyCache<T>
where
    T: Clone + Eq + Hash + fmt::Display,
{
    fn default() -> Self {
        Self::new()
    }
}
