//! Build-target identity.
//!
//! A [`BuildTarget`] is the opaque, hashable, totally-ordered value that
//! uniquely identifies a rule and serves as the graph vertex key. It is a
//! base path plus a short name plus an optional flavor suffix, displayed
//! as `//base/path:name#flavor`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Uniquely identifies a buildable rule.
///
/// Ordering is lexicographic over (base path, short name, flavor), which
/// gives every collection keyed by targets a stable, reproducible order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildTarget {
    base_path: String,
    short_name: String,
    flavor: Option<String>,
}

impl BuildTarget {
    /// Creates an unflavored target.
    pub fn new(base_path: impl Into<String>, short_name: impl Into<String>) -> Self {
        BuildTarget {
            base_path: base_path.into(),
            short_name: short_name.into(),
            flavor: None,
        }
    }

    /// Derives a flavored variant of this target, e.g. `//foo:bar#pack`.
    ///
    /// Flavored targets identify synthetic rules attached to a declared
    /// rule (the packaging rule derived from a library rule, for example).
    pub fn with_flavor(&self, flavor: impl Into<String>) -> Self {
        BuildTarget {
            base_path: self.base_path.clone(),
            short_name: self.short_name.clone(),
            flavor: Some(flavor.into()),
        }
    }

    /// The base path component, without the leading `//`.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The short name component.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// The flavor suffix, if any.
    pub fn flavor(&self) -> Option<&str> {
        self.flavor.as_deref()
    }

    /// The short name with the flavor suffix appended, suitable for use in
    /// generated file names (`bar` or `bar#pack`).
    pub fn flavored_name(&self) -> String {
        match &self.flavor {
            Some(flavor) => format!("{}#{}", self.short_name, flavor),
            None => self.short_name.clone(),
        }
    }

    /// Parses the display form `//base/path:name[#flavor]`.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidTarget {
            input: input.to_string(),
        };

        let rest = input.strip_prefix("//").ok_or_else(invalid)?;
        let (base_path, name) = rest.split_once(':').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }

        let (short_name, flavor) = match name.split_once('#') {
            Some((short, flavor)) if !short.is_empty() && !flavor.is_empty() => {
                (short.to_string(), Some(flavor.to_string()))
            }
            Some(_) => return Err(invalid()),
            None => (name.to_string(), None),
        };

        Ok(BuildTarget {
            base_path: base_path.to_string(),
            short_name,
            flavor,
        })
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "//{}:{}", self.base_path, self.short_name)?;
        if let Some(flavor) = &self.flavor {
            write!(f, "#{flavor}")?;
        }
        Ok(())
    }
}
