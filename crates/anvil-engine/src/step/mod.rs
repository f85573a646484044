//! The step-execution protocol.
//!
//! A [`Step`] is an atomic, named, synchronously-executed unit of work
//! with an integer exit status; steps are the only place the engine
//! touches the filesystem or toolchain. A rule composes an ordered
//! sequence of steps, and the engine runs them strictly in order,
//! stopping at the first non-zero exit.
//!
//! Steps are immutable: re-running the same step object with the same
//! context must be safe and idempotent. Failures are reported through
//! the exit code and logged through the context's error sink, never
//! panicked.

pub mod fs;
pub mod shell;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One atomic build action.
pub trait Step: Send + Sync + std::fmt::Debug {
    /// Short machine-friendly name for logging and step-sequence diffing.
    fn short_name(&self) -> &str;

    /// Human-readable description of what executing this step does,
    /// with paths resolved against the context (`rm -f /abs/path`).
    fn description(&self, context: &ExecutionContext) -> String;

    /// Runs the step to completion. Zero is success; any other value is
    /// a hard failure for the owning rule.
    fn execute(&self, context: &ExecutionContext) -> i32;
}

/// Locates toolchain executables by logical name.
///
/// A lookup miss is an ordinary step failure (exit 1, logged), not a
/// panic: which tools exist is the caller's concern.
#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    executables: BTreeMap<String, PathBuf>,
}

impl Toolchain {
    pub fn new() -> Self {
        Toolchain::default()
    }

    pub fn with_tool(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.executables.insert(name.into(), path.into());
        self
    }

    pub fn locate(&self, name: &str) -> Option<&Path> {
        self.executables.get(name).map(PathBuf::as_path)
    }
}

/// Shared services a step reads during execution: project-root path
/// resolution, the toolchain locator, and an error sink.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    project_root: PathBuf,
    toolchain: Toolchain,
}

impl ExecutionContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        ExecutionContext {
            project_root: project_root.into(),
            toolchain: Toolchain::new(),
        }
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolves a project-relative path to an absolute one. Absolute
    /// paths pass through unchanged.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// The error sink steps report failures through before returning a
    /// non-zero exit code.
    pub fn log_error(&self, step: &str, message: &str) {
        tracing::error!(step, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_joins_relative_paths_against_the_root() {
        let context = ExecutionContext::new("/project");
        assert_eq!(
            context.resolve(Path::new("gen/foo/bar.jar")),
            PathBuf::from("/project/gen/foo/bar.jar")
        );
        assert_eq!(
            context.resolve(Path::new("/abs/other")),
            PathBuf::from("/abs/other")
        );
    }

    #[test]
    fn toolchain_locates_registered_tools_only() {
        let toolchain = Toolchain::new().with_tool("packc", "/usr/bin/packc");
        assert_eq!(toolchain.locate("packc"), Some(Path::new("/usr/bin/packc")));
        assert_eq!(toolchain.locate("javac"), None);
    }
}
