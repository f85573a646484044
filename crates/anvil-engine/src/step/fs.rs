//! Filesystem steps: the primitive actions rules compose.

use std::fs;
use std::path::PathBuf;

use super::{ExecutionContext, Step};

/// Deletes a file if it exists (`rm -f` semantics: a missing file is
/// success). Rules put this first to guarantee a stale output never
/// survives a rebuild.
#[derive(Debug)]
pub struct RemoveFileStep {
    path: PathBuf,
}

impl RemoveFileStep {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RemoveFileStep { path: path.into() }
    }
}

impl Step for RemoveFileStep {
    fn short_name(&self) -> &str {
        "rm"
    }

    fn description(&self, context: &ExecutionContext) -> String {
        format!("rm -f {}", context.resolve(&self.path).display())
    }

    fn execute(&self, context: &ExecutionContext) -> i32 {
        let path = context.resolve(&self.path);
        match fs::remove_file(&path) {
            Ok(()) => 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                context.log_error(
                    self.short_name(),
                    &format!("failed to remove {}: {e}", path.display()),
                );
                1
            }
        }
    }
}

/// Creates a directory and all missing parents (`mkdir -p`).
#[derive(Debug)]
pub struct MkdirStep {
    path: PathBuf,
}

impl MkdirStep {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MkdirStep { path: path.into() }
    }
}

impl Step for MkdirStep {
    fn short_name(&self) -> &str {
        "mkdir"
    }

    fn description(&self, context: &ExecutionContext) -> String {
        format!("mkdir -p {}", context.resolve(&self.path).display())
    }

    fn execute(&self, context: &ExecutionContext) -> i32 {
        let path = context.resolve(&self.path);
        match fs::create_dir_all(&path) {
            Ok(()) => 0,
            Err(e) => {
                context.log_error(
                    self.short_name(),
                    &format!("failed to create {}: {e}", path.display()),
                );
                1
            }
        }
    }
}

/// Copies a file. Copied rather than symlinked so the output stays an
/// ordinary file when archived and unpacked elsewhere.
#[derive(Debug)]
pub struct CopyStep {
    source: PathBuf,
    dest: PathBuf,
}

impl CopyStep {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        CopyStep {
            source: source.into(),
            dest: dest.into(),
        }
    }
}

impl Step for CopyStep {
    fn short_name(&self) -> &str {
        "cp"
    }

    fn description(&self, context: &ExecutionContext) -> String {
        format!(
            "cp {} {}",
            context.resolve(&self.source).display(),
            context.resolve(&self.dest).display()
        )
    }

    fn execute(&self, context: &ExecutionContext) -> i32 {
        let source = context.resolve(&self.source);
        let dest = context.resolve(&self.dest);
        match fs::copy(&source, &dest) {
            Ok(_) => 0,
            Err(e) => {
                context.log_error(
                    self.short_name(),
                    &format!(
                        "failed to copy {} to {}: {e}",
                        source.display(),
                        dest.display()
                    ),
                );
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(root: &TempDir) -> ExecutionContext {
        ExecutionContext::new(root.path())
    }

    #[test]
    fn remove_file_is_idempotent() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("stale.out");
        fs::write(&file, "stale").unwrap();

        let step = RemoveFileStep::new("stale.out");
        assert_eq!(step.execute(&context(&root)), 0);
        assert!(!file.exists());
        // Second run: nothing to remove, still success.
        assert_eq!(step.execute(&context(&root)), 0);
    }

    #[test]
    fn mkdir_creates_nested_directories() {
        let root = TempDir::new().unwrap();
        let step = MkdirStep::new("a/b/c");
        assert_eq!(step.execute(&context(&root)), 0);
        assert!(root.path().join("a/b/c").is_dir());
        // Idempotent.
        assert_eq!(step.execute(&context(&root)), 0);
    }

    #[test]
    fn copy_transfers_contents() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("src.txt"), "payload").unwrap();

        let step = CopyStep::new("src.txt", "dst.txt");
        assert_eq!(step.execute(&context(&root)), 0);
        assert_eq!(
            fs::read_to_string(root.path().join("dst.txt")).unwrap(),
            "payload"
        );
    }

    #[test]
    fn copy_of_missing_source_fails_with_nonzero_exit() {
        let root = TempDir::new().unwrap();
        let step = CopyStep::new("missing.txt", "dst.txt");
        assert_eq!(step.execute(&context(&root)), 1);
    }

    #[test]
    fn descriptions_resolve_paths() {
        let context = ExecutionContext::new("/project");
        assert_eq!(
            RemoveFileStep::new("gen/foo/bar.pack").description(&context),
            "rm -f /project/gen/foo/bar.pack"
        );
        assert_eq!(
            MkdirStep::new("gen/foo").description(&context),
            "mkdir -p /project/gen/foo"
        );
    }
}
