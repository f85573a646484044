//! Running external toolchain executables as steps.

use std::process::Command;

use super::{ExecutionContext, Step};

/// Runs a toolchain executable with a fixed argument list, from the
/// project root. The child's exit code is the step's exit code; a
/// failure to locate or spawn the tool is exit 1.
#[derive(Debug)]
pub struct ShellStep {
    tool: String,
    args: Vec<String>,
}

impl ShellStep {
    pub fn new(tool: impl Into<String>, args: Vec<String>) -> Self {
        ShellStep {
            tool: tool.into(),
            args,
        }
    }
}

impl Step for ShellStep {
    fn short_name(&self) -> &str {
        &self.tool
    }

    fn description(&self, context: &ExecutionContext) -> String {
        let executable = context
            .toolchain()
            .locate(&self.tool)
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| self.tool.clone());
        let mut parts = vec![executable];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn execute(&self, context: &ExecutionContext) -> i32 {
        let Some(executable) = context.toolchain().locate(&self.tool) else {
            context.log_error(
                self.short_name(),
                &format!("toolchain has no executable for '{}'", self.tool),
            );
            return 1;
        };

        let status = Command::new(executable)
            .args(&self.args)
            .current_dir(context.project_root())
            .status();
        match status {
            Ok(status) => status.code().unwrap_or(1),
            Err(e) => {
                context.log_error(
                    self.short_name(),
                    &format!("failed to spawn {}: {e}", executable.display()),
                );
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::Toolchain;

    #[test]
    fn missing_tool_is_a_step_failure() {
        let context = ExecutionContext::new("/tmp");
        let step = ShellStep::new("packc", vec!["--version".to_string()]);
        assert_eq!(step.execute(&context), 1);
    }

    #[test]
    fn description_uses_the_located_executable() {
        let context = ExecutionContext::new("/project")
            .with_toolchain(Toolchain::new().with_tool("packc", "/usr/bin/packc"));
        let step = ShellStep::new(
            "packc",
            vec!["--output".to_string(), "out.pack".to_string()],
        );
        assert_eq!(step.description(&context), "/usr/bin/packc --output out.pack");
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_propagates_from_the_child() {
        let root = tempfile::TempDir::new().unwrap();
        let context = ExecutionContext::new(root.path())
            .with_toolchain(Toolchain::new().with_tool("sh", "/bin/sh"));

        let ok = ShellStep::new("sh", vec!["-c".to_string(), "exit 0".to_string()]);
        assert_eq!(ok.execute(&context), 0);

        let fail = ShellStep::new("sh", vec!["-c".to_string(), "exit 3".to_string()]);
        assert_eq!(fail.execute(&context), 3);
    }
}
