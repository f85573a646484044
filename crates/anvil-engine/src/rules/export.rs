//! Exporting a source file into the generated-output tree.

use std::path::PathBuf;

use anvil_core::{BuildTarget, RuleKeyBuilder};

use crate::context::{BuildContext, BuildableContext};
use crate::error::EngineError;
use crate::rule::BuildRule;
use crate::step::fs::{CopyStep, MkdirStep};
use crate::step::Step;

/// Copies one source file to a deterministic location under the
/// generated-output root. The simplest rule kind: no dependencies, one
/// input, one output.
#[derive(Debug)]
pub struct ExportFileRule {
    target: BuildTarget,
    source: PathBuf,
    out_name: String,
}

impl ExportFileRule {
    /// Exports the file named after the target's short name, from the
    /// target's base path.
    pub fn new(target: BuildTarget) -> Self {
        let source = PathBuf::from(target.base_path()).join(target.short_name());
        let out_name = target.short_name().to_string();
        ExportFileRule {
            target,
            source,
            out_name,
        }
    }

    /// Overrides the source file to export.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }

    /// Overrides the output file name.
    pub fn with_out_name(mut self, out_name: impl Into<String>) -> Self {
        self.out_name = out_name.into();
        self
    }

    fn output(&self, context: &BuildContext) -> PathBuf {
        context
            .gen_dir()
            .join(self.target.base_path())
            .join(&self.out_name)
    }
}

impl BuildRule for ExportFileRule {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn rule_type(&self) -> &str {
        "export_file"
    }

    fn inputs(&self) -> Vec<PathBuf> {
        vec![self.source.clone()]
    }

    fn append_to_rule_key(&self, builder: RuleKeyBuilder) -> RuleKeyBuilder {
        builder.set_field("out", &self.out_name)
    }

    fn output_path(&self, context: &BuildContext) -> Option<PathBuf> {
        Some(self.output(context))
    }

    fn build_steps(
        &self,
        context: &BuildContext,
        buildable: &BuildableContext,
    ) -> Result<Vec<Box<dyn Step>>, EngineError> {
        let output = self.output(context);
        let parent = output
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| context.gen_dir().to_path_buf());
        buildable.record_artifact(&output);
        Ok(vec![
            Box::new(MkdirStep::new(parent)),
            Box::new(CopyStep::new(self.source.clone(), output)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::ExecutionContext;

    fn descriptions(rule: &ExportFileRule) -> Vec<String> {
        let context = BuildContext::new("gen");
        let buildable = BuildableContext::new();
        let execution = ExecutionContext::new("/project");
        rule.build_steps(&context, &buildable)
            .unwrap()
            .iter()
            .map(|step| step.description(&execution))
            .collect()
    }

    #[test]
    fn default_source_and_output_follow_the_target() {
        let rule = ExportFileRule::new(BuildTarget::new("res/icons", "logo.png"));
        assert_eq!(
            descriptions(&rule),
            vec![
                "mkdir -p /project/gen/res/icons".to_string(),
                "cp /project/res/icons/logo.png /project/gen/res/icons/logo.png".to_string(),
            ]
        );
    }

    #[test]
    fn overrides_change_both_key_and_steps() {
        let target = BuildTarget::new("res/icons", "logo");
        let default_key = ExportFileRule::new(target.clone())
            .append_to_rule_key(RuleKeyBuilder::new("export_file"))
            .build();
        let renamed = ExportFileRule::new(target)
            .with_source("res/icons/logo-v2.png")
            .with_out_name("logo.png");
        let renamed_key = renamed
            .append_to_rule_key(RuleKeyBuilder::new("export_file"))
            .build();

        assert_ne!(default_key, renamed_key);
        assert_eq!(renamed.inputs(), vec![PathBuf::from("res/icons/logo-v2.png")]);
        assert_eq!(
            descriptions(&renamed)[1],
            "cp /project/res/icons/logo-v2.png /project/gen/res/icons/logo.png"
        );
    }

    #[test]
    fn records_the_output_artifact() {
        let rule = ExportFileRule::new(BuildTarget::new("res", "a.txt"));
        let buildable = BuildableContext::new();
        rule.build_steps(&BuildContext::new("gen"), &buildable)
            .unwrap();
        assert!(buildable
            .recorded_artifacts()
            .contains(&PathBuf::from("gen/res/a.txt")));
    }
}
