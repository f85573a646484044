//! Packaging compiled classes into a deployable archive.
//!
//! A [`PackageRule`] consumes a class manifest and runs the external
//! `packc` tool over the class directory. It carries the ABI capability:
//! when the manifest's ABI key matches the one recorded on the previous
//! build, the archive is reused even though the rule key changed.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anvil_core::{AbiKey, BuildTarget};

use crate::context::{
    BuildContext, BuildableContext, ABI_KEY_FOR_DEPS_METADATA, ABI_KEY_METADATA,
    FOOTPRINT_ESTIMATE_METADATA,
};
use crate::error::EngineError;
use crate::record::BuildRecord;
use crate::rule::{AbiRule, BuildRule};
use crate::rules::manifest::ClassManifestRule;
use crate::step::fs::{MkdirStep, RemoveFileStep};
use crate::step::shell::ShellStep;
use crate::step::{ExecutionContext, Step};

/// Name of the packaging executable looked up in the toolchain.
const PACKAGE_TOOL: &str = "packc";

/// Packages one library's classes into a `.pack` archive.
#[derive(Debug)]
pub struct PackageRule {
    target: BuildTarget,
    manifest: Arc<ClassManifestRule>,
    footprint: Arc<OnceLock<u64>>,
}

impl PackageRule {
    pub fn new(target: BuildTarget, manifest: Arc<ClassManifestRule>) -> Self {
        PackageRule {
            target,
            manifest,
            footprint: Arc::new(OnceLock::new()),
        }
    }

    /// The estimated archive footprint in bytes, once known: computed
    /// during a build, or restored from the record on a cache hit.
    pub fn footprint_estimate(&self) -> Option<u64> {
        self.footprint.get().copied()
    }

    /// Seeds the footprint cell directly, bypassing step execution.
    pub fn set_footprint_for_testing(&self, bytes: u64) {
        let _ = self.footprint.set(bytes);
    }

    fn output(&self, gen_dir: &std::path::Path) -> PathBuf {
        gen_dir
            .join(self.target.base_path())
            .join(format!("{}.pack", self.target.flavored_name()))
    }
}

impl BuildRule for PackageRule {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn rule_type(&self) -> &str {
        "package"
    }

    fn deps(&self) -> Vec<BuildTarget> {
        vec![self.manifest.target().clone()]
    }

    fn output_path(&self, context: &BuildContext) -> Option<PathBuf> {
        Some(self.output(context.gen_dir()))
    }

    fn build_steps(
        &self,
        context: &BuildContext,
        buildable: &BuildableContext,
    ) -> Result<Vec<Box<dyn Step>>, EngineError> {
        let Some(class_names) = self.manifest.class_names() else {
            return Err(EngineError::ManifestNotReady {
                target: self.target.to_string(),
            });
        };

        let output = self.output(context.gen_dir());
        let parent = output
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| context.gen_dir().to_path_buf());
        let mut steps: Vec<Box<dyn Step>> = vec![
            Box::new(RemoveFileStep::new(output.clone())),
            Box::new(MkdirStep::new(parent)),
        ];

        if class_names.is_empty() {
            // Nothing to package: record the sentinel so dependents see
            // a stable, comparable ABI.
            steps.push(Box::new(RecordEmptyPackageStep {
                buildable: buildable.clone(),
            }));
            return Ok(steps);
        }

        let abi = AbiKey::of_class_manifest(
            class_names.iter().map(|(name, hash)| (name.as_str(), hash)),
        );
        steps.push(Box::new(EstimateFootprintStep {
            classes_dir: self.manifest.classes_dir().to_path_buf(),
            footprint: Arc::clone(&self.footprint),
        }));
        steps.push(Box::new(ShellStep::new(
            PACKAGE_TOOL,
            vec![
                "--output".to_string(),
                output.display().to_string(),
                self.manifest.classes_dir().display().to_string(),
            ],
        )));
        steps.push(Box::new(RecordPackageSuccessStep {
            output,
            abi,
            footprint: Arc::clone(&self.footprint),
            buildable: buildable.clone(),
        }));
        Ok(steps)
    }

    fn initialize_from_cache(
        &self,
        _execution: &ExecutionContext,
        _context: &BuildContext,
        record: &BuildRecord,
    ) -> Result<(), EngineError> {
        if let Some(raw) = record.metadata_value(FOOTPRINT_ESTIMATE_METADATA) {
            let bytes = raw.parse::<u64>().map_err(|_| EngineError::Store {
                reason: format!("malformed footprint estimate '{raw}'"),
            })?;
            let _ = self.footprint.set(bytes);
        }
        Ok(())
    }

    fn abi_rule(&self) -> Option<&dyn AbiRule> {
        Some(self)
    }
}

impl AbiRule for PackageRule {
    fn abi_key_for_deps(&self) -> Option<AbiKey> {
        self.manifest.abi_key()
    }
}

/// Sums file sizes under the class directory into the footprint cell.
/// A crude proxy for archive size, computed before packaging so the
/// record step can persist it even if the estimate is never consumed
/// this invocation.
#[derive(Debug)]
struct EstimateFootprintStep {
    classes_dir: PathBuf,
    footprint: Arc<OnceLock<u64>>,
}

impl EstimateFootprintStep {
    fn total_bytes(&self, context: &ExecutionContext) -> std::io::Result<u64> {
        let root = context.resolve(&self.classes_dir);
        let mut total = 0u64;
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    pending.push(entry.path());
                } else {
                    total += entry.metadata()?.len();
                }
            }
        }
        Ok(total)
    }
}

impl Step for EstimateFootprintStep {
    fn short_name(&self) -> &str {
        "estimate_footprint"
    }

    fn description(&self, context: &ExecutionContext) -> String {
        format!(
            "estimate_footprint {}",
            context.resolve(&self.classes_dir).display()
        )
    }

    fn execute(&self, context: &ExecutionContext) -> i32 {
        match self.total_bytes(context) {
            Ok(total) => {
                let _ = self.footprint.set(total);
                0
            }
            Err(e) => {
                context.log_error(self.short_name(), &format!("size walk failed: {e}"));
                1
            }
        }
    }
}

/// Records the archive artifact plus the ABI and footprint metadata
/// after a successful packaging run.
#[derive(Debug)]
struct RecordPackageSuccessStep {
    output: PathBuf,
    abi: AbiKey,
    footprint: Arc<OnceLock<u64>>,
    buildable: BuildableContext,
}

impl Step for RecordPackageSuccessStep {
    fn short_name(&self) -> &str {
        "record_package_success"
    }

    fn description(&self, context: &ExecutionContext) -> String {
        format!(
            "record_package_success {}",
            context.resolve(&self.output).display()
        )
    }

    fn execute(&self, context: &ExecutionContext) -> i32 {
        let Some(footprint) = self.footprint.get() else {
            context.log_error(self.short_name(), "footprint estimate was never computed");
            return 1;
        };
        self.buildable.record_artifact(&self.output);
        self.buildable
            .add_metadata(ABI_KEY_METADATA, self.abi.to_hex());
        self.buildable
            .add_metadata(ABI_KEY_FOR_DEPS_METADATA, self.abi.to_hex());
        self.buildable
            .add_metadata(FOOTPRINT_ESTIMATE_METADATA, footprint.to_string());
        0
    }
}

/// Records the empty-ABI sentinel for a library with no classes. No
/// artifact: dependents learn there is nothing to merge.
#[derive(Debug)]
struct RecordEmptyPackageStep {
    buildable: BuildableContext,
}

impl Step for RecordEmptyPackageStep {
    fn short_name(&self) -> &str {
        "record_empty_package"
    }

    fn description(&self, _context: &ExecutionContext) -> String {
        "record_empty_package".to_string()
    }

    fn execute(&self, _context: &ExecutionContext) -> i32 {
        let sentinel = AbiKey::empty().to_hex();
        self.buildable
            .add_metadata(ABI_KEY_METADATA, sentinel.clone());
        self.buildable
            .add_metadata(ABI_KEY_FOR_DEPS_METADATA, sentinel);
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::ContentHash;
    use std::collections::BTreeMap;

    fn manifest_rule() -> Arc<ClassManifestRule> {
        Arc::new(ClassManifestRule::new(
            BuildTarget::new("java/com/example", "lib").with_flavor("manifest"),
            BuildTarget::new("java/com/example", "lib"),
            "out/classes/lib",
        ))
    }

    fn package_rule(manifest: Arc<ClassManifestRule>) -> PackageRule {
        PackageRule::new(
            BuildTarget::new("java/com/example", "lib").with_flavor("pack"),
            manifest,
        )
    }

    fn step_descriptions(rule: &PackageRule) -> Vec<String> {
        let execution = ExecutionContext::new("/project");
        rule.build_steps(&BuildContext::new("gen"), &BuildableContext::new())
            .unwrap()
            .iter()
            .map(|step| step.description(&execution))
            .collect()
    }

    #[test]
    fn steps_for_a_populated_manifest() {
        let manifest = manifest_rule();
        manifest.set_class_names_for_testing(BTreeMap::from([(
            "com/example/Foo".to_string(),
            ContentHash::of_bytes(b"foo"),
        )]));

        let rule = package_rule(manifest);
        assert_eq!(
            step_descriptions(&rule),
            vec![
                "rm -f /project/gen/java/com/example/lib#pack.pack".to_string(),
                "mkdir -p /project/gen/java/com/example".to_string(),
                "estimate_footprint /project/out/classes/lib".to_string(),
                "packc --output gen/java/com/example/lib#pack.pack out/classes/lib".to_string(),
                "record_package_success /project/gen/java/com/example/lib#pack.pack".to_string(),
            ]
        );
    }

    #[test]
    fn steps_for_an_empty_manifest() {
        let manifest = manifest_rule();
        manifest.set_class_names_for_testing(BTreeMap::new());

        let rule = package_rule(manifest);
        assert_eq!(
            step_descriptions(&rule),
            vec![
                "rm -f /project/gen/java/com/example/lib#pack.pack".to_string(),
                "mkdir -p /project/gen/java/com/example".to_string(),
                "record_empty_package".to_string(),
            ]
        );
    }

    #[test]
    fn unaccumulated_manifest_is_an_error() {
        let rule = package_rule(manifest_rule());
        let err = rule
            .build_steps(&BuildContext::new("gen"), &BuildableContext::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::ManifestNotReady { .. }));
    }

    #[test]
    fn record_step_persists_abi_and_footprint() {
        let buildable = BuildableContext::new();
        let footprint = Arc::new(OnceLock::new());
        footprint.set(4096u64).unwrap();
        let abi = AbiKey::of_class_manifest([("Foo", &ContentHash::of_bytes(b"foo"))]);

        let step = RecordPackageSuccessStep {
            output: PathBuf::from("gen/java/com/example/lib#pack.pack"),
            abi,
            footprint,
            buildable: buildable.clone(),
        };
        assert_eq!(step.execute(&ExecutionContext::new("/project")), 0);

        assert_eq!(
            buildable.metadata_value(ABI_KEY_METADATA).as_deref(),
            Some(abi.to_hex().as_str())
        );
        assert_eq!(
            buildable.metadata_value(ABI_KEY_FOR_DEPS_METADATA).as_deref(),
            Some(abi.to_hex().as_str())
        );
        assert_eq!(
            buildable
                .metadata_value(FOOTPRINT_ESTIMATE_METADATA)
                .as_deref(),
            Some("4096")
        );
        assert_eq!(
            buildable.recorded_artifacts().len(),
            1,
            "exactly the archive"
        );
    }

    #[test]
    fn empty_record_step_uses_the_sentinel_and_no_artifact() {
        let buildable = BuildableContext::new();
        let step = RecordEmptyPackageStep {
            buildable: buildable.clone(),
        };
        assert_eq!(step.execute(&ExecutionContext::new("/project")), 0);

        let sentinel = AbiKey::empty().to_hex();
        assert_eq!(
            buildable.metadata_value(ABI_KEY_METADATA),
            Some(sentinel.clone())
        );
        assert_eq!(
            buildable.metadata_value(ABI_KEY_FOR_DEPS_METADATA),
            Some(sentinel)
        );
        assert!(buildable.recorded_artifacts().is_empty());
    }

    #[test]
    fn cache_init_restores_the_footprint() {
        let rule = package_rule(manifest_rule());
        let record = BuildRecord {
            rule_key: anvil_core::RuleKeyBuilder::new("package").build(),
            artifacts: Default::default(),
            metadata: BTreeMap::from([(
                FOOTPRINT_ESTIMATE_METADATA.to_string(),
                "1234".to_string(),
            )]),
        };
        rule.initialize_from_cache(
            &ExecutionContext::new("/project"),
            &BuildContext::new("gen"),
            &record,
        )
        .unwrap();
        assert_eq!(rule.footprint_estimate(), Some(1234));
    }
}
