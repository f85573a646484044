//! Class-manifest rules: the ABI surface of a compiled library.
//!
//! A [`ClassManifestRule`] walks its library's compiled-class directory,
//! hashes every class file, and writes a sorted `name hash` manifest.
//! The manifest is the rule's dependents-facing surface: its ABI key is
//! what package rules compare to decide whether repackaging is needed.

use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anvil_core::{AbiKey, BuildTarget, ContentHash};

use crate::context::{BuildContext, BuildableContext, ABI_KEY_METADATA};
use crate::error::EngineError;
use crate::record::BuildRecord;
use crate::rule::BuildRule;
use crate::step::fs::MkdirStep;
use crate::step::{ExecutionContext, Step};

/// File extension recognized as a compiled class.
const CLASS_SUFFIX: &str = ".class";

type ClassNames = BTreeMap<String, ContentHash>;

/// Produces the sorted class-name manifest for one compiled library.
///
/// The accumulated names live in a shared cell so that dependent rules
/// constructed with a handle to this rule can read them after it runs
/// (or after it is re-hydrated from a previous build's manifest file).
#[derive(Debug)]
pub struct ClassManifestRule {
    target: BuildTarget,
    library: BuildTarget,
    classes_dir: PathBuf,
    class_names: Arc<OnceLock<ClassNames>>,
}

impl ClassManifestRule {
    pub fn new(
        target: BuildTarget,
        library: BuildTarget,
        classes_dir: impl Into<PathBuf>,
    ) -> Self {
        ClassManifestRule {
            target,
            library,
            classes_dir: classes_dir.into(),
            class_names: Arc::new(OnceLock::new()),
        }
    }

    /// The accumulated class names, or `None` before this rule has run
    /// (or been re-hydrated) in this invocation.
    pub fn class_names(&self) -> Option<&ClassNames> {
        self.class_names.get()
    }

    /// The compiled-class directory this manifest covers.
    pub fn classes_dir(&self) -> &Path {
        &self.classes_dir
    }

    /// The ABI key over the accumulated class names.
    pub fn abi_key(&self) -> Option<AbiKey> {
        self.class_names().map(|names| {
            AbiKey::of_class_manifest(names.iter().map(|(name, hash)| (name.as_str(), hash)))
        })
    }

    fn manifest_path(&self, gen_dir: &Path) -> PathBuf {
        gen_dir
            .join(self.target.base_path())
            .join(format!("{}.classes.txt", self.target.short_name()))
    }

    /// Seeds the class-name cell directly, bypassing step execution.
    pub fn set_class_names_for_testing(&self, names: ClassNames) {
        let _ = self.class_names.set(names);
    }
}

impl BuildRule for ClassManifestRule {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn rule_type(&self) -> &str {
        "class_manifest"
    }

    fn deps(&self) -> Vec<BuildTarget> {
        vec![self.library.clone()]
    }

    fn output_path(&self, context: &BuildContext) -> Option<PathBuf> {
        Some(self.manifest_path(context.gen_dir()))
    }

    fn build_steps(
        &self,
        context: &BuildContext,
        buildable: &BuildableContext,
    ) -> Result<Vec<Box<dyn Step>>, EngineError> {
        let manifest = self.manifest_path(context.gen_dir());
        let parent = manifest
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| context.gen_dir().to_path_buf());
        Ok(vec![
            Box::new(MkdirStep::new(parent)),
            Box::new(AccumulateClassNamesStep {
                classes_dir: self.classes_dir.clone(),
                manifest,
                class_names: Arc::clone(&self.class_names),
                buildable: buildable.clone(),
            }),
        ])
    }

    fn initialize_from_cache(
        &self,
        execution: &ExecutionContext,
        context: &BuildContext,
        _record: &BuildRecord,
    ) -> Result<(), EngineError> {
        let manifest = execution.resolve(&self.manifest_path(context.gen_dir()));
        let contents = fs::read_to_string(&manifest)?;
        let names = parse_manifest(&contents).ok_or_else(|| EngineError::Store {
            reason: format!("malformed class manifest at {}", manifest.display()),
        })?;
        let _ = self.class_names.set(names);
        Ok(())
    }
}

fn parse_manifest(contents: &str) -> Option<ClassNames> {
    let mut names = ClassNames::new();
    for line in contents.lines() {
        let (name, hash) = line.split_once(' ')?;
        names.insert(name.to_string(), ContentHash::parse(hash).ok()?);
    }
    Some(names)
}

/// Walks the class directory, hashes every `.class` file, and writes the
/// sorted manifest. Slash-separated paths relative to the class root,
/// with the suffix stripped, are the symbol names.
#[derive(Debug)]
struct AccumulateClassNamesStep {
    classes_dir: PathBuf,
    manifest: PathBuf,
    class_names: Arc<OnceLock<ClassNames>>,
    buildable: BuildableContext,
}

impl AccumulateClassNamesStep {
    fn accumulate(&self, context: &ExecutionContext) -> Result<ClassNames, EngineError> {
        let root = context.resolve(&self.classes_dir);
        let mut names = ClassNames::new();
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&root) else {
                    continue;
                };
                let joined = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let Some(symbol) = joined.strip_suffix(CLASS_SUFFIX) else {
                    continue;
                };
                let mut file = File::open(&path)?;
                names.insert(symbol.to_string(), ContentHash::of_reader(&mut file)?);
            }
        }
        Ok(names)
    }
}

impl Step for AccumulateClassNamesStep {
    fn short_name(&self) -> &str {
        "accumulate_class_names"
    }

    fn description(&self, context: &ExecutionContext) -> String {
        format!(
            "accumulate_class_names {} > {}",
            context.resolve(&self.classes_dir).display(),
            context.resolve(&self.manifest).display()
        )
    }

    fn execute(&self, context: &ExecutionContext) -> i32 {
        let names = match self.accumulate(context) {
            Ok(names) => names,
            Err(e) => {
                context.log_error(self.short_name(), &format!("class walk failed: {e}"));
                return 1;
            }
        };

        let mut contents = String::new();
        for (name, hash) in &names {
            contents.push_str(name);
            contents.push(' ');
            contents.push_str(&hash.to_hex());
            contents.push('\n');
        }
        let manifest = context.resolve(&self.manifest);
        if let Err(e) = fs::write(&manifest, contents) {
            context.log_error(
                self.short_name(),
                &format!("failed to write {}: {e}", manifest.display()),
            );
            return 1;
        }

        let abi = AbiKey::of_class_manifest(names.iter().map(|(name, hash)| (name.as_str(), hash)));
        self.buildable.record_artifact(&self.manifest);
        self.buildable.add_metadata(ABI_KEY_METADATA, abi.to_hex());
        let _ = self.class_names.set(names);
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rule() -> ClassManifestRule {
        ClassManifestRule::new(
            BuildTarget::new("java/com/example", "lib").with_flavor("manifest"),
            BuildTarget::new("java/com/example", "lib"),
            "out/classes/lib",
        )
    }

    fn run_manifest_steps(root: &TempDir, rule: &ClassManifestRule) -> BuildableContext {
        let buildable = BuildableContext::new();
        let execution = ExecutionContext::new(root.path());
        let steps = rule
            .build_steps(&BuildContext::new("gen"), &buildable)
            .unwrap();
        for step in steps {
            assert_eq!(step.execute(&execution), 0, "step {}", step.short_name());
        }
        buildable
    }

    #[test]
    fn writes_sorted_manifest_and_sets_abi_key() {
        let root = TempDir::new().unwrap();
        let classes = root.path().join("out/classes/lib");
        fs::create_dir_all(classes.join("com/example")).unwrap();
        fs::write(classes.join("com/example/Zeta.class"), b"zeta").unwrap();
        fs::write(classes.join("com/example/Alpha.class"), b"alpha").unwrap();
        fs::write(classes.join("com/example/notes.txt"), b"ignored").unwrap();

        let rule = rule();
        let buildable = run_manifest_steps(&root, &rule);

        let manifest = root.path().join("gen/java/com/example/lib.classes.txt");
        let contents = fs::read_to_string(&manifest).unwrap();
        let expected = format!(
            "com/example/Alpha {}\ncom/example/Zeta {}\n",
            ContentHash::of_bytes(b"alpha").to_hex(),
            ContentHash::of_bytes(b"zeta").to_hex(),
        );
        assert_eq!(contents, expected);

        let abi = rule.abi_key().unwrap();
        assert!(!abi.is_empty());
        assert_eq!(
            buildable.metadata_value(ABI_KEY_METADATA).as_deref(),
            Some(abi.to_hex().as_str())
        );
    }

    #[test]
    fn empty_class_dir_yields_the_empty_abi_key() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("out/classes/lib")).unwrap();

        let rule = rule();
        run_manifest_steps(&root, &rule);
        assert!(rule.abi_key().unwrap().is_empty());
    }

    #[test]
    fn rehydrates_class_names_from_the_manifest_file() {
        let root = TempDir::new().unwrap();
        let classes = root.path().join("out/classes/lib");
        fs::create_dir_all(&classes).unwrap();
        fs::write(classes.join("Main.class"), b"main").unwrap();

        let built = rule();
        run_manifest_steps(&root, &built);

        // A fresh rule instance, as a later invocation would construct.
        let rehydrated = rule();
        let record = BuildRecord {
            rule_key: anvil_core::RuleKeyBuilder::new("class_manifest").build(),
            artifacts: Default::default(),
            metadata: Default::default(),
        };
        rehydrated
            .initialize_from_cache(
                &ExecutionContext::new(root.path()),
                &BuildContext::new("gen"),
                &record,
            )
            .unwrap();
        assert_eq!(rehydrated.class_names(), built.class_names());
        assert_eq!(rehydrated.abi_key(), built.abi_key());
    }

    #[test]
    fn renaming_a_class_changes_the_abi_key() {
        let rule_a = rule();
        rule_a.set_class_names_for_testing(BTreeMap::from([(
            "com/example/Foo".to_string(),
            ContentHash::of_bytes(b"body"),
        )]));
        let rule_b = rule();
        rule_b.set_class_names_for_testing(BTreeMap::from([(
            "com/example/Bar".to_string(),
            ContentHash::of_bytes(b"body"),
        )]));
        assert_ne!(rule_a.abi_key(), rule_b.abi_key());
    }
}
