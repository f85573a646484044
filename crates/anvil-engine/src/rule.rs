//! The buildable-rule capability set.
//!
//! Every rule kind implements [`BuildRule`]: declare dependencies,
//! declare inputs, contribute configuration to the rule key, and produce
//! an ordered step sequence given a build context. The optional
//! [`AbiRule`] capability marks rules whose rebuild decision can use the
//! coarser ABI comparison instead of the full rule key.

use std::path::PathBuf;

use anvil_core::{AbiKey, BuildTarget, RuleKeyBuilder};

use crate::context::{BuildContext, BuildableContext};
use crate::error::EngineError;
use crate::record::BuildRecord;
use crate::step::{ExecutionContext, Step};

/// One buildable unit: a graph node plus the procedure that yields its
/// step sequence.
///
/// Rules never mutate their dependencies after construction; the engine
/// shares each rule read-only between the graph and the scheduler.
pub trait BuildRule: Send + Sync {
    /// The node identity of this rule.
    fn target(&self) -> &BuildTarget;

    /// Rule kind tag, folded into the rule key.
    fn rule_type(&self) -> &str;

    /// Direct dependencies, in declared order. The order is part of the
    /// rule-key contract.
    fn deps(&self) -> Vec<BuildTarget> {
        Vec::new()
    }

    /// Input files whose contents participate in the rule key.
    fn inputs(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Folds rule-specific configuration into the key. Inputs and
    /// dependency keys are handled by the engine; only add what the
    /// engine cannot see.
    fn append_to_rule_key(&self, builder: RuleKeyBuilder) -> RuleKeyBuilder {
        builder
    }

    /// The single output artifact path, if this rule kind has one,
    /// resolved against the invocation's generated-output root.
    fn output_path(&self, context: &BuildContext) -> Option<PathBuf> {
        let _ = context;
        None
    }

    /// Builds the ordered step sequence for one execution. `buildable`
    /// is the recording surface; rules clone it into their record steps.
    fn build_steps(
        &self,
        context: &BuildContext,
        buildable: &BuildableContext,
    ) -> Result<Vec<Box<dyn Step>>, EngineError>;

    /// Re-hydrates in-memory state from a previous build's record when
    /// the engine decides this rule is a cache hit and its steps will
    /// not run. An error here forces a rebuild instead of failing.
    fn initialize_from_cache(
        &self,
        execution: &ExecutionContext,
        context: &BuildContext,
        record: &BuildRecord,
    ) -> Result<(), EngineError> {
        let _ = (execution, context, record);
        Ok(())
    }

    /// The ABI capability, for rules whose dependents-facing surface is
    /// coarser than their rule key.
    fn abi_rule(&self) -> Option<&dyn AbiRule> {
        None
    }
}

/// Capability: this rule's rebuild decision may compare dependency ABI
/// keys instead of the full rule key.
pub trait AbiRule {
    /// The current ABI key aggregated over this rule's dependencies, or
    /// `None` if a dependency's ABI is not yet known (which disables the
    /// ABI-based skip for this build).
    fn abi_key_for_deps(&self) -> Option<AbiKey>;
}
