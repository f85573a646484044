//! The build executor: graph planning, rule-key computation, cache
//! decisions, and the worker pool.
//!
//! A build runs in two phases. Planning is sequential: freeze the
//! dependency graph, then compute every rule key in dependencies-first
//! order (a dependent's key folds in its dependencies' keys, so the
//! order is mandatory). Execution is parallel: a fixed pool of workers
//! drains a ready queue, and the coordinator releases a rule only once
//! all of its dependencies have succeeded.
//!
//! Failure is rule-scoped. A failed rule poisons its transitive
//! dependents (marked [`RuleOutcome::Skipped`]) but independent
//! subgraphs keep building under `keep_going`; without it, everything
//! not already in flight is skipped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use anvil_core::{
    BuildTarget, ImmutableGraph, MutableGraph, RuleKey, RuleKeyBuilder, RuleKeyCache,
};

use crate::context::{BuildContext, BuildableContext};
use crate::error::EngineError;
use crate::hash_cache::FileHashCache;
use crate::record::{BuildRecord, RecordStore};
use crate::rule::BuildRule;
use crate::step::ExecutionContext;

/// Terminal state of one rule in one build invocation.
#[derive(Debug, Clone)]
pub enum RuleOutcome {
    /// Outputs were reused; no step ran.
    CacheHit,
    /// All steps ran and exited zero.
    Succeeded,
    /// Step construction or a step itself failed. Shared, because the
    /// underlying error (often IO) is not clonable.
    Failed(Arc<EngineError>),
    /// Never attempted: a transitive dependency failed, or the build
    /// aborted after an unrelated failure.
    Skipped,
}

impl RuleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RuleOutcome::CacheHit | RuleOutcome::Succeeded)
    }
}

/// Knobs for one build invocation.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Worker-pool size. Clamped to at least one.
    pub jobs: usize,
    /// Keep building independent subgraphs after a failure.
    pub keep_going: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            jobs: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            keep_going: false,
        }
    }
}

/// Per-target outcomes of a finished build.
#[derive(Debug)]
pub struct BuildSummary {
    outcomes: BTreeMap<BuildTarget, RuleOutcome>,
}

impl BuildSummary {
    pub fn outcome(&self, target: &BuildTarget) -> Option<&RuleOutcome> {
        self.outcomes.get(target)
    }

    pub fn outcomes(&self) -> impl Iterator<Item = (&BuildTarget, &RuleOutcome)> {
        self.outcomes.iter()
    }

    /// True when every rule reached a successful terminal state.
    pub fn success(&self) -> bool {
        self.outcomes.values().all(RuleOutcome::is_success)
    }
}

/// Owns the rule set and drives builds over it.
pub struct BuildEngine {
    rules: HashMap<BuildTarget, Arc<dyn BuildRule>>,
    execution: ExecutionContext,
    build_context: BuildContext,
    store: Arc<dyn RecordStore>,
    options: BuildOptions,
}

impl BuildEngine {
    pub fn new(execution: ExecutionContext, store: Arc<dyn RecordStore>) -> Self {
        BuildEngine {
            rules: HashMap::new(),
            execution,
            build_context: BuildContext::new("gen"),
            store,
            options: BuildOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_gen_dir(mut self, gen_dir: impl Into<std::path::PathBuf>) -> Self {
        self.build_context = BuildContext::new(gen_dir);
        self
    }

    /// Registers a rule, replacing any previous rule for the same target.
    pub fn add_rule(&mut self, rule: Arc<dyn BuildRule>) {
        self.rules.insert(rule.target().clone(), rule);
    }

    /// Builds every registered rule.
    ///
    /// Planning errors (unknown dependency, cyclic graph, missing input
    /// file) fail the whole invocation before any step runs; execution
    /// errors are per-rule and land in the summary.
    pub fn build(&self) -> Result<BuildSummary, EngineError> {
        let graph = self.dependency_graph()?;
        let mut order = graph.topo_order();
        // Edges point dependent -> dependency, so the topological order
        // lists dependents first; execution wants dependencies first.
        order.reverse();

        let keys = self.compute_keys(&order)?;
        tracing::info!(rules = order.len(), jobs = self.options.jobs, "starting build");

        let mut remaining: HashMap<BuildTarget, usize> = order
            .iter()
            .map(|target| (target.clone(), graph.outgoing(target).count()))
            .collect();
        let mut outcomes: BTreeMap<BuildTarget, RuleOutcome> = BTreeMap::new();
        let mut scheduled: HashSet<BuildTarget> = HashSet::new();

        let (work_tx, work_rx) = mpsc::channel::<BuildTarget>();
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (done_tx, done_rx) = mpsc::channel::<(BuildTarget, RuleOutcome)>();
        let abort = AtomicBool::new(false);

        thread::scope(|scope| {
            for _ in 0..self.options.jobs.max(1) {
                let work_rx = Arc::clone(&work_rx);
                let done_tx = done_tx.clone();
                let keys = &keys;
                let abort = &abort;
                scope.spawn(move || loop {
                    let target = {
                        let receiver = work_rx.lock().expect("work queue lock poisoned");
                        match receiver.recv() {
                            Ok(target) => target,
                            Err(_) => break,
                        }
                    };
                    let outcome = if abort.load(Ordering::SeqCst) {
                        RuleOutcome::Skipped
                    } else {
                        self.execute_rule(&target, keys)
                    };
                    if done_tx.send((target, outcome)).is_err() {
                        break;
                    }
                });
            }

            for target in &order {
                if remaining[target] == 0 {
                    scheduled.insert(target.clone());
                    let _ = work_tx.send(target.clone());
                }
            }

            while outcomes.len() < order.len() {
                let Ok((target, outcome)) = done_rx.recv() else {
                    break;
                };
                let succeeded = outcome.is_success();
                let failed = matches!(outcome, RuleOutcome::Failed(_));
                outcomes.insert(target.clone(), outcome);

                if succeeded {
                    for dependent in graph.incoming(&target) {
                        let count = remaining
                            .get_mut(dependent)
                            .expect("dependent is a known node");
                        *count -= 1;
                        if *count == 0 && !scheduled.contains(dependent) {
                            scheduled.insert(dependent.clone());
                            let _ = work_tx.send(dependent.clone());
                        }
                    }
                } else if failed {
                    // Dependents of a failure were never released, so
                    // none of them can be in flight.
                    let mut poisoned: Vec<BuildTarget> =
                        graph.incoming(&target).cloned().collect();
                    while let Some(dependent) = poisoned.pop() {
                        if outcomes.contains_key(&dependent) {
                            continue;
                        }
                        outcomes.insert(dependent.clone(), RuleOutcome::Skipped);
                        poisoned.extend(graph.incoming(&dependent).cloned());
                    }
                    if !self.options.keep_going {
                        abort.store(true, Ordering::SeqCst);
                        for unstarted in &order {
                            if !outcomes.contains_key(unstarted)
                                && !scheduled.contains(unstarted)
                            {
                                outcomes.insert(unstarted.clone(), RuleOutcome::Skipped);
                            }
                        }
                    }
                }
            }

            drop(work_tx);
        });

        let summary = BuildSummary { outcomes };
        tracing::info!(success = summary.success(), "build finished");
        Ok(summary)
    }

    fn dependency_graph(&self) -> Result<ImmutableGraph<BuildTarget>, EngineError> {
        let mut graph = MutableGraph::new();
        for (target, rule) in &self.rules {
            graph.add_node(target.clone());
            for dep in rule.deps() {
                if !self.rules.contains_key(&dep) {
                    return Err(EngineError::RuleNotFound {
                        target: dep.to_string(),
                    });
                }
                graph.add_edge(target.clone(), dep);
            }
        }
        Ok(ImmutableGraph::freeze(&graph)?)
    }

    /// Fills the key arena in dependencies-first order: type tag, rule
    /// configuration, input content hashes, then dependency keys in
    /// declared order.
    fn compute_keys(
        &self,
        order: &[BuildTarget],
    ) -> Result<RuleKeyCache<BuildTarget>, EngineError> {
        let hashes = FileHashCache::new(self.execution.project_root());
        let mut keys = RuleKeyCache::new();
        for target in order {
            let rule = self
                .rules
                .get(target)
                .ok_or_else(|| EngineError::RuleNotFound {
                    target: target.to_string(),
                })?;
            let mut builder = rule.append_to_rule_key(RuleKeyBuilder::new(rule.rule_type()));
            for input in rule.inputs() {
                let hash = hashes.get(&input)?;
                builder = builder.set_input(&input.to_string_lossy(), &hash);
            }
            for dep in rule.deps() {
                builder = builder.add_dep_key(keys.get(&dep)?);
            }
            keys.insert(target.clone(), builder.build());
        }
        Ok(keys)
    }

    /// Decides hit-or-rebuild for one rule and carries it out.
    fn execute_rule(
        &self,
        target: &BuildTarget,
        keys: &RuleKeyCache<BuildTarget>,
    ) -> RuleOutcome {
        let Some(rule) = self.rules.get(target) else {
            return RuleOutcome::Failed(Arc::new(EngineError::RuleNotFound {
                target: target.to_string(),
            }));
        };
        let key = match keys.get(target) {
            Ok(key) => *key,
            Err(e) => return RuleOutcome::Failed(Arc::new(e.into())),
        };
        let previous = self.store.load(target);

        if let Some(record) = &previous {
            if record.rule_key == key && self.artifacts_exist(record) {
                match rule.initialize_from_cache(&self.execution, &self.build_context, record) {
                    Ok(()) => {
                        tracing::debug!(target = %target, "rule key match; cache hit");
                        return RuleOutcome::CacheHit;
                    }
                    Err(e) => {
                        tracing::warn!(target = %target, error = %e, "cache re-hydration failed; rebuilding");
                    }
                }
            }
        }

        // The rule key missed, but for ABI rules a matching dependency
        // ABI means the change cannot affect this rule's output.
        if let (Some(abi), Some(record)) = (rule.abi_rule(), &previous) {
            if let Some(current) = abi.abi_key_for_deps() {
                if record.abi_key_for_deps() == Some(current) && self.artifacts_exist(record) {
                    match rule.initialize_from_cache(&self.execution, &self.build_context, record)
                    {
                        Ok(()) => {
                            // Refresh the record so the next build hits
                            // on the rule key directly.
                            let mut refreshed = record.clone();
                            refreshed.rule_key = key;
                            self.store.store(target, refreshed);
                            tracing::debug!(target = %target, "dependency ABI match; cache hit");
                            return RuleOutcome::CacheHit;
                        }
                        Err(e) => {
                            tracing::warn!(target = %target, error = %e, "ABI re-hydration failed; rebuilding");
                        }
                    }
                }
            }
        }

        match self.run_steps(target, rule.as_ref(), key) {
            Ok(record) => {
                self.store.store(target, record);
                RuleOutcome::Succeeded
            }
            Err(e) => {
                tracing::error!(target = %target, error = %e, "rule failed");
                RuleOutcome::Failed(Arc::new(e))
            }
        }
    }

    fn run_steps(
        &self,
        target: &BuildTarget,
        rule: &dyn BuildRule,
        key: RuleKey,
    ) -> Result<BuildRecord, EngineError> {
        let buildable = BuildableContext::new();
        let steps = rule.build_steps(&self.build_context, &buildable)?;
        for step in steps {
            tracing::debug!(target = %target, step = step.short_name(), "{}", step.description(&self.execution));
            let exit_code = step.execute(&self.execution);
            if exit_code != 0 {
                return Err(EngineError::StepFailed {
                    target: target.to_string(),
                    step: step.short_name().to_string(),
                    exit_code,
                });
            }
        }

        let work = buildable.snapshot();
        let mut artifacts = work.artifacts;
        if let Some(output) = rule.output_path(&self.build_context) {
            if self.execution.resolve(&output).exists() {
                artifacts.insert(output);
            }
        }
        Ok(BuildRecord {
            rule_key: key,
            artifacts,
            metadata: work.metadata,
        })
    }

    fn artifacts_exist(&self, record: &BuildRecord) -> bool {
        record
            .artifacts
            .iter()
            .all(|path| self.execution.resolve(path).exists())
    }
}
