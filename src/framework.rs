//! Reference framework: registry, dispatch, and work-queue drain.
//!
//! One conforming host for the module contract. It keeps the name→module
//! mapping immutable once invocation starts, gives every node-function
//! invocation fresh accessor/sink/registrar instances, and drains registered
//! children through an iterative work queue so tree depth never grows the
//! call stack.
//!
//! Policies this framework fixes (the contract leaves them to the host):
//! duplicate module registration is rejected; metadata key collisions are
//! last-write-wins; child deferral is framework-global
//! ([`DeferralPolicy`], default deferred/breadth-first).

use crate::config::{DeferralPolicy, FrameworkConfig};
use crate::content::{ComposedContent, ContentAccessor, ContentAccessorExt, FileContent};
use crate::error::BridgeError;
use crate::metadata::{MemorySink, MetaValue, TimeSource};
use crate::module::{Framework, Module};
use crate::node::{ChildSet, ContributionLog, NodeFunction};
use crate::workspace::DiskWorkspace;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Processing outcome for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NodeStatus {
    /// The node function returned cleanly.
    Processed,
    /// The node function failed; facts emitted before the failure point are
    /// retained and its subtree was skipped.
    Failed { error: String },
}

/// One recorded fact, time sources resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fact {
    pub key: String,
    pub value: MetaValue,
}

/// Everything the framework persisted for one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
    /// Slash-joined path from the root item, e.g. "image.dd/part0/mft".
    pub path: String,
    pub size: u64,
    /// Hex digest of the node's logical content; absent when hashing failed.
    pub sha1: Option<String>,
    pub status: NodeStatus,
    pub facts: Vec<Fact>,
    /// Direct child names in registration order.
    pub children: Vec<String>,
}

/// Result of processing one root content item. Nodes appear in processing
/// order; sibling relative order always matches registration order.
#[derive(Debug, Serialize)]
pub struct TreeReport {
    pub root: String,
    pub module: String,
    pub nodes: Vec<NodeRecord>,
    pub failed_nodes: usize,
}

impl TreeReport {
    pub fn node(&self, path: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.path == path)
    }

    pub fn to_json(&self) -> Result<String, BridgeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A registered child waiting for its node function to run.
struct NodeTask {
    path: String,
    parent: Arc<dyn ContentAccessor>,
    function: Box<dyn NodeFunction>,
}

/// The reference treegraph framework.
pub struct TreegraphFramework {
    modules: HashMap<String, Arc<dyn Module>>,
    config: FrameworkConfig,
}

impl TreegraphFramework {
    pub fn new(config: FrameworkConfig) -> Self {
        Self {
            modules: HashMap::new(),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FrameworkConfig::default())
    }

    /// Process one root content item with the named module and return the
    /// resulting tree report.
    pub fn process_root(
        &self,
        module_name: &str,
        root_name: &str,
        content: Arc<dyn ContentAccessor>,
    ) -> Result<TreeReport, BridgeError> {
        let module = self
            .modules
            .get(module_name)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownModule {
                name: module_name.to_string(),
            })?;

        let workspace_root = self.config.effective_workspace_root();
        let workspace = DiskWorkspace::new(&workspace_root);
        let spill_dir = workspace_root.join("spill");

        let mut report = TreeReport {
            root: root_name.to_string(),
            module: module_name.to_string(),
            nodes: Vec::new(),
            failed_nodes: 0,
        };

        info!(module = module_name, root = root_name, "processing root item");

        // Entry point: the module itself, reading the root accessor.
        let mut sink = MemorySink::new();
        let mut children = ChildSet::new();
        let outcome = module.process(content.as_ref(), &mut sink, &workspace, &mut children);

        let mut queue: VecDeque<NodeTask> = VecDeque::new();
        let root_digest = content.sha1_hex().ok();
        let record = self.finish_node(
            root_name.to_string(),
            content.size(),
            root_digest.clone(),
            outcome,
            sink,
            children,
            Arc::clone(&content),
            &mut queue,
        );
        report.nodes.push(record);

        // Iterative drain: depth is bounded by the queue, not the call stack.
        while let Some(task) = queue.pop_front() {
            debug!(path = %task.path, "invoking node function");
            let mut log = ContributionLog::bounded(task.parent.size());
            let mut sink = MemorySink::new();
            let mut children = ChildSet::new();
            let outcome = task.function.emit(&mut log, &mut sink, &mut children);
            let emitted = log.logical_size();

            let (size, digest, composed, outcome) = match outcome {
                Ok(()) => {
                    match ComposedContent::new(
                        Arc::clone(&task.parent),
                        log.into_contributions(),
                        Some(spill_dir.clone()),
                    ) {
                        Ok(composed) => {
                            let composed: Arc<dyn ContentAccessor> = Arc::new(composed);
                            let digest = composed.sha1_hex().ok();
                            (composed.size(), digest, Some(composed), Ok(()))
                        }
                        Err(e) => (emitted, None, None, Err(e)),
                    }
                }
                Err(e) => (emitted, None, None, Err(e)),
            };

            let parent_for_children = composed.unwrap_or_else(|| Arc::clone(&task.parent));
            let record = self.finish_node(
                task.path,
                size,
                digest,
                outcome,
                sink,
                children,
                parent_for_children,
                &mut queue,
            );
            report.nodes.push(record);
        }

        report.failed_nodes = report
            .nodes
            .iter()
            .filter(|n| matches!(n.status, NodeStatus::Failed { .. }))
            .count();
        info!(
            root = root_name,
            nodes = report.nodes.len(),
            failed = report.failed_nodes,
            "root item drained"
        );
        Ok(report)
    }

    /// Turn one finished invocation into a record, enqueueing its children
    /// unless the node failed (a failure is fatal to its own subtree only).
    #[allow(clippy::too_many_arguments)]
    fn finish_node(
        &self,
        path: String,
        size: u64,
        digest: Option<String>,
        outcome: Result<(), BridgeError>,
        sink: MemorySink,
        children: ChildSet,
        content_for_children: Arc<dyn ContentAccessor>,
        queue: &mut VecDeque<NodeTask>,
    ) -> NodeRecord {
        let facts = resolve_time_sources(sink.into_facts(), digest.as_deref());
        let mut child_names = Vec::new();

        let status = match outcome {
            Ok(()) => {
                let registered = children.into_children();
                let mut tasks = Vec::with_capacity(registered.len());
                for (name, function) in registered {
                    child_names.push(name.clone());
                    tasks.push(NodeTask {
                        path: format!("{}/{}", path, name),
                        parent: Arc::clone(&content_for_children),
                        function,
                    });
                }
                match self.config.deferral {
                    // Breadth-first: children go behind already queued work.
                    DeferralPolicy::Deferred => queue.extend(tasks),
                    // Depth-first: children run before previously queued
                    // work, keeping their own registration order.
                    DeferralPolicy::Immediate => {
                        for task in tasks.into_iter().rev() {
                            queue.push_front(task);
                        }
                    }
                }
                NodeStatus::Processed
            }
            Err(e) => {
                warn!(path = %path, error = %e, "node failed; skipping its subtree");
                NodeStatus::Failed {
                    error: e.to_string(),
                }
            }
        };

        NodeRecord {
            path,
            size,
            sha1: digest,
            status,
            facts,
            children: child_names,
        }
    }
}

/// Resolve implicit time sources to the node's parent-data identity.
fn resolve_time_sources(facts: Vec<(String, MetaValue)>, digest: Option<&str>) -> Vec<Fact> {
    facts
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                MetaValue::Time {
                    value,
                    source: TimeSource::ParentData,
                } => MetaValue::Time {
                    value,
                    source: TimeSource::Reference(format!(
                        "parent-data:{}",
                        digest.unwrap_or("unknown")
                    )),
                },
                other => other,
            };
            Fact { key, value }
        })
        .collect()
}

impl Framework for TreegraphFramework {
    fn register_module(&mut self, name: &str, module: Box<dyn Module>) -> Result<(), BridgeError> {
        if self.modules.contains_key(name) {
            return Err(BridgeError::DuplicateModule {
                name: name.to_string(),
            });
        }
        info!(module = name, "registered module");
        self.modules.insert(name.to_string(), Arc::from(module));
        Ok(())
    }

    /// Residual argv: `<module-name> <seed-file>...`. Each seed file is
    /// processed as one root item; reports are written to the configured
    /// report path, or stdout when unset.
    fn invoke(&mut self, args: &[String]) -> Result<i32, BridgeError> {
        let (module_name, seeds) = args.split_first().ok_or_else(|| {
            BridgeError::Config("usage: <module-name> <seed-file>...".to_string())
        })?;
        if seeds.is_empty() {
            return Err(BridgeError::Config(
                "at least one seed file is required".to_string(),
            ));
        }

        let mut exit = 0;
        let mut reports = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let path = Path::new(seed);
            let root_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| seed.clone());
            let content: Arc<dyn ContentAccessor> = Arc::new(FileContent::open(path)?);
            let report = self.process_root(module_name, &root_name, content)?;
            if report.failed_nodes > 0 {
                exit = 1;
            }
            reports.push(report);
        }

        let json = serde_json::to_string_pretty(&reports)?;
        match &self.config.report_path {
            Some(out) => {
                if let Some(dir) = out.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                std::fs::write(out, &json)?;
            }
            None => println!("{}", json),
        }
        Ok(exit)
    }
}
