//! The node-function protocol: content emission and child registration.
//!
//! A node function is the suspended computation describing one treegraph
//! node. When invoked it receives a content sink, a metadata sink, and a
//! child registrar; it may call them any number of times, in any order,
//! before returning. Returning ends the node's emission; nothing may be
//! emitted for that node afterwards. Zero content contributions describe a
//! valid zero-length node.
//!
//! Registration never runs a child's function synchronously. Whether a
//! registered child is processed inline or deferred is the framework's
//! decision alone; modules must not assume either.

use crate::content::Contribution;
use crate::error::BridgeError;
use crate::metadata::MetadataSink;
use std::collections::HashSet;

/// Ordered channel for a node's own content description.
pub trait ContentSink {
    /// Literal bytes derived by the module.
    fn add_derived(&mut self, bytes: &[u8]) -> Result<(), BridgeError>;

    /// A byte range of the parent's content, referenced without copying.
    fn add_parent_fragment(&mut self, offset: u64, length: u64) -> Result<(), BridgeError>;

    /// A run of logical zeros of the given length, not physically stored.
    fn add_sparse(&mut self, length: u64) -> Result<(), BridgeError>;
}

/// Accepts (name, node function) registrations for a node's direct children.
///
/// Names must be unique among one node's children; a duplicate is signaled
/// as [`BridgeError::DuplicateChild`] and never silently replaces the first
/// registration. Insertion order is preserved.
pub trait ChildRegistrar {
    fn register(&mut self, name: &str, function: Box<dyn NodeFunction>) -> Result<(), BridgeError>;
}

/// The computation performed for one node: emit content, write metadata,
/// register children. Implemented by framework-invoked child functions;
/// closures of the matching shape implement it automatically.
pub trait NodeFunction: Send {
    fn emit(
        &self,
        content: &mut dyn ContentSink,
        metadata: &mut dyn MetadataSink,
        children: &mut dyn ChildRegistrar,
    ) -> Result<(), BridgeError>;
}

impl<F> NodeFunction for F
where
    F: Fn(
            &mut dyn ContentSink,
            &mut dyn MetadataSink,
            &mut dyn ChildRegistrar,
        ) -> Result<(), BridgeError>
        + Send,
{
    fn emit(
        &self,
        content: &mut dyn ContentSink,
        metadata: &mut dyn MetadataSink,
        children: &mut dyn ChildRegistrar,
    ) -> Result<(), BridgeError> {
        self(content, metadata, children)
    }
}

/// Reference content sink recording contributions in call order.
///
/// When bounded by the parent's size, a parent fragment that reaches beyond
/// the parent is signaled to the node function at the `add` call, so a
/// function that cannot complete emits no further contributions.
#[derive(Default)]
pub struct ContributionLog {
    contributions: Vec<Contribution>,
    parent_size: Option<u64>,
}

impl ContributionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that validates parent fragments against `parent_size` eagerly.
    pub fn bounded(parent_size: u64) -> Self {
        Self {
            contributions: Vec::new(),
            parent_size: Some(parent_size),
        }
    }

    /// Total logical length contributed so far.
    pub fn logical_size(&self) -> u64 {
        self.contributions.iter().map(Contribution::length).sum()
    }

    pub fn into_contributions(self) -> Vec<Contribution> {
        self.contributions
    }
}

impl ContentSink for ContributionLog {
    fn add_derived(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        self.contributions.push(Contribution::Derived(bytes.to_vec()));
        Ok(())
    }

    fn add_parent_fragment(&mut self, offset: u64, length: u64) -> Result<(), BridgeError> {
        let end = offset
            .checked_add(length)
            .ok_or_else(|| BridgeError::content("parent fragment range overflows"))?;
        if let Some(parent_size) = self.parent_size {
            if end > parent_size {
                return Err(BridgeError::FragmentOutOfRange {
                    offset,
                    length,
                    parent_size,
                });
            }
        }
        self.contributions
            .push(Contribution::ParentFragment { offset, length });
        Ok(())
    }

    fn add_sparse(&mut self, length: u64) -> Result<(), BridgeError> {
        self.contributions.push(Contribution::Sparse { length });
        Ok(())
    }
}

/// Reference registrar collecting children in insertion order with sibling
/// name uniqueness enforced.
#[derive(Default)]
pub struct ChildSet {
    children: Vec<(String, Box<dyn NodeFunction>)>,
    names: HashSet<String>,
}

impl ChildSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Registered (name, function) pairs in registration order.
    pub fn into_children(self) -> Vec<(String, Box<dyn NodeFunction>)> {
        self.children
    }
}

impl ChildRegistrar for ChildSet {
    fn register(&mut self, name: &str, function: Box<dyn NodeFunction>) -> Result<(), BridgeError> {
        if !self.names.insert(name.to_string()) {
            return Err(BridgeError::DuplicateChild {
                name: name.to_string(),
            });
        }
        self.children.push((name.to_string(), function));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MemorySink, MetadataSinkExt};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn noop() -> Box<dyn NodeFunction> {
        Box::new(
            |_: &mut dyn ContentSink,
             _: &mut dyn MetadataSink,
             _: &mut dyn ChildRegistrar|
             -> Result<(), BridgeError> { Ok(()) },
        )
    }

    #[test]
    fn registration_preserves_insertion_order() {
        let mut set = ChildSet::new();
        set.register("a", noop()).unwrap();
        set.register("b", noop()).unwrap();
        set.register("c", noop()).unwrap();
        let names: Vec<_> = set.into_children().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn duplicate_sibling_name_is_rejected_not_replaced() {
        let mut set = ChildSet::new();
        set.register("mft", noop()).unwrap();
        let err = set.register("mft", noop()).unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateChild { name } if name == "mft"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn registration_does_not_invoke_the_function() {
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);
        let function = Box::new(
            move |_: &mut dyn ContentSink,
                  _: &mut dyn MetadataSink,
                  _: &mut dyn ChildRegistrar|
                  -> Result<(), BridgeError> {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
        );
        let mut set = ChildSet::new();
        set.register("deferred", function).unwrap();
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn contribution_log_records_call_order() {
        let mut log = ContributionLog::new();
        log.add_derived(b"AB").unwrap();
        log.add_parent_fragment(10, 4).unwrap();
        log.add_sparse(3).unwrap();
        assert_eq!(log.logical_size(), 9);
        let contributions = log.into_contributions();
        assert_eq!(contributions[0], Contribution::Derived(b"AB".to_vec()));
        assert_eq!(
            contributions[1],
            Contribution::ParentFragment {
                offset: 10,
                length: 4
            }
        );
        assert_eq!(contributions[2], Contribution::Sparse { length: 3 });
    }

    #[test]
    fn bounded_log_rejects_fragments_beyond_the_parent() {
        let mut log = ContributionLog::bounded(16);
        log.add_parent_fragment(8, 8).unwrap();
        let err = log.add_parent_fragment(8, 9).unwrap_err();
        assert!(matches!(err, BridgeError::FragmentOutOfRange { .. }));
        assert_eq!(log.logical_size(), 8);
    }

    #[test]
    fn a_function_emitting_nothing_is_a_valid_empty_node() {
        let mut log = ContributionLog::new();
        let mut sink = MemorySink::new();
        let mut set = ChildSet::new();
        noop().emit(&mut log, &mut sink, &mut set).unwrap();
        assert_eq!(log.logical_size(), 0);
        assert!(sink.is_empty());
        assert!(set.is_empty());
    }

    #[test]
    fn closures_can_emit_everything() {
        let function = |content: &mut dyn ContentSink,
                        metadata: &mut dyn MetadataSink,
                        children: &mut dyn ChildRegistrar|
         -> Result<(), BridgeError> {
            content.add_derived(b"hdr")?;
            metadata.set("kind", "header")?;
            children.register(
                "body",
                Box::new(
                    |_: &mut dyn ContentSink,
                     _: &mut dyn MetadataSink,
                     _: &mut dyn ChildRegistrar|
                     -> Result<(), BridgeError> { Ok(()) },
                ),
            )
        };
        let mut log = ContributionLog::new();
        let mut sink = MemorySink::new();
        let mut set = ChildSet::new();
        function.emit(&mut log, &mut sink, &mut set).unwrap();
        assert_eq!(log.logical_size(), 3);
        assert_eq!(sink.len(), 1);
        assert_eq!(set.len(), 1);
    }
}
