//! Module and framework contracts.
//!
//! A module processes one top-level content item per invocation. Its shape is
//! identical to a node function's except that it is the tree's entry point:
//! it reads the item through a [`ContentAccessor`] and may request scratch
//! space, where a child node function instead describes its content through
//! contribution callbacks.

use crate::content::ContentAccessor;
use crate::error::BridgeError;
use crate::metadata::MetadataSink;
use crate::node::ChildRegistrar;
use crate::workspace::WorkspaceAllocator;

/// An independently built analysis unit.
///
/// Every capability handed in is scoped to this single invocation and must
/// not be retained beyond its return.
pub trait Module: Send + Sync {
    fn process(
        &self,
        content: &dyn ContentAccessor,
        metadata: &mut dyn MetadataSink,
        workspace: &dyn WorkspaceAllocator,
        children: &mut dyn ChildRegistrar,
    ) -> Result<(), BridgeError>;
}

/// A host orchestrator: owns the name→module registry and drives node
/// processing over root content items.
pub trait Framework {
    /// Associate `module` with `name`. The mapping is populated before the
    /// framework is invoked and immutable during its run. Registering a name
    /// twice is rejected.
    fn register_module(&mut self, name: &str, module: Box<dyn Module>) -> Result<(), BridgeError>;

    /// Run the framework with the residual command-line arguments left after
    /// the binder consumed framework/module selection. Interpretation of the
    /// arguments is framework-defined.
    fn invoke(&mut self, args: &[String]) -> Result<i32, BridgeError>;
}
