//! Treebridge: framework-neutral forensic treegraph contract
//!
//! Decouples independently built treegraph analysis modules from treegraph
//! frameworks. A framework hands a module read-only access to one node's
//! content plus write-only metadata and child-registration channels; the
//! module describes the node and its children, and the framework drains the
//! registered children the same way, recursively.

pub mod config;
pub mod content;
pub mod demo;
pub mod error;
pub mod framework;
pub mod logging;
pub mod metadata;
pub mod module;
pub mod node;
pub mod plugin;
pub mod types;
pub mod workspace;

pub use content::{ContentAccessor, ContentAccessorExt, Contribution};
pub use error::BridgeError;
pub use metadata::{MetadataSink, MetadataSinkExt};
pub use module::{Framework, Module};
pub use node::{ChildRegistrar, ContentSink, NodeFunction};
pub use workspace::WorkspaceAllocator;
