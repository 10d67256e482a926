//! Error types for the treebridge contract.
//!
//! One error enum covers the whole protocol surface. Failures local to a
//! subtree (registration conflicts, content access) are recoverable at the
//! framework level; only binder-time failures (missing plugins or entry
//! points) are process-fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the node-processing protocol and its plugin boundary.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A child was registered under a name an earlier sibling already holds.
    /// Fatal to that subtree, recoverable at the framework level.
    #[error("duplicate child name '{name}' registered under the same parent")]
    DuplicateChild { name: String },

    /// A module was registered with a framework under a name that is taken.
    #[error("module '{name}' is already registered with this framework")]
    DuplicateModule { name: String },

    /// No module is registered under the requested name.
    #[error("no module registered under name '{name}'")]
    UnknownModule { name: String },

    /// A read went beyond the available bytes or the underlying storage
    /// failed. Facts emitted before the failure point are retained.
    #[error("content access failed: {reason}")]
    ContentAccess { reason: String },

    /// A parent-fragment contribution referenced bytes outside the parent.
    #[error("parent fragment [{offset}, +{length}) exceeds parent size {parent_size}")]
    FragmentOutOfRange {
        offset: u64,
        length: u64,
        parent_size: u64,
    },

    /// A metadata value could not be represented in the target width.
    #[error("metadata value for key '{key}' cannot be represented: {reason}")]
    MetaCoercion { key: String, reason: String },

    /// Scratch-space allocation failed.
    #[error("workspace allocation of {requested} bytes failed: {reason}")]
    WorkspaceAllocation { requested: u64, reason: String },

    /// A plugin library could not be loaded. Fatal at bind time.
    #[error("failed to load plugin library {path}: {reason}")]
    PluginLoad { path: PathBuf, reason: String },

    /// A plugin library is missing a required entry point, or its ABI
    /// version does not match ours. Fatal at bind time.
    #[error("plugin {path} rejected: {reason}")]
    PluginEntryPoint { path: PathBuf, reason: String },

    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A module reported a failure of its own while processing a node.
    #[error("module failure: {0}")]
    Module(String),

    /// A tree report could not be serialized.
    #[error("report serialization failed: {0}")]
    Report(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Content access failure with a plain-text reason.
    pub fn content(reason: impl Into<String>) -> Self {
        BridgeError::ContentAccess {
            reason: reason.into(),
        }
    }

    /// True when the failure should only sink the current subtree, leaving
    /// sibling subtrees runnable.
    pub fn is_subtree_local(&self) -> bool {
        !matches!(
            self,
            BridgeError::PluginLoad { .. }
                | BridgeError::PluginEntryPoint { .. }
                | BridgeError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_local_classification() {
        assert!(BridgeError::DuplicateChild {
            name: "a".to_string()
        }
        .is_subtree_local());
        assert!(BridgeError::content("short read").is_subtree_local());
        assert!(!BridgeError::PluginLoad {
            path: PathBuf::from("libx.so"),
            reason: "not found".to_string()
        }
        .is_subtree_local());
    }
}
