//! Framework configuration.
//!
//! Loaded with precedence: defaults, optional TOML file, `TREEBRIDGE_*`
//! environment overrides. Only the reference framework reads this; the core
//! protocol itself carries no configuration.

use crate::error::BridgeError;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// When the framework runs the node functions a parent registered.
///
/// Framework-global: modules must not assume either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeferralPolicy {
    /// Drain children depth-first, immediately after their parent returns.
    Immediate,
    /// Batch children breadth-first and drain them in later passes.
    Deferred,
}

/// Configuration for the reference framework.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameworkConfig {
    /// Child scheduling policy.
    #[serde(default = "default_deferral")]
    pub deferral: DeferralPolicy,

    /// Root directory for scratch space and content spills. Defaults to a
    /// per-process directory under the system temp dir.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Where to write the JSON tree report; stdout when unset.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

fn default_deferral() -> DeferralPolicy {
    DeferralPolicy::Deferred
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            deferral: default_deferral(),
            workspace_root: None,
            report_path: None,
        }
    }
}

impl FrameworkConfig {
    /// Load configuration from an optional TOML file plus `TREEBRIDGE_*`
    /// environment overrides.
    pub fn load(file: Option<&Path>) -> Result<Self, BridgeError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            let text = std::fs::read_to_string(path).map_err(|e| {
                BridgeError::Config(format!("cannot read {}: {}", path.display(), e))
            })?;
            builder = builder.add_source(File::from_str(&text, FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix("TREEBRIDGE")
                .separator("__")
                .try_parsing(true),
        );
        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Effective workspace root, falling back to a per-process temp dir.
    pub fn effective_workspace_root(&self) -> PathBuf {
        self.workspace_root.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("treebridge-{}", std::process::id()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let cfg = FrameworkConfig::default();
        assert_eq!(cfg.deferral, DeferralPolicy::Deferred);
        assert!(cfg.workspace_root.is_none());
        assert!(cfg.report_path.is_none());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treebridge.toml");
        std::fs::write(
            &path,
            "deferral = \"immediate\"\nworkspace_root = \"/var/tmp/tb\"\n",
        )
        .unwrap();
        let cfg = FrameworkConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.deferral, DeferralPolicy::Immediate);
        assert_eq!(cfg.workspace_root, Some(PathBuf::from("/var/tmp/tb")));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = FrameworkConfig::load(Some(Path::new("/nonexistent/tb.toml"))).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
