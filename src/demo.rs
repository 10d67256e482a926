//! Demo module: an illustrative stand-in with no real content extraction.
//!
//! Records a handful of facts about the item it is handed and registers no
//! children. Useful for smoke-testing a framework binding end to end.

use crate::content::{ContentAccessor, ContentAccessorExt};
use crate::error::BridgeError;
use crate::metadata::{MetadataSink, MetadataSinkExt};
use crate::module::Module;
use crate::node::ChildRegistrar;
use crate::workspace::WorkspaceAllocator;

#[derive(Debug, Default)]
pub struct DemoModule;

impl DemoModule {
    pub fn new() -> Self {
        Self
    }
}

impl Module for DemoModule {
    fn process(
        &self,
        content: &dyn ContentAccessor,
        metadata: &mut dyn MetadataSink,
        _workspace: &dyn WorkspaceAllocator,
        _children: &mut dyn ChildRegistrar,
    ) -> Result<(), BridgeError> {
        metadata.set("demo:size", content.size())?;
        metadata.set("demo:sha1", content.sha1_hex()?)?;
        metadata.set("demo:answer", 42)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::BytesContent;
    use crate::metadata::{MemorySink, MetaValue};
    use crate::node::ChildSet;
    use crate::workspace::DiskWorkspace;

    #[test]
    fn demo_module_records_facts_and_no_children() {
        let content = BytesContent::new(b"abc".to_vec());
        let mut sink = MemorySink::new();
        let mut children = ChildSet::new();
        let scratch = tempfile::tempdir().unwrap();
        let workspace = DiskWorkspace::new(scratch.path());

        DemoModule::new()
            .process(&content, &mut sink, &workspace, &mut children)
            .unwrap();

        assert_eq!(sink.get("demo:size"), Some(&MetaValue::Int(3)));
        assert_eq!(sink.get("demo:answer"), Some(&MetaValue::Int(42)));
        assert!(matches!(
            sink.get("demo:sha1"),
            Some(MetaValue::String { value, .. })
                if value == "a9993e364706816aba3e25717850c26c9cd0d89d"
        ));
        assert!(children.is_empty());
    }
}
