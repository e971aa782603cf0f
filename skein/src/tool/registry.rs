//! Tool registry: an insertion-ordered, name-keyed catalog of tools.
//!
//! Registration and merge fail on name collisions (no silent override).
//! Lookup is O(1); `describe_all` iterates in insertion order so the schema
//! emitted to the executor is deterministic. The runner snapshots the
//! registry at run start, so the registry is effectively read-only for the
//! duration of a run.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::tool::{Tool, ToolDescriptor};

/// Name-keyed tool catalog with deterministic iteration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. Validates its descriptor and fails with
    /// `DuplicateToolName` if the name is taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ConfigurationError> {
        let descriptor = tool.descriptor();
        descriptor.validate()?;
        let name = descriptor.name.clone();
        if self.tools.contains_key(&name) {
            return Err(ConfigurationError::DuplicateToolName(name));
        }
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Builder-style `register`.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self, ConfigurationError> {
        self.register(tool)?;
        Ok(self)
    }

    /// Returns a new registry containing both catalogs (`self` first, then
    /// `other`, each in insertion order). Fails on any name collision.
    pub fn merge(&self, other: &ToolRegistry) -> Result<ToolRegistry, ConfigurationError> {
        let mut merged = self.clone();
        for name in &other.order {
            let tool = Arc::clone(&other.tools[name]);
            merged.register(tool)?;
        }
        Ok(merged)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Descriptors in insertion order; this is the order emitted to the LLM.
    pub fn describe_all(&self) -> Vec<&ToolDescriptor> {
        self.order
            .iter()
            .map(|name| self.tools[name].descriptor())
            .collect()
    }

    /// Owned descriptor snapshot, taken by the runner at run start.
    pub fn descriptor_snapshot(&self) -> Vec<ToolDescriptor> {
        self.describe_all().into_iter().cloned().collect()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::FnTool;

    fn named(name: &str) -> Arc<dyn Tool> {
        Arc::new(FnTool::from_sync(
            ToolDescriptor::new(name, "test tool"),
            |_args| Ok(serde_json::json!("ok")),
        ))
    }

    /// **Scenario**: repeated register preserves insertion order in
    /// describe_all.
    #[test]
    fn describe_all_preserves_insertion_order() {
        let mut r = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            r.register(named(name)).unwrap();
        }
        let names: Vec<_> = r.describe_all().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let mut r = ToolRegistry::new();
        r.register(named("echo")).unwrap();
        match r.register(named("echo")) {
            Err(ConfigurationError::DuplicateToolName(name)) => assert_eq!(name, "echo"),
            other => panic!("expected DuplicateToolName, got {:?}", other),
        }
    }

    /// **Scenario**: merge fails on collision and leaves no silent override.
    #[test]
    fn merge_rejects_collision() {
        let a = ToolRegistry::new().with_tool(named("shared")).unwrap();
        let b = ToolRegistry::new().with_tool(named("shared")).unwrap();
        assert!(matches!(
            a.merge(&b),
            Err(ConfigurationError::DuplicateToolName(_))
        ));
    }

    #[test]
    fn merge_concatenates_in_order() {
        let a = ToolRegistry::new()
            .with_tool(named("one"))
            .unwrap()
            .with_tool(named("two"))
            .unwrap();
        let b = ToolRegistry::new().with_tool(named("three")).unwrap();
        let merged = a.merge(&b).unwrap();
        let names: Vec<_> = merged
            .describe_all()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["one", "two", "three"]);
        assert!(merged.get("three").is_some());
        assert!(a.get("three").is_none(), "merge does not mutate inputs");
    }
}
