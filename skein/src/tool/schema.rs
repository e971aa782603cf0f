//! JSON Schema emission for LLM call sites.
//!
//! Each tool becomes `{name, description, parameters}` where `parameters` is
//! a draft 2020-12 object schema. Property schemas go directly at the
//! property key; the historical `{"type": {"type": ...}}` nesting bug is
//! structurally impossible here because [`ParamDescriptor::json_schema`]
//! returns the full property schema in one piece.

use serde_json::{json, Map, Value};

use crate::tool::{ToolDescriptor, ToolRegistry};

/// Descriptor document for one tool, as sent to an executor.
pub fn tool_schema(descriptor: &ToolDescriptor) -> Value {
    let mut properties = Map::new();
    for p in descriptor
        .required_params
        .iter()
        .chain(descriptor.optional_params.iter())
    {
        properties.insert(p.name.clone(), p.json_schema());
    }
    let required: Vec<&str> = descriptor
        .required_params
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    json!({
        "name": descriptor.name,
        "description": descriptor.description,
        "parameters": {
            "type": "object",
            "properties": properties,
            "required": required,
        },
    })
}

/// Descriptor documents for a whole registry, in insertion order.
pub fn registry_schema(registry: &ToolRegistry) -> Vec<Value> {
    registry.describe_all().into_iter().map(tool_schema).collect()
}
