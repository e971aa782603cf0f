//! Tool descriptors: the schema a tool presents to the LLM and the engine.
//!
//! [`ToolParameterType`] is a recursive tagged variant; JSON Schema emission
//! and argument validation are both a single recursive descent over it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ConfigurationError;

/// Recursive parameter type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolParameterType {
    String,
    Integer,
    Float,
    Boolean,
    /// Closed set of string values.
    Enum { values: Vec<String> },
    /// Homogeneous list.
    List { element: Box<ToolParameterType> },
    /// Nested object. `required` must be a subset of the property names.
    Object {
        properties: Vec<ParamDescriptor>,
        required: Vec<String>,
    },
}

impl ToolParameterType {
    /// JSON Schema (draft 2020-12) for this type. Each property's schema goes
    /// directly at the property key; the type keyword is never nested inside
    /// another `type` object.
    pub fn json_schema(&self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Integer => json!({"type": "integer"}),
            Self::Float => json!({"type": "number"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Enum { values } => json!({"type": "string", "enum": values}),
            Self::List { element } => json!({"type": "array", "items": element.json_schema()}),
            Self::Object {
                properties,
                required,
            } => {
                let mut props = Map::new();
                for p in properties {
                    props.insert(p.name.clone(), p.json_schema());
                }
                json!({"type": "object", "properties": props, "required": required})
            }
        }
    }

    /// Validates a JSON value against this type. Returns a human-readable
    /// reason on mismatch.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::String => value
                .is_string()
                .then_some(())
                .ok_or_else(|| format!("expected string, got {}", kind_of(value))),
            Self::Integer => (value.is_i64() || value.is_u64())
                .then_some(())
                .ok_or_else(|| format!("expected integer, got {}", kind_of(value))),
            Self::Float => value
                .is_number()
                .then_some(())
                .ok_or_else(|| format!("expected number, got {}", kind_of(value))),
            Self::Boolean => value
                .is_boolean()
                .then_some(())
                .ok_or_else(|| format!("expected boolean, got {}", kind_of(value))),
            Self::Enum { values } => match value.as_str() {
                Some(s) if values.iter().any(|v| v == s) => Ok(()),
                Some(s) => Err(format!("{:?} is not one of {:?}", s, values)),
                None => Err(format!("expected enum string, got {}", kind_of(value))),
            },
            Self::List { element } => match value.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        element
                            .validate(item)
                            .map_err(|e| format!("element {}: {}", i, e))?;
                    }
                    Ok(())
                }
                None => Err(format!("expected array, got {}", kind_of(value))),
            },
            Self::Object {
                properties,
                required,
            } => match value.as_object() {
                Some(map) => {
                    for name in required {
                        if !map.contains_key(name) {
                            return Err(format!("missing required property {:?}", name));
                        }
                    }
                    for p in properties {
                        if let Some(v) = map.get(&p.name) {
                            p.parameter_type
                                .validate(v)
                                .map_err(|e| format!("property {:?}: {}", p.name, e))?;
                        }
                    }
                    Ok(())
                }
                None => Err(format!("expected object, got {}", kind_of(value))),
            },
        }
    }

    fn check_nested(&self, tool: &str) -> Result<(), ConfigurationError> {
        match self {
            Self::List { element } => element.check_nested(tool),
            Self::Object {
                properties,
                required,
            } => {
                let mut seen: Vec<&str> = Vec::new();
                for p in properties {
                    if seen.contains(&p.name.as_str()) {
                        return Err(ConfigurationError::InvalidDescriptor {
                            tool: tool.to_string(),
                            message: format!("duplicate object property {:?}", p.name),
                        });
                    }
                    seen.push(&p.name);
                    p.parameter_type.check_nested(tool)?;
                }
                for r in required {
                    if !properties.iter().any(|p| &p.name == r) {
                        return Err(ConfigurationError::InvalidDescriptor {
                            tool: tool.to_string(),
                            message: format!("required property {:?} is not declared", r),
                        });
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One named parameter of a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub parameter_type: ToolParameterType,
}

impl ParamDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_type: ToolParameterType,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_type,
        }
    }

    /// Type schema plus the parameter description.
    pub fn json_schema(&self) -> Value {
        let mut schema = self.parameter_type.json_schema();
        if let Some(obj) = schema.as_object_mut() {
            obj.insert("description".into(), json!(self.description));
        }
        schema
    }
}

/// Name, description, and parameter schema of one tool.
///
/// **Interaction**: snapshotted by the runner at run start, emitted to the
/// executor via [`tool_schema`](crate::tool::tool_schema), and used by the
/// environment to validate arguments before execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required_params: Vec<ParamDescriptor>,
    #[serde(default)]
    pub optional_params: Vec<ParamDescriptor>,
    /// Opt-in marker for concurrent dispatch; determinism is the default.
    #[serde(default)]
    pub parallel_safe: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required_params: Vec::new(),
            optional_params: Vec::new(),
            parallel_safe: false,
        }
    }

    pub fn with_required(mut self, param: ParamDescriptor) -> Self {
        self.required_params.push(param);
        self
    }

    pub fn with_optional(mut self, param: ParamDescriptor) -> Self {
        self.optional_params.push(param);
        self
    }

    pub fn parallel_safe(mut self, parallel_safe: bool) -> Self {
        self.parallel_safe = parallel_safe;
        self
    }

    fn params(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.required_params.iter().chain(self.optional_params.iter())
    }

    /// Descriptor invariants: parameter names unique across required and
    /// optional; object `required` lists only declared properties.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut seen: Vec<&str> = Vec::new();
        for p in self.params() {
            if seen.contains(&p.name.as_str()) {
                return Err(ConfigurationError::InvalidDescriptor {
                    tool: self.name.clone(),
                    message: format!("duplicate parameter {:?}", p.name),
                });
            }
            seen.push(&p.name);
            p.parameter_type.check_nested(&self.name)?;
        }
        Ok(())
    }

    /// Validates call arguments against this descriptor: arguments must be an
    /// object, every required parameter present, every present parameter
    /// well-typed, and no undeclared keys.
    pub fn validate_args(&self, args: &Value) -> Result<(), String> {
        let map = args
            .as_object()
            .ok_or_else(|| format!("arguments must be an object, got {}", kind_of(args)))?;
        for p in &self.required_params {
            if !map.contains_key(&p.name) {
                return Err(format!("missing required parameter {:?}", p.name));
            }
        }
        for (key, value) in map {
            match self.params().find(|p| &p.name == key) {
                Some(p) => p
                    .parameter_type
                    .validate(value)
                    .map_err(|e| format!("parameter {:?}: {}", key, e))?,
                None => return Err(format!("unknown parameter {:?}", key)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> ToolDescriptor {
        ToolDescriptor::new("calculator", "Basic integer arithmetic")
            .with_required(ParamDescriptor::new(
                "op",
                "Operation",
                ToolParameterType::Enum {
                    values: vec!["ADD".into(), "SUB".into(), "MUL".into(), "DIV".into()],
                },
            ))
            .with_required(ParamDescriptor::new(
                "a",
                "Left operand",
                ToolParameterType::Integer,
            ))
            .with_required(ParamDescriptor::new(
                "b",
                "Right operand",
                ToolParameterType::Integer,
            ))
    }

    #[test]
    fn validate_args_accepts_well_typed_call() {
        let d = calculator();
        let args = serde_json::json!({"op": "MUL", "a": 3, "b": 5});
        assert!(d.validate_args(&args).is_ok());
    }

    #[test]
    fn validate_args_rejects_missing_required() {
        let d = calculator();
        let err = d.validate_args(&serde_json::json!({"op": "ADD", "a": 1})).unwrap_err();
        assert!(err.contains("b"), "message should name the parameter: {}", err);
    }

    #[test]
    fn validate_args_rejects_bad_enum_value() {
        let d = calculator();
        let err = d
            .validate_args(&serde_json::json!({"op": "POW", "a": 1, "b": 2}))
            .unwrap_err();
        assert!(err.contains("POW"), "{}", err);
    }

    #[test]
    fn validate_args_rejects_unknown_parameter() {
        let d = calculator();
        let err = d
            .validate_args(&serde_json::json!({"op": "ADD", "a": 1, "b": 2, "c": 3}))
            .unwrap_err();
        assert!(err.contains("unknown parameter"), "{}", err);
    }

    /// **Scenario**: descriptor invariant: object `required` must name
    /// declared properties.
    #[test]
    fn validate_rejects_dangling_required_property() {
        let d = ToolDescriptor::new("writer", "writes").with_required(ParamDescriptor::new(
            "doc",
            "Document",
            ToolParameterType::Object {
                properties: vec![ParamDescriptor::new(
                    "title",
                    "Title",
                    ToolParameterType::String,
                )],
                required: vec!["body".into()],
            },
        ));
        match d.validate() {
            Err(ConfigurationError::InvalidDescriptor { tool, message }) => {
                assert_eq!(tool, "writer");
                assert!(message.contains("body"), "{}", message);
            }
            other => panic!("expected InvalidDescriptor, got {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_duplicate_parameter_names() {
        let d = ToolDescriptor::new("dup", "dup")
            .with_required(ParamDescriptor::new("x", "", ToolParameterType::String))
            .with_optional(ParamDescriptor::new("x", "", ToolParameterType::Integer));
        assert!(d.validate().is_err());
    }

    #[test]
    fn nested_list_of_objects_validates_elements() {
        let t = ToolParameterType::List {
            element: Box::new(ToolParameterType::Object {
                properties: vec![ParamDescriptor::new("n", "", ToolParameterType::Integer)],
                required: vec!["n".into()],
            }),
        };
        assert!(t.validate(&serde_json::json!([{"n": 1}, {"n": 2}])).is_ok());
        let err = t.validate(&serde_json::json!([{"n": 1}, {}])).unwrap_err();
        assert!(err.contains("element 1"), "{}", err);
    }
}
