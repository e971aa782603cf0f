//! Tools: schema-described callables invoked from nodes, usually because the
//! LLM requested them.
//!
//! A tool is a descriptor plus an executor over JSON arguments. Tools are
//! stateless with respect to the registry; any state is injected at
//! construction. The engine speaks JSON to tools and leaves (de)serialization
//! to the tool implementation.
//!
//! **Interaction**: nodes resolve tools through the run's registry snapshot
//! and execute them via [`Environment::call_tool`](crate::Environment::call_tool),
//! which validates arguments and dispatches the feature pipeline hooks.

mod descriptor;
mod registry;
mod schema;

pub use descriptor::{ParamDescriptor, ToolDescriptor, ToolParameterType};
pub use registry::ToolRegistry;
pub use schema::{registry_schema, tool_schema};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::environment::Environment;
use crate::error::ToolError;

/// A single callable tool.
///
/// Implementations MUST NOT hold references to the [`Environment`] beyond
/// one `call` invocation; long-running tools MUST poll
/// [`Environment::cancellation_requested`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Schema presented to the LLM and used for argument validation.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Executes the tool. Arguments have already been validated against the
    /// descriptor when the call comes through the environment.
    async fn call(&self, args: Value, env: &Environment) -> Result<Value, ToolError>;
}

/// Future returned by a tool callback, borrowing the environment.
pub type ToolFuture<'a> = BoxFuture<'a, Result<Value, ToolError>>;

/// Boxed tool callback. Closures coerce here when boxed at the call site
/// with annotated parameters; fn items always fit.
pub type ToolFn =
    Box<dyn for<'a> Fn(Value, &'a Environment) -> ToolFuture<'a> + Send + Sync>;

/// Closure-backed [`Tool`], the quickest way to register behavior.
pub struct FnTool {
    descriptor: ToolDescriptor,
    run: ToolFn,
}

impl FnTool {
    /// Wraps an async callback that needs the environment (e.g. to call the
    /// LLM or another tool).
    pub fn new(descriptor: ToolDescriptor, run: ToolFn) -> Self {
        Self { descriptor, run }
    }

    /// Wraps a synchronous function of the arguments alone.
    pub fn from_sync<F>(descriptor: ToolDescriptor, run: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            run: Box::new(move |args, _env| {
                let out = run(args);
                Box::pin(async move { out })
            }),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, args: Value, env: &Environment) -> Result<Value, ToolError> {
        (self.run)(args, env).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.descriptor.name)
            .finish()
    }
}
