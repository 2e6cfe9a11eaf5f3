//! switchboard-tools - Tool calling for switchboard
//!
//! Exposes native Rust functions to language models as callable tools:
//! - Schema inference from function signatures (scalar parameters only)
//! - A registry with a startup-only registration phase
//! - A dispatcher that decodes model-issued JSON arguments and invokes tools

mod dispatch;
mod error;
mod global;
mod handler;
mod registry;
mod schema;

pub use dispatch::dispatch;
pub use error::{RegistryError, Result, SchemaError, ToolError};
pub use global::{
    all_tools, execute_tool, get_tool, global_registry, register_tool, register_tool_fn,
    seal_tools,
};
pub use handler::{parse_arguments, IntoToolOutput, ToolFn, ToolHandler};
pub use registry::{ToolEntry, ToolRegistry};
pub use schema::{is_valid_tool_name, JsonSchema, ScalarType, Tool, ToolParam};
