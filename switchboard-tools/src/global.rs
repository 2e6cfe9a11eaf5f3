//! The process-wide tool registry.
//!
//! Register every tool during startup, before the first completion request
//! that offers tools. The first call to [`all_tools`], [`get_tool`] or
//! [`execute_tool`] seals the registry; registrations after that fail with
//! [`RegistryError::Sealed`].

use crate::error::{RegistryError, ToolError};
use crate::handler::{ToolFn, ToolHandler};
use crate::registry::{ToolEntry, ToolRegistry};
use crate::schema::Tool;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

static REGISTRY: OnceLock<ToolRegistry> = OnceLock::new();

/// The process-wide registry, created on first use.
pub fn global_registry() -> &'static ToolRegistry {
    REGISTRY.get_or_init(ToolRegistry::new)
}

pub fn register_tool<H>(tool: Tool, handler: H) -> Result<(), RegistryError>
where
    H: ToolHandler + 'static,
{
    global_registry().register(tool, handler)
}

pub fn register_tool_fn<Args, F>(
    name: &str,
    description: &str,
    params: &[&str],
    func: F,
) -> Result<(), RegistryError>
where
    F: ToolFn<Args>,
    Args: 'static,
{
    global_registry().register_fn(name, description, params, func)
}

pub fn all_tools() -> Vec<Tool> {
    global_registry().all()
}

pub fn get_tool(name: &str) -> Option<Arc<ToolEntry>> {
    global_registry().get(name)
}

pub fn execute_tool(name: &str, raw_arguments: &str) -> Result<Value, ToolError> {
    global_registry().execute(name, raw_arguments)
}

/// Ends the registration phase explicitly.
pub fn seal_tools() {
    global_registry().seal()
}
