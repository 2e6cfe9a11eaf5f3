use crate::error::{RegistryError, Result as ToolResult};
use crate::handler::{ToolFn, ToolHandler, TypedHandler};
use crate::schema::{JsonSchema, Tool};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tracing::debug;

/// A registered tool: its definition and the handler that runs it.
pub struct ToolEntry {
    tool: Tool,
    handler: Box<dyn ToolHandler>,
}

impl ToolEntry {
    pub fn tool(&self) -> &Tool {
        &self.tool
    }

    pub fn name(&self) -> &str {
        &self.tool.name
    }

    pub fn schema(&self) -> &JsonSchema {
        &self.tool.parameters
    }

    /// Runs the handler without consulting the schema first.
    ///
    /// Prefer [`ToolRegistry::execute`], which checks the arguments against
    /// the schema before the handler sees them.
    pub fn call(&self, raw_arguments: &str) -> ToolResult<Value> {
        self.handler.call(raw_arguments)
    }
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry").field("tool", &self.tool).finish_non_exhaustive()
    }
}

/// Catalog of callable tools.
///
/// The registry is populated once, during startup, and is read-only
/// afterwards. The first read through [`all`](Self::all),
/// [`get`](Self::get) or [`execute`](Self::execute) seals it, as does an
/// explicit [`seal`](Self::seal); registrations after that fail with
/// [`RegistryError::Sealed`]. Tools keep their registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<IndexMap<String, Arc<ToolEntry>>>,
    sealed: AtomicBool,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under `tool.name`.
    pub fn register<H>(&self, tool: Tool, handler: H) -> Result<(), RegistryError>
    where
        H: ToolHandler + 'static,
    {
        tool.validate().map_err(RegistryError::InvalidTool)?;

        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if self.sealed.load(Ordering::Acquire) {
            return Err(RegistryError::Sealed(tool.name));
        }
        if tools.contains_key(&tool.name) {
            return Err(RegistryError::DuplicateName(tool.name));
        }

        debug!(tool = %tool.name, params = tool.parameters.required.len(), "Registered tool");
        let entry = ToolEntry {
            tool,
            handler: Box::new(handler),
        };
        tools.insert(entry.tool.name.clone(), Arc::new(entry));
        Ok(())
    }

    /// Register a native function, inferring the schema from its parameter types.
    ///
    /// `params` names the function's parameters in declaration order.
    ///
    /// ```
    /// use switchboard_tools::ToolRegistry;
    ///
    /// let registry = ToolRegistry::new();
    /// registry
    ///     .register_fn("add_numbers", "Adds two integers", &["a", "b"], |a: i64, b: i64| a + b)
    ///     .unwrap();
    /// assert_eq!(registry.execute("add_numbers", r#"{"a":42,"b":17}"#).unwrap(), 59);
    /// ```
    pub fn register_fn<Args, F>(
        &self,
        name: &str,
        description: &str,
        params: &[&str],
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: ToolFn<Args>,
        Args: 'static,
    {
        let types = F::param_types();
        if types.len() != params.len() {
            return Err(RegistryError::ArityMismatch {
                name: name.to_string(),
                declared: params.len(),
                expected: types.len(),
            });
        }

        let schema_params: Vec<_> = params.iter().copied().zip(types).collect();
        let tool = Tool::new(name, description, JsonSchema::from_params(&schema_params));
        let names = params.iter().map(|p| p.to_string()).collect();
        self.register(tool, TypedHandler::new(func, names))
    }

    /// Register a raw handler described by `(parameter, type name)` pairs.
    ///
    /// Type names outside the supported scalar set fail here, at registration.
    pub fn register_signature<H>(
        &self,
        name: &str,
        description: &str,
        params: &[(&str, &str)],
        handler: H,
    ) -> Result<(), RegistryError>
    where
        H: ToolHandler + 'static,
    {
        let schema = JsonSchema::from_signature(params)?;
        self.register(Tool::new(name, description, schema), handler)
    }

    /// Close the registry to further registrations.
    pub fn seal(&self) {
        let _guard = self.read();
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Snapshot of every tool definition, in registration order.
    pub fn all(&self) -> Vec<Tool> {
        self.read().values().map(|entry| entry.tool.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolEntry>> {
        self.read().get(name).cloned()
    }

    /// Definitions for the named tools, skipping unknown names.
    pub fn tools_by_names<S: AsRef<str>>(&self, names: &[S]) -> Vec<Tool> {
        let tools = self.read();
        names
            .iter()
            .filter_map(|name| tools.get(name.as_ref()).map(|entry| entry.tool.clone()))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.peek().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.peek().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peek().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.peek().keys().cloned().collect()
    }

    // Sealing happens under the read guard so a concurrent `register`,
    // which checks the flag under the write guard, can't slip in after it.
    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<ToolEntry>>> {
        let guard = self.peek();
        self.sealed.store(true, Ordering::Release);
        guard
    }

    fn peek(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<ToolEntry>>> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
