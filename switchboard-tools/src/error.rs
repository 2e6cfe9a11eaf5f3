use thiserror::Error;

/// Errors raised while turning a signature into a JSON schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Unsupported parameter type `{type_name}` for parameter `{param}`")]
    UnsupportedType { param: String, type_name: String },

    #[error("Required field `{0}` is not listed in properties")]
    RequiredNotInProperties(String),

    #[error("Unsupported schema type `{0}`, expected `object`")]
    NotAnObject(String),
}

/// Errors raised while populating a [`ToolRegistry`](crate::ToolRegistry).
///
/// All of these are startup-time contract violations: they surface while the
/// registry is being built, never while a model-issued call is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("A tool named `{0}` is already registered")]
    DuplicateName(String),

    #[error("Registry is sealed, cannot register `{0}` after tools were read")]
    Sealed(String),

    #[error("Invalid tool definition: {0}")]
    InvalidTool(String),

    #[error("Tool `{name}` declares {declared} parameter names but the function takes {expected}")]
    ArityMismatch {
        name: String,
        declared: usize,
        expected: usize,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Errors raised while dispatching a model-issued tool call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments{}: {message}", describe_field(.field))]
    ArgumentDecode {
        field: Option<String>,
        message: String,
    },

    #[error("Tool execution failed: {0}")]
    Invocation(String),

    #[error("Failed to encode tool output: {0}")]
    Encode(String),
}

fn describe_field(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|f| format!(" for `{f}`"))
        .unwrap_or_default()
}

impl ToolError {
    pub(crate) fn decode(field: impl Into<String>, message: impl ToString) -> Self {
        ToolError::ArgumentDecode {
            field: Some(field.into()),
            message: message.to_string(),
        }
    }

    /// The offending argument name, when the failure could be pinned to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ToolError::ArgumentDecode { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;
