//! Native scalar types and their JSON-Schema descriptors.
//!
//! Tools only accept the scalar set below. Anything else is rejected while the
//! tool is registered, so a model-issued call never meets an unknown type.

use crate::error::SchemaError;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The JSON primitive a tool parameter maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Integer,
    Number,
    String,
    Boolean,
}

impl ScalarType {
    /// JSON-Schema `type` keyword for this scalar.
    pub fn json_type(self) -> &'static str {
        match self {
            ScalarType::Integer => "integer",
            ScalarType::Number => "number",
            ScalarType::String => "string",
            ScalarType::Boolean => "boolean",
        }
    }

    /// Maps a Rust type name, as written in a function signature, to its scalar.
    ///
    /// Used by registrations that describe their parameters textually (for
    /// example, from a code-generation step). Returns `None` for types outside
    /// the supported set.
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        let scalar = match type_name.trim() {
            "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize" => {
                ScalarType::Integer
            }
            "f32" | "f64" => ScalarType::Number,
            "String" | "&str" | "str" => ScalarType::String,
            "bool" => ScalarType::Boolean,
            _ => return None,
        };
        Some(scalar)
    }

    /// Property fragment placed under `properties` in a [`JsonSchema`].
    pub fn fragment(self) -> Value {
        json!({ "type": self.json_type() })
    }
}

/// A native type that can appear as a tool parameter.
pub trait ToolParam: DeserializeOwned {
    const SCALAR: ScalarType;
}

macro_rules! tool_param {
    ($scalar:ident => $($ty:ty),+) => {
        $(impl ToolParam for $ty {
            const SCALAR: ScalarType = ScalarType::$scalar;
        })+
    };
}

tool_param!(Integer => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
tool_param!(Number => f32, f64);
tool_param!(String => String);
tool_param!(Boolean => bool);

/// Restricted JSON Schema describing a tool's parameter object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: IndexMap<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for JsonSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: IndexMap::new(),
            required: Vec::new(),
        }
    }
}

impl JsonSchema {
    /// Builds a schema where every parameter is required, in declaration order.
    pub fn from_params<S: AsRef<str>>(params: &[(S, ScalarType)]) -> Self {
        let mut schema = Self::default();
        for (name, scalar) in params {
            let name = name.as_ref().to_string();
            schema.properties.insert(name.clone(), scalar.fragment());
            schema.required.push(name);
        }
        schema
    }

    /// Builds a schema from `(parameter, type name)` pairs.
    pub fn from_signature(params: &[(&str, &str)]) -> Result<Self, SchemaError> {
        let scalars = params
            .iter()
            .map(|(param, type_name)| {
                ScalarType::from_type_name(type_name)
                    .map(|scalar| (*param, scalar))
                    .ok_or_else(|| SchemaError::UnsupportedType {
                        param: param.to_string(),
                        type_name: type_name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_params(&scalars))
    }

    /// Adds a `description` to an existing property fragment.
    pub fn with_description(mut self, param: &str, description: impl Into<String>) -> Self {
        if let Some(Value::Object(fragment)) = self.properties.get_mut(param) {
            fragment.insert("description".to_string(), Value::String(description.into()));
        }
        self
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.schema_type != "object" {
            return Err(SchemaError::NotAnObject(self.schema_type.clone()));
        }
        match self.required.iter().find(|r| !self.properties.contains_key(*r)) {
            Some(missing) => Err(SchemaError::RequiredNotInProperties(missing.clone())),
            None => Ok(()),
        }
    }
}

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: JsonSchema,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: JsonSchema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Checks the name is identifier-like and the schema is consistent.
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_tool_name(&self.name) {
            return Err(format!(
                "tool name `{}` must be 1-64 ASCII letters, digits, `_` or `-`",
                self.name
            ));
        }
        self.parameters
            .validate()
            .map_err(|e| format!("tool `{}`: {}", self.name, e))
    }
}

/// Tool names follow the function-name rules shared by the supported backends.
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
