//! Routes model-issued tool calls to registered handlers.

use crate::error::{Result, ToolError};
use crate::handler::parse_arguments;
use crate::registry::ToolRegistry;
use crate::schema::JsonSchema;
use serde_json::{Map, Value};
use tracing::{debug, warn};

impl ToolRegistry {
    /// Execute the tool `name` with a raw JSON argument string.
    ///
    /// See [`dispatch`].
    pub fn execute(&self, name: &str, raw_arguments: &str) -> Result<Value> {
        dispatch(self, name, raw_arguments)
    }
}

/// Look up `name`, check `raw_arguments` against its schema, invoke it and
/// return the JSON-encoded result.
///
/// Holds no state between calls. An unknown name is terminal for the call.
pub fn dispatch(registry: &ToolRegistry, name: &str, raw_arguments: &str) -> Result<Value> {
    let entry = registry
        .get(name)
        .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

    let arguments = parse_arguments(raw_arguments)?;
    check_arguments(entry.schema(), &arguments)?;

    debug!(tool = name, "Executing tool");
    let result = entry.call(raw_arguments);
    if let Err(e) = &result {
        warn!(tool = name, error = %e, "Tool call failed");
    }
    result
}

/// Checks presence of required fields and the JSON type of every scalar field.
fn check_arguments(schema: &JsonSchema, arguments: &Map<String, Value>) -> Result<()> {
    if let Some(missing) = schema.required.iter().find(|r| !arguments.contains_key(*r)) {
        return Err(ToolError::decode(missing.as_str(), "missing required field"));
    }

    for (field, value) in arguments {
        let Some(expected) = schema
            .properties
            .get(field)
            .and_then(|fragment| fragment.get("type"))
            .and_then(Value::as_str)
        else {
            continue;
        };

        if !matches_type(expected, value) {
            return Err(ToolError::decode(
                field.as_str(),
                format!("expected {expected}, got {value}"),
            ));
        }
    }
    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry
            .register_fn(
                "add_numbers",
                "Adds two integers",
                &["a", "b"],
                |a: i64, b: i64| a + b,
            )
            .unwrap();
        registry
            .register_signature(
                "shout",
                "Upper-cases text",
                &[("text", "String")],
                |raw: &str| -> Result<Value> {
                    let args: Value = serde_json::from_str(raw)
                        .map_err(|e| ToolError::Invocation(e.to_string()))?;
                    Ok(json!(args["text"].as_str().unwrap_or_default().to_uppercase()))
                },
            )
            .unwrap();
        registry
    }

    #[test]
    fn adds_numbers() {
        let registry = registry();
        assert_eq!(
            dispatch(&registry, "add_numbers", r#"{"a":42,"b":17}"#).unwrap(),
            json!(59)
        );
    }

    #[test]
    fn wrong_argument_type_is_decode_error() {
        let registry = registry();
        let err = dispatch(&registry, "add_numbers", r#"{"a":"x","b":1}"#).unwrap_err();
        assert_eq!(err.field(), Some("a"));
    }

    #[test]
    fn missing_tool_is_not_found() {
        let registry = registry();
        assert_eq!(
            dispatch(&registry, "missing_tool", "{}"),
            Err(ToolError::NotFound("missing_tool".into()))
        );
    }

    #[test]
    fn raw_handlers_get_schema_checks() {
        let registry = registry();
        assert_eq!(registry.execute("shout", r#"{"text":"hi"}"#).unwrap(), json!("HI"));

        let err = registry.execute("shout", r#"{"text": 5}"#).unwrap_err();
        assert_eq!(err.field(), Some("text"));

        let err = registry.execute("shout", "{}").unwrap_err();
        assert_eq!(err.field(), Some("text"));
    }

    #[test]
    fn float_for_integer_is_rejected() {
        let registry = registry();
        let err = registry.execute("add_numbers", r#"{"a":1.5,"b":1}"#).unwrap_err();
        assert_eq!(err.field(), Some("a"));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let registry = registry();
        assert_eq!(
            registry
                .execute("add_numbers", r#"{"a":1,"b":2,"note":"hi"}"#)
                .unwrap(),
            json!(3)
        );
    }
}
