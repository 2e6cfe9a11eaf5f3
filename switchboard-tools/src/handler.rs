//! Invocation handlers: the closures stored behind each registered tool.

use crate::error::{Result, ToolError};
use crate::schema::{ScalarType, ToolParam};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Display;
use std::marker::PhantomData;

/// Decodes a raw JSON argument string, runs the tool and encodes its output.
pub trait ToolHandler: Send + Sync {
    fn call(&self, raw_arguments: &str) -> Result<Value>;
}

/// Raw handlers receive the argument string untouched.
impl<F> ToolHandler for F
where
    F: Fn(&str) -> Result<Value> + Send + Sync,
{
    fn call(&self, raw_arguments: &str) -> Result<Value> {
        self(raw_arguments)
    }
}

/// A value a tool function can return.
pub trait IntoToolOutput {
    fn into_tool_output(self) -> Result<Value>;
}

fn encode<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ToolError::Encode(e.to_string()))
}

macro_rules! serialize_output {
    ($($ty:ty),+) => {
        $(impl IntoToolOutput for $ty {
            fn into_tool_output(self) -> Result<Value> {
                encode(self)
            }
        })+
    };
}

serialize_output!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, bool, String);

impl IntoToolOutput for f64 {
    fn into_tool_output(self) -> Result<Value> {
        if !self.is_finite() {
            return Err(ToolError::Encode(format!("{self} is not representable in JSON")));
        }
        encode(self)
    }
}

impl IntoToolOutput for f32 {
    fn into_tool_output(self) -> Result<Value> {
        f64::from(self).into_tool_output()
    }
}

impl IntoToolOutput for &str {
    fn into_tool_output(self) -> Result<Value> {
        Ok(Value::String(self.to_string()))
    }
}

impl IntoToolOutput for Value {
    fn into_tool_output(self) -> Result<Value> {
        Ok(self)
    }
}

impl IntoToolOutput for () {
    fn into_tool_output(self) -> Result<Value> {
        Ok(Value::Null)
    }
}

impl<T: IntoToolOutput> IntoToolOutput for Option<T> {
    fn into_tool_output(self) -> Result<Value> {
        self.map_or(Ok(Value::Null), IntoToolOutput::into_tool_output)
    }
}

impl<T: IntoToolOutput, E: Display> IntoToolOutput for std::result::Result<T, E> {
    fn into_tool_output(self) -> Result<Value> {
        match self {
            Ok(value) => value.into_tool_output(),
            Err(e) => Err(ToolError::Invocation(e.to_string())),
        }
    }
}

/// A native function whose parameters are all [`ToolParam`]s.
///
/// `Args` is the tuple of parameter types; it only exists to keep the
/// per-arity implementations apart.
pub trait ToolFn<Args>: Send + Sync + 'static {
    fn param_types() -> Vec<ScalarType>;

    fn invoke(&self, names: &[String], arguments: &Map<String, Value>) -> Result<Value>;
}

fn decode_arg<T: ToolParam>(name: &str, arguments: &Map<String, Value>) -> Result<T> {
    let value = arguments
        .get(name)
        .ok_or_else(|| ToolError::decode(name, "missing required field"))?;
    T::deserialize(value).map_err(|e| ToolError::decode(name, e))
}

macro_rules! tool_fn {
    ($($arg:ident),*) => {
        impl<Func, Out, $($arg,)*> ToolFn<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> Out + Send + Sync + 'static,
            Out: IntoToolOutput,
            $($arg: ToolParam,)*
        {
            fn param_types() -> Vec<ScalarType> {
                vec![$(<$arg as ToolParam>::SCALAR),*]
            }

            #[allow(non_snake_case, unused_variables, unused_mut)]
            fn invoke(&self, names: &[String], arguments: &Map<String, Value>) -> Result<Value> {
                let mut names = names.iter();
                $(
                    let $arg = match names.next() {
                        Some(name) => decode_arg::<$arg>(name, arguments)?,
                        None => return Err(ToolError::Invocation("parameter names out of sync".into())),
                    };
                )*
                (self)($($arg),*).into_tool_output()
            }
        }
    };
}

tool_fn!();
tool_fn!(A1);
tool_fn!(A1, A2);
tool_fn!(A1, A2, A3);
tool_fn!(A1, A2, A3, A4);
tool_fn!(A1, A2, A3, A4, A5);
tool_fn!(A1, A2, A3, A4, A5, A6);

/// Adapts a typed [`ToolFn`] into a [`ToolHandler`].
pub(crate) struct TypedHandler<F, Args> {
    func: F,
    names: Vec<String>,
    _args: PhantomData<fn(Args)>,
}

impl<F, Args> TypedHandler<F, Args>
where
    F: ToolFn<Args>,
{
    pub(crate) fn new(func: F, names: Vec<String>) -> Self {
        Self {
            func,
            names,
            _args: PhantomData,
        }
    }
}

impl<F, Args> ToolHandler for TypedHandler<F, Args>
where
    F: ToolFn<Args>,
{
    fn call(&self, raw_arguments: &str) -> Result<Value> {
        let arguments = parse_arguments(raw_arguments)?;
        self.func.invoke(&self.names, &arguments)
    }
}

/// Parses a model-issued argument blob into a JSON object.
///
/// Models often send an empty string for tools without parameters; that is
/// read as `{}`.
pub fn parse_arguments(raw_arguments: &str) -> Result<Map<String, Value>> {
    let trimmed = raw_arguments.trim();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ToolError::ArgumentDecode {
            field: None,
            message: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(ToolError::ArgumentDecode {
            field: None,
            message: format!("malformed JSON: {e}"),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
