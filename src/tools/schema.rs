//! Parameter schema inference.
//!
//! Tool authors declare their parameters as a list of [`Param`]s (name,
//! declared type, optional default, optional description). [`infer_schema`]
//! turns that list into the object schema advertised in `tools/list`:
//!
//! | Declared type            | Schema                          |
//! |--------------------------|---------------------------------|
//! | `String`                 | `{"type": "string"}`            |
//! | integers (`i64`, `u32`…) | `{"type": "integer"}`           |
//! | `f32`, `f64`             | `{"type": "number"}`            |
//! | `bool`                   | `{"type": "boolean"}`           |
//! | `Vec<T>`                 | `{"type": "array"}`             |
//! | maps                     | `{"type": "object"}`            |
//! | `Option<T>`              | schema of `T` + `nullable`      |
//! | anything else            | `{"type": "string"}`            |
//!
//! A parameter is required exactly when it has no default, whatever its type.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::SchemaError;

/// The declared type of a tool parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// UTF-8 text.
    String,
    /// Whole number.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` / `false`.
    Boolean,
    /// Sequence.
    Array,
    /// String-keyed mapping.
    Object,
    /// "T or absent". Maps to T's schema with `nullable: true`.
    Optional(Box<ParamType>),
    /// A type with no direct JSON counterpart (named for diagnostics).
    /// Advertised as a string.
    Other(String),
}

impl ParamType {
    /// Wraps `inner` as an optional type.
    #[must_use]
    pub fn optional(inner: Self) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// Returns the type with any optional wrappers removed.
    #[must_use]
    pub fn base(&self) -> &Self {
        match self {
            Self::Optional(inner) => inner.base(),
            other => other,
        }
    }

    /// Whether `null` is an acceptable value.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    /// The JSON schema `type` keyword for this declared type.
    #[must_use]
    pub fn json_type(&self) -> &'static str {
        match self.base() {
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            // Unrecognised types degrade to string
            Self::String | Self::Other(_) | Self::Optional(_) => "string",
        }
    }

    /// Checks whether `value` conforms to the advertised schema.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.is_nullable();
        }
        match self.json_type() {
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => value.is_string(),
        }
    }
}

/// Compile-time mapping from a Rust type to its declared [`ParamType`].
pub trait SchemaType {
    /// The declared parameter type for `Self`.
    fn param_type() -> ParamType;
}

macro_rules! schema_type {
    ($variant:ident => $($ty:ty),+ $(,)?) => {
        $(
            impl SchemaType for $ty {
                fn param_type() -> ParamType {
                    ParamType::$variant
                }
            }
        )+
    };
}

schema_type!(String => String, char);
schema_type!(Integer => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
schema_type!(Number => f32, f64);
schema_type!(Boolean => bool);
schema_type!(Object => serde_json::Map<String, Value>);

impl<T> SchemaType for Vec<T> {
    fn param_type() -> ParamType {
        ParamType::Array
    }
}

impl<V, S> SchemaType for HashMap<String, V, S> {
    fn param_type() -> ParamType {
        ParamType::Object
    }
}

impl<V> SchemaType for BTreeMap<String, V> {
    fn param_type() -> ParamType {
        ParamType::Object
    }
}

impl<V, S> SchemaType for IndexMap<String, V, S> {
    fn param_type() -> ParamType {
        ParamType::Object
    }
}

impl<T: SchemaType> SchemaType for Option<T> {
    fn param_type() -> ParamType {
        ParamType::optional(T::param_type())
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name, as used in `arguments`.
    pub name: String,
    /// Declared type.
    pub ty: ParamType,
    /// Default value; present means the parameter is optional.
    pub default: Option<Value>,
    /// Human-readable description.
    pub description: Option<String>,
}

impl Param {
    /// Declares a parameter with an explicit type and no default.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            description: None,
        }
    }

    /// Declares a required parameter of Rust type `T`.
    #[must_use]
    pub fn required<T: SchemaType>(name: impl Into<String>) -> Self {
        Self::new(name, T::param_type())
    }

    /// Declares a parameter of Rust type `T` that defaults to `default`.
    #[must_use]
    pub fn optional<T: SchemaType>(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self::new(name, T::param_type()).with_default(default)
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the parameter carries a default value.
    #[must_use]
    pub const fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// Schema of a single property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertySchema {
    /// JSON type keyword.
    #[serde(rename = "type")]
    pub ty: &'static str,
    /// Set when the declared type is optional.
    #[serde(skip_serializing_if = "is_false")]
    pub nullable: bool,
    /// Parameter description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

/// The object schema describing a tool's arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Properties in declaration order.
    pub properties: IndexMap<String, PropertySchema>,
    /// Names of parameters without defaults, in declaration order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl InputSchema {
    /// An object schema with no properties.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kind: "object",
            properties: IndexMap::new(),
            required: Vec::new(),
        }
    }

    /// Renders the schema as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }
}

/// Derives the input schema for a parameter list.
///
/// Pure function of the declaration; callers compute it once per tool.
///
/// # Errors
///
/// Returns [`SchemaError`] if a parameter name is empty or repeated.
pub fn infer_schema(params: &[Param]) -> Result<InputSchema, SchemaError> {
    let mut schema = InputSchema::empty();

    for (position, param) in params.iter().enumerate() {
        if param.name.is_empty() {
            return Err(SchemaError::EmptyName { position });
        }
        if schema.properties.contains_key(&param.name) {
            return Err(SchemaError::DuplicateName {
                name: param.name.clone(),
            });
        }

        schema.properties.insert(
            param.name.clone(),
            PropertySchema {
                ty: param.ty.json_type(),
                nullable: param.ty.is_nullable(),
                description: param.description.clone(),
            },
        );

        if !param.has_default() {
            schema.required.push(param.name.clone());
        }
    }

    Ok(schema)
}
