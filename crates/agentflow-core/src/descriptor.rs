//! Type descriptors for action parameters and results.
//!
//! A `TypeDescriptor` is the engine's view of a Rust type: enough structure to
//! render a JSON Schema fragment for the model. The `Describe` trait infers a
//! descriptor from a Rust type so action authors rarely have to spell one out.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Structural description of a parameter or result type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDescriptor {
    String,
    Integer,
    Number,
    Boolean,
    Date,
    DateTime,
    /// Closed set of string choices.
    Enum { choices: Vec<String> },
    /// Value that may be absent.
    Optional { inner: Box<TypeDescriptor> },
    /// Homogeneous sequence.
    Sequence { items: Box<TypeDescriptor> },
    /// Homogeneous string-keyed mapping.
    Mapping { values: Box<TypeDescriptor> },
    /// Structured record with named fields, in declaration order.
    Record { fields: Vec<(String, TypeDescriptor)> },
    /// Anything the engine does not recognise. Rendered as a string.
    Other { type_name: String },
}

impl TypeDescriptor {
    pub fn enumeration<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    pub fn optional(inner: TypeDescriptor) -> Self {
        Self::Optional {
            inner: Box::new(inner),
        }
    }

    pub fn sequence(items: TypeDescriptor) -> Self {
        Self::Sequence {
            items: Box::new(items),
        }
    }

    pub fn mapping(values: TypeDescriptor) -> Self {
        Self::Mapping {
            values: Box::new(values),
        }
    }

    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, TypeDescriptor)>,
        S: Into<String>,
    {
        Self::Record {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn other(type_name: impl Into<String>) -> Self {
        Self::Other {
            type_name: type_name.into(),
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional { .. })
    }

    /// Render as a JSON Schema fragment.
    ///
    /// Optional values collapse to their inner type; the optionality is
    /// expressed through the `required` list of the enclosing object.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::String | Self::Date | Self::DateTime | Self::Other { .. } => {
                json!({ "type": "string" })
            }
            Self::Integer => json!({ "type": "integer" }),
            Self::Number => json!({ "type": "number" }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Enum { choices } => json!({ "type": "string", "enum": choices }),
            Self::Optional { inner } => inner.to_json_schema(),
            Self::Sequence { items } => json!({
                "type": "array",
                "items": items.to_json_schema(),
            }),
            Self::Mapping { values } => json!({
                "type": "object",
                "additionalProperties": values.to_json_schema(),
            }),
            Self::Record { fields } => {
                let properties: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.to_json_schema()))
                    .collect();
                json!({ "type": "object", "properties": properties })
            }
        }
    }
}

/// A declared action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub ty: TypeDescriptor,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    /// A parameter; required unless its type is `Optional`.
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        let required = !ty.is_optional();
        Self {
            name: name.into(),
            ty,
            required,
            description: None,
        }
    }

    /// A parameter inferred from a Rust type.
    pub fn of<T: Describe + ?Sized>(name: impl Into<String>) -> Self {
        Self::new(name, T::describe())
    }

    /// Mark the parameter as having a default, i.e. not required.
    pub fn with_default(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn to_json_schema(&self) -> Value {
        let mut schema = self.ty.to_json_schema();
        if let (Some(desc), Some(obj)) = (&self.description, schema.as_object_mut()) {
            obj.insert("description".into(), Value::String(desc.clone()));
        }
        schema
    }
}

/// Render a parameter list as the JSON Schema of an arguments object.
pub fn parameters_schema(params: &[ParamSpec]) -> Value {
    let properties: serde_json::Map<String, Value> = params
        .iter()
        .map(|p| (p.name.clone(), p.to_json_schema()))
        .collect();
    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Infer a `TypeDescriptor` from a Rust type.
pub trait Describe {
    fn describe() -> TypeDescriptor;
}

macro_rules! describe_as {
    ($variant:ident: $($ty:ty),+) => {
        $(impl Describe for $ty {
            fn describe() -> TypeDescriptor {
                TypeDescriptor::$variant
            }
        })+
    };
}

describe_as!(String: String, str, char);
describe_as!(Integer: i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
describe_as!(Number: f32, f64);
describe_as!(Boolean: bool);
describe_as!(Date: chrono::NaiveDate);
describe_as!(DateTime: chrono::NaiveDateTime);

impl<Tz: chrono::TimeZone> Describe for chrono::DateTime<Tz> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::DateTime
    }
}

impl Describe for Value {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::other("json")
    }
}

impl<T: Describe + ?Sized> Describe for &T {
    fn describe() -> TypeDescriptor {
        T::describe()
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::optional(T::describe())
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::sequence(T::describe())
    }
}

impl<T: Describe> Describe for [T] {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::sequence(T::describe())
    }
}

impl<T: Describe, S> Describe for HashMap<String, T, S> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::mapping(T::describe())
    }
}

impl<T: Describe> Describe for BTreeMap<String, T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::mapping(T::describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives() {
        assert_eq!(String::describe().to_json_schema(), json!({"type": "string"}));
        assert_eq!(i64::describe().to_json_schema(), json!({"type": "integer"}));
        assert_eq!(f32::describe().to_json_schema(), json!({"type": "number"}));
        assert_eq!(bool::describe().to_json_schema(), json!({"type": "boolean"}));
        assert_eq!(
            chrono::NaiveDate::describe().to_json_schema(),
            json!({"type": "string"})
        );
    }

    #[test]
    fn enumeration() {
        let ty = TypeDescriptor::enumeration(["small", "large"]);
        assert_eq!(
            ty.to_json_schema(),
            json!({"type": "string", "enum": ["small", "large"]})
        );
    }

    #[test]
    fn optional_collapses_to_inner() {
        let ty = Option::<u32>::describe();
        assert!(ty.is_optional());
        assert_eq!(ty.to_json_schema(), json!({"type": "integer"}));
    }

    #[test]
    fn nested_collections() {
        let ty = HashMap::<String, Vec<Option<f64>>>::describe();
        assert_eq!(
            ty.to_json_schema(),
            json!({
                "type": "object",
                "additionalProperties": {
                    "type": "array",
                    "items": {"type": "number"}
                }
            })
        );
    }

    #[test]
    fn record_keeps_field_schemas() {
        let ty = TypeDescriptor::record([
            ("sku", TypeDescriptor::String),
            ("tags", Vec::<String>::describe()),
            (
                "dims",
                TypeDescriptor::record([("w", TypeDescriptor::Number)]),
            ),
        ]);
        let schema = ty.to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["sku"], json!({"type": "string"}));
        assert_eq!(schema["properties"]["tags"]["type"], "array");
        assert_eq!(
            schema["properties"]["dims"]["properties"]["w"],
            json!({"type": "number"})
        );
    }

    #[test]
    fn unrecognised_types_render_as_string() {
        assert_eq!(
            TypeDescriptor::other("Uuid").to_json_schema(),
            json!({"type": "string"})
        );
        assert_eq!(Value::describe().to_json_schema(), json!({"type": "string"}));
    }

    #[test]
    fn parameters_schema_marks_required() {
        let params = vec![
            ParamSpec::of::<String>("city").with_description("City name"),
            ParamSpec::of::<Option<u8>>("days"),
            ParamSpec::of::<bool>("metric").with_default(),
        ];
        let schema = parameters_schema(&params);
        assert_eq!(schema["required"], json!(["city"]));
        assert_eq!(schema["properties"]["city"]["description"], "City name");
        assert_eq!(schema["properties"]["days"], json!({"type": "integer"}));
        assert_eq!(schema["additionalProperties"], json!(false));
    }
}
