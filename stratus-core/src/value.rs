//! Value - Concrete values produced by resolving a template
//!
//! Every property of a resolved resource is a `Value` tree. Values that only
//! exist once the stack is deployed (physical ids, `Fn::GetAtt` outputs,
//! imports without an export table) are represented as [`Value::Unknown`],
//! which remembers where the value would come from.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

/// Origin of a value that is only known at deploy time
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnknownSource {
    /// Physical id (`attribute: None`) or attribute of a resource
    Resource {
        logical_id: String,
        attribute: Option<String>,
    },
    /// `Fn::ImportValue` evaluated without an export table
    Import(String),
    /// Parameter with neither a supplied value nor a default
    Parameter(String),
    /// Intrinsic function the engine recognises but does not evaluate
    Function(String),
}

impl UnknownSource {
    pub fn resource(logical_id: impl Into<String>) -> Self {
        Self::Resource {
            logical_id: logical_id.into(),
            attribute: None,
        }
    }

    pub fn attribute(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::Resource {
            logical_id: logical_id.into(),
            attribute: Some(attribute.into()),
        }
    }

    /// Logical id of the resource this value depends on, if any
    pub fn logical_id(&self) -> Option<&str> {
        match self {
            Self::Resource { logical_id, .. } => Some(logical_id),
            _ => None,
        }
    }
}

impl fmt::Display for UnknownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource {
                logical_id,
                attribute: None,
            } => write!(f, "{}", logical_id),
            Self::Resource {
                logical_id,
                attribute: Some(attr),
            } => write!(f, "{}.{}", logical_id, attr),
            Self::Import(name) => write!(f, "ImportValue:{}", name),
            Self::Parameter(name) => write!(f, "Parameter:{}", name),
            Self::Function(name) => write!(f, "{}", name),
        }
    }
}

/// Whether an unknown value is a single scalar or a list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    List,
}

/// A value that cannot be computed before deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unknown {
    pub shape: Shape,
    pub sources: BTreeSet<UnknownSource>,
}

impl Unknown {
    pub fn new(shape: Shape, source: UnknownSource) -> Self {
        Self {
            shape,
            sources: BTreeSet::from([source]),
        }
    }

    pub fn scalar(source: UnknownSource) -> Self {
        Self::new(Shape::Scalar, source)
    }

    /// Combine the sources of several unknown values into one value of `shape`
    pub fn merge<'a>(shape: Shape, parts: impl IntoIterator<Item = &'a Unknown>) -> Self {
        let sources = parts
            .into_iter()
            .flat_map(|u| u.sources.iter().cloned())
            .collect();
        Self { shape, sources }
    }

    /// Logical ids of the resources this value depends on
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().filter_map(UnknownSource::logical_id)
    }
}

impl fmt::Display for Unknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for source in &self.sources {
            write!(f, "${{{}}}", source)?;
        }
        Ok(())
    }
}

/// Resolved attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Unknown(Unknown),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Unknown(u) => match u.shape {
                Shape::Scalar => "Unknown",
                Shape::List => "Unknown(List)",
            },
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// String form of a scalar, the way CloudFormation stringifies values
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn contains_unknown(&self) -> bool {
        match self {
            Value::Unknown(_) => true,
            Value::List(items) => items.iter().any(Value::contains_unknown),
            Value::Map(map) => map.values().any(Value::contains_unknown),
            _ => false,
        }
    }

    /// Collect every unknown source in this value tree
    pub fn collect_unknown_sources(&self, out: &mut BTreeSet<UnknownSource>) {
        match self {
            Value::Unknown(u) => out.extend(u.sources.iter().cloned()),
            Value::List(items) => {
                for item in items {
                    item.collect_unknown_sources(out);
                }
            }
            Value::Map(map) => {
                for v in map.values() {
                    v.collect_unknown_sources(out);
                }
            }
            _ => {}
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON; unknown values render as `${Resource.Attribute}` placeholders
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Unknown(u) => serde_json::Value::String(u.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Unknown(u) => write!(f, "{}", u),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
