//! Schema - Resource type schemas
//!
//! A [`SchemaRegistry`] maps resource type names (`AWS::S3::Bucket`) to their
//! property schemas. Registries are built once (usually by the
//! [`specification`](crate::specification) loader) and shared read-only.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::value::{Shape, Value};

/// Primitive property type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    Timestamp,
    Json,
}

impl PrimitiveType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "String" => Some(Self::String),
            "Integer" => Some(Self::Integer),
            "Long" => Some(Self::Long),
            "Double" => Some(Self::Double),
            "Boolean" => Some(Self::Boolean),
            "Timestamp" => Some(Self::Timestamp),
            "Json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Long | Self::Double)
    }

    /// Check a concrete value, accepting the coercions CloudFormation applies
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, v) => v.is_scalar(),
            (Self::Integer | Self::Long, Value::Int(_)) => true,
            (Self::Integer | Self::Long, Value::String(s)) => s.trim().parse::<i64>().is_ok(),
            (Self::Double, Value::Int(_) | Value::Float(_)) => true,
            (Self::Double, Value::String(s)) => s.trim().parse::<f64>().is_ok(),
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Boolean, Value::String(s)) => {
                s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false")
            }
            (Self::Timestamp, Value::String(_)) => true,
            (Self::Json, Value::Map(_) | Value::String(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Declared kind of a property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Primitive(PrimitiveType),
    /// Nested object, by fully qualified property type name
    Object(String),
    List(Box<ValueKind>),
    Map(Box<ValueKind>),
}

impl ValueKind {
    pub fn list(inner: ValueKind) -> Self {
        ValueKind::List(Box::new(inner))
    }

    pub fn map(inner: ValueKind) -> Self {
        ValueKind::Map(Box::new(inner))
    }

    pub fn string() -> Self {
        ValueKind::Primitive(PrimitiveType::String)
    }

    /// Shape of an unknown value of this kind
    pub fn shape(&self) -> Shape {
        match self {
            ValueKind::List(_) => Shape::List,
            _ => Shape::Scalar,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Primitive(p) => write!(f, "{}", p),
            ValueKind::Object(name) => write!(f, "{}", name),
            ValueKind::List(inner) => write!(f, "List<{}>", inner),
            ValueKind::Map(inner) => write!(f, "Map<{}>", inner),
        }
    }
}

/// Operational impact of changing a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum UpdateBehavior {
    NoInterruption,
    SomeInterruption,
    Replacement,
}

impl UpdateBehavior {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "NoInterruption" => Some(Self::NoInterruption),
            "SomeInterruption" => Some(Self::SomeInterruption),
            "Replacement" => Some(Self::Replacement),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The other properties of the object a property lives in
#[derive(Debug, Clone, Copy)]
pub struct Siblings<'a> {
    values: &'a BTreeMap<String, Value>,
    unresolved: Option<&'a BTreeSet<String>>,
}

impl<'a> Siblings<'a> {
    pub fn new(values: &'a BTreeMap<String, Value>) -> Self {
        Self {
            values,
            unresolved: None,
        }
    }

    /// Properties that failed to resolve still count as present
    pub fn with_unresolved(mut self, unresolved: &'a BTreeSet<String>) -> Self {
        self.unresolved = Some(unresolved);
        self
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.unresolved.is_some_and(|u| u.contains(name))
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.values.get(name)
    }
}

type Predicate = dyn Fn(&Siblings<'_>) -> bool + Send + Sync;

/// Requiredness that depends on sibling properties
#[derive(Clone)]
pub struct ConditionalRequirement {
    /// Human readable trigger, e.g. "unless Ipv4IpamPoolId is present"
    pub description: String,
    predicate: Arc<Predicate>,
}

impl ConditionalRequirement {
    /// `predicate` returns true when the property is required
    pub fn new(
        description: impl Into<String>,
        predicate: impl Fn(&Siblings<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Required unless any of `names` is present
    pub fn unless_present(names: &'static [&'static str]) -> Self {
        Self::new(
            format!("required unless {} is present", names.join(" or ")),
            move |siblings| !names.iter().any(|n| siblings.is_present(n)),
        )
    }

    /// Required when `name` is present
    pub fn if_present(name: &'static str) -> Self {
        Self::new(format!("required when {} is present", name), move |siblings| {
            siblings.is_present(name)
        })
    }

    pub fn is_required(&self, siblings: &Siblings<'_>) -> bool {
        (self.predicate)(siblings)
    }
}

impl fmt::Debug for ConditionalRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalRequirement")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Requiredness {
    Required,
    Optional,
    Conditional(ConditionalRequirement),
}

impl Requiredness {
    pub fn is_required(&self, siblings: &Siblings<'_>) -> bool {
        match self {
            Requiredness::Required => true,
            Requiredness::Optional => false,
            Requiredness::Conditional(rule) => rule.is_required(siblings),
        }
    }
}

/// Property schema
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: String,
    pub kind: ValueKind,
    pub requiredness: Requiredness,
    pub allowed_values: Option<Vec<String>>,
    /// Numeric value for numbers, character count for strings, item count for lists and maps
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Per-item bounds for lists of scalars, measured like `min`/`max` on a scalar
    pub item_min: Option<f64>,
    pub item_max: Option<f64>,
    /// Searched, not anchored
    pub pattern: Option<Regex>,
    pub update: UpdateBehavior,
    pub documentation: Option<String>,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            requiredness: Requiredness::Optional,
            allowed_values: None,
            min: None,
            max: None,
            item_min: None,
            item_max: None,
            pattern: None,
            update: UpdateBehavior::NoInterruption,
            documentation: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.requiredness = Requiredness::Required;
        self
    }

    pub fn conditional(mut self, rule: ConditionalRequirement) -> Self {
        self.requiredness = Requiredness::Conditional(rule);
        self
    }

    pub fn with_allowed_values(mut self, values: &[&str]) -> Self {
        self.allowed_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_item_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.item_min = min;
        self.item_max = max;
        self
    }

    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn with_update(mut self, update: UpdateBehavior) -> Self {
        self.update = update;
        self
    }

    pub fn with_documentation(mut self, doc: impl Into<String>) -> Self {
        self.documentation = Some(doc.into());
        self
    }
}

/// Nested property type, e.g. `AWS::S3::Bucket.VersioningConfiguration`
#[derive(Debug, Clone)]
pub struct ObjectSchema {
    pub name: String,
    pub properties: BTreeMap<String, PropertySpec>,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.properties.insert(spec.name.clone(), spec);
        self
    }
}

/// Attribute exposed through `Fn::GetAtt`
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    pub name: String,
    pub kind: ValueKind,
}

#[derive(Debug, Clone)]
pub struct ResourceTypeSchema {
    pub type_name: String,
    pub properties: BTreeMap<String, PropertySpec>,
    pub attributes: BTreeMap<String, AttributeSpec>,
    pub documentation: Option<String>,
}

impl ResourceTypeSchema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: BTreeMap::new(),
            attributes: BTreeMap::new(),
            documentation: None,
        }
    }

    pub fn property(mut self, spec: PropertySpec) -> Self {
        self.properties.insert(spec.name.clone(), spec);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        let name = name.into();
        self.attributes
            .insert(name.clone(), AttributeSpec { name, kind });
        self
    }

    pub fn with_documentation(mut self, doc: impl Into<String>) -> Self {
        self.documentation = Some(doc.into());
        self
    }
}

/// Schema errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Unknown resource type '{0}'")]
    UnknownResourceType(String),

    #[error("Invalid specification document: {0}")]
    Document(String),

    #[error("{owner}.{property}: unknown property type '{name}'")]
    UnknownPropertyType {
        owner: String,
        property: String,
        name: String,
    },

    #[error("{owner}.{property}: {message}")]
    InvalidProperty {
        owner: String,
        property: String,
        message: String,
    },

    #[error("Conditional rule for {type_name}.{property}: {message}")]
    ConditionalRule {
        type_name: String,
        property: String,
        message: String,
    },
}

/// Property declared conditional without an encoded rule
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnencodedConditional {
    pub type_name: String,
    pub property: String,
}

impl fmt::Display for UnencodedConditional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.property)
    }
}

/// Immutable lookup of resource type schemas
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    resources: BTreeMap<String, ResourceTypeSchema>,
    objects: BTreeMap<String, ObjectSchema>,
    unencoded: Vec<UnencodedConditional>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, schema: ResourceTypeSchema) -> Self {
        self.resources.insert(schema.type_name.clone(), schema);
        self
    }

    pub fn with_object(mut self, schema: ObjectSchema) -> Self {
        self.objects.insert(schema.name.clone(), schema);
        self
    }

    pub(crate) fn with_unencoded(mut self, unencoded: Vec<UnencodedConditional>) -> Self {
        self.unencoded = unencoded;
        self
    }

    pub fn lookup(&self, type_name: &str) -> Result<&ResourceTypeSchema, SchemaError> {
        self.resources
            .get(type_name)
            .ok_or_else(|| SchemaError::UnknownResourceType(type_name.to_string()))
    }

    pub fn object(&self, name: &str) -> Option<&ObjectSchema> {
        self.objects.get(name)
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Properties marked conditional for which no rule was encoded; they load as optional
    pub fn unencoded_conditionals(&self) -> &[UnencodedConditional] {
        &self.unencoded
    }
}
