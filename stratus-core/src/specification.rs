//! Specification - Resource specification data format and loader
//!
//! The registry is built from a JSON document shaped like the CloudFormation
//! resource specification:
//!
//! ```json
//! {
//!   "ResourceTypes": {
//!     "AWS::SNS::Topic": {
//!       "Properties": {
//!         "TopicName": {"PrimitiveType": "String", "Required": false, "UpdateRequires": "Replacement"}
//!       },
//!       "Attributes": {"TopicArn": {"PrimitiveType": "String"}}
//!     }
//!   },
//!   "PropertyTypes": {"Tag": {"Properties": {...}}}
//! }
//! ```
//!
//! `Required` is `true`, `false` or `"Conditional"`. Conditional properties
//! need a hand-encoded rule (see [`ConditionalRules`]).

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::schema::{
    ConditionalRequirement, ObjectSchema, PrimitiveType, PropertySpec, Requiredness,
    ResourceTypeSchema, SchemaError, SchemaRegistry, UnencodedConditional, UpdateBehavior,
    ValueKind,
};

/// Marker value of `Required` for conditionally required properties
pub const CONDITIONAL: &str = "Conditional";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Specification {
    #[serde(default)]
    pub resource_types: BTreeMap<String, ResourceTypeEntry>,
    #[serde(default)]
    pub property_types: BTreeMap<String, PropertyTypeEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceTypeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyEntry>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PropertyTypeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyEntry>,
}

/// `Required: true | false | "Conditional"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequiredFlag {
    Flag(bool),
    Marker(String),
}

impl Default for RequiredFlag {
    fn default() -> Self {
        RequiredFlag::Flag(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PropertyEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primitive_type: Option<String>,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primitive_item_type: Option<String>,
    #[serde(default)]
    pub required: RequiredFlag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_requires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primitive_type: Option<String>,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primitive_item_type: Option<String>,
}

/// Hand-encoded conditional requiredness, keyed by (type name, property name)
///
/// The type name is either a resource type (`AWS::EC2::Subnet`) or a property
/// type (`AWS::EC2::Instance.BlockDeviceMapping`).
#[derive(Debug, Clone, Default)]
pub struct ConditionalRules {
    rules: BTreeMap<(String, String), ConditionalRequirement>,
}

impl ConditionalRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(
        mut self,
        type_name: impl Into<String>,
        property: impl Into<String>,
        rule: ConditionalRequirement,
    ) -> Self {
        self.rules.insert((type_name.into(), property.into()), rule);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Specification {
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(json).map_err(|e| SchemaError::Document(e.to_string()))
    }

    /// Build an immutable registry, attaching the conditional rules
    pub fn build(&self, rules: &ConditionalRules) -> Result<SchemaRegistry, SchemaError> {
        let mut loader = Loader {
            spec: self,
            rules,
            used_rules: BTreeSet::new(),
            unencoded: Vec::new(),
        };

        let mut registry = SchemaRegistry::new();
        for (name, entry) in &self.property_types {
            let mut object = ObjectSchema::new(name);
            for (prop_name, prop) in &entry.properties {
                object = object.property(loader.property(name, prop_name, prop)?);
            }
            registry = registry.with_object(object);
        }

        for (type_name, entry) in &self.resource_types {
            let mut schema = ResourceTypeSchema::new(type_name);
            if let Some(doc) = &entry.documentation {
                schema = schema.with_documentation(doc);
            }
            for (prop_name, prop) in &entry.properties {
                schema = schema.property(loader.property(type_name, prop_name, prop)?);
            }
            for (attr_name, attr) in &entry.attributes {
                schema = schema.attribute(attr_name, loader.attribute_kind(type_name, attr_name, attr)?);
            }
            registry = registry.with_resource(schema);
        }

        for (type_name, property) in rules.rules.keys() {
            if !loader
                .used_rules
                .contains(&(type_name.clone(), property.clone()))
            {
                return Err(SchemaError::ConditionalRule {
                    type_name: type_name.clone(),
                    property: property.clone(),
                    message: "no such conditional property in the specification".to_string(),
                });
            }
        }

        debug!(
            "Loaded {} resource types, {} property types, {} conditional rules",
            self.resource_types.len(),
            self.property_types.len(),
            rules.len()
        );
        Ok(registry.with_unencoded(loader.unencoded))
    }
}

/// Parse a specification document and build the registry
pub fn load(json: &str, rules: &ConditionalRules) -> Result<SchemaRegistry, SchemaError> {
    Specification::from_json_str(json)?.build(rules)
}

struct Loader<'a> {
    spec: &'a Specification,
    rules: &'a ConditionalRules,
    used_rules: BTreeSet<(String, String)>,
    unencoded: Vec<UnencodedConditional>,
}

impl Loader<'_> {
    fn invalid(owner: &str, property: &str, message: impl Into<String>) -> SchemaError {
        SchemaError::InvalidProperty {
            owner: owner.to_string(),
            property: property.to_string(),
            message: message.into(),
        }
    }

    fn property(
        &mut self,
        owner: &str,
        name: &str,
        entry: &PropertyEntry,
    ) -> Result<PropertySpec, SchemaError> {
        let kind = self.property_kind(owner, name, entry)?;
        let mut spec = PropertySpec::new(name, kind);

        spec.requiredness = self.requiredness(owner, name, &entry.required)?;

        if let Some(update) = &entry.update_requires {
            spec.update = UpdateBehavior::parse(update).ok_or_else(|| {
                Self::invalid(owner, name, format!("unknown update behavior '{}'", update))
            })?;
        }

        if let Some(values) = &entry.allowed_values {
            spec.allowed_values = Some(values.clone());
        }

        if let Some(pattern) = &entry.pattern {
            let regex = Regex::new(pattern).map_err(|e| {
                Self::invalid(owner, name, format!("invalid pattern '{}': {}", pattern, e))
            })?;
            spec = spec.with_pattern(regex);
        }

        for (min, max) in [
            (entry.minimum, entry.maximum),
            (entry.item_minimum, entry.item_maximum),
        ] {
            if let (Some(min), Some(max)) = (min, max)
                && min > max
            {
                return Err(Self::invalid(
                    owner,
                    name,
                    format!("minimum {} is greater than maximum {}", min, max),
                ));
            }
        }
        if (entry.item_minimum.is_some() || entry.item_maximum.is_some())
            && !matches!(spec.kind, ValueKind::List(_))
        {
            return Err(Self::invalid(owner, name, "item bounds apply only to lists"));
        }
        spec = spec
            .with_bounds(entry.minimum, entry.maximum)
            .with_item_bounds(entry.item_minimum, entry.item_maximum);

        if let Some(doc) = &entry.documentation {
            spec = spec.with_documentation(doc);
        }
        Ok(spec)
    }

    fn requiredness(
        &mut self,
        owner: &str,
        name: &str,
        flag: &RequiredFlag,
    ) -> Result<Requiredness, SchemaError> {
        let key = (owner.to_string(), name.to_string());
        let rule = self.rules.rules.get(&key);
        match flag {
            RequiredFlag::Marker(marker) if marker == CONDITIONAL => {
                self.used_rules.insert(key);
                match rule {
                    Some(rule) => Ok(Requiredness::Conditional(rule.clone())),
                    None => {
                        warn!(
                            "{}.{} is conditionally required but has no encoded rule; treating it as optional",
                            owner, name
                        );
                        self.unencoded.push(UnencodedConditional {
                            type_name: owner.to_string(),
                            property: name.to_string(),
                        });
                        Ok(Requiredness::Optional)
                    }
                }
            }
            RequiredFlag::Marker(other) => Err(Self::invalid(
                owner,
                name,
                format!("invalid Required value '{}'", other),
            )),
            RequiredFlag::Flag(required) => {
                if rule.is_some() {
                    return Err(SchemaError::ConditionalRule {
                        type_name: owner.to_string(),
                        property: name.to_string(),
                        message: "property is not marked Conditional".to_string(),
                    });
                }
                Ok(if *required {
                    Requiredness::Required
                } else {
                    Requiredness::Optional
                })
            }
        }
    }

    fn primitive(owner: &str, name: &str, type_name: &str) -> Result<ValueKind, SchemaError> {
        PrimitiveType::parse(type_name)
            .map(ValueKind::Primitive)
            .ok_or_else(|| Self::invalid(owner, name, format!("unknown primitive type '{}'", type_name)))
    }

    /// Resolve a property type name in the owner's namespace first, then globally
    fn object(&self, owner: &str, name: &str, type_name: &str) -> Result<ValueKind, SchemaError> {
        let namespace = owner.split('.').next().unwrap_or(owner);
        let qualified = format!("{}.{}", namespace, type_name);
        if self.spec.property_types.contains_key(&qualified) {
            Ok(ValueKind::Object(qualified))
        } else if self.spec.property_types.contains_key(type_name) {
            Ok(ValueKind::Object(type_name.to_string()))
        } else {
            Err(SchemaError::UnknownPropertyType {
                owner: owner.to_string(),
                property: name.to_string(),
                name: type_name.to_string(),
            })
        }
    }

    fn property_kind(
        &self,
        owner: &str,
        name: &str,
        entry: &PropertyEntry,
    ) -> Result<ValueKind, SchemaError> {
        if let Some(primitive) = &entry.primitive_type {
            return Self::primitive(owner, name, primitive);
        }
        let Some(type_name) = &entry.type_name else {
            return Err(Self::invalid(owner, name, "neither PrimitiveType nor Type is set"));
        };
        match type_name.as_str() {
            "List" | "Map" => {
                let item = match (&entry.primitive_item_type, &entry.item_type) {
                    (Some(primitive), _) => Self::primitive(owner, name, primitive)?,
                    (None, Some(item)) => self.object(owner, name, item)?,
                    (None, None) => {
                        return Err(Self::invalid(
                            owner,
                            name,
                            format!("{} without ItemType or PrimitiveItemType", type_name),
                        ));
                    }
                };
                Ok(if type_name == "List" {
                    ValueKind::list(item)
                } else {
                    ValueKind::map(item)
                })
            }
            other => self.object(owner, name, other),
        }
    }

    fn attribute_kind(
        &self,
        owner: &str,
        name: &str,
        entry: &AttributeEntry,
    ) -> Result<ValueKind, SchemaError> {
        match (&entry.type_name, &entry.primitive_type) {
            (Some(list), _) if list == "List" => {
                let item = entry.primitive_item_type.as_deref().unwrap_or("String");
                Ok(ValueKind::list(Self::primitive(owner, name, item)?))
            }
            (Some(other), _) => Err(Self::invalid(
                owner,
                name,
                format!("unsupported attribute type '{}'", other),
            )),
            (None, Some(primitive)) => Self::primitive(owner, name, primitive),
            (None, None) => Ok(ValueKind::string()),
        }
    }
}
