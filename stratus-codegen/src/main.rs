//! CloudFormation registry schema to Stratus specification converter
//!
//! Converts a resource provider schema (as returned by
//! `aws cloudformation describe-type`) into resource specification entries
//! that the Stratus schema registry loads.
//!
//! Usage:
//!   # Convert from stdin (pipe from aws cli)
//!   aws cloudformation describe-type --type RESOURCE --type-name AWS::SQS::Queue \
//!     --query 'Schema' --output text | stratus-codegen
//!
//!   # Convert from file and merge into an existing specification
//!   stratus-codegen --file queue.json --merge resource_specification.json \
//!     --output resource_specification.json

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read};

use stratus_core::specification::{
    AttributeEntry, PropertyEntry, PropertyTypeEntry, RequiredFlag, ResourceTypeEntry,
    Specification, CONDITIONAL,
};

#[derive(Parser, Debug)]
#[command(name = "stratus-codegen")]
#[command(about = "Convert CloudFormation registry schemas into Stratus specification entries")]
struct Args {
    /// Override the type name declared in the schema (e.g., AWS::EC2::VPC)
    #[arg(long)]
    type_name: Option<String>,

    /// Input file (reads from stdin if not specified)
    #[arg(long)]
    file: Option<String>,

    /// Output file (writes to stdout if not specified)
    #[arg(long, short)]
    output: Option<String>,

    /// Existing specification to merge the generated entries into
    #[arg(long)]
    merge: Option<String>,
}

/// CloudFormation resource provider schema
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfnSchema {
    type_name: String,
    description: Option<String>,
    #[serde(default)]
    properties: BTreeMap<String, CfnProperty>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    read_only_properties: Vec<String>,
    #[serde(default)]
    create_only_properties: Vec<String>,
    #[serde(default)]
    definitions: BTreeMap<String, CfnProperty>,
    #[serde(default)]
    one_of: Vec<CfnRequiredSet>,
    #[serde(default)]
    any_of: Vec<CfnRequiredSet>,
}

/// Alternative required sets (`oneOf: [{ required: [...] }]`)
#[derive(Debug, Deserialize)]
struct CfnRequiredSet {
    #[serde(default)]
    required: Vec<String>,
}

/// Type can be a string or an array of strings in JSON Schema
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TypeValue {
    Single(String),
    Multiple(Vec<String>),
}

impl TypeValue {
    fn as_str(&self) -> Option<&str> {
        match self {
            TypeValue::Single(s) => Some(s),
            TypeValue::Multiple(v) => v.first().map(|s| s.as_str()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfnProperty {
    #[serde(rename = "type")]
    prop_type: Option<TypeValue>,
    description: Option<String>,
    #[serde(rename = "enum")]
    enum_values: Option<Vec<serde_json::Value>>,
    items: Option<Box<CfnProperty>>,
    #[serde(rename = "$ref")]
    ref_path: Option<String>,
    properties: Option<BTreeMap<String, CfnProperty>>,
    #[serde(default)]
    required: Vec<String>,
    pattern: Option<String>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    min_length: Option<f64>,
    max_length: Option<f64>,
    min_items: Option<f64>,
    max_items: Option<f64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Read schema JSON
    let schema_json = if let Some(file_path) = &args.file {
        std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read file: {}", file_path))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    };

    let schema: CfnSchema =
        serde_json::from_str(&schema_json).context("Failed to parse CloudFormation schema")?;
    let type_name = args.type_name.as_deref().unwrap_or(&schema.type_name);

    let mut spec = match &args.merge {
        Some(path) => {
            let existing = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read file: {}", path))?;
            serde_json::from_str(&existing)
                .with_context(|| format!("Failed to parse specification: {}", path))?
        }
        None => Specification::default(),
    };
    convert(&schema, type_name, &mut spec)?;

    let json = serde_json::to_string_pretty(&spec).context("Failed to serialize specification")?;
    if let Some(output_path) = &args.output {
        std::fs::write(output_path, format!("{}\n", json))
            .with_context(|| format!("Failed to write to: {}", output_path))?;
        eprintln!("Generated: {}", output_path);
    } else {
        println!("{}", json);
    }

    Ok(())
}

fn top_level(pointers: &[String]) -> BTreeSet<String> {
    pointers
        .iter()
        .filter_map(|p| p.strip_prefix("/properties/"))
        .filter(|p| !p.contains('/'))
        .map(|p| p.to_string())
        .collect()
}

/// Add the resource type and its property types to `spec`, replacing earlier entries
fn convert(schema: &CfnSchema, type_name: &str, spec: &mut Specification) -> Result<()> {
    if type_name.split("::").count() != 3 {
        anyhow::bail!("Invalid type name format: {}", type_name);
    }

    let read_only = top_level(&schema.read_only_properties);
    let create_only = top_level(&schema.create_only_properties);
    let required: BTreeSet<&String> = schema.required.iter().collect();
    let alternatives: BTreeSet<&String> = schema
        .one_of
        .iter()
        .chain(&schema.any_of)
        .flat_map(|set| &set.required)
        .collect();

    let mut entry = ResourceTypeEntry {
        documentation: schema.description.clone(),
        ..Default::default()
    };

    for (name, prop) in &schema.properties {
        if read_only.contains(name) {
            entry
                .attributes
                .insert(name.clone(), attribute_entry(prop, schema));
            continue;
        }

        let mut property = property_entry(prop, type_name, schema)?;
        property.required = if required.contains(name) {
            RequiredFlag::Flag(true)
        } else if alternatives.contains(name) {
            RequiredFlag::Marker(CONDITIONAL.to_string())
        } else {
            RequiredFlag::Flag(false)
        };
        property.update_requires = Some(
            if create_only.contains(name) {
                "Replacement"
            } else {
                "NoInterruption"
            }
            .to_string(),
        );
        entry.properties.insert(name.clone(), property);
    }

    for (name, definition) in &schema.definitions {
        let Some(properties) = &definition.properties else {
            continue;
        };
        let mut object = PropertyTypeEntry {
            documentation: definition.description.clone(),
            ..Default::default()
        };
        for (prop_name, prop) in properties {
            let mut property = property_entry(prop, type_name, schema)?;
            property.required = RequiredFlag::Flag(definition.required.contains(prop_name));
            object.properties.insert(prop_name.clone(), property);
        }
        spec.property_types
            .insert(property_type_name(type_name, name), object);
    }

    spec.resource_types.insert(type_name.to_string(), entry);
    Ok(())
}

/// `Tag` is shared by every resource; other definitions live under the resource type
fn property_type_name(type_name: &str, definition: &str) -> String {
    if definition == "Tag" {
        definition.to_string()
    } else {
        format!("{}.{}", type_name, definition)
    }
}

fn definition_name(ref_path: &str) -> Option<&str> {
    ref_path.strip_prefix("#/definitions/")
}

/// JSON Schema primitive to specification primitive
fn primitive(json_type: Option<&str>) -> &'static str {
    match json_type {
        Some("boolean") => "Boolean",
        Some("integer") => "Integer",
        Some("number") => "Double",
        Some("object") => "Json",
        _ => "String",
    }
}

enum Shape {
    Primitive(&'static str),
    Object(String),
}

/// Resolve `$ref` to either an object property type or the definition's primitive
fn shape(prop: &CfnProperty, type_name: &str, schema: &CfnSchema) -> Shape {
    if let Some(name) = prop.ref_path.as_deref().and_then(definition_name) {
        return match schema.definitions.get(name) {
            Some(def) if def.properties.is_some() => Shape::Object(property_type_name(type_name, name)),
            Some(def) => Shape::Primitive(primitive(def.prop_type.as_ref().and_then(|t| t.as_str()))),
            None => Shape::Primitive("Json"),
        };
    }
    if prop.properties.is_some() {
        return Shape::Primitive("Json");
    }
    Shape::Primitive(primitive(prop.prop_type.as_ref().and_then(|t| t.as_str())))
}

fn property_entry(prop: &CfnProperty, type_name: &str, schema: &CfnSchema) -> Result<PropertyEntry> {
    let mut entry = PropertyEntry {
        documentation: prop.description.clone(),
        ..Default::default()
    };

    let is_array = prop.prop_type.as_ref().and_then(|t| t.as_str()) == Some("array");
    if is_array {
        entry.type_name = Some("List".to_string());
        let default_item = CfnProperty::default();
        let items = prop.items.as_deref().unwrap_or(&default_item);
        match shape(items, type_name, schema) {
            Shape::Primitive(p) => entry.primitive_item_type = Some(p.to_string()),
            Shape::Object(name) => entry.item_type = Some(name),
        }
        entry.minimum = prop.min_items;
        entry.maximum = prop.max_items;
        entry.item_minimum = items.minimum.or(items.min_length);
        entry.item_maximum = items.maximum.or(items.max_length);
        entry.allowed_values = enum_values(items)?;
        entry.pattern = items.pattern.clone();
        return Ok(entry);
    }

    match shape(prop, type_name, schema) {
        Shape::Primitive(p) => entry.primitive_type = Some(p.to_string()),
        Shape::Object(name) => entry.type_name = Some(name),
    }
    entry.allowed_values = enum_values(prop)?;
    entry.pattern = prop.pattern.clone();
    entry.minimum = prop.minimum.or(prop.min_length);
    entry.maximum = prop.maximum.or(prop.max_length);
    Ok(entry)
}

fn enum_values(prop: &CfnProperty) -> Result<Option<Vec<String>>> {
    let Some(values) = &prop.enum_values else {
        return Ok(None);
    };
    values
        .iter()
        .map(|value| match value {
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::Bool(b) => Ok(b.to_string()),
            other => anyhow::bail!("Unsupported enum value: {}", other),
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn attribute_entry(prop: &CfnProperty, schema: &CfnSchema) -> AttributeEntry {
    let json_type = prop.prop_type.as_ref().and_then(|t| t.as_str());
    if json_type == Some("array") {
        let item_type = prop
            .items
            .as_deref()
            .map_or("String", |items| match shape(items, &schema.type_name, schema) {
                Shape::Primitive(p) => p,
                Shape::Object(_) => "Json",
            });
        return AttributeEntry {
            type_name: Some("List".to_string()),
            primitive_item_type: Some(item_type.to_string()),
            ..Default::default()
        };
    }
    let primitive_type = match shape(prop, &schema.type_name, schema) {
        Shape::Primitive(p) => p,
        Shape::Object(_) => "Json",
    };
    AttributeEntry {
        primitive_type: Some(primitive_type.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::specification::ConditionalRules;

    const QUEUE: &str = r##"{
      "typeName": "AWS::Test::Queue",
      "description": "A test queue",
      "properties": {
        "QueueName": { "type": "string", "minLength": 1, "maxLength": 80 },
        "DelaySeconds": { "type": "integer", "minimum": 0, "maximum": 900 },
        "Mode": { "type": "string", "enum": ["standard", "fifo"] },
        "Zones": { "type": "array", "items": { "type": "string", "maxLength": 20 }, "maxItems": 3 },
        "Policy": { "type": "object" },
        "Redrive": { "$ref": "#/definitions/Redrive" },
        "Tags": { "type": "array", "items": { "$ref": "#/definitions/Tag" } },
        "KmsKeyId": { "type": "string" },
        "KmsAlias": { "type": "string" },
        "Arn": { "type": "string" },
        "Endpoints": { "type": "array", "items": { "type": "string" } }
      },
      "definitions": {
        "Redrive": {
          "type": "object",
          "properties": {
            "TargetArn": { "type": "string" },
            "MaxReceiveCount": { "type": "integer", "minimum": 1 }
          },
          "required": ["TargetArn"]
        },
        "Tag": {
          "type": "object",
          "properties": { "Key": { "type": "string" }, "Value": { "type": "string" } },
          "required": ["Key", "Value"]
        }
      },
      "required": ["QueueName"],
      "oneOf": [{ "required": ["KmsKeyId"] }, { "required": ["KmsAlias"] }],
      "readOnlyProperties": ["/properties/Arn", "/properties/Endpoints"],
      "createOnlyProperties": ["/properties/QueueName", "/properties/Mode"]
    }"##;

    fn converted() -> Specification {
        let schema: CfnSchema = serde_json::from_str(QUEUE).unwrap();
        let mut spec = Specification::default();
        convert(&schema, &schema.type_name, &mut spec).unwrap();
        spec
    }

    #[test]
    fn test_properties_and_update_behavior() {
        let spec = converted();
        let queue = &spec.resource_types["AWS::Test::Queue"];

        let name = &queue.properties["QueueName"];
        assert_eq!(name.primitive_type.as_deref(), Some("String"));
        assert_eq!(name.required, RequiredFlag::Flag(true));
        assert_eq!(name.update_requires.as_deref(), Some("Replacement"));
        assert_eq!((name.minimum, name.maximum), (Some(1.0), Some(80.0)));

        let delay = &queue.properties["DelaySeconds"];
        assert_eq!(delay.primitive_type.as_deref(), Some("Integer"));
        assert_eq!(delay.update_requires.as_deref(), Some("NoInterruption"));

        assert_eq!(
            queue.properties["Mode"].allowed_values,
            Some(vec!["standard".to_string(), "fifo".to_string()])
        );
        assert_eq!(queue.properties["Policy"].primitive_type.as_deref(), Some("Json"));
    }

    #[test]
    fn test_lists_and_objects() {
        let spec = converted();
        let queue = &spec.resource_types["AWS::Test::Queue"];

        let zones = &queue.properties["Zones"];
        assert_eq!(zones.type_name.as_deref(), Some("List"));
        assert_eq!(zones.primitive_item_type.as_deref(), Some("String"));
        assert_eq!(zones.maximum, Some(3.0));
        assert_eq!(zones.item_maximum, Some(20.0));

        assert_eq!(queue.properties["Tags"].item_type.as_deref(), Some("Tag"));
        assert_eq!(
            queue.properties["Redrive"].type_name.as_deref(),
            Some("AWS::Test::Queue.Redrive")
        );

        let redrive = &spec.property_types["AWS::Test::Queue.Redrive"];
        assert_eq!(redrive.properties["TargetArn"].required, RequiredFlag::Flag(true));
        assert_eq!(redrive.properties["MaxReceiveCount"].minimum, Some(1.0));
        assert!(spec.property_types.contains_key("Tag"));
    }

    #[test]
    fn test_read_only_become_attributes() {
        let spec = converted();
        let queue = &spec.resource_types["AWS::Test::Queue"];
        assert!(!queue.properties.contains_key("Arn"));
        assert_eq!(queue.attributes["Arn"].primitive_type.as_deref(), Some("String"));
        assert_eq!(queue.attributes["Endpoints"].type_name.as_deref(), Some("List"));
    }

    #[test]
    fn test_alternatives_are_conditional() {
        let spec = converted();
        let queue = &spec.resource_types["AWS::Test::Queue"];
        assert_eq!(
            queue.properties["KmsKeyId"].required,
            RequiredFlag::Marker(CONDITIONAL.to_string())
        );
    }

    #[test]
    fn test_output_loads_into_registry() {
        let json = serde_json::to_string(&converted()).unwrap();
        let registry = stratus_core::specification::load(&json, &ConditionalRules::new()).unwrap();
        assert!(registry.lookup("AWS::Test::Queue").is_ok());
        assert_eq!(registry.unencoded_conditionals().len(), 2);
    }

    #[test]
    fn test_merge_replaces_entry() {
        let mut spec = converted();
        spec.resource_types
            .get_mut("AWS::Test::Queue")
            .unwrap()
            .properties
            .clear();
        let schema: CfnSchema = serde_json::from_str(QUEUE).unwrap();
        convert(&schema, "AWS::Test::Queue", &mut spec).unwrap();
        assert!(spec.resource_types["AWS::Test::Queue"]
            .properties
            .contains_key("QueueName"));
    }

    #[test]
    fn test_invalid_type_name() {
        let schema: CfnSchema = serde_json::from_str(QUEUE).unwrap();
        assert!(convert(&schema, "Queue", &mut Specification::default()).is_err());
    }
}
