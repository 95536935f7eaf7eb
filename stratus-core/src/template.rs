//! Template - Parsed CloudFormation template
//!
//! Templates are read from JSON or YAML (including the short-form `!Ref`,
//! `!GetAtt`, `!Sub` ... tags) into plain serde structures first, then
//! converted into the typed model below with every property value parsed
//! into an [`Expr`] tree.

use std::collections::BTreeMap;

use log::debug;
use serde::Deserialize;

use crate::intrinsic::{Expr, MalformedExpr};
use crate::value::Value;

/// Errors for documents that cannot be turned into a [`Template`]
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Invalid template document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid template structure: {0}")]
    Structure(String),

    #[error("Malformed expression in {location}: {source}")]
    Expression {
        location: String,
        #[source]
        source: MalformedExpr,
    },

    #[error("Logical id '{0}' is declared both as a parameter and as a resource")]
    DuplicateLogicalId(String),
}

/// Second-level mapping table: top key -> second key -> value
pub type Mapping = BTreeMap<String, BTreeMap<String, Value>>;

/// Declared parameter type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Number,
    /// `List<Number>`
    NumberList,
    CommaDelimitedList,
    /// AWS-specific type such as `AWS::EC2::VPC::Id`
    AwsSpecific(String),
    /// `List<AWS::EC2::Subnet::Id>` and friends
    AwsSpecificList(String),
    /// `AWS::SSM::Parameter::Value<...>`
    SsmParameter(String),
}

impl ParameterType {
    pub fn parse(s: &str) -> Self {
        match s {
            "String" => Self::String,
            "Number" => Self::Number,
            "List<Number>" => Self::NumberList,
            "CommaDelimitedList" => Self::CommaDelimitedList,
            other if other.starts_with("AWS::SSM::Parameter::") => {
                Self::SsmParameter(other.to_string())
            }
            other => match other
                .strip_prefix("List<")
                .and_then(|s| s.strip_suffix('>'))
            {
                Some(inner) => Self::AwsSpecificList(inner.to_string()),
                None => Self::AwsSpecific(other.to_string()),
            },
        }
    }

    /// Whether `Ref` to this parameter yields a list
    pub fn is_list(&self) -> bool {
        match self {
            Self::NumberList | Self::CommaDelimitedList | Self::AwsSpecificList(_) => true,
            Self::SsmParameter(inner) => inner.contains("List<") || inner.contains("CommaDelimitedList"),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Number | Self::NumberList)
    }
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "String"),
            Self::Number => write!(f, "Number"),
            Self::NumberList => write!(f, "List<Number>"),
            Self::CommaDelimitedList => write!(f, "CommaDelimitedList"),
            Self::AwsSpecific(name) | Self::SsmParameter(name) => write!(f, "{}", name),
            Self::AwsSpecificList(name) => write!(f, "List<{}>", name),
        }
    }
}

/// Template parameter declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub parameter_type: ParameterType,
    pub default: Option<Value>,
    pub allowed_values: Option<Vec<String>>,
    pub allowed_pattern: Option<String>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub no_echo: bool,
    pub description: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, parameter_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            parameter_type,
            default: None,
            allowed_values: None,
            allowed_pattern: None,
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
            no_echo: false,
            description: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_allowed_values(mut self, values: &[&str]) -> Self {
        self.allowed_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_allowed_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_pattern = Some(pattern.into());
        self
    }

    pub fn with_length(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn with_value_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }
}

/// Resource declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub logical_id: String,
    pub resource_type: String,
    pub properties: BTreeMap<String, Expr>,
    pub depends_on: Vec<String>,
    pub condition: Option<String>,
    pub deletion_policy: Option<String>,
    pub update_replace_policy: Option<String>,
}

impl ResourceNode {
    pub fn new(logical_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
            depends_on: Vec::new(),
            condition: None,
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Expr) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// Output declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: String,
    pub value: Expr,
    pub description: Option<String>,
    pub export_name: Option<Expr>,
    pub condition: Option<String>,
}

impl Output {
    pub fn new(name: impl Into<String>, value: Expr) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
            export_name: None,
            condition: None,
        }
    }

    pub fn with_export(mut self, name: Expr) -> Self {
        self.export_name = Some(name);
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// A parsed template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub description: Option<String>,
    pub parameters: BTreeMap<String, Parameter>,
    pub mappings: BTreeMap<String, Mapping>,
    pub conditions: BTreeMap<String, Expr>,
    pub resources: BTreeMap<String, ResourceNode>,
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.insert(parameter.name.clone(), parameter);
        self
    }

    pub fn with_mapping(mut self, name: impl Into<String>, mapping: Mapping) -> Self {
        self.mappings.insert(name.into(), mapping);
        self
    }

    pub fn with_condition(mut self, name: impl Into<String>, condition: Expr) -> Self {
        self.conditions.insert(name.into(), condition);
        self
    }

    pub fn with_resource(mut self, resource: ResourceNode) -> Self {
        self.resources.insert(resource.logical_id.clone(), resource);
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.outputs.insert(output.name.clone(), output);
        self
    }

    /// Parse a JSON or YAML document, picking the format from its first character
    ///
    /// A document starting with `{` that is not valid JSON is retried as a
    /// YAML flow mapping; if that fails too the JSON error is returned.
    pub fn parse(content: &str) -> Result<Self, TemplateError> {
        if !content.trim_start().starts_with('{') {
            return Self::from_yaml_str(content);
        }
        match serde_json::from_str::<serde_json::Value>(content) {
            Ok(json) => Self::from_json(json),
            Err(json_error) => {
                debug!("Not valid JSON ({}), retrying as YAML", json_error);
                Self::from_yaml_str(content).map_err(|yaml_error| match yaml_error {
                    TemplateError::Yaml(_) => TemplateError::Json(json_error),
                    other => other,
                })
            }
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, TemplateError> {
        let raw: RawTemplate = serde_json::from_str(content)?;
        Self::from_raw(raw)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, TemplateError> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
        let json = yaml_to_json(yaml)?;
        Self::from_json(json)
    }

    pub fn from_json(json: serde_json::Value) -> Result<Self, TemplateError> {
        let raw: RawTemplate = serde_json::from_value(json)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawTemplate) -> Result<Self, TemplateError> {
        let mut template = Template {
            description: raw.description,
            ..Default::default()
        };

        for (name, raw_param) in raw.parameters {
            let parameter = raw_param.into_parameter(&name)?;
            template.parameters.insert(name, parameter);
        }

        for (name, table) in raw.mappings {
            let mapping = table
                .into_iter()
                .map(|(top, entries)| {
                    let entries = entries
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect();
                    (top, entries)
                })
                .collect();
            template.mappings.insert(name, mapping);
        }

        for (name, json) in raw.conditions {
            let expr = Expr::parse_condition(&json).map_err(|source| TemplateError::Expression {
                location: format!("Conditions.{}", name),
                source,
            })?;
            template.conditions.insert(name, expr);
        }

        for (logical_id, raw_resource) in raw.resources {
            if template.parameters.contains_key(&logical_id) {
                return Err(TemplateError::DuplicateLogicalId(logical_id));
            }
            let resource = raw_resource.into_resource(&logical_id)?;
            template.resources.insert(logical_id, resource);
        }

        for (name, raw_output) in raw.outputs {
            let output = raw_output.into_output(&name)?;
            template.outputs.insert(name, output);
        }

        Ok(template)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTemplate {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: BTreeMap<String, RawParameter>,
    #[serde(default)]
    mappings: BTreeMap<String, BTreeMap<String, serde_json::Map<String, serde_json::Value>>>,
    #[serde(default)]
    conditions: BTreeMap<String, serde_json::Value>,
    resources: BTreeMap<String, RawResource>,
    #[serde(default)]
    outputs: BTreeMap<String, RawOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawParameter {
    #[serde(rename = "Type")]
    parameter_type: String,
    #[serde(default)]
    default: Option<serde_json::Value>,
    #[serde(default)]
    allowed_values: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    allowed_pattern: Option<String>,
    #[serde(default)]
    min_length: Option<serde_json::Value>,
    #[serde(default)]
    max_length: Option<serde_json::Value>,
    #[serde(default)]
    min_value: Option<serde_json::Value>,
    #[serde(default)]
    max_value: Option<serde_json::Value>,
    #[serde(default)]
    no_echo: Option<serde_json::Value>,
    #[serde(default)]
    description: Option<String>,
}

/// Numbers in parameter constraints may be written as strings
fn lenient_number(
    name: &str,
    field: &str,
    value: Option<&serde_json::Value>,
) -> Result<Option<f64>, TemplateError> {
    match value {
        None => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64()),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| {
            TemplateError::Structure(format!(
                "Parameter '{}': {} must be a number, got '{}'",
                name, field, s
            ))
        }),
        Some(other) => Err(TemplateError::Structure(format!(
            "Parameter '{}': {} must be a number, got {}",
            name, field, other
        ))),
    }
}

impl RawParameter {
    fn into_parameter(self, name: &str) -> Result<Parameter, TemplateError> {
        let length = |field: &str, v: Option<&serde_json::Value>| {
            lenient_number(name, field, v).map(|n| n.map(|n| n.max(0.0) as u64))
        };
        let allowed_values = match self.allowed_values {
            Some(values) => Some(
                values
                    .iter()
                    .map(|v| {
                        Value::from_json(v).scalar_string().ok_or_else(|| {
                            TemplateError::Structure(format!(
                                "Parameter '{}': AllowedValues must be scalars",
                                name
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        let no_echo = match &self.no_echo {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };

        Ok(Parameter {
            name: name.to_string(),
            parameter_type: ParameterType::parse(&self.parameter_type),
            default: self.default.as_ref().map(Value::from_json),
            allowed_values,
            allowed_pattern: self.allowed_pattern,
            min_length: length("MinLength", self.min_length.as_ref())?,
            max_length: length("MaxLength", self.max_length.as_ref())?,
            min_value: lenient_number(name, "MinValue", self.min_value.as_ref())?,
            max_value: lenient_number(name, "MaxValue", self.max_value.as_ref())?,
            no_echo,
            description: self.description,
        })
    }
}

/// `DependsOn` accepts a single name or a list of names
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependsOn {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawResource {
    #[serde(rename = "Type")]
    resource_type: String,
    #[serde(default)]
    properties: Option<serde_json::Value>,
    #[serde(default)]
    depends_on: Option<RawDependsOn>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    deletion_policy: Option<String>,
    #[serde(default)]
    update_replace_policy: Option<String>,
}

impl RawResource {
    fn into_resource(self, logical_id: &str) -> Result<ResourceNode, TemplateError> {
        let mut resource = ResourceNode::new(logical_id, self.resource_type);

        match self.properties {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::Object(map)) => {
                for (name, json) in &map {
                    let expr = Expr::parse(json).map_err(|source| TemplateError::Expression {
                        location: format!("Resources.{}.Properties.{}", logical_id, name),
                        source,
                    })?;
                    resource.properties.insert(name.clone(), expr);
                }
            }
            Some(other) => {
                return Err(TemplateError::Structure(format!(
                    "Resource '{}': Properties must be an object, got {}",
                    logical_id, other
                )));
            }
        }

        resource.depends_on = match self.depends_on {
            None => Vec::new(),
            Some(RawDependsOn::Single(name)) => vec![name],
            Some(RawDependsOn::Multiple(names)) => names,
        };
        resource.condition = self.condition;
        resource.deletion_policy = self.deletion_policy;
        resource.update_replace_policy = self.update_replace_policy;
        Ok(resource)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawExport {
    name: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawOutput {
    value: serde_json::Value,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    export: Option<RawExport>,
    #[serde(default)]
    condition: Option<String>,
}

impl RawOutput {
    fn into_output(self, name: &str) -> Result<Output, TemplateError> {
        let value = Expr::parse(&self.value).map_err(|source| TemplateError::Expression {
            location: format!("Outputs.{}.Value", name),
            source,
        })?;
        let export_name = match &self.export {
            Some(export) => Some(Expr::parse(&export.name).map_err(|source| {
                TemplateError::Expression {
                    location: format!("Outputs.{}.Export.Name", name),
                    source,
                }
            })?),
            None => None,
        };
        Ok(Output {
            name: name.to_string(),
            value,
            description: self.description,
            export_name,
            condition: self.condition,
        })
    }
}

/// Convert YAML to JSON, expanding short-form intrinsic tags
fn yaml_to_json(value: serde_yaml::Value) -> Result<serde_json::Value, TemplateError> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => serde_json::Value::Null,
        Yaml::Bool(b) => serde_json::Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        Yaml::String(s) => serde_json::Value::String(s),
        Yaml::Sequence(items) => serde_json::Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<_, _>>()?,
        ),
        Yaml::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    other => {
                        return Err(TemplateError::Structure(format!(
                            "Unsupported mapping key {:?}",
                            other
                        )));
                    }
                };
                out.insert(key, yaml_to_json(v)?);
            }
            serde_json::Value::Object(out)
        }
        Yaml::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let name = tag.trim_start_matches('!').to_string();
            let inner = yaml_to_json(tagged.value)?;
            expand_short_form(&name, inner)?
        }
    })
}

fn expand_short_form(
    name: &str,
    inner: serde_json::Value,
) -> Result<serde_json::Value, TemplateError> {
    let (key, arg) = match name {
        "Ref" | "Condition" => (name.to_string(), inner),
        "GetAtt" => match inner {
            serde_json::Value::String(s) => {
                let (id, attr) = s.split_once('.').ok_or_else(|| {
                    TemplateError::Structure(format!("!GetAtt expects 'Resource.Attribute', got '{}'", s))
                })?;
                (
                    "Fn::GetAtt".to_string(),
                    serde_json::Value::Array(vec![id.into(), attr.into()]),
                )
            }
            other => ("Fn::GetAtt".to_string(), other),
        },
        other => (format!("Fn::{}", other), inner),
    };
    let mut map = serde_json::Map::new();
    map.insert(key, arg);
    Ok(serde_json::Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_TEMPLATE: &str = r#"{
        "AWSTemplateFormatVersion": "2010-09-09",
        "Parameters": {
            "Env": {"Type": "String", "Default": "dev", "AllowedValues": ["dev", "prod"]},
            "Subnets": {"Type": "List<AWS::EC2::Subnet::Id>"},
            "Port": {"Type": "Number", "MinValue": "1", "MaxValue": 65535}
        },
        "Conditions": {
            "IsProd": {"Fn::Equals": [{"Ref": "Env"}, "prod"]}
        },
        "Resources": {
            "Bucket": {
                "Type": "AWS::S3::Bucket",
                "Condition": "IsProd",
                "DeletionPolicy": "Retain",
                "Properties": {"BucketName": {"Fn::Sub": "${Env}-logs"}}
            },
            "Queue": {"Type": "AWS::SQS::Queue", "DependsOn": "Bucket"}
        },
        "Outputs": {
            "BucketArn": {
                "Value": {"Fn::GetAtt": ["Bucket", "Arn"]},
                "Export": {"Name": "logs-bucket"}
            }
        }
    }"#;

    #[test]
    fn parse_json_template() {
        let template = Template::parse(JSON_TEMPLATE).unwrap();
        assert_eq!(template.parameters.len(), 3);
        assert_eq!(
            template.parameters["Subnets"].parameter_type,
            ParameterType::AwsSpecificList("AWS::EC2::Subnet::Id".into())
        );
        assert_eq!(template.parameters["Port"].min_value, Some(1.0));
        let bucket = &template.resources["Bucket"];
        assert_eq!(bucket.condition.as_deref(), Some("IsProd"));
        assert_eq!(bucket.deletion_policy.as_deref(), Some("Retain"));
        assert!(matches!(bucket.properties["BucketName"], Expr::Sub { .. }));
        assert_eq!(template.resources["Queue"].depends_on, vec!["Bucket"]);
        assert!(template.outputs["BucketArn"].export_name.is_some());
    }

    #[test]
    fn parse_yaml_short_form_tags() {
        let yaml = r#"
Parameters:
  Env:
    Type: String
Resources:
  Topic:
    Type: AWS::SNS::Topic
    Properties:
      TopicName: !Sub "${Env}-alerts"
      DisplayName: !Join ["-", [!Ref Env, alerts]]
  Queue:
    Type: AWS::SQS::Queue
    Properties:
      RedrivePolicy:
        deadLetterTargetArn: !GetAtt Topic.TopicArn
"#;
        let template = Template::parse(yaml).unwrap();
        let topic = &template.resources["Topic"];
        assert!(matches!(topic.properties["TopicName"], Expr::Sub { .. }));
        assert!(matches!(topic.properties["DisplayName"], Expr::Join { .. }));
        let Expr::Map(policy) = &template.resources["Queue"].properties["RedrivePolicy"] else {
            panic!("expected map");
        };
        assert_eq!(
            policy["deadLetterTargetArn"],
            Expr::GetAtt {
                logical_id: "Topic".into(),
                attribute: "TopicArn".into()
            }
        );
    }

    #[test]
    fn brace_leading_yaml_falls_back_from_json() {
        let template = Template::parse("{Resources: {Queue: {Type: AWS::SQS::Queue}}}").unwrap();
        assert_eq!(template.resources["Queue"].resource_type, "AWS::SQS::Queue");

        let flow = "{Resources: {Topic: {Type: AWS::SNS::Topic, Properties: {TopicName: !Ref Name}}}}";
        let template = Template::parse(flow).unwrap();
        assert!(matches!(template.resources["Topic"].properties["TopicName"], Expr::Ref(_)));

        let error = Template::parse("{ \"Resources\": ").unwrap_err();
        assert!(matches!(error, TemplateError::Json(_)));
    }

    #[test]
    fn yaml_condition_tag_inside_and() {
        let yaml = r#"
Parameters:
  Env: {Type: String}
Conditions:
  IsProd: !Equals [!Ref Env, prod]
  IsProdEast: !And [!Condition IsProd, !Equals [!Ref "AWS::Region", us-east-1]]
Resources:
  Topic: {Type: AWS::SNS::Topic}
"#;
        let template = Template::parse(yaml).unwrap();
        let Expr::And(parts) = &template.conditions["IsProdEast"] else {
            panic!("expected Fn::And");
        };
        assert_eq!(parts[0], Expr::Condition("IsProd".into()));
    }

    #[test]
    fn duplicate_logical_id_is_rejected() {
        let json = r#"{
            "Parameters": {"Name": {"Type": "String"}},
            "Resources": {"Name": {"Type": "AWS::SNS::Topic"}}
        }"#;
        assert!(matches!(
            Template::parse(json),
            Err(TemplateError::DuplicateLogicalId(id)) if id == "Name"
        ));
    }

    #[test]
    fn malformed_intrinsic_is_a_template_error() {
        let json = r#"{"Resources": {"Topic": {"Type": "AWS::SNS::Topic",
            "Properties": {"TopicName": {"Fn::Select": [0]}}}}}"#;
        let err = Template::parse(json).unwrap_err();
        assert!(err.to_string().contains("Resources.Topic.Properties.TopicName"));
    }

    #[test]
    fn missing_resources_section_is_rejected() {
        assert!(Template::parse(r#"{"Parameters": {}}"#).is_err());
        assert!(Template::parse("not: [valid").is_err());
    }

    #[test]
    fn parameter_type_parsing() {
        assert_eq!(ParameterType::parse("Number"), ParameterType::Number);
        assert!(ParameterType::parse("List<Number>").is_list());
        assert!(ParameterType::parse("CommaDelimitedList").is_list());
        assert!(!ParameterType::parse("AWS::EC2::VPC::Id").is_list());
        assert_eq!(
            ParameterType::parse("List<AWS::EC2::Subnet::Id>").to_string(),
            "List<AWS::EC2::Subnet::Id>"
        );
    }
}
