//! Engine - Resolve and validate a whole template
//!
//! The pipeline binds parameters, evaluates conditions in dependency order,
//! orders resources topologically, resolves every property and validates the
//! result against the schema registry. Only a dependency cycle aborts a run;
//! every other problem becomes a [`Finding`].

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};
use regex::Regex;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::finding::{ErrorKind, Finding, Section, ValidationResult};
use crate::graph::{CycleError, DependencyGraph};
use crate::path::PropertyPath;
use crate::resolver::{
    Environment, NO_VALUE, ResourceBinding, evaluate_condition, resolve_property,
};
use crate::schema::SchemaRegistry;
use crate::template::{Output, Parameter, ParameterType, ResourceNode, Template};
use crate::validator::Validator;
use crate::value::{Shape, Unknown, UnknownSource, Value};

/// Stands in for `NoEcho` parameter values in reports and messages
pub const MASK: &str = "****";

/// Values supplied for one run
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    /// Parameter values as given on the command line
    pub parameters: BTreeMap<String, String>,
    /// Export table for `Fn::ImportValue`; without one imports stay unknown
    pub exports: Option<BTreeMap<String, Value>>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_exports(mut self, exports: BTreeMap<String, Value>) -> Self {
        self.exports = Some(exports);
        self
    }
}

/// Errors that stop a run
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FatalError {
    #[error("{section}: {source}")]
    CyclicDependency {
        section: Section,
        #[source]
        source: CycleError,
    },
}

impl FatalError {
    pub fn cycle(&self) -> &[String] {
        match self {
            FatalError::CyclicDependency { source, .. } => &source.cycle,
        }
    }

    /// The error as a single `CyclicDependency` finding
    pub fn into_result(self) -> ValidationResult {
        let mut result = ValidationResult::new();
        match self {
            FatalError::CyclicDependency { section, source } => {
                let logical_id = source.cycle.first().cloned().unwrap_or_default();
                result.push(Finding::error(
                    section,
                    logical_id,
                    PropertyPath::root(),
                    ErrorKind::CyclicDependency,
                    source.to_string(),
                ));
            }
        }
        result
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolvedResource {
    #[serde(skip)]
    pub logical_id: String,
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub properties: BTreeMap<String, Value>,
    /// Properties that failed to resolve
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub unresolved: BTreeSet<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolvedOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_name: Option<String>,
}

/// A template after resolution; resources excluded by conditions are absent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolvedTemplate {
    pub parameters: BTreeMap<String, Value>,
    pub conditions: BTreeMap<String, bool>,
    pub resolution_order: Vec<String>,
    pub resources: BTreeMap<String, ResolvedResource>,
    pub outputs: BTreeMap<String, ResolvedOutput>,
    pub exports: BTreeMap<String, Value>,
}

impl ResolvedTemplate {
    pub fn resource(&self, logical_id: &str) -> Option<&ResolvedResource> {
        self.resources.get(logical_id)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub result: ValidationResult,
    pub template: ResolvedTemplate,
}

pub struct Engine<'r> {
    registry: &'r SchemaRegistry,
    config: EngineConfig,
}

impl<'r> Engine<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run(&self, template: &Template, inputs: &Inputs) -> Result<Report, FatalError> {
        let mut result = ValidationResult::new();
        let mut resolved = ResolvedTemplate::default();
        let mut env = Environment::new(&self.config);
        env.set_mappings(template.mappings.clone());
        if let Some(exports) = &inputs.exports {
            env.set_exports(exports.clone());
        }

        debug!("Binding {} parameters", template.parameters.len());
        self.bind_parameters(template, inputs, &mut env, &mut resolved, &mut result);

        debug!("Evaluating {} conditions", template.conditions.len());
        self.evaluate_conditions(template, &mut env, &mut resolved, &mut result)?;

        let (graph, graph_findings) = DependencyGraph::from_template(template);
        result.extend(graph_findings);
        let order = graph
            .topological_order()
            .map_err(|source| FatalError::CyclicDependency {
                section: Section::Resources,
                source,
            })?;
        debug!("Resolving {} resources", order.len());

        let validator = Validator::new(self.registry)
            .with_unknown_property_severity(self.config.unknown_property_severity);
        for logical_id in &order {
            let Some(resource) = template.resources.get(logical_id) else {
                continue;
            };
            if let Some(resource) = self.resolve_resource(resource, &validator, &mut env, &mut result) {
                resolved.resolution_order.push(logical_id.clone());
                resolved.resources.insert(logical_id.clone(), resource);
            }
        }

        debug!("Resolving {} outputs", template.outputs.len());
        self.resolve_outputs(template, &env, &mut resolved, &mut result);

        debug!(
            "Finished with {} errors and {} warnings",
            result.errors().count(),
            result.warnings().count()
        );
        Ok(Report {
            result,
            template: resolved,
        })
    }

    fn bind_parameters(
        &self,
        template: &Template,
        inputs: &Inputs,
        env: &mut Environment,
        resolved: &mut ResolvedTemplate,
        result: &mut ValidationResult,
    ) {
        for (name, parameter) in &template.parameters {
            let supplied = inputs.parameters.get(name).map(|v| Value::string(v.as_str()));
            let value = match supplied.or_else(|| parameter.default.clone()) {
                Some(raw) => {
                    let value = normalize_parameter(parameter, raw);
                    for message in parameter_violations(parameter, &value) {
                        result.push(parameter_finding(name, message));
                    }
                    value
                }
                None => {
                    result.push(parameter_finding(
                        name,
                        format!("Parameter '{}' has no value and no default", name),
                    ));
                    let shape = if parameter.parameter_type.is_list() {
                        Shape::List
                    } else {
                        Shape::Scalar
                    };
                    Value::Unknown(Unknown::new(shape, UnknownSource::Parameter(name.clone())))
                }
            };
            env.set_parameter(name.clone(), value.clone());
            let shown = if parameter.no_echo && !value.contains_unknown() {
                Value::string(MASK)
            } else {
                value
            };
            resolved.parameters.insert(name.clone(), shown);
        }

        for name in inputs.parameters.keys() {
            if !template.parameters.contains_key(name) {
                result.push(Finding::warning(
                    Section::Parameters,
                    name,
                    PropertyPath::root(),
                    ErrorKind::ParameterConstraint,
                    format!("Value supplied for undeclared parameter '{}'", name),
                ));
            }
        }
    }

    fn evaluate_conditions(
        &self,
        template: &Template,
        env: &mut Environment,
        resolved: &mut ResolvedTemplate,
        result: &mut ValidationResult,
    ) -> Result<(), FatalError> {
        let order = DependencyGraph::for_conditions(template)
            .topological_order()
            .map_err(|source| FatalError::CyclicDependency {
                section: Section::Conditions,
                source,
            })?;

        for name in order {
            let Some(expr) = template.conditions.get(&name) else {
                continue;
            };
            let value = match evaluate_condition(expr, env) {
                Ok(value) => value,
                Err(e) => {
                    result.push(Finding::error(
                        Section::Conditions,
                        &name,
                        PropertyPath::root(),
                        e.kind(),
                        format!("{}; treating the condition as false", e),
                    ));
                    false
                }
            };
            trace!("Condition {} = {}", name, value);
            env.set_condition(name.clone(), value);
            resolved.conditions.insert(name, value);
        }
        Ok(())
    }

    fn resolve_resource(
        &self,
        resource: &ResourceNode,
        validator: &Validator<'_>,
        env: &mut Environment,
        result: &mut ValidationResult,
    ) -> Option<ResolvedResource> {
        let logical_id = resource.logical_id.as_str();

        if let Some(condition) = &resource.condition {
            match env.condition(condition) {
                Some(true) => {}
                Some(false) => {
                    trace!("Skipping {}: condition {} is false", logical_id, condition);
                    env.exclude_resource(logical_id);
                    return None;
                }
                None => {
                    result.push(Finding::error(
                        Section::Resources,
                        logical_id,
                        PropertyPath::property("Condition"),
                        ErrorKind::UnresolvedReference,
                        format!("Condition '{}' is not declared", condition),
                    ));
                    env.exclude_resource(logical_id);
                    return None;
                }
            }
        }
        trace!("Resolving {} ({})", logical_id, resource.resource_type);

        for target in &resource.depends_on {
            if env.is_excluded(target) {
                result.push(Finding::error(
                    Section::Resources,
                    logical_id,
                    PropertyPath::property("DependsOn"),
                    ErrorKind::UnresolvedReference,
                    format!("DependsOn target '{}' is not created because its condition is false", target),
                ));
            }
        }

        let mut properties = BTreeMap::new();
        let mut unresolved = BTreeSet::new();
        for (name, expr) in &resource.properties {
            match resolve_property(name, expr, env) {
                Ok(Some(value)) => {
                    for function in unsupported_functions(&value) {
                        result.push(Finding::warning(
                            Section::Resources,
                            logical_id,
                            PropertyPath::property(name),
                            ErrorKind::UnsupportedFunction,
                            format!("{} is not evaluated; the value is unknown until deployment", function),
                        ));
                    }
                    properties.insert(name.clone(), value);
                }
                Ok(None) => {}
                Err(e) => {
                    result.push(Finding::error(
                        Section::Resources,
                        logical_id,
                        e.path.clone(),
                        e.error.kind(),
                        e.error.to_string(),
                    ));
                    unresolved.insert(name.clone());
                }
            }
        }

        let binding = match self.registry.lookup(&resource.resource_type) {
            Ok(schema) => ResourceBinding::from_schema(schema),
            Err(_) => ResourceBinding::untyped(&resource.resource_type),
        };
        env.bind_resource(logical_id, binding);

        result.extend(validator.validate_resource(
            logical_id,
            &resource.resource_type,
            &properties,
            &unresolved,
        ));
        result.extend(validator.validate_policies(resource));

        Some(ResolvedResource {
            logical_id: logical_id.to_string(),
            resource_type: resource.resource_type.clone(),
            properties,
            unresolved,
            depends_on: resource.depends_on.clone(),
            condition: resource.condition.clone(),
        })
    }

    fn resolve_outputs(
        &self,
        template: &Template,
        env: &Environment,
        resolved: &mut ResolvedTemplate,
        result: &mut ValidationResult,
    ) {
        let mut export_owners: BTreeMap<String, String> = BTreeMap::new();

        for (name, output) in &template.outputs {
            if !output_enabled(output, env, result) {
                continue;
            }

            let value = match resolve_property("Value", &output.value, env) {
                Ok(value) => value,
                Err(e) => {
                    result.push(output_finding(name, e.path.clone(), e.error.kind(), e.error.to_string()));
                    None
                }
            };

            let export_name = output.export_name.as_ref().and_then(|expr| {
                match resolve_property("Export", expr, env) {
                    Ok(Some(Value::String(export))) => Some(export),
                    Ok(other) => {
                        let got = other.as_ref().map_or(NO_VALUE, Value::type_name);
                        result.push(output_finding(
                            name,
                            PropertyPath::property("Export").key("Name"),
                            ErrorKind::TypeMismatch,
                            format!("Export name must be a string known before deployment, got {}", got),
                        ));
                        None
                    }
                    Err(e) => {
                        result.push(output_finding(name, e.path.clone(), e.error.kind(), e.error.to_string()));
                        None
                    }
                }
            });

            if let Some(export) = &export_name {
                if let Some(owner) = export_owners.get(export) {
                    result.push(output_finding(
                        name,
                        PropertyPath::property("Export").key("Name"),
                        ErrorKind::TypeMismatch,
                        format!("Export name '{}' is already used by output '{}'", export, owner),
                    ));
                } else {
                    export_owners.insert(export.clone(), name.clone());
                    if let Some(value) = &value {
                        resolved.exports.insert(export.clone(), value.clone());
                    }
                }
            }

            resolved.outputs.insert(
                name.clone(),
                ResolvedOutput {
                    value,
                    description: output.description.clone(),
                    export_name,
                },
            );
        }
    }
}

fn parameter_finding(name: &str, message: String) -> Finding {
    Finding::error(
        Section::Parameters,
        name,
        PropertyPath::root(),
        ErrorKind::ParameterConstraint,
        message,
    )
}

fn output_finding(name: &str, path: PropertyPath, kind: ErrorKind, message: String) -> Finding {
    Finding::error(Section::Outputs, name, path, kind, message)
}

fn output_enabled(output: &Output, env: &Environment, result: &mut ValidationResult) -> bool {
    let Some(condition) = &output.condition else {
        return true;
    };
    match env.condition(condition) {
        Some(enabled) => enabled,
        None => {
            result.push(output_finding(
                &output.name,
                PropertyPath::property("Condition"),
                ErrorKind::UnresolvedReference,
                format!("Condition '{}' is not declared", condition),
            ));
            false
        }
    }
}

/// Functions recorded as unknown sources because they are not evaluated
fn unsupported_functions(value: &Value) -> BTreeSet<String> {
    let mut sources = BTreeSet::new();
    value.collect_unknown_sources(&mut sources);
    sources
        .into_iter()
        .filter_map(|s| match s {
            UnknownSource::Function(name) => Some(name),
            _ => None,
        })
        .collect()
}

/// Parameter values are strings at deploy time, whether supplied or defaulted;
/// list-typed parameters are comma separated
fn normalize_parameter(parameter: &Parameter, raw: Value) -> Value {
    if !parameter.parameter_type.is_list() {
        return stringify(raw);
    }
    match raw {
        Value::String(s) if s.is_empty() => Value::List(Vec::new()),
        Value::String(s) => Value::List(s.split(',').map(Value::string).collect()),
        Value::List(items) => Value::List(items.into_iter().map(stringify).collect()),
        other => Value::List(vec![stringify(other)]),
    }
}

fn stringify(value: Value) -> Value {
    match value.scalar_string() {
        Some(s) => Value::String(s),
        None => value,
    }
}

fn parameter_violations(parameter: &Parameter, value: &Value) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Value::List(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut out = Vec::new();
    let shown = |text: &str| {
        if parameter.no_echo {
            MASK.to_string()
        } else {
            text.to_string()
        }
    };

    let pattern = match &parameter.allowed_pattern {
        Some(pattern) => match Regex::new(&format!("^(?:{})$", pattern)) {
            Ok(regex) => Some(regex),
            Err(e) => {
                out.push(format!("AllowedPattern '{}' is not a valid pattern: {}", pattern, e));
                None
            }
        },
        None => None,
    };

    for item in items {
        let Some(text) = item.scalar_string() else {
            out.push(format!(
                "Parameter '{}' expects scalar values, got {}",
                parameter.name,
                item.type_name()
            ));
            continue;
        };

        if parameter.parameter_type.is_numeric() {
            match text.trim().parse::<f64>() {
                Ok(n) => {
                    if let Some(min) = parameter.min_value
                        && n < min
                    {
                        out.push(format!("{} is below MinValue {}", shown(&n.to_string()), min));
                    }
                    if let Some(max) = parameter.max_value
                        && n > max
                    {
                        out.push(format!("{} exceeds MaxValue {}", shown(&n.to_string()), max));
                    }
                }
                Err(_) => out.push(format!(
                    "'{}' is not a number (parameter type {})",
                    shown(&text),
                    parameter.parameter_type
                )),
            }
        }

        if let Some(allowed) = &parameter.allowed_values
            && !allowed.contains(&text)
        {
            out.push(format!(
                "'{}' is not one of AllowedValues: {}",
                shown(&text),
                allowed.join(", ")
            ));
        }

        if let Some(regex) = &pattern
            && !regex.is_match(&text)
        {
            out.push(format!(
                "'{}' does not match AllowedPattern '{}'",
                shown(&text),
                parameter.allowed_pattern.as_deref().unwrap_or_default()
            ));
        }

        let length = text.chars().count() as u64;
        if matches!(parameter.parameter_type, ParameterType::String | ParameterType::CommaDelimitedList) {
            if let Some(min) = parameter.min_length
                && length < min
            {
                out.push(format!("length {} is below MinLength {}", length, min));
            }
            if let Some(max) = parameter.max_length
                && length > max
            {
                out.push(format!("length {} exceeds MaxLength {}", length, max));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsic::Expr;
    use crate::schema::{PropertySpec, ResourceTypeSchema, ValueKind};
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with_resource(
                ResourceTypeSchema::new("AWS::SNS::Topic")
                    .property(PropertySpec::new("TopicName", ValueKind::string()))
                    .attribute("TopicName", ValueKind::string()),
            )
            .with_resource(
                ResourceTypeSchema::new("AWS::SQS::Queue")
                    .property(PropertySpec::new("QueueName", ValueKind::string()))
                    .property(PropertySpec::new("Policy", ValueKind::string()))
                    .attribute("Arn", ValueKind::string()),
            )
    }

    fn template(json: serde_json::Value) -> Template {
        Template::from_json(json).unwrap()
    }

    #[test]
    fn parameters_defaults_and_lists() {
        let t = template(json!({
            "Parameters": {
                "Env": {"Type": "String", "Default": "dev", "AllowedValues": ["dev", "prod"]},
                "Subnets": {"Type": "CommaDelimitedList", "Default": "a,b"},
                "Required": {"Type": "String"}
            },
            "Resources": {"Topic": {"Type": "AWS::SNS::Topic"}}
        }));
        let registry = registry();
        let report = Engine::new(&registry)
            .run(&t, &Inputs::new().with_parameter("Env", "staging").with_parameter("Extra", "x"))
            .unwrap();

        let params = &report.template.parameters;
        assert_eq!(params["Env"], Value::from("staging"));
        assert_eq!(params["Subnets"], Value::from_json(&json!(["a", "b"])));
        assert!(matches!(params["Required"], Value::Unknown(_)));

        let constraint: Vec<&Finding> = report.result.of_kind(ErrorKind::ParameterConstraint).collect();
        assert_eq!(constraint.len(), 3);
        assert_eq!(report.result.errors().count(), 2);
        assert_eq!(report.result.warnings().next().map(|f| f.logical_id.as_str()), Some("Extra"));
    }

    #[test]
    fn number_parameter_constraints() {
        let parameter = Parameter::new("Port", ParameterType::Number).with_value_range(Some(1.0), Some(1024.0));
        assert!(parameter_violations(&parameter, &Value::from("80")).is_empty());
        assert_eq!(parameter_violations(&parameter, &Value::from("8080")).len(), 1);
        assert_eq!(parameter_violations(&parameter, &Value::from("eighty")).len(), 1);

        let pattern = Parameter::new("Name", ParameterType::String)
            .with_allowed_pattern("[a-z]+")
            .with_length(Some(2), Some(4));
        assert!(parameter_violations(&pattern, &Value::from("abc")).is_empty());
        // Patterns must match the whole value
        assert_eq!(parameter_violations(&pattern, &Value::from("abc1")).len(), 1);
        assert_eq!(parameter_violations(&pattern, &Value::from("abcdef")).len(), 1);
    }

    #[test]
    fn defaults_and_supplied_values_bind_alike() {
        let t = template(json!({
            "Parameters": {
                "Retries": {"Type": "Number", "Default": 5},
                "Timeout": {"Type": "Number"},
                "Ports": {"Type": "List<Number>", "Default": [80, 443]},
                "Verbose": {"Type": "String", "Default": true}
            },
            "Resources": {"Topic": {"Type": "AWS::SNS::Topic"}}
        }));
        let registry = registry();
        let report = Engine::new(&registry)
            .run(&t, &Inputs::new().with_parameter("Timeout", "5"))
            .unwrap();

        let params = &report.template.parameters;
        assert_eq!(params["Retries"], Value::from("5"));
        assert_eq!(params["Retries"], params["Timeout"]);
        assert_eq!(params["Ports"], Value::from_json(&json!(["80", "443"])));
        assert_eq!(params["Verbose"], Value::from("true"));
        assert!(!report.result.has_errors());
    }

    #[test]
    fn no_echo_values_are_masked_in_messages() {
        let parameter = Parameter::new("Secret", ParameterType::String).with_length(Some(12), None);
        let mut secret = parameter.clone();
        secret.no_echo = true;

        let plain = parameter_violations(&parameter, &Value::from("hunter2"));
        assert!(plain[0].contains("hunter2"));
        let masked = parameter_violations(&secret, &Value::from("hunter2"));
        assert_eq!(masked.len(), 1);
        assert!(!masked[0].contains("hunter2"));

        let mut port = Parameter::new("Port", ParameterType::Number).with_value_range(None, Some(10.0));
        port.no_echo = true;
        let masked = parameter_violations(&port, &Value::from("8080"));
        assert_eq!(masked, vec![format!("{} exceeds MaxValue 10", MASK)]);
    }

    #[test]
    fn conditions_exclude_resources() {
        let t = template(json!({
            "Parameters": {"Env": {"Type": "String", "Default": "dev"}},
            "Conditions": {
                "IsProd": {"Fn::Equals": [{"Ref": "Env"}, "prod"]},
                "IsDev": {"Fn::Not": [{"Condition": "IsProd"}]}
            },
            "Resources": {
                "ProdTopic": {"Type": "AWS::SNS::Topic", "Condition": "IsProd"},
                "DevTopic": {"Type": "AWS::SNS::Topic", "Condition": "IsDev"},
                "Queue": {"Type": "AWS::SQS::Queue", "Properties": {
                    "QueueName": {"Fn::If": ["IsProd", {"Ref": "ProdTopic"}, "dev-queue"]}
                }}
            }
        }));
        let registry = registry();
        let report = Engine::new(&registry).run(&t, &Inputs::new()).unwrap();
        assert!(!report.result.has_errors(), "{:?}", report.result);
        assert!(report.template.conditions["IsDev"]);
        assert!(report.template.resource("ProdTopic").is_none());
        assert!(report.template.resource("DevTopic").is_some());
        assert_eq!(
            report.template.resources["Queue"].properties["QueueName"],
            Value::from("dev-queue")
        );
    }

    #[test]
    fn condition_cycle_is_fatal() {
        let t = template(json!({
            "Conditions": {
                "A": {"Fn::Not": [{"Condition": "B"}]},
                "B": {"Fn::Not": [{"Condition": "A"}]}
            },
            "Resources": {"Topic": {"Type": "AWS::SNS::Topic"}}
        }));
        let registry = registry();
        let err = Engine::new(&registry).run(&t, &Inputs::new()).unwrap_err();
        assert_eq!(err.cycle(), ["A".to_string(), "B".to_string()]);
        let result = err.into_result();
        assert_eq!(result.findings()[0].section, Section::Conditions);
        assert_eq!(result.findings()[0].kind, ErrorKind::CyclicDependency);
    }

    #[test]
    fn resource_cycle_is_fatal() {
        let t = template(json!({"Resources": {
            "A": {"Type": "AWS::SQS::Queue", "Properties": {"QueueName": {"Ref": "B"}}},
            "B": {"Type": "AWS::SQS::Queue", "Properties": {"QueueName": {"Fn::GetAtt": ["A", "Arn"]}}}
        }}));
        let registry = registry();
        let err = Engine::new(&registry).run(&t, &Inputs::new()).unwrap_err();
        assert_eq!(err.cycle(), ["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn unresolved_property_is_reported_and_skipped() {
        let t = template(json!({"Resources": {
            "Queue": {"Type": "AWS::SQS::Queue", "DependsOn": "Ghost", "Properties": {
                "QueueName": {"Ref": "Missing"},
                "Policy": {"Fn::Cidr": ["10.0.0.0/16", 2, 8]}
            }}
        }}));
        let registry = registry();
        let report = Engine::new(&registry).run(&t, &Inputs::new()).unwrap();
        let queue = &report.template.resources["Queue"];
        assert!(queue.unresolved.contains("QueueName"));
        assert!(!queue.properties.contains_key("QueueName"));

        let kinds: Vec<(ErrorKind, String)> = report
            .result
            .findings()
            .iter()
            .map(|f| (f.kind, f.path.to_string()))
            .collect();
        assert!(kinds.contains(&(ErrorKind::UnresolvedReference, "DependsOn".into())));
        assert!(kinds.contains(&(ErrorKind::UnresolvedReference, "QueueName".into())));
        assert!(kinds.contains(&(ErrorKind::UnsupportedFunction, "Policy".into())));
    }

    #[test]
    fn outputs_and_exports() {
        let t = template(json!({
            "Resources": {"Queue": {"Type": "AWS::SQS::Queue"}},
            "Outputs": {
                "QueueArn": {
                    "Value": {"Fn::GetAtt": ["Queue", "Arn"]},
                    "Export": {"Name": {"Fn::Sub": "${AWS::StackName}-queue"}}
                },
                "Again": {"Value": "x", "Export": {"Name": "stratus-stack-queue"}},
                "Bad": {"Value": "y", "Export": {"Name": {"Ref": "Queue"}}}
            }
        }));
        let registry = registry();
        let report = Engine::new(&registry).run(&t, &Inputs::new()).unwrap();
        assert_eq!(
            report.template.outputs["QueueArn"].export_name.as_deref(),
            Some("stratus-stack-queue")
        );
        assert!(report.template.exports.contains_key("stratus-stack-queue"));
        // Outputs are processed in name order, so "Again" claims the export first
        let errors: Vec<&str> = report.result.errors().map(|f| f.logical_id.as_str()).collect();
        assert_eq!(errors, vec!["Bad", "QueueArn"]);
    }

    #[test]
    fn resolved_template_serializes_unknowns_as_placeholders() {
        let t = Template::new()
            .with_resource(ResourceNode::new("Topic", "AWS::SNS::Topic"))
            .with_resource(
                ResourceNode::new("Queue", "AWS::SQS::Queue").with_property(
                    "QueueName",
                    Expr::GetAtt {
                        logical_id: "Topic".into(),
                        attribute: "TopicName".into(),
                    },
                ),
            );
        let registry = registry();
        let report = Engine::new(&registry).run(&t, &Inputs::new()).unwrap();
        let json = report.template.to_json();
        assert_eq!(
            json["Resources"]["Queue"]["Properties"]["QueueName"],
            json!("${Topic.TopicName}")
        );
        assert_eq!(json["ResolutionOrder"], json!(["Topic", "Queue"]));
    }
}
