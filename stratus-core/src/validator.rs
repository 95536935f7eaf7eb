//! Validator - Check resolved resource properties against their schemas
//!
//! Every check is independent: a type mismatch on one property never hides a
//! missing required property or a pattern mismatch on another.

use std::collections::{BTreeMap, BTreeSet};

use log::trace;

use crate::engine::{Engine, Inputs};
use crate::finding::{ErrorKind, Finding, Section, Severity, ValidationResult};
use crate::path::PropertyPath;
use crate::schema::{
    ObjectSchema, PrimitiveType, PropertySpec, Requiredness, SchemaRegistry, Siblings, ValueKind,
};
use crate::template::{ResourceNode, Template};
use crate::value::{Shape, Unknown, UnknownSource, Value};

/// Values accepted by `DeletionPolicy` and `UpdateReplacePolicy`
pub const RESOURCE_POLICIES: &[&str] = &["Delete", "Retain", "Snapshot", "RetainExceptOnDelete"];

/// Validate a template with default inputs and configuration
pub fn validate(template: &Template, registry: &SchemaRegistry) -> ValidationResult {
    match Engine::new(registry).run(template, &Inputs::default()) {
        Ok(report) => report.result,
        Err(fatal) => fatal.into_result(),
    }
}

pub struct Validator<'r> {
    registry: &'r SchemaRegistry,
    unknown_property_severity: Severity,
}

struct Check<'a> {
    logical_id: &'a str,
    findings: Vec<Finding>,
}

impl Check<'_> {
    fn error(&mut self, path: &PropertyPath, kind: ErrorKind, message: impl Into<String>) {
        self.findings.push(Finding::error(
            Section::Resources,
            self.logical_id,
            path.clone(),
            kind,
            message,
        ));
    }
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            unknown_property_severity: Severity::Warning,
        }
    }

    pub fn with_unknown_property_severity(mut self, severity: Severity) -> Self {
        self.unknown_property_severity = severity;
        self
    }

    /// Check the resolved properties of one resource
    ///
    /// `unresolved` names properties that failed to resolve; they count as
    /// present for requiredness and are not checked otherwise.
    pub fn validate_resource(
        &self,
        logical_id: &str,
        resource_type: &str,
        properties: &BTreeMap<String, Value>,
        unresolved: &BTreeSet<String>,
    ) -> Vec<Finding> {
        let mut check = Check {
            logical_id,
            findings: Vec::new(),
        };

        let schema = match self.registry.lookup(resource_type) {
            Ok(schema) => schema,
            Err(e) => {
                check.error(&PropertyPath::root(), ErrorKind::UnknownResourceType, e.to_string());
                return check.findings;
            }
        };
        trace!("Validating {} ({})", logical_id, resource_type);

        let siblings = Siblings::new(properties).with_unresolved(unresolved);
        self.check_properties(&schema.properties, properties, siblings, &PropertyPath::root(), &mut check);
        check.findings
    }

    /// Check `DeletionPolicy` and `UpdateReplacePolicy`
    pub fn validate_policies(&self, resource: &ResourceNode) -> Vec<Finding> {
        let policies = [
            ("DeletionPolicy", &resource.deletion_policy),
            ("UpdateReplacePolicy", &resource.update_replace_policy),
        ];
        policies
            .into_iter()
            .filter_map(|(attribute, policy)| {
                let policy = policy.as_deref()?;
                (!RESOURCE_POLICIES.contains(&policy)).then(|| {
                    Finding::error(
                        Section::Resources,
                        &resource.logical_id,
                        PropertyPath::property(attribute),
                        ErrorKind::InvalidEnumValue,
                        format!(
                            "'{}' is not one of: {}",
                            policy,
                            RESOURCE_POLICIES.join(", ")
                        ),
                    )
                })
            })
            .collect()
    }

    fn check_properties(
        &self,
        specs: &BTreeMap<String, PropertySpec>,
        values: &BTreeMap<String, Value>,
        siblings: Siblings<'_>,
        base: &PropertyPath,
        check: &mut Check<'_>,
    ) {
        for (name, spec) in specs {
            if !siblings.is_present(name) && spec.requiredness.is_required(&siblings) {
                let message = match &spec.requiredness {
                    Requiredness::Conditional(rule) => {
                        format!("Property '{}' is {}", name, rule.description)
                    }
                    _ => format!("Required property '{}' is missing", name),
                };
                check.error(&base.key(name), ErrorKind::RequiredPropertyMissing, message);
            }
        }

        for (name, value) in values {
            let path = base.key(name);
            match specs.get(name) {
                Some(spec) => self.check_property(spec, value, &path, check),
                None => check.findings.push(Finding {
                    severity: self.unknown_property_severity,
                    ..Finding::error(
                        Section::Resources,
                        check.logical_id,
                        path,
                        ErrorKind::UnknownProperty,
                        format!("Unknown property '{}'", name),
                    )
                }),
            }
        }
    }

    fn check_property(&self, spec: &PropertySpec, value: &Value, path: &PropertyPath, check: &mut Check<'_>) {
        if self.check_kind(&spec.kind, value, path, check) {
            check_constraints(spec, value, path, check);
        }
    }

    /// Returns whether the value has the declared kind at this level
    fn check_kind(&self, kind: &ValueKind, value: &Value, path: &PropertyPath, check: &mut Check<'_>) -> bool {
        if let Value::Unknown(u) = value {
            let ok = unknown_fits(kind, u);
            if !ok {
                check.error(
                    path,
                    ErrorKind::TypeMismatch,
                    format!("expected {}, got a value only known at deploy time ({})", kind, u),
                );
            }
            return ok;
        }

        match (kind, value) {
            (ValueKind::Primitive(p), v) if p.accepts(v) => true,
            (ValueKind::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    self.check_kind(inner, item, &path.index(i), check);
                }
                true
            }
            (ValueKind::Map(inner), Value::Map(entries)) => {
                for (k, v) in entries {
                    self.check_kind(inner, v, &path.key(k), check);
                }
                true
            }
            (ValueKind::Object(name), Value::Map(entries)) => {
                if let Some(object) = self.registry.object(name) {
                    self.check_object(object, entries, path, check);
                }
                true
            }
            _ => {
                check.error(
                    path,
                    ErrorKind::TypeMismatch,
                    format!("expected {}, got {}", kind, value.type_name()),
                );
                false
            }
        }
    }

    fn check_object(
        &self,
        object: &ObjectSchema,
        entries: &BTreeMap<String, Value>,
        path: &PropertyPath,
        check: &mut Check<'_>,
    ) {
        self.check_properties(&object.properties, entries, Siblings::new(entries), path, check);
    }
}

/// Unknown values are only checked for shape
fn unknown_fits(kind: &ValueKind, unknown: &Unknown) -> bool {
    let opaque = unknown
        .sources
        .iter()
        .all(|s| matches!(s, UnknownSource::Function(_)));
    if opaque {
        return true;
    }
    match kind {
        ValueKind::Primitive(PrimitiveType::Json) => true,
        ValueKind::Primitive(_) => unknown.shape == Shape::Scalar,
        ValueKind::List(_) => unknown.shape == Shape::List,
        ValueKind::Map(_) | ValueKind::Object(_) => false,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn check_bounds(
    (min, max): (Option<f64>, Option<f64>),
    measure: f64,
    what: &str,
    path: &PropertyPath,
    check: &mut Check<'_>,
) {
    if let Some(min) = min
        && measure < min
    {
        check.error(
            path,
            ErrorKind::BoundsViolation,
            format!("{} {} is below the minimum of {}", what, measure, min),
        );
    }
    if let Some(max) = max
        && measure > max
    {
        check.error(
            path,
            ErrorKind::BoundsViolation,
            format!("{} {} exceeds the maximum of {}", what, measure, max),
        );
    }
}

fn check_scalar(spec: &PropertySpec, value: &Value, path: &PropertyPath, check: &mut Check<'_>) {
    let Some(text) = value.scalar_string() else {
        return;
    };
    if let Some(allowed) = &spec.allowed_values
        && !allowed.iter().any(|a| *a == text)
    {
        check.error(
            path,
            ErrorKind::InvalidEnumValue,
            format!("'{}' is not one of: {}", text, allowed.join(", ")),
        );
    }
    if let Some(pattern) = &spec.pattern
        && !pattern.is_match(&text)
    {
        check.error(
            path,
            ErrorKind::PatternMismatch,
            format!("'{}' does not match pattern '{}'", text, pattern.as_str()),
        );
    }
}

fn check_constraints(spec: &PropertySpec, value: &Value, path: &PropertyPath, check: &mut Check<'_>) {
    match value {
        Value::Unknown(_) => {}
        Value::List(items) => {
            check_bounds((spec.min, spec.max), items.len() as f64, "item count", path, check);
            let item_kind = match &spec.kind {
                ValueKind::List(inner) => inner.as_ref(),
                other => other,
            };
            for (i, item) in items.iter().enumerate() {
                if item.is_scalar() {
                    let path = path.index(i);
                    check_scalar(spec, item, &path, check);
                    check_measure(item_kind, (spec.item_min, spec.item_max), item, &path, check);
                }
            }
        }
        Value::Map(entries) => {
            if !matches!(spec.kind, ValueKind::Object(_)) {
                check_bounds((spec.min, spec.max), entries.len() as f64, "entry count", path, check);
            }
        }
        scalar => {
            check_scalar(spec, scalar, path, check);
            check_measure(&spec.kind, (spec.min, spec.max), scalar, path, check);
        }
    }
}

/// Bound a scalar by its numeric value or, for non-numeric kinds, its length
fn check_measure(
    kind: &ValueKind,
    bounds: (Option<f64>, Option<f64>),
    scalar: &Value,
    path: &PropertyPath,
    check: &mut Check<'_>,
) {
    if matches!(kind, ValueKind::Primitive(p) if p.is_numeric()) {
        if let Some(n) = numeric(scalar) {
            check_bounds(bounds, n, "value", path, check);
        }
    } else if let Some(text) = scalar.scalar_string() {
        check_bounds(bounds, text.chars().count() as f64, "length", path, check);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ConditionalRequirement, ResourceTypeSchema};
    use regex::Regex;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with_object(
                ObjectSchema::new("Tag")
                    .property(
                        PropertySpec::new("Key", ValueKind::string())
                            .required()
                            .with_bounds(Some(1.0), Some(128.0)),
                    )
                    .property(PropertySpec::new("Value", ValueKind::string()).required()),
            )
            .with_resource(
                ResourceTypeSchema::new("Test::Thing")
                    .property(PropertySpec::new("Name", ValueKind::string()).required())
                    .property(
                        PropertySpec::new("Cidr", ValueKind::string()).conditional(
                            ConditionalRequirement::unless_present(&["PoolId"]),
                        ),
                    )
                    .property(PropertySpec::new("PoolId", ValueKind::string()))
                    .property(
                        PropertySpec::new("Size", ValueKind::Primitive(PrimitiveType::Integer))
                            .with_bounds(Some(1.0), Some(10.0)),
                    )
                    .property(
                        PropertySpec::new("Mode", ValueKind::string())
                            .with_allowed_values(&["fast", "slow"]),
                    )
                    .property(
                        PropertySpec::new("Label", ValueKind::string())
                            .with_pattern(Regex::new("^[a-z-]+$").unwrap()),
                    )
                    .property(
                        PropertySpec::new("Zones", ValueKind::list(ValueKind::string()))
                            .with_bounds(None, Some(2.0))
                            .with_allowed_values(&["a", "b", "c"]),
                    )
                    .property(
                        PropertySpec::new(
                            "Ports",
                            ValueKind::list(ValueKind::Primitive(PrimitiveType::Integer)),
                        )
                        .with_bounds(None, Some(3.0))
                        .with_item_bounds(Some(1.0), Some(65535.0)),
                    )
                    .property(PropertySpec::new(
                        "Tags",
                        ValueKind::list(ValueKind::Object("Tag".into())),
                    ))
                    .property(PropertySpec::new(
                        "Enabled",
                        ValueKind::Primitive(PrimitiveType::Boolean),
                    )),
            )
    }

    fn props(json: serde_json::Value) -> BTreeMap<String, Value> {
        match Value::from_json(&json) {
            Value::Map(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn run(json: serde_json::Value) -> Vec<Finding> {
        let registry = registry();
        Validator::new(&registry).validate_resource("Thing", "Test::Thing", &props(json), &BTreeSet::new())
    }

    fn kinds(findings: &[Finding]) -> Vec<(ErrorKind, String)> {
        findings
            .iter()
            .map(|f| (f.kind, f.path.to_string()))
            .collect()
    }

    #[test]
    fn valid_resource_has_no_findings() {
        let findings = run(json!({
            "Name": "thing",
            "Cidr": "10.0.0.0/16",
            "Size": "5",
            "Mode": "fast",
            "Label": "my-label",
            "Zones": ["a", "b"],
            "Tags": [{"Key": "env", "Value": "prod"}],
            "Enabled": "true"
        }));
        assert!(findings.is_empty(), "{:?}", findings);
    }

    #[test]
    fn missing_required_property_reported_once() {
        let findings = run(json!({"Cidr": "10.0.0.0/16"}));
        assert_eq!(
            kinds(&findings),
            vec![(ErrorKind::RequiredPropertyMissing, "Name".to_string())]
        );
    }

    #[test]
    fn conditional_requiredness() {
        // Both present: fine
        assert!(run(json!({"Name": "n", "Cidr": "10.0.0.0/16", "PoolId": "p"})).is_empty());
        // Only the alternative: fine
        assert!(run(json!({"Name": "n", "PoolId": "p"})).is_empty());
        // Neither: exactly one finding
        let findings = run(json!({"Name": "n"}));
        assert_eq!(
            kinds(&findings),
            vec![(ErrorKind::RequiredPropertyMissing, "Cidr".to_string())]
        );
        assert!(findings[0].message.contains("unless PoolId"));
    }

    #[test]
    fn unresolved_sibling_counts_as_present() {
        let registry = registry();
        let unresolved = BTreeSet::from(["Name".to_string(), "PoolId".to_string()]);
        let findings =
            Validator::new(&registry).validate_resource("Thing", "Test::Thing", &BTreeMap::new(), &unresolved);
        assert!(findings.is_empty(), "{:?}", findings);
    }

    #[test]
    fn checks_are_independent() {
        let findings = run(json!({
            "Cidr": 12,
            "Size": 50,
            "Mode": "medium",
            "Label": "Has Spaces",
            "Enabled": "maybe"
        }));
        let kinds = kinds(&findings);
        assert!(kinds.contains(&(ErrorKind::RequiredPropertyMissing, "Name".into())));
        assert!(kinds.contains(&(ErrorKind::BoundsViolation, "Size".into())));
        assert!(kinds.contains(&(ErrorKind::InvalidEnumValue, "Mode".into())));
        assert!(kinds.contains(&(ErrorKind::PatternMismatch, "Label".into())));
        assert!(kinds.contains(&(ErrorKind::TypeMismatch, "Enabled".into())));
        // Numbers are accepted where strings are expected
        assert!(!kinds.iter().any(|(_, p)| p == "Cidr"));
    }

    #[test]
    fn list_bounds_and_item_values() {
        let findings = run(json!({"Name": "n", "Cidr": "c", "Zones": ["a", "x", "b"]}));
        assert_eq!(
            kinds(&findings),
            vec![
                (ErrorKind::BoundsViolation, "Zones".to_string()),
                (ErrorKind::InvalidEnumValue, "Zones[1]".to_string()),
            ]
        );
    }

    #[test]
    fn list_count_and_item_bounds_are_separate() {
        let findings = run(json!({"Name": "n", "Cidr": "c", "Ports": [80, 0, 70000]}));
        assert_eq!(
            kinds(&findings),
            vec![
                (ErrorKind::BoundsViolation, "Ports[1]".to_string()),
                (ErrorKind::BoundsViolation, "Ports[2]".to_string()),
            ]
        );

        let findings = run(json!({"Name": "n", "Cidr": "c", "Ports": [22, 80, 443, 8080]}));
        assert_eq!(kinds(&findings), vec![(ErrorKind::BoundsViolation, "Ports".to_string())]);
    }

    #[test]
    fn nested_object_paths() {
        let findings = run(json!({
            "Name": "n", "Cidr": "c",
            "Tags": [{"Key": "ok", "Value": "v"}, {"Key": "", "Extra": 1}]
        }));
        let kinds = kinds(&findings);
        assert!(kinds.contains(&(ErrorKind::RequiredPropertyMissing, "Tags[1].Value".into())));
        assert!(kinds.contains(&(ErrorKind::BoundsViolation, "Tags[1].Key".into())));
        assert!(kinds.contains(&(ErrorKind::UnknownProperty, "Tags[1].Extra".into())));
    }

    #[test]
    fn unknown_values_are_checked_for_shape_only() {
        let registry = registry();
        let mut properties = props(json!({"Cidr": "c"}));
        properties.insert(
            "Name".into(),
            Value::Unknown(Unknown::scalar(UnknownSource::attribute("Other", "Name"))),
        );
        properties.insert(
            "Mode".into(),
            Value::Unknown(Unknown::scalar(UnknownSource::resource("Other"))),
        );
        properties.insert(
            "Zones".into(),
            Value::Unknown(Unknown::scalar(UnknownSource::resource("Other"))),
        );
        let findings =
            Validator::new(&registry).validate_resource("Thing", "Test::Thing", &properties, &BTreeSet::new());
        assert_eq!(
            kinds(&findings),
            vec![(ErrorKind::TypeMismatch, "Zones".to_string())]
        );
    }

    #[test]
    fn unknown_type_and_unknown_property() {
        let registry = registry();
        let findings = Validator::new(&registry).validate_resource(
            "X",
            "Test::Missing",
            &BTreeMap::new(),
            &BTreeSet::new(),
        );
        assert_eq!(findings[0].kind, ErrorKind::UnknownResourceType);

        let findings = run(json!({"Name": "n", "Cidr": "c", "Bogus": 1}));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].kind, ErrorKind::UnknownProperty);

        let strict = Validator::new(&registry).with_unknown_property_severity(Severity::Error);
        let findings =
            strict.validate_resource("Thing", "Test::Thing", &props(json!({"Name": "n", "Cidr": "c", "Bogus": 1})), &BTreeSet::new());
        assert_eq!(findings[0].severity, Severity::Error);
    }

    #[test]
    fn resource_policies() {
        let registry = registry();
        let mut resource = ResourceNode::new("Thing", "Test::Thing");
        resource.deletion_policy = Some("Retain".into());
        resource.update_replace_policy = Some("Keep".into());
        let findings = Validator::new(&registry).validate_policies(&resource);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].path.to_string(), "UpdateReplacePolicy");
        assert_eq!(findings[0].kind, ErrorKind::InvalidEnumValue);
    }
}
