//! Resolver - Evaluate intrinsic functions against an environment
//!
//! [`resolve`] turns an [`Expr`] tree into a [`Value`]. `Ok(None)` means the
//! expression evaluated to `AWS::NoValue`, so the enclosing property, list
//! element or map entry disappears. Values that only exist after deployment
//! become [`Value::Unknown`] placeholders.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::config::EngineConfig;
use crate::finding::ErrorKind;
use crate::intrinsic::{Expr, SubPart, split_placeholder};
use crate::path::PropertyPath;
use crate::schema::ResourceTypeSchema;
use crate::template::Mapping;
use crate::value::{Shape, Unknown, UnknownSource, Value};

pub const NO_VALUE: &str = "AWS::NoValue";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("{0}")]
    UnresolvedReference(String),

    #[error("{0}")]
    TypeMismatch(String),

    /// A condition operand is only known after deployment
    #[error("condition cannot be decided before deployment: {0}")]
    Indeterminate(String),
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::UnresolvedReference(_) | ResolveError::Indeterminate(_) => {
                ErrorKind::UnresolvedReference
            }
            ResolveError::TypeMismatch(_) => ErrorKind::TypeMismatch,
        }
    }
}

/// Resolution error with the property path where it occurred
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub struct PropertyError {
    pub path: PropertyPath,
    #[source]
    pub error: ResolveError,
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_root() {
            write!(f, "{}", self.error)
        } else {
            write!(f, "{}: {}", self.path, self.error)
        }
    }
}

/// What the environment knows about a created resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBinding {
    pub resource_type: String,
    /// Exposed attributes and their shapes; `None` when the type has no schema
    pub attributes: Option<BTreeMap<String, Shape>>,
}

impl ResourceBinding {
    pub fn from_schema(schema: &ResourceTypeSchema) -> Self {
        Self {
            resource_type: schema.type_name.clone(),
            attributes: Some(
                schema
                    .attributes
                    .values()
                    .map(|a| (a.name.clone(), a.kind.shape()))
                    .collect(),
            ),
        }
    }

    pub fn untyped(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: None,
        }
    }
}

/// Values visible to the resolver
#[derive(Debug, Clone, Default)]
pub struct Environment {
    parameters: BTreeMap<String, Value>,
    resources: BTreeMap<String, ResourceBinding>,
    excluded: BTreeSet<String>,
    mappings: BTreeMap<String, Mapping>,
    conditions: BTreeMap<String, bool>,
    exports: Option<BTreeMap<String, Value>>,
    region: String,
}

impl Environment {
    /// Environment holding the pseudo parameters of `config`
    pub fn new(config: &EngineConfig) -> Self {
        let mut env = Environment {
            region: config.region.clone(),
            ..Default::default()
        };
        let pseudo = [
            ("AWS::AccountId", Value::string(&config.account_id)),
            ("AWS::NotificationARNs", Value::List(Vec::new())),
            ("AWS::Partition", Value::string(config.partition())),
            ("AWS::Region", Value::string(&config.region)),
            ("AWS::StackId", Value::string(config.stack_id())),
            ("AWS::StackName", Value::string(&config.stack_name)),
            ("AWS::URLSuffix", Value::string(config.url_suffix())),
        ];
        for (name, value) in pseudo {
            env.parameters.insert(name.to_string(), value);
        }
        env
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.insert(name.into(), value);
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn set_mappings(&mut self, mappings: BTreeMap<String, Mapping>) {
        self.mappings = mappings;
    }

    pub fn set_condition(&mut self, name: impl Into<String>, value: bool) {
        self.conditions.insert(name.into(), value);
    }

    pub fn condition(&self, name: &str) -> Option<bool> {
        self.conditions.get(name).copied()
    }

    pub fn bind_resource(&mut self, logical_id: impl Into<String>, binding: ResourceBinding) {
        self.resources.insert(logical_id.into(), binding);
    }

    pub fn exclude_resource(&mut self, logical_id: impl Into<String>) {
        self.excluded.insert(logical_id.into());
    }

    pub fn is_excluded(&self, logical_id: &str) -> bool {
        self.excluded.contains(logical_id)
    }

    pub fn set_exports(&mut self, exports: BTreeMap<String, Value>) {
        self.exports = Some(exports);
    }
}

/// Resolve an expression
pub fn resolve(expr: &Expr, env: &Environment) -> Result<Option<Value>, ResolveError> {
    Resolver { env }
        .eval(expr, &PropertyPath::root())
        .map_err(|e| e.error)
}

/// Resolve a top-level property, reporting errors with their property path
pub fn resolve_property(
    name: &str,
    expr: &Expr,
    env: &Environment,
) -> Result<Option<Value>, PropertyError> {
    Resolver { env }.eval(expr, &PropertyPath::property(name))
}

/// Evaluate a condition expression to a boolean
pub fn evaluate_condition(expr: &Expr, env: &Environment) -> Result<bool, ResolveError> {
    Resolver { env }
        .condition(expr, &PropertyPath::root())
        .map_err(|e| e.error)
}

type Resolved = Result<Option<Value>, PropertyError>;

struct Resolver<'e> {
    env: &'e Environment,
}

fn fail(path: &PropertyPath, error: ResolveError) -> PropertyError {
    PropertyError {
        path: path.clone(),
        error,
    }
}

fn unresolved(path: &PropertyPath, message: impl Into<String>) -> PropertyError {
    fail(path, ResolveError::UnresolvedReference(message.into()))
}

fn mismatch(path: &PropertyPath, message: impl Into<String>) -> PropertyError {
    fail(path, ResolveError::TypeMismatch(message.into()))
}

fn unknown(shape: Shape, source: UnknownSource) -> Value {
    Value::Unknown(Unknown::new(shape, source))
}

impl Resolver<'_> {
    fn eval(&self, expr: &Expr, path: &PropertyPath) -> Resolved {
        match expr {
            Expr::Literal(value) => Ok(Some(value.clone())),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    if let Some(value) = self.eval(item, &path.index(i))? {
                        out.push(value);
                    }
                }
                Ok(Some(Value::List(out)))
            }
            Expr::Map(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    if let Some(value) = self.eval(v, &path.key(k))? {
                        out.insert(k.clone(), value);
                    }
                }
                Ok(Some(Value::Map(out)))
            }
            Expr::Ref(name) => self.reference(name, path),
            Expr::GetAtt {
                logical_id,
                attribute,
            } => self.get_att(logical_id, attribute, path).map(Some),
            Expr::Join { delimiter, items } => self.join(delimiter, items, path).map(Some),
            Expr::Sub { parts, bindings } => self.sub(parts, bindings, path).map(Some),
            Expr::If {
                condition,
                when_true,
                when_false,
            } => {
                if self.named_condition(condition, path)? {
                    self.eval(when_true, path)
                } else {
                    self.eval(when_false, path)
                }
            }
            Expr::FindInMap {
                map,
                top_key,
                second_key,
            } => self.find_in_map(map, top_key, second_key, path).map(Some),
            Expr::Select { index, list } => self.select(index, list, path).map(Some),
            Expr::Split { delimiter, source } => self.split(delimiter, source, path).map(Some),
            Expr::ImportValue(name) => self.import_value(name, path).map(Some),
            Expr::Base64(inner) => {
                let value = self.required(inner, path, "Fn::Base64 input")?;
                match value {
                    Value::Unknown(u) => Ok(Some(Value::Unknown(Unknown::merge(Shape::Scalar, [&u])))),
                    other => match other.scalar_string() {
                        Some(s) => Ok(Some(Value::String(STANDARD.encode(s)))),
                        None => Err(mismatch(
                            path,
                            format!("Fn::Base64 expects a string, got {}", other.type_name()),
                        )),
                    },
                }
            }
            Expr::GetAZs(region) => {
                let value = self.required(region, path, "Fn::GetAZs region")?;
                match value {
                    Value::Unknown(u) => Ok(Some(Value::Unknown(Unknown::merge(Shape::List, [&u])))),
                    Value::String(r) => {
                        let region = if r.is_empty() { self.env.region.as_str() } else { r.as_str() };
                        Ok(Some(Value::List(
                            EngineConfig::availability_zones(region)
                                .into_iter()
                                .map(Value::String)
                                .collect(),
                        )))
                    }
                    other => Err(mismatch(
                        path,
                        format!("Fn::GetAZs expects a region string, got {}", other.type_name()),
                    )),
                }
            }
            Expr::Equals(..) | Expr::And(_) | Expr::Or(_) | Expr::Not(_) | Expr::Condition(_) => {
                self.condition(expr, path).map(|b| Some(Value::Bool(b)))
            }
            Expr::Unsupported { function } => Ok(Some(unknown(
                Shape::Scalar,
                UnknownSource::Function(function.clone()),
            ))),
        }
    }

    /// Resolve an operand that must not be `AWS::NoValue`
    fn required(&self, expr: &Expr, path: &PropertyPath, what: &str) -> Result<Value, PropertyError> {
        self.eval(expr, path)?
            .ok_or_else(|| mismatch(path, format!("{} resolved to {}", what, NO_VALUE)))
    }

    fn reference(&self, name: &str, path: &PropertyPath) -> Resolved {
        if name == NO_VALUE {
            return Ok(None);
        }
        if let Some(value) = self.env.parameters.get(name) {
            return Ok(Some(value.clone()));
        }
        if self.env.resources.contains_key(name) {
            return Ok(Some(unknown(Shape::Scalar, UnknownSource::resource(name))));
        }
        if self.env.excluded.contains(name) {
            return Err(unresolved(
                path,
                format!("'{}' is not created because its condition is false", name),
            ));
        }
        Err(unresolved(
            path,
            format!("'{}' is not a parameter, pseudo parameter or resource", name),
        ))
    }

    fn get_att(&self, logical_id: &str, attribute: &str, path: &PropertyPath) -> Result<Value, PropertyError> {
        let Some(binding) = self.env.resources.get(logical_id) else {
            return Err(if self.env.excluded.contains(logical_id) {
                unresolved(
                    path,
                    format!("'{}' is not created because its condition is false", logical_id),
                )
            } else {
                unresolved(path, format!("Fn::GetAtt target '{}' is not a resource", logical_id))
            });
        };
        let shape = match &binding.attributes {
            None => Shape::Scalar,
            Some(attributes) => *attributes.get(attribute).ok_or_else(|| {
                unresolved(
                    path,
                    format!(
                        "{} '{}' has no attribute '{}'",
                        binding.resource_type, logical_id, attribute
                    ),
                )
            })?,
        };
        Ok(unknown(shape, UnknownSource::attribute(logical_id, attribute)))
    }

    fn join(&self, delimiter: &str, items: &Expr, path: &PropertyPath) -> Result<Value, PropertyError> {
        let list = match self.required(items, path, "Fn::Join list")? {
            Value::List(list) => list,
            Value::Unknown(u) if u.shape == Shape::List => {
                return Ok(Value::Unknown(Unknown::merge(Shape::Scalar, [&u])));
            }
            other => {
                return Err(mismatch(
                    path,
                    format!("Fn::Join expects a list, got {}", other.type_name()),
                ));
            }
        };

        let mut parts = Vec::with_capacity(list.len());
        let mut unknowns = Vec::new();
        for (i, item) in list.iter().enumerate() {
            match item {
                Value::Unknown(u) if u.shape == Shape::Scalar => unknowns.push(u),
                other => match other.scalar_string() {
                    Some(s) => parts.push(s),
                    None => {
                        return Err(mismatch(
                            &path.index(i),
                            format!("Fn::Join elements must be scalars, got {}", other.type_name()),
                        ));
                    }
                },
            }
        }
        if unknowns.is_empty() {
            Ok(Value::String(parts.join(delimiter)))
        } else {
            Ok(Value::Unknown(Unknown::merge(Shape::Scalar, unknowns)))
        }
    }

    fn sub(
        &self,
        parts: &[SubPart],
        bindings: &BTreeMap<String, Expr>,
        path: &PropertyPath,
    ) -> Result<Value, PropertyError> {
        let mut out = String::new();
        let mut unknowns = Vec::new();
        for part in parts {
            let var = match part {
                SubPart::Text(text) => {
                    out.push_str(text);
                    continue;
                }
                SubPart::Var(var) => var,
            };
            let value = if let Some(expr) = bindings.get(var) {
                self.required(expr, &path.key(var), "Fn::Sub variable")?
            } else if let Some(value) = self.env.parameters.get(var) {
                value.clone()
            } else {
                let reference = split_placeholder(var);
                let is_resource = self.env.resources.contains_key(&reference.target)
                    || self.env.excluded.contains(&reference.target);
                if !is_resource {
                    return Err(unresolved(
                        path,
                        format!("Fn::Sub placeholder '${{{}}}' does not name a parameter or resource", var),
                    ));
                }
                match &reference.attribute {
                    Some(attribute) => self.get_att(&reference.target, attribute, path)?,
                    None => self
                        .reference(&reference.target, path)?
                        .unwrap_or(Value::Null),
                }
            };
            match value {
                Value::Unknown(u) if u.shape == Shape::Scalar => unknowns.push(u),
                other => match other.scalar_string() {
                    Some(s) => out.push_str(&s),
                    None => {
                        return Err(mismatch(
                            path,
                            format!(
                                "Fn::Sub placeholder '${{{}}}' must be a scalar, got {}",
                                var,
                                other.type_name()
                            ),
                        ));
                    }
                },
            }
        }
        if unknowns.is_empty() {
            Ok(Value::String(out))
        } else {
            Ok(Value::Unknown(Unknown::merge(Shape::Scalar, &unknowns)))
        }
    }

    /// Resolve a scalar operand to a string key
    fn key(&self, expr: &Expr, path: &PropertyPath, what: &str) -> Result<Result<String, Unknown>, PropertyError> {
        match self.required(expr, path, what)? {
            Value::Unknown(u) => Ok(Err(u)),
            other => other.scalar_string().map(Ok).ok_or_else(|| {
                mismatch(path, format!("{} must be a scalar, got {}", what, other.type_name()))
            }),
        }
    }

    fn find_in_map(
        &self,
        map: &Expr,
        top_key: &Expr,
        second_key: &Expr,
        path: &PropertyPath,
    ) -> Result<Value, PropertyError> {
        let map_name = self.key(map, path, "Fn::FindInMap map name")?;
        let top = self.key(top_key, path, "Fn::FindInMap top-level key")?;
        let second = self.key(second_key, path, "Fn::FindInMap second-level key")?;
        let (map_name, top, second) = match (map_name, top, second) {
            (Ok(m), Ok(t), Ok(s)) => (m, t, s),
            (m, t, s) => {
                let unknowns: Vec<Unknown> = [m.err(), t.err(), s.err()].into_iter().flatten().collect();
                return Ok(Value::Unknown(Unknown::merge(Shape::Scalar, &unknowns)));
            }
        };

        let mapping = self
            .env
            .mappings
            .get(&map_name)
            .ok_or_else(|| unresolved(path, format!("mapping '{}' is not declared", map_name)))?;
        let entries = mapping.get(&top).ok_or_else(|| {
            unresolved(path, format!("mapping '{}' has no key '{}'", map_name, top))
        })?;
        entries.get(&second).cloned().ok_or_else(|| {
            unresolved(
                path,
                format!("mapping '{}' has no key '{}' under '{}'", map_name, second, top),
            )
        })
    }

    fn select(&self, index: &Expr, list: &Expr, path: &PropertyPath) -> Result<Value, PropertyError> {
        let index_value = self.required(index, path, "Fn::Select index")?;
        let list_value = self.required(list, path, "Fn::Select list")?;

        let index = match &index_value {
            Value::Int(n) => *n,
            Value::String(s) => s.trim().parse::<i64>().map_err(|_| {
                mismatch(path, format!("Fn::Select index '{}' is not an integer", s))
            })?,
            Value::Unknown(u) => return Ok(Value::Unknown(Unknown::merge(Shape::Scalar, [u]))),
            other => {
                return Err(mismatch(
                    path,
                    format!("Fn::Select index must be an integer, got {}", other.type_name()),
                ));
            }
        };

        match list_value {
            Value::List(items) => usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .ok_or_else(|| {
                    unresolved(
                        path,
                        format!("Fn::Select index {} is out of range for {} items", index, items.len()),
                    )
                }),
            Value::Unknown(u) if u.shape == Shape::List => {
                Ok(Value::Unknown(Unknown::merge(Shape::Scalar, [&u])))
            }
            other => Err(mismatch(
                path,
                format!("Fn::Select expects a list, got {}", other.type_name()),
            )),
        }
    }

    fn split(&self, delimiter: &str, source: &Expr, path: &PropertyPath) -> Result<Value, PropertyError> {
        if delimiter.is_empty() {
            return Err(mismatch(path, "Fn::Split delimiter must not be empty"));
        }
        match self.required(source, path, "Fn::Split source")? {
            Value::String(s) => Ok(Value::List(
                s.split(delimiter).map(Value::string).collect(),
            )),
            Value::Unknown(u) if u.shape == Shape::Scalar => {
                Ok(Value::Unknown(Unknown::merge(Shape::List, [&u])))
            }
            other => Err(mismatch(
                path,
                format!("Fn::Split expects a string, got {}", other.type_name()),
            )),
        }
    }

    fn import_value(&self, name: &Expr, path: &PropertyPath) -> Result<Value, PropertyError> {
        let name = match self.key(name, path, "Fn::ImportValue name")? {
            Ok(name) => name,
            Err(u) => return Ok(Value::Unknown(Unknown::merge(Shape::Scalar, [&u]))),
        };
        match &self.env.exports {
            None => Ok(unknown(Shape::Scalar, UnknownSource::Import(name))),
            Some(exports) => exports
                .get(&name)
                .cloned()
                .ok_or_else(|| unresolved(path, format!("no export named '{}'", name))),
        }
    }

    fn named_condition(&self, name: &str, path: &PropertyPath) -> Result<bool, PropertyError> {
        self.env
            .condition(name)
            .ok_or_else(|| unresolved(path, format!("condition '{}' is not declared", name)))
    }

    fn condition(&self, expr: &Expr, path: &PropertyPath) -> Result<bool, PropertyError> {
        match expr {
            Expr::Condition(name) => self.named_condition(name, path),
            Expr::Not(inner) => Ok(!self.condition(inner, path)?),
            Expr::And(items) => {
                let mut result = true;
                for item in items {
                    result &= self.condition(item, path)?;
                }
                Ok(result)
            }
            Expr::Or(items) => {
                let mut result = false;
                for item in items {
                    result |= self.condition(item, path)?;
                }
                Ok(result)
            }
            Expr::Equals(a, b) => {
                let left = self.eval(a, path)?.unwrap_or(Value::Null);
                let right = self.eval(b, path)?.unwrap_or(Value::Null);
                if left.contains_unknown() || right.contains_unknown() {
                    let operand = if left.contains_unknown() { &left } else { &right };
                    return Err(fail(
                        path,
                        ResolveError::Indeterminate(format!("Fn::Equals operand {}", operand)),
                    ));
                }
                Ok(match (left.scalar_string(), right.scalar_string()) {
                    (Some(l), Some(r)) => l == r,
                    _ => left == right,
                })
            }
            Expr::If {
                condition,
                when_true,
                when_false,
            } => {
                if self.named_condition(condition, path)? {
                    self.condition(when_true, path)
                } else {
                    self.condition(when_false, path)
                }
            }
            other => match self.eval(other, path)? {
                Some(Value::Bool(b)) => Ok(b),
                Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
                Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
                Some(Value::Unknown(u)) => Err(fail(
                    path,
                    ResolveError::Indeterminate(format!("operand {}", u)),
                )),
                Some(value) => Err(mismatch(
                    path,
                    format!("condition must be a boolean, got {}", value.type_name()),
                )),
                None => Err(mismatch(path, format!("condition resolved to {}", NO_VALUE))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(json: serde_json::Value) -> Expr {
        Expr::parse(&json).unwrap()
    }

    fn env() -> Environment {
        let mut env = Environment::new(&EngineConfig::default());
        env.set_parameter("Env", Value::from("prod"));
        env.set_parameter(
            "Subnets",
            Value::List(vec![Value::from("subnet-1"), Value::from("subnet-2")]),
        );
        env.set_condition("IsProd", true);
        env.set_condition("IsDev", false);
        env.bind_resource(
            "Bucket",
            ResourceBinding {
                resource_type: "AWS::S3::Bucket".into(),
                attributes: Some(BTreeMap::from([
                    ("Arn".to_string(), Shape::Scalar),
                    ("DomainName".to_string(), Shape::Scalar),
                ])),
            },
        );
        env.exclude_resource("DevQueue");
        env.set_mappings(BTreeMap::from([(
            "RegionMap".to_string(),
            BTreeMap::from([(
                "us-east-1".to_string(),
                BTreeMap::from([("Ami".to_string(), Value::from("ami-123"))]),
            )]),
        )]));
        env
    }

    fn resolved(json: serde_json::Value) -> Value {
        resolve(&parse(json), &env()).unwrap().unwrap()
    }

    fn error(json: serde_json::Value) -> ResolveError {
        resolve(&parse(json), &env()).unwrap_err()
    }

    #[test]
    fn literal_identity() {
        let doc = json!({"A": [1, "two", true, null, {"B": 2.5}]});
        let expr = parse(doc.clone());
        assert_eq!(resolve(&expr, &env()).unwrap(), Some(Value::from_json(&doc)));
    }

    #[test]
    fn join_scalars() {
        assert_eq!(resolved(json!({"Fn::Join": [",", ["a", "b", "c"]]})), Value::from("a,b,c"));
        assert_eq!(resolved(json!({"Fn::Join": [",", []]})), Value::from(""));
        assert_eq!(resolved(json!({"Fn::Join": ["-", ["port", 80, true]]})), Value::from("port-80-true"));
        assert_eq!(
            resolved(json!({"Fn::Join": [",", {"Ref": "Subnets"}]})),
            Value::from("subnet-1,subnet-2")
        );
    }

    #[test]
    fn join_rejects_nested_list() {
        let err = resolve_property(
            "Name",
            &parse(json!({"Fn::Join": [",", ["a", ["b"]]]})),
            &env(),
        )
        .unwrap_err();
        assert_eq!(err.error.kind(), ErrorKind::TypeMismatch);
        assert_eq!(err.path.to_string(), "Name[1]");
    }

    #[test]
    fn join_with_unknown_is_unknown() {
        let value = resolved(json!({"Fn::Join": [":", ["arn", {"Fn::GetAtt": ["Bucket", "Arn"]}]]}));
        let Value::Unknown(u) = value else {
            panic!("expected unknown");
        };
        assert!(u.sources.contains(&UnknownSource::attribute("Bucket", "Arn")));
    }

    #[test]
    fn ref_resolution() {
        assert_eq!(resolved(json!({"Ref": "Env"})), Value::from("prod"));
        assert_eq!(resolved(json!({"Ref": "AWS::Region"})), Value::from("us-east-1"));
        assert_eq!(
            resolved(json!({"Ref": "Bucket"})),
            Value::Unknown(Unknown::scalar(UnknownSource::resource("Bucket")))
        );
        assert!(matches!(error(json!({"Ref": "Nope"})), ResolveError::UnresolvedReference(_)));
        assert!(matches!(error(json!({"Ref": "DevQueue"})), ResolveError::UnresolvedReference(_)));
    }

    #[test]
    fn no_value_removes_entries() {
        let value = resolved(json!({
            "Keep": "x",
            "Drop": {"Ref": "AWS::NoValue"},
            "List": ["a", {"Fn::If": ["IsDev", "b", {"Ref": "AWS::NoValue"}]}]
        }));
        assert_eq!(
            value,
            Value::from_json(&json!({"Keep": "x", "List": ["a"]}))
        );
        assert_eq!(resolve(&parse(json!({"Ref": "AWS::NoValue"})), &env()).unwrap(), None);
    }

    #[test]
    fn get_att_checks_exposed_attributes() {
        assert!(matches!(resolved(json!({"Fn::GetAtt": ["Bucket", "Arn"]})), Value::Unknown(_)));
        assert!(matches!(
            error(json!({"Fn::GetAtt": ["Bucket", "Nope"]})),
            ResolveError::UnresolvedReference(_)
        ));
        assert!(matches!(
            error(json!({"Fn::GetAtt": ["Missing", "Arn"]})),
            ResolveError::UnresolvedReference(_)
        ));
    }

    #[test]
    fn if_is_lazy() {
        // The false branch references an undeclared name and must not be evaluated
        assert_eq!(
            resolved(json!({"Fn::If": ["IsProd", "big", {"Ref": "Undeclared"}]})),
            Value::from("big")
        );
        assert_eq!(
            resolved(json!({"Fn::If": ["IsDev", {"Ref": "Undeclared"}, "small"]})),
            Value::from("small")
        );
        assert!(matches!(
            error(json!({"Fn::If": ["Nope", "a", "b"]})),
            ResolveError::UnresolvedReference(_)
        ));
    }

    #[test]
    fn sub_placeholders() {
        assert_eq!(
            resolved(json!({"Fn::Sub": "${Env}-${AWS::Region}-${!Literal}"})),
            Value::from("prod-us-east-1-${Literal}")
        );
        assert_eq!(
            resolved(json!({"Fn::Sub": ["${Name}-x", {"Name": {"Ref": "Env"}}]})),
            Value::from("prod-x")
        );
        // Bindings shadow parameters
        assert_eq!(
            resolved(json!({"Fn::Sub": ["${Env}", {"Env": "override"}]})),
            Value::from("override")
        );
        assert!(matches!(resolved(json!({"Fn::Sub": "${Bucket.Arn}/*"})), Value::Unknown(_)));
        assert!(matches!(
            error(json!({"Fn::Sub": "${Nope}"})),
            ResolveError::UnresolvedReference(_)
        ));
        assert!(matches!(
            error(json!({"Fn::Sub": "${Subnets}"})),
            ResolveError::TypeMismatch(_)
        ));
    }

    #[test]
    fn find_in_map() {
        assert_eq!(
            resolved(json!({"Fn::FindInMap": ["RegionMap", {"Ref": "AWS::Region"}, "Ami"]})),
            Value::from("ami-123")
        );
        assert!(matches!(
            error(json!({"Fn::FindInMap": ["RegionMap", "eu-west-1", "Ami"]})),
            ResolveError::UnresolvedReference(_)
        ));
        assert!(matches!(
            error(json!({"Fn::FindInMap": ["Nope", "a", "b"]})),
            ResolveError::UnresolvedReference(_)
        ));
        assert!(matches!(
            error(json!({"Fn::FindInMap": ["RegionMap", ["a"], "Ami"]})),
            ResolveError::TypeMismatch(_)
        ));
    }

    #[test]
    fn select_and_split() {
        assert_eq!(resolved(json!({"Fn::Select": ["1", ["a", "b"]]})), Value::from("b"));
        assert_eq!(
            resolved(json!({"Fn::Select": [0, {"Fn::Split": [",", "x,y"]}]})),
            Value::from("x")
        );
        assert!(matches!(
            error(json!({"Fn::Select": [5, ["a"]]})),
            ResolveError::UnresolvedReference(_)
        ));
        assert!(matches!(
            error(json!({"Fn::Select": [0, "abc"]})),
            ResolveError::TypeMismatch(_)
        ));
        assert!(matches!(
            error(json!({"Fn::Split": [",", ["a"]]})),
            ResolveError::TypeMismatch(_)
        ));
        assert!(matches!(
            error(json!({"Fn::Split": ["", "abc"]})),
            ResolveError::TypeMismatch(_)
        ));
        assert_eq!(
            resolved(json!({"Fn::GetAZs": ""})),
            Value::from_json(&json!(["us-east-1a", "us-east-1b", "us-east-1c"]))
        );
    }

    #[test]
    fn import_value_with_and_without_exports() {
        assert_eq!(
            resolved(json!({"Fn::ImportValue": "shared-vpc"})),
            Value::Unknown(Unknown::scalar(UnknownSource::Import("shared-vpc".into())))
        );

        let mut env = env();
        env.set_exports(BTreeMap::from([("shared-vpc".to_string(), Value::from("vpc-1"))]));
        let expr = parse(json!({"Fn::ImportValue": "shared-vpc"}));
        assert_eq!(resolve(&expr, &env).unwrap(), Some(Value::from("vpc-1")));
        let missing = parse(json!({"Fn::ImportValue": "other"}));
        assert!(resolve(&missing, &env).is_err());
    }

    #[test]
    fn base64_encodes() {
        assert_eq!(resolved(json!({"Fn::Base64": "hello"})), Value::from("aGVsbG8="));
    }

    #[test]
    fn conditions() {
        let env = env();
        let cond = |j: serde_json::Value| {
            evaluate_condition(&Expr::parse_condition(&j).unwrap(), &env)
        };
        assert_eq!(cond(json!({"Fn::Equals": [{"Ref": "Env"}, "prod"]})), Ok(true));
        assert_eq!(cond(json!({"Fn::Equals": ["80", 80]})), Ok(true));
        assert_eq!(
            cond(json!({"Fn::And": [{"Condition": "IsProd"}, {"Fn::Not": [{"Condition": "IsDev"}]}]})),
            Ok(true)
        );
        assert_eq!(cond(json!({"Fn::Or": [{"Condition": "IsDev"}, {"Condition": "IsDev"}]})), Ok(false));
        assert!(matches!(
            cond(json!({"Fn::Equals": [{"Ref": "Bucket"}, "x"]})),
            Err(ResolveError::Indeterminate(_))
        ));
    }

    #[test]
    fn unsupported_function_is_unknown() {
        let value = resolved(json!({"Fn::Transform": {"Name": "AWS::Include"}}));
        assert_eq!(
            value,
            Value::Unknown(Unknown::scalar(UnknownSource::Function("Fn::Transform".into())))
        );
    }
}
