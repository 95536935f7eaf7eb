//! Intrinsic - Intrinsic function expressions
//!
//! Property values in a template are parsed into [`Expr`] trees: literals,
//! lists and maps, plus the CloudFormation intrinsic functions (`Ref`,
//! `Fn::GetAtt`, `Fn::Join`, ...). Parsing happens once when the template is
//! loaded, so the resolver and the dependency graph never look at raw JSON.

use std::collections::{BTreeMap, BTreeSet};

use crate::value::Value;

/// Maximum nesting depth of a property value
pub const MAX_EXPRESSION_DEPTH: usize = 64;

/// Malformed intrinsic function or over-deep value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct MalformedExpr {
    pub path: String,
    pub message: String,
}

/// Piece of an `Fn::Sub` template string
#[derive(Debug, Clone, PartialEq)]
pub enum SubPart {
    Text(String),
    /// `${Name}` or `${Resource.Attribute}`
    Var(String),
}

/// A property value: literal data or an intrinsic function
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Scalar or null literal
    Literal(Value),
    List(Vec<Expr>),
    Map(BTreeMap<String, Expr>),
    /// `Ref`: parameter, pseudo parameter or resource
    Ref(String),
    GetAtt {
        logical_id: String,
        attribute: String,
    },
    Join {
        delimiter: String,
        items: Box<Expr>,
    },
    Sub {
        parts: Vec<SubPart>,
        bindings: BTreeMap<String, Expr>,
    },
    If {
        condition: String,
        when_true: Box<Expr>,
        when_false: Box<Expr>,
    },
    FindInMap {
        map: Box<Expr>,
        top_key: Box<Expr>,
        second_key: Box<Expr>,
    },
    Select {
        index: Box<Expr>,
        list: Box<Expr>,
    },
    Split {
        delimiter: String,
        source: Box<Expr>,
    },
    ImportValue(Box<Expr>),
    Base64(Box<Expr>),
    GetAZs(Box<Expr>),
    Equals(Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// Reference to a named condition (only inside condition functions)
    Condition(String),
    /// `Fn::` function that is recognised but not evaluated
    Unsupported { function: String },
}

/// A reference from an expression to another logical id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Reference {
    pub target: String,
    /// `Some` for `Fn::GetAtt` and `${Res.Attr}` placeholders
    pub attribute: Option<String>,
}

impl Expr {
    /// Parse a property value
    pub fn parse(json: &serde_json::Value) -> Result<Expr, MalformedExpr> {
        ExprParser::default().parse(json, Context::Value)
    }

    /// Parse a condition expression (allows `{"Condition": name}`)
    pub fn parse_condition(json: &serde_json::Value) -> Result<Expr, MalformedExpr> {
        ExprParser::default().parse(json, Context::Condition)
    }

    /// Every `Ref`, `Fn::GetAtt` and unbound `Fn::Sub` placeholder in the tree
    pub fn references(&self) -> Vec<Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<Reference>) {
        match self {
            Expr::Literal(_) | Expr::Condition(_) | Expr::Unsupported { .. } => {}
            Expr::Ref(name) => out.push(Reference {
                target: name.clone(),
                attribute: None,
            }),
            Expr::GetAtt {
                logical_id,
                attribute,
            } => out.push(Reference {
                target: logical_id.clone(),
                attribute: Some(attribute.clone()),
            }),
            Expr::Sub { parts, bindings } => {
                for part in parts {
                    if let SubPart::Var(var) = part
                        && !bindings.contains_key(var)
                    {
                        out.push(split_placeholder(var));
                    }
                }
                for binding in bindings.values() {
                    binding.collect_references(out);
                }
            }
            Expr::List(items) | Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Expr::Map(map) => {
                for v in map.values() {
                    v.collect_references(out);
                }
            }
            Expr::Join { items, .. } => items.collect_references(out),
            Expr::If {
                when_true,
                when_false,
                ..
            } => {
                when_true.collect_references(out);
                when_false.collect_references(out);
            }
            Expr::FindInMap {
                map,
                top_key,
                second_key,
            } => {
                map.collect_references(out);
                top_key.collect_references(out);
                second_key.collect_references(out);
            }
            Expr::Select { index, list } => {
                index.collect_references(out);
                list.collect_references(out);
            }
            Expr::Split { source, .. } => source.collect_references(out),
            Expr::ImportValue(inner)
            | Expr::Base64(inner)
            | Expr::GetAZs(inner)
            | Expr::Not(inner) => inner.collect_references(out),
            Expr::Equals(a, b) => {
                a.collect_references(out);
                b.collect_references(out);
            }
        }
    }

    /// Names of every condition referenced by `Fn::If` or `Condition`
    pub fn conditions(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Condition(name) => {
                out.insert(name.clone());
            }
            Expr::If {
                condition,
                when_true,
                when_false,
            } => {
                out.insert(condition.clone());
                when_true.collect_conditions(out);
                when_false.collect_conditions(out);
            }
            Expr::List(items) | Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_conditions(out);
                }
            }
            Expr::Map(map) => {
                for v in map.values() {
                    v.collect_conditions(out);
                }
            }
            Expr::Sub { bindings, .. } => {
                for v in bindings.values() {
                    v.collect_conditions(out);
                }
            }
            Expr::Join { items: inner, .. }
            | Expr::Split { source: inner, .. }
            | Expr::ImportValue(inner)
            | Expr::Base64(inner)
            | Expr::GetAZs(inner)
            | Expr::Not(inner) => inner.collect_conditions(out),
            Expr::FindInMap {
                map,
                top_key,
                second_key,
            } => {
                map.collect_conditions(out);
                top_key.collect_conditions(out);
                second_key.collect_conditions(out);
            }
            Expr::Select { index, list } => {
                index.collect_conditions(out);
                list.collect_conditions(out);
            }
            Expr::Equals(a, b) => {
                a.collect_conditions(out);
                b.collect_conditions(out);
            }
            Expr::Literal(_) | Expr::Ref(_) | Expr::GetAtt { .. } | Expr::Unsupported { .. } => {}
        }
    }
}

/// Split a `${Res.Attr}` placeholder into its target and attribute
pub fn split_placeholder(var: &str) -> Reference {
    match var.split_once('.') {
        Some((target, attribute)) => Reference {
            target: target.to_string(),
            attribute: Some(attribute.to_string()),
        },
        None => Reference {
            target: var.to_string(),
            attribute: None,
        },
    }
}

/// Split an `Fn::Sub` template string into text and placeholders
pub fn parse_sub_template(template: &str) -> Result<Vec<SubPart>, String> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        text.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(format!("unterminated placeholder in '{}'", template));
        };
        let name = &after[..end];
        if let Some(literal) = name.strip_prefix('!') {
            text.push_str("${");
            text.push_str(literal);
            text.push('}');
        } else {
            let name = name.trim();
            if name.is_empty() {
                return Err(format!("empty placeholder in '{}'", template));
            }
            if !text.is_empty() {
                parts.push(SubPart::Text(std::mem::take(&mut text)));
            }
            parts.push(SubPart::Var(name.to_string()));
        }
        rest = &after[end + 1..];
    }
    text.push_str(rest);
    if !text.is_empty() {
        parts.push(SubPart::Text(text));
    }
    Ok(parts)
}

fn single_entry(
    map: &serde_json::Map<String, serde_json::Value>,
) -> Option<(&String, &serde_json::Value)> {
    if map.len() == 1 { map.iter().next() } else { None }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Context {
    Value,
    Condition,
}

#[derive(Default)]
struct ExprParser {
    path: Vec<String>,
}

impl ExprParser {
    fn error(&self, message: impl Into<String>) -> MalformedExpr {
        MalformedExpr {
            path: if self.path.is_empty() {
                "<root>".to_string()
            } else {
                self.path.join(".")
            },
            message: message.into(),
        }
    }

    fn nested<T>(
        &mut self,
        segment: impl Into<String>,
        f: impl FnOnce(&mut Self) -> Result<T, MalformedExpr>,
    ) -> Result<T, MalformedExpr> {
        if self.path.len() >= MAX_EXPRESSION_DEPTH {
            return Err(self.error(format!(
                "value is nested deeper than {} levels",
                MAX_EXPRESSION_DEPTH
            )));
        }
        self.path.push(segment.into());
        let result = f(self);
        self.path.pop();
        result
    }

    fn parse(&mut self, json: &serde_json::Value, ctx: Context) -> Result<Expr, MalformedExpr> {
        match json {
            serde_json::Value::Object(map) => {
                if let Some((key, arg)) = single_entry(map) {
                    match key.as_str() {
                        "Ref" => return Ok(Expr::Ref(self.string_arg("Ref", arg)?)),
                        "Condition" if ctx == Context::Condition => {
                            return Ok(Expr::Condition(self.string_arg("Condition", arg)?));
                        }
                        name if name.starts_with("Fn::") => {
                            return self.nested(name, |p| p.parse_function(name, arg, ctx));
                        }
                        _ => {}
                    }
                }
                self.parse_map(map, ctx)
            }
            serde_json::Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.nested(format!("[{}]", i), |p| p.parse(item, ctx))?);
                }
                Ok(Expr::List(out))
            }
            scalar => Ok(Expr::Literal(Value::from_json(scalar))),
        }
    }

    fn parse_map(
        &mut self,
        map: &serde_json::Map<String, serde_json::Value>,
        ctx: Context,
    ) -> Result<Expr, MalformedExpr> {
        let mut out = BTreeMap::new();
        for (k, v) in map {
            let expr = self.nested(k.as_str(), |p| p.parse(v, ctx))?;
            out.insert(k.clone(), expr);
        }
        Ok(Expr::Map(out))
    }

    fn string_arg(&self, function: &str, arg: &serde_json::Value) -> Result<String, MalformedExpr> {
        arg.as_str()
            .map(str::to_string)
            .ok_or_else(|| self.error(format!("{} expects a string argument", function)))
    }

    fn array_arg<'a>(
        &self,
        function: &str,
        arg: &'a serde_json::Value,
        min: usize,
        max: usize,
    ) -> Result<&'a [serde_json::Value], MalformedExpr> {
        match arg.as_array() {
            Some(items) if (min..=max).contains(&items.len()) => Ok(items),
            Some(items) => Err(self.error(if min == max {
                format!("{} expects {} arguments, got {}", function, min, items.len())
            } else {
                format!(
                    "{} expects {} to {} arguments, got {}",
                    function,
                    min,
                    max,
                    items.len()
                )
            })),
            None => Err(self.error(format!("{} expects a list argument", function))),
        }
    }

    fn boxed(&mut self, json: &serde_json::Value, ctx: Context) -> Result<Box<Expr>, MalformedExpr> {
        self.parse(json, ctx).map(Box::new)
    }

    fn parse_function(
        &mut self,
        name: &str,
        arg: &serde_json::Value,
        ctx: Context,
    ) -> Result<Expr, MalformedExpr> {
        match name {
            "Fn::GetAtt" => {
                let (logical_id, attribute) = match arg {
                    serde_json::Value::String(s) => match s.split_once('.') {
                        Some((id, attr)) => (id.to_string(), attr.to_string()),
                        None => return Err(self.error("Fn::GetAtt expects 'Resource.Attribute'")),
                    },
                    _ => {
                        let items = self.array_arg(name, arg, 2, 2)?;
                        (
                            self.string_arg(name, &items[0])?,
                            self.string_arg(name, &items[1])?,
                        )
                    }
                };
                Ok(Expr::GetAtt {
                    logical_id,
                    attribute,
                })
            }
            "Fn::Join" => {
                let items = self.array_arg(name, arg, 2, 2)?;
                let delimiter = self.string_arg(name, &items[0])?;
                Ok(Expr::Join {
                    delimiter,
                    items: self.boxed(&items[1], Context::Value)?,
                })
            }
            "Fn::Sub" => {
                let (template, bindings) = match arg {
                    serde_json::Value::String(s) => (s.as_str(), BTreeMap::new()),
                    _ => {
                        let items = self.array_arg(name, arg, 2, 2)?;
                        let template = items[0]
                            .as_str()
                            .ok_or_else(|| self.error("Fn::Sub expects a template string"))?;
                        let vars = items[1]
                            .as_object()
                            .ok_or_else(|| self.error("Fn::Sub expects a map of variables"))?;
                        let mut bindings = BTreeMap::new();
                        for (k, v) in vars {
                            let expr = self.nested(k.as_str(), |p| p.parse(v, Context::Value))?;
                            bindings.insert(k.clone(), expr);
                        }
                        (template, bindings)
                    }
                };
                let parts = parse_sub_template(template).map_err(|msg| self.error(msg))?;
                Ok(Expr::Sub { parts, bindings })
            }
            "Fn::If" => {
                let items = self.array_arg(name, arg, 3, 3)?;
                Ok(Expr::If {
                    condition: self.string_arg(name, &items[0])?,
                    when_true: self.boxed(&items[1], ctx)?,
                    when_false: self.boxed(&items[2], ctx)?,
                })
            }
            "Fn::FindInMap" => {
                let items = self.array_arg(name, arg, 3, 3)?;
                Ok(Expr::FindInMap {
                    map: self.boxed(&items[0], Context::Value)?,
                    top_key: self.boxed(&items[1], Context::Value)?,
                    second_key: self.boxed(&items[2], Context::Value)?,
                })
            }
            "Fn::Select" => {
                let items = self.array_arg(name, arg, 2, 2)?;
                Ok(Expr::Select {
                    index: self.boxed(&items[0], Context::Value)?,
                    list: self.boxed(&items[1], Context::Value)?,
                })
            }
            "Fn::Split" => {
                let items = self.array_arg(name, arg, 2, 2)?;
                Ok(Expr::Split {
                    delimiter: self.string_arg(name, &items[0])?,
                    source: self.boxed(&items[1], Context::Value)?,
                })
            }
            "Fn::ImportValue" => Ok(Expr::ImportValue(self.boxed(arg, Context::Value)?)),
            "Fn::Base64" => Ok(Expr::Base64(self.boxed(arg, Context::Value)?)),
            "Fn::GetAZs" => Ok(Expr::GetAZs(self.boxed(arg, Context::Value)?)),
            "Fn::Equals" => {
                let items = self.array_arg(name, arg, 2, 2)?;
                Ok(Expr::Equals(
                    self.boxed(&items[0], Context::Value)?,
                    self.boxed(&items[1], Context::Value)?,
                ))
            }
            "Fn::And" | "Fn::Or" => {
                let items = self.array_arg(name, arg, 2, 10)?;
                let mut conditions = Vec::with_capacity(items.len());
                for item in items {
                    conditions.push(self.parse(item, Context::Condition)?);
                }
                Ok(if name == "Fn::And" {
                    Expr::And(conditions)
                } else {
                    Expr::Or(conditions)
                })
            }
            "Fn::Not" => {
                let items = self.array_arg(name, arg, 1, 1)?;
                Ok(Expr::Not(self.boxed(&items[0], Context::Condition)?))
            }
            other => Ok(Expr::Unsupported {
                function: other.to_string(),
            }),
        }
    }
}
