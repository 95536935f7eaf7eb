//! Graph - Dependency analysis between resources
//!
//! Edges point from a dependent to its dependency. They come from explicit
//! `DependsOn` entries and from `Ref`, `Fn::GetAtt` and `Fn::Sub`
//! placeholders naming other resources. The same graph type orders the
//! `Conditions` section.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::finding::{ErrorKind, Finding, Section};
use crate::intrinsic::Expr;
use crate::path::PropertyPath;
use crate::template::Template;

/// Why one node depends on another
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DependencyKind {
    DependsOn,
    Ref,
    GetAtt(String),
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::DependsOn => write!(f, "DependsOn"),
            DependencyKind::Ref => write!(f, "Ref"),
            DependencyKind::GetAtt(attr) => write!(f, "GetAtt {}", attr),
        }
    }
}

/// Dependency between resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Target logical id
    pub target: String,
    pub kind: DependencyKind,
    /// Where the reference is used (root for DependsOn)
    pub used_in: PropertyPath,
}

/// A dependency cycle, listed in traversal order
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Circular dependency: {}", display_cycle(.cycle))]
pub struct CycleError {
    pub cycle: Vec<String>,
}

fn display_cycle(cycle: &[String]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(String::as_str).collect();
    if let Some(first) = cycle.first() {
        parts.push(first);
    }
    parts.join(" -> ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Dependency graph over logical ids
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub nodes: BTreeSet<String>,
    /// Logical id -> list of dependencies
    pub edges: BTreeMap<String, Vec<Dependency>>,
    /// Reverse edges: target -> logical ids that depend on it
    pub reverse_edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>) {
        self.nodes.insert(id.into());
    }

    /// Add a dependency edge; both ends become nodes
    pub fn add_edge(&mut self, from: impl Into<String>, dependency: Dependency) {
        let from = from.into();
        self.nodes.insert(from.clone());
        self.nodes.insert(dependency.target.clone());
        self.reverse_edges
            .entry(dependency.target.clone())
            .or_default()
            .insert(from.clone());
        self.edges.entry(from).or_default().push(dependency);
    }

    pub fn dependencies_of(&self, id: &str) -> &[Dependency] {
        self.edges.get(id).map_or(&[], |v| v.as_slice())
    }

    /// Logical ids that depend directly on `id`
    pub fn dependents_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.reverse_edges
            .get(id)
            .into_iter()
            .flat_map(|s| s.iter().map(String::as_str))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Distinct dependency targets per node, sorted
    fn adjacency(&self) -> BTreeMap<&str, Vec<&str>> {
        self.nodes
            .iter()
            .map(|node| {
                let targets: BTreeSet<&str> = self
                    .dependencies_of(node)
                    .iter()
                    .map(|d| d.target.as_str())
                    .collect();
                (node.as_str(), targets.into_iter().collect())
            })
            .collect()
    }

    /// Find a cycle with an iterative depth-first traversal
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let adjacency = self.adjacency();
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();

        for &start in adjacency.keys() {
            if marks.contains_key(start) {
                continue;
            }
            marks.insert(start, Mark::Visiting);
            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];

            while let Some(&(node, next_index)) = stack.last() {
                let targets = adjacency.get(node).map_or(&[][..], |v| v.as_slice());
                let Some(&next) = targets.get(next_index) else {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match marks.get(next) {
                    Some(Mark::Visiting) => {
                        let pos = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        return Some(stack[pos..].iter().map(|(n, _)| n.to_string()).collect());
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(next, Mark::Visiting);
                        stack.push((next, 0));
                    }
                }
            }
        }
        None
    }

    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Dependencies-first order; independent nodes come in logical id order
    pub fn topological_order(&self) -> Result<Vec<String>, CycleError> {
        if let Some(cycle) = self.find_cycle() {
            return Err(CycleError { cycle });
        }

        let adjacency = self.adjacency();
        let mut pending: BTreeMap<&str, usize> =
            adjacency.iter().map(|(n, deps)| (*n, deps.len())).collect();
        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_first() {
            order.push(node.to_string());
            for dependent in self.dependents_of(node) {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }
        Ok(order)
    }

    /// Resource graph of a template; DependsOn entries naming no resource become findings
    pub fn from_template(template: &Template) -> (Self, Vec<Finding>) {
        let mut graph = DependencyGraph::new();
        let mut findings = Vec::new();

        for (id, resource) in &template.resources {
            graph.add_node(id);

            for target in &resource.depends_on {
                if template.resources.contains_key(target) {
                    graph.add_edge(
                        id,
                        Dependency {
                            target: target.clone(),
                            kind: DependencyKind::DependsOn,
                            used_in: PropertyPath::root(),
                        },
                    );
                } else {
                    findings.push(Finding::error(
                        Section::Resources,
                        id,
                        PropertyPath::property("DependsOn"),
                        ErrorKind::UnresolvedReference,
                        format!("DependsOn target '{}' is not a resource", target),
                    ));
                }
            }

            for (name, expr) in &resource.properties {
                let mut found = Vec::new();
                collect_dependencies(expr, PropertyPath::property(name), &mut found);
                for dependency in found {
                    if template.resources.contains_key(&dependency.target) {
                        graph.add_edge(id, dependency);
                    }
                }
            }
        }
        (graph, findings)
    }

    /// Graph of condition-to-condition references in the Conditions section
    pub fn for_conditions(template: &Template) -> Self {
        let mut graph = DependencyGraph::new();
        for (name, expr) in &template.conditions {
            graph.add_node(name);
            for target in expr.conditions() {
                if template.conditions.contains_key(&target) {
                    graph.add_edge(
                        name,
                        Dependency {
                            target,
                            kind: DependencyKind::Ref,
                            used_in: PropertyPath::root(),
                        },
                    );
                }
            }
        }
        graph
    }
}

fn collect_dependencies(expr: &Expr, path: PropertyPath, out: &mut Vec<Dependency>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::List(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_dependencies(item, path.index(i), out);
            }
        }
        Expr::Map(map) => {
            for (k, v) in map {
                collect_dependencies(v, path.key(k), out);
            }
        }
        other => {
            for reference in other.references() {
                out.push(Dependency {
                    kind: match reference.attribute {
                        Some(attr) => DependencyKind::GetAtt(attr),
                        None => DependencyKind::Ref,
                    },
                    target: reference.target,
                    used_in: path.clone(),
                });
            }
        }
    }
}
