//! Impact - Compare two resolved templates and classify the update impact
//!
//! Every resource of the new template is compared with its old counterpart.
//! Changed properties are classified by their declared update behavior and a
//! resource takes the most severe one. Replacing a resource changes its
//! physical id and attributes, so properties of later resources that refer to
//! it are treated as changed as well.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::engine::{ResolvedResource, ResolvedTemplate};
use crate::schema::{SchemaRegistry, UpdateBehavior};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChangeCause {
    /// The property value itself changed
    Direct,
    /// The value refers to a resource that is being replaced
    ReplacedDependency(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyChange {
    pub property: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub behavior: UpdateBehavior,
    pub cause: ChangeCause,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Change {
    Create,
    Delete,
    Update {
        behavior: UpdateBehavior,
        properties: Vec<PropertyChange>,
    },
    NoChange,
}

impl Change {
    pub fn is_change(&self) -> bool {
        !matches!(self, Change::NoChange)
    }

    pub fn is_replacement(&self) -> bool {
        matches!(
            self,
            Change::Update {
                behavior: UpdateBehavior::Replacement,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceImpact {
    pub logical_id: String,
    pub resource_type: String,
    pub change: Change,
}

/// Per-resource impact, in the new template's resolution order followed by deletions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImpactReport {
    impacts: Vec<ResourceImpact>,
}

impl ImpactReport {
    pub fn impacts(&self) -> &[ResourceImpact] {
        &self.impacts
    }

    pub fn get(&self, logical_id: &str) -> Option<&ResourceImpact> {
        self.impacts.iter().find(|i| i.logical_id == logical_id)
    }

    pub fn has_changes(&self) -> bool {
        self.impacts.iter().any(|i| i.change.is_change())
    }

    pub fn summary(&self) -> ImpactSummary {
        let mut summary = ImpactSummary::default();
        for impact in &self.impacts {
            match &impact.change {
                Change::Create => summary.create += 1,
                Change::Delete => summary.delete += 1,
                Change::Update { behavior, .. } => {
                    summary.update += 1;
                    if *behavior == UpdateBehavior::Replacement {
                        summary.replace += 1;
                    }
                }
                Change::NoChange => summary.unchanged += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImpactSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub unchanged: usize,
}

impl fmt::Display for ImpactSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Impact: {} to create, {} to update ({} replacement), {} to delete",
            self.create, self.update, self.replace, self.delete
        )
    }
}

/// Classify how moving from `old` to `new` affects each resource
pub fn diff(old: &ResolvedTemplate, new: &ResolvedTemplate, registry: &SchemaRegistry) -> ImpactReport {
    let mut report = ImpactReport::default();
    let mut replaced: BTreeSet<String> = BTreeSet::new();

    for logical_id in &new.resolution_order {
        let Some(resource) = new.resources.get(logical_id) else {
            continue;
        };
        let change = match old.resources.get(logical_id) {
            None => Change::Create,
            Some(previous) => compare(previous, resource, registry, &replaced),
        };
        if change.is_replacement() {
            replaced.insert(logical_id.clone());
        }
        report.impacts.push(ResourceImpact {
            logical_id: logical_id.clone(),
            resource_type: resource.resource_type.clone(),
            change,
        });
    }

    for logical_id in &old.resolution_order {
        if let Some(resource) = old.resources.get(logical_id)
            && !new.resources.contains_key(logical_id)
        {
            report.impacts.push(ResourceImpact {
                logical_id: logical_id.clone(),
                resource_type: resource.resource_type.clone(),
                change: Change::Delete,
            });
        }
    }
    report
}

fn update_behavior(registry: &SchemaRegistry, resource_type: &str, property: &str) -> UpdateBehavior {
    registry
        .lookup(resource_type)
        .ok()
        .and_then(|schema| schema.properties.get(property))
        .map_or(UpdateBehavior::Replacement, |spec| spec.update)
}

/// First replaced resource the value refers to
fn replaced_dependency(value: Option<&Value>, replaced: &BTreeSet<String>) -> Option<String> {
    let mut sources = BTreeSet::new();
    value?.collect_unknown_sources(&mut sources);
    sources
        .iter()
        .filter_map(|s| s.logical_id())
        .find(|id| replaced.contains(*id))
        .map(str::to_string)
}

fn compare(
    old: &ResolvedResource,
    new: &ResolvedResource,
    registry: &SchemaRegistry,
    replaced: &BTreeSet<String>,
) -> Change {
    if old.resource_type != new.resource_type {
        return Change::Update {
            behavior: UpdateBehavior::Replacement,
            properties: vec![PropertyChange {
                property: "Type".to_string(),
                old: Some(Value::string(&old.resource_type)),
                new: Some(Value::string(&new.resource_type)),
                behavior: UpdateBehavior::Replacement,
                cause: ChangeCause::Direct,
            }],
        };
    }

    let names: BTreeSet<&String> = old
        .properties
        .keys()
        .chain(new.properties.keys())
        .chain(old.unresolved.iter())
        .chain(new.unresolved.iter())
        .collect();

    let mut changes = Vec::new();
    for name in names {
        let before = old.properties.get(name);
        let after = new.properties.get(name);
        let unresolved_before = old.unresolved.contains(name);
        let unresolved_after = new.unresolved.contains(name);

        let cause = if unresolved_before && unresolved_after {
            None
        } else if before != after || unresolved_before != unresolved_after {
            Some(ChangeCause::Direct)
        } else {
            replaced_dependency(after, replaced).map(ChangeCause::ReplacedDependency)
        };

        if let Some(cause) = cause {
            changes.push(PropertyChange {
                property: name.clone(),
                old: before.cloned(),
                new: after.cloned(),
                behavior: update_behavior(registry, &new.resource_type, name),
                cause,
            });
        }
    }

    match changes.iter().map(|c| c.behavior).max() {
        Some(behavior) => Change::Update {
            behavior,
            properties: changes,
        },
        None => Change::NoChange,
    }
}
