//! Stratus Schemas
//!
//! Built-in AWS resource type schemas. The specification document is embedded
//! at compile time and loaded once, on first use.

pub mod conditional;

use std::sync::OnceLock;

use log::debug;
use stratus_core::schema::{SchemaError, SchemaRegistry};
use stratus_core::specification::{self, Specification};

/// The embedded resource specification document
pub const SPECIFICATION: &str = include_str!("../data/resource_specification.json");

static REGISTRY: OnceLock<Result<SchemaRegistry, SchemaError>> = OnceLock::new();

/// The shared registry built from the embedded specification
pub fn registry() -> Result<&'static SchemaRegistry, SchemaError> {
    REGISTRY
        .get_or_init(|| {
            debug!("Loading built-in resource specification");
            specification::load(SPECIFICATION, &conditional::rules())
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// The embedded specification as a document, e.g. for merging generated entries
pub fn specification() -> Result<Specification, SchemaError> {
    Specification::from_json_str(SPECIFICATION)
}
