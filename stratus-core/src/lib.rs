//! Stratus Core
//!
//! Validation and intrinsic resolution engine for CloudFormation templates

pub mod config;
pub mod engine;
pub mod finding;
pub mod graph;
pub mod impact;
pub mod intrinsic;
pub mod path;
pub mod resolver;
pub mod schema;
pub mod specification;
pub mod template;
pub mod validator;
pub mod value;

pub use config::EngineConfig;
pub use engine::{Engine, FatalError, Inputs, Report, ResolvedTemplate};
pub use finding::{ErrorKind, Finding, Severity, ValidationResult};
pub use template::{Template, TemplateError};
pub use validator::validate;
