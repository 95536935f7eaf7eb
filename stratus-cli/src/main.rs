use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::{LevelFilter, debug};
use similar::{ChangeTag, TextDiff};

use stratus_core::config::EngineConfig;
use stratus_core::engine::{Engine, Inputs, Report};
use stratus_core::finding::{Finding, Severity, ValidationResult};
use stratus_core::graph::DependencyGraph;
use stratus_core::impact::{self, Change, ChangeCause, ImpactReport};
use stratus_core::schema::{PropertySpec, Requiredness, ResourceTypeSchema, SchemaRegistry};
use stratus_core::template::Template;
use stratus_core::value::Value;

/// Exit code for templates with validation errors
const EXIT_INVALID: u8 = 1;
/// Exit code for unreadable input and dependency cycles
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Validate CloudFormation templates and resolve their intrinsic functions", long_about = None)]
struct Cli {
    /// Increase log output (-v debug, -vv trace); RUST_LOG is honoured otherwise
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct DeployArgs {
    /// Parameter value as NAME=VALUE (repeatable)
    #[arg(short = 'p', long = "parameter", value_parser = parse_key_value)]
    parameters: Vec<(String, String)>,

    /// JSON object of export names to values, used by Fn::ImportValue
    #[arg(long)]
    exports: Option<PathBuf>,

    /// Region for pseudo parameters and Fn::GetAZs
    #[arg(long)]
    region: Option<String>,

    /// Account id for AWS::AccountId
    #[arg(long)]
    account_id: Option<String>,

    /// Stack name for AWS::StackName
    #[arg(long)]
    stack_name: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a template and resolve its intrinsic functions
    Validate {
        /// Path to a JSON or YAML template
        template: PathBuf,

        #[command(flatten)]
        deploy: DeployArgs,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        /// Print the resolved template
        #[arg(long)]
        show_resolved: bool,
    },
    /// Show the update impact of moving from one template to another
    Diff {
        old: PathBuf,
        new: PathBuf,

        #[command(flatten)]
        deploy: DeployArgs,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        /// Show old and new values of every changed property
        #[arg(long)]
        verbose: bool,
    },
    /// Print the resolution order and dependency edges of a template
    Graph {
        template: PathBuf,
    },
    /// Describe a built-in resource type, or list all types
    Schema {
        /// Resource type such as AWS::S3::Bucket
        resource_type: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match cli.command {
        Commands::Validate {
            template,
            deploy,
            format,
            show_resolved,
        } => run_validate(&template, &deploy, format, show_resolved),
        Commands::Diff {
            old,
            new,
            deploy,
            format,
            verbose,
        } => run_diff(&old, &new, &deploy, format, verbose),
        Commands::Graph { template } => run_graph(&template),
        Commands::Schema { resource_type } => run_schema(resource_type.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn init_logger(verbose: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.format_timestamp(None).init();
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

fn registry() -> Result<&'static SchemaRegistry, String> {
    stratus_schemas::registry().map_err(|e| format!("Failed to load resource schemas: {}", e))
}

fn load_template(path: &Path) -> Result<Template, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    Template::parse(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

fn load_exports(path: &Path) -> Result<BTreeMap<String, Value>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
    match json {
        serde_json::Value::Object(map) => Ok(map
            .iter()
            .map(|(name, value)| (name.clone(), Value::from_json(value)))
            .collect()),
        _ => Err(format!("{} must contain a JSON object", path.display())),
    }
}

impl DeployArgs {
    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(region) = &self.region {
            config = config.with_region(region);
        }
        if let Some(account_id) = &self.account_id {
            config = config.with_account_id(account_id);
        }
        if let Some(stack_name) = &self.stack_name {
            config = config.with_stack_name(stack_name);
        }
        config
    }

    fn inputs(&self) -> Result<Inputs, String> {
        let mut inputs = Inputs::new();
        for (name, value) in &self.parameters {
            inputs = inputs.with_parameter(name, value);
        }
        if let Some(path) = &self.exports {
            inputs = inputs.with_exports(load_exports(path)?);
        }
        Ok(inputs)
    }
}

/// Run the engine, or report a dependency cycle as fatal
fn evaluate(path: &Path, deploy: &DeployArgs) -> Result<Report, String> {
    let template = load_template(path)?;
    let inputs = deploy.inputs()?;
    let engine = Engine::new(registry()?).with_config(deploy.config());
    debug!("Evaluating {}", path.display());
    engine
        .run(&template, &inputs)
        .map_err(|e| format!("{}: {}", path.display(), e))
}

fn exit_code(result: &ValidationResult) -> ExitCode {
    if result.has_errors() {
        ExitCode::from(EXIT_INVALID)
    } else {
        ExitCode::SUCCESS
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn run_validate(
    path: &Path,
    deploy: &DeployArgs,
    format: Format,
    show_resolved: bool,
) -> Result<ExitCode, String> {
    let report = evaluate(path, deploy)?;

    match format {
        Format::Json => {
            let mut output = serde_json::json!({
                "valid": !report.result.has_errors(),
                "errors": report.result.errors().count(),
                "warnings": report.result.warnings().count(),
                "findings": report.result.findings(),
            });
            if show_resolved {
                output["resolved"] = report.template.to_json();
            }
            print_json(&output)?;
        }
        Format::Text => {
            println!("{} {}", "Validating".cyan(), path.display());
            print_findings(&report.result);
            print_summary(&report);
            if show_resolved {
                println!();
                println!("{}", "Resolved template:".cyan().bold());
                print_json(&report.template.to_json())?;
            }
        }
    }
    Ok(exit_code(&report.result))
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
    }
}

fn format_finding(finding: &Finding) -> String {
    let path = if finding.path.is_root() {
        String::new()
    } else {
        format!("{}: ", finding.path)
    };
    format!(
        "{} [{}] {}{}",
        severity_label(finding.severity),
        finding.kind.to_string().dimmed(),
        path,
        finding.message
    )
}

fn print_findings(result: &ValidationResult) {
    for ((section, logical_id), findings) in result.grouped() {
        println!();
        println!("  {}", format!("{}.{}", section, logical_id).bold());
        for finding in findings {
            println!("    {}", format_finding(finding));
        }
    }
}

fn print_summary(report: &Report) {
    let errors = report.result.errors().count();
    let warnings = report.result.warnings().count();
    println!();
    if errors == 0 && warnings == 0 {
        println!(
            "{}",
            format!(
                "✓ {} resources validated successfully.",
                report.template.resources.len()
            )
            .green()
            .bold()
        );
    } else if errors == 0 {
        println!(
            "{}",
            format!("✓ Valid with {} warning(s).", warnings).yellow().bold()
        );
    } else {
        println!(
            "{}",
            format!("✗ {} error(s), {} warning(s).", errors, warnings)
                .red()
                .bold()
        );
    }
}

fn run_diff(
    old_path: &Path,
    new_path: &Path,
    deploy: &DeployArgs,
    format: Format,
    verbose: bool,
) -> Result<ExitCode, String> {
    let old = evaluate(old_path, deploy)?;
    let new = evaluate(new_path, deploy)?;

    let mut invalid = false;
    for (path, report) in [(old_path, &old), (new_path, &new)] {
        if report.result.has_errors() {
            invalid = true;
            eprintln!("{} {}", "Invalid template:".red().bold(), path.display());
            for finding in report.result.errors() {
                eprintln!("  {}: {}", finding.location(), finding.message);
            }
        }
    }
    if invalid {
        return Ok(ExitCode::from(EXIT_INVALID));
    }

    let report = impact::diff(&old.template, &new.template, registry()?);
    match format {
        Format::Json => {
            let json = serde_json::to_value(&report).map_err(|e| e.to_string())?;
            print_json(&json)?;
        }
        Format::Text => print_impact(&report, verbose),
    }
    Ok(ExitCode::SUCCESS)
}

fn change_symbol(change: &Change) -> colored::ColoredString {
    match change {
        Change::Create => "+".green().bold(),
        Change::Delete => "-".red().bold(),
        Change::Update { .. } if change.is_replacement() => "-/+".red().bold(),
        Change::Update { .. } => "~".yellow().bold(),
        Change::NoChange => " ".normal(),
    }
}

fn display_value(value: Option<&Value>) -> String {
    value.map_or_else(|| "(absent)".to_string(), |v| v.to_string())
}

fn print_impact(report: &ImpactReport, verbose: bool) {
    if !report.has_changes() {
        println!("{}", "No changes.".green());
        return;
    }

    println!("{}", "Update impact:".cyan().bold());
    println!();
    for resource in report.impacts() {
        let change = &resource.change;
        if !change.is_change() {
            continue;
        }
        let label = match change {
            Change::Update { behavior, .. } => format!(" ({})", behavior),
            _ => String::new(),
        };
        println!(
            "  {} {} {}{}",
            change_symbol(change),
            resource.logical_id.bold(),
            resource.resource_type.cyan(),
            label.dimmed()
        );

        let Change::Update { properties, .. } = change else {
            continue;
        };
        for property in properties {
            let cause = match &property.cause {
                ChangeCause::Direct => String::new(),
                ChangeCause::ReplacedDependency(id) => format!(", {} is replaced", id),
            };
            println!(
                "      {}: {}{}",
                property.property,
                property.behavior.to_string().yellow(),
                cause.dimmed()
            );
            if verbose {
                print_value_diff(property.old.as_ref(), property.new.as_ref());
            }
        }
    }
    println!();
    println!("{}", report.summary().to_string().bold());
}

fn pretty(value: Option<&Value>) -> String {
    match value {
        Some(v) => serde_json::to_string_pretty(&v.to_json()).unwrap_or_else(|_| v.to_string()),
        None => display_value(None),
    }
}

fn print_value_diff(old: Option<&Value>, new: Option<&Value>) {
    let (old, new) = (pretty(old), pretty(new));
    let diff = TextDiff::from_lines(&old, &new);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-".red(),
            ChangeTag::Insert => "+".green(),
            ChangeTag::Equal => " ".normal(),
        };
        print!("        {}{}", sign, change);
        if change.missing_newline() {
            println!();
        }
    }
}

fn run_graph(path: &Path) -> Result<ExitCode, String> {
    let template = load_template(path)?;
    let (graph, findings) = DependencyGraph::from_template(&template);
    let order = graph.topological_order().map_err(|e| e.to_string())?;

    println!("{}", "Resolution order:".cyan().bold());
    for (i, id) in order.iter().enumerate() {
        println!("  {}. {}", i + 1, id);
    }

    println!();
    println!("{}", "Dependencies:".cyan().bold());
    if graph.edge_count() == 0 {
        println!("  (none)");
    }
    for id in &order {
        for dependency in graph.dependencies_of(id) {
            let used_in = if dependency.used_in.is_root() {
                String::new()
            } else {
                format!(" at {}", dependency.used_in)
            };
            println!(
                "  {} -> {} ({}{})",
                id,
                dependency.target.bold(),
                dependency.kind,
                used_in
            );
        }
    }

    if findings.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    println!();
    for finding in &findings {
        println!("  {}", format_finding(finding));
    }
    Ok(ExitCode::from(EXIT_INVALID))
}

fn run_schema(resource_type: Option<&str>) -> Result<ExitCode, String> {
    let registry = registry()?;
    let Some(resource_type) = resource_type else {
        for name in registry.resource_types() {
            println!("{}", name);
        }
        return Ok(ExitCode::SUCCESS);
    };

    match registry.lookup(resource_type) {
        Ok(schema) => {
            print_schema(schema);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            Ok(ExitCode::from(EXIT_INVALID))
        }
    }
}

fn requiredness_label(spec: &PropertySpec) -> String {
    match &spec.requiredness {
        Requiredness::Required => "required".red().to_string(),
        Requiredness::Optional => "optional".dimmed().to_string(),
        Requiredness::Conditional(rule) => format!("conditional: {}", rule.description)
            .yellow()
            .to_string(),
    }
}

fn constraints(spec: &PropertySpec) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(values) = &spec.allowed_values {
        out.push(format!("one of {}", values.join(", ")));
    }
    if let Some(range) = range(spec.min, spec.max) {
        out.push(range);
    }
    if let Some(range) = range(spec.item_min, spec.item_max) {
        out.push(format!("each item {}", range));
    }
    if let Some(pattern) = &spec.pattern {
        out.push(format!("pattern {}", pattern.as_str()));
    }
    out
}

fn range(min: Option<f64>, max: Option<f64>) -> Option<String> {
    match (min, max) {
        (Some(min), Some(max)) => Some(format!("{}..={}", min, max)),
        (Some(min), None) => Some(format!(">= {}", min)),
        (None, Some(max)) => Some(format!("<= {}", max)),
        (None, None) => None,
    }
}

fn print_schema(schema: &ResourceTypeSchema) {
    println!("{}", schema.type_name.cyan().bold());
    if let Some(doc) = &schema.documentation {
        println!("{}", doc.dimmed());
    }

    println!();
    println!("{}", "Properties:".bold());
    for spec in schema.properties.values() {
        println!(
            "  {}: {} ({}, update: {})",
            spec.name.bold(),
            spec.kind,
            requiredness_label(spec),
            spec.update
        );
        for constraint in constraints(spec) {
            println!("      {}", constraint.dimmed());
        }
    }

    if !schema.attributes.is_empty() {
        println!();
        println!("{}", "Attributes:".bold());
        for attribute in schema.attributes.values() {
            println!("  {}: {}", attribute.name.bold(), attribute.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_parsing() {
        assert_eq!(
            parse_key_value("Env=prod").unwrap(),
            ("Env".to_string(), "prod".to_string())
        );
        assert_eq!(
            parse_key_value("Cidrs=10.0.0.0/16,10.1.0.0/16").unwrap().1,
            "10.0.0.0/16,10.1.0.0/16"
        );
        assert_eq!(parse_key_value("Empty=").unwrap().1, "");
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn config_from_flags() {
        let deploy = DeployArgs {
            parameters: Vec::new(),
            exports: None,
            region: Some("eu-west-1".to_string()),
            account_id: None,
            stack_name: Some("demo".to_string()),
        };
        let config = deploy.config();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.account_id, "123456789012");
        assert_eq!(config.stack_name, "demo");
    }

    #[test]
    fn schema_constraints() {
        let registry = stratus_schemas::registry().unwrap();
        let spec = &registry.lookup("AWS::SQS::Queue").unwrap().properties["DelaySeconds"];
        assert_eq!(constraints(spec), vec!["0..=900"]);

        let ports = PropertySpec::new(
            "Ports",
            stratus_core::schema::ValueKind::list(stratus_core::schema::ValueKind::string()),
        )
        .with_bounds(None, Some(4.0))
        .with_item_bounds(Some(1.0), Some(65535.0));
        assert_eq!(constraints(&ports), vec!["<= 4", "each item 1..=65535"]);
    }
}
