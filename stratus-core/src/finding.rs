//! Finding - Validation findings accumulated while processing a template

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::path::PropertyPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Kind of problem a finding reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ErrorKind {
    UnknownResourceType,
    CyclicDependency,
    UnresolvedReference,
    TypeMismatch,
    RequiredPropertyMissing,
    InvalidEnumValue,
    PatternMismatch,
    BoundsViolation,
    UnknownProperty,
    ParameterConstraint,
    UnsupportedFunction,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Template section a finding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Section {
    Parameters,
    Conditions,
    Resources,
    Outputs,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub section: Section,
    pub logical_id: String,
    pub path: PropertyPath,
    pub severity: Severity,
    pub kind: ErrorKind,
    pub message: String,
}

impl Finding {
    pub fn error(
        section: Section,
        logical_id: impl Into<String>,
        path: PropertyPath,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            section,
            logical_id: logical_id.into(),
            path,
            severity: Severity::Error,
            kind,
            message: message.into(),
        }
    }

    pub fn warning(
        section: Section,
        logical_id: impl Into<String>,
        path: PropertyPath,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(section, logical_id, path, kind, message)
        }
    }

    /// Location as `Resources.Bucket.Tags[0].Key`
    pub fn location(&self) -> String {
        if self.path.is_root() {
            format!("{}.{}", self.section, self.logical_id)
        } else {
            format!("{}.{}.{}", self.section, self.logical_id, self.path)
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity,
            self.kind,
            self.location(),
            self.message
        )
    }
}

/// Ordered findings of one run; callers only read it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    findings: Vec<Finding>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub(crate) fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        self.findings.extend(findings);
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    /// Findings of the given kind
    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    /// Findings grouped by section and logical id, in encounter order within a group
    pub fn grouped(&self) -> BTreeMap<(Section, &str), Vec<&Finding>> {
        let mut groups: BTreeMap<(Section, &str), Vec<&Finding>> = BTreeMap::new();
        for finding in &self.findings {
            groups
                .entry((finding.section, finding.logical_id.as_str()))
                .or_default()
                .push(finding);
        }
        groups
    }
}
