//! errors returned while loading a manifest and while resolving releases from it
use crate::directive::Directive;
use crate::target::TargetKind;
use std::path::PathBuf;

/// Any failure that stops [crate::config::Config::load]
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{directive} on a non-scalar node{}", at_line(.line))]
    DirectiveOnNonScalar {
        directive: Directive,
        line: Option<usize>,
    },
    #[error("env variable {name} is not set{}", at_line(.line))]
    UnresolvedEnvVar { name: String, line: Option<usize> },
    #[error("include {}{} failed", .path.display(), at_line(.line))]
    IncludeFailed {
        path: PathBuf,
        line: Option<usize>,
        #[source]
        cause: Box<LoadError>,
    },
    #[error("include {} forms a cycle ({})", .path.display(), format_chain(.chain))]
    IncludeCycle { path: PathBuf, chain: Vec<PathBuf> },
    #[error("include {} is nested deeper than {depth} levels", .path.display())]
    IncludeDepthExceeded { path: PathBuf, depth: usize },
    #[error("number {value} has no canonical representation")]
    NonFiniteNumber { value: String },
    #[error("invalid schema {origin}: {message}")]
    InvalidSchema { origin: String, message: String },
    #[error("document does not match the schema\n{}", format_issues(.issues))]
    SchemaViolation { issues: Vec<SchemaIssue> },
    #[error("invalid document: {message}")]
    InvalidDocument { message: String },
    #[error("cannot decode {what}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicated repository {name}")]
    DuplicateRepository { name: String },
    #[error("duplicated release {name}")]
    DuplicateRelease { name: String },
    #[error("duplicated component {component} in {} {target}", .kind.singular())]
    DuplicateComponent {
        kind: TargetKind,
        target: String,
        component: String,
    },
    #[error("{} {target}: component must be a release name or a record, got {entry}", .kind.singular())]
    InvalidComponent {
        kind: TargetKind,
        target: String,
        entry: String,
    },
    #[error("release {release}: file {} not found", .path.display())]
    ScriptNotFound {
        release: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} {target}: release {release} not found", .kind.singular())]
    UnknownReleaseReference {
        kind: TargetKind,
        target: String,
        release: String,
    },
}

/// A single schema violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// JSON pointer to the offending value, `(root)` for the document itself
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Failures of a single resolution query. The loaded document stays usable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("release {name} not found")]
    ReleaseNotFound { name: String },
    #[error("release {name} is not found for {kind} - {target}")]
    ReleaseNotFoundForTarget {
        name: String,
        kind: TargetKind,
        target: String,
    },
    #[error("unknown target {target} in {kind}")]
    UnknownTarget { target: String, kind: TargetKind },
}

fn at_line(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!(", line: {line}"),
        None => String::new(),
    }
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_issues(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  {issue}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn messages_locate_the_entity() {
        let error = LoadError::UnresolvedEnvVar {
            name: "REPO_USER".into(),
            line: Some(4),
        };
        assert_eq!(error.to_string(), "env variable REPO_USER is not set, line: 4");

        let error = LoadError::UnknownReleaseReference {
            kind: TargetKind::Environments,
            target: "development".into(),
            release: "web".into(),
        };
        assert_eq!(
            error.to_string(),
            "environment development: release web not found"
        );

        let error = ResolveError::ReleaseNotFoundForTarget {
            name: "web".into(),
            kind: TargetKind::Projects,
            target: "shop".into(),
        };
        assert_eq!(
            error.to_string(),
            "release web is not found for projects - shop"
        );
    }
}
