// src/report.rs

//! Per-output findings handed back to the orchestrator
//!
//! Each package output produces one [`OutputReport`]: how many files were
//! rewritten, the fatal errors that must abort packaging, and the warnings
//! that are only surfaced to the user.

use crate::error::Error;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Classification of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// A prefix reference that should exist does not
    NotFound,
    /// Distinct-content files share a referenced name
    AmbiguousDependency,
    /// A reference could not be classified and was left unmodified
    UnresolvedSkip,
    /// Symlink whose target disappears with the build area
    DanglingSymlink,
    /// The external link editor failed on a binary
    LinkEditorFailure,
    /// Declared and installed versions disagree
    MetadataMismatch,
    /// Descriptor parsed but violates its schema
    SchemaWarning,
    /// Descriptor could not be parsed at all
    FormatWarning,
    /// Shebang exceeded the kernel limit and was shortened
    LongShebang,
    /// I/O or configuration problem inside the engine itself
    Internal,
}

impl FindingKind {
    /// Whether a finding of this kind fails the output
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::UnresolvedSkip | Self::SchemaWarning | Self::FormatWarning | Self::LongShebang
        )
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AmbiguousDependency => "ambiguous_dependency",
            Self::UnresolvedSkip => "unresolved_skip",
            Self::DanglingSymlink => "dangling_symlink",
            Self::LinkEditorFailure => "link_editor_failure",
            Self::MetadataMismatch => "metadata_mismatch",
            Self::SchemaWarning => "schema_warning",
            Self::FormatWarning => "format_warning",
            Self::LongShebang => "long_shebang",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single error or warning with the paths it concerns
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub message: String,
    pub paths: Vec<PathBuf>,
}

impl Finding {
    pub fn new(kind: FindingKind, message: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            kind,
            message: message.into(),
            paths,
        }
    }
}

impl From<&Error> for Finding {
    fn from(err: &Error) -> Self {
        Self::new(err.kind(), err.to_string(), err.paths())
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Aggregated result of post-processing one package output
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutputReport {
    /// Output name (empty for anonymous single-output runs)
    pub output: String,
    /// Number of files whose content, links or permissions were rewritten
    pub rewritten_files: usize,
    /// Fatal findings
    pub errors: Vec<Finding>,
    /// Non-fatal findings
    pub warnings: Vec<Finding>,
    /// Stages that ran, in order
    pub stages: Vec<String>,
}

impl OutputReport {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    /// True when no fatal finding was recorded
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record a finding, routing it by severity
    pub fn push(&mut self, finding: Finding) {
        if finding.kind.is_fatal() {
            self.errors.push(finding);
        } else {
            self.warnings.push(finding);
        }
    }

    pub fn push_error(&mut self, err: &Error) {
        self.push(Finding::from(err));
    }

    pub fn add_rewrites(&mut self, count: usize) {
        self.rewritten_files += count;
    }
}

impl Serialize for OutputReportSummary<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("OutputReport", 6)?;
        s.serialize_field("output", &self.0.output)?;
        s.serialize_field("success", &self.0.success())?;
        s.serialize_field("rewritten_files", &self.0.rewritten_files)?;
        s.serialize_field("errors", &self.0.errors)?;
        s.serialize_field("warnings", &self.0.warnings)?;
        s.serialize_field("stages", &self.0.stages)?;
        s.end()
    }
}

/// Serializable view of a report that includes the derived `success` flag
pub struct OutputReportSummary<'a>(pub &'a OutputReport);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_routes_by_severity() {
        let mut report = OutputReport::new("out1");
        report.push(Finding::new(FindingKind::SchemaWarning, "bad menu", vec![]));
        assert!(report.success());
        assert_eq!(report.warnings.len(), 1);

        report.push(Finding::new(
            FindingKind::NotFound,
            "missing lib",
            vec![PathBuf::from("lib/libfoo.so")],
        ));
        assert!(!report.success());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_summary_includes_success() {
        let report = OutputReport::new("pkg");
        let json = serde_json::to_value(OutputReportSummary(&report)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["output"], "pkg");
    }
}
