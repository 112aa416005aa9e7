//! Diagnostics collected while reading, repairing and checking a model.
//!
//! Every consistency check reports its findings through a [`Diagnostics`]
//! container, grouped by category (`loops`, `phases`, `reader`, ...) and
//! optionally naming the offending element.
//!
//! # Example
//!
//! ```
//! use ugrid_core::diagnostics::Diagnostics;
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning("reader", "Load information missing");
//! diag.add_error_with_entity("loops", "redundant path closes a loop", "line_3");
//!
//! assert!(diag.has_errors());
//! assert_eq!(diag.summary(), "1 warning, 1 error");
//! ```

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reported, processing continued
    Warning,
    /// The checked property does not hold
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;
        match &self.entity {
            Some(entity) => write!(f, " ({entity})"),
            None => Ok(()),
        }
    }
}

/// Issues reported by one stage, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, severity: Severity, category: &str, message: &str, entity: Option<&str>) {
        self.issues.push(DiagnosticIssue {
            severity,
            category: category.to_string(),
            message: message.to_string(),
            entity: entity.map(str::to_string),
        });
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.push(Severity::Warning, category, message, None);
    }

    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.push(Severity::Error, category, message, Some(entity));
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    /// One-line count, e.g. `2 warnings, 1 error`.
    pub fn summary(&self) -> String {
        let counted = |n: usize, noun: &str| {
            format!("{n} {noun}{}", if n == 1 { "" } else { "s" })
        };
        match (self.warnings().count(), self.errors().count()) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => counted(w, "warning"),
            (0, e) => counted(e, "error"),
            (w, e) => format!("{}, {}", counted(w, "warning"), counted(e, "error")),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}
