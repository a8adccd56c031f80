//! Data-quality diagnostics collected while attributing a plant.
//!
//! Nothing recorded here aborts a run. Every warning is also emitted through
//! `tracing` at the point it is recorded, so a CLI run with `--log-level warn`
//! shows the same issues that end up in the batch manifest.
//!
//! ```
//! use ens_core::diagnostics::{categories, Diagnostics};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning_with_entity(categories::UNRESOLVED_ASSET, "no such asset", "asset 99");
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.count_in(categories::UNRESOLVED_ASSET), 1);
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

/// Well-known issue categories.
pub mod categories {
    pub const UNRESOLVED_ASSET: &str = "unresolved-asset";
    pub const MISSING_CURVE: &str = "missing-curve";
    pub const ALLOCATION_SKIPPED: &str = "allocation-skipped";
    pub const ZERO_DURATION: &str = "zero-duration";
    pub const OVERLAP: &str = "overlap";
    pub const TELEMETRY_GAP: &str = "telemetry-gap";
    pub const ESTIMATE_SKIPPED: &str = "estimate-skipped";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A single issue encountered during an operation
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub category: String,
    pub message: String,
    /// Asset or incident the issue refers to, e.g. "asset 12"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}

/// Collection of issues for one run (or one plant of a run).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        match issue.severity {
            Severity::Warning => tracing::warn!(category = %issue.category, "{}", issue),
            Severity::Error => tracing::error!(category = %issue.category, "{}", issue),
        }
        self.issues.push(issue);
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.add(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.add(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.add(DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity));
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn count_in(&self, category: &str) -> usize {
        self.issues_by_category(category).count()
    }

    /// Issue counts keyed by category, in category order.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Merge without re-logging; the issues were logged when first recorded.
    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn summary(&self) -> String {
        let warnings = self.warning_count();
        let errors = self.error_count();
        let plural = |n: usize| if n == 1 { "" } else { "s" };

        match (warnings, errors) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, plural(w)),
            (0, e) => format!("{} error{}", e, plural(e)),
            (w, e) => format!("{} warning{}, {} error{}", w, plural(w), e, plural(e)),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_pluralizes() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");
        diag.add_warning(categories::OVERLAP, "a");
        assert_eq!(diag.summary(), "1 warning");
        diag.add_warning(categories::OVERLAP, "b");
        diag.add_error_with_entity(categories::UNRESOLVED_ASSET, "c", "asset 3");
        assert_eq!(diag.summary(), "2 warnings, 1 error");
    }

    #[test]
    fn counts_group_by_category() {
        let mut diag = Diagnostics::new();
        diag.add_warning(categories::OVERLAP, "a");
        diag.add_warning(categories::MISSING_CURVE, "b");
        diag.add_warning(categories::OVERLAP, "c");
        let counts = diag.counts();
        assert_eq!(counts.get(categories::OVERLAP), Some(&2));
        assert_eq!(counts.get(categories::MISSING_CURVE), Some(&1));
    }

    #[test]
    fn merge_keeps_both_sides() {
        let mut a = Diagnostics::new();
        a.add_warning(categories::ZERO_DURATION, "a");
        let mut b = Diagnostics::new();
        b.add_warning(categories::TELEMETRY_GAP, "b");
        a.merge(b);
        assert_eq!(a.issues.len(), 2);
    }

    #[test]
    fn display_includes_entity() {
        let issue = DiagnosticIssue::new(Severity::Warning, "overlap", "two incidents")
            .with_entity("asset 4");
        assert_eq!(issue.to_string(), "[warning:overlap] two incidents (asset 4)");
    }

    #[test]
    fn serializes_to_json() {
        let mut diag = Diagnostics::new();
        diag.add_warning(categories::OVERLAP, "x");
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"category\":\"overlap\""));
        assert!(json.contains("\"severity\":\"warning\""));
    }
}
