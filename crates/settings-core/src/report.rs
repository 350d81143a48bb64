//! Run report
//!
//! A [`RunReport`] collects every [`ChangeDescriptor`] of one run. It is the
//! only state shared across resources and is filled through a single
//! aggregation point by the reconciler.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::change::{ChangeDescriptor, ChangeSummary};

/// All descriptors of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of the run
    pub run_id: Uuid,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Whether operations were only planned
    pub dry_run: bool,
    /// Descriptors in arrival order
    pub changes: Vec<ChangeDescriptor>,
}

impl RunReport {
    /// Start an empty report.
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            dry_run,
            changes: Vec::new(),
        }
    }

    pub fn push(&mut self, change: ChangeDescriptor) {
        self.changes.push(change);
    }

    pub fn extend(&mut self, changes: impl IntoIterator<Item = ChangeDescriptor>) {
        self.changes.extend(changes);
    }

    /// Error descriptors only.
    pub fn errors(&self) -> Vec<&ChangeDescriptor> {
        self.changes.iter().filter(|c| c.is_error()).collect()
    }

    /// A run fails when any descriptor is an error.
    pub fn is_failure(&self) -> bool {
        self.changes.iter().any(ChangeDescriptor::is_error)
    }

    /// Descriptors grouped by target resource.
    pub fn by_repository(&self) -> BTreeMap<&str, Vec<&ChangeDescriptor>> {
        let mut groups: BTreeMap<&str, Vec<&ChangeDescriptor>> = BTreeMap::new();
        for change in &self.changes {
            groups.entry(change.repo.as_str()).or_default().push(change);
        }
        groups
    }

    /// Descriptors grouped by originating section.
    pub fn by_section(&self) -> BTreeMap<&str, Vec<&ChangeDescriptor>> {
        let mut groups: BTreeMap<&str, Vec<&ChangeDescriptor>> = BTreeMap::new();
        for change in &self.changes {
            groups.entry(change.origin.as_str()).or_default().push(change);
        }
        groups
    }

    /// Entry counts over all non-error descriptors.
    pub fn summary(&self) -> ChangeSummary {
        let mut total = ChangeSummary::default();
        for change in self.changes.iter().filter(|c| !c.is_error()) {
            total += change.summary;
        }
        total
    }

    /// Sort descriptors by resource and section, keeping arrival order
    /// within a section.
    pub fn sort(&mut self) {
        self.changes
            .sort_by(|a, b| (a.repo.as_str(), a.origin.as_str()).cmp(&(b.repo.as_str(), b.origin.as_str())));
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.changes.is_empty() {
            return writeln!(f, "No changes.");
        }

        let header = ["REPO", "SECTION", "KIND", "ENDPOINT", "+", "~", "-", "MESSAGE"];
        let rows: Vec<[String; 8]> = self
            .changes
            .iter()
            .map(|c| {
                [
                    c.repo.clone(),
                    c.origin.clone(),
                    c.kind.to_string(),
                    c.endpoint.clone().unwrap_or_else(|| "-".to_string()),
                    c.summary.additions.to_string(),
                    c.summary.modifications.to_string(),
                    c.summary.deletions.to_string(),
                    c.message.clone().unwrap_or_default(),
                ]
            })
            .collect();

        let mut widths = header.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let mut write_row = |cells: &[&str]| -> fmt::Result {
            let line: Vec<String> = cells
                .iter()
                .zip(widths)
                .enumerate()
                .map(|(i, (cell, width))| {
                    if i == cells.len() - 1 {
                        cell.to_string()
                    } else {
                        format!("{cell:<width$}")
                    }
                })
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())
        };

        write_row(&header)?;
        for row in &rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            write_row(&cells)?;
        }

        let summary = self.summary();
        writeln!(
            f,
            "\n{} change(s): {} addition(s), {} modification(s), {} deletion(s), {} error(s)",
            self.changes.len(),
            summary.additions,
            summary.modifications,
            summary.deletions,
            self.errors().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RunReport {
        let mut report = RunReport::new(true);
        report.push(ChangeDescriptor::info(
            "labels",
            "api",
            "PATCH /repos/api/labels/bug",
            json!({"name": "bug", "color": "ff0000"}),
            ChangeSummary::modification(),
        ));
        report.push(ChangeDescriptor::error("repository", "web", "Visibility is locked"));
        report.push(ChangeDescriptor::info(
            "labels",
            "api",
            "DELETE /repos/api/labels/stale",
            json!(null),
            ChangeSummary::deletion(),
        ));
        report
    }

    #[test]
    fn failure_when_any_error() {
        let report = sample();
        assert!(report.is_failure());
        assert_eq!(report.errors().len(), 1);
        assert!(!RunReport::new(false).is_failure());
    }

    #[test]
    fn grouping() {
        let report = sample();
        let by_repo = report.by_repository();
        assert_eq!(by_repo.keys().copied().collect::<Vec<_>>(), vec!["api", "web"]);
        assert_eq!(by_repo["api"].len(), 2);
        assert_eq!(report.by_section()["labels"].len(), 2);
    }

    #[test]
    fn summary_skips_errors() {
        let summary = sample().summary();
        assert_eq!(summary.modifications, 1);
        assert_eq!(summary.deletions, 1);
        assert_eq!(summary.additions, 0);
    }

    #[test]
    fn table_rendering() {
        insta::assert_snapshot!(sample().to_string());
    }

    #[test]
    fn empty_report_rendering() {
        assert_eq!(RunReport::new(true).to_string(), "No changes.\n");
    }
}
