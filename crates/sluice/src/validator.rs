//! Column-set validation against the catalog's expected schema.

use std::collections::BTreeSet;

use crate::model::error_code;

const BOM: char = '\u{feff}';

/// Outcome of comparing a file's columns with the expected set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    /// Expected columns the file does not have.
    pub missing_in_file: BTreeSet<String>,
    /// File columns the catalog does not know.
    pub unexpected_in_file: BTreeSet<String>,
}

impl Verdict {
    /// Error code and description for a failed verdict; `None` when passed.
    pub fn describe(&self, file_name: &str) -> Option<(&'static str, String)> {
        if self.passed {
            return None;
        }

        let missing = (!self.missing_in_file.is_empty()).then(|| {
            format!(
                "{} are not found in {file_name}",
                join(&self.missing_in_file)
            )
        });
        let unexpected = (!self.unexpected_in_file.is_empty()).then(|| {
            format!(
                "New Columns - {} are found in {file_name} which are not present in Column Mapping Metadata Table",
                join(&self.unexpected_in_file)
            )
        });

        match (missing, unexpected) {
            (Some(missing), Some(unexpected)) => Some((
                error_code::MISSING_AND_UNEXPECTED,
                format!("{missing}; {unexpected}"),
            )),
            (Some(missing), None) => Some((error_code::MISSING_COLUMNS, missing)),
            (None, Some(unexpected)) => Some((error_code::UNEXPECTED_COLUMNS, unexpected)),
            (None, None) => None,
        }
    }
}

fn join(columns: &BTreeSet<String>) -> String {
    columns.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// Lower-case a header after trimming whitespace and a leading BOM.
pub fn normalize_column(name: &str) -> String {
    name.trim().trim_start_matches(BOM).trim().to_lowercase()
}

/// Compares a file's column names with the expected set.
///
/// `expected` is already lower-cased by the catalog.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, columns: &[String], expected: &BTreeSet<String>) -> Verdict;
}

/// Case-insensitive set equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnSetValidator;

impl SchemaValidator for ColumnSetValidator {
    fn validate(&self, columns: &[String], expected: &BTreeSet<String>) -> Verdict {
        let actual: BTreeSet<String> = columns.iter().map(|c| normalize_column(c)).collect();

        let missing_in_file: BTreeSet<String> = expected.difference(&actual).cloned().collect();
        let unexpected_in_file: BTreeSet<String> = actual.difference(expected).cloned().collect();

        Verdict {
            passed: missing_in_file.is_empty() && unexpected_in_file.is_empty(),
            missing_in_file,
            unexpected_in_file,
        }
    }
}
