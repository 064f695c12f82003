//! CSV header validation utilities
//!
//! Compares the header row of a tabular input against the field names a
//! row type expects, before any record is deserialized.

use std::collections::HashSet;
use std::path::Path;

/// Trait for types that can be deserialized from CSV files
///
/// Implementing this trait provides automatic CSV header validation
/// by defining the expected header names.
pub trait CsvFields {
    /// Returns the expected CSV header field names in order
    fn field_names() -> Vec<String>;
}

/// Outcome of a header comparison
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderReport {
    /// Expected columns absent from the file, in expected order
    pub missing: Vec<String>,
    /// Columns present in the file but not expected (ignored on load)
    pub extra: Vec<String>,
}

impl HeaderReport {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
    }

    /// Human readable warnings for the extra columns
    pub fn warnings(&self, csv_path: &Path) -> Vec<String> {
        if self.extra.is_empty() {
            return Vec::new();
        }
        vec![format!(
            "Extra fields found in {} (will be ignored): [{}]",
            csv_path.display(),
            self.extra.join(", ")
        )]
    }
}

/// CSV Header Validator
pub struct CsvHeaderValidator;

impl CsvHeaderValidator {
    /// Validate an already-read header row against the fields of `T`
    pub fn validate_headers<T>(actual: &[String]) -> HeaderReport
    where
        T: CsvFields,
    {
        let expected = T::field_names();
        let actual_set: HashSet<&str> = actual.iter().map(String::as_str).collect();
        let expected_set: HashSet<&str> = expected.iter().map(String::as_str).collect();

        // Keep file/declaration order so messages are stable
        let missing = expected
            .iter()
            .filter(|field| !actual_set.contains(field.as_str()))
            .cloned()
            .collect();
        let extra = actual
            .iter()
            .filter(|field| !expected_set.contains(field.as_str()))
            .cloned()
            .collect();

        HeaderReport { missing, extra }
    }
}
