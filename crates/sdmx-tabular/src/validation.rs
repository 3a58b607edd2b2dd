//! Recoverable error accumulation and per-dataset validation state.
//!
//! The [`ValidationTracker`] never stops the engine; it only records
//! positioned errors. Callers own the error-count threshold and stop pulling
//! once it is reached.

use std::collections::{HashMap, HashSet};

use sdmx_types::{ColumnMapping, DatasetAttributes, StructureDescriptor};
use tracing::warn;

use crate::codec::PhysicalRow;

/// Error family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Physical shape problems: field counts, level tokens, encoding.
    Structural,
    /// Mapping/structure mismatches: missing or unknown concepts.
    Schema,
    /// Values that disagree across rows.
    DataConsistency,
}

/// How serious a recorded error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Informational; the data is still usable as read.
    Warning,
    /// The affected cell or row could not be read as intended.
    Error,
}

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Row field count differs from the header or first row.
    FieldCountMismatch,
    /// Hierarchical level token is not a number in range.
    MalformedLevel,
    /// Bytes are not valid UTF-8.
    InvalidEncoding,
    /// A carriage return appears without a line feed.
    InvalidLineTermination,
    /// A column reference points past the row's fields.
    ColumnOutOfRange,
    /// Every field of a data row is empty.
    EmptyDataRow,
    /// A mandatory concept has no mapping.
    MandatoryConceptMissing,
    /// A concept is not part of the structure.
    UnknownConcept,
    /// A header token does not match the mapping.
    HeaderMismatch,
    /// Dataset attributes changed between rows.
    DatasetAttributeDrift,
}

impl ErrorCode {
    /// The stable string form of this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FieldCountMismatch => "STRUCT_FIELD_COUNT",
            Self::MalformedLevel => "STRUCT_LEVEL",
            Self::InvalidEncoding => "STRUCT_ENCODING",
            Self::InvalidLineTermination => "STRUCT_LINE_END",
            Self::ColumnOutOfRange => "STRUCT_COLUMN_RANGE",
            Self::EmptyDataRow => "STRUCT_EMPTY_ROW",
            Self::MandatoryConceptMissing => "SCHEMA_MANDATORY_MISSING",
            Self::UnknownConcept => "SCHEMA_UNKNOWN_CONCEPT",
            Self::HeaderMismatch => "SCHEMA_HEADER_MISMATCH",
            Self::DatasetAttributeDrift => "DATA_DATASET_ATTRIBUTE",
        }
    }

    /// The family of this code.
    pub fn kind(self) -> ErrorKind {
        match self {
            Self::FieldCountMismatch
            | Self::MalformedLevel
            | Self::InvalidEncoding
            | Self::InvalidLineTermination
            | Self::ColumnOutOfRange
            | Self::EmptyDataRow => ErrorKind::Structural,
            Self::MandatoryConceptMissing | Self::UnknownConcept | Self::HeaderMismatch => {
                ErrorKind::Schema
            }
            Self::DatasetAttributeDrift => ErrorKind::DataConsistency,
        }
    }

    /// Default severity of this code.
    pub fn severity(self) -> Severity {
        match self {
            Self::InvalidLineTermination | Self::EmptyDataRow | Self::UnknownConcept => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of an error in the source.
///
/// `row` is the 1-based physical row; `0` marks dataset-wide errors that
/// belong to no particular row. `column` is 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Position {
    /// Physical row, `0` for dataset scope.
    pub row: u64,
    /// Hierarchical level, when known.
    pub level: Option<u32>,
    /// Column, when known.
    pub column: Option<usize>,
}

impl Position {
    /// Dataset-wide position.
    pub fn dataset() -> Self {
        Self::default()
    }

    /// Position of a whole row.
    pub fn row(row: &PhysicalRow) -> Self {
        Self {
            row: row.number,
            level: row.level,
            column: None,
        }
    }

    /// Position of one cell.
    pub fn cell(row: &PhysicalRow, column: usize) -> Self {
        Self {
            column: Some(column),
            ..Self::row(row)
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.row == 0 {
            f.write_str("dataset")?;
        } else {
            write!(f, "row {}", self.row)?;
        }
        if let Some(level) = self.level {
            write!(f, ", level {}", level)?;
        }
        if let Some(column) = self.column {
            write!(f, ", column {}", column)?;
        }
        Ok(())
    }
}

/// A recoverable, positioned error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Stable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Severity.
    pub severity: Severity,
    /// Source location.
    pub position: Position,
}

impl ValidationError {
    /// Creates an error with the code's default severity.
    pub fn new(code: ErrorCode, message: impl Into<String>, position: Position) -> Self {
        Self {
            code,
            message: message.into(),
            severity: code.severity(),
            position,
        }
    }

    /// The family of this error.
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.position, self.message)
    }
}

/// Per-dataset validation state and error accumulator.
#[derive(Debug, Default)]
pub struct ValidationTracker {
    errors: Vec<ValidationError>,
    strict: bool,
    allow_additional_columns: bool,
    /// Expected field count keyed by level (`None` for flat formats).
    expected_fields: HashMap<Option<u32>, usize>,
    reported: HashSet<(ErrorCode, String)>,
    baseline: DatasetAttributes,
}

impl ValidationTracker {
    /// Creates a tracker.
    pub fn new(strict: bool, allow_additional_columns: bool) -> Self {
        Self {
            strict,
            allow_additional_columns,
            ..Default::default()
        }
    }

    /// Records an error.
    pub fn record(&mut self, error: ValidationError) {
        warn!(code = %error.code, position = %error.position, "{}", error.message);
        self.errors.push(error);
    }

    /// Records an error built from its parts.
    pub fn report(&mut self, code: ErrorCode, message: impl Into<String>, position: Position) {
        self.record(ValidationError::new(code, message, position));
    }

    /// Records an error at most once per `(code, subject)` pair.
    ///
    /// Returns true if the error was recorded.
    pub fn report_once(
        &mut self,
        code: ErrorCode,
        subject: &str,
        message: impl Into<String>,
        position: Position,
    ) -> bool {
        if !self.reported.insert((code, subject.to_string())) {
            return false;
        }
        self.report(code, message, position);
        true
    }

    /// Returns every mandatory concept absent from `mapping`.
    ///
    /// Under strict validation each one is reported once. Rows substitute an
    /// empty value for missing concepts without further reports.
    pub fn check_mandatory(&mut self, descriptor: &StructureDescriptor, mapping: &ColumnMapping) -> Vec<String> {
        let missing: Vec<String> = descriptor
            .concepts
            .iter()
            .filter(|c| c.mandatory && !mapping.contains(&c.id))
            .map(|c| c.id.clone())
            .collect();

        if self.strict {
            for concept in &missing {
                let message = format!("mandatory concept '{}' is not mapped", concept);
                self.report_once(
                    ErrorCode::MandatoryConceptMissing,
                    concept,
                    message,
                    Position::dataset(),
                );
            }
        }
        missing
    }

    /// Fixes the expected field count for rows of `level`.
    pub fn expect_fields(&mut self, level: Option<u32>, count: usize) {
        self.expected_fields.insert(level, count);
    }

    /// Checks field-count parity, learning the count from the first row of
    /// each level. Returns false when an error was recorded.
    pub fn check_field_count(&mut self, row: &PhysicalRow) -> bool {
        let found = row.fields.len();
        let expected = *self.expected_fields.entry(row.level).or_insert(found);

        if found == expected || (found > expected && self.allow_additional_columns) {
            return true;
        }
        self.report(
            ErrorCode::FieldCountMismatch,
            format!("expected {} fields, found {}", expected, found),
            Position::row(row),
        );
        false
    }

    /// Compares a row's dataset attributes with the current baseline.
    ///
    /// Empty snapshots are ignored. A differing snapshot is reported and
    /// becomes the new baseline.
    pub fn check_dataset_attributes(&mut self, attributes: DatasetAttributes, row: &PhysicalRow) {
        if attributes.is_empty() || attributes == self.baseline {
            return;
        }
        if !self.baseline.is_empty() {
            let changed: Vec<&str> = attributes
                .attributes
                .iter()
                .filter(|a| self.baseline.get(&a.concept) != Some(*a))
                .map(|a| a.concept.as_str())
                .chain(
                    self.baseline
                        .attributes
                        .iter()
                        .filter(|a| attributes.get(&a.concept).is_none())
                        .map(|a| a.concept.as_str()),
                )
                .collect();
            let message = format!(
                "dataset attributes differ from previous rows: {}",
                changed.join(", ")
            );
            self.report(ErrorCode::DatasetAttributeDrift, message, Position::row(row));
        }
        self.baseline = attributes;
    }

    /// The current dataset attribute baseline.
    pub fn baseline(&self) -> &DatasetAttributes {
        &self.baseline
    }

    /// Errors recorded so far.
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Removes and returns the recorded errors.
    pub fn take_errors(&mut self) -> Vec<ValidationError> {
        std::mem::take(&mut self.errors)
    }

    /// Number of errors recorded so far.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Clears all per-dataset state, keeping the flags.
    pub fn reset(&mut self) {
        *self = Self::new(self.strict, self.allow_additional_columns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdmx_types::{AttributeValue, Concept, MappingEntry};

    fn row(number: u64, fields: &[&str]) -> PhysicalRow {
        PhysicalRow::new(number, fields.iter().map(|f| f.to_string()).collect())
    }

    fn collection(value: &str) -> DatasetAttributes {
        DatasetAttributes {
            attributes: vec![AttributeValue::single("COLLECTION", value)],
        }
    }

    #[test]
    fn test_error_code_strings_are_stable() {
        assert_eq!(ErrorCode::FieldCountMismatch.as_str(), "STRUCT_FIELD_COUNT");
        assert_eq!(ErrorCode::DatasetAttributeDrift.kind(), ErrorKind::DataConsistency);
        assert_eq!(ErrorCode::UnknownConcept.severity(), Severity::Warning);
    }

    #[test]
    fn test_field_count_learns_first_row() {
        let mut tracker = ValidationTracker::new(false, false);
        assert!(tracker.check_field_count(&row(1, &["a", "b", "c"])));
        assert!(tracker.check_field_count(&row(2, &["a", "b", "c"])));
        assert!(!tracker.check_field_count(&row(3, &["a", "b"])));
        assert_eq!(tracker.error_count(), 1);
        assert_eq!(tracker.errors()[0].position.row, 3);
    }

    #[test]
    fn test_field_count_additional_columns() {
        let mut strict = ValidationTracker::new(false, false);
        strict.expect_fields(None, 2);
        assert!(!strict.check_field_count(&row(2, &["a", "b", "c"])));

        let mut lenient = ValidationTracker::new(false, true);
        lenient.expect_fields(None, 2);
        assert!(lenient.check_field_count(&row(2, &["a", "b", "c"])));
        assert!(!lenient.check_field_count(&row(3, &["a"])));
    }

    #[test]
    fn test_field_count_per_level() {
        let mut tracker = ValidationTracker::new(false, false);
        let level1 = row(1, &["GR", "F"]).with_level(1);
        let level2 = row(2, &["2005", "1", "P"]).with_level(2);
        assert!(tracker.check_field_count(&level1));
        assert!(tracker.check_field_count(&level2));
        assert!(!tracker.check_field_count(&row(3, &["2006"]).with_level(2)));
        assert_eq!(tracker.errors()[0].position.level, Some(2));
    }

    #[test]
    fn test_mandatory_reported_once_under_strict() {
        let dsd = StructureDescriptor::new(vec![
            Concept::dimension("FREQ"),
            Concept::dimension("REF_AREA"),
            Concept::primary_measure("OBS_VALUE"),
        ]);
        let mapping = ColumnMapping::new().with("FREQ", MappingEntry::fixed("A"));

        let mut tracker = ValidationTracker::new(true, false);
        assert_eq!(tracker.check_mandatory(&dsd, &mapping), vec!["REF_AREA"]);
        tracker.check_mandatory(&dsd, &mapping);
        assert_eq!(tracker.error_count(), 1);

        let mut lenient = ValidationTracker::new(false, false);
        assert_eq!(lenient.check_mandatory(&dsd, &mapping), vec!["REF_AREA"]);
        assert_eq!(lenient.error_count(), 0);
    }

    #[test]
    fn test_dataset_attribute_drift() {
        let mut tracker = ValidationTracker::new(false, false);
        tracker.check_dataset_attributes(collection("A"), &row(1, &[]));
        tracker.check_dataset_attributes(collection("A"), &row(2, &[]));
        tracker.check_dataset_attributes(collection("B"), &row(5, &[]));
        tracker.check_dataset_attributes(collection("B"), &row(6, &[]));

        assert_eq!(tracker.error_count(), 1);
        let error = &tracker.errors()[0];
        assert_eq!(error.code, ErrorCode::DatasetAttributeDrift);
        assert_eq!(error.position.row, 5);
        assert!(error.message.contains("COLLECTION"));
        assert_eq!(tracker.baseline(), &collection("B"));
    }

    #[test]
    fn test_reset_keeps_flags() {
        let mut tracker = ValidationTracker::new(false, true);
        tracker.expect_fields(None, 1);
        tracker.report(ErrorCode::EmptyDataRow, "empty", Position::dataset());
        tracker.reset();
        assert_eq!(tracker.error_count(), 0);
        assert!(tracker.check_field_count(&row(1, &["a", "b"])));
    }

    #[test]
    fn test_position_display() {
        let position = Position::cell(&row(4, &["x"]).with_level(2), 3);
        assert_eq!(position.to_string(), "row 4, level 2, column 3");
        assert_eq!(Position::dataset().to_string(), "dataset");
    }
}
