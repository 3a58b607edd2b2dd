//! Engine-wide configuration, statistics and fatal error types.

use sdmx_types::{ColumnMapping, StructureError};
use thiserror::Error;

use crate::codec::{CodecOptions, DelimitedOptions, FixedWidthOptions, HierarchicalOptions};
use crate::writer::FieldWidths;

/// Fatal errors that abort construction or the current advance call.
///
/// Recoverable problems are never returned here; they are accumulated as
/// [`ValidationError`](crate::ValidationError)s instead.
#[derive(Error, Debug)]
pub enum TabularError {
    /// I/O error on the underlying stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV tokenizer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The input holds no rows at all.
    #[error("Input is empty")]
    EmptyInput,

    /// The input holds no data rows and empty datasets are rejected.
    #[error("Dataset is empty: no data rows after the header")]
    EmptyDataset,

    /// Contradictory or incomplete configuration.
    #[error("Configuration error: {reason}")]
    Configuration {
        /// What is wrong.
        reason: String,
    },

    /// The structure descriptor is internally inconsistent.
    #[error("Invalid structure: {0}")]
    InvalidStructure(#[from] StructureError),

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: String,
    },

    /// The engine was used after `close()`.
    #[error("Engine is closed")]
    Closed,
}

impl TabularError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

/// Result type for engine operations.
pub type TabularResult<T> = Result<T, TabularError>;

/// How the first physical row is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderPolicy {
    /// Every row is data; without a mapping, columns follow the natural
    /// concept order of the structure.
    #[default]
    NoHeader,
    /// The first row names the concepts; the mapping is inferred from it
    /// when none is supplied.
    UseHeader,
    /// The first row is skipped; otherwise behaves like `NoHeader`.
    DisregardHeader,
}

/// Which carried values a hierarchical row clears before it is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CarryForward {
    /// A level-L row clears every concept mapped to level L or deeper.
    #[default]
    Cascade,
    /// A level-L row clears only the concepts mapped to level L.
    SameLevelOnly,
}

/// Configuration for reading a tabular file.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Physical format.
    pub codec: CodecOptions,
    /// Header handling.
    pub header: HeaderPolicy,
    /// Column mapping; inferred when absent.
    pub mapping: Option<ColumnMapping>,
    /// Report mandatory concepts missing from the mapping.
    pub strict: bool,
    /// Accept rows with more fields than the header or first row.
    pub allow_additional_columns: bool,
    /// Fail when the input has no data rows.
    pub error_if_empty_dataset: bool,
    /// Report data rows whose fields are all empty.
    pub error_if_empty_data_row: bool,
    /// Check header tokens against the supplied mapping.
    pub validate_header_order: bool,
    /// Expand explicit measures into one observation each.
    pub map_measures: bool,
    /// Expand cross-sectional measures into one observation each.
    pub map_cross_sectional_measures: bool,
    /// Sub-field separator for complex concepts without their own.
    pub subfield_separator: Option<String>,
    /// Hierarchical carry-forward mode.
    pub carry_forward: CarryForward,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            codec: CodecOptions::Delimited(DelimitedOptions::default()),
            header: HeaderPolicy::NoHeader,
            mapping: None,
            strict: false,
            allow_additional_columns: false,
            error_if_empty_dataset: false,
            error_if_empty_data_row: false,
            validate_header_order: false,
            map_measures: false,
            map_cross_sectional_measures: false,
            subfield_separator: None,
            carry_forward: CarryForward::Cascade,
        }
    }
}

impl ReaderConfig {
    /// Delimited input with the given single-byte delimiter.
    pub fn delimited(delimiter: u8) -> Self {
        Self {
            codec: CodecOptions::Delimited(DelimitedOptions {
                delimiter,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Fixed-width input; a mapping with character ranges is required.
    pub fn fixed_width(mapping: ColumnMapping) -> Self {
        Self {
            codec: CodecOptions::FixedWidth(FixedWidthOptions::default()),
            mapping: Some(mapping),
            ..Default::default()
        }
    }

    /// Hierarchical input with `levels` levels; a level-tagged mapping is
    /// required.
    pub fn hierarchical(levels: u32, mapping: ColumnMapping) -> Self {
        Self {
            codec: CodecOptions::Hierarchical(HierarchicalOptions {
                levels,
                ..Default::default()
            }),
            mapping: Some(mapping),
            ..Default::default()
        }
    }

    /// Sets the header policy.
    pub fn with_header(mut self, header: HeaderPolicy) -> Self {
        self.header = header;
        self
    }

    /// Sets the column mapping.
    pub fn with_mapping(mut self, mapping: ColumnMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Enables strict validation.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// Configuration for writing a tabular file.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Physical format.
    pub codec: CodecOptions,
    /// `UseHeader` and `DisregardHeader` both write a header row of concept ids.
    pub header: HeaderPolicy,
    /// Output column layout.
    pub mapping: ColumnMapping,
    /// Joins complex values that share one output field.
    pub subfield_separator: String,
    /// Observed maximum lengths for auto-sized fixed-width columns.
    pub widths: Option<FieldWidths>,
}

impl WriterConfig {
    /// Delimited output.
    pub fn delimited(delimiter: u8, mapping: ColumnMapping) -> Self {
        Self {
            codec: CodecOptions::Delimited(DelimitedOptions {
                delimiter,
                ..Default::default()
            }),
            header: HeaderPolicy::NoHeader,
            mapping,
            subfield_separator: "#".to_string(),
            widths: None,
        }
    }

    /// Fixed-width output.
    pub fn fixed_width(mapping: ColumnMapping) -> Self {
        Self {
            codec: CodecOptions::FixedWidth(FixedWidthOptions::default()),
            ..Self::delimited(b';', mapping)
        }
    }

    /// Hierarchical output with `levels` levels.
    pub fn hierarchical(levels: u32, mapping: ColumnMapping) -> Self {
        Self {
            codec: CodecOptions::Hierarchical(HierarchicalOptions {
                levels,
                ..Default::default()
            }),
            ..Self::delimited(b';', mapping)
        }
    }

    /// Sets the header policy.
    pub fn with_header(mut self, header: HeaderPolicy) -> Self {
        self.header = header;
        self
    }

    /// Supplies the auto-sizing table.
    pub fn with_widths(mut self, widths: FieldWidths) -> Self {
        self.widths = Some(widths);
        self
    }
}

/// Statistics from reading a tabular file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Data rows read (header excluded).
    pub rows_read: usize,
    /// Data rows skipped (empty or malformed level).
    pub rows_skipped: usize,
    /// Keyables handed to the caller.
    pub keyables: usize,
    /// Observations handed to the caller.
    pub observations: usize,
    /// Recoverable errors recorded.
    pub errors: usize,
}

/// Statistics from writing a tabular file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Physical rows written, header included.
    pub rows_written: usize,
    /// Observations accepted.
    pub observations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_config_default() {
        let config = ReaderConfig::default();
        assert_eq!(config.header, HeaderPolicy::NoHeader);
        assert!(!config.strict);
        assert!(!config.allow_additional_columns);
        assert_eq!(config.carry_forward, CarryForward::Cascade);
        assert!(matches!(config.codec, CodecOptions::Delimited(ref o) if o.delimiter == b';'));
    }

    #[test]
    fn test_reader_config_presets() {
        let config = ReaderConfig::delimited(b',')
            .with_header(HeaderPolicy::UseHeader)
            .strict();
        assert!(config.strict);
        assert!(matches!(config.codec, CodecOptions::Delimited(ref o) if o.delimiter == b','));

        let config = ReaderConfig::hierarchical(3, ColumnMapping::new());
        assert!(matches!(config.codec, CodecOptions::Hierarchical(ref o) if o.levels == 3));
        assert!(config.mapping.is_some());
    }

    #[test]
    fn test_writer_config_presets() {
        let config = WriterConfig::fixed_width(ColumnMapping::new());
        assert!(matches!(config.codec, CodecOptions::FixedWidth(_)));
        assert_eq!(config.subfield_separator, "#");
        assert!(config.widths.is_none());
    }

    #[test]
    fn test_error_display() {
        let err = TabularError::config("both measure modes enabled");
        assert_eq!(
            err.to_string(),
            "Configuration error: both measure modes enabled"
        );
    }
}
