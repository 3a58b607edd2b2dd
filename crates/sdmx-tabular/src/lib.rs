//! # sdmx-tabular
//!
//! Streaming conversion between tabular text and SDMX datasets.
//!
//! Input and output can be delimited, fixed-width or multi-level
//! ("hierarchical") text. A [`ColumnMapping`](sdmx_types::ColumnMapping) ties
//! each concept of a [`StructureDescriptor`](sdmx_types::StructureDescriptor)
//! to physical columns, fixed literals or auto-placed columns.
//!
//! - [`ReaderEngine`] pulls dataset attributes, keyables and observations
//!   from a stream, recording recoverable problems as [`ValidationError`]s
//! - [`WriterEngine`] serializes the same events back to text
//!
//! ## Features
//!
//! - `parallel` (default): Enables [`FieldWidths::measure_parallel`] via rayon.
//!
//! ## Usage
//!
//! ```rust
//! use std::io::Cursor;
//! use std::sync::Arc;
//!
//! use sdmx_tabular::{ReaderConfig, ReaderEngine, WriterConfig, WriterEngine};
//! use sdmx_types::{ColumnMapping, ColumnRef, Concept, MappingEntry, StructureDescriptor};
//!
//! let dsd = Arc::new(StructureDescriptor::new(vec![
//!     Concept::dimension("REF_AREA"),
//!     Concept::time_dimension("TIME_PERIOD"),
//!     Concept::primary_measure("OBS_VALUE"),
//! ]));
//!
//! let input = Cursor::new("GR;2005;1\nFR;2005;2\n");
//! let mut reader = ReaderEngine::new(input, dsd.clone(), ReaderConfig::default())?;
//! let events = reader.read_all()?;
//!
//! let mapping = ColumnMapping::new()
//!     .with("TIME_PERIOD", MappingEntry::column(ColumnRef::index(1)))
//!     .with("REF_AREA", MappingEntry::column(ColumnRef::index(2)))
//!     .with("OBS_VALUE", MappingEntry::column(ColumnRef::index(3)));
//! let mut writer = WriterEngine::new(Vec::new(), dsd, WriterConfig::delimited(b',', mapping))?;
//! writer.write_all(&events)?;
//! let (output, _) = writer.close()?;
//!
//! assert_eq!(String::from_utf8(output).unwrap(), "2005,GR,1\n2005,FR,2\n");
//! # Ok::<(), sdmx_tabular::TabularError>(())
//! ```

#![warn(missing_docs)]

mod builder;
pub mod codec;
mod header;
mod reader;
mod resolver;
mod types;
mod validation;
mod writer;

// Re-export sdmx-types for convenience
pub use sdmx_types;

pub use builder::{RecordBuilder, RowContext};
pub use header::{check_header_order, infer_mapping, positional_mapping};
pub use reader::ReaderEngine;
pub use resolver::{ColumnLocator, ConceptResolver};
pub use types::{
    CarryForward, HeaderPolicy, ReadStats, ReaderConfig, TabularError, TabularResult, WriteStats,
    WriterConfig,
};
pub use validation::{ErrorCode, ErrorKind, Position, Severity, ValidationError, ValidationTracker};
pub use writer::{event_values, FieldWidths, ValueMap, WriteLevel, WriterEngine};

#[cfg(test)]
mod tests {
    use super::*;
    use sdmx_types::{
        AttachmentLevel, ColumnMapping, ColumnRef, Concept, DatasetEvent, MappingEntry,
        StructureDescriptor,
    };
    use std::io::Cursor;
    use std::sync::Arc;

    fn descriptor() -> Arc<StructureDescriptor> {
        Arc::new(StructureDescriptor::new(vec![
            Concept::dimension("FREQ"),
            Concept::dimension("REF_AREA"),
            Concept::time_dimension("TIME_PERIOD"),
            Concept::primary_measure("OBS_VALUE"),
            Concept::attribute("OBS_STATUS", AttachmentLevel::Observation),
            Concept::attribute("UNIT_MULT", AttachmentLevel::Dataset),
        ]))
    }

    #[test]
    fn test_events_survive_json_interchange() {
        let input = "A;GR;2005;23871;P;3\nA;GR;2006;24012;;3\nQ;FR;2005-Q1;7;E;3\n";
        let mut reader = ReaderEngine::new(Cursor::new(input), descriptor(), ReaderConfig::default()).unwrap();
        let events = reader.read_all().unwrap();
        assert_eq!(reader.error_count(), 0);

        let json = serde_json::to_string(&events).unwrap();
        let parsed: Vec<DatasetEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, events);

        let mapping = ColumnMapping::new()
            .with("FREQ", MappingEntry::column(ColumnRef::range(1, 1)))
            .with("REF_AREA", MappingEntry::column(ColumnRef::range(2, 3)))
            .with("TIME_PERIOD", MappingEntry::column(ColumnRef::range(4, 10)))
            .with("OBS_VALUE", MappingEntry::column(ColumnRef::range(11, 16)))
            .with("OBS_STATUS", MappingEntry::column(ColumnRef::range(17, 17)))
            .with("UNIT_MULT", MappingEntry::column(ColumnRef::range(18, 18)));
        let mut writer =
            WriterEngine::new(Vec::new(), descriptor(), WriterConfig::fixed_width(mapping.clone())).unwrap();
        writer.write_all(&parsed).unwrap();
        let (output, stats) = writer.close().unwrap();
        assert_eq!(stats.observations, 3);

        let config = ReaderConfig::fixed_width(mapping);
        let mut reread = ReaderEngine::new(Cursor::new(output), descriptor(), config).unwrap();
        assert_eq!(reread.read_all().unwrap(), events);
        assert_eq!(reread.error_count(), 0);
    }

    #[test]
    fn test_error_codes_exported() {
        assert_eq!(ErrorCode::ColumnOutOfRange.kind(), ErrorKind::Structural);
        assert_eq!(WriteLevel::Group("SIBLING".into()), WriteLevel::Group("SIBLING".into()));
    }
}
