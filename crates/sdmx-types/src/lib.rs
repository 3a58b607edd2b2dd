//! # sdmx-types
//!
//! Data model shared by the tabular SDMX readers and writers.
//!
//! This crate defines the minimal structure descriptor the conversion engine
//! consumes, the column mapping that ties concepts to physical columns, and
//! the records (dataset attributes, keyables, observations) the engine
//! produces and consumes.
//!
//! ## Features
//!
//! - `serde` (default): Enables serialization/deserialization support via serde.
//!   Disable this feature for zero-dependency usage.
//!
//! ## Usage
//!
//! ```rust
//! use sdmx_types::{AttachmentLevel, ColumnMapping, ColumnRef, Concept, MappingEntry};
//! use sdmx_types::{StructureDescriptor, well_known};
//!
//! let dsd = StructureDescriptor::new(vec![
//!     Concept::dimension(well_known::REF_AREA),
//!     Concept::time_dimension(well_known::TIME_PERIOD),
//!     Concept::primary_measure(well_known::OBS_VALUE),
//!     Concept::attribute(well_known::OBS_STATUS, AttachmentLevel::Observation),
//! ]);
//!
//! let mapping = ColumnMapping::new()
//!     .with(well_known::REF_AREA, MappingEntry::column(ColumnRef::index(1)))
//!     .with(well_known::TIME_PERIOD, MappingEntry::column(ColumnRef::index(2)))
//!     .with(well_known::OBS_VALUE, MappingEntry::column(ColumnRef::index(3)));
//!
//! assert!(dsd.validate().is_ok());
//! assert!(!mapping.contains(well_known::OBS_STATUS));
//! ```

#![warn(missing_docs)]

mod concept;
mod mapping;
mod record;
mod structure;
mod time_format;
pub mod well_known;

// Re-export all public types at crate root
pub use concept::{AttachmentLevel, Concept, ConceptRole};
pub use mapping::{ColumnMapping, ColumnRef, MappingEntry, MappingSource, TranscodingTable};
pub use record::{
    AttributeValue, DatasetAttributes, DatasetEvent, Keyable, Observation, SeriesTiming,
};
pub use structure::{
    DimensionAtObservation, GroupDescriptor, StructureDescriptor, StructureError,
};
pub use time_format::TimeFormat;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_types_are_exported() {
        // Verify all types are accessible from crate root
        let _level = AttachmentLevel::Series;
        let _role = ConceptRole::PrimaryMeasure;
        let _source = MappingSource::Auto;
        let _rule = DimensionAtObservation::Time;
        let _format = TimeFormat::Annual;
    }

    #[test]
    fn test_well_known_accessible() {
        assert_eq!(well_known::OBS_VALUE, "OBS_VALUE");
        assert_eq!(well_known::TIME_FORMAT, "TIME_FORMAT");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let dsd = StructureDescriptor::new(vec![
            Concept::dimension("FREQ"),
            Concept::time_dimension("TIME_PERIOD"),
            Concept::primary_measure("OBS_VALUE").complex(),
        ])
        .with_group(GroupDescriptor::new("SIBLING", ["FREQ"]));

        let json = serde_json::to_string(&dsd).unwrap();
        let parsed: StructureDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(dsd, parsed);
    }
}
