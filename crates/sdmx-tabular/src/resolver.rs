//! Concept value resolution.
//!
//! The [`ConceptResolver`] turns one [`PhysicalRow`] into raw values for a
//! concept, following its [`MappingEntry`] and the complex flag the structure
//! declares for it.

use std::sync::Arc;

use sdmx_types::{ColumnMapping, ColumnRef, MappingEntry, MappingSource, StructureDescriptor};

use crate::codec::{FixedWidthLayout, PhysicalRow};
use crate::validation::{ErrorCode, Position, ValidationTracker};

/// How a [`ColumnRef`] selects a field of a row.
#[derive(Debug, Clone)]
pub enum ColumnLocator {
    /// The reference start is a 1-based field index.
    Positional,
    /// The reference is a character range; fields are ordered by the layout.
    Ranged(FixedWidthLayout),
}

/// Extracts concept values from physical rows.
#[derive(Debug, Clone)]
pub struct ConceptResolver {
    descriptor: Arc<StructureDescriptor>,
    mapping: ColumnMapping,
    locator: ColumnLocator,
    separator: Option<String>,
}

impl ConceptResolver {
    /// Creates a resolver. `separator` applies to complex concepts whose
    /// mapping entry has no separator of its own.
    pub fn new(
        descriptor: Arc<StructureDescriptor>,
        mapping: ColumnMapping,
        locator: ColumnLocator,
        separator: Option<String>,
    ) -> Self {
        Self {
            descriptor,
            mapping,
            locator,
            separator,
        }
    }

    /// The structure descriptor.
    pub fn descriptor(&self) -> &StructureDescriptor {
        &self.descriptor
    }

    /// The effective column mapping.
    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Resolves the raw values of `concept` from `row`.
    ///
    /// Returns no value for unmapped concepts and auto columns. A fixed
    /// literal yields its transcoded value. On hierarchical rows only the
    /// references owned by the row's level are read.
    ///
    /// A single reference yields the transcoded field, split on the
    /// separator if the concept is complex (each piece transcoded on its own).
    /// Several references yield one value per reference for a complex
    /// concept, or their concatenation otherwise.
    ///
    /// A reference past the end of the row is reported and contributes no
    /// value.
    pub fn resolve(&self, concept: &str, row: &PhysicalRow, tracker: &mut ValidationTracker) -> Vec<String> {
        let Some(entry) = self.mapping.get(concept) else {
            return Vec::new();
        };
        let refs: Vec<&ColumnRef> = match &entry.source {
            MappingSource::Fixed(value) => return vec![entry.transcode(value)],
            MappingSource::Auto => return Vec::new(),
            MappingSource::Columns(refs) => refs
                .iter()
                .filter(|c| row.level.is_none() || c.level == row.level)
                .collect(),
        };
        if refs.is_empty() {
            return Vec::new();
        }

        let complex = self.descriptor.is_complex(concept);
        let mut fields = Vec::with_capacity(refs.len());
        for column in &refs {
            if let Some(field) = self.field(concept, column, row, tracker) {
                fields.push(field);
            }
        }

        if refs.len() == 1 {
            let Some(value) = fields.pop() else {
                return Vec::new();
            };
            match self.separator_for(entry) {
                Some(separator) if complex => {
                    if value.is_empty() {
                        Vec::new()
                    } else {
                        value.split(separator).map(|v| entry.transcode(v)).collect()
                    }
                }
                _ => vec![entry.transcode(&value)],
            }
        } else if complex {
            fields.iter().map(|f| entry.transcode(f)).collect()
        } else {
            vec![entry.transcode(&fields.concat())]
        }
    }

    /// The mapping entries owned by `level`, fixed literals excluded.
    pub fn concepts_at_level(&self, level: u32) -> impl Iterator<Item = &str> + '_ {
        self.mapping
            .iter()
            .filter(move |(_, entry)| entry.level() == Some(level))
            .map(|(id, _)| id)
    }

    fn separator_for<'a>(&'a self, entry: &'a MappingEntry) -> Option<&'a str> {
        entry
            .separator
            .as_deref()
            .or(self.separator.as_deref())
            .filter(|s| !s.is_empty())
    }

    fn field(
        &self,
        concept: &str,
        column: &ColumnRef,
        row: &PhysicalRow,
        tracker: &mut ValidationTracker,
    ) -> Option<String> {
        let index = match &self.locator {
            ColumnLocator::Positional => column.start.checked_sub(1),
            ColumnLocator::Ranged(layout) => layout.position(column),
        };
        match index.and_then(|i| row.fields.get(i)) {
            Some(field) => Some(field.clone()),
            None => {
                tracker.report(
                    ErrorCode::ColumnOutOfRange,
                    format!(
                        "column {} of '{}' is beyond the {} fields of the row",
                        column,
                        concept,
                        row.fields.len()
                    ),
                    Position::cell(row, column.start),
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdmx_types::{Concept, TranscodingTable};

    fn row(fields: &[&str]) -> PhysicalRow {
        PhysicalRow::new(1, fields.iter().map(|f| f.to_string()).collect())
    }

    fn resolver(complex: bool, mapping: ColumnMapping) -> ConceptResolver {
        let mut measure = Concept::measure("MEASURE_1");
        if complex {
            measure = measure.complex();
        }
        let dsd = StructureDescriptor::new(vec![
            Concept::dimension("REF_AREA"),
            Concept::primary_measure("OBS_VALUE"),
            measure,
        ]);
        ConceptResolver::new(Arc::new(dsd), mapping, ColumnLocator::Positional, None)
    }

    #[test]
    fn test_complex_value_splits_on_separator() {
        let mapping = ColumnMapping::new().with(
            "MEASURE_1",
            MappingEntry::column(ColumnRef::index(2)).with_separator("#"),
        );
        let mut tracker = ValidationTracker::default();

        let complex = resolver(true, mapping.clone());
        assert_eq!(
            complex.resolve("MEASURE_1", &row(&["GR", "10#20"]), &mut tracker),
            vec!["10", "20"]
        );

        let plain = resolver(false, mapping);
        assert_eq!(
            plain.resolve("MEASURE_1", &row(&["GR", "10#20"]), &mut tracker),
            vec!["10#20"]
        );
        assert_eq!(tracker.error_count(), 0);
    }

    #[test]
    fn test_multiple_refs() {
        let mapping = ColumnMapping::new().with(
            "MEASURE_1",
            MappingEntry::columns(vec![ColumnRef::index(2), ColumnRef::index(3)]),
        );
        let mut tracker = ValidationTracker::default();
        let input = row(&["GR", "10", "20"]);

        assert_eq!(
            resolver(true, mapping.clone()).resolve("MEASURE_1", &input, &mut tracker),
            vec!["10", "20"]
        );
        assert_eq!(
            resolver(false, mapping).resolve("MEASURE_1", &input, &mut tracker),
            vec!["1020"]
        );
    }

    #[test]
    fn test_fixed_literal_and_transcoding() {
        let table = TranscodingTable::from_pairs([("Greece", "GR")]);
        let mapping = ColumnMapping::new()
            .with("REF_AREA", MappingEntry::column(ColumnRef::index(1)).with_transcoding(table.clone()))
            .with("OBS_VALUE", MappingEntry::fixed("Greece").with_transcoding(table));
        let resolver = resolver(false, mapping);
        let mut tracker = ValidationTracker::default();
        let input = row(&["Greece"]);

        assert_eq!(resolver.resolve("REF_AREA", &input, &mut tracker), vec!["GR"]);
        assert_eq!(resolver.resolve("OBS_VALUE", &input, &mut tracker), vec!["GR"]);
        assert!(resolver.resolve("MEASURE_1", &input, &mut tracker).is_empty());
    }

    #[test]
    fn test_complex_pieces_transcoded_individually() {
        let mapping = ColumnMapping::new().with(
            "MEASURE_1",
            MappingEntry::column(ColumnRef::index(1))
                .with_transcoding(TranscodingTable::from_pairs([("a", "A"), ("b", "B")])),
        );
        let dsd = StructureDescriptor::new(vec![Concept::measure("MEASURE_1").complex()]);
        let resolver =
            ConceptResolver::new(Arc::new(dsd), mapping, ColumnLocator::Positional, Some("|".into()));
        let mut tracker = ValidationTracker::default();
        assert_eq!(resolver.resolve("MEASURE_1", &row(&["a|b|c"]), &mut tracker), vec!["A", "B", "c"]);
        assert!(resolver.resolve("MEASURE_1", &row(&[""]), &mut tracker).is_empty());
    }

    #[test]
    fn test_column_out_of_range_is_reported() {
        let mapping = ColumnMapping::new()
            .with("REF_AREA", MappingEntry::column(ColumnRef::index(1)))
            .with("OBS_VALUE", MappingEntry::column(ColumnRef::index(4)));
        let resolver = resolver(false, mapping);
        let mut tracker = ValidationTracker::default();
        let input = row(&["GR", "5"]);

        assert!(resolver.resolve("OBS_VALUE", &input, &mut tracker).is_empty());
        assert_eq!(resolver.resolve("REF_AREA", &input, &mut tracker), vec!["GR"]);
        assert_eq!(tracker.error_count(), 1);
        let error = &tracker.errors()[0];
        assert_eq!(error.code, ErrorCode::ColumnOutOfRange);
        assert_eq!(error.position.column, Some(4));
    }

    #[test]
    fn test_hierarchical_rows_read_own_level() {
        let mapping = ColumnMapping::new()
            .with("REF_AREA", MappingEntry::column(ColumnRef::index(1).at_level(1)))
            .with("OBS_VALUE", MappingEntry::column(ColumnRef::index(2).at_level(2)));
        let resolver = resolver(false, mapping);
        let mut tracker = ValidationTracker::default();
        let level1 = row(&["GR"]).with_level(1);

        assert_eq!(resolver.resolve("REF_AREA", &level1, &mut tracker), vec!["GR"]);
        assert!(resolver.resolve("OBS_VALUE", &level1, &mut tracker).is_empty());
        assert_eq!(tracker.error_count(), 0);
        assert_eq!(resolver.concepts_at_level(2).collect::<Vec<_>>(), vec!["OBS_VALUE"]);
    }

    #[test]
    fn test_ranged_locator() {
        let mapping = ColumnMapping::new()
            .with("REF_AREA", MappingEntry::column(ColumnRef::range(1, 3)))
            .with("OBS_VALUE", MappingEntry::column(ColumnRef::range(4, 7)));
        let layout = FixedWidthLayout::from_mapping(&mapping);
        let dsd = StructureDescriptor::new(vec![
            Concept::dimension("REF_AREA"),
            Concept::primary_measure("OBS_VALUE"),
        ]);
        let resolver = ConceptResolver::new(Arc::new(dsd), mapping, ColumnLocator::Ranged(layout), None);
        let mut tracker = ValidationTracker::default();
        let input = row(&["MON", "1234"]);
        assert_eq!(resolver.resolve("OBS_VALUE", &input, &mut tracker), vec!["1234"]);
    }
}
