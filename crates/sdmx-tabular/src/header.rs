//! Mapping construction and header checks.
//!
//! Without an explicit mapping the reader either infers one from header
//! tokens or falls back to the natural concept order of the structure.

use sdmx_types::{ColumnMapping, ColumnRef, MappingEntry, MappingSource, StructureDescriptor};
use tracing::debug;

use crate::codec::PhysicalRow;
use crate::validation::{ErrorCode, Position, ValidationTracker};

/// Maps the concepts in natural order to columns `1..=n`.
pub fn positional_mapping(descriptor: &StructureDescriptor) -> ColumnMapping {
    let mut mapping = ColumnMapping::new();
    for (i, id) in descriptor.natural_order().into_iter().enumerate() {
        mapping.insert(id, MappingEntry::column(ColumnRef::index(i + 1)));
    }
    mapping
}

/// Infers a mapping from header tokens.
///
/// A token naming a concept maps that concept to its column. A token
/// `<ID>_<n>` whose `<ID>` is a complex concept adds its column to that
/// concept, in column order. Any other token is reported once as an unknown
/// concept and ignored.
pub fn infer_mapping(
    descriptor: &StructureDescriptor,
    header: &PhysicalRow,
    tracker: &mut ValidationTracker,
) -> ColumnMapping {
    let mut mapping = ColumnMapping::new();

    for (i, token) in header.fields.iter().enumerate() {
        let token = token.trim();
        let column = ColumnRef::index(i + 1);

        if descriptor.concept(token).is_some() {
            mapping.insert(token, MappingEntry::column(column));
            continue;
        }

        let complex_base = token
            .rsplit_once('_')
            .filter(|(base, n)| n.parse::<usize>().is_ok() && descriptor.is_complex(base))
            .map(|(base, _)| base);

        match complex_base {
            Some(base) => match mapping.get_mut(base) {
                Some(entry) => {
                    if let MappingSource::Columns(columns) = &mut entry.source {
                        columns.push(column);
                    }
                }
                None => {
                    mapping.insert(base, MappingEntry::column(column).repeatable());
                }
            },
            None => {
                tracker.report_once(
                    ErrorCode::UnknownConcept,
                    token,
                    format!("header token '{}' is not a concept of the structure", token),
                    Position::cell(header, i + 1),
                );
            }
        }
    }

    debug!(columns = header.fields.len(), concepts = mapping.len(), "Inferred mapping from header");
    mapping
}

/// Reports every header token that disagrees with the mapping.
///
/// A concept spread over several columns expects `<ID>_<k>` at its k-th
/// column, any other concept its own id.
pub fn check_header_order(mapping: &ColumnMapping, header: &PhysicalRow, tracker: &mut ValidationTracker) {
    for (id, entry) in mapping.iter() {
        let columns = entry.column_refs();
        for (k, column) in columns.iter().enumerate() {
            let expected = if columns.len() > 1 {
                format!("{}_{}", id, k + 1)
            } else {
                id.to_string()
            };
            let found = column
                .start
                .checked_sub(1)
                .and_then(|i| header.fields.get(i))
                .map(|t| t.trim())
                .unwrap_or("");
            if found != expected {
                tracker.report(
                    ErrorCode::HeaderMismatch,
                    format!("expected header '{}', found '{}'", expected, found),
                    Position::cell(header, column.start),
                );
            }
        }
    }
}

/// Reports, once each, mapped concepts the structure does not define.
pub fn check_mapped_concepts(
    descriptor: &StructureDescriptor,
    mapping: &ColumnMapping,
    tracker: &mut ValidationTracker,
) {
    for (id, _) in mapping.iter() {
        if descriptor.concept(id).is_none() {
            tracker.report_once(
                ErrorCode::UnknownConcept,
                id,
                format!("mapped concept '{}' is not part of the structure", id),
                Position::dataset(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdmx_types::{AttachmentLevel, Concept};

    fn descriptor() -> StructureDescriptor {
        StructureDescriptor::new(vec![
            Concept::attribute("OBS_STATUS", AttachmentLevel::Observation),
            Concept::dimension("REF_AREA"),
            Concept::time_dimension("TIME_PERIOD"),
            Concept::primary_measure("OBS_VALUE"),
            Concept::attribute("OBS_NOTE", AttachmentLevel::Observation).complex(),
        ])
    }

    fn header(tokens: &[&str]) -> PhysicalRow {
        PhysicalRow::new(1, tokens.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_positional_mapping_follows_natural_order() {
        let mapping = positional_mapping(&descriptor());
        let column = |id: &str| mapping.get(id).map(|e| e.column_refs()[0].start);
        assert_eq!(column("REF_AREA"), Some(1));
        assert_eq!(column("TIME_PERIOD"), Some(2));
        assert_eq!(column("OBS_VALUE"), Some(3));
        assert_eq!(column("OBS_STATUS"), Some(4));
        assert_eq!(column("OBS_NOTE"), Some(5));
    }

    #[test]
    fn test_infer_exact_and_suffixed_tokens() {
        let mut tracker = ValidationTracker::default();
        let mapping = infer_mapping(
            &descriptor(),
            &header(&["TIME_PERIOD", "REF_AREA", "OBS_VALUE", "OBS_NOTE_1", "OBS_NOTE_2"]),
            &mut tracker,
        );
        assert_eq!(tracker.error_count(), 0);
        assert_eq!(mapping.get("REF_AREA").map(|e| e.column_refs()[0].start), Some(2));
        let note = mapping.get("OBS_NOTE").unwrap();
        assert!(note.repeatable);
        assert_eq!(note.column_refs(), &[ColumnRef::index(4), ColumnRef::index(5)]);
    }

    #[test]
    fn test_infer_reports_unknown_token_once() {
        let mut tracker = ValidationTracker::default();
        let mapping = infer_mapping(
            &descriptor(),
            &header(&["REF_AREA", "COMMENT", "REF_AREA_1", "COMMENT"]),
            &mut tracker,
        );
        assert_eq!(mapping.len(), 1);
        assert_eq!(tracker.error_count(), 2);
        assert!(tracker
            .errors()
            .iter()
            .all(|e| e.code == ErrorCode::UnknownConcept));
        assert_eq!(tracker.errors()[0].position.column, Some(2));
    }

    #[test]
    fn test_header_order_mismatch() {
        let mapping = ColumnMapping::new()
            .with("REF_AREA", MappingEntry::column(ColumnRef::index(1)))
            .with("OBS_VALUE", MappingEntry::column(ColumnRef::index(2)))
            .with(
                "OBS_NOTE",
                MappingEntry::columns(vec![ColumnRef::index(3), ColumnRef::index(4)]),
            );
        let mut tracker = ValidationTracker::default();
        check_header_order(
            &mapping,
            &header(&["REF_AREA", "OBS_VALUE", "OBS_NOTE_1", "OBS_NOTE_2"]),
            &mut tracker,
        );
        assert_eq!(tracker.error_count(), 0);

        check_header_order(&mapping, &header(&["OBS_VALUE", "REF_AREA"]), &mut tracker);
        let codes: Vec<_> = tracker.errors().iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![ErrorCode::HeaderMismatch; 4]);
    }

    #[test]
    fn test_unmapped_structure_concept_reported() {
        let mapping = ColumnMapping::new()
            .with("REF_AREA", MappingEntry::column(ColumnRef::index(1)))
            .with("UNKNOWN", MappingEntry::fixed("x"));
        let mut tracker = ValidationTracker::default();
        check_mapped_concepts(&descriptor(), &mapping, &mut tracker);
        check_mapped_concepts(&descriptor(), &mapping, &mut tracker);
        assert_eq!(tracker.error_count(), 1);
        assert_eq!(tracker.errors()[0].position, Position::dataset());
    }
}
