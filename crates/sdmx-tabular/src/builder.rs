//! Record assembly from resolved rows.
//!
//! [`RecordBuilder::begin_row`] resolves a row into a [`RowContext`]; the
//! `build_*` methods project that context onto dataset attributes, group and
//! series keyables and observations.

use std::collections::BTreeMap;

use sdmx_types::{
    well_known, AttachmentLevel, AttributeValue, Concept, DatasetAttributes, Keyable,
    Observation, SeriesTiming, StructureDescriptor, TimeFormat,
};

use crate::codec::PhysicalRow;
use crate::resolver::ConceptResolver;
use crate::types::CarryForward;
use crate::validation::ValidationTracker;

/// Resolved values of one row, carried values included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowContext {
    /// Physical row number.
    pub row: u64,
    /// Level of a hierarchical row.
    pub level: Option<u32>,
    /// Raw values keyed by concept id.
    pub values: BTreeMap<String, Vec<String>>,
}

impl RowContext {
    /// All values of a concept.
    pub fn values(&self, concept: &str) -> &[String] {
        self.values.get(concept).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first value of a concept, or `""`.
    pub fn value(&self, concept: &str) -> &str {
        self.values(concept).first().map(String::as_str).unwrap_or("")
    }

    /// All values of a concept concatenated.
    pub fn joined(&self, concept: &str) -> String {
        self.values(concept).concat()
    }

    /// Returns true if the concept has at least one non-empty value.
    pub fn is_populated(&self, concept: &str) -> bool {
        self.values(concept).iter().any(|v| !v.is_empty())
    }

    fn attribute(&self, concept: &Concept) -> Option<AttributeValue> {
        self.is_populated(&concept.id).then(|| AttributeValue {
            concept: concept.id.clone(),
            values: self.values(&concept.id).to_vec(),
        })
    }
}

/// Builds records from rows, carrying values across hierarchical levels.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    resolver: ConceptResolver,
    carried: BTreeMap<String, Vec<String>>,
    carry_forward: CarryForward,
    map_measures: bool,
    map_cross_sectional_measures: bool,
}

impl RecordBuilder {
    /// Creates a builder.
    pub fn new(
        resolver: ConceptResolver,
        carry_forward: CarryForward,
        map_measures: bool,
        map_cross_sectional_measures: bool,
    ) -> Self {
        Self {
            resolver,
            carried: BTreeMap::new(),
            carry_forward,
            map_measures,
            map_cross_sectional_measures,
        }
    }

    /// The resolver in use.
    pub fn resolver(&self) -> &ConceptResolver {
        &self.resolver
    }

    fn descriptor(&self) -> &StructureDescriptor {
        self.resolver.descriptor()
    }

    /// Resolves `row` and merges it into the carried state.
    ///
    /// A flat row replaces every value. A level-L row first clears the
    /// carried values of level L and every deeper level (or of level L only
    /// under [`CarryForward::SameLevelOnly`]), then supplies the concepts
    /// mapped to level L.
    pub fn begin_row(&mut self, row: &PhysicalRow, tracker: &mut ValidationTracker) -> RowContext {
        let concepts: Vec<String> = match row.level {
            Some(level) => {
                let mapping = self.resolver.mapping();
                let mode = self.carry_forward;
                self.carried.retain(|id, _| {
                    match mapping.get(id).and_then(|e| e.level()) {
                        Some(l) => match mode {
                            CarryForward::Cascade => l < level,
                            CarryForward::SameLevelOnly => l != level,
                        },
                        None => true,
                    }
                });
                mapping
                    .iter()
                    .filter(|(_, e)| e.fixed_value().is_some() || e.level() == Some(level))
                    .map(|(id, _)| id.to_string())
                    .collect()
            }
            None => {
                self.carried.clear();
                self.resolver
                    .mapping()
                    .iter()
                    .map(|(id, _)| id.to_string())
                    .collect()
            }
        };

        for id in concepts {
            let values = self.resolver.resolve(&id, row, tracker);
            self.carried.insert(id, values);
        }

        RowContext {
            row: row.number,
            level: row.level,
            values: self.carried.clone(),
        }
    }

    /// Projects the dataset-level attributes.
    pub fn build_dataset_attributes(&self, ctx: &RowContext) -> DatasetAttributes {
        DatasetAttributes {
            attributes: self
                .descriptor()
                .attributes_at(&AttachmentLevel::Dataset)
                .filter_map(|c| ctx.attribute(c))
                .collect(),
        }
    }

    /// Builds one keyable per group that has at least one attribute value.
    pub fn build_group_keyables(&self, ctx: &RowContext) -> Vec<Keyable> {
        let descriptor = self.descriptor();
        let mut keyables = Vec::new();
        for group in &descriptor.groups {
            let level = AttachmentLevel::Group(group.id.clone());
            let attributes: Vec<AttributeValue> = descriptor
                .attributes_at(&level)
                .filter_map(|c| ctx.attribute(c))
                .collect();
            if attributes.is_empty() {
                continue;
            }
            let mut keyable = Keyable::group(group.id.clone());
            for dimension in &group.dimensions {
                keyable.key.insert(dimension.clone(), ctx.joined(dimension));
            }
            keyable.attributes = attributes;
            keyables.push(keyable);
        }
        keyables
    }

    /// Builds the series keyable of a row.
    pub fn build_series_keyable(&self, ctx: &RowContext) -> Keyable {
        let descriptor = self.descriptor();
        let time_id = descriptor.time_dimension().map(|c| c.id.as_str());

        let timing = if descriptor.is_time_series() {
            let time_format = TimeFormat::from_frequency(ctx.value(well_known::FREQ))
                .or_else(|| time_id.and_then(|id| TimeFormat::classify(ctx.value(id))));
            SeriesTiming::TimeSeries { time_format }
        } else {
            SeriesTiming::CrossSectional {
                dimension: descriptor
                    .dimension_at_observation_id()
                    .unwrap_or_default()
                    .to_string(),
                time: time_id.map(|id| ctx.joined(id)).unwrap_or_default(),
            }
        };

        let mut keyable = Keyable::series(timing);
        for dimension in descriptor.series_dimensions() {
            keyable.key.insert(dimension.id.clone(), ctx.joined(&dimension.id));
        }
        keyable.attributes = descriptor
            .attributes_at(&AttachmentLevel::Series)
            .filter_map(|c| ctx.attribute(c))
            .collect();
        keyable
    }

    /// Builds the observations of a row.
    ///
    /// In cross-sectional measure mode each populated cross-sectional
    /// measure yields an observation at its declared code; in measure mode
    /// each populated measure yields one at its id. Otherwise the primary
    /// measure yields one observation at the time value, or at the value of
    /// the dimension at observation for cross-sectional data. A row with no
    /// value and no observation attribute yields nothing.
    pub fn build_observations(&self, ctx: &RowContext, keyable: &Keyable) -> Vec<Observation> {
        let descriptor = self.descriptor();
        let attributes: Vec<AttributeValue> = descriptor
            .attributes_at(&AttachmentLevel::Observation)
            .filter_map(|c| ctx.attribute(c))
            .collect();
        let time = match &keyable.timing {
            Some(SeriesTiming::CrossSectional { time, .. }) => time.clone(),
            _ => descriptor
                .time_dimension()
                .map(|c| ctx.joined(&c.id))
                .unwrap_or_default(),
        };

        if self.map_cross_sectional_measures {
            let measures: Vec<&Concept> = descriptor
                .cross_sectional_measures()
                .filter(|m| ctx.is_populated(&m.id))
                .collect();
            if !measures.is_empty() {
                return measures
                    .into_iter()
                    .map(|m| measure_observation(ctx, m, m.code_or_id(), &time, &attributes))
                    .collect();
            }
        }

        if self.map_measures {
            let measures: Vec<&Concept> = descriptor
                .measures()
                .filter(|m| ctx.is_populated(&m.id))
                .collect();
            if !measures.is_empty() {
                return measures
                    .into_iter()
                    .map(|m| measure_observation(ctx, m, &m.id, &time, &attributes))
                    .collect();
            }
        }

        let value = descriptor
            .primary_measure()
            .map(|c| ctx.value(&c.id).to_string())
            .unwrap_or_default();
        if value.is_empty() && attributes.is_empty() {
            return Vec::new();
        }
        let coordinate = if descriptor.is_time_series() {
            time.clone()
        } else {
            descriptor
                .dimension_at_observation_id()
                .map(|id| ctx.joined(id))
                .unwrap_or_default()
        };

        vec![Observation {
            time,
            coordinate,
            value,
            measure: None,
            attributes,
        }]
    }
}

fn measure_observation(
    ctx: &RowContext,
    measure: &Concept,
    coordinate: &str,
    time: &str,
    attributes: &[AttributeValue],
) -> Observation {
    Observation {
        time: time.to_string(),
        coordinate: coordinate.to_string(),
        value: ctx.value(&measure.id).to_string(),
        measure: Some(measure.id.clone()),
        attributes: attributes.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ColumnLocator;
    use sdmx_types::{ColumnMapping, ColumnRef, DimensionAtObservation, GroupDescriptor, MappingEntry};
    use std::sync::Arc;

    fn row(number: u64, fields: &[&str]) -> PhysicalRow {
        PhysicalRow::new(number, fields.iter().map(|f| f.to_string()).collect())
    }

    fn builder(dsd: StructureDescriptor, mapping: ColumnMapping) -> RecordBuilder {
        let resolver = ConceptResolver::new(Arc::new(dsd), mapping, ColumnLocator::Positional, None);
        RecordBuilder::new(resolver, CarryForward::Cascade, false, false)
    }

    fn positional(ids: &[&str]) -> ColumnMapping {
        let mut mapping = ColumnMapping::new();
        for (i, id) in ids.iter().enumerate() {
            mapping.insert(*id, MappingEntry::column(ColumnRef::index(i + 1)));
        }
        mapping
    }

    fn time_series() -> StructureDescriptor {
        StructureDescriptor::new(vec![
            Concept::dimension("FREQ"),
            Concept::dimension("REF_AREA"),
            Concept::time_dimension("TIME_PERIOD"),
            Concept::primary_measure("OBS_VALUE"),
            Concept::attribute("COLLECTION", AttachmentLevel::Dataset),
            Concept::attribute("TITLE", AttachmentLevel::Group("SIBLING".into())),
            Concept::attribute("UNIT", AttachmentLevel::Series),
            Concept::attribute("OBS_STATUS", AttachmentLevel::Observation),
        ])
        .with_group(GroupDescriptor::new("SIBLING", ["REF_AREA"]))
    }

    #[test]
    fn test_time_series_row() {
        let mut builder = builder(
            time_series(),
            positional(&[
                "FREQ", "REF_AREA", "TIME_PERIOD", "OBS_VALUE", "COLLECTION", "TITLE", "UNIT",
                "OBS_STATUS",
            ]),
        );
        let mut tracker = ValidationTracker::default();
        let ctx = builder.begin_row(&row(1, &["Q", "GR", "2005-Q1", "7", "A", "Greece", "PC", "P"]), &mut tracker);

        let dataset = builder.build_dataset_attributes(&ctx);
        assert_eq!(dataset.get("COLLECTION").map(|a| a.first()), Some("A"));

        let groups = builder.build_group_keyables(&ctx);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group.as_deref(), Some("SIBLING"));
        assert_eq!(groups[0].key.len(), 1);
        assert_eq!(groups[0].key_value("REF_AREA"), Some("GR"));

        let series = builder.build_series_keyable(&ctx);
        assert_eq!(series.key_value("FREQ"), Some("Q"));
        assert_eq!(series.key_value("TIME_PERIOD"), None);
        assert_eq!(series.attribute("UNIT").map(|a| a.first()), Some("PC"));
        assert_eq!(
            series.timing,
            Some(SeriesTiming::TimeSeries {
                time_format: Some(TimeFormat::Quarterly)
            })
        );

        let observations = builder.build_observations(&ctx, &series);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].time, "2005-Q1");
        assert_eq!(observations[0].coordinate, "2005-Q1");
        assert_eq!(observations[0].value, "7");
        assert_eq!(observations[0].attribute("OBS_STATUS").map(|a| a.first()), Some("P"));
    }

    #[test]
    fn test_group_skipped_without_attributes() {
        let mut builder = builder(time_series(), positional(&["FREQ", "REF_AREA", "TIME_PERIOD", "OBS_VALUE"]));
        let mut tracker = ValidationTracker::default();
        let ctx = builder.begin_row(&row(1, &["A", "GR", "2005", "1"]), &mut tracker);
        assert!(builder.build_group_keyables(&ctx).is_empty());
        assert!(builder.build_dataset_attributes(&ctx).is_empty());
    }

    #[test]
    fn test_empty_row_yields_no_observation() {
        let mut builder = builder(time_series(), positional(&["FREQ", "REF_AREA", "TIME_PERIOD", "OBS_VALUE"]));
        let mut tracker = ValidationTracker::default();
        let ctx = builder.begin_row(&row(1, &["A", "GR", "2005", ""]), &mut tracker);
        let series = builder.build_series_keyable(&ctx);
        assert!(builder.build_observations(&ctx, &series).is_empty());
    }

    #[test]
    fn test_cross_sectional_coordinate() {
        let dsd = StructureDescriptor::new(vec![
            Concept::dimension("REF_AREA"),
            Concept::dimension("SEX"),
            Concept::time_dimension("TIME_PERIOD"),
            Concept::primary_measure("OBS_VALUE"),
        ])
        .with_dimension_at_observation(DimensionAtObservation::Dimension("SEX".into()));
        let mut builder = builder(dsd, positional(&["REF_AREA", "SEX", "TIME_PERIOD", "OBS_VALUE"]));
        let mut tracker = ValidationTracker::default();
        let ctx = builder.begin_row(&row(1, &["GR", "F", "2005", "12"]), &mut tracker);

        let series = builder.build_series_keyable(&ctx);
        assert_eq!(series.key_value("SEX"), None);
        assert_eq!(
            series.timing,
            Some(SeriesTiming::CrossSectional {
                dimension: "SEX".into(),
                time: "2005".into()
            })
        );
        let observations = builder.build_observations(&ctx, &series);
        assert_eq!(observations[0].coordinate, "F");
        assert_eq!(observations[0].time, "2005");
    }

    #[test]
    fn test_measure_modes() {
        let dsd = StructureDescriptor::new(vec![
            Concept::dimension("REF_AREA"),
            Concept::time_dimension("TIME_PERIOD"),
            Concept::primary_measure("OBS_VALUE"),
            Concept::measure("POP"),
            Concept::measure("AREA"),
            Concept::cross_sectional_measure("XS_M", "M"),
            Concept::cross_sectional_measure("XS_F", "F"),
        ]);
        let mapping = positional(&["REF_AREA", "TIME_PERIOD", "POP", "AREA", "XS_M", "XS_F"]);
        let input = row(1, &["GR", "2005", "11", "", "5", "6"]);
        let mut tracker = ValidationTracker::default();

        let resolver = ConceptResolver::new(Arc::new(dsd), mapping, ColumnLocator::Positional, None);
        let mut measures = RecordBuilder::new(resolver.clone(), CarryForward::Cascade, true, false);
        let ctx = measures.begin_row(&input, &mut tracker);
        let series = measures.build_series_keyable(&ctx);
        let observations = measures.build_observations(&ctx, &series);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].coordinate, "POP");
        assert_eq!(observations[0].measure.as_deref(), Some("POP"));

        let mut xs = RecordBuilder::new(resolver, CarryForward::Cascade, false, true);
        let ctx = xs.begin_row(&input, &mut tracker);
        let series = xs.build_series_keyable(&ctx);
        let observations = xs.build_observations(&ctx, &series);
        let coordinates: Vec<&str> = observations.iter().map(|o| o.coordinate.as_str()).collect();
        assert_eq!(coordinates, vec!["M", "F"]);
        assert_eq!(observations[1].value, "6");
    }

    fn hierarchical_mapping() -> ColumnMapping {
        ColumnMapping::new()
            .with("REF_AREA", MappingEntry::column(ColumnRef::index(1).at_level(1)))
            .with("SEX", MappingEntry::column(ColumnRef::index(1).at_level(2)))
            .with("TIME_PERIOD", MappingEntry::column(ColumnRef::index(1).at_level(3)))
            .with("OBS_VALUE", MappingEntry::column(ColumnRef::index(2).at_level(3)))
            .with("FREQ", MappingEntry::fixed("A"))
    }

    fn three_levels() -> StructureDescriptor {
        StructureDescriptor::new(vec![
            Concept::dimension("FREQ"),
            Concept::dimension("REF_AREA"),
            Concept::dimension("SEX"),
            Concept::time_dimension("TIME_PERIOD"),
            Concept::primary_measure("OBS_VALUE"),
        ])
    }

    #[test]
    fn test_cascade_clears_deeper_levels() {
        let mut builder = builder(three_levels(), hierarchical_mapping());
        let mut tracker = ValidationTracker::default();
        builder.begin_row(&row(1, &["GR"]).with_level(1), &mut tracker);
        builder.begin_row(&row(2, &["F"]).with_level(2), &mut tracker);
        builder.begin_row(&row(3, &["2005", "1"]).with_level(3), &mut tracker);
        let ctx = builder.begin_row(&row(4, &["FR"]).with_level(1), &mut tracker);

        assert_eq!(ctx.value("REF_AREA"), "FR");
        assert_eq!(ctx.value("SEX"), "");
        assert_eq!(ctx.value("OBS_VALUE"), "");
        assert_eq!(ctx.value("FREQ"), "A");
    }

    #[test]
    fn test_same_level_only_keeps_deeper_levels() {
        let resolver = ConceptResolver::new(
            Arc::new(three_levels()),
            hierarchical_mapping(),
            ColumnLocator::Positional,
            None,
        );
        let mut builder = RecordBuilder::new(resolver, CarryForward::SameLevelOnly, false, false);
        let mut tracker = ValidationTracker::default();
        builder.begin_row(&row(1, &["GR"]).with_level(1), &mut tracker);
        builder.begin_row(&row(2, &["F"]).with_level(2), &mut tracker);
        let ctx = builder.begin_row(&row(3, &["FR"]).with_level(1), &mut tracker);

        assert_eq!(ctx.value("REF_AREA"), "FR");
        assert_eq!(ctx.value("SEX"), "F");
    }
}
