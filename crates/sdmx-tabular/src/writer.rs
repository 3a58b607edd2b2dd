//! Writer engine and fixed-width auto-sizing.
//!
//! The [`WriterEngine`] consumes concept-value snapshots (dataset, group and
//! series values that stay in effect, plus one snapshot per observation) and
//! serializes them through a codec with an output [`ColumnMapping`].
//!
//! Output mappings may use fixed literals and auto columns. Both are given
//! concrete columns after the highest explicit column; see
//! [`WriterEngine::layout_mapping`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use sdmx_types::{
    AttachmentLevel, ColumnMapping, ColumnRef, DatasetAttributes, DatasetEvent, Keyable,
    MappingEntry, MappingSource, Observation, SeriesTiming, StructureDescriptor,
};
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::codec::{CodecOptions, Encoder, FixedWidthLayout, PhysicalRow, RowEncoder};
use crate::types::{HeaderPolicy, TabularError, TabularResult, WriteStats, WriterConfig};

/// Raw values keyed by concept id.
pub type ValueMap = BTreeMap<String, Vec<String>>;

/// Scope of a snapshot handed to [`WriterEngine::write_values`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteLevel {
    /// Dataset attributes; stay in effect until replaced.
    Dataset,
    /// A group key and its attributes.
    Group(String),
    /// A series key and its attributes; replaces the previous series.
    Series,
    /// One observation; produces output.
    Observation,
}

/// Maximum observed value length per concept, for auto-sized fixed-width
/// columns.
///
/// # Examples
///
/// ```
/// use sdmx_tabular::FieldWidths;
///
/// let mut widths = FieldWidths::new();
/// widths.record("OBS_VALUE", 3);
/// widths.record("OBS_VALUE", 5);
/// assert_eq!(widths.get("OBS_VALUE"), Some(5));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldWidths {
    widths: BTreeMap<String, usize>,
}

impl FieldWidths {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observed length.
    pub fn record(&mut self, concept: &str, length: usize) {
        let width = self.widths.entry(concept.to_string()).or_insert(0);
        *width = (*width).max(length);
    }

    /// The widest length seen for `concept`.
    pub fn get(&self, concept: &str) -> Option<usize> {
        self.widths.get(concept).copied()
    }

    /// Measures the values `events` would write under `mapping`.
    pub fn measure(
        descriptor: &StructureDescriptor,
        mapping: &ColumnMapping,
        events: &[DatasetEvent],
        separator: &str,
    ) -> Self {
        let mut widths = Self::new();
        for event in events {
            let (_, values) = event_values(descriptor, event);
            widths.observe(mapping, &values, separator);
        }
        widths
    }

    /// Measures events in parallel.
    ///
    /// Produces the same table as [`FieldWidths::measure`].
    #[cfg(feature = "parallel")]
    pub fn measure_parallel(
        descriptor: &StructureDescriptor,
        mapping: &ColumnMapping,
        events: &[DatasetEvent],
        separator: &str,
    ) -> Self {
        events
            .par_iter()
            .map(|event| {
                let (_, values) = event_values(descriptor, event);
                let mut widths = Self::new();
                widths.observe(mapping, &values, separator);
                widths
            })
            .reduce(Self::new, Self::merge)
    }

    fn observe(&mut self, mapping: &ColumnMapping, values: &ValueMap, separator: &str) {
        for (id, list) in values {
            let (written, separator) = match mapping.get(id) {
                Some(entry) => (
                    list.iter().map(|v| entry.untranscode(v)).collect::<Vec<_>>(),
                    entry.separator.as_deref().unwrap_or(separator),
                ),
                None => (list.clone(), separator),
            };
            self.record(id, written.join(separator).chars().count());
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for (id, width) in other.widths {
            self.record(&id, width);
        }
        self
    }
}

/// Converts a dataset event into the snapshot the writer consumes.
///
/// An observation maps its value to its measure (or the primary measure),
/// and its time and coordinate back to the time dimension and the
/// dimension at observation.
pub fn event_values(
    descriptor: &StructureDescriptor,
    event: &DatasetEvent,
) -> (WriteLevel, ValueMap) {
    match event {
        DatasetEvent::DatasetAttributes(attributes) => (WriteLevel::Dataset, dataset_values(attributes)),
        DatasetEvent::Keyable(keyable) => keyable_values(descriptor, keyable),
        DatasetEvent::Observation(observation) => {
            (WriteLevel::Observation, observation_values(descriptor, observation))
        }
    }
}

fn dataset_values(attributes: &DatasetAttributes) -> ValueMap {
    attributes
        .attributes
        .iter()
        .map(|a| (a.concept.clone(), a.values.clone()))
        .collect()
}

fn keyable_values(descriptor: &StructureDescriptor, keyable: &Keyable) -> (WriteLevel, ValueMap) {
    let mut values: ValueMap = keyable
        .key
        .iter()
        .map(|(id, value)| (id.clone(), vec![value.clone()]))
        .collect();
    values.extend(
        keyable
            .attributes
            .iter()
            .map(|a| (a.concept.clone(), a.values.clone())),
    );

    if let (Some(SeriesTiming::CrossSectional { time, .. }), Some(dimension)) =
        (&keyable.timing, descriptor.time_dimension())
    {
        if !time.is_empty() {
            values.insert(dimension.id.clone(), vec![time.clone()]);
        }
    }

    let level = match &keyable.group {
        Some(group) => WriteLevel::Group(group.clone()),
        None => WriteLevel::Series,
    };
    (level, values)
}

fn observation_values(descriptor: &StructureDescriptor, observation: &Observation) -> ValueMap {
    let mut values: ValueMap = observation
        .attributes
        .iter()
        .map(|a| (a.concept.clone(), a.values.clone()))
        .collect();

    let measure = observation
        .measure
        .clone()
        .or_else(|| descriptor.primary_measure().map(|c| c.id.clone()));
    if let Some(measure) = measure {
        values.insert(measure, vec![observation.value.clone()]);
    }

    let time_id = descriptor.time_dimension().map(|c| c.id.clone());
    if observation.measure.is_none() && !descriptor.is_time_series() {
        if let Some(id) = descriptor.dimension_at_observation_id() {
            values.insert(id.to_string(), vec![observation.coordinate.clone()]);
        }
    }
    if let Some(id) = time_id {
        let time = if observation.time.is_empty() && descriptor.is_time_series() {
            &observation.coordinate
        } else {
            &observation.time
        };
        if !time.is_empty() {
            values.insert(id, vec![time.clone()]);
        }
    }
    values
}

/// Serializes one dataset to a tabular stream.
#[derive(Debug)]
pub struct WriterEngine<W: Write> {
    config: WriterConfig,
    descriptor: Arc<StructureDescriptor>,
    layout: ColumnMapping,
    fixed_layout: FixedWidthLayout,
    encoder: Encoder<W>,
    carried: ValueMap,
    pending: Option<ValueMap>,
    last_levels: Vec<Option<Vec<String>>>,
    header_written: bool,
    stats: WriteStats,
}

impl<W: Write> WriterEngine<W> {
    /// Creates a writer.
    ///
    /// Fails if the structure is inconsistent, the output mapping does not
    /// fit the format, or an auto column has no width table.
    pub fn new(
        sink: W,
        descriptor: Arc<StructureDescriptor>,
        config: WriterConfig,
    ) -> TabularResult<Self> {
        descriptor.validate()?;
        validate_config(&config)?;

        let layout = build_layout(&descriptor, &config);
        let fixed_layout = FixedWidthLayout::from_mapping(&layout);
        let encoder = Encoder::open(sink, &config.codec, fixed_layout.clone());
        let levels = match &config.codec {
            CodecOptions::Hierarchical(options) => options.levels as usize,
            CodecOptions::Delimited(_) | CodecOptions::FixedWidth(_) => 0,
        };
        debug!(codec = config.codec.name(), concepts = layout.len(), "Opened tabular writer");

        Ok(Self {
            config,
            descriptor,
            layout,
            fixed_layout,
            encoder,
            carried: ValueMap::new(),
            pending: None,
            last_levels: vec![None; levels],
            header_written: false,
            stats: WriteStats::default(),
        })
    }

    /// The concrete output mapping, with fixed literals and auto columns
    /// placed. Reading the output back uses this mapping.
    pub fn layout_mapping(&self) -> &ColumnMapping {
        &self.layout
    }

    /// Applies one snapshot.
    ///
    /// Dataset and group values stay in effect until replaced. Series values
    /// replace the previous series, dropping group attributes whose group key
    /// changed. Observation values are combined with everything in effect
    /// and written as a row.
    pub fn write_values(&mut self, level: WriteLevel, values: ValueMap) -> TabularResult<()> {
        match level {
            WriteLevel::Dataset | WriteLevel::Group(_) => {
                self.flush_pending()?;
                self.carried.extend(values);
            }
            WriteLevel::Series => {
                self.flush_pending()?;
                self.begin_series(values);
            }
            WriteLevel::Observation => {
                self.stats.observations += 1;
                self.push_observation(values)?;
            }
        }
        Ok(())
    }

    /// Writes dataset attributes.
    pub fn write_dataset_attributes(&mut self, attributes: &DatasetAttributes) -> TabularResult<()> {
        self.write_values(WriteLevel::Dataset, dataset_values(attributes))
    }

    /// Writes a group or series keyable.
    pub fn write_keyable(&mut self, keyable: &Keyable) -> TabularResult<()> {
        let (level, values) = keyable_values(&self.descriptor, keyable);
        self.write_values(level, values)
    }

    /// Writes an observation of the current series.
    pub fn write_observation(&mut self, observation: &Observation) -> TabularResult<()> {
        let values = observation_values(&self.descriptor, observation);
        self.write_values(WriteLevel::Observation, values)
    }

    /// Writes any dataset event.
    pub fn write_event(&mut self, event: &DatasetEvent) -> TabularResult<()> {
        let (level, values) = event_values(&self.descriptor, event);
        self.write_values(level, values)
    }

    /// Writes a sequence of events.
    pub fn write_all<'a, I>(&mut self, events: I) -> TabularResult<()>
    where
        I: IntoIterator<Item = &'a DatasetEvent>,
    {
        for event in events {
            self.write_event(event)?;
        }
        Ok(())
    }

    /// Flushes pending output and returns the sink.
    pub fn close(mut self) -> TabularResult<(W, WriteStats)> {
        self.flush_pending()?;
        self.write_header()?;
        self.encoder.flush()?;
        info!(
            rows = self.stats.rows_written,
            observations = self.stats.observations,
            "Closed tabular writer"
        );
        let stats = self.stats.clone();
        Ok((self.encoder.into_inner()?, stats))
    }

    fn begin_series(&mut self, values: ValueMap) {
        let descriptor = Arc::clone(&self.descriptor);

        for group in &descriptor.groups {
            let changed = group.dimensions.iter().any(|d| {
                values
                    .get(d)
                    .is_some_and(|v| self.carried.get(d).is_some_and(|old| old != v))
            });
            if changed {
                let level = AttachmentLevel::Group(group.id.clone());
                for attribute in descriptor.attributes_at(&level) {
                    self.carried.remove(&attribute.id);
                }
            }
        }

        self.carried.retain(|id, _| {
            descriptor.concept(id).is_some_and(|c| {
                matches!(
                    c.role.attachment(),
                    Some(AttachmentLevel::Dataset | AttachmentLevel::Group(_))
                )
            })
        });
        self.carried.extend(values);
    }

    fn measure_ids(&self) -> BTreeSet<&str> {
        self.descriptor
            .measures()
            .chain(self.descriptor.cross_sectional_measures())
            .map(|c| c.id.as_str())
            .collect()
    }

    /// Combines measure observations that share every other value into one
    /// row.
    fn push_observation(&mut self, values: ValueMap) -> TabularResult<()> {
        let mut row = self.carried.clone();
        row.extend(values);

        let mergeable = match &self.pending {
            Some(pending) => {
                let measures = self.measure_ids();
                let incoming: Vec<&String> = row
                    .keys()
                    .filter(|id| measures.contains(id.as_str()))
                    .collect();
                let others_equal = row
                    .iter()
                    .filter(|(id, _)| !measures.contains(id.as_str()))
                    .eq(pending.iter().filter(|(id, _)| !measures.contains(id.as_str())));
                !incoming.is_empty()
                    && others_equal
                    && incoming.iter().all(|id| !pending.contains_key(*id))
            }
            None => false,
        };

        if mergeable {
            if let Some(pending) = self.pending.as_mut() {
                pending.extend(row);
            }
            return Ok(());
        }
        self.flush_pending()?;
        self.pending = Some(row);
        Ok(())
    }

    fn flush_pending(&mut self) -> TabularResult<()> {
        match self.pending.take() {
            Some(row) => self.emit(&row),
            None => Ok(()),
        }
    }

    fn emit(&mut self, values: &ValueMap) -> TabularResult<()> {
        self.write_header()?;

        let levels = match &self.config.codec {
            CodecOptions::Hierarchical(options) => options.levels,
            CodecOptions::Delimited(_) | CodecOptions::FixedWidth(_) => 0,
        };
        if levels == 0 {
            let fields = self.compose(values, None);
            return self.write_row(fields, None);
        }

        let mut shallower_written = false;
        for level in 1..=levels {
            let fields = self.compose(values, Some(level));
            let slot = (level - 1) as usize;
            if level == levels || shallower_written || self.last_levels[slot].as_ref() != Some(&fields) {
                self.last_levels[slot] = Some(fields.clone());
                self.write_row(fields, Some(level))?;
                shallower_written = true;
            }
        }
        Ok(())
    }

    fn write_header(&mut self) -> TabularResult<()> {
        if self.header_written || self.config.header == HeaderPolicy::NoHeader {
            return Ok(());
        }
        self.header_written = true;

        let mut fields = vec![String::new(); self.layout.max_column().unwrap_or(0)];
        for (id, entry) in self.layout.iter() {
            let columns = entry.column_refs();
            for (k, column) in columns.iter().enumerate() {
                if let Some(field) = fields.get_mut(column.start - 1) {
                    *field = if columns.len() > 1 {
                        format!("{}_{}", id, k + 1)
                    } else {
                        id.to_string()
                    };
                }
            }
        }
        self.write_row(fields, None)
    }

    fn write_row(&mut self, fields: Vec<String>, level: Option<u32>) -> TabularResult<()> {
        self.stats.rows_written += 1;
        let mut row = PhysicalRow::new(self.stats.rows_written as u64, fields);
        row.level = level;
        self.encoder.write_row(&row)
    }

    /// Lays out the fields of one row, or of one level of a hierarchical
    /// row.
    fn compose(&self, values: &ValueMap, level: Option<u32>) -> Vec<String> {
        let mut fields = vec![String::new(); self.field_count(level)];

        for (id, entry) in self.layout.iter() {
            let columns: Vec<&ColumnRef> = entry
                .column_refs()
                .iter()
                .filter(|c| level.is_none() || c.level == level)
                .collect();
            let Some(first) = columns.first() else {
                continue;
            };

            let written: Vec<String> = match self.config.mapping.get(id).and_then(|e| e.fixed_value()) {
                Some(literal) => vec![literal.to_string()],
                None => values
                    .get(id)
                    .map(|list| list.iter().map(|v| entry.untranscode(v)).collect())
                    .unwrap_or_default(),
            };

            if columns.len() > 1 && self.descriptor.is_complex(id) {
                for (k, column) in columns.iter().enumerate() {
                    self.place(&mut fields, column, written.get(k).cloned().unwrap_or_default());
                }
            } else {
                let separator = entry
                    .separator
                    .as_deref()
                    .unwrap_or(&self.config.subfield_separator);
                self.place(&mut fields, first, written.join(separator));
            }
        }
        fields
    }

    fn place(&self, fields: &mut [String], column: &ColumnRef, value: String) {
        let index = match &self.config.codec {
            CodecOptions::FixedWidth(_) => self.fixed_layout.position(column),
            CodecOptions::Delimited(_) | CodecOptions::Hierarchical(_) => column.start.checked_sub(1),
        };
        if let Some(field) = index.and_then(|i| fields.get_mut(i)) {
            *field = value;
        }
    }

    fn field_count(&self, level: Option<u32>) -> usize {
        match &self.config.codec {
            CodecOptions::FixedWidth(_) => self.fixed_layout.ranges().len(),
            CodecOptions::Delimited(_) | CodecOptions::Hierarchical(_) => self
                .layout
                .iter()
                .flat_map(|(_, e)| e.column_refs())
                .filter(|c| level.is_none() || c.level == level)
                .map(|c| c.start)
                .max()
                .unwrap_or(0),
        }
    }
}

impl WriterEngine<File> {
    /// Creates a writer over a new file.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        descriptor: Arc<StructureDescriptor>,
        config: WriterConfig,
    ) -> TabularResult<Self> {
        let file = File::create(path)?;
        Self::new(file, descriptor, config)
    }
}

fn validate_config(config: &WriterConfig) -> TabularResult<()> {
    let format = config.codec.name();
    if config.header != HeaderPolicy::NoHeader && !matches!(config.codec, CodecOptions::Delimited(_)) {
        return Err(TabularError::config(format!(
            "header rows cannot be written to {} output",
            format
        )));
    }
    if let CodecOptions::Hierarchical(options) = &config.codec {
        if options.levels == 0 {
            return Err(TabularError::config("hierarchical output needs at least one level"));
        }
    }
    if matches!(config.codec, CodecOptions::FixedWidth(_))
        && config.mapping.has_auto_columns()
        && config.widths.is_none()
    {
        return Err(TabularError::config(
            "auto columns in fixed-width output require a field width table",
        ));
    }

    for (id, entry) in config.mapping.iter() {
        for column in entry.column_refs() {
            let valid = match &config.codec {
                CodecOptions::Delimited(_) => column.start >= 1,
                CodecOptions::FixedWidth(_) => column.start >= 1 && column.width().is_some(),
                CodecOptions::Hierarchical(options) => {
                    column.start >= 1
                        && column
                            .level
                            .is_some_and(|level| (1..=options.levels).contains(&level))
                }
            };
            if !valid {
                return Err(TabularError::config(format!(
                    "column '{}' of concept '{}' does not fit {} output",
                    column, id, format
                )));
            }
        }
    }
    Ok(())
}

/// Places fixed literals and auto columns after the explicit columns, in
/// natural concept order.
fn build_layout(descriptor: &StructureDescriptor, config: &WriterConfig) -> ColumnMapping {
    let mut layout = ColumnMapping::new();
    let mut placed: Vec<(&str, &MappingEntry)> = Vec::new();
    for (id, entry) in config.mapping.iter() {
        match entry.source {
            MappingSource::Columns(_) => {
                layout.insert(id, entry.clone());
            }
            MappingSource::Fixed(_) | MappingSource::Auto => placed.push((id, entry)),
        }
    }

    let order = descriptor.natural_order();
    placed.sort_by_key(|(id, _)| {
        (
            order.iter().position(|o| o == id).unwrap_or(order.len()),
            id.to_string(),
        )
    });

    let mut next = match &config.codec {
        CodecOptions::Hierarchical(options) => layout
            .iter()
            .flat_map(|(_, e)| e.column_refs())
            .filter(|c| c.level == Some(options.levels))
            .map(|c| c.start)
            .max()
            .unwrap_or(0),
        CodecOptions::Delimited(_) | CodecOptions::FixedWidth(_) => layout.max_column().unwrap_or(0),
    } + 1;

    for (id, entry) in placed {
        let column = match &config.codec {
            CodecOptions::FixedWidth(_) => {
                let width = match &entry.source {
                    MappingSource::Fixed(literal) => literal.chars().count(),
                    _ => config.widths.as_ref().and_then(|w| w.get(id)).unwrap_or(0),
                }
                .max(1);
                let column = ColumnRef::range(next, next + width - 1);
                next += width;
                column
            }
            CodecOptions::Hierarchical(options) => {
                let column = ColumnRef::index(next).at_level(options.levels);
                next += 1;
                column
            }
            CodecOptions::Delimited(_) => {
                let column = ColumnRef::index(next);
                next += 1;
                column
            }
        };
        layout.insert(
            id,
            MappingEntry {
                source: MappingSource::Columns(vec![column]),
                ..entry.clone()
            },
        );
    }
    layout
}
