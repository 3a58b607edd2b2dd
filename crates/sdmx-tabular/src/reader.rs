//! Pull-based reader engine.
//!
//! A [`ReaderEngine`] owns one input stream and exposes it through a
//! three-phase pull protocol:
//!
//! 1. [`move_next_dataset`](ReaderEngine::move_next_dataset) acquires the
//!    stream, consumes the header and reads ahead to the first keyable
//! 2. [`move_next_keyable`](ReaderEngine::move_next_keyable) advances to the
//!    next group or series key
//! 3. [`move_next_observation`](ReaderEngine::move_next_observation) advances
//!    through the observations of the current series
//!
//! Rows are read lazily. Keyables and observations produced by a row are
//! queued until the caller pulls them.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use std::sync::Arc;
//!
//! use sdmx_tabular::{HeaderPolicy, ReaderConfig, ReaderEngine};
//! use sdmx_types::{Concept, StructureDescriptor};
//!
//! let dsd = Arc::new(StructureDescriptor::new(vec![
//!     Concept::dimension("REF_AREA"),
//!     Concept::time_dimension("TIME_PERIOD"),
//!     Concept::primary_measure("OBS_VALUE"),
//! ]));
//! let input = "REF_AREA;TIME_PERIOD;OBS_VALUE\nGR;2005;1\nGR;2006;2\n";
//! let config = ReaderConfig::delimited(b';').with_header(HeaderPolicy::UseHeader);
//!
//! let mut reader = ReaderEngine::new(Cursor::new(input), dsd, config).unwrap();
//! assert!(reader.move_next_dataset().unwrap());
//! assert!(reader.move_next_keyable().unwrap());
//! let mut values = Vec::new();
//! while reader.move_next_observation().unwrap() {
//!     values.push(reader.current_observation().unwrap().value.clone());
//! }
//! assert_eq!(values, vec!["1", "2"]);
//! assert_eq!(reader.error_count(), 0);
//! ```

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use sdmx_types::{
    ColumnMapping, DatasetAttributes, DatasetEvent, Keyable, MappingSource, Observation,
    StructureDescriptor,
};
use tracing::{debug, info, trace};

use crate::builder::RecordBuilder;
use crate::codec::{CodecOptions, Decoder, FixedWidthLayout, PhysicalRow, RowDecoder};
use crate::header::{check_header_order, check_mapped_concepts, infer_mapping, positional_mapping};
use crate::resolver::{ColumnLocator, ConceptResolver};
use crate::types::{HeaderPolicy, ReadStats, ReaderConfig, TabularError, TabularResult};
use crate::validation::{ErrorCode, Position, ValidationError, ValidationTracker};

#[derive(Debug)]
enum Source<R: Read> {
    Idle(R),
    Open(Decoder<R>),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotStarted,
    Started,
}

#[derive(Debug)]
enum Pending {
    Group(Keyable),
    Series(u64, Keyable),
}

/// Reads one dataset from a tabular stream.
#[derive(Debug)]
pub struct ReaderEngine<R: Read + Seek> {
    config: ReaderConfig,
    descriptor: Arc<StructureDescriptor>,
    source: Source<R>,
    tracker: ValidationTracker,
    builder: Option<RecordBuilder>,
    phase: Phase,
    exhausted: bool,
    keyables: VecDeque<Pending>,
    observations: VecDeque<(u64, Observation)>,
    current_keyable: Option<Keyable>,
    current_observation: Option<Observation>,
    current_series: Option<u64>,
    last_series: Option<Keyable>,
    last_groups: HashMap<String, Keyable>,
    next_series: u64,
    rows_seen: u64,
    decoder_skipped: usize,
    stats: ReadStats,
}

impl<R: Read + Seek> ReaderEngine<R> {
    /// Creates a reader over `source`.
    ///
    /// The stream is not touched until the first pull. Fails if the
    /// structure is inconsistent or the configuration is contradictory.
    pub fn new(source: R, descriptor: Arc<StructureDescriptor>, config: ReaderConfig) -> TabularResult<Self> {
        descriptor.validate()?;
        validate_config(&config)?;

        let tracker = ValidationTracker::new(config.strict, config.allow_additional_columns);
        Ok(Self {
            config,
            descriptor,
            source: Source::Idle(source),
            tracker,
            builder: None,
            phase: Phase::NotStarted,
            exhausted: false,
            keyables: VecDeque::new(),
            observations: VecDeque::new(),
            current_keyable: None,
            current_observation: None,
            current_series: None,
            last_series: None,
            last_groups: HashMap::new(),
            next_series: 0,
            rows_seen: 0,
            decoder_skipped: 0,
            stats: ReadStats::default(),
        })
    }

    /// Advances to the dataset.
    ///
    /// A tabular stream holds exactly one dataset: the first call returns
    /// true if it has data rows, later calls return false. An input without
    /// any row fails with [`TabularError::EmptyInput`]; an input without data
    /// rows returns false, or fails with [`TabularError::EmptyDataset`] if
    /// configured to.
    pub fn move_next_dataset(&mut self) -> TabularResult<bool> {
        if self.phase == Phase::Started {
            return Ok(false);
        }
        self.phase = Phase::Started;
        self.acquire()?;

        while self.keyables.is_empty() && self.read_row()? {}

        if self.stats.rows_read == 0 {
            if self.rows_seen == 0 && self.decoder_skipped == 0 {
                return Err(TabularError::EmptyInput);
            }
            if self.config.error_if_empty_dataset {
                return Err(TabularError::EmptyDataset);
            }
            debug!("Input holds no data rows");
            return Ok(false);
        }
        Ok(true)
    }

    /// The dataset attributes seen so far.
    ///
    /// When rows disagree, the most recent values win and the drift is
    /// reported.
    pub fn dataset_attributes(&self) -> &DatasetAttributes {
        self.tracker.baseline()
    }

    /// Advances to the next group or series keyable.
    ///
    /// Observations of the previous series that were not pulled are
    /// discarded.
    pub fn move_next_keyable(&mut self) -> TabularResult<bool> {
        if self.phase == Phase::NotStarted && !self.move_next_dataset()? {
            return Ok(false);
        }
        self.current_observation = None;

        loop {
            if let Some(pending) = self.keyables.pop_front() {
                let keyable = match pending {
                    Pending::Group(keyable) => {
                        self.current_series = None;
                        keyable
                    }
                    Pending::Series(seq, keyable) => {
                        self.current_series = Some(seq);
                        keyable
                    }
                };
                self.current_keyable = Some(keyable);
                self.stats.keyables += 1;
                return Ok(true);
            }
            if !self.read_row()? {
                self.current_keyable = None;
                self.current_series = None;
                return Ok(false);
            }
        }
    }

    /// The keyable most recently advanced to.
    pub fn current_keyable(&self) -> Option<&Keyable> {
        self.current_keyable.as_ref()
    }

    /// Advances to the next observation of the current series.
    ///
    /// Returns false after a group keyable, and once the next keyable is
    /// ready.
    pub fn move_next_observation(&mut self) -> TabularResult<bool> {
        let Some(series) = self.current_series else {
            return Ok(false);
        };

        loop {
            while self.observations.front().is_some_and(|(seq, _)| *seq < series) {
                self.observations.pop_front();
            }
            if let Some((seq, _)) = self.observations.front() {
                if *seq > series {
                    self.current_observation = None;
                    return Ok(false);
                }
                self.current_observation = self.observations.pop_front().map(|(_, o)| o);
                self.stats.observations += 1;
                return Ok(true);
            }
            if !self.keyables.is_empty() || !self.read_row()? {
                self.current_observation = None;
                return Ok(false);
            }
        }
    }

    /// The observation most recently advanced to.
    pub fn current_observation(&self) -> Option<&Observation> {
        self.current_observation.as_ref()
    }

    /// Reads the whole dataset into events, in emission order.
    ///
    /// Starts from the current position; call on a fresh or reset engine.
    pub fn read_all(&mut self) -> TabularResult<Vec<DatasetEvent>> {
        let mut events = Vec::new();
        if !self.move_next_dataset()? {
            return Ok(events);
        }
        events.push(DatasetEvent::DatasetAttributes(self.dataset_attributes().clone()));

        while self.move_next_keyable()? {
            if let Some(keyable) = &self.current_keyable {
                events.push(DatasetEvent::Keyable(keyable.clone()));
            }
            while self.move_next_observation()? {
                if let Some(observation) = &self.current_observation {
                    events.push(DatasetEvent::Observation(observation.clone()));
                }
            }
        }
        Ok(events)
    }

    /// The effective column mapping, once the stream has been acquired.
    pub fn mapping(&self) -> Option<&ColumnMapping> {
        self.builder.as_ref().map(|b| b.resolver().mapping())
    }

    /// Recoverable errors recorded so far.
    pub fn errors(&self) -> &[ValidationError] {
        self.tracker.errors()
    }

    /// Removes and returns the recorded errors.
    pub fn take_errors(&mut self) -> Vec<ValidationError> {
        self.tracker.take_errors()
    }

    /// Number of recoverable errors recorded so far.
    pub fn error_count(&self) -> usize {
        self.tracker.error_count()
    }

    /// Read statistics so far.
    pub fn stats(&self) -> ReadStats {
        ReadStats {
            rows_skipped: self.stats.rows_skipped + self.decoder_skipped,
            errors: self.tracker.error_count(),
            ..self.stats.clone()
        }
    }

    /// Rewinds to the start of the input and clears all per-dataset state,
    /// recorded errors included.
    pub fn reset(&mut self) -> TabularResult<()> {
        let mut inner = match std::mem::replace(&mut self.source, Source::Closed) {
            Source::Idle(inner) => inner,
            Source::Open(decoder) => decoder.into_inner(),
            Source::Closed => return Err(TabularError::Closed),
        };
        inner.seek(SeekFrom::Start(0))?;
        self.source = Source::Idle(inner);

        self.clear_state();
        self.tracker.reset();
        self.builder = None;
        self.phase = Phase::NotStarted;
        self.exhausted = false;
        self.rows_seen = 0;
        self.decoder_skipped = 0;
        self.stats = ReadStats::default();
        debug!("Reader reset to start of input");
        Ok(())
    }

    /// Releases the stream. Later pulls fail with [`TabularError::Closed`].
    pub fn close(&mut self) {
        if matches!(self.source, Source::Closed) {
            return;
        }
        self.source = Source::Closed;
        self.clear_state();
        let stats = self.stats();
        info!(
            rows = stats.rows_read,
            skipped = stats.rows_skipped,
            keyables = stats.keyables,
            observations = stats.observations,
            errors = stats.errors,
            "Closed tabular reader"
        );
    }

    fn clear_state(&mut self) {
        self.keyables.clear();
        self.observations.clear();
        self.current_keyable = None;
        self.current_observation = None;
        self.current_series = None;
        self.last_series = None;
        self.last_groups.clear();
        self.next_series = 0;
    }

    fn acquire(&mut self) -> TabularResult<()> {
        let source = match std::mem::replace(&mut self.source, Source::Closed) {
            Source::Idle(source) => source,
            Source::Open(decoder) => {
                self.source = Source::Open(decoder);
                return Ok(());
            }
            Source::Closed => return Err(TabularError::Closed),
        };
        let mut decoder = Decoder::open(source, &self.config.codec, self.config.mapping.as_ref())?;
        debug!(codec = self.config.codec.name(), "Acquired input stream");

        let header = if self.config.header == HeaderPolicy::NoHeader {
            None
        } else {
            match decoder.next_header(&mut self.tracker)? {
                Some(row) => {
                    self.rows_seen += 1;
                    if !matches!(self.config.codec, CodecOptions::Hierarchical(_)) {
                        self.tracker.expect_fields(row.level, row.fields.len());
                    }
                    debug!(fields = row.fields.len(), policy = ?self.config.header, "Consumed header row");
                    Some(row)
                }
                None => {
                    self.source = Source::Open(decoder);
                    self.exhausted = true;
                    return Err(TabularError::EmptyInput);
                }
            }
        };

        let mapping = match (&self.config.mapping, &header) {
            (Some(mapping), Some(header)) => {
                if self.config.header == HeaderPolicy::UseHeader && self.config.validate_header_order {
                    check_header_order(mapping, header, &mut self.tracker);
                }
                mapping.clone()
            }
            (Some(mapping), None) => mapping.clone(),
            (None, Some(header)) if self.config.header == HeaderPolicy::UseHeader => {
                infer_mapping(&self.descriptor, header, &mut self.tracker)
            }
            (None, _) => {
                debug!("Using positional mapping in natural concept order");
                positional_mapping(&self.descriptor)
            }
        };
        check_mapped_concepts(&self.descriptor, &mapping, &mut self.tracker);
        let missing = self.tracker.check_mandatory(&self.descriptor, &mapping);
        if !missing.is_empty() {
            debug!(?missing, "Mandatory concepts read as empty values");
        }

        let locator = match &self.config.codec {
            CodecOptions::FixedWidth(_) => ColumnLocator::Ranged(FixedWidthLayout::from_mapping(&mapping)),
            CodecOptions::Delimited(_) | CodecOptions::Hierarchical(_) => ColumnLocator::Positional,
        };
        let resolver = ConceptResolver::new(
            Arc::clone(&self.descriptor),
            mapping,
            locator,
            self.config.subfield_separator.clone(),
        );
        self.builder = Some(RecordBuilder::new(
            resolver,
            self.config.carry_forward,
            self.config.map_measures,
            self.config.map_cross_sectional_measures,
        ));
        self.source = Source::Open(decoder);
        Ok(())
    }

    /// Reads and processes one physical row. Returns false at end of input.
    fn read_row(&mut self) -> TabularResult<bool> {
        let decoder = match &mut self.source {
            Source::Open(decoder) => decoder,
            Source::Closed => return Err(TabularError::Closed),
            Source::Idle(_) => return Ok(false),
        };
        if self.exhausted {
            return Ok(false);
        }

        let next = decoder.next_row(&mut self.tracker)?;
        self.decoder_skipped = decoder.rows_skipped();
        let Some(row) = next else {
            self.exhausted = true;
            debug!(rows = self.rows_seen, "Reached end of input");
            return Ok(false);
        };
        self.rows_seen += 1;
        trace!(row = row.number, level = ?row.level, fields = row.fields.len(), "Read row");

        if row.is_blank() {
            if self.config.error_if_empty_data_row {
                self.tracker.report(
                    ErrorCode::EmptyDataRow,
                    "data row has no values",
                    Position::row(&row),
                );
            }
            self.stats.rows_skipped += 1;
            return Ok(true);
        }

        self.stats.rows_read += 1;
        self.tracker.check_field_count(&row);
        self.process_row(&row);
        Ok(true)
    }

    fn process_row(&mut self, row: &PhysicalRow) {
        let Some(builder) = self.builder.as_mut() else {
            return;
        };
        let ctx = builder.begin_row(row, &mut self.tracker);
        let attributes = builder.build_dataset_attributes(&ctx);
        self.tracker.check_dataset_attributes(attributes, row);

        if let (Some(level), CodecOptions::Hierarchical(options)) = (row.level, &self.config.codec) {
            if level < options.levels {
                return;
            }
        }

        let groups = builder.build_group_keyables(&ctx);
        let series = builder.build_series_keyable(&ctx);
        let observations = builder.build_observations(&ctx, &series);

        let mut changed = Vec::new();
        for group in groups {
            let id = group.group.clone().unwrap_or_default();
            if self.last_groups.get(&id) != Some(&group) {
                self.last_groups.insert(id, group.clone());
                changed.push(group);
            }
        }

        if !changed.is_empty() || self.last_series.as_ref() != Some(&series) {
            self.keyables.extend(changed.into_iter().map(Pending::Group));
            self.next_series += 1;
            self.keyables
                .push_back(Pending::Series(self.next_series, series.clone()));
            self.last_series = Some(series);
        }

        let seq = self.next_series;
        self.observations
            .extend(observations.into_iter().map(|o| (seq, o)));
    }
}

impl ReaderEngine<File> {
    /// Opens a reader over a file.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        descriptor: Arc<StructureDescriptor>,
        config: ReaderConfig,
    ) -> TabularResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TabularError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let file = File::open(path)?;
        Self::new(file, descriptor, config)
    }
}

/// Rejects configurations that cannot be read.
fn validate_config(config: &ReaderConfig) -> TabularResult<()> {
    if config.map_measures && config.map_cross_sectional_measures {
        return Err(TabularError::config(
            "measure mapping and cross-sectional measure mapping are mutually exclusive",
        ));
    }

    let format = config.codec.name();
    let needs_mapping = !matches!(config.codec, CodecOptions::Delimited(_));
    if needs_mapping && config.header == HeaderPolicy::UseHeader {
        return Err(TabularError::config(format!(
            "header rows cannot be used with {} input",
            format
        )));
    }
    if needs_mapping && config.mapping.is_none() {
        return Err(TabularError::config(format!(
            "{} input requires a column mapping",
            format
        )));
    }
    if let CodecOptions::Hierarchical(options) = &config.codec {
        if options.levels == 0 {
            return Err(TabularError::config("hierarchical input needs at least one level"));
        }
    }

    let Some(mapping) = &config.mapping else {
        return Ok(());
    };
    for (id, entry) in mapping.iter() {
        if matches!(entry.source, MappingSource::Auto) {
            return Err(TabularError::config(format!(
                "concept '{}' uses an auto column, which only applies to output",
                id
            )));
        }
        for column in entry.column_refs() {
            if column.start == 0 {
                return Err(TabularError::config(format!(
                    "concept '{}' refers to column 0; columns are 1-based",
                    id
                )));
            }
            match &config.codec {
                CodecOptions::FixedWidth(_) if column.width().is_none() => {
                    return Err(TabularError::config(format!(
                        "concept '{}' needs a character range for fixed-width input, found '{}'",
                        id, column
                    )));
                }
                CodecOptions::Hierarchical(options)
                    if !column
                        .level
                        .is_some_and(|level| (1..=options.levels).contains(&level)) =>
                {
                    return Err(TabularError::config(format!(
                        "concept '{}' needs a level between 1 and {}, found '{}'",
                        id, options.levels, column
                    )));
                }
                _ => {}
            }
        }
    }
    Ok(())
}
