//! Column mapping types.
//!
//! A [`ColumnMapping`] tells the engine, per concept id, where its raw value
//! comes from: a fixed literal or an ordered list of column references.
//!
//! # Examples
//!
//! ```
//! use sdmx_types::{ColumnMapping, ColumnRef, MappingEntry};
//!
//! let mut mapping = ColumnMapping::new();
//! mapping.insert("FREQ", MappingEntry::fixed("A"));
//! mapping.insert("REF_AREA", MappingEntry::column(ColumnRef::index(1)));
//! mapping.insert("OBS_VALUE", MappingEntry::column(ColumnRef::index(2)));
//!
//! assert_eq!(mapping.len(), 3);
//! assert_eq!(mapping.max_column(), Some(2));
//! ```

use std::collections::BTreeMap;

/// Reference to a physical column.
///
/// Delimited formats use a 1-based field index; fixed-width formats use a
/// 1-based inclusive character range. Hierarchical formats additionally tag
/// the reference with the level that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnRef {
    /// 1-based field index, or first character of a fixed-width range.
    pub start: usize,
    /// Last character (inclusive) of a fixed-width range.
    pub end: Option<usize>,
    /// Owning level in hierarchical formats.
    pub level: Option<u32>,
}

impl ColumnRef {
    /// A 1-based field index.
    pub fn index(index: usize) -> Self {
        Self {
            start: index,
            end: None,
            level: None,
        }
    }

    /// A 1-based inclusive character range.
    pub fn range(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
            level: None,
        }
    }

    /// Tags the reference with an owning level.
    pub fn at_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    /// Width in characters of a range reference.
    pub fn width(&self) -> Option<usize> {
        self.end
            .filter(|end| *end >= self.start)
            .map(|end| end - self.start + 1)
    }

    /// Parses `"7"` or `"1-3"`.
    ///
    /// ```
    /// use sdmx_types::ColumnRef;
    ///
    /// assert_eq!(ColumnRef::parse("1-3"), Some(ColumnRef::range(1, 3)));
    /// assert_eq!(ColumnRef::parse("7"), Some(ColumnRef::index(7)));
    /// assert_eq!(ColumnRef::parse("0"), None);
    /// assert_eq!(ColumnRef::parse("5-2"), None);
    /// ```
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match value.split_once('-') {
            Some((start, end)) => {
                let start: usize = start.trim().parse().ok()?;
                let end: usize = end.trim().parse().ok()?;
                (start >= 1 && end >= start).then(|| Self::range(start, end))
            }
            None => {
                let index: usize = value.parse().ok()?;
                (index >= 1).then(|| Self::index(index))
            }
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(level) = self.level {
            write!(f, "L{}:", level)?;
        }
        match self.end {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}", self.start),
        }
    }
}

/// Where a concept gets its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MappingSource {
    /// A constant value for every row.
    Fixed(String),
    /// One or more physical columns, in order.
    Columns(Vec<ColumnRef>),
    /// Fixed-width output column sized from observed value lengths.
    Auto,
}

/// Per-value substitution table for one concept.
///
/// ```
/// use sdmx_types::TranscodingTable;
///
/// let table = TranscodingTable::from_pairs([("Greece", "GR"), ("France", "FR")]);
/// assert_eq!(table.apply("Greece"), "GR");
/// assert_eq!(table.apply("Italy"), "Italy");
/// assert_eq!(table.reverse("FR"), "France");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TranscodingTable {
    /// Old value to new value.
    pub rules: BTreeMap<String, String>,
}

impl TranscodingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(old, new)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            rules: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Substitutes a value; unknown values pass through unchanged.
    pub fn apply(&self, value: &str) -> String {
        self.rules
            .get(value)
            .cloned()
            .unwrap_or_else(|| value.to_string())
    }

    /// Maps a substituted value back to its source value.
    pub fn reverse(&self, value: &str) -> String {
        self.rules
            .iter()
            .find(|(_, new)| new.as_str() == value)
            .map(|(old, _)| old.clone())
            .unwrap_or_else(|| value.to_string())
    }

    /// Returns true if the table has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Mapping of one concept.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MappingEntry {
    /// Value source.
    pub source: MappingSource,
    /// Sub-field separator for complex values.
    pub separator: Option<String>,
    /// Marks the entry as holding a repeatable value spread over its columns.
    pub repeatable: bool,
    /// Optional value substitution.
    pub transcoding: Option<TranscodingTable>,
}

impl MappingEntry {
    fn with_source(source: MappingSource) -> Self {
        Self {
            source,
            separator: None,
            repeatable: false,
            transcoding: None,
        }
    }

    /// A fixed literal.
    pub fn fixed(value: impl Into<String>) -> Self {
        Self::with_source(MappingSource::Fixed(value.into()))
    }

    /// A single column.
    pub fn column(column: ColumnRef) -> Self {
        Self::with_source(MappingSource::Columns(vec![column]))
    }

    /// Several columns, in order.
    pub fn columns(columns: Vec<ColumnRef>) -> Self {
        Self::with_source(MappingSource::Columns(columns))
    }

    /// An auto-sized fixed-width output column.
    pub fn auto() -> Self {
        Self::with_source(MappingSource::Auto)
    }

    /// Sets the sub-field separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    /// Marks the entry as repeatable.
    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    /// Attaches a transcoding table.
    pub fn with_transcoding(mut self, table: TranscodingTable) -> Self {
        self.transcoding = Some(table);
        self
    }

    /// Returns the column references, empty for literals and auto columns.
    pub fn column_refs(&self) -> &[ColumnRef] {
        match &self.source {
            MappingSource::Columns(columns) => columns,
            MappingSource::Fixed(_) | MappingSource::Auto => &[],
        }
    }

    /// Returns the fixed literal, if any.
    pub fn fixed_value(&self) -> Option<&str> {
        match &self.source {
            MappingSource::Fixed(value) => Some(value),
            MappingSource::Columns(_) | MappingSource::Auto => None,
        }
    }

    /// Returns the owning level of the first column reference.
    pub fn level(&self) -> Option<u32> {
        self.column_refs().first().and_then(|c| c.level)
    }

    /// Applies the transcoding table, if any.
    pub fn transcode(&self, value: &str) -> String {
        match &self.transcoding {
            Some(table) => table.apply(value),
            None => value.to_string(),
        }
    }

    /// Reverses the transcoding table, if any.
    pub fn untranscode(&self, value: &str) -> String {
        match &self.transcoding {
            Some(table) => table.reverse(value),
            None => value.to_string(),
        }
    }
}

/// Mapping from concept ids to their value sources.
///
/// Keys are unique by construction; inserting an existing id replaces its
/// entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnMapping {
    entries: BTreeMap<String, MappingEntry>,
}

impl ColumnMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `concept`.
    pub fn insert(&mut self, concept: impl Into<String>, entry: MappingEntry) -> Option<MappingEntry> {
        self.entries.insert(concept.into(), entry)
    }

    /// Builder-style insert.
    pub fn with(mut self, concept: impl Into<String>, entry: MappingEntry) -> Self {
        self.insert(concept, entry);
        self
    }

    /// Returns the entry for `concept`.
    pub fn get(&self, concept: &str) -> Option<&MappingEntry> {
        self.entries.get(concept)
    }

    /// Returns a mutable entry for `concept`.
    pub fn get_mut(&mut self, concept: &str) -> Option<&mut MappingEntry> {
        self.entries.get_mut(concept)
    }

    /// Returns true if `concept` is mapped.
    pub fn contains(&self, concept: &str) -> bool {
        self.entries.contains_key(concept)
    }

    /// Iterates entries ordered by concept id.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappingEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of mapped concepts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest column index (or range end) referenced.
    pub fn max_column(&self) -> Option<usize> {
        self.entries
            .values()
            .flat_map(|e| e.column_refs())
            .map(|c| c.end.unwrap_or(c.start))
            .max()
    }

    /// Returns true if any entry is an auto-sized column.
    pub fn has_auto_columns(&self) -> bool {
        self.entries
            .values()
            .any(|e| matches!(e.source, MappingSource::Auto))
    }
}
