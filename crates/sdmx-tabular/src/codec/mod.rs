//! Physical codecs: text lines to rows and back.
//!
//! Three formats share one row model:
//!
//! - **Delimited** - single-character separated fields with optional quoting
//! - **Fixed width** - fields cut from 1-based inclusive character ranges
//! - **Hierarchical** - delimited rows whose first field is a level number
//!
//! Decoders report recoverable problems (bad encoding, malformed level
//! tokens, stray carriage returns) to the [`ValidationTracker`] and keep going.

use std::io::{Read, Write};

use sdmx_types::ColumnMapping;

use crate::types::{TabularError, TabularResult};
use crate::validation::ValidationTracker;

mod delimited;
mod fixed_width;
mod hierarchical;

pub use delimited::{DelimitedDecoder, DelimitedEncoder, DelimitedOptions};
pub use fixed_width::{FixedWidthDecoder, FixedWidthEncoder, FixedWidthLayout, FixedWidthOptions};
pub use hierarchical::{HierarchicalDecoder, HierarchicalEncoder, HierarchicalOptions};

/// One physical line decoded into raw text fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalRow {
    /// 1-based physical row number.
    pub number: u64,
    /// Level of a hierarchical row; `None` for flat formats.
    pub level: Option<u32>,
    /// Raw fields. Hierarchical rows exclude the level token.
    pub fields: Vec<String>,
}

impl PhysicalRow {
    /// Creates a flat row.
    pub fn new(number: u64, fields: Vec<String>) -> Self {
        Self {
            number,
            level: None,
            fields,
        }
    }

    /// Tags the row with a hierarchical level.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    /// Returns true if every field is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.trim().is_empty())
    }
}

/// Format selection together with its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecOptions {
    /// Delimited text.
    Delimited(DelimitedOptions),
    /// Fixed-width text.
    FixedWidth(FixedWidthOptions),
    /// Multi-level delimited text.
    Hierarchical(HierarchicalOptions),
}

impl CodecOptions {
    /// Short format name for logs and messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Delimited(_) => "delimited",
            Self::FixedWidth(_) => "fixed-width",
            Self::Hierarchical(_) => "hierarchical",
        }
    }
}

/// Reads physical rows from a stream.
pub trait RowDecoder {
    /// Reads the next row, or `None` at end of input.
    ///
    /// Rows with recoverable problems are salvaged where possible and the
    /// problem is recorded in `tracker`; rows that cannot be salvaged are
    /// skipped and counted by [`RowDecoder::rows_skipped`].
    fn next_row(&mut self, tracker: &mut ValidationTracker) -> TabularResult<Option<PhysicalRow>>;

    /// Rows dropped by the decoder itself.
    fn rows_skipped(&self) -> usize {
        0
    }
}

/// Writes physical rows to a stream.
pub trait RowEncoder {
    /// Writes one row.
    fn write_row(&mut self, row: &PhysicalRow) -> TabularResult<()>;

    /// Flushes buffered output.
    fn flush(&mut self) -> TabularResult<()>;
}

/// Decoder for any of the three formats.
#[derive(Debug)]
pub enum Decoder<R: Read> {
    /// Delimited decoder.
    Delimited(DelimitedDecoder<R>),
    /// Fixed-width decoder.
    FixedWidth(FixedWidthDecoder<R>),
    /// Hierarchical decoder.
    Hierarchical(HierarchicalDecoder<R>),
}

impl<R: Read> Decoder<R> {
    /// Opens a decoder over `source`.
    ///
    /// Fixed-width decoding derives its field layout from `mapping`.
    pub fn open(source: R, options: &CodecOptions, mapping: Option<&ColumnMapping>) -> TabularResult<Self> {
        Ok(match options {
            CodecOptions::Delimited(opts) => Self::Delimited(DelimitedDecoder::new(source, opts)),
            CodecOptions::FixedWidth(opts) => {
                let mapping = mapping.ok_or_else(|| {
                    TabularError::config("fixed-width input requires a column mapping")
                })?;
                Self::FixedWidth(FixedWidthDecoder::new(
                    source,
                    FixedWidthLayout::from_mapping(mapping),
                    opts.clone(),
                ))
            }
            CodecOptions::Hierarchical(opts) => {
                Self::Hierarchical(HierarchicalDecoder::new(source, opts))
            }
        })
    }

    /// Reads the next row as a header.
    ///
    /// Hierarchical headers carry no level token and are tokenized as plain
    /// delimited text. Blank lines before the header are passed over.
    pub fn next_header(&mut self, tracker: &mut ValidationTracker) -> TabularResult<Option<PhysicalRow>> {
        loop {
            let row = match self {
                Self::Hierarchical(d) => d.next_raw_row(tracker)?,
                _ => self.next_row(tracker)?,
            };
            match row {
                Some(row) if row.is_blank() => continue,
                other => return Ok(other),
            }
        }
    }

    /// Releases the decoder and returns the underlying stream.
    pub fn into_inner(self) -> R {
        match self {
            Self::Delimited(d) => d.into_inner(),
            Self::FixedWidth(d) => d.into_inner(),
            Self::Hierarchical(d) => d.into_inner(),
        }
    }
}

impl<R: Read> RowDecoder for Decoder<R> {
    fn next_row(&mut self, tracker: &mut ValidationTracker) -> TabularResult<Option<PhysicalRow>> {
        match self {
            Self::Delimited(d) => d.next_row(tracker),
            Self::FixedWidth(d) => d.next_row(tracker),
            Self::Hierarchical(d) => d.next_row(tracker),
        }
    }

    fn rows_skipped(&self) -> usize {
        match self {
            Self::Delimited(d) => d.rows_skipped(),
            Self::FixedWidth(d) => d.rows_skipped(),
            Self::Hierarchical(d) => d.rows_skipped(),
        }
    }
}

/// Encoder for any of the three formats.
#[derive(Debug)]
pub enum Encoder<W: Write> {
    /// Delimited encoder.
    Delimited(DelimitedEncoder<W>),
    /// Fixed-width encoder.
    FixedWidth(FixedWidthEncoder<W>),
    /// Hierarchical encoder.
    Hierarchical(HierarchicalEncoder<W>),
}

impl<W: Write> Encoder<W> {
    /// Opens an encoder over `sink`. Fixed-width output uses `layout`.
    pub fn open(sink: W, options: &CodecOptions, layout: FixedWidthLayout) -> Self {
        match options {
            CodecOptions::Delimited(opts) => Self::Delimited(DelimitedEncoder::new(sink, opts)),
            CodecOptions::FixedWidth(opts) => {
                Self::FixedWidth(FixedWidthEncoder::new(sink, layout, opts.clone()))
            }
            CodecOptions::Hierarchical(opts) => {
                Self::Hierarchical(HierarchicalEncoder::new(sink, opts))
            }
        }
    }

    /// Flushes and returns the underlying sink.
    pub fn into_inner(self) -> TabularResult<W> {
        match self {
            Self::Delimited(e) => e.into_inner(),
            Self::FixedWidth(e) => e.into_inner(),
            Self::Hierarchical(e) => e.into_inner(),
        }
    }
}

impl<W: Write> RowEncoder for Encoder<W> {
    fn write_row(&mut self, row: &PhysicalRow) -> TabularResult<()> {
        match self {
            Self::Delimited(e) => e.write_row(row),
            Self::FixedWidth(e) => e.write_row(row),
            Self::Hierarchical(e) => e.write_row(row),
        }
    }

    fn flush(&mut self) -> TabularResult<()> {
        match self {
            Self::Delimited(e) => e.flush(),
            Self::FixedWidth(e) => e.flush(),
            Self::Hierarchical(e) => e.flush(),
        }
    }
}

/// Decodes bytes as UTF-8, recording an error and salvaging lossily on
/// failure.
pub(crate) fn decode_text(
    bytes: &[u8],
    row: u64,
    level: Option<u32>,
    column: Option<usize>,
    tracker: &mut ValidationTracker,
) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            tracker.report(
                crate::validation::ErrorCode::InvalidEncoding,
                format!("invalid UTF-8 at byte {}", e.valid_up_to()),
                crate::validation::Position { row, level, column },
            );
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
