//! Delimited text codec.
//!
//! Backed by the `csv` crate with a configurable single-byte delimiter,
//! quote and escape characters. Records are read as bytes so that invalid
//! UTF-8 can be reported per cell and salvaged instead of aborting the read.

use std::io::{self, Read, Write};
use std::ops::Range;

use csv::{ByteRecord, QuoteStyle, Reader, ReaderBuilder, Terminator, Writer, WriterBuilder};

use super::{decode_text, PhysicalRow, RowDecoder, RowEncoder};
use crate::types::{TabularError, TabularResult};
use crate::validation::ValidationTracker;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Tokenizer options for delimited text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedOptions {
    /// Field delimiter.
    pub delimiter: u8,
    /// Quote character.
    pub quote: u8,
    /// Escape character inside quotes; `None` uses doubled quotes.
    pub escape: Option<u8>,
    /// Whether two adjacent quotes inside a quoted field mean one quote.
    pub double_quote: bool,
    /// Whether quotes are recognised at all.
    pub quoting: bool,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            quote: b'"',
            escape: None,
            double_quote: true,
            quoting: true,
        }
    }
}

/// Marks when the wrapped stream reports end of input.
#[derive(Debug)]
struct EofAware<R> {
    inner: R,
    eof: bool,
}

impl<R: Read> Read for EofAware<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        Ok(n)
    }
}

/// Streaming decoder for delimited text.
///
/// Records end at `\n`; a trailing `\r` is dropped from the last field. The
/// csv reader passes over empty lines, so they are recovered from the line
/// count and returned as rows without fields for the reader's blank-row
/// policy.
#[derive(Debug)]
pub struct DelimitedDecoder<R: Read> {
    reader: Reader<EofAware<R>>,
    record: ByteRecord,
    records_read: u64,
    blank_lines: Range<u64>,
    held: Option<PhysicalRow>,
}

impl<R: Read> DelimitedDecoder<R> {
    /// Creates a decoder. Header handling is left to the caller.
    pub fn new(source: R, options: &DelimitedOptions) -> Self {
        let reader = ReaderBuilder::new()
            .delimiter(options.delimiter)
            .quote(options.quote)
            .escape(options.escape)
            .double_quote(options.double_quote)
            .quoting(options.quoting)
            .terminator(Terminator::Any(b'\n'))
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::None)
            .from_reader(EofAware {
                inner: source,
                eof: false,
            });

        Self {
            reader,
            record: ByteRecord::new(),
            records_read: 0,
            blank_lines: 0..0,
            held: None,
        }
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader.into_inner().inner
    }

    /// First line of the record just read.
    fn record_line(&self) -> u64 {
        let embedded: u64 = self
            .record
            .iter()
            .map(|raw| raw.iter().filter(|b| **b == b'\n').count() as u64)
            .sum();
        let terminated = u64::from(!self.reader.get_ref().eof);
        self.reader
            .position()
            .line()
            .saturating_sub(embedded + terminated)
            .max(1)
    }
}

impl<R: Read> RowDecoder for DelimitedDecoder<R> {
    fn next_row(&mut self, tracker: &mut ValidationTracker) -> TabularResult<Option<PhysicalRow>> {
        if let Some(line) = self.blank_lines.next() {
            return Ok(Some(PhysicalRow::new(line, Vec::new())));
        }
        if let Some(row) = self.held.take() {
            return Ok(Some(row));
        }
        if !self.reader.read_byte_record(&mut self.record)? {
            return Ok(None);
        }
        self.records_read += 1;

        // Position of the record is where the previous one ended.
        let expected = self.record.position().map(|p| p.line()).unwrap_or(1);
        let number = self.record_line();

        let last = self.record.len().saturating_sub(1);
        let mut fields = Vec::with_capacity(self.record.len());
        for (i, raw) in self.record.iter().enumerate() {
            let raw = if i == last {
                raw.strip_suffix(b"\r").unwrap_or(raw)
            } else {
                raw
            };
            let mut text = decode_text(raw, number, None, Some(i + 1), tracker);
            // Handle UTF-8 BOM at start of file
            if self.records_read == 1 && i == 0 && text.starts_with(BYTE_ORDER_MARK) {
                text.remove(0);
            }
            fields.push(text);
        }
        let row = PhysicalRow::new(number, fields);

        if number > expected {
            self.blank_lines = expected + 1..number;
            self.held = Some(row);
            return Ok(Some(PhysicalRow::new(expected, Vec::new())));
        }
        Ok(Some(row))
    }
}

/// Delimited text writer.
#[derive(Debug)]
pub struct DelimitedEncoder<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> DelimitedEncoder<W> {
    /// Creates an encoder.
    pub fn new(sink: W, options: &DelimitedOptions) -> Self {
        let mut builder = WriterBuilder::new();
        builder
            .delimiter(options.delimiter)
            .quote(options.quote)
            .double_quote(options.double_quote)
            .quote_style(if options.quoting {
                QuoteStyle::Necessary
            } else {
                QuoteStyle::Never
            })
            .flexible(true);
        if let Some(escape) = options.escape {
            builder.escape(escape);
        }

        Self {
            writer: builder.from_writer(sink),
        }
    }

    /// Flushes and returns the underlying sink.
    pub fn into_inner(self) -> TabularResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| TabularError::Io(e.into_error()))
    }
}

impl<W: Write> RowEncoder for DelimitedEncoder<W> {
    fn write_row(&mut self, row: &PhysicalRow) -> TabularResult<()> {
        self.writer.write_record(&row.fields)?;
        Ok(())
    }

    fn flush(&mut self) -> TabularResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
