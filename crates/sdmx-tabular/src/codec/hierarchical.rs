//! Hierarchical (multi-level) delimited codec.
//!
//! Every row starts with a level token `1..=levels`. Level 1 rows carry the
//! outermost values, the deepest level carries observations. Column indexes
//! of a level count the fields after the token.

use std::io::{Read, Write};

use super::{DelimitedDecoder, DelimitedEncoder, DelimitedOptions, PhysicalRow, RowDecoder, RowEncoder};
use crate::types::TabularResult;
use crate::validation::{ErrorCode, Position, ValidationTracker};

/// Options for hierarchical text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchicalOptions {
    /// Tokenizer options shared by every level.
    pub delimited: DelimitedOptions,
    /// Number of levels; rows with a level outside `1..=levels` are rejected.
    pub levels: u32,
}

impl Default for HierarchicalOptions {
    fn default() -> Self {
        Self {
            delimited: DelimitedOptions::default(),
            levels: 2,
        }
    }
}

/// Streaming decoder for hierarchical text.
#[derive(Debug)]
pub struct HierarchicalDecoder<R: Read> {
    inner: DelimitedDecoder<R>,
    levels: u32,
    skipped: usize,
}

impl<R: Read> HierarchicalDecoder<R> {
    /// Creates a decoder.
    pub fn new(source: R, options: &HierarchicalOptions) -> Self {
        Self {
            inner: DelimitedDecoder::new(source, &options.delimited),
            levels: options.levels,
            skipped: 0,
        }
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }

    /// Reads the next row without interpreting a level token.
    pub fn next_raw_row(&mut self, tracker: &mut ValidationTracker) -> TabularResult<Option<PhysicalRow>> {
        self.inner.next_row(tracker)
    }

    fn parse_level(&self, token: &str) -> Option<u32> {
        token
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|level| (1..=self.levels).contains(level))
    }
}

impl<R: Read> RowDecoder for HierarchicalDecoder<R> {
    fn next_row(&mut self, tracker: &mut ValidationTracker) -> TabularResult<Option<PhysicalRow>> {
        while let Some(mut row) = self.inner.next_row(tracker)? {
            if row.is_blank() {
                // Leave blank-row policy to the reader.
                return Ok(Some(row));
            }
            let token = row.fields.first().map(String::as_str).unwrap_or("");
            match self.parse_level(token) {
                Some(level) => {
                    row.fields.remove(0);
                    return Ok(Some(row.with_level(level)));
                }
                None => {
                    let message = format!(
                        "level token '{}' is not a level between 1 and {}",
                        token, self.levels
                    );
                    tracker.report(
                        ErrorCode::MalformedLevel,
                        message,
                        Position {
                            row: row.number,
                            level: None,
                            column: Some(1),
                        },
                    );
                    self.skipped += 1;
                }
            }
        }
        Ok(None)
    }

    fn rows_skipped(&self) -> usize {
        self.skipped
    }
}

/// Hierarchical text writer. Rows must carry a level.
#[derive(Debug)]
pub struct HierarchicalEncoder<W: Write> {
    inner: DelimitedEncoder<W>,
}

impl<W: Write> HierarchicalEncoder<W> {
    /// Creates an encoder.
    pub fn new(sink: W, options: &HierarchicalOptions) -> Self {
        Self {
            inner: DelimitedEncoder::new(sink, &options.delimited),
        }
    }

    /// Flushes and returns the underlying sink.
    pub fn into_inner(self) -> TabularResult<W> {
        self.inner.into_inner()
    }
}

impl<W: Write> RowEncoder for HierarchicalEncoder<W> {
    fn write_row(&mut self, row: &PhysicalRow) -> TabularResult<()> {
        let mut fields = Vec::with_capacity(row.fields.len() + 1);
        fields.push(row.level.unwrap_or(1).to_string());
        fields.extend(row.fields.iter().cloned());
        self.inner.write_row(&PhysicalRow::new(row.number, fields))
    }

    fn flush(&mut self) -> TabularResult<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode_all(input: &str) -> (Vec<PhysicalRow>, ValidationTracker, usize) {
        let mut decoder = HierarchicalDecoder::new(
            Cursor::new(input.as_bytes().to_vec()),
            &HierarchicalOptions::default(),
        );
        let mut tracker = ValidationTracker::default();
        let mut rows = Vec::new();
        while let Some(row) = decoder.next_row(&mut tracker).unwrap() {
            rows.push(row);
        }
        let skipped = decoder.rows_skipped();
        (rows, tracker, skipped)
    }

    #[test]
    fn test_decode_levels() {
        let (rows, tracker, skipped) = decode_all("1;GR\n2;2005;1\n2;2006;2\n1;FR\n2;2005;3\n");
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].level, Some(1));
        assert_eq!(rows[0].fields, vec!["GR"]);
        assert_eq!(rows[1].level, Some(2));
        assert_eq!(rows[1].fields, vec!["2005", "1"]);
        assert_eq!(rows[4].number, 5);
        assert_eq!(tracker.error_count(), 0);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_malformed_level_is_skipped() {
        let (rows, tracker, skipped) = decode_all("1;GR\nX;2005;1\n3;2006;2\n2;2007;3\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].fields, vec!["2007", "3"]);
        assert_eq!(skipped, 2);
        assert_eq!(tracker.error_count(), 2);
        assert!(tracker
            .errors()
            .iter()
            .all(|e| e.code == ErrorCode::MalformedLevel));
        assert_eq!(tracker.errors()[0].position.row, 2);
    }

    #[test]
    fn test_raw_row_keeps_header_token() {
        let mut decoder = HierarchicalDecoder::new(
            Cursor::new(b"LEVEL;A;B\n1;GR;F\n".to_vec()),
            &HierarchicalOptions::default(),
        );
        let mut tracker = ValidationTracker::default();
        let header = decoder.next_raw_row(&mut tracker).unwrap().unwrap();
        assert_eq!(header.fields, vec!["LEVEL", "A", "B"]);
        assert_eq!(header.level, None);

        let row = decoder.next_row(&mut tracker).unwrap().unwrap();
        assert_eq!(row.level, Some(1));
        assert_eq!(row.fields, vec!["GR", "F"]);
        assert_eq!(tracker.error_count(), 0);
        assert_eq!(decoder.rows_skipped(), 0);
    }

    #[test]
    fn test_encode_prepends_level() {
        let mut encoder = HierarchicalEncoder::new(Vec::new(), &HierarchicalOptions::default());
        encoder
            .write_row(&PhysicalRow::new(1, vec!["GR".into()]).with_level(1))
            .unwrap();
        encoder
            .write_row(&PhysicalRow::new(2, vec!["2005".into(), "1".into()]).with_level(2))
            .unwrap();
        let out = String::from_utf8(encoder.into_inner().unwrap()).unwrap();
        assert_eq!(out, "1;GR\n2;2005;1\n");
    }
}
