//! Fixed-width text codec.
//!
//! Field boundaries come from the 1-based inclusive character ranges of the
//! column mapping. Lines are read as bytes so that invalid UTF-8 and stray
//! carriage returns can be reported per line.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};

use sdmx_types::{ColumnMapping, ColumnRef};
use tracing::warn;

use super::{decode_text, PhysicalRow, RowDecoder, RowEncoder};
use crate::types::{TabularError, TabularResult};
use crate::validation::{ErrorCode, Position, ValidationTracker};

/// Options for fixed-width text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedWidthOptions {
    /// Character used to pad short values on write.
    pub padding: char,
    /// Strip padding from values on read.
    pub trim: bool,
    /// Line terminator written after each row.
    pub line_terminator: String,
}

impl Default for FixedWidthOptions {
    fn default() -> Self {
        Self {
            padding: ' ',
            trim: true,
            line_terminator: "\n".to_string(),
        }
    }
}

impl FixedWidthOptions {
    fn clean(&self, value: &str) -> String {
        if !self.trim {
            return value.to_string();
        }
        if self.padding == ' ' {
            value.trim().to_string()
        } else {
            value.trim_end_matches(self.padding).to_string()
        }
    }
}

/// Sorted set of character ranges defining the fields of a line.
///
/// # Examples
///
/// ```
/// use sdmx_tabular::codec::{FixedWidthLayout, FixedWidthOptions};
///
/// let layout = FixedWidthLayout::from_ranges([(1, 3), (4, 7)]);
/// let fields = layout.split("MON1234", &FixedWidthOptions::default());
/// assert_eq!(fields, vec!["MON", "1234"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedWidthLayout {
    ranges: Vec<(usize, usize)>,
}

impl FixedWidthLayout {
    /// Builds a layout from inclusive `(start, end)` pairs.
    pub fn from_ranges<I: IntoIterator<Item = (usize, usize)>>(ranges: I) -> Self {
        let mut ranges: Vec<(usize, usize)> = ranges
            .into_iter()
            .filter(|(start, end)| *start >= 1 && end >= start)
            .collect();
        ranges.sort_unstable();
        ranges.dedup();
        Self { ranges }
    }

    /// Collects every column reference of the mapping. Plain indexes are
    /// treated as one-character ranges.
    pub fn from_mapping(mapping: &ColumnMapping) -> Self {
        Self::from_ranges(
            mapping
                .iter()
                .flat_map(|(_, entry)| entry.column_refs())
                .map(|c| (c.start, c.end.unwrap_or(c.start))),
        )
    }

    /// Field index of a column reference.
    pub fn position(&self, column: &ColumnRef) -> Option<usize> {
        let key = (column.start, column.end.unwrap_or(column.start));
        self.ranges.binary_search(&key).ok()
    }

    /// The ranges in field order.
    pub fn ranges(&self) -> &[(usize, usize)] {
        &self.ranges
    }

    /// Character width of a full line.
    pub fn line_width(&self) -> usize {
        self.ranges.iter().map(|(_, end)| *end).max().unwrap_or(0)
    }

    /// Cuts a line into fields.
    ///
    /// A range that starts past the end of the line yields no field, so short
    /// lines produce fewer fields; a range that is only partly covered yields
    /// the characters available.
    pub fn split(&self, line: &str, options: &FixedWidthOptions) -> Vec<String> {
        let chars: Vec<char> = line.chars().collect();
        let mut fields = Vec::with_capacity(self.ranges.len());
        for &(start, end) in &self.ranges {
            if start > chars.len() {
                break;
            }
            let raw: String = chars[start - 1..end.min(chars.len())].iter().collect();
            fields.push(options.clean(&raw));
        }
        fields
    }
}

/// Streaming decoder for fixed-width text.
#[derive(Debug)]
pub struct FixedWidthDecoder<R: Read> {
    reader: BufReader<R>,
    layout: FixedWidthLayout,
    options: FixedWidthOptions,
    line_number: u64,
    content_seen: bool,
    buffer: Vec<u8>,
}

impl<R: Read> FixedWidthDecoder<R> {
    /// Creates a decoder cutting lines with `layout`.
    pub fn new(source: R, layout: FixedWidthLayout, options: FixedWidthOptions) -> Self {
        Self {
            reader: BufReader::new(source),
            layout,
            options,
            line_number: 0,
            content_seen: false,
            buffer: Vec::new(),
        }
    }

    /// The field layout.
    pub fn layout(&self) -> &FixedWidthLayout {
        &self.layout
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R: Read> RowDecoder for FixedWidthDecoder<R> {
    fn next_row(&mut self, tracker: &mut ValidationTracker) -> TabularResult<Option<PhysicalRow>> {
        self.buffer.clear();
        if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        let number = self.line_number;

        let mut bytes = self.buffer.as_slice();
        if let Some(rest) = bytes.strip_suffix(b"\n") {
            bytes = rest.strip_suffix(b"\r").unwrap_or(rest);
        }
        if bytes.is_empty() {
            return Ok(Some(PhysicalRow::new(number, Vec::new())));
        }

        let mut text = decode_text(bytes, number, None, None, tracker);
        if text.contains('\r') {
            tracker.report(
                ErrorCode::InvalidLineTermination,
                "carriage return without line feed",
                Position {
                    row: number,
                    ..Default::default()
                },
            );
            text.retain(|c| c != '\r');
        }
        // Handle UTF-8 BOM on the first line with content
        if !self.content_seen {
            self.content_seen = true;
            if text.starts_with('\u{feff}') {
                text.remove(0);
            }
        }

        let fields = self.layout.split(&text, &self.options);
        Ok(Some(PhysicalRow::new(number, fields)))
    }
}

/// Fixed-width text writer.
///
/// Field `i` of a row is written into range `i` of the layout, padded or
/// truncated to the range width.
#[derive(Debug)]
pub struct FixedWidthEncoder<W: Write> {
    writer: BufWriter<W>,
    layout: FixedWidthLayout,
    options: FixedWidthOptions,
}

impl<W: Write> FixedWidthEncoder<W> {
    /// Creates an encoder.
    pub fn new(sink: W, layout: FixedWidthLayout, options: FixedWidthOptions) -> Self {
        Self {
            writer: BufWriter::new(sink),
            layout,
            options,
        }
    }

    /// Flushes and returns the underlying sink.
    pub fn into_inner(self) -> TabularResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| TabularError::Io(e.into_error()))
    }
}

impl<W: Write> RowEncoder for FixedWidthEncoder<W> {
    fn write_row(&mut self, row: &PhysicalRow) -> TabularResult<()> {
        let mut line = vec![self.options.padding; self.layout.line_width()];
        for (i, &(start, end)) in self.layout.ranges().iter().enumerate() {
            let value = row.fields.get(i).map(String::as_str).unwrap_or("");
            let width = end - start + 1;
            let length = value.chars().count();
            if length > width {
                warn!(row = row.number, start, end, "value '{}' truncated to {} characters", value, width);
            }
            for (offset, c) in value.chars().take(width).enumerate() {
                line[start - 1 + offset] = c;
            }
        }

        let text: String = line.into_iter().collect();
        self.writer.write_all(text.as_bytes())?;
        self.writer.write_all(self.options.line_terminator.as_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> TabularResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdmx_types::MappingEntry;
    use std::io::Cursor;

    fn layout() -> FixedWidthLayout {
        FixedWidthLayout::from_ranges([(1, 3), (4, 7)])
    }

    fn decode_all(input: &[u8]) -> (Vec<PhysicalRow>, ValidationTracker) {
        let mut decoder =
            FixedWidthDecoder::new(Cursor::new(input.to_vec()), layout(), FixedWidthOptions::default());
        let mut tracker = ValidationTracker::default();
        let mut rows = Vec::new();
        while let Some(row) = decoder.next_row(&mut tracker).unwrap() {
            rows.push(row);
        }
        (rows, tracker)
    }

    #[test]
    fn test_layout_from_mapping() {
        let mapping = ColumnMapping::new()
            .with("OBS_VALUE", MappingEntry::column(ColumnRef::range(4, 7)))
            .with("FREQ", MappingEntry::column(ColumnRef::range(1, 3)))
            .with("UNIT", MappingEntry::fixed("EUR"));
        let layout = FixedWidthLayout::from_mapping(&mapping);
        assert_eq!(layout.ranges(), &[(1, 3), (4, 7)]);
        assert_eq!(layout.position(&ColumnRef::range(4, 7)), Some(1));
        assert_eq!(layout.position(&ColumnRef::range(4, 6)), None);
        assert_eq!(layout.line_width(), 7);
    }

    #[test]
    fn test_split_short_line() {
        let options = FixedWidthOptions::default();
        assert_eq!(layout().split("MON12", &options), vec!["MON", "12"]);
        assert_eq!(layout().split("MO", &options), vec!["MO"]);
    }

    #[test]
    fn test_split_trims_padding() {
        let options = FixedWidthOptions::default();
        assert_eq!(layout().split("A  12  ", &options), vec!["A", "12"]);

        let raw = FixedWidthOptions {
            trim: false,
            ..Default::default()
        };
        assert_eq!(layout().split("A  12  ", &raw), vec!["A  ", "12  "]);
    }

    #[test]
    fn test_decode_lines() {
        let (rows, tracker) = decode_all(b"MON1234\r\nANN0042\n\nQTR7");
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].fields, vec!["MON", "1234"]);
        assert_eq!(rows[1].number, 2);
        assert_eq!(rows[2].number, 3);
        assert!(rows[2].is_blank());
        assert_eq!(rows[3].number, 4);
        assert_eq!(rows[3].fields, vec!["QTR", "7"]);
        assert_eq!(tracker.error_count(), 0);
    }

    #[test]
    fn test_bom_stripped_after_leading_blank_line() {
        let (rows, _) = decode_all("\n\u{feff}MON1234\n".as_bytes());
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_blank());
        assert_eq!(rows[1].fields, vec!["MON", "1234"]);
    }

    #[test]
    fn test_decode_reports_stray_carriage_return() {
        let (rows, tracker) = decode_all(b"MON\r1234\nANN0042\n");
        assert_eq!(rows[0].fields, vec!["MON", "1234"]);
        assert_eq!(tracker.error_count(), 1);
        assert_eq!(tracker.errors()[0].code, ErrorCode::InvalidLineTermination);
        assert_eq!(tracker.errors()[0].position.row, 1);
    }

    #[test]
    fn test_decode_reports_bad_encoding() {
        let (rows, tracker) = decode_all(b"MON12\xFE4\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(tracker.errors()[0].code, ErrorCode::InvalidEncoding);
    }

    #[test]
    fn test_encode_pads_and_truncates() {
        let mut encoder = FixedWidthEncoder::new(Vec::new(), layout(), FixedWidthOptions::default());
        encoder
            .write_row(&PhysicalRow::new(1, vec!["A".into(), "123456".into()]))
            .unwrap();
        encoder
            .write_row(&PhysicalRow::new(2, vec!["MON".into()]))
            .unwrap();
        let out = String::from_utf8(encoder.into_inner().unwrap()).unwrap();
        assert_eq!(out, "A  1234\nMON    \n");
    }
}
