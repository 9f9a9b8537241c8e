//! Streaming row reader for delimited archive tables
//!
//! [`TableReader`] walks a table once, in file order, and hands out
//! [`RowBatch`]es of at most `batch_size` data lines. Each batch separates
//! usable rows from quarantined ones:
//!
//! - rows with fewer cells than the table's highest declared column are
//!   quarantined as [`BadRowReason::TooFewColumns`]
//! - cells that are not valid text get one repair pass (undecodable
//!   sequences become U+FFFD); the row is kept unless its id cell needed
//!   repair, in which case it is quarantined as
//!   [`BadRowReason::InvalidEncoding`]
//!
//! UTF-16 tables are transcoded to UTF-8 on the fly before splitting, so the
//! CSV layer only ever sees UTF-8 bytes. Malformed UTF-16 is passed through as
//! a byte that is never valid UTF-8, so the cell it lands in gets the same
//! repair as an undecodable UTF-8 cell.

use std::fs::File;
use std::io::{self, BufReader, Read};

use csv::{ByteRecord, Terminator};
use dwca_common::Result;
use encoding_rs::{Decoder, DecoderResult, UTF_16LE, UTF_8};
use serde::Serialize;
use tracing::{debug, trace};

use crate::descriptor::{FieldMap, LineTerminator, TextEncoding};

/// Quote byte used when a table declares no quoting; never present in text data
pub const NO_QUOTE_SENTINEL: u8 = 0x08;

const TRANSCODE_BUFFER: usize = 8 * 1024;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Written by the UTF-16 transcoder in place of a malformed sequence
const MALFORMED_MARKER: u8 = 0xFF;

/// A decoded data row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawRow {
    /// 1-based physical line the row starts on
    pub line: u64,
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn cells(&self) -> &[String] {
        &self.cells
    }
}

/// Why a row was quarantined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BadRowReason {
    TooFewColumns { found: usize, expected: usize },
    InvalidEncoding,
}

/// A quarantined row; cells are decoded lossily for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadRow {
    pub line: u64,
    pub cells: Vec<String>,
    #[serde(flatten)]
    pub reason: BadRowReason,
}

/// Rows delivered together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowBatch {
    pub good: Vec<RawRow>,
    pub bad: Vec<BadRow>,
}

impl RowBatch {
    pub fn len(&self) -> usize {
        self.good.len() + self.bad.len()
    }

    pub fn is_empty(&self) -> bool {
        self.good.is_empty() && self.bad.is_empty()
    }
}

/// Lazy, single-pass batch iterator over one table
pub struct TableReader {
    table: String,
    records: csv::Reader<Box<dyn Read>>,
    record: ByteRecord,
    skip_header: bool,
    id_index: usize,
    min_columns: usize,
    batch_size: Option<usize>,
    pending: RowBatch,
    processed: usize,
    finished: bool,
}

impl TableReader {
    /// Open the table described by `fields`
    ///
    /// `batch_size` of `None` delivers the whole file as a single batch.
    pub fn open(fields: &FieldMap, batch_size: Option<usize>) -> Result<Self> {
        let source = open_source(fields)?;

        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(fields.delimiter())
            .quote(fields.quote().unwrap_or(NO_QUOTE_SENTINEL))
            .terminator(match fields.terminator() {
                LineTerminator::Newline => Terminator::CRLF,
                LineTerminator::Byte(b) => Terminator::Any(b),
            });

        debug!(
            table = %fields.file_name(),
            encoding = ?fields.encoding(),
            batch_size = ?batch_size,
            "Opening table"
        );

        Ok(Self {
            table: fields.file_name(),
            records: builder.from_reader(source),
            record: ByteRecord::new(),
            skip_header: fields.ignore_header(),
            id_index: fields.id_index(),
            min_columns: fields.min_columns(),
            batch_size: batch_size.filter(|n| *n > 0),
            pending: RowBatch::default(),
            processed: 0,
            finished: false,
        })
    }

    /// Read the whole table as one batch
    pub fn read_all(fields: &FieldMap) -> Result<RowBatch> {
        let mut all = RowBatch::default();
        for batch in Self::open(fields, None)? {
            let batch = batch?;
            all.good.extend(batch.good);
            all.bad.extend(batch.bad);
        }
        Ok(all)
    }

    /// Number of physical lines in the table, counted like `wc -l`
    pub fn line_count(fields: &FieldMap) -> Result<u64> {
        let newline = match fields.terminator() {
            LineTerminator::Newline => b'\n',
            LineTerminator::Byte(b) => b,
        };
        let mut source = open_source(fields)?;
        let mut buf = [0u8; TRANSCODE_BUFFER];
        let mut count = 0u64;
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            count += buf[..n].iter().filter(|b| **b == newline).count() as u64;
        }
        Ok(count)
    }

    /// Data lines processed so far (header excluded)
    pub fn processed(&self) -> usize {
        self.processed
    }

    fn next_batch(&mut self) -> Result<Option<RowBatch>> {
        while self.records.read_byte_record(&mut self.record)? {
            let line = self.record.position().map(|p| p.line()).unwrap_or(0);

            if self.skip_header {
                self.skip_header = false;
                trace!(table = %self.table, line, "Skipping header line");
                continue;
            }
            if is_blank(&self.record) {
                continue;
            }

            self.classify_record(line);
            self.processed += 1;

            if let Some(size) = self.batch_size {
                if self.pending.len() >= size {
                    return Ok(Some(self.flush()));
                }
            }
        }

        self.finished = true;
        if self.pending.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.flush()))
        }
    }

    fn flush(&mut self) -> RowBatch {
        let batch = std::mem::take(&mut self.pending);
        debug!(
            table = %self.table,
            processed = self.processed,
            good = batch.good.len(),
            bad = batch.bad.len(),
            "Ingested {} records from {}",
            self.processed,
            self.table
        );
        batch
    }

    fn classify_record(&mut self, line: u64) {
        let found = self.record.len();
        if found < self.min_columns {
            let cells = self.record.iter().map(lossy).collect();
            self.pending.bad.push(BadRow {
                line,
                cells,
                reason: BadRowReason::TooFewColumns {
                    found,
                    expected: self.min_columns,
                },
            });
            return;
        }

        let mut cells = Vec::with_capacity(found);
        let mut id_repaired = false;
        for (index, raw) in self.record.iter().enumerate() {
            let raw = if line <= 1 && index == 0 {
                raw.strip_prefix(UTF8_BOM).unwrap_or(raw)
            } else {
                raw
            };
            let (cell, repaired) = decode_cell(raw);
            if repaired {
                trace!(table = %self.table, line, column = index, "Repaired undecodable bytes");
                id_repaired |= index == self.id_index;
            }
            cells.push(cell);
        }

        if id_repaired {
            self.pending.bad.push(BadRow {
                line,
                cells,
                reason: BadRowReason::InvalidEncoding,
            });
        } else {
            self.pending.good.push(RawRow { line, cells });
        }
    }
}

impl Iterator for TableReader {
    type Item = Result<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_batch() {
            Ok(batch) => batch.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            },
        }
    }
}

fn open_source(fields: &FieldMap) -> Result<Box<dyn Read>> {
    let file = BufReader::new(File::open(fields.file_path())?);
    Ok(match fields.encoding() {
        TextEncoding::Utf8 => Box::new(file),
        TextEncoding::Utf16 => Box::new(Utf16Transcoder::new(file)),
    })
}

fn is_blank(record: &ByteRecord) -> bool {
    record.len() <= 1 && record.iter().all(|f| f.is_empty())
}

fn lossy(bytes: &[u8]) -> String {
    UTF_8.decode_without_bom_handling(bytes).0.into_owned()
}

/// Decode one cell, returning the text and whether it needed repair
fn decode_cell(bytes: &[u8]) -> (String, bool) {
    match UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        Some(text) => (text.into_owned(), false),
        None => {
            let (text, _) = UTF_8.decode_without_bom_handling(bytes);
            (text.into_owned(), true)
        },
    }
}

/// Streams UTF-16 (BOM-sniffed, little endian by default) as UTF-8
///
/// Each malformed sequence is emitted as [`MALFORMED_MARKER`].
struct Utf16Transcoder<R> {
    inner: R,
    decoder: Decoder,
    input: Vec<u8>,
    input_start: usize,
    input_end: usize,
    output: Vec<u8>,
    output_start: usize,
    output_end: usize,
    eof: bool,
    done: bool,
}

impl<R: Read> Utf16Transcoder<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            decoder: UTF_16LE.new_decoder(),
            input: vec![0; TRANSCODE_BUFFER],
            input_start: 0,
            input_end: 0,
            output: vec![0; TRANSCODE_BUFFER * 3 + 16],
            output_start: 0,
            output_end: 0,
            eof: false,
            done: false,
        }
    }
}

impl<R: Read> Read for Utf16Transcoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.output_start < self.output_end {
                let n = buf.len().min(self.output_end - self.output_start);
                buf[..n].copy_from_slice(&self.output[self.output_start..self.output_start + n]);
                self.output_start += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }

            if self.input_start == self.input_end && !self.eof {
                let n = self.inner.read(&mut self.input)?;
                self.input_start = 0;
                self.input_end = n;
                self.eof = n == 0;
            }

            // One byte stays free for the marker
            let limit = self.output.len() - 1;
            let (result, read, written) = self.decoder.decode_to_utf8_without_replacement(
                &self.input[self.input_start..self.input_end],
                &mut self.output[..limit],
                self.eof,
            );
            self.input_start += read;
            self.output_start = 0;
            self.output_end = written;

            match result {
                DecoderResult::Malformed(_, _) => {
                    self.output[self.output_end] = MALFORMED_MARKER;
                    self.output_end += 1;
                },
                DecoderResult::InputEmpty if self.eof => self.done = true,
                DecoderResult::InputEmpty | DecoderResult::OutputFull => {},
            }
        }
    }
}
