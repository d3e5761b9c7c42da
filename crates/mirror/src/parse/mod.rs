//! Streaming parser for annotated tabular query responses
//!
//! Flux query results arrive as line-oriented CSV whose schema is declared
//! inline: annotation rows (`#datatype`, `#group`, `#default`), a header row
//! naming the columns, repeated headers at section boundaries, and data
//! rows. The parser is a small state machine (`AwaitingHeader` ->
//! `ParsingData`) that makes one forward pass and yields points lazily in
//! row order.

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{FieldValue, Point};

/// A row the parser cannot turn into a point
///
/// Never silently dropped: the enclosing bucket cycle fails and retries
/// next cycle instead of mirroring a partial point.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("data row has {got} cells, expected at least {expected}")]
    ShortRow { expected: usize, got: usize },
    #[error("data row is missing a value for required column {0}")]
    MissingColumn(&'static str),
    #[error("invalid timestamp {0:?}")]
    BadTimestamp(String),
}

/// Column indices discovered from the header row
///
/// The four well-known columns are tracked individually; every other header
/// name becomes a tag, in header order.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderIndex {
    time: Option<usize>,
    value: Option<usize>,
    field: Option<usize>,
    measurement: Option<usize>,
    tags: Vec<(String, usize)>,
}

impl HeaderIndex {
    fn from_row(row: &[String]) -> Self {
        let mut index = Self {
            time: None,
            value: None,
            field: None,
            measurement: None,
            tags: Vec::new(),
        };
        for (i, name) in row.iter().enumerate() {
            match name.as_str() {
                "_time" => index.time = Some(i),
                "_value" => index.value = Some(i),
                "_field" => index.field = Some(i),
                "_measurement" => index.measurement = Some(i),
                other => index.tags.push((other.to_string(), i)),
            }
        }
        index
    }

    /// Minimum cell count a data row must have to cover every recorded index
    fn min_row_len(&self) -> usize {
        [self.time, self.value, self.field, self.measurement]
            .into_iter()
            .flatten()
            .chain(self.tags.iter().map(|(_, i)| *i))
            .max()
            .map_or(0, |i| i + 1)
    }
}

enum ParserState {
    AwaitingHeader,
    ParsingData(HeaderIndex),
}

/// Lazy point stream over a row stream
pub struct PointStream<I> {
    rows: I,
    state: ParserState,
}

/// Parse a streamed tabular response into points
///
/// Input rows are `Result`s so transport errors surface mid-stream; they are
/// passed through. Output order matches row order.
pub fn parse<I>(rows: I) -> PointStream<I::IntoIter>
where
    I: IntoIterator<Item = Result<Vec<String>>>,
{
    PointStream {
        rows: rows.into_iter(),
        state: ParserState::AwaitingHeader,
    }
}

impl<I> Iterator for PointStream<I>
where
    I: Iterator<Item = Result<Vec<String>>>,
{
    type Item = Result<Point>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            if is_annotation(&row) {
                continue;
            }
            match &self.state {
                ParserState::AwaitingHeader => {
                    if row.iter().any(|cell| cell == "_value") {
                        self.state = ParserState::ParsingData(HeaderIndex::from_row(&row));
                    }
                    // Anything else before the header carries no schema and
                    // cannot be interpreted
                }
                ParserState::ParsingData(header) => {
                    // Section-boundary repeat header
                    if row.iter().any(|cell| cell == "result") {
                        continue;
                    }
                    return Some(build_point(header, &row).map_err(Into::into));
                }
            }
        }
    }
}

fn is_annotation(row: &[String]) -> bool {
    row.iter()
        .any(|cell| matches!(cell.as_str(), "#datatype" | "#group" | "#default"))
}

fn build_point(header: &HeaderIndex, row: &[String]) -> Result<Point, ParseError> {
    let expected = header.min_row_len();
    if row.len() < expected {
        return Err(ParseError::ShortRow {
            expected,
            got: row.len(),
        });
    }

    let required = |index: Option<usize>, name: &'static str| -> Result<&str, ParseError> {
        let cell = index
            .and_then(|i| row.get(i))
            .ok_or(ParseError::MissingColumn(name))?;
        if cell.is_empty() {
            return Err(ParseError::MissingColumn(name));
        }
        Ok(cell.as_str())
    };

    let raw_time = required(header.time, "_time")?;
    let timestamp = DateTime::parse_from_rfc3339(raw_time)
        .map_err(|_| ParseError::BadTimestamp(raw_time.to_string()))?
        .with_timezone(&Utc);
    let value = FieldValue::coerce(required(header.value, "_value")?);

    let mut point = Point::new(
        required(header.measurement, "_measurement")?,
        required(header.field, "_field")?,
        value,
        timestamp,
    );
    for (name, index) in &header.tags {
        point = point.with_tag(name.clone(), row[*index].clone());
    }
    Ok(point)
}
