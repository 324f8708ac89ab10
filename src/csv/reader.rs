//! Pull rows out of a stream of lines.
//!
//! The reader waits for the first data line, takes it as the header, and
//! matches the header names against the registry of its [`ReadLayer`].
//! Every later data line is split, decoded, rearranged into registry order
//! and handed to the layer as a [`Record`].

use std::fmt::Display;
use std::io::{self, BufRead};
use std::iter::FusedIterator;
use std::str::FromStr;
use std::sync::Arc;

use bitvec::prelude::*;
use itertools::Itertools;

use super::codec::{classify, decode, reserved_in, split, LineKind};
use super::columns::ColumnRegistry;
use super::Format;
use crate::errors::{CsvError, Result};
use crate::Position;

/// What to do with tokens beyond the last header column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtraTokens {
    #[default]
    Ignore,
    Reject,
}

/// Whether required columns may appear in any order in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderOrder {
    #[default]
    Any,
    /// Required columns must appear in registry order, other columns may
    /// sit between them.
    Registry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReaderOptions {
    pub extra_tokens: ExtraTokens,
    pub header_order: HeaderOrder,
}

/// One format layer on the read side.
///
/// A derived layer keeps its base layer, builds its registry with
/// [`ColumnRegistry::extend`] on the base registry and calls the base
/// `parse_row` with the same record.
pub trait ReadLayer {
    type Item;

    fn registry(&self) -> &Arc<ColumnRegistry>;

    fn parse_row(&self, record: &Record<'_>) -> Result<Self::Item>;
}

impl<L: ReadLayer + ?Sized> ReadLayer for &L {
    type Item = L::Item;

    fn registry(&self) -> &Arc<ColumnRegistry> {
        (**self).registry()
    }

    fn parse_row(&self, record: &Record<'_>) -> Result<Self::Item> {
        (**self).parse_row(record)
    }
}

/// The header line of a file, resolved against a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    positions: Vec<Option<usize>>,
}

impl Header {
    fn resolve(
        number: usize,
        line: &str,
        data: &str,
        registry: &ColumnRegistry,
        format: &Format,
        order: HeaderOrder,
    ) -> Result<Self> {
        let names = split(data, format)
            .into_iter()
            .map(|name| name.trim().to_string())
            .collect::<Vec<_>>();
        for (column, name) in names.iter().enumerate() {
            if name.is_empty() || !reserved_in(name, format).is_empty() {
                return Err(CsvError::format(
                    Position::at(number, column + 1),
                    line,
                    format!("invalid column name {name:?}"),
                ));
            }
        }
        if let Some(name) = names.iter().duplicates().next() {
            return Err(CsvError::format(
                Position::line(number),
                line,
                format!("duplicate column {name:?}"),
            ));
        }

        let mut matched = bitvec![0; names.len()];
        let mut positions = Vec::with_capacity(registry.len());
        let mut last_required: Option<usize> = None;
        for (index, name) in registry.iter() {
            let position = names.iter().position(|n| n == name);
            match position {
                Some(position) => matched.set(position, true),
                None if registry.is_optional(index) => {}
                None => {
                    return Err(CsvError::format(
                        Position::line(number),
                        line,
                        format!("missing required column {name:?}"),
                    ))
                }
            }
            if let (Some(position), false) = (position, registry.is_optional(index)) {
                if order == HeaderOrder::Registry && last_required.map_or(false, |l| l > position)
                {
                    return Err(CsvError::format(
                        Position::at(number, position + 1),
                        line,
                        format!("column {name:?} is out of order"),
                    ));
                }
                last_required = Some(position);
            }
            positions.push(position);
        }
        tracing::debug!(
            columns = names.len(),
            registered = registry.len(),
            unknown = matched.count_zeros(),
            "accepted header on line {number}"
        );
        Ok(Self { names, positions })
    }

    /// Column names in file order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Where the column with registry index `index` sits in the file.
    pub fn position_of(&self, index: usize) -> Option<usize> {
        self.positions.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One decoded data line, addressed by registry index.
#[derive(Debug, Clone, Copy)]
pub struct Record<'r> {
    number: usize,
    line: &'r str,
    tokens: &'r [String],
    registry: &'r ColumnRegistry,
}

impl<'r> Record<'r> {
    /// 1-based number of the line this record was read from.
    pub fn line_number(&self) -> usize {
        self.number
    }

    /// The raw line, as read.
    pub fn line(&self) -> &'r str {
        self.line
    }

    pub fn tokens(&self) -> &'r [String] {
        self.tokens
    }

    pub fn registry(&self) -> &'r ColumnRegistry {
        self.registry
    }

    pub fn get(&self, index: usize) -> Result<&'r str> {
        self.tokens.get(index).map(String::as_str).ok_or_else(|| {
            CsvError::column(format!(
                "column index {index} was never registered ({} columns)",
                self.tokens.len()
            ))
        })
    }

    /// The token, or `None` if it is empty.
    pub fn get_opt(&self, index: usize) -> Result<Option<&'r str>> {
        let token = self.get(index)?;
        Ok(Some(token).filter(|token| !token.is_empty()))
    }

    pub fn by_name(&self, name: &str) -> Result<&'r str> {
        self.get(self.registry.index_of(name)?)
    }

    pub fn parse<T>(&self, index: usize) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let token = self.get(index)?;
        token
            .parse()
            .map_err(|error| self.invalid_at(index, format!("cannot parse {token:?}: {error}")))
    }

    /// Like [`parse`](Self::parse), but an empty token gives `None`.
    pub fn parse_opt<T>(&self, index: usize) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get_opt(index)? {
            Some(_) => self.parse(index).map(Some),
            None => Ok(None),
        }
    }

    /// A format error pointing at this record's line.
    pub fn invalid(&self, message: impl Into<String>) -> CsvError {
        CsvError::format(Position::line(self.number), self.line, message)
    }

    fn invalid_at(&self, index: usize, message: String) -> CsvError {
        let name = self.registry.name_of(index).unwrap_or("?");
        CsvError::format(
            Position::line(self.number),
            self.line,
            format!("column {name:?}: {message}"),
        )
    }
}

enum State {
    AwaitHeader,
    ReadingRows(Header),
    Done,
}

/// Iterator over the rows of a table.
///
/// It owns its line source and can be consumed once. The source is dropped
/// as soon as it is exhausted, after the first error, or with the reader.
pub struct CsvReader<L, I> {
    layer: L,
    source: Option<I>,
    format: Format,
    options: ReaderOptions,
    state: State,
    number: usize,
}

impl<L, I> CsvReader<L, I>
where
    L: ReadLayer,
    I: Iterator<Item = io::Result<String>>,
{
    pub fn new(layer: L, lines: I) -> Self {
        Self {
            layer,
            source: Some(lines),
            format: Format::default(),
            options: ReaderOptions::default(),
            state: State::AwaitHeader,
            number: 0,
        }
    }

    pub fn with_format(mut self, format: Format) -> Result<Self> {
        format.validate()?;
        self.format = format;
        Ok(self)
    }

    pub fn with_options(mut self, options: ReaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn layer(&self) -> &L {
        &self.layer
    }

    /// The header, once the first row has been requested.
    pub fn header(&self) -> Option<&Header> {
        match &self.state {
            State::ReadingRows(header) => Some(header),
            _ => None,
        }
    }

    fn next_line(&mut self) -> Option<io::Result<String>> {
        let line = self.source.as_mut()?.next();
        match line {
            Some(_) => self.number += 1,
            None => self.source = None,
        }
        line
    }

    fn fail(&mut self, error: CsvError) -> Option<Result<L::Item>> {
        self.state = State::Done;
        self.source = None;
        Some(Err(error))
    }

    fn read_row(&self, header: &Header, line: &str, data: &str) -> Result<L::Item> {
        let raw = split(data, &self.format);
        if raw.len() > header.len() {
            match self.options.extra_tokens {
                ExtraTokens::Reject => {
                    return Err(CsvError::format(
                        Position::at(self.number, header.len() + 1),
                        line,
                        format!("{} tokens but only {} columns", raw.len(), header.len()),
                    ))
                }
                ExtraTokens::Ignore => tracing::warn!(
                    "ignoring {} extra tokens on line {}",
                    raw.len() - header.len(),
                    self.number
                ),
            }
        }
        let tokens = header
            .positions
            .iter()
            .map(|position| match position {
                Some(position) => {
                    let token = raw.get(*position).map_or("", |token| token.trim());
                    decode(token, &self.format).map_err(|error| {
                        error.located(Position::at(self.number, position + 1), line)
                    })
                }
                None => Ok(String::new()),
            })
            .collect::<Result<Vec<_>>>()?;
        let record = Record {
            number: self.number,
            line,
            tokens: &tokens,
            registry: self.layer.registry(),
        };
        self.layer.parse_row(&record)
    }
}

impl<L, I> Iterator for CsvReader<L, I>
where
    L: ReadLayer,
    I: Iterator<Item = io::Result<String>>,
{
    type Item = Result<L::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let State::Done = self.state {
                return None;
            }
            let line = match self.next_line() {
                Some(Ok(line)) => line,
                Some(Err(error)) => return self.fail(error.into()),
                None if matches!(self.state, State::AwaitHeader) => {
                    let error = CsvError::format(
                        Position::line(self.number),
                        "",
                        "no header line before end of input",
                    );
                    return self.fail(error);
                }
                None => {
                    self.state = State::Done;
                    return None;
                }
            };
            let data = match classify(&line, &self.format) {
                LineKind::Blank | LineKind::Comment => {
                    tracing::trace!("skipping line {}", self.number);
                    continue;
                }
                LineKind::Data(data) => data,
            };
            if let State::AwaitHeader = self.state {
                let header = Header::resolve(
                    self.number,
                    &line,
                    data,
                    self.layer.registry(),
                    &self.format,
                    self.options.header_order,
                );
                match header {
                    Ok(header) => self.state = State::ReadingRows(header),
                    Err(error) => return self.fail(error),
                }
                continue;
            }
            let result = match &self.state {
                State::ReadingRows(header) => {
                    tracing::trace!("reading row on line {}", self.number);
                    self.read_row(header, &line, data)
                }
                _ => return None,
            };
            return match result {
                Ok(item) => Some(Ok(item)),
                Err(error) => self.fail(error),
            };
        }
    }
}

impl<L, I> FusedIterator for CsvReader<L, I>
where
    L: ReadLayer,
    I: Iterator<Item = io::Result<String>>,
{
}

/// Read rows from lines already in memory.
pub fn read_lines<L, T>(
    layer: L,
    lines: T,
) -> CsvReader<L, impl Iterator<Item = io::Result<String>>>
where
    L: ReadLayer,
    T: IntoIterator,
    T::Item: AsRef<str>,
{
    CsvReader::new(
        layer,
        lines.into_iter().map(|line| Ok(line.as_ref().to_string())),
    )
}

/// Read rows from a buffered text stream.
pub fn read_from<L, R>(layer: L, reader: R) -> CsvReader<L, io::Lines<R>>
where
    L: ReadLayer,
    R: BufRead,
{
    CsvReader::new(layer, reader.lines())
}
