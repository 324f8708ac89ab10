//! Render rows as lines.
//!
//! The writer asks its [`WriteLayer`] for the column titles first, so a
//! layer that wants to leave out columns nobody uses has to look at its
//! data when it is built. After that, rows are rendered one at a time as
//! the returned [`Lines`] iterator is pulled.

use std::borrow::Borrow;
use std::collections::VecDeque;
use std::io::Write;

use itertools::Itertools;

use super::codec::{bare_reserved_in, encode, reserved_in};
use super::columns::ColumnRegistry;
use super::Format;
use crate::errors::{CsvError, Result};
use crate::Position;

/// One format layer on the write side.
///
/// A derived layer keeps its base layer, returns the base titles followed
/// by its own, and does the same with the row values. Titles repeated by a
/// later layer share the column of their first occurrence.
pub trait WriteLayer {
    type Item;

    fn titles(&self) -> Vec<String>;

    /// One value per title, in title order. Missing trailing values are
    /// written as empty.
    fn row_tokens(&self, item: &Self::Item) -> Result<Vec<String>>;

    fn header_comments(&self) -> Vec<String> {
        Vec::new()
    }

    fn footer_comments(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<L: WriteLayer + ?Sized> WriteLayer for &L {
    type Item = L::Item;

    fn titles(&self) -> Vec<String> {
        (**self).titles()
    }

    fn row_tokens(&self, item: &Self::Item) -> Result<Vec<String>> {
        (**self).row_tokens(item)
    }

    fn header_comments(&self) -> Vec<String> {
        (**self).header_comments()
    }

    fn footer_comments(&self) -> Vec<String> {
        (**self).footer_comments()
    }
}

/// The two comment lines closing every table.
pub fn provenance(format: &Format) -> [String; 2] {
    [
        format!(
            "This CSV output has been created by {} version {}.",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ),
        format!(
            "Columns are separated by {:?}, comments start with {:?}, the escape character is {:?}.",
            format.separator, format.comment, format.escape
        ),
    ]
}

pub struct CsvWriter<L> {
    layer: L,
    format: Format,
}

impl<L: WriteLayer> CsvWriter<L> {
    pub fn new(layer: L) -> Self {
        Self {
            layer,
            format: Format::default(),
        }
    }

    pub fn with_format(mut self, format: Format) -> Result<Self> {
        format.validate()?;
        self.format = format;
        Ok(self)
    }

    pub fn layer(&self) -> &L {
        &self.layer
    }

    /// The lines of a table holding `items`.
    ///
    /// Fails right away if the layer's titles or header comments are
    /// unusable. Errors in later lines are yielded by the iterator, which
    /// stops after the first one; lines yielded before it are not a valid
    /// table on their own.
    pub fn lines<T>(&self, items: T) -> Result<Lines<'_, L, T::IntoIter>>
    where
        T: IntoIterator,
        T::Item: Borrow<L::Item>,
    {
        let mut pending = VecDeque::new();
        for comment in self.layer.header_comments() {
            pending.push_back(self.comment_line(&comment, pending.len() + 1)?);
        }

        let mut columns = ColumnRegistry::new();
        let mut slots = Vec::new();
        for title in self.layer.titles() {
            let title = title.trim();
            if !reserved_in(title, &self.format).is_empty() {
                return Err(CsvError::column(format!(
                    "column title {title:?} contains a reserved character"
                )));
            }
            slots.push(columns.register(title)?);
        }
        if columns.is_empty() {
            return Err(CsvError::column("cannot write a table without columns"));
        }
        let header = columns
            .iter()
            .map(|(_, title)| encode(title, &self.format))
            .join(&self.format.separator.to_string());
        tracing::debug!(
            columns = columns.len(),
            comments = pending.len(),
            "writing header {header:?}"
        );
        pending.push_back(header);

        Ok(Lines {
            writer: self,
            width: columns.len(),
            slots,
            items: Some(items.into_iter()),
            pending,
            finished: false,
            number: 0,
        })
    }

    /// Write the table to `sink`, one newline-terminated line at a time.
    ///
    /// Returns the number of lines written.
    pub fn write_to<T, W>(&self, items: T, mut sink: W) -> Result<usize>
    where
        T: IntoIterator,
        T::Item: Borrow<L::Item>,
        W: Write,
    {
        let mut count = 0;
        for line in self.lines(items)? {
            writeln!(sink, "{}", line?)?;
            count += 1;
        }
        sink.flush()?;
        Ok(count)
    }

    fn comment_line(&self, comment: &str, number: usize) -> Result<String> {
        if comment.contains(['\n', '\r']) {
            return Err(CsvError::format(
                Position::line(number),
                comment,
                "comment must not contain a newline",
            ));
        }
        Ok(self.comment_text(comment))
    }

    /// `comment` behind the comment character; the text has no newlines.
    fn comment_text(&self, comment: &str) -> String {
        let comment = comment.trim();
        if comment.is_empty() {
            self.format.comment.to_string()
        } else {
            format!("{} {}", self.format.comment, comment)
        }
    }
}

/// Lazily rendered lines of a table, see [`CsvWriter::lines`].
pub struct Lines<'w, L, I> {
    writer: &'w CsvWriter<L>,
    width: usize,
    slots: Vec<usize>,
    items: Option<I>,
    pending: VecDeque<String>,
    finished: bool,
    number: usize,
}

impl<'w, L, I> Lines<'w, L, I>
where
    L: WriteLayer,
    I: Iterator,
    I::Item: Borrow<L::Item>,
{
    fn render_row(&self, item: &L::Item) -> Result<String> {
        let number = self.number + 1;
        let format = &self.writer.format;
        let values = self.writer.layer.row_tokens(item)?;
        if values.len() > self.slots.len() {
            return Err(CsvError::column(format!(
                "{} values for {} titles",
                values.len(),
                self.slots.len()
            )));
        }

        let mut row = vec![String::new(); self.width];
        for (value, &slot) in values.iter().zip(&self.slots) {
            let value = value.trim();
            if value.contains(['\n', '\r']) {
                return Err(CsvError::format(
                    Position::at(number, slot + 1),
                    value,
                    "value must not contain a newline",
                ));
            }
            if value.is_empty() {
                continue;
            }
            if !row[slot].is_empty() && row[slot] != value {
                return Err(CsvError::column(format!(
                    "conflicting values {:?} and {value:?} for column {}",
                    row[slot],
                    slot + 1
                )));
            }
            row[slot] = value.to_string();
        }

        let used = row.iter().rposition(|value| !value.is_empty()).map_or(0, |i| i + 1);
        if used == 0 {
            // A lone blank separator would read back as a blank line.
            if self.width <= 1 || format.separator.is_whitespace() {
                return Err(CsvError::format(
                    Position::line(number),
                    "",
                    "an empty row cannot be written in a single-column or blank-separated table",
                ));
            }
            return Ok(format.separator.to_string());
        }
        let mut tokens = Vec::with_capacity(used);
        for (column, value) in row[..used].iter().enumerate() {
            let token = encode(value, format);
            if !bare_reserved_in(&token, format).is_empty() {
                return Err(CsvError::format(
                    Position::at(number, column + 1),
                    token,
                    "encoded value still holds a reserved character",
                ));
            }
            tokens.push(token);
        }
        Ok(tokens.join(&format.separator.to_string()))
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        self.items = None;
        let writer = self.writer;
        for comment in writer.layer.footer_comments() {
            let number = self.number + self.pending.len() + 1;
            self.pending.push_back(writer.comment_line(&comment, number)?);
        }
        for line in provenance(&writer.format) {
            self.pending.push_back(writer.comment_text(&line));
        }
        Ok(())
    }

    fn fail(&mut self, error: CsvError) -> Option<Result<String>> {
        self.finished = true;
        self.items = None;
        self.pending.clear();
        Some(Err(error))
    }
}

impl<'w, L, I> Iterator for Lines<'w, L, I>
where
    L: WriteLayer,
    I: Iterator,
    I::Item: Borrow<L::Item>,
{
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                self.number += 1;
                return Some(Ok(line));
            }
            if self.finished {
                return None;
            }
            let item = self.items.as_mut().and_then(Iterator::next);
            match item {
                Some(item) => {
                    return match self.render_row(item.borrow()) {
                        Ok(line) => {
                            self.number += 1;
                            Some(Ok(line))
                        }
                        Err(error) => self.fail(error),
                    };
                }
                None => {
                    if let Err(error) = self.finish() {
                        return self.fail(error);
                    }
                }
            }
        }
    }
}
