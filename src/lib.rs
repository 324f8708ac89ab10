//! Read and write layered, semicolon-separated text tables.
//!
//! A table is a header line naming the columns followed by one line per
//! row. Lines starting with the comment character are ignored by readers,
//! so writers use them for free-form header and footer notes. Formats are
//! built in layers: a derived format extends the column registry of its
//! base and delegates the base columns to the base layer.
pub mod csv;
mod errors;

use std::fmt;

pub use crate::csv::{
    columns::{scope, unscope, ColumnRegistry, SCOPE_SEPARATOR},
    reader::{
        read_from, read_lines, CsvReader, ExtraTokens, Header, HeaderOrder, ReadLayer,
        ReaderOptions, Record,
    },
    writer::{provenance, CsvWriter, Lines, WriteLayer},
    Format,
};
pub use crate::errors::{CsvError, Result};

/// A location in the input: 1-based line number and 1-based table column
/// (token index). A column of 0 means the whole line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn line(line: usize) -> Self {
        Self { line, column: 0 }
    }

    pub fn at(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.column == 0 {
            write!(f, "line {}", self.line)
        } else {
            write!(f, "line {}, column {}", self.line, self.column)
        }
    }
}
