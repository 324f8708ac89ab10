use crate::Position;
use std::io;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CsvError {
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed input: the pass cannot continue past this line.
    #[error("Invalid input ({position}): {message} in {line:?}")]
    Format {
        position: Position,
        line: String,
        message: String,
    },

    /// A layer asked for a column it never declared, or declared one twice
    /// with conflicting meaning.
    #[error("Column error: {0}")]
    Column(String),

    #[error("Invalid format: {0}")]
    Config(String),
}

impl CsvError {
    pub(crate) fn format(
        position: Position,
        line: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CsvError::Format {
            position,
            line: line.into(),
            message: message.into(),
        }
    }

    /// Point a format error at the line (and table column) it came from.
    pub(crate) fn located(self, at: Position, raw: &str) -> Self {
        match self {
            CsvError::Format { message, .. } => CsvError::Format {
                position: at,
                line: raw.to_string(),
                message,
            },
            other => other,
        }
    }

    pub(crate) fn column(message: impl Into<String>) -> Self {
        CsvError::Column(message.into())
    }

    /// True for errors caused by bad data rather than a bad layer setup.
    pub fn is_format(&self) -> bool {
        matches!(self, CsvError::Format { .. })
    }
}

impl From<io::Error> for CsvError {
    fn from(error: io::Error) -> Self {
        CsvError::Io(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CsvError>;
