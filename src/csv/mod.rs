//! Line-oriented tables with escaped separators and comment lines
//!
//! Every line of a table is either blank, a comment (first non-blank
//! character is the comment character), or a data line made of tokens
//! joined by the separator. The first data line is the header. Separator,
//! comment and escape characters inside values are escaped on write, so
//! values never need quoting and a line never spans more than one row.
//!
//! The pieces build on each other:
//! - `codec` escapes single values and splits lines into tokens.
//! - `columns` maps column names to stable indices across format layers.
//! - `reader` turns lines into rows through a `ReadLayer`.
//! - `writer` turns rows into lines through a `WriteLayer`.
pub mod codec;
pub mod columns;
pub mod reader;
pub mod writer;

use crate::errors::{CsvError, Result};
use serde::{Deserialize, Serialize};

/// The default column separator.
pub const SEPARATOR: char = ';';

/// Lines whose first non-blank character is this are comments.
pub const COMMENT_START: char = '#';

/// Prefix that makes the next reserved character literal.
pub const ESCAPE: char = '\\';

/// The reserved characters of a table.
///
/// The default is `;` `#` `\`. The separator may be a tab or another
/// blank character; the comment and escape characters must be visible.
/// Deserializing validates, so a format loaded from configuration is
/// always usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FormatConfig")]
pub struct Format {
    pub separator: char,
    pub comment: char,
    pub escape: char,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            separator: SEPARATOR,
            comment: COMMENT_START,
            escape: ESCAPE,
        }
    }
}

/// The shape of a `Format` in configuration files, before validation.
#[derive(Deserialize)]
#[serde(default)]
struct FormatConfig {
    separator: char,
    comment: char,
    escape: char,
}

impl Default for FormatConfig {
    fn default() -> Self {
        let Format {
            separator,
            comment,
            escape,
        } = Format::default();
        Self {
            separator,
            comment,
            escape,
        }
    }
}

impl TryFrom<FormatConfig> for Format {
    type Error = CsvError;

    fn try_from(config: FormatConfig) -> Result<Self> {
        Format::new(config.separator, config.comment, config.escape)
    }
}

impl Format {
    pub fn new(separator: char, comment: char, escape: char) -> Result<Self> {
        let format = Self {
            separator,
            comment,
            escape,
        };
        format.validate()?;
        Ok(format)
    }

    /// Same reserved characters, different separator.
    pub fn with_separator(self, separator: char) -> Result<Self> {
        Self::new(separator, self.comment, self.escape)
    }

    pub fn with_escape(self, escape: char) -> Result<Self> {
        Self::new(self.separator, self.comment, escape)
    }

    pub fn validate(&self) -> Result<()> {
        // Tokens are trimmed after splitting, so a blank separator is fine.
        let separator = self.separator;
        if matches!(separator, '\n' | '\r') || (separator.is_control() && !separator.is_whitespace())
        {
            return Err(CsvError::Config(format!(
                "separator character {separator:?} cannot separate columns"
            )));
        }
        for (what, ch) in [("comment", self.comment), ("escape", self.escape)] {
            if ch.is_whitespace() || ch.is_control() {
                return Err(CsvError::Config(format!(
                    "{what} character {ch:?} must be visible"
                )));
            }
        }
        if self.separator == self.comment
            || self.separator == self.escape
            || self.comment == self.escape
        {
            return Err(CsvError::Config(format!(
                "separator {:?}, comment {:?} and escape {:?} must differ",
                self.separator, self.comment, self.escape
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_is_valid() {
        assert_eq!(Format::default().validate(), Ok(()));
        assert_eq!(Format::new(';', '#', '\\'), Ok(Format::default()));
    }

    #[test]
    fn test_reserved_characters_must_differ() {
        assert!(matches!(Format::new(';', ';', '\\'), Err(CsvError::Config(_))));
        assert!(matches!(
            Format::default().with_escape('#'),
            Err(CsvError::Config(_))
        ));
        assert!(matches!(
            Format::default().with_separator('\\'),
            Err(CsvError::Config(_))
        ));
    }

    #[test]
    fn test_blank_separators() {
        assert_eq!(
            Format::default().with_separator('\t'),
            Ok(Format {
                separator: '\t',
                ..Format::default()
            })
        );
        assert!(Format::default().with_separator(' ').is_ok());
        assert!(matches!(
            Format::default().with_separator('\n'),
            Err(CsvError::Config(_))
        ));
        assert!(matches!(
            Format::default().with_separator('\u{0}'),
            Err(CsvError::Config(_))
        ));
        assert!(matches!(Format::new(';', ' ', '\\'), Err(CsvError::Config(_))));
        assert!(matches!(
            Format::default().with_escape('\t'),
            Err(CsvError::Config(_))
        ));
        assert_eq!(
            Format::default().with_separator(','),
            Ok(Format {
                separator: ',',
                ..Format::default()
            })
        );
    }

    #[test]
    fn test_format_from_config() {
        let format: Format = serde_json::from_str(r#"{"separator": ","}"#).unwrap();
        assert_eq!(format.separator, ',');
        assert_eq!(format.comment, COMMENT_START);
        assert_eq!(format.escape, ESCAPE);

        let tab: Format = serde_json::from_str(r#"{"separator": "\t"}"#).unwrap();
        assert_eq!(tab.separator, '\t');

        let bad = serde_json::from_str::<Format>(r##"{"escape": "#"}"##);
        assert!(bad.is_err());

        let text = serde_json::to_string(&format).unwrap();
        assert_eq!(serde_json::from_str::<Format>(&text).unwrap(), format);
    }
}
