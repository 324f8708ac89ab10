//! Escaping of single values and splitting of lines into tokens.
//!
//! A value is written as a token by putting the escape character in front
//! of every separator, comment and escape character it contains. Nothing
//! else is touched, so a token may carry arbitrary whitespace.

use enumset::{EnumSet, EnumSetType};
use itertools::Itertools;

use super::Format;
use crate::errors::{CsvError, Result};
use crate::Position;

/// The characters that cannot appear bare inside a token.
#[derive(EnumSetType, Debug)]
pub enum Reserved {
    Separator,
    Comment,
    Escape,
}

/// What a physical line holds once inline comments are cut off.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LineKind<'l> {
    Blank,
    Comment,
    /// The data part of the line, before any unescaped comment character.
    Data(&'l str),
}

impl Format {
    fn reserved(&self, ch: char) -> Option<Reserved> {
        match ch {
            _ if ch == self.separator => Some(Reserved::Separator),
            _ if ch == self.comment => Some(Reserved::Comment),
            _ if ch == self.escape => Some(Reserved::Escape),
            _ => None,
        }
    }
}

/// Which reserved characters occur in `s`, escaped or not.
pub fn reserved_in(s: &str, format: &Format) -> EnumSet<Reserved> {
    s.chars().filter_map(|ch| format.reserved(ch)).collect()
}

/// Reserved characters in `token` that are not preceded by an escape.
pub fn bare_reserved_in(token: &str, format: &Format) -> EnumSet<Reserved> {
    let mut found = EnumSet::new();
    let mut chars = token.chars();
    while let Some(ch) = chars.next() {
        if ch == format.escape {
            if chars.next().is_none() {
                found.insert(Reserved::Escape);
            }
        } else if let Some(reserved) = format.reserved(ch) {
            found.insert(reserved);
        }
    }
    found
}

/// Turn a value into a token that is safe to place on a data line.
pub fn encode(value: &str, format: &Format) -> String {
    let mut token = String::with_capacity(value.len());
    for ch in value.chars() {
        if format.reserved(ch).is_some() {
            token.push(format.escape);
        }
        token.push(ch);
    }
    token
}

/// Undo [`encode`].
///
/// Fails on a lone escape at the end of the token and on an escape in front
/// of a character that never needs one, since neither can come from
/// `encode`. The error carries no position; the reader fills in the line
/// and column the token came from.
pub fn decode(token: &str, format: &Format) -> Result<String> {
    if !token.contains(format.escape) {
        return Ok(token.to_owned());
    }
    let mut value = String::with_capacity(token.len());
    let mut chars = token.chars().enumerate();
    while let Some((column, ch)) = chars.next() {
        if ch != format.escape {
            value.push(ch);
            continue;
        }
        match chars.next() {
            Some((_, next)) if format.reserved(next).is_some() => value.push(next),
            Some((_, next)) => {
                return Err(CsvError::format(
                    Position::default(),
                    token,
                    format!(
                        "escape before unreserved character {next:?} at character {}",
                        column + 1
                    ),
                ))
            }
            None => {
                return Err(CsvError::format(
                    Position::default(),
                    token,
                    format!("truncated escape sequence at character {}", column + 1),
                ))
            }
        }
    }
    Ok(value)
}

/// Classify a raw line, cutting off an inline comment if there is one.
pub fn classify<'l>(line: &'l str, format: &Format) -> LineKind<'l> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with(format.comment) {
        return LineKind::Comment;
    }
    let mut chars = line.char_indices();
    while let Some((i, ch)) = chars.next() {
        if ch == format.escape {
            chars.next();
        } else if ch == format.comment {
            let data = &line[..i];
            return if data.trim().is_empty() {
                LineKind::Comment
            } else {
                LineKind::Data(data)
            };
        }
    }
    LineKind::Data(line)
}

/// Split the data part of a line at every unescaped separator.
///
/// Tokens come back raw: still escaped and untrimmed.
pub fn split<'l>(line: &'l str, format: &Format) -> Vec<&'l str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices();
    while let Some((i, ch)) = chars.next() {
        if ch == format.escape {
            // An escaped separator is part of the token.
            chars.next();
        } else if ch == format.separator {
            tokens.push(&line[start..i]);
            start = i + ch.len_utf8();
        }
    }
    tokens.push(&line[start..]);
    tokens
}

/// Encode every value and join the tokens with the separator.
pub fn join<S: AsRef<str>>(values: &[S], format: &Format) -> String {
    values
        .iter()
        .map(|value| encode(value.as_ref(), format))
        .join(&format.separator.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fmt() -> Format {
        Format::default()
    }

    #[test]
    fn test_encode_escapes_only_reserved() {
        assert_eq!(encode("plain text", &fmt()), "plain text");
        assert_eq!(encode("a;b", &fmt()), r"a\;b");
        assert_eq!(encode("#1", &fmt()), "\\#1");
        assert_eq!(encode("C:\\x", &fmt()), "C:\\\\x");
        assert_eq!(encode(" ; ", &fmt()), r" \; ");
        assert_eq!(encode("", &fmt()), "");
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode(r"a\;b", &fmt()), Ok("a;b".to_string()));
        assert_eq!(decode("\\\\\\#", &fmt()), Ok("\\#".to_string()));
        assert_eq!(decode("nothing", &fmt()), Ok("nothing".to_string()));
    }

    #[test]
    fn test_decode_truncated_escape() {
        assert_eq!(
            decode("ab\\", &fmt()),
            Err(CsvError::format(
                Position::default(),
                "ab\\",
                "truncated escape sequence at character 3"
            ))
        );
        assert!(decode("\\\\\\", &fmt()).unwrap_err().is_format());
        assert!(decode("\\x", &fmt()).unwrap_err().is_format());
    }

    #[test]
    fn test_split_respects_escapes() {
        assert_eq!(split("a;b;c", &fmt()), vec!["a", "b", "c"]);
        assert_eq!(split(r"a\;b;c", &fmt()), vec![r"a\;b", "c"]);
        // An even run of escapes leaves the separator bare.
        assert_eq!(split(r"a\\;b", &fmt()), vec![r"a\\", "b"]);
        assert_eq!(split(r"a\\\;b", &fmt()), vec![r"a\\\;b"]);
        assert_eq!(split(";", &fmt()), vec!["", ""]);
        assert_eq!(split("", &fmt()), vec![""]);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("", &fmt()), LineKind::Blank);
        assert_eq!(classify(" \t ", &fmt()), LineKind::Blank);
        assert_eq!(classify("# test comment", &fmt()), LineKind::Comment);
        assert_eq!(classify("  # 11;12", &fmt()), LineKind::Comment);
        assert_eq!(classify("1;2 # note", &fmt()), LineKind::Data("1;2 "));
        assert_eq!(classify("1\\#2;3", &fmt()), LineKind::Data("1\\#2;3"));
        assert_eq!(classify(";", &fmt()), LineKind::Data(";"));
    }

    #[test]
    fn test_other_reserved_characters() {
        let format = Format::new(',', '@', '%').unwrap();
        assert_eq!(encode("50%,@x;", &format), "50%%%,%@x;");
        assert_eq!(split("a%,b,c;d", &format), vec!["a%,b", "c;d"]);
        assert_eq!(decode("a%,b", &format), Ok("a,b".to_string()));
    }

    #[test]
    fn test_reserved_in() {
        assert!(reserved_in("abc", &fmt()).is_empty());
        assert_eq!(
            reserved_in("a;b#", &fmt()),
            Reserved::Separator | Reserved::Comment
        );
        assert!(bare_reserved_in(r"a\;b\#", &fmt()).is_empty());
        assert_eq!(bare_reserved_in("a;b", &fmt()), EnumSet::only(Reserved::Separator));
        assert_eq!(bare_reserved_in("ab\\", &fmt()), EnumSet::only(Reserved::Escape));
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(s in "[^\n\r]*") {
            let token = encode(&s, &fmt());
            prop_assert!(bare_reserved_in(&token, &fmt()).is_empty());
            prop_assert_eq!(decode(&token, &fmt()), Ok(s));
        }

        #[test]
        fn prop_split_inverts_join(values in prop::collection::vec("[a-c;#\\\\ ]{0,6}", 1..6)) {
            let line = join(&values, &fmt());
            let decoded = split(&line, &fmt())
                .into_iter()
                .map(|token| decode(token, &fmt()))
                .collect::<Result<Vec<_>>>();
            prop_assert_eq!(decoded, Ok(values));
        }
    }
}
