//! IRCv3 message tag value escaping.
//!
//! Reference: <https://ircv3.net/specs/extensions/message-tags>

use std::fmt::{Result as FmtResult, Write};

/// Escape a tag value for serialization.
pub fn escape_tag_value(f: &mut dyn Write, value: &str) -> FmtResult {
    for c in value.chars() {
        match c {
            ';' => f.write_str("\\:")?,
            ' ' => f.write_str("\\s")?,
            '\\' => f.write_str("\\\\")?,
            '\r' => f.write_str("\\r")?,
            '\n' => f.write_str("\\n")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

/// Unescape a tag value from wire format.
///
/// A trailing lone backslash is dropped, and unknown escapes resolve to the
/// escaped character, per the message-tags spec.
pub fn unescape_tag_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let r = if c == '\\' {
            match iter.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(c) => c,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(r);
    }
    unescaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escape(value: &str) -> String {
        let mut out = String::new();
        escape_tag_value(&mut out, value).unwrap();
        out
    }

    #[test]
    fn escape_round_trip() {
        for raw in ["plain", "semi;colon", "with space", "back\\slash", "cr\rlf\n"] {
            assert_eq!(unescape_tag_value(&escape(raw)), raw);
        }
    }

    #[test]
    fn unknown_escape_resolves_to_char() {
        assert_eq!(unescape_tag_value("\\x"), "x");
    }

    #[test]
    fn trailing_backslash_dropped() {
        assert_eq!(unescape_tag_value("abc\\"), "abc");
    }
}
