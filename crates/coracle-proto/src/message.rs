//! RFC1459 message parsing and serialization.
//!
//! Wire format:
//!
//! ```text
//! [@tags] [:source] <verb> [params...] [:trailing]
//! ```
//!
//! The parser is nom-based and tolerant: multiple consecutive spaces separate
//! parameters, and trailing `\r`/`\n` are ignored. Serialization via
//! [`Display`] emits the line *without* the terminating `\r\n`, so callers
//! can enforce their line-length limit before framing.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use nom::{
    bytes::complete::{take_until, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    sequence::preceded,
    IResult,
};

use crate::error::MessageParseError;
use crate::tags::{escape_tag_value, unescape_tag_value};

/// An IRC message: IRCv3 tags, optional source, a verb, and its parameters.
///
/// The verb is kept exactly as received; dispatch keys are obtained through
/// [`Message::event_name`], which uppercases it. Tag order is not
/// significant, so tags live in a sorted map and serialize deterministically.
#[derive(Clone, Debug, Eq)]
pub struct Message {
    /// IRCv3 message tags. A `None` value is a valueless flag tag.
    pub tags: BTreeMap<String, Option<String>>,
    /// Message source (the `:prefix`), when present.
    pub source: Option<String>,
    /// Command verb or numeric, as received.
    pub verb: String,
    /// Parameters, including the trailing parameter (un-prefixed).
    pub params: Vec<String>,
    /// Force the final parameter to serialize as `:trailing` even when the
    /// colon is not syntactically required (e.g. `PING :<cookie>`).
    pub trailing: bool,
}

/// Equality ignores the `trailing` presentation flag: two messages that
/// differ only in whether the colon was forced carry the same content.
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.tags == other.tags
            && self.source == other.source
            && self.verb == other.verb
            && self.params == other.params
    }
}

impl Message {
    /// Create a message with the given verb and no parameters.
    pub fn new(verb: impl Into<String>) -> Self {
        Message {
            tags: BTreeMap::new(),
            source: None,
            verb: verb.into(),
            params: Vec::new(),
            trailing: false,
        }
    }

    /// Replace the parameter list.
    #[must_use]
    pub fn with_params<I, P>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Append one parameter.
    #[must_use]
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Append a final parameter that always serializes with the `:` prefix.
    #[must_use]
    pub fn with_trailing_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self.trailing = true;
        self
    }

    /// Set the message source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach one IRCv3 tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.tags.insert(key.into(), value);
        self
    }

    /// The dispatch key for this message: the uppercased verb.
    pub fn event_name(&self) -> String {
        self.verb.to_ascii_uppercase()
    }

    /// Parse a single wire line (without framing) into a message.
    pub fn parse(line: &str) -> Result<Message, MessageParseError> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return Err(MessageParseError::Empty);
        }

        let (rest, (tags, source, verb)) =
            parse_head(trimmed).map_err(|_| MessageParseError::InvalidVerb(trimmed.to_string()))?;
        let (params, trailing) = parse_params(rest);

        Ok(Message {
            tags: tags.map(parse_tag_map).unwrap_or_default(),
            source: source.map(str::to_string),
            verb: verb.to_string(),
            params: params.into_iter().map(str::to_string).collect(),
            trailing,
        })
    }
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Message::parse(s)
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            write!(f, "@")?;
            for (i, (key, value)) in self.tags.iter().enumerate() {
                if i > 0 {
                    write!(f, ";")?;
                }
                write!(f, "{}", key)?;
                if let Some(value) = value {
                    write!(f, "=")?;
                    escape_tag_value(f, value)?;
                }
            }
            write!(f, " ")?;
        }

        if let Some(ref source) = self.source {
            write!(f, ":{} ", source)?;
        }

        write!(f, "{}", self.verb)?;

        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if i == last && (self.trailing || needs_trailing(param)) {
                write!(f, " :{}", param)?;
            } else {
                debug_assert!(!param.contains(' '), "inner parameter contains a space");
                write!(f, " {}", param)?;
            }
        }

        Ok(())
    }
}

/// Whether a final parameter must be written as a trailing parameter.
fn needs_trailing(param: &str) -> bool {
    param.is_empty() || param.contains(' ') || param.starts_with(':')
}

/// Parse the `@tags`, `:source` and verb portions of a line.
fn parse_head(input: &str) -> IResult<&str, (Option<&str>, Option<&str>, &str)> {
    let (input, tags) = opt(preceded(char('@'), take_until(" ")))(input)?;
    let (input, _) = space0(input)?;
    let (input, source) = opt(preceded(char(':'), take_while1(|c| c != ' ')))(input)?;
    let (input, _) = space0(input)?;
    let (input, verb) = take_while1(|c: char| c.is_alphanumeric())(input)?;
    Ok((input, (tags, source, verb)))
}

/// Split the remainder of a line into parameters, honoring the trailing
/// rule. Also reports whether the final parameter was colon-prefixed.
fn parse_params(input: &str) -> (Vec<&str>, bool) {
    let mut params = Vec::new();
    let mut rest = input;
    let mut saw_trailing = false;

    while rest.starts_with(' ') {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }

        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing);
            saw_trailing = true;
            break;
        }

        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    (params, saw_trailing)
}

/// Decode the raw tag section (`key[=value][;...]`) into a map.
fn parse_tag_map(raw: &str) -> BTreeMap<String, Option<String>> {
    let mut tags = BTreeMap::new();
    for item in raw.split(';') {
        if item.is_empty() {
            continue;
        }
        match item.split_once('=') {
            Some((key, value)) => tags.insert(key.to_string(), Some(unescape_tag_value(value))),
            None => tags.insert(item.to_string(), None),
        };
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_verb() {
        let msg = Message::parse("PING").unwrap();
        assert_eq!(msg.verb, "PING");
        assert!(msg.tags.is_empty());
        assert!(msg.source.is_none());
        assert!(msg.params.is_empty());
    }

    #[test]
    fn parse_trailing_param() {
        let msg = Message::parse("PRIVMSG #channel :Hello, world!").unwrap();
        assert_eq!(msg.params, vec!["#channel", "Hello, world!"]);
    }

    #[test]
    fn parse_source_and_numeric() {
        let msg = Message::parse(":server 001 nick :Welcome").unwrap();
        assert_eq!(msg.source.as_deref(), Some("server"));
        assert_eq!(msg.verb, "001");
        assert_eq!(msg.params, vec!["nick", "Welcome"]);
    }

    #[test]
    fn parse_tags() {
        let msg = Message::parse("@account=bob;bot :n!u@h PRIVMSG #ch :hi").unwrap();
        assert_eq!(msg.tags.get("account"), Some(&Some("bob".to_string())));
        assert_eq!(msg.tags.get("bot"), Some(&None));
    }

    #[test]
    fn parse_collapses_spaces() {
        let msg = Message::parse("USER  guest   0 * :Real Name").unwrap();
        assert_eq!(msg.params, vec!["guest", "0", "*", "Real Name"]);
    }

    #[test]
    fn parse_empty_trailing() {
        let msg = Message::parse("TOPIC #chan :").unwrap();
        assert_eq!(msg.params, vec!["#chan", ""]);
    }

    #[test]
    fn parse_accepts_crlf() {
        let msg = Message::parse("PING :server\r\n").unwrap();
        assert_eq!(msg.params, vec!["server"]);
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(Message::parse("\r\n"), Err(MessageParseError::Empty));
    }

    #[test]
    fn event_name_uppercases() {
        assert_eq!(Message::parse("privmsg x :y").unwrap().event_name(), "PRIVMSG");
    }

    #[test]
    fn serialize_plain_last_param_has_no_colon() {
        let msg = Message::new("AUTHENTICATE").with_param("+");
        assert_eq!(msg.to_string(), "AUTHENTICATE +");
    }

    #[test]
    fn forced_trailing_serializes_with_colon() {
        let msg = Message::new("PING").with_trailing_param("12345");
        assert_eq!(msg.to_string(), "PING :12345");

        let parsed = Message::parse("PING :12345").unwrap();
        assert!(parsed.trailing);
        assert_eq!(parsed.to_string(), "PING :12345");
    }

    #[test]
    fn serialize_with_source_and_trailing() {
        let msg = Message::new("QUIT")
            .with_source("nick!user@host")
            .with_param("Gone fishing");
        assert_eq!(msg.to_string(), ":nick!user@host QUIT :Gone fishing");
    }

    #[test]
    fn serialize_tags_escape_values() {
        let msg = Message::new("TAGMSG")
            .with_tag("note", Some("a b;c".to_string()))
            .with_param("#chan");
        assert_eq!(msg.to_string(), "@note=a\\sb\\:c TAGMSG #chan");
    }

    #[test]
    fn round_trip() {
        let cases = [
            "PING :12345",
            ":irc.example.org 005 alice NETWORK=example NICKLEN=30 :are supported by this server",
            "@account=bob :alice!a@host QUIT :bye",
            "@bot :x!y@z PRIVMSG #chan :hello there",
            "MODE alice +iw",
        ];
        for case in cases {
            let msg = Message::parse(case).unwrap();
            assert_eq!(Message::parse(&msg.to_string()).unwrap(), msg, "{case}");
        }
    }

    #[test]
    fn round_trip_constructed() {
        let msg = Message::new("900")
            .with_source("irc.example.org")
            .with_params(["alice", "alice!a@h", "bob", "You are now logged in as bob"])
            .with_tag("time", Some("2023-01-01T00:00:00Z".to_string()));
        assert_eq!(Message::parse(&msg.to_string()).unwrap(), msg);
    }
}
