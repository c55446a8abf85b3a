//! # coracle-proto
//!
//! The message codec for the Coracle IRC daemon: RFC1459 line
//! parsing/serialization with IRCv3 message tags, RFC1459 casemapping, and
//! nickname/hostname validation.
//!
//! Unlike typed-command protocol libraries, messages here keep their verb and
//! parameters as plain strings: the daemon dispatches on uppercased verbs, so
//! the codec stays a faithful record of what was on the wire.
//!
//! ## Quick start
//!
//! ```rust
//! use coracle_proto::Message;
//!
//! let msg: Message = "@account=bob :nick!u@host PRIVMSG #chan :Hello!".parse().unwrap();
//! assert_eq!(msg.verb, "PRIVMSG");
//! assert_eq!(msg.params, vec!["#chan", "Hello!"]);
//!
//! let out = Message::new("NOTICE")
//!     .with_params(["target", "some text"])
//!     .with_source("irc.example.org");
//! assert_eq!(out.to_string(), ":irc.example.org NOTICE target :some text");
//! ```

#![deny(clippy::all)]

pub mod casemap;
pub mod error;
pub mod message;
pub mod tags;
pub mod validation;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::error::MessageParseError;
pub use self::message::Message;
pub use self::validation::{is_valid_hostname, is_valid_nickname};
