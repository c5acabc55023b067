/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! # mail-stream
//!
//! _mail-stream_ is a **streaming, push-driven e-mail parsing library** written in Rust that
//! conforms to the Internet Message Format standard (_RFC 5322_), the Multipurpose Internet Mail
//! Extensions (MIME; _RFC 2045 - 2046_) and internationalized headers (_RFC 6531 / RFC 6532_),
//! while tolerating the obsolete syntaxes of _RFC 822_ that are still found on the wire.
//!
//! The parser is fed raw byte chunks as they arrive and emits a sequence of semantic events
//! through a [`MessageHandler`]: headers decoded to strongly typed values (dates, address lists,
//! message-id lists, content descriptors) and body content, including the recursive descent into
//! multipart bodies. Messages are never buffered whole; the parser keeps a single rolling input
//! buffer holding only the incomplete suffix of the input.
//!
//! In general, this library abides by Postel's law or
//! [Robustness Principle](https://en.wikipedia.org/wiki/Robustness_principle): a best effort is
//! made to parse non-conformant messages. Obsolete but salvageable structures are reported
//! through [`MessageHandler::obsolete_structure`] immediately before their decoded value;
//! header values that cannot be decoded at all are demoted to
//! [`MessageHandler::unexpected_header`] events and parsing continues.
//!
//! ## Usage Example
//!
//! ```
//! use mail_stream::{Abort, MessageHandler, MessageParser};
//!
//! #[derive(Default)]
//! struct Subjects(Vec<String>);
//!
//! impl MessageHandler for Subjects {
//!     fn header(&mut self, name: &str, text: &str) -> Result<(), Abort> {
//!         if name.eq_ignore_ascii_case("subject") {
//!             self.0.push(text.to_string());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut parser = MessageParser::new(Subjects::default());
//! parser.receive(b"Subject: =?utf-8?q?Hello_world?=\r\n\r\n").unwrap();
//! parser.close().unwrap();
//! assert_eq!(parser.handler().0, ["Hello world"]);
//! ```

pub mod core;
pub mod decoders;
pub mod parsers;
pub mod stream;

use std::{
    borrow::Cow,
    hash::{Hash, Hasher},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use crate::core::is_mime_type;
pub use stream::{
    handler::{Abort, Locator, MessageHandler},
    message::MessageParser,
};

/// An RFC5322 mailbox: an optional display name and an addr-spec.
#[derive(Debug, Default, Clone, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Addr<'x> {
    /// Display name, with RFC2047 encoded words decoded.
    #[cfg_attr(feature = "serde", serde(default))]
    pub display_name: Option<Cow<'x, str>>,

    /// Local part, case significant.
    pub local_part: Cow<'x, str>,

    /// Domain or domain literal (brackets included), case insignificant.
    pub domain: Cow<'x, str>,

    /// True when the address was written without angle brackets.
    #[cfg_attr(feature = "serde", serde(default))]
    pub simple_address: bool,

    /// Comments collected while parsing, in source order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub comments: Vec<Cow<'x, str>>,
}

/// An RFC5322 address group. The member list may be empty when the
/// group is a symbolic name only.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Group<'x> {
    pub name: Cow<'x, str>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub addresses: Vec<Addr<'x>>,
}

/// A single element of an address list: a mailbox or a group.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Address<'x> {
    Addr(Addr<'x>),
    Group(Group<'x>),
}

/// An RFC5322 msg-id, used by Message-ID, In-Reply-To, References
/// and Content-ID. Both sides compare case-sensitively, msg-ids
/// are opaque tokens.
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContentId<'x> {
    pub local_part: Cow<'x, str>,
    pub domain: Cow<'x, str>,
}

/// A structured header parameter. Names are stored lowercase and
/// compare case-insensitively; value case is preserved.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Parameter<'x> {
    pub name: Cow<'x, str>,
    pub value: Cow<'x, str>,
}

/// An RFC2045 Content-Type value. Type and subtype are stored
/// lowercase; parameters keep their source order.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContentType<'x> {
    pub c_type: Cow<'x, str>,
    pub c_subtype: Cow<'x, str>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: Vec<Parameter<'x>>,
}

/// An RFC2183 Content-Disposition value.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContentDisposition<'x> {
    pub c_disposition: Cow<'x, str>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: Vec<Parameter<'x>>,
}

/// The MIME-Version header value. Only `1.0` has ever been defined.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MimeVersion {
    V1_0,
}

/// An RFC5322 datetime with a fixed UTC offset.
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub tz_before_gmt: bool,
    pub tz_hour: u8,
    pub tz_minute: u8,
}

/// Obsolete RFC822 structure detected while parsing. Reported to the
/// handler immediately before the decoded value it refers to.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ObsoleteKind {
    FoldingWhiteSpace,
    HeaderSyntax,
    DateTime,
    Address,
    MessageId,
    StructuredParameter,
}

/// Fatal parsing errors. Once one of these is returned from
/// [`MessageParser::receive`] or [`MessageParser::close`], the parser
/// ignores further input until [`MessageParser::reset`] is called.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("input buffer limit of {0} bytes exceeded")]
    BufferLimitExceeded(usize),
    #[error("invalid multipart boundary {0:?}")]
    InvalidBoundary(String),
    #[error("missing close delimiter for boundary {0:?}")]
    MissingCloseDelimiter(String),
    #[error("unterminated quoted string in header {0:?}")]
    UnterminatedQuote(String),
    #[error("parsing aborted by handler: {0}")]
    Aborted(String),
}

impl PartialEq for Addr<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.local_part == other.local_part
            && self.domain.eq_ignore_ascii_case(other.domain.as_ref())
    }
}

impl Hash for Addr<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.local_part.hash(state);
        for ch in self.domain.as_bytes() {
            state.write_u8(ch.to_ascii_lowercase());
        }
    }
}
