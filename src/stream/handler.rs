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

use std::{cell::Cell, fmt, rc::Rc};

use crate::{
    Address, ContentDisposition, ContentId, ContentType, DateTime, MimeVersion, ObsoleteKind,
    ParseError,
};

/// Cancellation signal returned by a [`MessageHandler`] callback to stop
/// the parse. It surfaces to the `receive`/`close` caller as
/// [`ParseError::Aborted`]; the parser must be reset before reuse.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Abort {
    reason: String,
}

impl Abort {
    pub fn new(reason: impl Into<String>) -> Abort {
        Abort {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.reason)
    }
}

impl From<Abort> for ParseError {
    fn from(abort: Abort) -> ParseError {
        ParseError::Aborted(abort.reason)
    }
}

/// A cheaply clonable handle onto the parser's live position, handed to
/// the handler once before parsing starts. It tracks the number of input
/// bytes consumed so far and the current entity nesting depth.
#[derive(Clone, Default)]
pub struct Locator {
    position: Rc<Cell<(usize, usize)>>,
}

impl Locator {
    pub fn byte_offset(&self) -> usize {
        self.position.get().0
    }

    pub fn depth(&self) -> usize {
        self.position.get().1
    }

    pub(crate) fn set(&self, byte_offset: usize, depth: usize) {
        self.position.set((byte_offset, depth));
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let (byte_offset, depth) = self.position.get();
        fmt.debug_struct("Locator")
            .field("byte_offset", &byte_offset)
            .field("depth", &depth)
            .finish()
    }
}

/// The event sink of the parser: one callback per semantic event, all
/// with default empty implementations so handlers only pick what they
/// need. Callbacks are invoked synchronously from within
/// [`receive`](crate::MessageParser::receive) and
/// [`close`](crate::MessageParser::close), in input byte order.
///
/// Any callback may cancel the parse by returning an [`Abort`]; it is
/// propagated to the caller as [`ParseError::Aborted`] and the parser
/// must be [`reset`](crate::MessageParser::reset) before reuse.
///
/// Obsolete syntax is announced through [`obsolete_structure`] emitted
/// strictly before the decoded event it refers to, with no interleaving
/// events in between.
///
/// [`obsolete_structure`]: MessageHandler::obsolete_structure
#[allow(unused_variables)]
pub trait MessageHandler {
    /// Called once before parsing starts.
    fn set_locator(&mut self, locator: Locator) -> Result<(), Abort> {
        Ok(())
    }

    /// A message or part begins. The boundary is `None` for the root
    /// message and the enclosing delimiter for multipart children.
    fn start_entity(&mut self, boundary: Option<&str>) -> Result<(), Abort> {
        Ok(())
    }

    /// The matching end of [`start_entity`](MessageHandler::start_entity).
    fn end_entity(&mut self, boundary: Option<&str>) -> Result<(), Abort> {
        Ok(())
    }

    fn content_type(&mut self, content_type: &ContentType<'_>) -> Result<(), Abort> {
        Ok(())
    }

    fn content_disposition(
        &mut self,
        content_disposition: &ContentDisposition<'_>,
    ) -> Result<(), Abort> {
        Ok(())
    }

    fn content_transfer_encoding(&mut self, encoding: &str) -> Result<(), Abort> {
        Ok(())
    }

    fn content_id(&mut self, content_id: &ContentId<'_>) -> Result<(), Abort> {
        Ok(())
    }

    fn content_description(&mut self, text: &str) -> Result<(), Abort> {
        Ok(())
    }

    fn mime_version(&mut self, version: MimeVersion) -> Result<(), Abort> {
        Ok(())
    }

    /// The header block of the current entity is complete.
    fn end_headers(&mut self) -> Result<(), Abort> {
        Ok(())
    }

    /// An unstructured header, with RFC2047 encoded words decoded.
    fn header(&mut self, name: &str, text: &str) -> Result<(), Abort> {
        Ok(())
    }

    /// A structured header whose value could not be decoded, not even by
    /// the obsolete salvage parsers. Never fatal.
    fn unexpected_header(&mut self, name: &str, raw_value: &str) -> Result<(), Abort> {
        Ok(())
    }

    fn date_header(&mut self, name: &str, datetime: DateTime) -> Result<(), Abort> {
        Ok(())
    }

    /// An address header; the list is never empty.
    fn address_header(&mut self, name: &str, addresses: &[Address<'_>]) -> Result<(), Abort> {
        Ok(())
    }

    /// A message-id header; the list is never empty.
    fn message_id_header(&mut self, name: &str, ids: &[ContentId<'_>]) -> Result<(), Abort> {
        Ok(())
    }

    /// An obsolete RFC822 structure was tolerated; emitted right before
    /// the event carrying the salvaged value.
    fn obsolete_structure(&mut self, kind: ObsoleteKind) -> Result<(), Abort> {
        Ok(())
    }

    /// Decoded body bytes of the current entity.
    fn body_content(&mut self, bytes: &[u8]) -> Result<(), Abort> {
        Ok(())
    }

    /// Bytes outside any entity: multipart preambles and epilogues.
    fn unexpected_content(&mut self, bytes: &[u8]) -> Result<(), Abort> {
        Ok(())
    }
}
