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

use crate::{
    parsers::{
        encoded_word::decode_encoded_text,
        fields::{
            address::parse_address_list,
            content_type::parse_content_disposition,
            date::parse_date_time,
            id::{parse_id_list, parse_single_id},
            obsolete::{parse_obsolete_address_list, parse_obsolete_id_list},
        },
    },
    ContentType, MimeVersion, ObsoleteKind, ParseError,
};

use super::{
    handler::{Locator, MessageHandler},
    mime::{EntitySink, MimeParser},
};

/// The push-driven message parser: wraps the MIME engine and upgrades
/// raw header fields into typed events by header name before forwarding
/// them to the [`MessageHandler`].
///
/// Feed it raw bytes with [`receive`](MessageParser::receive) in chunks
/// of any size; the event stream is independent of the fragmentation.
/// Call [`close`](MessageParser::close) at end of input and
/// [`reset`](MessageParser::reset) to parse another message.
pub struct MessageParser<H: MessageHandler> {
    engine: MimeParser,
    handler: H,
    smtputf8: bool,
}

impl<H: MessageHandler> MessageParser<H> {
    pub fn new(handler: H) -> MessageParser<H> {
        MessageParser {
            engine: MimeParser::new(),
            handler,
            smtputf8: false,
        }
    }

    /// Selects UTF-8 (replacing malformed sequences) instead of
    /// ISO-8859-1 for raw header bytes and widens the sub-parser
    /// alphabets to non-ASCII per RFC6531/6532.
    pub fn set_smtputf8(&mut self, smtputf8: bool) {
        self.smtputf8 = smtputf8;
        self.engine.set_smtputf8(smtputf8);
    }

    /// In strict mode a multipart without its close delimiter at end of
    /// input is a fatal error instead of an implicit close.
    pub fn set_strict(&mut self, strict: bool) {
        self.engine.set_strict(strict);
    }

    /// Caps the rolling input buffer; a single header line (or other
    /// indivisible unit) larger than this fails the parse.
    pub fn set_max_buffer_size(&mut self, max_buffer: usize) {
        self.engine.set_max_buffer_size(max_buffer);
    }

    /// Feeds the next chunk of the message, emitting events for
    /// everything that can be decided; an incomplete suffix is kept for
    /// the next call.
    pub fn receive(&mut self, chunk: &[u8]) -> Result<(), ParseError> {
        let mut dispatch = HeaderDispatch {
            handler: &mut self.handler,
            smtputf8: self.smtputf8,
        };
        self.engine.receive(chunk, &mut dispatch)
    }

    /// Signals the end of input. Idempotent; a second call emits
    /// nothing further.
    pub fn close(&mut self) -> Result<(), ParseError> {
        let mut dispatch = HeaderDispatch {
            handler: &mut self.handler,
            smtputf8: self.smtputf8,
        };
        self.engine.close(&mut dispatch)
    }

    /// Returns the parser to its initial state, keeping configuration.
    pub fn reset(&mut self) {
        self.engine.reset();
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Unstructured,
    Date,
    Address,
    MessageId,
    ContentDisposition,
    ContentId,
    ContentDescription,
    MimeVersion,
}

/// Classifies a lowercased header name. Content-Type and
/// Content-Transfer-Encoding never reach this point, the engine handles
/// them itself. Received is deliberately unstructured, as are all
/// `x-*` and unknown names.
fn classify(name: &str) -> Category {
    match name {
        "date" | "resent-date" => Category::Date,
        "from" | "sender" | "to" | "cc" | "bcc" | "reply-to" | "resent-from" | "resent-sender"
        | "resent-to" | "resent-cc" | "resent-bcc" | "resent-reply-to" | "return-path"
        | "envelope-to" | "delivered-to" | "x-original-to" | "errors-to" | "apparently-to" => {
            Category::Address
        }
        "message-id" | "in-reply-to" | "references" | "resent-message-id" => Category::MessageId,
        "content-disposition" => Category::ContentDisposition,
        "content-id" => Category::ContentId,
        "content-description" => Category::ContentDescription,
        "mime-version" => Category::MimeVersion,
        _ => Category::Unstructured,
    }
}

struct HeaderDispatch<'a, H: MessageHandler> {
    handler: &'a mut H,
    smtputf8: bool,
}

impl<H: MessageHandler> HeaderDispatch<'_, H> {
    fn demote(&mut self, name: &str, value: &[u8]) -> Result<(), ParseError> {
        self.handler
            .unexpected_header(name, decode_encoded_text(value, self.smtputf8).as_ref())?;
        Ok(())
    }
}

// Handler cancellations surface here: an `Abort` returned by any
// callback converts into `ParseError::Aborted` on its way out.
impl<H: MessageHandler> EntitySink for HeaderDispatch<'_, H> {
    fn set_locator(&mut self, locator: Locator) -> Result<(), ParseError> {
        Ok(self.handler.set_locator(locator)?)
    }

    fn start_entity(&mut self, boundary: Option<&str>) -> Result<(), ParseError> {
        Ok(self.handler.start_entity(boundary)?)
    }

    fn end_entity(&mut self, boundary: Option<&str>) -> Result<(), ParseError> {
        Ok(self.handler.end_entity(boundary)?)
    }

    fn content_type(&mut self, content_type: &ContentType<'_>) -> Result<(), ParseError> {
        Ok(self.handler.content_type(content_type)?)
    }

    fn content_transfer_encoding(&mut self, encoding: &str) -> Result<(), ParseError> {
        Ok(self.handler.content_transfer_encoding(encoding)?)
    }

    fn header_field(&mut self, name: &[u8], value: &[u8]) -> Result<(), ParseError> {
        let name = String::from_utf8_lossy(name);

        match classify(name.to_ascii_lowercase().as_str()) {
            Category::Date => match parse_date_time(value) {
                Some((datetime, obsolete)) => {
                    if obsolete {
                        self.handler.obsolete_structure(ObsoleteKind::DateTime)?;
                    }
                    Ok(self.handler.date_header(name.as_ref(), datetime)?)
                }
                None => self.demote(name.as_ref(), value),
            },
            Category::Address => match parse_address_list(value, self.smtputf8) {
                Some(addresses) if !addresses.is_empty() => {
                    Ok(self.handler.address_header(name.as_ref(), &addresses)?)
                }
                _ => match parse_obsolete_address_list(value, self.smtputf8) {
                    Some(addresses) => {
                        self.handler.obsolete_structure(ObsoleteKind::Address)?;
                        Ok(self.handler.address_header(name.as_ref(), &addresses)?)
                    }
                    None => self.demote(name.as_ref(), value),
                },
            },
            Category::MessageId => match parse_id_list(value, self.smtputf8) {
                Some(ids) if !ids.is_empty() => {
                    Ok(self.handler.message_id_header(name.as_ref(), &ids)?)
                }
                _ => match parse_obsolete_id_list(value, self.smtputf8) {
                    Some(ids) => {
                        self.handler.obsolete_structure(ObsoleteKind::MessageId)?;
                        Ok(self.handler.message_id_header(name.as_ref(), &ids)?)
                    }
                    None => self.demote(name.as_ref(), value),
                },
            },
            Category::ContentDisposition => {
                match parse_content_disposition(value, self.smtputf8) {
                    Some(disposition) => {
                        if super::mime::has_extended_parameters(&disposition.attributes) {
                            self.handler
                                .obsolete_structure(ObsoleteKind::StructuredParameter)?;
                        }
                        Ok(self.handler.content_disposition(&disposition)?)
                    }
                    None => self.demote(name.as_ref(), value),
                }
            }
            Category::ContentId => match parse_single_id(value, self.smtputf8) {
                Some(id) => Ok(self.handler.content_id(&id)?),
                None => self.demote(name.as_ref(), value),
            },
            Category::ContentDescription => Ok(self
                .handler
                .content_description(decode_encoded_text(value, self.smtputf8).as_ref())?),
            Category::MimeVersion => {
                match MimeVersion::parse(String::from_utf8_lossy(value).as_ref()) {
                    Some(version) => Ok(self.handler.mime_version(version)?),
                    None => self.demote(name.as_ref(), value),
                }
            }
            Category::Unstructured => Ok(self
                .handler
                .header(name.as_ref(), decode_encoded_text(value, self.smtputf8).as_ref())?),
        }
    }

    fn unexpected_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), ParseError> {
        let name = String::from_utf8_lossy(name);
        self.demote(name.as_ref(), value)
    }

    fn obsolete_structure(&mut self, kind: ObsoleteKind) -> Result<(), ParseError> {
        Ok(self.handler.obsolete_structure(kind)?)
    }

    fn end_headers(&mut self) -> Result<(), ParseError> {
        Ok(self.handler.end_headers()?)
    }

    fn body_content(&mut self, bytes: &[u8]) -> Result<(), ParseError> {
        Ok(self.handler.body_content(bytes)?)
    }

    fn unexpected_content(&mut self, bytes: &[u8]) -> Result<(), ParseError> {
        Ok(self.handler.unexpected_content(bytes)?)
    }
}
