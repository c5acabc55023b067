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

use log::debug;

use crate::{
    decoders::{
        base64::{base64_decoded_size, decode_base64},
        quoted_printable::decode_quoted_printable,
        Encoding,
    },
    parsers::fields::content_type::parse_content_type,
    ContentType, ObsoleteKind, ParseError,
};

use super::{handler::Locator, InputBuffer};

/// Low level event sink driven by [`MimeParser`]. The dispatch layer in
/// `stream::message` implements it to upgrade raw header fields into
/// typed events before forwarding to the user's handler.
pub(crate) trait EntitySink {
    fn set_locator(&mut self, locator: Locator) -> Result<(), ParseError>;
    fn start_entity(&mut self, boundary: Option<&str>) -> Result<(), ParseError>;
    fn end_entity(&mut self, boundary: Option<&str>) -> Result<(), ParseError>;
    fn content_type(&mut self, content_type: &ContentType<'_>) -> Result<(), ParseError>;
    fn content_transfer_encoding(&mut self, encoding: &str) -> Result<(), ParseError>;
    fn header_field(&mut self, name: &[u8], value: &[u8]) -> Result<(), ParseError>;
    fn unexpected_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), ParseError>;
    fn obsolete_structure(&mut self, kind: ObsoleteKind) -> Result<(), ParseError>;
    fn end_headers(&mut self) -> Result<(), ParseError>;
    fn body_content(&mut self, bytes: &[u8]) -> Result<(), ParseError>;
    fn unexpected_content(&mut self, bytes: &[u8]) -> Result<(), ParseError>;
}

const DEFAULT_MAX_BUFFER: usize = 1024 * 1024;
const MAX_BOUNDARY_LEN: usize = 70;
// Transport padding tolerated after a boundary delimiter before an
// unterminated line is streamed out as body data.
const BOUNDARY_LINE_SLACK: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Headers,
    Body,
    Preamble,
    Epilogue,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineBreak {
    None,
    Lf,
    CrLf,
}

impl LineBreak {
    fn from_len(len: usize) -> LineBreak {
        match len {
            2 => LineBreak::CrLf,
            1 => LineBreak::Lf,
            _ => LineBreak::None,
        }
    }

    fn as_bytes(self) -> &'static [u8] {
        match self {
            LineBreak::None => b"",
            LineBreak::Lf => b"\n",
            LineBreak::CrLf => b"\r\n",
        }
    }
}

#[derive(Debug, PartialEq)]
enum BoundaryMatch {
    Open,
    Close,
    None,
}

/// One open entity: the delimiter it was opened under (`None` for the
/// root message) and, when it is a multipart container, the delimiter
/// of its children.
struct Level {
    boundary: Option<String>,
    child_boundary: Option<String>,
    child_closed: bool,
}

/// Structural facts gathered while parsing the current header block,
/// frozen when the blank line is reached.
#[derive(Default)]
struct PartInfo {
    multipart: bool,
    boundary: Option<String>,
    encoding: Encoding,
}

/// The push-driven MIME engine. Bytes go in through `receive`, events
/// come out through an [`EntitySink`]; the engine advances as far as the
/// input allows and retains only the incomplete suffix.
pub(crate) struct MimeParser {
    buf: InputBuffer,
    state: State,
    levels: Vec<Level>,

    header_name: Vec<u8>,
    header_value: Vec<u8>,
    has_header: bool,
    value_in_quote: bool,
    value_escaped: bool,
    part: PartInfo,

    encoding: Encoding,
    carry: Vec<u8>,
    held_break: LineBreak,
    mid_line: bool,

    locator: Locator,
    offset: usize,
    max_buffer: usize,
    smtputf8: bool,
    strict: bool,
    started: bool,
    finished: bool,
    failed: bool,
}

impl MimeParser {
    pub fn new() -> MimeParser {
        MimeParser {
            buf: InputBuffer::new(),
            state: State::Headers,
            levels: Vec::with_capacity(4),
            header_name: Vec::new(),
            header_value: Vec::new(),
            has_header: false,
            value_in_quote: false,
            value_escaped: false,
            part: PartInfo::default(),
            encoding: Encoding::None,
            carry: Vec::new(),
            held_break: LineBreak::None,
            mid_line: false,
            locator: Locator::default(),
            offset: 0,
            max_buffer: DEFAULT_MAX_BUFFER,
            smtputf8: false,
            strict: false,
            started: false,
            finished: false,
            failed: false,
        }
    }

    pub fn set_smtputf8(&mut self, smtputf8: bool) {
        self.smtputf8 = smtputf8;
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn set_max_buffer_size(&mut self, max_buffer: usize) {
        self.max_buffer = max_buffer;
    }

    pub fn reset(&mut self) {
        *self = MimeParser {
            max_buffer: self.max_buffer,
            smtputf8: self.smtputf8,
            strict: self.strict,
            ..MimeParser::new()
        };
    }

    /// Feeds a chunk of input, advancing the state machine as far as
    /// possible. After a fatal error all further input is ignored until
    /// `reset`.
    pub fn receive<S: EntitySink>(&mut self, chunk: &[u8], sink: &mut S) -> Result<(), ParseError> {
        if self.failed || self.finished {
            return Ok(());
        }

        self.buf.push(chunk);
        match self.drive(sink, false) {
            Ok(()) => {
                if self.buf.len() > self.max_buffer {
                    self.failed = true;
                    Err(ParseError::BufferLimitExceeded(self.max_buffer))
                } else {
                    Ok(())
                }
            }
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    /// Marks the end of input: flushes any active decoder and ends every
    /// open entity, innermost first. Idempotent.
    pub fn close<S: EntitySink>(&mut self, sink: &mut S) -> Result<(), ParseError> {
        if self.failed || self.finished {
            return Ok(());
        }

        match self.finish(sink) {
            Ok(()) => {
                self.finished = true;
                self.state = State::Done;
                Ok(())
            }
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    fn finish<S: EntitySink>(&mut self, sink: &mut S) -> Result<(), ParseError> {
        self.ensure_started(sink)?;
        self.drive(sink, true)?;

        match self.state {
            State::Headers => {
                // Input ended inside a header block.
                if self.has_header && self.value_in_quote {
                    return Err(ParseError::UnterminatedQuote(
                        String::from_utf8_lossy(&self.header_name).into_owned(),
                    ));
                }
                self.flush_header(sink)?;
                sink.end_headers()?;
            }
            State::Body => {
                let held_break = std::mem::replace(&mut self.held_break, LineBreak::None);
                self.carry.extend_from_slice(held_break.as_bytes());
                self.run_decoder(sink, true)?;
            }
            _ => (),
        }

        if self.strict {
            if let Some(level) = self
                .levels
                .iter()
                .find(|level| level.child_boundary.is_some() && !level.child_closed)
            {
                return Err(ParseError::MissingCloseDelimiter(
                    level.child_boundary.clone().unwrap_or_default(),
                ));
            }
        }

        while let Some(level) = self.levels.pop() {
            if let (Some(boundary), false) = (&level.child_boundary, level.child_closed) {
                debug!("implicit close of multipart boundary {boundary:?} at end of input");
            }
            self.update_locator();
            sink.end_entity(level.boundary.as_deref())?;
        }

        Ok(())
    }

    fn ensure_started<S: EntitySink>(&mut self, sink: &mut S) -> Result<(), ParseError> {
        if !self.started {
            self.started = true;
            self.levels.push(Level {
                boundary: None,
                child_boundary: None,
                child_closed: false,
            });
            self.update_locator();
            sink.set_locator(self.locator.clone())?;
            sink.start_entity(None)?;
        }
        Ok(())
    }

    fn drive<S: EntitySink>(&mut self, sink: &mut S, eos: bool) -> Result<(), ParseError> {
        self.ensure_started(sink)?;

        loop {
            let progressed = match self.state {
                State::Headers => self.step_headers(sink, eos)?,
                State::Body => self.step_body(sink, eos)?,
                State::Preamble | State::Epilogue => self.step_scan(sink, eos)?,
                State::Done => {
                    self.offset += self.buf.len();
                    self.buf.clear();
                    false
                }
            };
            self.update_locator();
            if !progressed {
                return Ok(());
            }
        }
    }

    #[inline(always)]
    fn update_locator(&self) {
        self.locator.set(self.offset, self.levels.len());
    }

    #[inline(always)]
    fn advance(&mut self, len: usize) {
        self.buf.consume(len);
        self.offset += len;
    }

    /// Returns `(content_len, consume_len)` of the next complete line,
    /// with the terminator (and a preceding CR) excluded from the
    /// content. At end of stream the unterminated tail counts as a line.
    fn peek_line(&self, eos: bool) -> Option<(usize, usize)> {
        let data = self.buf.bytes();

        if let Some(pos) = data.iter().position(|&ch| ch == b'\n') {
            let content_len = if pos > 0 && data[pos - 1] == b'\r' {
                pos - 1
            } else {
                pos
            };
            Some((content_len, pos + 1))
        } else if eos && !data.is_empty() {
            let content_len = if data.ends_with(b"\r") {
                data.len() - 1
            } else {
                data.len()
            };
            Some((content_len, data.len()))
        } else {
            None
        }
    }

    fn step_headers<S: EntitySink>(&mut self, sink: &mut S, eos: bool) -> Result<bool, ParseError> {
        let Some((content_len, consume_len)) = self.peek_line(eos) else {
            return Ok(false);
        };
        let line = self.buf.bytes()[..content_len].to_vec();
        let break_len = consume_len - content_len;
        self.advance(consume_len);

        let is_blank = line.iter().all(|&ch| ch == b' ' || ch == b'\t');

        if is_blank && (line.is_empty() || !self.has_header) {
            // End of the header block. A quoted string still open here
            // spans the terminator and cannot be recovered.
            if self.has_header && self.value_in_quote {
                return Err(ParseError::UnterminatedQuote(
                    String::from_utf8_lossy(&self.header_name).into_owned(),
                ));
            }
            self.flush_header(sink)?;
            self.finish_headers(sink)?;
            return Ok(true);
        }

        if is_blank {
            // A white space only line inside a header block is the one
            // folding form that only obs-FWS permits.
            sink.obsolete_structure(ObsoleteKind::FoldingWhiteSpace)?;
            return Ok(true);
        }

        if matches!(line.first(), Some(b' ' | b'\t')) {
            if self.has_header {
                // Folded continuation: the leading white space run
                // collapses to a single space.
                let folded = &line[line
                    .iter()
                    .position(|&ch| ch != b' ' && ch != b'\t')
                    .unwrap_or(line.len())..];
                if !self.header_value.is_empty() {
                    self.header_value.push(b' ');
                    self.track_quote_state(b" ");
                }
                self.header_value.extend_from_slice(folded);
                self.track_quote_state(folded);
            } else {
                // Continuation with nothing to continue.
                let mut bytes = line;
                bytes.extend_from_slice(LineBreak::from_len(break_len).as_bytes());
                sink.unexpected_content(&bytes)?;
            }
            return Ok(true);
        }

        self.flush_header(sink)?;

        match line.iter().position(|&ch| ch == b':') {
            Some(colon_pos) => {
                let mut name_end = colon_pos;
                while name_end > 0 && line[name_end - 1].is_ascii_whitespace() {
                    name_end -= 1;
                }
                if name_end == 0 {
                    sink.unexpected_header(&line, b"")?;
                    return Ok(true);
                }
                if name_end < colon_pos {
                    // Space before the colon.
                    sink.obsolete_structure(ObsoleteKind::HeaderSyntax)?;
                }

                let mut value_start = colon_pos + 1;
                while value_start < line.len()
                    && matches!(line[value_start], b' ' | b'\t')
                {
                    value_start += 1;
                }

                self.header_name = line[..name_end].to_vec();
                self.header_value = line[value_start..].to_vec();
                self.has_header = true;
                self.value_in_quote = false;
                self.value_escaped = false;
                self.track_quote_state(&line[value_start..]);
            }
            None => {
                sink.unexpected_header(&line, b"")?;
            }
        }

        Ok(true)
    }

    /// Follows quoted-string state across the logical header value so a
    /// quote left open at the end of the header block can be rejected.
    fn track_quote_state(&mut self, bytes: &[u8]) {
        for &ch in bytes {
            if self.value_escaped {
                self.value_escaped = false;
            } else if ch == b'\\' && self.value_in_quote {
                self.value_escaped = true;
            } else if ch == b'"' {
                self.value_in_quote = !self.value_in_quote;
            }
        }
    }

    fn flush_header<S: EntitySink>(&mut self, sink: &mut S) -> Result<(), ParseError> {
        if !self.has_header {
            return Ok(());
        }
        self.has_header = false;
        self.value_in_quote = false;
        self.value_escaped = false;
        let name = std::mem::take(&mut self.header_name);
        let value = std::mem::take(&mut self.header_value);

        if name.eq_ignore_ascii_case(b"content-type") {
            match parse_content_type(&value, self.smtputf8) {
                Some(content_type) => {
                    if content_type.is_multipart() {
                        self.part.multipart = true;
                        self.part.boundary = content_type.boundary().map(|b| b.to_string());
                    } else {
                        self.part.multipart = false;
                        self.part.boundary = None;
                    }
                    if has_extended_parameters(&content_type.attributes) {
                        sink.obsolete_structure(ObsoleteKind::StructuredParameter)?;
                    }
                    sink.content_type(&content_type)?;
                }
                None => sink.unexpected_header(&name, &value)?,
            }
        } else if name.eq_ignore_ascii_case(b"content-transfer-encoding") {
            let text = String::from_utf8_lossy(&value);
            let text = text.trim();
            self.part.encoding = Encoding::parse(text);
            sink.content_transfer_encoding(text)?;
        } else {
            sink.header_field(&name, &value)?;
        }

        Ok(())
    }

    fn finish_headers<S: EntitySink>(&mut self, sink: &mut S) -> Result<(), ParseError> {
        let part = std::mem::take(&mut self.part);

        if part.multipart {
            if let Some(boundary) = part.boundary {
                if !is_valid_boundary(&boundary) {
                    return Err(ParseError::InvalidBoundary(boundary));
                }
                sink.end_headers()?;
                let level = self.levels.last_mut().unwrap();
                level.child_boundary = Some(boundary);
                level.child_closed = false;
                self.state = State::Preamble;
                return Ok(());
            }
            debug!("multipart content type without a boundary parameter, body treated as opaque");
        }

        sink.end_headers()?;
        self.encoding = part.encoding;
        self.carry.clear();
        self.held_break = LineBreak::None;
        self.mid_line = false;
        self.state = State::Body;
        Ok(())
    }

    /// Multipart preamble and epilogue scanning: everything that is not
    /// a boundary line is surfaced as unexpected content.
    fn step_scan<S: EntitySink>(&mut self, sink: &mut S, eos: bool) -> Result<bool, ParseError> {
        let Some((content_len, consume_len)) = self.peek_line(eos) else {
            return Ok(false);
        };
        let line = self.buf.bytes()[..content_len].to_vec();
        let break_len = consume_len - content_len;
        self.advance(consume_len);

        let target = if self.state == State::Preamble {
            self.levels.last().unwrap().child_boundary.clone()
        } else {
            self.levels.last().unwrap().boundary.clone()
        };

        match boundary_match(&line, target.as_deref()) {
            BoundaryMatch::Open => {
                if self.state == State::Epilogue {
                    let level = self.levels.pop().unwrap();
                    self.update_locator();
                    sink.end_entity(level.boundary.as_deref())?;
                }
                self.start_part(sink)?;
            }
            BoundaryMatch::Close => {
                if self.state == State::Epilogue {
                    let level = self.levels.pop().unwrap();
                    self.update_locator();
                    sink.end_entity(level.boundary.as_deref())?;
                }
                let level = self.levels.last_mut().unwrap();
                level.child_closed = true;
                self.state = State::Epilogue;
            }
            BoundaryMatch::None => {
                let mut bytes = line;
                bytes.extend_from_slice(LineBreak::from_len(break_len).as_bytes());
                sink.unexpected_content(&bytes)?;
            }
        }

        Ok(true)
    }

    fn start_part<S: EntitySink>(&mut self, sink: &mut S) -> Result<(), ParseError> {
        let boundary = self.levels.last().unwrap().child_boundary.clone().unwrap();
        self.levels.push(Level {
            boundary: Some(boundary),
            child_boundary: None,
            child_closed: false,
        });
        self.update_locator();

        let level = self.levels.last().unwrap();
        sink.start_entity(level.boundary.as_deref())?;

        self.header_name.clear();
        self.header_value.clear();
        self.has_header = false;
        self.value_in_quote = false;
        self.value_escaped = false;
        self.part = PartInfo::default();
        self.state = State::Headers;
        Ok(())
    }

    fn step_body<S: EntitySink>(&mut self, sink: &mut S, eos: bool) -> Result<bool, ParseError> {
        let boundary = match &self.levels.last().unwrap().boundary {
            Some(boundary) => boundary.clone(),
            None => {
                // The root body runs to the end of input, no line
                // framing is needed.
                if self.buf.is_empty() {
                    return Ok(false);
                }
                let (output, consumed) = decode_chunk(self.encoding, self.buf.bytes(), eos);
                if !output.is_empty() {
                    sink.body_content(&output)?;
                }
                self.advance(consumed);
                return Ok(consumed > 0);
            }
        };

        let Some((content_len, consume_len)) = self.peek_line(eos) else {
            // No complete line; stream out anything that can no longer
            // be part of a boundary delimiter line to keep memory flat.
            let pending = self.buf.len();
            let keep = 2 + boundary.len() + 2 + BOUNDARY_LINE_SLACK;
            if (self.mid_line && pending > 0) || pending > keep {
                self.append_body_bytes(pending);
                self.run_decoder(sink, false)?;
                return Ok(true);
            }
            return Ok(false);
        };

        if !self.mid_line {
            let matched = boundary_match(&self.buf.bytes()[..content_len], Some(boundary.as_str()));
            if matched != BoundaryMatch::None {
                self.advance(consume_len);
                self.held_break = LineBreak::None;
                self.run_decoder(sink, true)?;

                let level = self.levels.pop().unwrap();
                self.update_locator();
                sink.end_entity(level.boundary.as_deref())?;

                if matched == BoundaryMatch::Open {
                    self.start_part(sink)?;
                } else {
                    let parent = self.levels.last_mut().unwrap();
                    parent.child_closed = true;
                    self.state = State::Epilogue;
                }
                return Ok(true);
            }
        }

        // Plain body line; its terminator is withheld until the next
        // line proves not to be a boundary delimiter.
        self.mid_line = false;
        let held_break = std::mem::replace(
            &mut self.held_break,
            LineBreak::from_len(consume_len - content_len),
        );
        self.carry.extend_from_slice(held_break.as_bytes());
        self.carry
            .extend_from_slice(&self.buf.bytes()[..content_len]);
        self.advance(consume_len);
        self.run_decoder(sink, false)?;

        Ok(true)
    }

    fn append_body_bytes(&mut self, len: usize) {
        let held_break = std::mem::replace(&mut self.held_break, LineBreak::None);
        self.carry.extend_from_slice(held_break.as_bytes());
        self.carry.extend_from_slice(&self.buf.bytes()[..len]);
        self.advance(len);
        self.mid_line = true;
    }

    fn run_decoder<S: EntitySink>(&mut self, sink: &mut S, eos: bool) -> Result<(), ParseError> {
        while !self.carry.is_empty() {
            let (output, consumed) = decode_chunk(self.encoding, &self.carry, eos);
            if !output.is_empty() {
                sink.body_content(&output)?;
            }
            self.carry.drain(..consumed);
            if consumed == 0 {
                break;
            }
        }
        Ok(())
    }
}

fn decode_chunk(encoding: Encoding, src: &[u8], eos: bool) -> (Vec<u8>, usize) {
    match encoding {
        Encoding::None => (src.to_vec(), src.len()),
        Encoding::Base64 => {
            let mut output = vec![0u8; base64_decoded_size(src.len())];
            let status = decode_base64(src, &mut output, eos);
            output.truncate(status.decoded);
            (output, status.consumed)
        }
        Encoding::QuotedPrintable => {
            let mut output = vec![0u8; src.len() + 2];
            let status = decode_quoted_printable(src, &mut output, eos);
            output.truncate(status.decoded);
            (output, status.consumed)
        }
    }
}

fn boundary_match(line: &[u8], boundary: Option<&str>) -> BoundaryMatch {
    let Some(boundary) = boundary else {
        return BoundaryMatch::None;
    };
    let Some(rest) = line.strip_prefix(b"--") else {
        return BoundaryMatch::None;
    };
    let Some(rest) = rest.strip_prefix(boundary.as_bytes()) else {
        return BoundaryMatch::None;
    };

    // Transport padding after the delimiter is ignored.
    let mut rest = rest;
    while let Some(stripped) = rest.strip_suffix(b" ").or_else(|| rest.strip_suffix(b"\t")) {
        rest = stripped;
    }

    match rest {
        b"" => BoundaryMatch::Open,
        b"--" => BoundaryMatch::Close,
        _ => BoundaryMatch::None,
    }
}

/// RFC2231 extended parameters (`name*0`, `name*=`) are surfaced
/// verbatim and flagged, never reassembled.
pub(crate) fn has_extended_parameters(attributes: &[crate::Parameter<'_>]) -> bool {
    attributes.iter().any(|attr| attr.name.contains('*'))
}

fn is_valid_boundary(boundary: &str) -> bool {
    !boundary.is_empty()
        && boundary.len() <= MAX_BOUNDARY_LEN
        && boundary
            .bytes()
            .all(|ch| ch.is_ascii_alphanumeric() || b"'()+_,-./:=?".contains(&ch))
}
