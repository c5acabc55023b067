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

use std::borrow::Cow;

use crate::{
    parsers::{encoded_word::decode_encoded_text, HeaderStream},
    Addr, Address, Group,
};

use super::{is_atext, is_dot_atom};

/// Parses an RFC5322 address list: mailboxes and groups separated by
/// commas. Returns `None` on any syntax violation so callers can fall
/// back to the obsolete salvage parser; empty or white space input
/// yields an empty list.
pub fn parse_address_list(input: &[u8], smtputf8: bool) -> Option<Vec<Address>> {
    let mut stream = HeaderStream::new(input);
    let mut result = Vec::new();

    loop {
        stream.checkpoint();
        stream.skip_cfws(None, smtputf8);
        if stream.is_eof() {
            break;
        }
        stream.restore();

        result.push(if scan_group_ahead(&stream) {
            Address::Group(parse_group(&mut stream, smtputf8)?)
        } else {
            Address::Addr(parse_mailbox(&mut stream, smtputf8)?)
        });

        stream.skip_cfws(None, smtputf8);
        match stream.peek() {
            None => break,
            Some(b',') => {
                stream.next();
            }
            _ => return None,
        }
    }

    Some(result)
}

/// String entry point, derived from the byte-buffer parser.
pub fn parse_address_list_str(input: &str, smtputf8: bool) -> Option<Vec<Address>> {
    parse_address_list(input.as_bytes(), smtputf8)
}

/// Parses a single envelope address: a bare `local-part@domain` with no
/// display name, comments or angle brackets. Enforces the SMTP length
/// bounds (local part up to 64 bytes, domain up to 255) and, outside
/// SMTPUTF8 mode, the ASCII domain character set.
pub fn parse_envelope_address(input: &[u8], smtputf8: bool) -> Option<Addr> {
    let mut stream = HeaderStream::new(input);

    skip_wsp(&mut stream);

    let local_part = if stream.peek_char(b'"') {
        stream.read_quoted_string(smtputf8)?
    } else {
        let start = stream.offset();
        read_atom_run(&mut stream, smtputf8);
        let word = stream.bytes(start..stream.offset());
        if !is_dot_atom(word, smtputf8) {
            return None;
        }
        stream.decode_slice(start..stream.offset(), smtputf8)
    };

    if !stream.try_skip_char(b'@') {
        return None;
    }

    let domain = if stream.peek_char(b'[') {
        read_address_literal(&mut stream)?
    } else {
        let start = stream.offset();
        while let Some(ch) = stream.peek() {
            if is_envelope_domain_char(ch, smtputf8) {
                stream.next();
            } else {
                break;
            }
        }
        let domain = stream.bytes(start..stream.offset());
        if !is_dot_atom_shape(domain) {
            return None;
        }
        stream.decode_slice(start..stream.offset(), smtputf8)
    };

    skip_wsp(&mut stream);
    if !stream.is_eof()
        || local_part.is_empty()
        || local_part.len() > 64
        || domain.len() > 255
        || (!smtputf8 && !local_part.as_bytes().is_ascii())
    {
        return None;
    }

    Some(Addr {
        display_name: None,
        local_part,
        domain,
        simple_address: true,
        comments: Vec::new(),
    })
}

/// A `:` ahead of any `<`, `,` or `;` at the top level means the next
/// address is a group.
fn scan_group_ahead(stream: &HeaderStream) -> bool {
    let mut in_quote = false;
    let mut in_literal = false;
    let mut is_escaped = false;
    let mut comment_depth = 0u32;

    for &ch in &stream.data[stream.offset()..] {
        if is_escaped {
            is_escaped = false;
            continue;
        }
        match ch {
            b'\\' => is_escaped = true,
            b'"' if comment_depth == 0 && !in_literal => in_quote = !in_quote,
            _ if in_quote => (),
            b'(' if !in_literal => comment_depth += 1,
            b')' if comment_depth > 0 => comment_depth -= 1,
            _ if comment_depth > 0 => (),
            b'[' => in_literal = true,
            b']' => in_literal = false,
            b':' if !in_literal => return true,
            b'<' | b',' | b';' if !in_literal => return false,
            _ => (),
        }
    }

    false
}

fn parse_group<'x>(stream: &mut HeaderStream<'x>, smtputf8: bool) -> Option<Group<'x>> {
    let mut comments = Vec::new();
    let mut name_tokens = Vec::new();

    loop {
        stream.skip_cfws(Some(&mut comments), smtputf8);
        match stream.peek()? {
            b':' => {
                stream.next();
                break;
            }
            b'"' => {
                name_tokens.push(stream.read_quoted_string(smtputf8)?);
            }
            ch if is_atext(ch, smtputf8) => {
                let start = stream.offset();
                read_atom_run(stream, smtputf8);
                let word = stream.bytes(start..stream.offset());
                if word.contains(&b'.') && !is_encoded_word(word) {
                    // Dots in a phrase are obs-phrase territory.
                    return None;
                }
                name_tokens.push(stream.decode_slice(start..stream.offset(), smtputf8));
            }
            _ => return None,
        }
    }

    let name = canonical_display(name_tokens)?;
    let mut addresses = Vec::new();

    loop {
        stream.skip_cfws(None, smtputf8);
        match stream.peek() {
            // A missing group terminator at the end of the list is
            // tolerated, some senders omit it.
            None => break,
            Some(b';') => {
                stream.next();
                break;
            }
            _ => {
                addresses.push(parse_mailbox(stream, smtputf8)?);
                stream.skip_cfws(None, smtputf8);
                match stream.peek() {
                    Some(b',') => {
                        stream.next();
                    }
                    Some(b';') | None => (),
                    _ => return None,
                }
            }
        }
    }

    Some(Group { name, addresses })
}

fn parse_mailbox<'x>(stream: &mut HeaderStream<'x>, smtputf8: bool) -> Option<Addr<'x>> {
    let mut comments = Vec::new();
    let mut name_tokens: Vec<Cow<'x, str>> = Vec::new();

    loop {
        stream.skip_cfws(Some(&mut comments), smtputf8);
        match stream.peek()? {
            b'<' => {
                stream.next();
                let (local_part, domain) = parse_addr_spec(stream, smtputf8, &mut comments)?;
                stream.skip_cfws(Some(&mut comments), smtputf8);
                if !stream.try_skip_char(b'>') {
                    return None;
                }
                stream.skip_cfws(Some(&mut comments), smtputf8);
                return Some(Addr {
                    display_name: canonical_display(name_tokens),
                    local_part,
                    domain,
                    simple_address: false,
                    comments,
                });
            }
            b'"' => {
                let token = stream.read_quoted_string(smtputf8)?;
                stream.skip_cfws(Some(&mut comments), smtputf8);
                if name_tokens.is_empty() && stream.peek_char(b'@') {
                    // Legacy addr-spec with a quoted local part.
                    stream.next();
                    stream.skip_cfws(Some(&mut comments), smtputf8);
                    let domain = read_domain(stream, smtputf8, &mut comments)?;
                    stream.skip_cfws(Some(&mut comments), smtputf8);
                    return Some(Addr {
                        display_name: None,
                        local_part: token,
                        domain,
                        simple_address: true,
                        comments,
                    });
                }
                name_tokens.push(token);
            }
            ch if is_atext(ch, smtputf8) => {
                let start = stream.offset();
                read_atom_run(stream, smtputf8);
                let word_end = stream.offset();

                if next_significant_is_addr(stream, smtputf8) {
                    // Legacy addr-spec without angle brackets; a display
                    // name in front of it is a syntax error.
                    if !name_tokens.is_empty() {
                        return None;
                    }
                    let first_segment = stream.decode_slice(start..word_end, smtputf8);
                    let local_part =
                        read_dotted_tail(stream, smtputf8, &mut comments, first_segment)?;
                    if !is_dot_atom(local_part.as_bytes(), smtputf8) {
                        return None;
                    }
                    stream.skip_cfws(Some(&mut comments), smtputf8);
                    if !stream.try_skip_char(b'@') {
                        return None;
                    }
                    stream.skip_cfws(Some(&mut comments), smtputf8);
                    let domain = read_domain(stream, smtputf8, &mut comments)?;
                    stream.skip_cfws(Some(&mut comments), smtputf8);
                    return Some(Addr {
                        display_name: None,
                        local_part,
                        domain,
                        simple_address: true,
                        comments,
                    });
                }

                let word = stream.bytes(start..word_end);
                if word.contains(&b'.') && !is_encoded_word(word) {
                    return None;
                }
                name_tokens.push(stream.decode_slice(start..word_end, smtputf8));
            }
            _ => return None,
        }
    }
}

fn parse_addr_spec<'x>(
    stream: &mut HeaderStream<'x>,
    smtputf8: bool,
    comments: &mut Vec<Cow<'x, str>>,
) -> Option<(Cow<'x, str>, Cow<'x, str>)> {
    stream.skip_cfws(Some(comments), smtputf8);

    let local_part = if stream.peek_char(b'"') {
        stream.read_quoted_string(smtputf8)?
    } else {
        read_dot_atom(stream, smtputf8, comments)?
    };

    stream.skip_cfws(Some(comments), smtputf8);
    if !stream.try_skip_char(b'@') {
        return None;
    }
    stream.skip_cfws(Some(comments), smtputf8);

    read_domain(stream, smtputf8, comments).map(|domain| (local_part, domain))
}

fn read_domain<'x>(
    stream: &mut HeaderStream<'x>,
    smtputf8: bool,
    comments: &mut Vec<Cow<'x, str>>,
) -> Option<Cow<'x, str>> {
    if stream.peek_char(b'[') {
        // Domain literals carry their brackets and escapes through
        // textually.
        let start = stream.offset();
        stream.next();
        loop {
            match stream.next()? {
                b']' => break,
                b'\\' => {
                    stream.next()?;
                }
                _ => (),
            }
        }
        Some(stream.decode_slice(start..stream.offset(), smtputf8))
    } else {
        read_dot_atom(stream, smtputf8, comments)
    }
}

/// Reads a dot-atom, tolerating CFWS around the dots as the scanner
/// strips it around all significant punctuation.
fn read_dot_atom<'x>(
    stream: &mut HeaderStream<'x>,
    smtputf8: bool,
    comments: &mut Vec<Cow<'x, str>>,
) -> Option<Cow<'x, str>> {
    let start = stream.offset();
    read_atom_run(stream, smtputf8);
    if stream.offset() == start {
        return None;
    }

    let first_segment = stream.decode_slice(start..stream.offset(), smtputf8);
    let value = read_dotted_tail(stream, smtputf8, comments, first_segment)?;

    if is_dot_atom(value.as_bytes(), smtputf8) {
        Some(value)
    } else {
        None
    }
}

/// Continues a dot-atom across `CFWS "." CFWS` sequences, joining the
/// segments with bare dots.
fn read_dotted_tail<'x>(
    stream: &mut HeaderStream<'x>,
    smtputf8: bool,
    comments: &mut Vec<Cow<'x, str>>,
    mut value: Cow<'x, str>,
) -> Option<Cow<'x, str>> {
    loop {
        stream.checkpoint();
        stream.skip_cfws(None, smtputf8);
        if stream.peek_char(b'.') {
            stream.restore();
            stream.skip_cfws(Some(comments), smtputf8);
            stream.next();
            stream.skip_cfws(Some(comments), smtputf8);
            let start = stream.offset();
            read_atom_run(stream, smtputf8);
            if stream.offset() == start {
                return None;
            }
            value = format!(
                "{}.{}",
                value,
                stream.decode_slice(start..stream.offset(), smtputf8)
            )
            .into();
        } else {
            stream.restore();
            return Some(value);
        }
    }
}

/// Looks ahead past CFWS: an `@` or `.` next means the word just read
/// starts a legacy addr-spec rather than a display name.
fn next_significant_is_addr(stream: &mut HeaderStream, smtputf8: bool) -> bool {
    stream.checkpoint();
    stream.skip_cfws(None, smtputf8);
    let result = matches!(stream.peek(), Some(b'@' | b'.'));
    stream.restore();
    result
}

#[inline(always)]
fn is_encoded_word(word: &[u8]) -> bool {
    word.starts_with(b"=?") && word.ends_with(b"?=")
}

/// Advances past a run of atext characters and dots.
fn read_atom_run(stream: &mut HeaderStream, smtputf8: bool) {
    while let Some(ch) = stream.peek() {
        if is_atext(ch, smtputf8) || ch == b'.' {
            stream.next();
        } else {
            break;
        }
    }
}

/// Joins display name tokens with single spaces; a lone quoted string
/// keeps its bare content. RFC2047 encoded words are decoded in place;
/// the surrounding text is already decoded, hence valid UTF-8.
fn canonical_display<'x>(tokens: Vec<Cow<'x, str>>) -> Option<Cow<'x, str>> {
    if tokens.is_empty() {
        return None;
    }

    let text: Cow<'x, str> = if tokens.len() == 1 {
        tokens.into_iter().next().unwrap()
    } else {
        tokens.join(" ").into()
    };

    if text.contains("=?") {
        Some(decode_encoded_text(text.as_bytes(), true).into_owned().into())
    } else {
        Some(text)
    }
}

fn skip_wsp(stream: &mut HeaderStream) {
    while let Some(b' ' | b'\t' | b'\r' | b'\n') = stream.peek() {
        stream.next();
    }
}

fn is_envelope_domain_char(ch: u8, smtputf8: bool) -> bool {
    match ch {
        b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' => true,
        0x80.. => smtputf8,
        _ => false,
    }
}

/// No leading, trailing or adjacent dots.
fn is_dot_atom_shape(value: &[u8]) -> bool {
    let mut last_ch = b'.';

    for &ch in value {
        if ch == b'.' && last_ch == b'.' {
            return false;
        }
        last_ch = ch;
    }

    last_ch != b'.' && !value.is_empty()
}

/// Address literal contents are always restricted to printable ASCII
/// minus the brackets, even in SMTPUTF8 mode.
fn read_address_literal<'x>(stream: &mut HeaderStream<'x>) -> Option<Cow<'x, str>> {
    let start = stream.offset();
    stream.next();

    loop {
        match stream.next()? {
            b']' => break,
            ch if (0x21..=0x7e).contains(&ch) && ch != b'[' => (),
            _ => return None,
        }
    }

    stream.decode_slice(start..stream.offset(), false).into()
}
