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

use crate::{parsers::HeaderStream, ContentId};

use super::{is_atext, is_dot_atom};

/// Parses a list of `<id-left@id-right>` tokens. Ids may be separated by
/// CFWS, commas or both; the comma tolerance is a deliberate deviation
/// from RFC5322 to interoperate with Outlook. A single malformed token
/// fails the whole list so callers can try the obsolete salvage parser.
pub fn parse_id_list(input: &[u8], smtputf8: bool) -> Option<Vec<ContentId>> {
    let mut stream = HeaderStream::new(input);
    let mut result = Vec::new();

    loop {
        loop {
            stream.skip_cfws(None, smtputf8);
            if !stream.try_skip_char(b',') {
                break;
            }
        }
        if stream.is_eof() {
            break;
        }

        result.push(parse_msg_id(&mut stream, smtputf8)?);
    }

    Some(result)
}

/// String entry point, derived from the byte-buffer parser.
pub fn parse_id_list_str(input: &str, smtputf8: bool) -> Option<Vec<ContentId>> {
    parse_id_list(input.as_bytes(), smtputf8)
}

/// Parses exactly one msg-id; more than one (or none) yields `None`.
pub fn parse_single_id(input: &[u8], smtputf8: bool) -> Option<ContentId> {
    let mut ids = parse_id_list(input, smtputf8)?;
    if ids.len() == 1 {
        ids.pop()
    } else {
        None
    }
}

fn parse_msg_id<'x>(stream: &mut HeaderStream<'x>, smtputf8: bool) -> Option<ContentId<'x>> {
    if !stream.try_skip_char(b'<') {
        return None;
    }

    let local_start = stream.offset();
    read_id_run(stream, smtputf8);
    let local_part = stream.bytes(local_start..stream.offset());
    if !is_dot_atom(local_part, smtputf8) || !stream.try_skip_char(b'@') {
        return None;
    }

    let domain_start = stream.offset();
    if stream.peek_char(b'[') {
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
    } else {
        read_id_run(stream, smtputf8);
        if !is_dot_atom(stream.bytes(domain_start..stream.offset()), smtputf8) {
            return None;
        }
    }
    let domain_end = stream.offset();

    if !stream.try_skip_char(b'>') {
        return None;
    }

    Some(ContentId {
        local_part: stream.decode_slice(local_start..local_start + local_part.len(), smtputf8),
        domain: stream.decode_slice(domain_start..domain_end, smtputf8),
    })
}

fn read_id_run(stream: &mut HeaderStream, smtputf8: bool) {
    while let Some(ch) = stream.peek() {
        if is_atext(ch, smtputf8) || ch == b'.' {
            stream.next();
        } else {
            break;
        }
    }
}
