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

//! Best-effort salvage of legacy header forms that failed the strict
//! parsers: RFC822 source routes, bare addr-specs, display names in
//! front of angle addresses with broken phrases, and message ids
//! without angle brackets.

use crate::{parsers::encoded_word::decode_encoded_text, Addr, Address, ContentId};

use super::is_atext;

/// Salvages what it can from a header value that failed strict address
/// parsing. The value is split at top-level commas (quoted strings are
/// respected), each segment is RFC2047-decoded and matched against the
/// legacy shapes. Unsalvageable segments are dropped; if nothing
/// survives the result is `None`.
pub fn parse_obsolete_address_list(input: &[u8], smtputf8: bool) -> Option<Vec<Address<'static>>> {
    let mut result = Vec::new();

    for segment in split_top_level(input) {
        let decoded = decode_encoded_text(segment, smtputf8);
        let text = decoded.trim();
        if text.is_empty() {
            continue;
        }

        if let Some(addr) = salvage_segment(text) {
            result.push(Address::Addr(addr));
        }
    }

    if !result.is_empty() {
        Some(result)
    } else {
        None
    }
}

fn salvage_segment(text: &str) -> Option<Addr<'static>> {
    // Source route: @relay1,@relay2:user@host keeps only the final
    // addr-spec. The route fragments themselves arrive as separate
    // comma segments and are dropped.
    if let Some(rest) = text.strip_prefix('@') {
        let (_, addr_spec) = rest.split_once(':')?;
        let (local_part, domain) = salvage_addr_spec(addr_spec)?;
        return Some(simple_addr(None, local_part, domain, true));
    }

    // Display name with an angle address.
    if let Some(angle_start) = text.rfind('<') {
        let angle = &text[angle_start + 1..];
        let angle = angle.strip_suffix('>').unwrap_or(angle);

        // The angle contents may be source routed as well.
        let addr_spec = if let Some(rest) = angle.strip_prefix('@') {
            rest.split_once(':')?.1
        } else {
            angle
        };

        let (local_part, domain) = salvage_addr_spec(addr_spec)?;
        let display_name = strip_quotes(text[..angle_start].trim());
        return Some(simple_addr(
            if !display_name.is_empty() {
                Some(display_name)
            } else {
                None
            },
            local_part,
            domain,
            false,
        ));
    }

    let (local_part, domain) = salvage_addr_spec(text)?;
    Some(simple_addr(None, local_part, domain, true))
}

/// Splits an addr-spec at the last `@`; both sides must be non-empty
/// and free of white space, and the domain must not begin or end with
/// a dot.
fn salvage_addr_spec(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    let at_pos = text.rfind('@')?;
    let (local_part, domain) = (&text[..at_pos], &text[at_pos + 1..]);

    if local_part.is_empty()
        || domain.is_empty()
        || local_part.chars().any(char::is_whitespace)
        || domain.chars().any(char::is_whitespace)
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return None;
    }

    Some((local_part, domain))
}

fn simple_addr(
    display_name: Option<&str>,
    local_part: &str,
    domain: &str,
    simple_address: bool,
) -> Addr<'static> {
    Addr {
        display_name: display_name.map(|name| name.to_string().into()),
        local_part: local_part.to_string().into(),
        domain: domain.to_string().into(),
        simple_address,
        comments: Vec::new(),
    }
}

fn strip_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|text| text.strip_suffix('"'))
        .unwrap_or(text)
}

fn split_top_level(input: &[u8]) -> Vec<&[u8]> {
    let mut segments = Vec::new();
    let mut segment_start = 0;
    let mut in_quote = false;
    let mut is_escaped = false;

    for (pos, &ch) in input.iter().enumerate() {
        if is_escaped {
            is_escaped = false;
            continue;
        }
        match ch {
            b'\\' => is_escaped = true,
            b'"' => in_quote = !in_quote,
            b',' if !in_quote => {
                segments.push(&input[segment_start..pos]);
                segment_start = pos + 1;
            }
            _ => (),
        }
    }

    segments.push(&input[segment_start..]);
    segments
}

/// Salvages legacy message-id lists: comments are stripped, the rest is
/// split on white space and commas, and each token is accepted with or
/// without angle brackets. The local part is held to an extended
/// alphanumeric set and the domain must contain a dot and not begin or
/// end with `.` or `-`.
pub fn parse_obsolete_id_list(input: &[u8], smtputf8: bool) -> Option<Vec<ContentId<'static>>> {
    let stripped = strip_comments(input);
    let decoded = decode_encoded_text(&stripped, smtputf8);
    let mut result = Vec::new();

    for token in decoded.split(|ch: char| ch.is_whitespace() || ch == ',') {
        let token = token.strip_prefix('<').unwrap_or(token);
        let token = token.strip_suffix('>').unwrap_or(token);
        if token.is_empty() {
            continue;
        }

        if let Some((local_part, domain)) = salvage_msg_id(token, smtputf8) {
            result.push(ContentId {
                local_part: local_part.to_string().into(),
                domain: domain.to_string().into(),
            });
        }
    }

    if !result.is_empty() {
        Some(result)
    } else {
        None
    }
}

fn salvage_msg_id(token: &str, smtputf8: bool) -> Option<(&str, &str)> {
    let at_pos = token.rfind('@')?;
    let (local_part, domain) = (&token[..at_pos], &token[at_pos + 1..]);

    if local_part.is_empty()
        || !local_part
            .bytes()
            .all(|ch| is_atext(ch, smtputf8) || ch == b'.')
    {
        return None;
    }

    if !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
        || !domain
            .bytes()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == b'.' || ch == b'-' || (ch >= 0x80 && smtputf8))
    {
        return None;
    }

    Some((local_part, domain))
}

fn strip_comments(input: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let mut comment_depth = 0u32;
    let mut is_escaped = false;

    for &ch in input {
        if is_escaped {
            is_escaped = false;
            if comment_depth == 0 {
                result.push(ch);
            }
            continue;
        }
        match ch {
            b'\\' => {
                is_escaped = true;
                if comment_depth == 0 {
                    result.push(ch);
                }
            }
            b'(' => comment_depth += 1,
            b')' if comment_depth > 0 => comment_depth -= 1,
            _ if comment_depth == 0 => result.push(ch),
            _ => (),
        }
    }

    result
}
