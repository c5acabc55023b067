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
    ContentDisposition, ContentType, Parameter,
};

/// Parses `type "/" subtype *( ";" parameter )`. Type and subtype are
/// lowercased for storage; parameter values keep their case.
pub fn parse_content_type(input: &[u8], smtputf8: bool) -> Option<ContentType> {
    let mut stream = HeaderStream::new(input);

    stream.skip_cfws(None, smtputf8);
    let c_type = read_token(&mut stream, smtputf8)?;
    stream.skip_cfws(None, smtputf8);
    if !stream.try_skip_char(b'/') {
        return None;
    }
    stream.skip_cfws(None, smtputf8);
    let c_subtype = read_token(&mut stream, smtputf8)?;

    Some(ContentType {
        c_type: lowercase(c_type),
        c_subtype: lowercase(c_subtype),
        attributes: parse_parameters(&mut stream, smtputf8)?,
    })
}

/// Parses `disposition-type *( ";" parameter )`.
pub fn parse_content_disposition(input: &[u8], smtputf8: bool) -> Option<ContentDisposition> {
    let mut stream = HeaderStream::new(input);

    stream.skip_cfws(None, smtputf8);
    let c_disposition = read_token(&mut stream, smtputf8)?;

    Some(ContentDisposition {
        c_disposition: lowercase(c_disposition),
        attributes: parse_parameters(&mut stream, smtputf8)?,
    })
}

fn parse_parameters<'x>(
    stream: &mut HeaderStream<'x>,
    smtputf8: bool,
) -> Option<Vec<Parameter<'x>>> {
    let mut attributes = Vec::new();

    loop {
        stream.skip_cfws(None, smtputf8);
        match stream.peek() {
            None => break,
            Some(b';') => {
                stream.next();
            }
            _ => return None,
        }

        stream.skip_cfws(None, smtputf8);
        if stream.is_eof() {
            // Trailing semicolons are common enough to tolerate.
            break;
        }

        let name = read_token(stream, smtputf8)?;
        stream.skip_cfws(None, smtputf8);
        if !stream.try_skip_char(b'=') {
            return None;
        }
        stream.skip_cfws(None, smtputf8);

        let value = if stream.peek_char(b'"') {
            stream.read_quoted_string(smtputf8)?
        } else {
            read_token(stream, smtputf8)?
        };

        attributes.push(Parameter {
            name: lowercase(name),
            // The value is already decoded text, so encoded words in it
            // decode against UTF-8 literals.
            value: if value.contains("=?") {
                decode_encoded_text(value.as_bytes(), true).into_owned().into()
            } else {
                value
            },
        });
    }

    Some(attributes)
}

/// Reads an RFC2045 token: printable ASCII minus tspecials and space.
/// SMTPUTF8 admits non-ASCII bytes.
fn read_token<'x>(stream: &mut HeaderStream<'x>, smtputf8: bool) -> Option<Cow<'x, str>> {
    let start = stream.offset();

    while let Some(ch) = stream.peek() {
        if is_token_char(ch, smtputf8) {
            stream.next();
        } else {
            break;
        }
    }

    if stream.offset() > start {
        Some(stream.decode_slice(start..stream.offset(), smtputf8))
    } else {
        None
    }
}

fn is_token_char(ch: u8, smtputf8: bool) -> bool {
    match ch {
        b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"' | b'/' | b'['
        | b']' | b'?' | b'=' => false,
        0x21..=0x7e => true,
        0x80.. => smtputf8,
        _ => false,
    }
}

fn lowercase(value: Cow<str>) -> Cow<str> {
    if value.bytes().any(|ch| ch.is_ascii_uppercase()) {
        value.to_ascii_lowercase().into()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use crate::{ContentType, Parameter};

    use super::{parse_content_disposition, parse_content_type};

    fn ct<'x>(
        c_type: &'x str,
        c_subtype: &'x str,
        attributes: Vec<(&'x str, &'x str)>,
    ) -> ContentType<'x> {
        ContentType {
            c_type: c_type.into(),
            c_subtype: c_subtype.into(),
            attributes: attributes
                .into_iter()
                .map(|(name, value)| Parameter {
                    name: name.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }

    #[test]
    fn parse_content_types() {
        for (input, expected_result) in [
            ("text/plain", Some(ct("text", "plain", vec![]))),
            (
                "text/plain; charset=us-ascii",
                Some(ct("text", "plain", vec![("charset", "us-ascii")])),
            ),
            (
                "text/plain; charset=\"us-ascii\"",
                Some(ct("text", "plain", vec![("charset", "us-ascii")])),
            ),
            (
                "Multipart/Mixed; Boundary=\"simple boundary\"",
                Some(ct("multipart", "mixed", vec![("boundary", "simple boundary")])),
            ),
            (
                "multipart/mixed; boundary=gc0pJq0M:08jU534c0p; charset=ISO-8859-1",
                None,
            ),
            (
                "multipart/mixed; boundary=\"gc0pJq0M:08jU534c0p\"",
                Some(ct(
                    "multipart",
                    "mixed",
                    vec![("boundary", "gc0pJq0M:08jU534c0p")],
                )),
            ),
            (
                "text/plain; charset=us-ascii;",
                Some(ct("text", "plain", vec![("charset", "us-ascii")])),
            ),
            (
                "application/x-stuff; title*0=\"part one\"; title*1=\" part two\"",
                Some(ct(
                    "application",
                    "x-stuff",
                    vec![("title*0", "part one"), ("title*1", " part two")],
                )),
            ),
            (
                "image/gif; name=\"=?utf-8?q?caf=C3=A9?=.gif\"",
                Some(ct("image", "gif", vec![("name", "café.gif")])),
            ),
            (
                "text / plain (comment) ; charset = us-ascii",
                Some(ct("text", "plain", vec![("charset", "us-ascii")])),
            ),
            ("text", None),
            ("text/", None),
            ("/plain", None),
            ("text/plain; charset", None),
            ("text/plain; =value", None),
            ("text/plain; charset=\"unterminated", None),
            ("", None),
        ] {
            assert_eq!(
                parse_content_type(input.as_bytes(), true),
                expected_result,
                "failed for {input:?}"
            );
        }
    }

    #[test]
    fn parse_content_dispositions() {
        let disposition = parse_content_disposition(
            b"Attachment; filename=\"photo.jpg\"; modification-date=\"Wed, 12 Feb 1997 16:29:51 -0500\"",
            true,
        )
        .unwrap();

        assert!(disposition.is_attachment());
        assert_eq!(disposition.attribute("FileName"), Some("photo.jpg"));
        assert_eq!(
            disposition.attribute("modification-date"),
            Some("Wed, 12 Feb 1997 16:29:51 -0500")
        );

        assert_eq!(parse_content_disposition(b"", true), None);
        assert!(parse_content_disposition(b"inline", true)
            .unwrap()
            .is_inline());
    }
}
