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
    decoders::{
        base64::{base64_decoded_size, decode_base64},
        charsets::{decode_latin1, decode_utf8_lossy, Charset},
        quoted_printable::decode_hex_char,
    },
    parsers::HeaderStream,
};

impl<'x> HeaderStream<'x> {
    /// Decodes one RFC2047 encoded word with the cursor positioned right
    /// after the leading `=`. Returns `None` without a defined cursor
    /// position when the token is not a well-formed encoded word or its
    /// charset is unknown; callers checkpoint and restore around the call
    /// to keep such tokens literal.
    pub fn decode_rfc2047(&mut self) -> Option<String> {
        if !self.try_skip_char(b'?') {
            return None;
        }

        let charset_start = self.offset();
        let mut charset_end = None;

        loop {
            match self.next()? {
                b'?' => {
                    break;
                }
                b'*' => {
                    // Language suffix, ignored.
                    charset_end.get_or_insert(self.offset() - 1);
                }
                b' ' | b'\t' | b'\r' | b'\n' => {
                    return None;
                }
                _ => (),
            }
        }

        let charset_end = charset_end.unwrap_or(self.offset() - 1);
        if charset_end - charset_start < 2 {
            return None;
        }

        let encoding = self.next()?;
        if !self.try_skip_char(b'?') {
            return None;
        }

        let content_start = self.offset();
        let content_end = loop {
            let found = self.find_byte(b'?')?;
            self.seek(found + 1);
            if self.try_skip_char(b'=') {
                break found;
            }
        };

        let bytes = match encoding {
            b'q' | b'Q' => decode_q(self.bytes(content_start..content_end))?,
            b'b' | b'B' => {
                let content = self.bytes(content_start..content_end);
                let mut buf = vec![0u8; base64_decoded_size(content.len())];
                let status = decode_base64(content, &mut buf, true);
                buf.truncate(status.decoded);
                buf
            }
            _ => return None,
        };

        Charset::parse(self.bytes(charset_start..charset_end)).map(|charset| charset.decode(&bytes))
    }
}

/// Q-encoding is a quoted-printable variant where `_` stands for a space
/// and soft line breaks do not occur. Invalid escapes fail the word.
fn decode_q(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut buf = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();

    while let Some(&ch) = iter.next() {
        match ch {
            b'_' => buf.push(b' '),
            b'=' => {
                let hex1 = *iter.next()?;
                let hex2 = *iter.next()?;
                buf.push(decode_hex_char(hex1, hex2)?);
            }
            b'\r' | b'\n' => (),
            _ => buf.push(ch),
        }
    }

    buf.into()
}

/// Decodes header text containing RFC2047 encoded words interleaved with
/// literal runs. Adjacent encoded words separated only by linear white
/// space are concatenated without the gap; all other text is preserved
/// literally, decoded as UTF-8 or ISO-8859-1 depending on `smtputf8`.
/// Words with an unknown charset or malformed syntax stay literal.
pub fn decode_encoded_text(bytes: &[u8], smtputf8: bool) -> Cow<str> {
    if !contains_encoded_word(bytes) {
        return decode_raw(bytes, smtputf8);
    }

    let mut stream = HeaderStream::new(bytes);
    let mut result = String::with_capacity(bytes.len());
    let mut literal_start = 0;
    let mut last_was_word = false;

    while let Some(ch) = stream.next() {
        if ch != b'=' || !stream.peek_char(b'?') {
            continue;
        }
        let word_start = stream.offset() - 1;
        stream.checkpoint();

        if let Some(text) = stream.decode_rfc2047() {
            let gap = &bytes[literal_start..word_start];
            if !(last_was_word && gap.iter().all(|ch| ch.is_ascii_whitespace())) {
                result.push_str(decode_raw(gap, smtputf8).as_ref());
            }
            result.push_str(&text);
            literal_start = stream.offset();
            last_was_word = true;
        } else {
            stream.restore();
        }
    }

    if literal_start == 0 {
        decode_raw(bytes, smtputf8)
    } else {
        if literal_start < bytes.len() {
            result.push_str(decode_raw(&bytes[literal_start..], smtputf8).as_ref());
        }
        result.into()
    }
}

#[inline(always)]
fn contains_encoded_word(bytes: &[u8]) -> bool {
    bytes.windows(2).any(|pair| pair == b"=?")
}

fn decode_raw(bytes: &[u8], smtputf8: bool) -> Cow<str> {
    if smtputf8 {
        decode_utf8_lossy(bytes)
    } else {
        decode_latin1(bytes)
    }
}
