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

use std::{borrow::Cow, ops::Range};

use crate::decoders::charsets::{decode_latin1, decode_utf8_lossy};

pub mod encoded_word;
pub mod fields;

/// Cursor over a header value byte slice. Sub-parsers operate on the
/// unfolded logical value, so line breaks only appear as plain folding
/// white space.
pub struct HeaderStream<'x> {
    pub data: &'x [u8],
    pos: usize,
    restore_pos: usize,
}

impl<'x> HeaderStream<'x> {
    pub fn new(data: &'x [u8]) -> HeaderStream<'x> {
        HeaderStream {
            data,
            pos: 0,
            restore_pos: 0,
        }
    }

    #[inline(always)]
    pub fn next(&mut self) -> Option<u8> {
        let result = self.data.get(self.pos).copied();
        if result.is_some() {
            self.pos += 1;
        }
        result
    }

    #[inline(always)]
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    #[inline(always)]
    pub fn offset(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[inline(always)]
    pub fn checkpoint(&mut self) {
        self.restore_pos = self.pos;
    }

    #[inline(always)]
    pub fn restore(&mut self) {
        self.pos = self.restore_pos;
    }

    #[inline(always)]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    #[inline(always)]
    pub fn bytes(&self, range: Range<usize>) -> &'x [u8] {
        &self.data[range]
    }

    #[inline(always)]
    pub fn peek_char(&self, ch: u8) -> bool {
        self.peek() == Some(ch)
    }

    #[inline(always)]
    pub fn try_skip_char(&mut self, ch: u8) -> bool {
        if self.peek_char(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Returns the absolute position of the next occurrence of `target`
    /// from the cursor on, without moving the cursor.
    pub fn find_byte(&self, target: u8) -> Option<usize> {
        self.data[self.pos..]
            .iter()
            .position(|&ch| ch == target)
            .map(|found| self.pos + found)
    }

    /// Advances past folding white space and balanced `(...)` comments,
    /// optionally collecting the decoded comment text. Backslash escapes
    /// inside comments are literal. An unterminated comment leaves the
    /// cursor at the end of the slice.
    pub fn skip_cfws(&mut self, mut comments: Option<&mut Vec<Cow<'x, str>>>, smtputf8: bool) {
        while let Some(ch) = self.peek() {
            match ch {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.pos += 1;
                }
                b'(' => {
                    self.pos += 1;
                    let comment_start = self.pos;
                    let comment_end = self.skip_comment_body();
                    if let Some(comments) = comments.as_mut() {
                        comments.push(decode_comment(
                            self.bytes(comment_start..comment_end),
                            smtputf8,
                        ));
                    }
                }
                _ => break,
            }
        }
    }

    /// Consumes a comment body up to and including the balancing `)`,
    /// returning the position of the closing parenthesis (or the end of
    /// the slice when unterminated).
    fn skip_comment_body(&mut self) -> usize {
        let mut depth = 1;

        while let Some(ch) = self.next() {
            match ch {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return self.pos - 1;
                    }
                }
                b'\\' => {
                    self.next();
                }
                _ => (),
            }
        }

        self.pos
    }

    /// Advances past everything up to and including the next `;`.
    pub fn skip_group(&mut self) {
        while let Some(ch) = self.next() {
            if ch == b';' {
                break;
            }
        }
    }

    /// Decodes a byte range, replacing malformed sequences. Never fails.
    pub fn decode_slice(&self, range: Range<usize>, smtputf8: bool) -> Cow<'x, str> {
        let bytes = self.bytes(range);
        if smtputf8 {
            decode_utf8_lossy(bytes)
        } else {
            decode_latin1(bytes)
        }
    }

    /// Reads a quoted string with the cursor on the opening quote,
    /// resolving backslash escapes. Fails on an unterminated quote.
    pub fn read_quoted_string(&mut self, smtputf8: bool) -> Option<Cow<'x, str>> {
        self.next();
        let start = self.offset();
        let mut has_escape = false;

        loop {
            match self.next()? {
                b'"' => break,
                b'\\' => {
                    has_escape = true;
                    self.next()?;
                }
                _ => (),
            }
        }

        if !has_escape {
            Some(self.decode_slice(start..self.offset() - 1, smtputf8))
        } else {
            let content = self.bytes(start..self.offset() - 1);
            let mut value = Vec::with_capacity(content.len());
            let mut is_escaped = false;
            for &ch in content {
                if ch == b'\\' && !is_escaped {
                    is_escaped = true;
                } else {
                    value.push(ch);
                    is_escaped = false;
                }
            }
            Some(if smtputf8 {
                String::from_utf8(value)
                    .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
                    .into()
            } else {
                value.iter().map(|&ch| ch as char).collect::<String>().into()
            })
        }
    }
}

fn decode_comment(bytes: &[u8], smtputf8: bool) -> Cow<str> {
    let unescaped = if bytes.contains(&b'\\') {
        let mut value = Vec::with_capacity(bytes.len());
        let mut is_escaped = false;
        for &ch in bytes {
            if ch == b'\\' && !is_escaped {
                is_escaped = true;
            } else {
                value.push(ch);
                is_escaped = false;
            }
        }
        Cow::Owned(value)
    } else {
        Cow::Borrowed(bytes)
    };

    match (unescaped, smtputf8) {
        (Cow::Borrowed(bytes), true) => decode_utf8_lossy(bytes),
        (Cow::Borrowed(bytes), false) => decode_latin1(bytes),
        (Cow::Owned(bytes), true) => String::from_utf8(bytes)
            .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
            .into(),
        (Cow::Owned(bytes), false) => match decode_latin1(&bytes) {
            Cow::Borrowed(text) => text.to_string().into(),
            Cow::Owned(text) => text.into(),
        },
    }
}
