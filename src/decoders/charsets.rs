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

/// A character set decoder. All decoders replace malformed or unmappable
/// sequences instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Latin1,
    #[cfg(feature = "full_encoding")]
    Other(&'static encoding_rs::Encoding),
}

impl Charset {
    /// Looks up a charset by its MIME label. UTF-8, US-ASCII and
    /// ISO-8859-1 are handled natively; everything else is resolved
    /// through `encoding_rs` when the `full_encoding` feature is enabled.
    pub fn parse(label: &[u8]) -> Option<Charset> {
        let mut name = Vec::with_capacity(label.len());
        for &ch in label {
            match ch {
                b' ' | b'\t' | b'\r' | b'\n' => (),
                b':' => break,
                b'_' => name.push(b'-'),
                _ => name.push(ch.to_ascii_lowercase()),
            }
        }

        match &name[..] {
            b"utf-8" | b"utf8" => Some(Charset::Utf8),
            b"us-ascii" | b"ascii" | b"iso-8859-1" | b"latin1" | b"l1" | b"cp819" | b"ibm819" => {
                Some(Charset::Latin1)
            }
            #[cfg(feature = "full_encoding")]
            _ => encoding_rs::Encoding::for_label(&name).map(Charset::Other),
            #[cfg(not(feature = "full_encoding"))]
            _ => None,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => decode_utf8_lossy(bytes).into_owned(),
            Charset::Latin1 => decode_latin1(bytes).into_owned(),
            #[cfg(feature = "full_encoding")]
            Charset::Other(encoding) => encoding.decode(bytes).0.into_owned(),
        }
    }
}

/// Decodes UTF-8, replacing malformed sequences.
pub fn decode_utf8_lossy(bytes: &[u8]) -> Cow<str> {
    String::from_utf8_lossy(bytes)
}

/// Decodes ISO-8859-1, borrowing when the input is plain ASCII.
pub fn decode_latin1(bytes: &[u8]) -> Cow<str> {
    if bytes.is_ascii() {
        // Safe to borrow, ASCII is valid UTF-8.
        match std::str::from_utf8(bytes) {
            Ok(text) => Cow::Borrowed(text),
            Err(_) => Cow::Owned(bytes.iter().map(|&ch| ch as char).collect()),
        }
    } else {
        Cow::Owned(bytes.iter().map(|&ch| ch as char).collect())
    }
}
