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

use super::DecodeStatus;

const PAD: u8 = 64;
const SKIP: u8 = 255;

/// Streaming Base64 decoder. Decodes as much of `src` into `dst` as fits,
/// honoring RFC2045 leniency: anything outside the Base64 alphabet is
/// skipped. One quantum of four alphabet characters (padding included)
/// emits up to three bytes.
///
/// When `end_of_stream` is false, a trailing partial quantum is neither
/// consumed nor emitted; callers keep it in their rolling buffer and feed
/// it again. When `end_of_stream` is true, a 2- or 3-character tail is
/// flushed as 1 or 2 bytes; a lone trailing character carries fewer than
/// eight bits and emits nothing.
///
/// When the output would overflow mid-quantum, decoding stops at the last
/// completed quantum boundary and `consumed` reflects the bytes up to it.
pub fn decode_base64(src: &[u8], dst: &mut [u8], end_of_stream: bool) -> DecodeStatus {
    let mut quantum = [0u8; 4];
    let mut chars = 0;
    let mut data_chars = 0;

    let mut decoded = 0;
    let mut consumed = 0;

    for (pos, &ch) in src.iter().enumerate() {
        let val = BASE64_MAP[ch as usize];

        if val == SKIP {
            if chars == 0 {
                consumed = pos + 1;
            }
            continue;
        }

        if val != PAD && data_chars == chars {
            quantum[data_chars] = val;
            data_chars += 1;
        }
        chars += 1;

        if chars == 4 {
            let bytes = quantum_size(data_chars);
            if decoded + bytes > dst.len() {
                return DecodeStatus { decoded, consumed };
            }
            emit_quantum(&quantum, bytes, &mut dst[decoded..]);
            decoded += bytes;
            consumed = pos + 1;
            chars = 0;
            data_chars = 0;
        }
    }

    if end_of_stream && chars > 0 {
        let bytes = match data_chars {
            3 => 2,
            2 => 1,
            _ => 0,
        };
        if decoded + bytes <= dst.len() {
            emit_quantum(&quantum, bytes, &mut dst[decoded..]);
            decoded += bytes;
            consumed = src.len();
        }
    }

    DecodeStatus { decoded, consumed }
}

#[inline(always)]
fn quantum_size(data_chars: usize) -> usize {
    match data_chars {
        4 => 3,
        3 => 2,
        2 => 1,
        _ => 0,
    }
}

#[inline(always)]
fn emit_quantum(quantum: &[u8; 4], bytes: usize, dst: &mut [u8]) {
    if bytes > 0 {
        dst[0] = (quantum[0] << 2) | (quantum[1] >> 4);
    }
    if bytes > 1 {
        dst[1] = (quantum[1] << 4) | (quantum[2] >> 2);
    }
    if bytes > 2 {
        dst[2] = (quantum[2] << 6) | quantum[3];
    }
}

/// Upper bound for the decoded size of `len` encoded bytes, always at
/// least `ceil(len * 3 / 4)`.
pub fn base64_decoded_size(len: usize) -> usize {
    (len / 4 + 1) * 3
}

pub static BASE64_MAP: &[u8] = &[
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 62, 255, 255, 255, 63,
    52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 255, 255, 255, 64, 255, 255,
    255, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14,
    15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 255, 255, 255, 255, 255,
    255, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40,
    41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
];
