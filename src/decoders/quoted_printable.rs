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

/// Streaming Quoted-Printable decoder. Unescaped bytes pass through
/// literally, `=HH` escapes emit the encoded byte and `=<CR><LF>` or
/// `=<LF>` soft line breaks emit nothing.
///
/// When `end_of_stream` is false, an `=` with fewer than two bytes of
/// lookahead (including `=<CR>` still waiting for the `<LF>`) is not
/// consumed so the caller can compact and refill its buffer. At end of
/// stream, incomplete or invalid escapes are flushed as literal bytes.
///
/// When the output would overflow, decoding stops before the token that
/// does not fit and `consumed` reflects the bytes up to it.
pub fn decode_quoted_printable(src: &[u8], dst: &mut [u8], end_of_stream: bool) -> DecodeStatus {
    let mut decoded = 0;
    let mut consumed = 0;

    while consumed < src.len() {
        let ch = src[consumed];

        if ch != b'=' {
            if decoded + 1 > dst.len() {
                break;
            }
            dst[decoded] = ch;
            decoded += 1;
            consumed += 1;
            continue;
        }

        match src.get(consumed + 1) {
            None => {
                if !end_of_stream || decoded + 1 > dst.len() {
                    break;
                }
                dst[decoded] = b'=';
                decoded += 1;
                consumed += 1;
            }
            Some(b'\n') => {
                consumed += 2;
            }
            Some(b'\r') => match src.get(consumed + 2) {
                Some(b'\n') => {
                    consumed += 3;
                }
                Some(_) => {
                    // Not a soft break, flush the '=' literally and let
                    // the CR pass through on the next iteration.
                    if decoded + 1 > dst.len() {
                        return DecodeStatus { decoded, consumed };
                    }
                    dst[decoded] = b'=';
                    decoded += 1;
                    consumed += 1;
                }
                None => {
                    if !end_of_stream || decoded + 2 > dst.len() {
                        return DecodeStatus { decoded, consumed };
                    }
                    dst[decoded] = b'=';
                    dst[decoded + 1] = b'\r';
                    decoded += 2;
                    consumed += 2;
                }
            },
            Some(&hex1) => {
                if consumed + 2 >= src.len() && !end_of_stream {
                    break;
                }
                match src
                    .get(consumed + 2)
                    .and_then(|&hex2| decode_hex_char(hex1, hex2))
                {
                    Some(byte) => {
                        if decoded + 1 > dst.len() {
                            return DecodeStatus { decoded, consumed };
                        }
                        dst[decoded] = byte;
                        decoded += 1;
                        consumed += 3;
                    }
                    None => {
                        // Invalid escape, flush the '=' literally; the
                        // following bytes pass through unchanged.
                        if decoded + 1 > dst.len() {
                            return DecodeStatus { decoded, consumed };
                        }
                        dst[decoded] = b'=';
                        decoded += 1;
                        consumed += 1;
                    }
                }
            }
        }
    }

    DecodeStatus { decoded, consumed }
}

#[inline(always)]
pub fn decode_hex_char(hex1: u8, hex2: u8) -> Option<u8> {
    let hex1 = HEX_MAP[hex1 as usize];
    let hex2 = HEX_MAP[hex2 as usize];
    if hex1 != -1 && hex2 != -1 {
        (((hex1 as u8) << 4) | hex2 as u8).into()
    } else {
        None
    }
}

/*
 * Adapted from Daniel Lemire's source:
 * https://github.com/lemire/Code-used-on-Daniel-Lemire-s-blog/blob/master/2019/04/17/hexparse.cpp
 *
 */

pub static HEX_MAP: &[i8] = &[
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, -1, -1, -1, -1, -1, -1, -1, 10, 11, 12, 13, 14, 15, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, 10,
    11, 12, 13, 14, 15, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
];

#[cfg(test)]
mod tests {
    use super::decode_quoted_printable;

    fn decode_all(input: &[u8]) -> Vec<u8> {
        let mut dst = vec![0u8; input.len() + 2];
        let status = decode_quoted_printable(input, &mut dst, true);
        assert_eq!(status.consumed, input.len(), "failed for {input:?}");
        dst.truncate(status.decoded);
        dst
    }

    #[test]
    fn decode_whole_streams() {
        for (encoded_str, expected_result) in [
            ("this is plain text", "this is plain text"),
            ("=48=65=6C=6C=6F", "Hello"),
            ("J'interdis =C3=A0 suivre", "J'interdis à suivre"),
            ("soft=\r\nbreak", "softbreak"),
            ("soft=\nbreak", "softbreak"),
            ("hard\r\nbreak", "hard\r\nbreak"),
            ("=e2=80=94 dash", "— dash"),
            ("trailing=", "trailing="),
            ("trailing=\r", "trailing=\r"),
            ("bad=ZZescape", "bad=ZZescape"),
            ("=A", "=A"),
            ("", ""),
        ] {
            assert_eq!(
                decode_all(encoded_str.as_bytes()),
                expected_result.as_bytes(),
                "failed for {encoded_str:?}"
            );
        }
    }

    #[test]
    fn suspend_on_partial_escape() {
        let mut dst = [0u8; 16];

        // '=' with less than two bytes of lookahead is left unconsumed.
        let status = decode_quoted_printable(b"abc=4", &mut dst, false);
        assert_eq!(status.consumed, 3);
        assert_eq!(&dst[..status.decoded], b"abc");

        // '=<CR>' still waits for the '<LF>'.
        let status = decode_quoted_printable(b"abc=\r", &mut dst, false);
        assert_eq!(status.consumed, 3);
        assert_eq!(&dst[..status.decoded], b"abc");

        let status = decode_quoted_printable(b"=\r\nxy", &mut dst, false);
        assert_eq!(status.consumed, 5);
        assert_eq!(&dst[..status.decoded], b"xy");
    }

    #[test]
    fn stop_at_output_limit() {
        let input = b"=48=65=6C=6C=6F World";
        let mut dst = [0u8; 3];
        let mut result = Vec::new();
        let mut consumed_total = 0;

        while consumed_total < input.len() {
            let status = decode_quoted_printable(&input[consumed_total..], &mut dst, true);
            assert!(status.decoded > 0 || status.consumed > 0, "no progress");
            result.extend_from_slice(&dst[..status.decoded]);
            consumed_total += status.consumed;
        }

        assert_eq!(result, b"Hello World");
    }

    #[test]
    fn split_safety() {
        let input = b"J'interdis =C3=A0 suivre les voil=C3=\r\n=A0 bient=C3=B4t=\n la=20fin";
        let expected = decode_all(input);

        for split in 0..input.len() {
            let mut buffer = Vec::new();
            let mut result = Vec::new();
            let mut dst = [0u8; 128];

            for (chunk, eos) in [(&input[..split], false), (&input[split..], true)] {
                buffer.extend_from_slice(chunk);
                let status = decode_quoted_printable(&buffer, &mut dst, eos);
                result.extend_from_slice(&dst[..status.decoded]);
                buffer.drain(..status.consumed);
            }

            assert_eq!(result, expected, "failed at split {split}");
        }
    }
}
