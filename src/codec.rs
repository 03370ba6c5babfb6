/*
 * mailbox - transfer codec module.
 *
 * Copyright 2024 Manos Pitsidianakis
 *
 * This file is part of mailbox.
 *
 * mailbox is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * mailbox is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with mailbox. If not, see <http://www.gnu.org/licenses/>.
 */

//! `7bit`/`8bit`/`binary`/`quoted-printable`/`base64` transfer-encoding
//! codecs. §4.3.

use crate::error::{Error, ErrorKind, Result};
use data_encoding::BASE64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Binary,
    QuotedPrintable,
    Base64,
}

impl TransferEncoding {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "7bit" => Some(TransferEncoding::SevenBit),
            "8bit" => Some(TransferEncoding::EightBit),
            "binary" => Some(TransferEncoding::Binary),
            "quoted-printable" => Some(TransferEncoding::QuotedPrintable),
            "base64" => Some(TransferEncoding::Base64),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransferEncoding::SevenBit => "7bit",
            TransferEncoding::EightBit => "8bit",
            TransferEncoding::Binary => "binary",
            TransferEncoding::QuotedPrintable => "quoted-printable",
            TransferEncoding::Base64 => "base64",
        }
    }

    pub fn encode(self, input: &[u8]) -> Vec<u8> {
        match self {
            TransferEncoding::SevenBit => encode_7bit(input),
            TransferEncoding::EightBit => encode_8bit(input),
            TransferEncoding::Binary => input.to_vec(),
            TransferEncoding::QuotedPrintable => encode_quoted_printable(input),
            TransferEncoding::Base64 => encode_base64(input),
        }
    }

    pub fn decode(self, input: &[u8]) -> Result<Vec<u8>> {
        match self {
            TransferEncoding::SevenBit => Ok(decode_7bit(input)),
            TransferEncoding::EightBit => Ok(decode_8bit(input)),
            TransferEncoding::Binary => Ok(input.to_vec()),
            TransferEncoding::QuotedPrintable => decode_quoted_printable(input),
            TransferEncoding::Base64 => decode_base64(input),
        }
    }
}

/// `7bit`: bytes must be ASCII; non-ASCII bytes are filtered out on
/// "encode" (there is nothing meaningful to transform otherwise).
fn encode_7bit(input: &[u8]) -> Vec<u8> {
    input.iter().copied().filter(|b| *b < 128).collect()
}

fn decode_7bit(input: &[u8]) -> Vec<u8> {
    input.iter().copied().filter(|b| *b < 128).collect()
}

/// `8bit`: strip NUL and bare CR, keep 8-bit bytes untouched otherwise.
fn encode_8bit(input: &[u8]) -> Vec<u8> {
    strip_nul_and_bare_cr(input)
}

fn decode_8bit(input: &[u8]) -> Vec<u8> {
    strip_nul_and_bare_cr(input)
}

fn strip_nul_and_bare_cr(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b == 0 {
            i += 1;
            continue;
        }
        if b == b'\r' {
            if i + 1 < input.len() && input[i + 1] == b'\n' {
                out.push(b);
            }
            // else: bare CR, drop it.
            i += 1;
            continue;
        }
        out.push(b);
        i += 1;
    }
    out
}

const QP_LINE_LEN: usize = 76;

fn encode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut col = 0usize;
    let mut push_soft_break = |out: &mut Vec<u8>, col: &mut usize| {
        out.push(b'=');
        out.push(b'\r');
        out.push(b'\n');
        *col = 0;
    };
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b == b'\r' && input.get(i + 1) == Some(&b'\n') {
            out.push(b'\r');
            out.push(b'\n');
            col = 0;
            i += 2;
            continue;
        }
        let needs_escape = b == b'=' || b < 32 && b != b'\t' || b >= 127;
        let is_trailing_space = (b == b' ' || b == b'\t')
            && matches!(input.get(i + 1), None | Some(b'\r') | Some(b'\n'));
        if needs_escape || is_trailing_space {
            if col + 3 > QP_LINE_LEN {
                push_soft_break(&mut out, &mut col);
            }
            out.push(b'=');
            out.push(hex_digit(b >> 4));
            out.push(hex_digit(b & 0xf));
            col += 3;
        } else {
            if col + 1 > QP_LINE_LEN {
                push_soft_break(&mut out, &mut col);
            }
            out.push(b);
            col += 1;
        }
        i += 1;
    }
    out
}

fn hex_digit(n: u8) -> u8 {
    match n {
        0..=9 => b'0' + n,
        10..=15 => b'A' + (n - 10),
        _ => unreachable!(),
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

fn decode_quoted_printable(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'=' if input.get(i + 1) == Some(&b'\r') && input.get(i + 2) == Some(&b'\n') => {
                // soft line break
                i += 3;
            }
            b'=' if input.get(i + 1) == Some(&b'\n') => {
                i += 2;
            }
            b'=' => {
                let hi = input.get(i + 1).copied().and_then(hex_value);
                let lo = input.get(i + 2).copied().and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        return Err(Error::new(
                            ErrorKind::ParseError,
                            "invalid quoted-printable escape",
                        ))
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn encode_base64(input: &[u8]) -> Vec<u8> {
    let raw = BASE64.encode(input);
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 76);
    for (i, chunk) in raw.as_bytes().chunks(76).enumerate() {
        if i > 0 {
            out.push(b'\n');
        }
        out.extend_from_slice(chunk);
    }
    out
}

fn decode_base64(input: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(&cleaned)
        .map_err(|e| Error::new(ErrorKind::ParseError, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(enc: TransferEncoding, clean: &[u8]) {
        let encoded = enc.encode(clean);
        let decoded = enc.decode(&encoded).unwrap();
        assert_eq!(decoded, clean, "round trip failed for {:?}", enc);
    }

    #[test]
    fn base64_round_trips_clean_input() {
        round_trip(TransferEncoding::Base64, b"hello, 7-bit clean world!\n");
    }

    #[test]
    fn quoted_printable_round_trips_clean_input() {
        round_trip(
            TransferEncoding::QuotedPrintable,
            b"plain ascii\r\nwith =equals= and  trailing space\r\n",
        );
    }

    #[test]
    fn binary_is_identity() {
        round_trip(TransferEncoding::Binary, &[0, 1, 2, 255, 254]);
    }

    #[test]
    fn base64_example_from_spec() {
        let encoded: &[u8] = b"VGhpcyB0ZXh0IGlzIHVzZWQgdG8gdGVzdCBiYXNlNjQgZW5jb2RpbmcgYW5kIGRlY29kaW5nLiAg\nTGV0CnNlZSB3aGV0aGVyIGl0IHdvcmtzLgo=";
        let decoded = TransferEncoding::Base64.decode(encoded).unwrap();
        assert_eq!(
            String::from_utf8(decoded.clone()).unwrap(),
            "This text is used to test base64 encoding and decoding.  Let\nsee whether it works.\n"
        );
        let re_encoded = TransferEncoding::Base64.encode(&decoded);
        assert_eq!(re_encoded, encoded);
    }

    #[test]
    fn quoted_printable_escapes_equals_and_control_bytes() {
        let encoded = TransferEncoding::QuotedPrintable.encode(b"100% = \x01");
        let decoded = TransferEncoding::QuotedPrintable.decode(&encoded).unwrap();
        assert_eq!(decoded, b"100% = \x01");
        assert!(encoded.windows(3).any(|w| w == b"=3D"));
    }

    #[test]
    fn eightbit_strips_nul_and_bare_cr() {
        let decoded = TransferEncoding::EightBit.decode(b"a\0b\rc\r\nd").unwrap();
        assert_eq!(decoded, b"abc\r\nd");
    }
}
