/*
 * mailbox - body module.
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

//! Opaque payload with MIME type, transfer encoding, charset, disposition;
//! variants: in-memory lines, in-memory file, delayed, multipart, nested
//! (message/rfc822). §4.3.

use crate::codec::TransferEncoding;
use crate::error::Result;
use crate::message::Message;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct BodyMeta {
    pub mime_type: String,
    pub charset: Option<String>,
    pub transfer_encoding: TransferEncoding,
    pub disposition: Option<String>,
    pub modified: bool,
}

impl Default for BodyMeta {
    fn default() -> Self {
        BodyMeta {
            mime_type: "text/plain".to_string(),
            charset: None,
            transfer_encoding: TransferEncoding::SevenBit,
            disposition: None,
            modified: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum BodyVariant {
    Lines(Vec<String>),
    File {
        path: PathBuf,
        size: usize,
        line_count: usize,
    },
    Multipart {
        preamble: Option<Box<Body>>,
        parts: Vec<Message>,
        epilogue: Option<Box<Body>>,
        boundary: String,
    },
    Nested(Box<Message>),
    Delayed {
        begin: usize,
        end: usize,
        size_hint: usize,
        line_count_hint: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Body {
    pub variant: BodyVariant,
    pub meta: BodyMeta,
}

impl Default for Body {
    fn default() -> Self {
        Body::from_lines(Vec::new())
    }
}

impl Body {
    pub fn from_lines(lines: Vec<String>) -> Self {
        Body {
            variant: BodyVariant::Lines(lines),
            meta: BodyMeta::default(),
        }
    }

    pub fn delayed(begin: usize, end: usize) -> Self {
        Body {
            variant: BodyVariant::Delayed {
                begin,
                end,
                size_hint: end.saturating_sub(begin),
                line_count_hint: 0,
            },
            meta: BodyMeta::default(),
        }
    }

    pub fn is_delayed(&self) -> bool {
        matches!(self.variant, BodyVariant::Delayed { .. })
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.variant, BodyVariant::Multipart { .. })
    }

    /// Materializes a `Delayed` body into `Lines` by reading `raw[begin..end]`.
    /// No-op for already-materialized variants.
    pub fn materialize(&mut self, raw: &[u8]) -> Result<()> {
        if let BodyVariant::Delayed { begin, end, .. } = self.variant {
            let slice = &raw[begin..end.min(raw.len())];
            let decoded = self.meta.transfer_encoding.decode(slice)?;
            let text = decode_charset(&decoded, self.meta.charset.as_deref());
            self.variant = BodyVariant::Lines(split_keeping_terminators(&text));
        }
        Ok(())
    }

    /// Total byte length of the materialized (or hinted) content.
    pub fn size(&self) -> usize {
        match &self.variant {
            BodyVariant::Lines(lines) => lines.iter().map(|l| l.len()).sum(),
            BodyVariant::File { size, .. } => *size,
            BodyVariant::Delayed { size_hint, .. } => *size_hint,
            BodyVariant::Nested(m) => m.size(),
            BodyVariant::Multipart {
                preamble,
                parts,
                epilogue,
                ..
            } => {
                preamble.as_ref().map(|b| b.size()).unwrap_or(0)
                    + parts.iter().map(|m| m.size()).sum::<usize>()
                    + epilogue.as_ref().map(|b| b.size()).unwrap_or(0)
            }
        }
    }

    pub fn parts(&self) -> &[Message] {
        match &self.variant {
            BodyVariant::Multipart { parts, .. } => parts,
            _ => &[],
        }
    }

    pub fn text(&self) -> String {
        match &self.variant {
            BodyVariant::Lines(lines) => lines.concat(),
            _ => String::new(),
        }
    }

    /// Materialized lines, for backends that re-serialize byte-for-byte
    /// (e.g. Mbox's `From `-escaping pass). Empty for unmaterialized or
    /// structural variants.
    pub fn lines(&self) -> &[String] {
        match &self.variant {
            BodyVariant::Lines(lines) => lines,
            _ => &[],
        }
    }
}

fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    match charset.map(|c| c.to_ascii_lowercase()) {
        Some(ref c) if c != "utf-8" && c != "us-ascii" => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(c.as_bytes()) {
                let (cow, _enc, _had_errors) = encoding.decode(bytes);
                return cow.into_owned();
            }
            String::from_utf8_lossy(bytes).into_owned()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn split_keeping_terminators(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if c == '\n' {
            lines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Locates the boundary in a `Content-Type` field body/comment and splits
/// `raw` into `(preamble, part_bytes, epilogue)`. §4.3 "Multipart body
/// parsing".
pub fn split_multipart<'a>(raw: &'a [u8], boundary: &str) -> (&'a [u8], Vec<&'a [u8]>, &'a [u8]) {
    let open = format!("--{}", boundary);
    let close = format!("--{}--", boundary);
    let open_b = open.as_bytes();
    let close_b = close.as_bytes();

    let first = find_subslice(raw, open_b);
    let (preamble, rest) = match first {
        Some(idx) => (&raw[..idx], &raw[idx..]),
        None => (raw, &raw[raw.len()..]),
    };

    let mut parts = Vec::new();
    let mut cursor = rest;
    let mut epilogue: &[u8] = &[];
    loop {
        // Skip the boundary line itself.
        let after_marker = if cursor.starts_with(close_b) {
            let after = &cursor[close_b.len()..];
            epilogue = skip_one_newline(after);
            break;
        } else if cursor.starts_with(open_b) {
            skip_one_newline(&cursor[open_b.len()..])
        } else {
            break;
        };
        match find_subslice(after_marker, open_b) {
            Some(idx) => {
                parts.push(trim_trailing_newline(&after_marker[..idx]));
                cursor = &after_marker[idx..];
            }
            None => {
                parts.push(after_marker);
                break;
            }
        }
    }
    (preamble, parts, epilogue)
}

fn skip_one_newline(input: &[u8]) -> &[u8] {
    if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") {
        &input[1..]
    } else {
        input
    }
}

fn trim_trailing_newline(input: &[u8]) -> &[u8] {
    if input.ends_with(b"\r\n") {
        &input[..input.len() - 2]
    } else if input.ends_with(b"\n") {
        &input[..input.len() - 1]
    } else {
        input
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delayed_materializes_to_lines() {
        let raw = b"line one\nline two\n";
        let mut body = Body::delayed(0, raw.len());
        body.materialize(raw).unwrap();
        match &body.variant {
            BodyVariant::Lines(lines) => assert_eq!(lines, &["line one\n", "line two\n"]),
            _ => panic!("expected Lines"),
        }
    }

    #[test]
    fn split_multipart_preamble_parts_epilogue() {
        let raw = b"preamble text\n--B\nPart: 1\n\nfirst\n--B\nPart: 2\n\nsecond\n--B--\nepilogue text";
        let (preamble, parts, epilogue) = split_multipart(raw, "B");
        assert_eq!(preamble, b"preamble text\n");
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with(b"first"));
        assert!(parts[1].ends_with(b"second"));
        assert_eq!(epilogue, b"epilogue text");
    }
}
