/*
 * mailbox - parser module.
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

//! Byte-accurate stream reader: detects message separators, reads
//! headers, seeks, and reports `(begin,end)` offsets per header and
//! body so that unmodified messages can be copied byte-exact later. §4.4.

use crate::error::{Error, ErrorKind, Result};
use crate::field::{self, Field};

/// Streaming cursor over an in-memory buffer (the whole folder file, for
/// Mbox; a single message file, for MH/Maildir). Tracking is purely by
/// byte offset so that `Head`/`Body` location records line up with the
/// original bytes for byte-exact unmodified-message copying.
pub struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
    separators: Vec<Vec<u8>>,
    stopped: bool,
}

impl<'a> Parser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Parser {
            data,
            pos: 0,
            separators: Vec::new(),
            stopped: false,
        }
    }

    pub fn push_separator(&mut self, pattern: &[u8]) {
        self.separators.push(pattern.to_vec());
    }

    pub fn pop_separator(&mut self) -> Option<Vec<u8>> {
        self.separators.pop()
    }

    fn current_separator(&self) -> Option<&[u8]> {
        self.separators.last().map(|v| v.as_slice())
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, offset: usize) {
        self.pos = offset.min(self.data.len());
    }

    pub fn restart(&mut self) {
        self.pos = 0;
        self.stopped = false;
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn fold_header_line(&self, line: &str, wrap: usize) -> Vec<String> {
        field::fold_line(line, wrap)
    }

    /// Finds the next line in `self.data[from..]` beginning with the
    /// active separator pattern, returning its start offset.
    fn find_next_separator(&self, from: usize) -> Option<usize> {
        let pattern = self.current_separator()?;
        let haystack = &self.data[from..];
        let mut search_start = 0usize;
        loop {
            let idx = find_subslice(&haystack[search_start..], pattern)?;
            let abs = search_start + idx;
            let at_line_start = abs == 0 || haystack[abs - 1] == b'\n';
            if at_line_start {
                return Some(from + abs);
            }
            search_start = abs + 1;
            if search_start >= haystack.len() {
                return None;
            }
        }
    }

    /// If the parser is positioned at the start of a line matching the
    /// active separator, consumes through end-of-line and returns the new
    /// position. Used by folder backends (e.g. Mbox) to step over the
    /// `From `-style envelope line before reading the header proper.
    pub fn skip_separator_line(&mut self) -> Option<usize> {
        let pattern = self.current_separator()?;
        if !self.data[self.pos..].starts_with(pattern) {
            return None;
        }
        let rest = &self.data[self.pos..];
        let line_end = rest.iter().position(|&b| b == b'\n').map(|i| i + 1).unwrap_or(rest.len());
        self.pos += line_end;
        Some(self.pos)
    }

    /// Reads header lines until a blank line (or EOF), unfolding
    /// continuations, and returns `(begin, end, fields)` where `end` is
    /// the offset immediately after the blank-line terminator (or EOF).
    pub fn read_header(&mut self) -> Result<(usize, usize, Vec<Field>)> {
        if self.stopped {
            return Err(Error::new(ErrorKind::IoError, "parser stopped"));
        }
        let begin = self.pos;
        let rest = &self.data[self.pos..];
        let header_end_rel = find_blank_line(rest).unwrap_or(rest.len());
        let raw_header = &rest[..header_end_rel];
        let after = header_end_rel + blank_line_len(&rest[header_end_rel..]);
        self.pos = begin + after;

        let text = String::from_utf8_lossy(raw_header);
        let fields = parse_raw_header(&text)?;
        Ok((begin, begin + header_end_rel, fields))
    }

    /// Reads body bytes until the next active separator (exclusive) or
    /// EOF, returning `(begin, end, lines)`.
    pub fn read_body_until_separator(&mut self) -> Result<(usize, usize, Vec<String>)> {
        let begin = self.pos;
        let end = match self.find_next_separator(self.pos) {
            Some(sep_start) => sep_start,
            None => self.data.len(),
        };
        let body_bytes = &self.data[begin..end];
        self.pos = end;
        let text = String::from_utf8_lossy(body_bytes);
        Ok((begin, end, split_lines(&text)))
    }

    pub fn has_more(&self) -> bool {
        !self.stopped && self.pos < self.data.len()
    }
}

/// Splits unfold-ready raw header bytes into logical lines (joining fold
/// continuations) and parses each into a `Field`.
fn parse_raw_header(text: &str) -> Result<Vec<Field>> {
    let mut logical_lines: Vec<Vec<&str>> = Vec::new();
    for line in text.split("\n") {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let is_continuation = line.starts_with(' ') || line.starts_with('\t');
        if is_continuation && !logical_lines.is_empty() {
            logical_lines.last_mut().unwrap().push(line);
        } else {
            logical_lines.push(vec![line]);
        }
    }
    let mut fields = Vec::with_capacity(logical_lines.len());
    for group in logical_lines {
        let unfolded = field::unfold(&group);
        match Field::parse_line(&unfolded) {
            Ok(field) => fields.push(field),
            Err(_) => {
                // §7 ParseError policy: caller decides whether to use
                // `fix_header_errors`; here we synthesize a best-effort
                // field so headers never silently vanish.
                fields.push(Field::new("x-unparsed", &unfolded, None)?);
            }
        }
    }
    Ok(fields)
}

/// Finds the offset of the header/body-separating blank line (`\n\n`,
/// `\r\n\r\n`, or a lone trailing `\n`/`\r\n` at EOF).
fn find_blank_line(data: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i + 1 < data.len() {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i + 1);
        }
        if data[i] == b'\r'
            && data.get(i + 1) == Some(&b'\n')
            && data.get(i + 2) == Some(&b'\r')
            && data.get(i + 3) == Some(&b'\n')
        {
            return Some(i + 2);
        }
        i += 1;
    }
    None
}

fn blank_line_len(data: &[u8]) -> usize {
    if data.starts_with(b"\r\n\r\n") {
        4
    } else if data.starts_with(b"\n\n") {
        2
    } else {
        0
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Splits `text` into lines, each element keeping its terminator, as the
/// `Body::Lines` variant requires.
pub fn split_lines(text: &str) -> Vec<String> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_header_stops_at_blank_line() {
        let data = b"Subject: hi\r\nFrom: a@b\r\n\r\nbody here";
        let mut p = Parser::new(data);
        let (begin, end, fields) = p.read_header().unwrap();
        assert_eq!(begin, 0);
        assert_eq!(&data[begin..end], b"Subject: hi\r\nFrom: a@b");
        assert_eq!(fields.len(), 2);
        assert_eq!(p.tell(), end + 4);
    }

    #[test]
    fn unfolds_continuation_lines() {
        let data = b"Subject: hi\r\n there\r\n\r\nbody";
        let mut p = Parser::new(data);
        let (_, _, fields) = p.read_header().unwrap();
        assert_eq!(fields[0].body(), "hi there");
    }

    #[test]
    fn mbox_separator_only_matches_line_start() {
        let data = b"From alice Mon Jan  1\r\nSubject: x\r\n\r\nbody with From inside\r\nFrom bob Mon Jan  2\r\n";
        let first_line_len = find_subslice(data, b"Subject").unwrap();
        let mut p = Parser::new(data);
        p.push_separator(b"From ");
        p.skip_separator_line();
        let (begin, _, _) = p.read_header().unwrap();
        assert_eq!(begin, first_line_len); // after the first "From " line + CRLF
        let (_, end, _) = p.read_body_until_separator().unwrap();
        let second_from = find_subslice(data, b"\r\nFrom bob").unwrap() + 2;
        assert_eq!(end, second_from);
    }

    #[test]
    fn offsets_survive_seek_and_restart() {
        let data = b"Subject: x\r\n\r\nbody";
        let mut p = Parser::new(data);
        let (_, end, _) = p.read_header().unwrap();
        p.seek(0);
        assert_eq!(p.tell(), 0);
        let (_, end2, _) = p.read_header().unwrap();
        assert_eq!(end, end2);
        p.restart();
        assert_eq!(p.tell(), 0);
        assert!(!p.is_stopped());
    }
}
