/*
 * mailbox - field module.
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

//! One header line: name, body, comment, attributes; folding/unfolding;
//! typed accessors. See §4.1 of the specification.

use crate::datetime::{parse_rfc822_date, timestamp_to_rfc822, UnixTimestamp};
use crate::error::{Error, ErrorKind, Result};
use indexmap::IndexMap;

const DEFAULT_WRAP_LENGTH: usize = 78;

/// Closed set of field names that carry structured, `;`-separated
/// attributes in their comment portion (§4.1).
const STRUCTURED_NAMES: &[&str] = &[
    "to",
    "cc",
    "bcc",
    "from",
    "date",
    "reply-to",
    "sender",
    "resent-date",
    "resent-from",
    "resent-sender",
    "resent-to",
    "resent-cc",
    "resent-bcc",
    "resent-message-id",
    "received",
    "references",
    "message-id",
    "in-reply-to",
    "content-length",
    "content-type",
    "delivered-to",
    "lines",
    "mime-version",
    "precedence",
    "status",
];

pub fn is_structured(name_lower: &str) -> bool {
    STRUCTURED_NAMES.contains(&name_lower)
}

/// Override list for canonical display casing; every other `-`-separated
/// token is title-cased.
fn canonical_token(token: &str) -> String {
    match token.to_ascii_lowercase().as_str() {
        "id" => "ID".to_string(),
        "mime" => "MIME".to_string(),
        _ => {
            let mut chars = token.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
            }
        }
    }
}

/// Derives the canonical display name (e.g. `message-id` -> `Message-ID`).
pub fn canonical_display_name(name_lower: &str) -> String {
    name_lower
        .split('-')
        .map(canonical_token)
        .collect::<Vec<_>>()
        .join("-")
}

/// Strips CFWS: balanced, possibly-nested `(...)` comments and runs of
/// whitespace are collapsed to a single space. Non-comment content is
/// preserved exactly, modulo whitespace collapsing.
pub fn strip_cfws(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut depth: usize = 0;
    let mut chars = input.chars().peekable();
    let mut last_was_space = false;
    while let Some(c) = chars.next() {
        match c {
            '(' if depth == 0 => {
                depth = 1;
            }
            '(' if depth > 0 => {
                depth += 1;
            }
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 && !last_was_space && !out.is_empty() {
                    out.push(' ');
                    last_was_space = true;
                }
            }
            '\\' if depth > 0 => {
                // escaped char inside a comment is swallowed too.
                chars.next();
            }
            _ if depth > 0 => {}
            c if c.is_whitespace() => {
                if !last_was_space && !out.is_empty() {
                    out.push(' ');
                }
                last_was_space = true;
            }
            c => {
                out.push(c);
                last_was_space = false;
            }
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub display_name: Option<String>,
    pub addr_spec: String,
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.display_name {
            Some(name) if !name.is_empty() => write!(f, "{} <{}>", name, self.addr_spec),
            _ => write!(f, "{}", self.addr_spec),
        }
    }
}

/// Splits a comma-separated list of addresses, respecting quoted strings
/// and angle-bracket/parenthesis nesting so that a `,` inside a display
/// name or a group does not split the list prematurely.
fn split_top_level(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth_paren = 0i32;
    let mut depth_angle = 0i32;
    let mut in_quotes = false;
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '\\' if in_quotes => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '(' if !in_quotes => {
                depth_paren += 1;
                current.push(c);
            }
            ')' if !in_quotes => {
                depth_paren -= 1;
                current.push(c);
            }
            '<' if !in_quotes => {
                depth_angle += 1;
                current.push(c);
            }
            '>' if !in_quotes => {
                depth_angle -= 1;
                current.push(c);
            }
            c if c == sep && !in_quotes && depth_paren == 0 && depth_angle == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_one_address(raw: &str) -> Option<Address> {
    let raw = strip_cfws(raw);
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(start) = raw.find('<') {
        if let Some(end) = raw.rfind('>') {
            if end > start {
                let display_name = raw[..start].trim().trim_matches('"').to_string();
                let addr_spec = raw[start + 1..end].trim().to_string();
                return Some(Address {
                    display_name: if display_name.is_empty() {
                        None
                    } else {
                        Some(display_name)
                    },
                    addr_spec,
                });
            }
        }
    }
    Some(Address {
        display_name: None,
        addr_spec: raw.to_string(),
    })
}

/// Parses a mailbox-list/address-list body into individual `Address`es.
/// Group syntax (`group: a@b, c@d;`) contributes its members, dropping the
/// group display name.
pub fn parse_addresses(body: &str) -> Vec<Address> {
    let mut out = Vec::new();
    for entry in split_top_level(body, ',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if let Some(colon) = entry.find(':') {
            // RFC 5322 group syntax: "Group Name: member, member;"
            let members = entry[colon + 1..].trim_end_matches(';');
            for member in split_top_level(members, ',') {
                if let Some(addr) = parse_one_address(&member) {
                    out.push(addr);
                }
            }
            continue;
        }
        if let Some(addr) = parse_one_address(entry) {
            out.push(addr);
        }
    }
    out
}

/// Parses `key="value"` / `key=value` attribute pairs out of a structured
/// field's comment portion (the part after the first top-level `;`).
fn parse_attributes(comment: &str) -> IndexMap<String, String> {
    let mut attrs = IndexMap::new();
    for part in split_top_level(comment, ';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some(eq) = part.find('=') {
            let key = part[..eq].trim().to_ascii_lowercase();
            let mut value = part[eq + 1..].trim().to_string();
            if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
                value = value[1..value.len() - 1].to_string();
            }
            if !key.is_empty() {
                attrs.insert(key, value);
            }
        }
    }
    attrs
}

#[derive(Debug, Clone)]
pub struct Field {
    name_lower: String,
    display_name: String,
    body: String,
    comment: Option<String>,
    attributes: IndexMap<String, String>,
    wrap_length: usize,
}

#[derive(Debug)]
pub enum FieldError {
    MissingColon,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "header line has no ':' separator")
    }
}

impl Field {
    /// Constructs a field directly; rejects a `:` or control bytes in
    /// `name` and strips a trailing CRLF from `body` (§4.1).
    pub fn new(name: &str, body: &str, comment: Option<&str>) -> Result<Self> {
        if name.contains(':') || name.bytes().any(|b| b.is_ascii_control()) {
            return Err(Error::new(
                ErrorKind::ParseError,
                format!("invalid header field name {:?}", name),
            ));
        }
        let name_lower = name.to_ascii_lowercase();
        let body = body.trim_end_matches(['\r', '\n']).to_string();
        let comment = comment.map(|c| c.to_string());
        let attributes = comment
            .as_deref()
            .map(parse_attributes)
            .unwrap_or_default();
        Ok(Field {
            display_name: canonical_display_name(&name_lower),
            name_lower,
            body,
            comment,
            attributes,
            wrap_length: DEFAULT_WRAP_LENGTH,
        })
    }

    /// Parses one already-unfolded header line (`Name: body`).
    pub fn parse_line(line: &str) -> std::result::Result<Self, FieldError> {
        let colon = line.find(':').ok_or(FieldError::MissingColon)?;
        let name = line[..colon].trim();
        let rest = line[colon + 1..].trim_start();
        let name_lower = name.to_ascii_lowercase();
        let (body, comment) = if is_structured(&name_lower) {
            match split_semicolon_outside_quotes(rest) {
                Some((b, c)) => (b, Some(c)),
                None => (rest.to_string(), None),
            }
        } else {
            (rest.to_string(), None)
        };
        let body = body.trim_end_matches(['\r', '\n']).to_string();
        let attributes = comment
            .as_deref()
            .map(parse_attributes)
            .unwrap_or_default();
        Ok(Field {
            display_name: canonical_display_name(&name_lower),
            name_lower,
            body,
            comment,
            attributes,
            wrap_length: DEFAULT_WRAP_LENGTH,
        })
    }

    pub fn name(&self) -> &str {
        &self.name_lower
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(&key.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn attribute_set(&mut self, key: &str, value: &str) {
        self.attributes
            .insert(key.to_ascii_lowercase(), value.to_string());
    }

    pub fn set_wrap_length(&mut self, wrap: usize) {
        self.wrap_length = wrap;
    }

    pub fn to_int(&self) -> Result<i64> {
        strip_cfws(&self.body)
            .trim()
            .parse::<i64>()
            .map_err(|e| Error::new(ErrorKind::ParseError, e.to_string()))
    }

    pub fn to_date(&self) -> Result<UnixTimestamp> {
        parse_rfc822_date(&strip_cfws(&self.body))
            .ok_or_else(|| Error::new(ErrorKind::ParseError, "unparsable date field"))
    }

    pub fn addresses(&self) -> Vec<Address> {
        parse_addresses(&self.body)
    }

    /// Folds the field into wire-format lines; structured fields fold on
    /// `; ` and `, ` boundaries at-or-before `wrap`, continuation lines
    /// prefixed with a single space.
    pub fn to_string(&self, wrap: Option<usize>) -> Vec<String> {
        let wrap = wrap.unwrap_or(self.wrap_length).max(20);
        let mut full_body = self.body.clone();
        if let Some(comment) = &self.comment {
            full_body.push_str("; ");
            full_body.push_str(comment);
        }
        let header = format!("{}: {}", self.display_name, full_body);
        if !is_structured(&self.name_lower) || header.len() <= wrap {
            return vec![header];
        }
        fold_line(&header, wrap)
    }
}

/// Splits `rest` into (body, comment) at the first top-level `;`.
fn split_semicolon_outside_quotes(rest: &str) -> Option<(String, String)> {
    let mut depth = 0i32;
    let mut in_quotes = false;
    let bytes: Vec<char> = rest.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => depth -= 1,
            ';' if !in_quotes && depth == 0 => {
                let body: String = bytes[..i].iter().collect();
                let comment: String = bytes[i + 1..].iter().collect();
                return Some((body.trim_end().to_string(), comment.trim().to_string()));
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Folds `line` at `; ` or `, ` boundaries at-or-before `wrap`; falls back
/// to a hard break on whitespace if no such boundary exists.
pub fn fold_line(line: &str, wrap: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut remaining = line;
    loop {
        if remaining.len() <= wrap {
            lines.push(remaining.to_string());
            break;
        }
        let window = &remaining[..wrap.min(remaining.len())];
        let split_at = window
            .rfind("; ")
            .map(|i| i + 2)
            .or_else(|| window.rfind(", ").map(|i| i + 2))
            .or_else(|| window.rfind(' ').map(|i| i + 1));
        match split_at {
            Some(idx) if idx > 0 => {
                lines.push(remaining[..idx].trim_end().to_string());
                remaining = remaining[idx..].trim_start();
            }
            _ => {
                lines.push(remaining.to_string());
                break;
            }
        }
    }
    for line in lines.iter_mut().skip(1) {
        *line = format!(" {}", line);
    }
    lines
}

/// Unfolds a run of physical lines (continuations begin with whitespace)
/// back into one logical line, per the folding rule in §3.
pub fn unfold(lines: &[&str]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            out.push_str(line.trim_end());
        } else {
            out.push(' ');
            out.push_str(line.trim());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_splits_structured_comment() {
        let f = Field::parse_line("Content-Type: text/plain; charset=\"utf-8\"").unwrap();
        assert_eq!(f.name(), "content-type");
        assert_eq!(f.body(), "text/plain");
        assert_eq!(f.attribute("charset"), Some("utf-8"));
    }

    #[test]
    fn parse_line_unstructured_keeps_semicolons_in_body() {
        let f = Field::parse_line("Subject: a; b; c").unwrap();
        assert_eq!(f.body(), "a; b; c");
        assert_eq!(f.comment(), None);
    }

    #[test]
    fn missing_colon_is_an_error() {
        assert!(matches!(Field::parse_line("no colon here"), Err(FieldError::MissingColon)));
    }

    #[test]
    fn canonical_casing_uses_override_list() {
        assert_eq!(canonical_display_name("message-id"), "Message-ID");
        assert_eq!(canonical_display_name("mime-version"), "MIME-Version");
        assert_eq!(canonical_display_name("content-transfer-encoding"), "Content-Transfer-Encoding");
    }

    #[test]
    fn cfws_stripping_preserves_non_comment_content() {
        assert_eq!(strip_cfws("foo (a (nested) comment)   bar"), "foo bar");
        assert_eq!(strip_cfws("Keith Moore <moore@cs.utk.edu>"), "Keith Moore <moore@cs.utk.edu>");
    }

    #[test]
    fn fold_unfold_round_trip() {
        for wrap in [20usize, 40, 78] {
            let line = "To: a@example.com, b@example.com, c@example.com, d@example.com";
            let folded = fold_line(line, wrap);
            let refs: Vec<&str> = folded.iter().map(|s| s.as_str()).collect();
            assert_eq!(unfold(&refs), line);
        }
    }

    #[test]
    fn addresses_parse_display_name_and_groups() {
        let addrs = parse_addresses("\"Doe, Jane\" <jane@example.com>, undisclosed: ;, bob@example.com");
        assert_eq!(addrs[0].addr_spec, "jane@example.com");
        assert_eq!(addrs[0].display_name.as_deref(), Some("Doe, Jane"));
        assert_eq!(addrs.last().unwrap().addr_spec, "bob@example.com");
    }

    #[test]
    fn to_int_and_to_date() {
        let f = Field::new("Content-Length", "1024", None).unwrap();
        assert_eq!(f.to_int().unwrap(), 1024);
        let f = Field::new("Date", "Thu, 01 Jan 1970 00:00:00 +0000", None).unwrap();
        assert_eq!(f.to_date().unwrap(), 0);
    }

    #[test]
    fn new_rejects_colon_in_name() {
        assert!(Field::new("Bad:Name", "x", None).is_err());
    }
}
