/*
 * mailbox - error module.
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

//! Crate-wide typed error value. See §7 of the specification for the
//! taxonomy this mirrors.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Mirrors the error taxonomy table: one variant per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FolderMissing,
    FolderTypeUnknown,
    AccessDenied,
    LockTimeout,
    LockStale,
    ParseError,
    IoError,
    CoerceError,
    AlreadyOpen,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ErrorKind::FolderMissing => "folder missing",
            ErrorKind::FolderTypeUnknown => "folder type unknown",
            ErrorKind::AccessDenied => "access denied",
            ErrorKind::LockTimeout => "lock timeout",
            ErrorKind::LockStale => "lock stale",
            ErrorKind::ParseError => "parse error",
            ErrorKind::IoError => "i/o error",
            ErrorKind::CoerceError => "coerce error",
            ErrorKind::AlreadyOpen => "already open",
            ErrorKind::Other => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new<M: Into<String>>(kind: ErrorKind, message: M) -> Self {
        Error {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<M, E>(kind: ErrorKind, message: M, source: E) -> Self
    where
        M: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Error {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|b| b.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(ErrorKind::IoError, err.to_string(), err)
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::with_source(ErrorKind::ParseError, err.to_string(), err)
    }
}
