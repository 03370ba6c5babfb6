/*
 * mailbox
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

//! Folder access library: `mbox`/`MH`/`maildir` backends over a lazily
//! parsed RFC 822/2822/5322 message model, pluggable file locking, and
//! cross-folder thread reconstruction.
//!
//! The object model follows the source this crate is derived from: a
//! `Head` of `Field`s, a `Body` that may stay `Delayed` until read, a
//! `Message` binding the two together with folder-local metadata, and a
//! `Folder` trait that concrete backends (`folder::mbox`, `folder::mh`,
//! `folder::maildir`) implement. `Manager` owns the set of open folders
//! and drives cross-folder copy/move; `thread` reconstructs conversation
//! trees from `Message-ID`/`In-Reply-To`/`References`.

pub mod body;
pub mod codec;
pub mod conf;
pub mod datetime;
pub mod error;
pub mod field;
pub mod folder;
pub mod head;
pub mod locker;
pub mod logging;
pub mod manager;
pub mod message;
pub mod parser;
pub mod shellexpand;
pub mod thread;
pub mod uri;

pub use error::{Error, ErrorKind, Result};
pub use folder::Folder;
pub use head::Head;
pub use message::Message;
