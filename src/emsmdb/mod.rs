//-
// Copyright (c) 2026, Jason Lingle
//
// This file is part of Mapistore.
//
// Mapistore is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mapistore is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mapistore. If not, see <http://www.gnu.org/licenses/>.

//! The protocol operation surface.
//!
//! A `RopProcessor` executes operations for one client session. It resolves
//! the `u32` handles the client uses to the objects they stand for, routes
//! store operations through the shared `ContextRegistry`, and runs the table
//! operations on the session's `TableObject`s.
//!
//! Like the store layer, this is split into several submodules for
//! manageability, but is best thought of as one single module.

macro_rules! map_error {
    ($this:expr) => {{
        let log_prefix = &$this.log_prefix;
        move |e| catch_all_error_handling(log_prefix, e)
    }};

    ($this:expr, $($($kind:ident)|+ => $status:ident,)+) => {{
        let log_prefix = &$this.log_prefix;
        move |e| match e {
            $($(Error::$kind)|* => {
                log::debug!("{} {}", log_prefix, e);
                RopReply::error(MapiStatus::$status)
            })*
            e => catch_all_error_handling(log_prefix, e),
        }
    }};
}

// Resolves a handle to an object of the given variant, which must be
// `Copy`.
macro_rules! object {
    ($this:expr, $handle:expr, $variant:ident) => {
        match $this.handles.get($handle) {
            Some(&Object::$variant(object)) => Ok(object),
            _ => Err(RopReply::error(MapiStatus::InvalidObject)),
        }
    };
}

mod commands;
mod defs;
mod folders;
mod handles;
mod messages;
mod rows;
mod session;
mod table;

pub use self::defs::{MapiStatus, ReplyBody, RopProcessor, RopReply, RopRequest};
