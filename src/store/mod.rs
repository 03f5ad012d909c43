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

//! The storage abstraction layer.
//!
//! Storage is provided by backends, each registered under a URI namespace
//! such as `mstore://`. A _context_ is a live binding between one URI and
//! the backend that serves it; the `ContextRegistry` owns all contexts and
//! hands out the small integer ids used to refer to them. All folder,
//! message, table and property access goes through the registry's dispatch
//! methods, which route each call to the right backend context.

pub mod backend;
pub mod dispatch;
#[cfg(test)]
pub mod faulty;
pub mod memory;
pub mod model;
pub mod registry;
