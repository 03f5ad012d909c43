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

use std::io;

use thiserror::Error;

/// The flat error taxonomy shared by the store layer and its backends.
///
/// Each variant has a stable integer code (see `Error::code()`), which is
/// what crosses into logs and diagnostics. Some codes are overloaded between
/// failures and benign outcomes; notably `RefCount` from a backend release
/// means "still in use", which the registry turns into
/// `DeleteOutcome::StillReferenced`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Non-specific error")]
    Error,
    #[error("No memory available")]
    NoMemory,
    #[error("Already initialized")]
    AlreadyInitialized,
    #[error("Not initialized")]
    NotInitialized,
    #[error("Corrupted store")]
    Corrupted,
    #[error("Invalid parameter")]
    InvalidParameter,
    #[error("No such file or directory")]
    NoDirectory,
    #[error("Database initialization failed")]
    DatabaseInit,
    #[error("database operation failed")]
    DatabaseOps,
    #[error("storage backend registration failed")]
    BackendRegister,
    #[error("storage backend initialization failed")]
    BackendInit,
    #[error("context creation failed")]
    ContextCreationFailed,
    #[error("invalid namespace")]
    InvalidNamespace,
    #[error("not found")]
    NotFound,
    #[error("still referenced")]
    RefCount,
    #[error("already exists")]
    Exists,
    #[error("operation not implemented")]
    NotImplemented,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub const SUCCESS: u32 = 0;

impl Error {
    /// Returns the stable integer code of this error.
    ///
    /// Wrapped I/O and configuration errors report the codes of the store
    /// conditions they stand for.
    pub fn code(&self) -> u32 {
        match *self {
            Error::Error => 1,
            Error::NoMemory => 2,
            Error::AlreadyInitialized => 3,
            Error::NotInitialized => 4,
            Error::Corrupted => 5,
            Error::InvalidParameter => 6,
            Error::NoDirectory => 7,
            Error::DatabaseInit => 8,
            Error::DatabaseOps => 9,
            Error::BackendRegister => 10,
            Error::BackendInit => 11,
            Error::ContextCreationFailed => 12,
            Error::InvalidNamespace => 13,
            Error::NotFound => 14,
            Error::RefCount => 15,
            Error::Exists => 16,
            Error::NotImplemented => 17,
            Error::Io(ref e) if io::ErrorKind::NotFound == e.kind() => 7,
            Error::Io(_) => 1,
            Error::Toml(_) => 11,
        }
    }

    /// Whether this error carries a specific meaning that the dispatch layer
    /// passes through to callers rather than collapsing into `Error::Error`.
    pub fn is_specific(&self) -> bool {
        matches!(
            *self,
            Error::NoMemory
                | Error::InvalidParameter
                | Error::NotFound
                | Error::RefCount
                | Error::Exists
                | Error::NotImplemented
        )
    }
}

/// Returns the stable description of a store error code.
pub fn store_errstr(code: u32) -> &'static str {
    match code {
        SUCCESS => "Success",
        1 => "Non-specific error",
        2 => "No memory available",
        3 => "Already initialized",
        4 => "Not initialized",
        5 => "Corrupted store",
        6 => "Invalid parameter",
        7 => "No such file or directory",
        8 => "Database initialization failed",
        9 => "database operation failed",
        10 => "storage backend registration failed",
        11 => "storage backend initialization failed",
        12 => "context creation failed",
        13 => "invalid namespace",
        14 => "not found",
        15 => "still referenced",
        16 => "already exists",
        17 => "operation not implemented",
        _ => "Unknown error",
    }
}
