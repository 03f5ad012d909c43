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

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// The system-wide configuration for Mapistore.
///
/// This is stored in a file named `mapistore.toml` under the Mapistore system
/// root, which is typically `/usr/local/etc/mapistore` or `/etc/mapistore`.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Configuration of the storage abstraction layer.
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// The backends to register, one per URI namespace.
    ///
    /// A context URI such as `mstore://tmp/maildir` is routed to the backend
    /// whose `namespace` is `mstore://`.
    pub backends: Vec<BackendConfig>,

    /// If set, the maximum number of contexts that may be live at once.
    ///
    /// Attempts to add a context beyond this fail with "context creation
    /// failed".
    pub max_contexts: Option<u32>,

    /// Users whose indexing records are created when the registry is built,
    /// rather than at their first logon.
    pub indexing_users: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BackendConfig {
    /// The URI namespace, including the `://` separator.
    pub namespace: String,
    /// Which backend implementation serves the namespace.
    pub kind: BackendKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// A volatile, process-local store. Everything is lost when the last
    /// context on a payload is released.
    Memory,
}

impl SystemConfig {
    /// Loads `mapistore.toml` from `root`.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let data = fs::read(root.join("mapistore.toml"))?;
        Ok(toml::from_slice(&data)?)
    }
}
