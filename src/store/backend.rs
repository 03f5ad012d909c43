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

//! The capability interface every storage backend provides.
//!
//! A `Backend` is registered under a URI namespace and materialises a
//! `StoreContext` for each context URI routed to it. All object access goes
//! through the context, using handles the context itself issued; nothing
//! outside the backend ever looks inside a handle.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;

use super::model::*;
use crate::support::error::Error;
use crate::support::system_config::{BackendKind, StoreConfig};

pub trait Backend: Send + Sync {
    /// The namespace this backend serves, e.g. `"mstore://"`.
    fn namespace(&self) -> &str;

    /// Creates the context for `payload` (the part of the URI after the
    /// namespace), whose root folder is `root`.
    fn create_context(
        &self,
        payload: &str,
        root: FolderId,
    ) -> Result<Box<dyn StoreContext>, Error>;
}

/// A live connection to one backend store.
///
/// Methods take `&mut self`; the registry serialises calls on each context.
/// Calls may block for as long as the backend needs.
pub trait StoreContext: Send {
    /// The handle of the folder the context was created for.
    fn root_folder(&self) -> FolderHandle;

    /// Called once when the context is about to be removed from the registry.
    ///
    /// Returning `Error::RefCount` keeps the context alive.
    fn release(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Called when the protocol layer drops its last use of `object`.
    fn release_object(&mut self, _object: ObjectHandle) {}

    fn open_folder(
        &mut self,
        parent: FolderHandle,
        fid: FolderId,
    ) -> Result<FolderHandle, Error>;
    fn create_folder(
        &mut self,
        parent: FolderHandle,
        fid: FolderId,
        properties: &[PropertyValue],
    ) -> Result<FolderHandle, Error>;
    /// Deletes the folder `fid` beneath `parent`. Fails if the folder still
    /// has child folders.
    fn delete_folder(
        &mut self,
        parent: FolderHandle,
        fid: FolderId,
    ) -> Result<(), Error>;
    fn get_child_fids(
        &mut self,
        folder: FolderHandle,
    ) -> Result<Vec<FolderId>, Error>;
    fn get_child_count(
        &mut self,
        folder: FolderHandle,
        kind: TableKind,
    ) -> Result<u32, Error>;
    /// Opens a table of `kind` on `folder`, returning its handle and row
    /// count.
    fn open_table(
        &mut self,
        folder: FolderHandle,
        kind: TableKind,
    ) -> Result<(TableHandle, u32), Error>;

    fn open_message(
        &mut self,
        folder: FolderHandle,
        mid: MessageId,
    ) -> Result<MessageHandle, Error>;
    fn create_message(
        &mut self,
        folder: FolderHandle,
        mid: MessageId,
        associated: bool,
    ) -> Result<MessageHandle, Error>;
    fn delete_message(
        &mut self,
        folder: FolderHandle,
        mid: MessageId,
        mode: MessageDeleteMode,
    ) -> Result<(), Error>;
    fn modify_recipients(
        &mut self,
        message: MessageHandle,
        rows: &[RecipientRow],
    ) -> Result<(), Error>;
    fn save_message(&mut self, message: MessageHandle) -> Result<(), Error>;
    fn submit_message(
        &mut self,
        message: MessageHandle,
        flags: SubmitFlags,
    ) -> Result<(), Error>;

    fn get_attachment_table(
        &mut self,
        message: MessageHandle,
    ) -> Result<(TableHandle, u32), Error>;
    fn open_attachment(
        &mut self,
        message: MessageHandle,
        attach_num: u32,
    ) -> Result<AttachmentHandle, Error>;
    /// Creates a new attachment, returning its handle and attachment number.
    fn create_attachment(
        &mut self,
        message: MessageHandle,
    ) -> Result<(AttachmentHandle, u32), Error>;
    fn open_embedded_message(
        &mut self,
        attachment: AttachmentHandle,
    ) -> Result<(MessageHandle, MessageId), Error>;

    fn set_columns(
        &mut self,
        table: TableHandle,
        columns: &[PropTag],
    ) -> Result<(), Error>;
    /// Sets or (with `None`) clears the table's restriction.
    fn set_restrictions(
        &mut self,
        table: TableHandle,
        restriction: Option<&Restriction>,
    ) -> Result<TableStatus, Error>;
    fn set_sort_order(
        &mut self,
        table: TableHandle,
        order: &SortOrderSet,
    ) -> Result<TableStatus, Error>;
    /// Fetches the current columns of one row.
    ///
    /// On success, the result has exactly one entry per column, in column
    /// order. A property that cannot be resolved is reported in its entry;
    /// an error for the whole call means the row itself is unavailable.
    fn get_row(
        &mut self,
        table: TableHandle,
        query: QueryType,
        row: u32,
    ) -> Result<Vec<PropertyData>, Error>;

    fn get_available_properties(
        &mut self,
        object: ObjectHandle,
    ) -> Result<Vec<PropTag>, Error>;
    fn get_properties(
        &mut self,
        object: ObjectHandle,
        tags: &[PropTag],
    ) -> Result<Vec<PropertyData>, Error>;
    fn set_properties(
        &mut self,
        object: ObjectHandle,
        values: &[PropertyValue],
    ) -> Result<(), Error>;
}

/// Maps URI namespaces to the backends that serve them.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry described by `config`.
    pub fn from_config(config: &StoreConfig) -> Result<Self, Error> {
        let mut this = Self::new();
        for backend in &config.backends {
            let instance: Arc<dyn Backend> = match backend.kind {
                BackendKind::Memory => Arc::new(
                    super::memory::MemoryBackend::new(&backend.namespace),
                ),
            };
            this.register(instance)?;
        }

        Ok(this)
    }

    pub fn register(&mut self, backend: Arc<dyn Backend>) -> Result<(), Error> {
        let namespace = backend.namespace().to_owned();
        if !is_valid_namespace(&namespace) {
            return Err(Error::InvalidNamespace);
        }

        if self.backends.contains_key(&namespace) {
            return Err(Error::BackendRegister);
        }

        info!("Registered storage backend for {}", namespace);
        self.backends.insert(namespace, backend);
        Ok(())
    }

    pub fn get(&self, namespace: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.get(namespace)
    }

    /// All registered namespaces, sorted.
    pub fn namespaces(&self) -> Vec<&str> {
        let mut namespaces =
            self.backends.keys().map(|s| s as &str).collect::<Vec<_>>();
        namespaces.sort_unstable();
        namespaces
    }
}

fn is_valid_namespace(namespace: &str) -> bool {
    namespace.len() > 3
        && namespace.ends_with("://")
        && namespace[..namespace.len() - 3]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || '-' == c || '+' == c || '.' == c)
}
