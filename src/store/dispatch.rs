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

//! Context-id-keyed forwarding into backend contexts.
//!
//! Every call resolves the context id first (`InvalidParameter` if the
//! context is not live), then invokes the backend with only that context's
//! lock held. Backend failures are reported as the generic `Error::Error`
//! unless they already carry a specific code.

use log::warn;

use super::backend::StoreContext;
use super::model::*;
use super::registry::ContextRegistry;
use crate::support::error::Error;

fn dispatch_error(e: Error) -> Error {
    if e.is_specific() {
        e
    } else {
        warn!("Backend failure reported as generic error: {}", e);
        Error::Error
    }
}

impl ContextRegistry {
    /// Runs `f` against the backend context of `id`.
    ///
    /// Errors from `f` are returned unchanged.
    pub fn with_context<T>(
        &self,
        id: ContextId,
        f: impl FnOnce(&mut dyn StoreContext) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let binding = self.binding(id)?;
        let mut backend = binding.backend.lock().unwrap();
        f(&mut **backend)
    }

    fn forward<T>(
        &self,
        id: ContextId,
        f: impl FnOnce(&mut dyn StoreContext) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let binding = self.binding(id)?;
        let mut backend = binding.backend.lock().unwrap();
        f(&mut **backend).map_err(dispatch_error)
    }

    pub fn open_folder(
        &self,
        id: ContextId,
        parent: FolderHandle,
        fid: FolderId,
    ) -> Result<FolderHandle, Error> {
        self.forward(id, |ctx| ctx.open_folder(parent, fid))
    }

    /// Creates a folder. The backend's error is always passed through.
    pub fn create_folder(
        &self,
        id: ContextId,
        parent: FolderHandle,
        fid: FolderId,
        properties: &[PropertyValue],
    ) -> Result<FolderHandle, Error> {
        self.with_context(id, |ctx| ctx.create_folder(parent, fid, properties))
    }

    /// Deletes the folder `fid` beneath `parent`.
    ///
    /// If `DEL_FOLDERS` is set, the folder's subtree is deleted first,
    /// depth-first. The first child that cannot be enumerated or deleted
    /// aborts the whole operation with `NotFound`, leaving its remaining
    /// siblings and the folder itself in place.
    pub fn delete_folder(
        &self,
        id: ContextId,
        parent: FolderHandle,
        fid: FolderId,
        flags: FolderDeleteFlags,
    ) -> Result<(), Error> {
        self.forward(id, |ctx| {
            if flags.contains(FolderDeleteFlags::DEL_FOLDERS) {
                delete_subtree(ctx, parent, fid)?;
            }

            ctx.delete_folder(parent, fid)
        })
    }

    /// Counts the children of `kind` in `folder`. The backend's error is
    /// always passed through.
    pub fn get_child_count(
        &self,
        id: ContextId,
        folder: FolderHandle,
        kind: TableKind,
    ) -> Result<u32, Error> {
        self.with_context(id, |ctx| ctx.get_child_count(folder, kind))
    }

    pub fn open_table(
        &self,
        id: ContextId,
        folder: FolderHandle,
        kind: TableKind,
    ) -> Result<(TableHandle, u32), Error> {
        self.forward(id, |ctx| ctx.open_table(folder, kind))
    }

    pub fn open_message(
        &self,
        id: ContextId,
        folder: FolderHandle,
        mid: MessageId,
    ) -> Result<MessageHandle, Error> {
        self.forward(id, |ctx| ctx.open_message(folder, mid))
    }

    pub fn create_message(
        &self,
        id: ContextId,
        folder: FolderHandle,
        mid: MessageId,
        associated: bool,
    ) -> Result<MessageHandle, Error> {
        self.forward(id, |ctx| ctx.create_message(folder, mid, associated))
    }

    pub fn delete_message(
        &self,
        id: ContextId,
        folder: FolderHandle,
        mid: MessageId,
        mode: MessageDeleteMode,
    ) -> Result<(), Error> {
        self.forward(id, |ctx| ctx.delete_message(folder, mid, mode))
    }

    pub fn modify_recipients(
        &self,
        id: ContextId,
        message: MessageHandle,
        rows: &[RecipientRow],
    ) -> Result<(), Error> {
        self.forward(id, |ctx| ctx.modify_recipients(message, rows))
    }

    pub fn save_message(
        &self,
        id: ContextId,
        message: MessageHandle,
    ) -> Result<(), Error> {
        self.forward(id, |ctx| ctx.save_message(message))
    }

    pub fn submit_message(
        &self,
        id: ContextId,
        message: MessageHandle,
        flags: SubmitFlags,
    ) -> Result<(), Error> {
        self.forward(id, |ctx| ctx.submit_message(message, flags))
    }

    pub fn get_attachment_table(
        &self,
        id: ContextId,
        message: MessageHandle,
    ) -> Result<(TableHandle, u32), Error> {
        self.forward(id, |ctx| ctx.get_attachment_table(message))
    }

    pub fn open_attachment(
        &self,
        id: ContextId,
        message: MessageHandle,
        attach_num: u32,
    ) -> Result<AttachmentHandle, Error> {
        self.forward(id, |ctx| ctx.open_attachment(message, attach_num))
    }

    pub fn create_attachment(
        &self,
        id: ContextId,
        message: MessageHandle,
    ) -> Result<(AttachmentHandle, u32), Error> {
        self.forward(id, |ctx| ctx.create_attachment(message))
    }

    pub fn open_embedded_message(
        &self,
        id: ContextId,
        attachment: AttachmentHandle,
    ) -> Result<(MessageHandle, MessageId), Error> {
        self.forward(id, |ctx| ctx.open_embedded_message(attachment))
    }

    pub fn set_columns(
        &self,
        id: ContextId,
        table: TableHandle,
        columns: &[PropTag],
    ) -> Result<(), Error> {
        self.forward(id, |ctx| ctx.set_columns(table, columns))
    }

    pub fn set_restrictions(
        &self,
        id: ContextId,
        table: TableHandle,
        restriction: Option<&Restriction>,
    ) -> Result<TableStatus, Error> {
        self.forward(id, |ctx| ctx.set_restrictions(table, restriction))
    }

    pub fn set_sort_order(
        &self,
        id: ContextId,
        table: TableHandle,
        order: &SortOrderSet,
    ) -> Result<TableStatus, Error> {
        self.forward(id, |ctx| ctx.set_sort_order(table, order))
    }

    pub fn get_row(
        &self,
        id: ContextId,
        table: TableHandle,
        query: QueryType,
        row: u32,
    ) -> Result<Vec<PropertyData>, Error> {
        self.forward(id, |ctx| ctx.get_row(table, query, row))
    }

    pub fn get_available_properties(
        &self,
        id: ContextId,
        object: ObjectHandle,
    ) -> Result<Vec<PropTag>, Error> {
        self.forward(id, |ctx| ctx.get_available_properties(object))
    }

    pub fn get_properties(
        &self,
        id: ContextId,
        object: ObjectHandle,
        tags: &[PropTag],
    ) -> Result<Vec<PropertyData>, Error> {
        self.forward(id, |ctx| ctx.get_properties(object, tags))
    }

    pub fn set_properties(
        &self,
        id: ContextId,
        object: ObjectHandle,
        values: &[PropertyValue],
    ) -> Result<(), Error> {
        self.forward(id, |ctx| ctx.set_properties(object, values))
    }

    pub fn release_object(
        &self,
        id: ContextId,
        object: ObjectHandle,
    ) -> Result<(), Error> {
        self.forward(id, |ctx| {
            ctx.release_object(object);
            Ok(())
        })
    }
}

/// Deletes every folder beneath `fid`, deepest first.
fn delete_subtree(
    ctx: &mut dyn StoreContext,
    parent: FolderHandle,
    fid: FolderId,
) -> Result<(), Error> {
    let folder = ctx.open_folder(parent, fid).map_err(|_| Error::NotFound)?;
    let result = ctx
        .get_child_fids(folder)
        .map_err(|_| Error::NotFound)
        .and_then(|children| {
            for child in children {
                delete_subtree(ctx, folder, child)?;
                ctx.delete_folder(folder, child).map_err(|e| {
                    warn!("Failed to delete child folder {:?}: {}", child, e);
                    Error::NotFound
                })?;
            }
            Ok(())
        });

    ctx.release_object(ObjectHandle::Folder(folder));
    result
}
