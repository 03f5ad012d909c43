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

//! A backend for tests which behaves like the memory backend, except where
//! told to fail or to report something else.

use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{Backend, StoreContext};
use super::memory::MemoryBackend;
use super::model::*;
use crate::support::error::Error;

pub const NAMESPACE: &str = "faulty://";

#[derive(Default)]
pub struct Faults {
    /// Deleting this folder fails with `DatabaseOps`.
    pub fail_delete: Option<FolderId>,
    /// Sort requests succeed with this status instead of `Complete`.
    pub sort_status: Option<TableStatus>,
    pub reject_columns: bool,
    pub reject_restrictions: bool,
}

pub struct FaultyBackend {
    inner: MemoryBackend,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyBackend {
    pub fn new() -> Self {
        FaultyBackend {
            inner: MemoryBackend::new(NAMESPACE),
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// The faults of every context this backend has created.
    pub fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap()
    }
}

impl Backend for FaultyBackend {
    fn namespace(&self) -> &str {
        NAMESPACE
    }

    fn create_context(
        &self,
        payload: &str,
        root: FolderId,
    ) -> Result<Box<dyn StoreContext>, Error> {
        Ok(Box::new(FaultyContext {
            inner: self.inner.create_context(payload, root)?,
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct FaultyContext {
    inner: Box<dyn StoreContext>,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyContext {
    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap()
    }
}

impl StoreContext for FaultyContext {
    fn root_folder(&self) -> FolderHandle {
        self.inner.root_folder()
    }

    fn release(&mut self) -> Result<(), Error> {
        self.inner.release()
    }

    fn release_object(&mut self, object: ObjectHandle) {
        self.inner.release_object(object)
    }

    fn open_folder(
        &mut self,
        parent: FolderHandle,
        fid: FolderId,
    ) -> Result<FolderHandle, Error> {
        self.inner.open_folder(parent, fid)
    }

    fn create_folder(
        &mut self,
        parent: FolderHandle,
        fid: FolderId,
        properties: &[PropertyValue],
    ) -> Result<FolderHandle, Error> {
        self.inner.create_folder(parent, fid, properties)
    }

    fn delete_folder(
        &mut self,
        parent: FolderHandle,
        fid: FolderId,
    ) -> Result<(), Error> {
        if Some(fid) == self.faults().fail_delete {
            return Err(Error::DatabaseOps);
        }
        self.inner.delete_folder(parent, fid)
    }

    fn get_child_fids(
        &mut self,
        folder: FolderHandle,
    ) -> Result<Vec<FolderId>, Error> {
        self.inner.get_child_fids(folder)
    }

    fn get_child_count(
        &mut self,
        folder: FolderHandle,
        kind: TableKind,
    ) -> Result<u32, Error> {
        self.inner.get_child_count(folder, kind)
    }

    fn open_table(
        &mut self,
        folder: FolderHandle,
        kind: TableKind,
    ) -> Result<(TableHandle, u32), Error> {
        self.inner.open_table(folder, kind)
    }

    fn open_message(
        &mut self,
        folder: FolderHandle,
        mid: MessageId,
    ) -> Result<MessageHandle, Error> {
        self.inner.open_message(folder, mid)
    }

    fn create_message(
        &mut self,
        folder: FolderHandle,
        mid: MessageId,
        associated: bool,
    ) -> Result<MessageHandle, Error> {
        self.inner.create_message(folder, mid, associated)
    }

    fn delete_message(
        &mut self,
        folder: FolderHandle,
        mid: MessageId,
        mode: MessageDeleteMode,
    ) -> Result<(), Error> {
        self.inner.delete_message(folder, mid, mode)
    }

    fn modify_recipients(
        &mut self,
        message: MessageHandle,
        rows: &[RecipientRow],
    ) -> Result<(), Error> {
        self.inner.modify_recipients(message, rows)
    }

    fn save_message(&mut self, message: MessageHandle) -> Result<(), Error> {
        self.inner.save_message(message)
    }

    fn submit_message(
        &mut self,
        message: MessageHandle,
        flags: SubmitFlags,
    ) -> Result<(), Error> {
        self.inner.submit_message(message, flags)
    }

    fn get_attachment_table(
        &mut self,
        message: MessageHandle,
    ) -> Result<(TableHandle, u32), Error> {
        self.inner.get_attachment_table(message)
    }

    fn open_attachment(
        &mut self,
        message: MessageHandle,
        attach_num: u32,
    ) -> Result<AttachmentHandle, Error> {
        self.inner.open_attachment(message, attach_num)
    }

    fn create_attachment(
        &mut self,
        message: MessageHandle,
    ) -> Result<(AttachmentHandle, u32), Error> {
        self.inner.create_attachment(message)
    }

    fn open_embedded_message(
        &mut self,
        attachment: AttachmentHandle,
    ) -> Result<(MessageHandle, MessageId), Error> {
        self.inner.open_embedded_message(attachment)
    }

    fn set_columns(
        &mut self,
        table: TableHandle,
        columns: &[PropTag],
    ) -> Result<(), Error> {
        if self.faults().reject_columns {
            return Err(Error::InvalidParameter);
        }
        self.inner.set_columns(table, columns)
    }

    fn set_restrictions(
        &mut self,
        table: TableHandle,
        restriction: Option<&Restriction>,
    ) -> Result<TableStatus, Error> {
        if self.faults().reject_restrictions {
            return Err(Error::DatabaseOps);
        }
        self.inner.set_restrictions(table, restriction)
    }

    fn set_sort_order(
        &mut self,
        table: TableHandle,
        order: &SortOrderSet,
    ) -> Result<TableStatus, Error> {
        let status = self.inner.set_sort_order(table, order)?;
        Ok(self.faults().sort_status.unwrap_or(status))
    }

    fn get_row(
        &mut self,
        table: TableHandle,
        query: QueryType,
        row: u32,
    ) -> Result<Vec<PropertyData>, Error> {
        self.inner.get_row(table, query, row)
    }

    fn get_available_properties(
        &mut self,
        object: ObjectHandle,
    ) -> Result<Vec<PropTag>, Error> {
        self.inner.get_available_properties(object)
    }

    fn get_properties(
        &mut self,
        object: ObjectHandle,
        tags: &[PropTag],
    ) -> Result<Vec<PropertyData>, Error> {
        self.inner.get_properties(object, tags)
    }

    fn set_properties(
        &mut self,
        object: ObjectHandle,
        values: &[PropertyValue],
    ) -> Result<(), Error> {
        self.inner.set_properties(object, values)
    }
}
