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

//! The per-session handle table.

use std::collections::HashMap;

use super::table::TableObject;
use crate::store::model::*;

/// A folder opened through a store context.
#[derive(Clone, Copy, Debug)]
pub(super) struct FolderObject {
    pub(super) fid: FolderId,
    pub(super) context: ContextId,
    pub(super) handle: FolderHandle,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct MessageObject {
    pub(super) mid: MessageId,
    pub(super) context: ContextId,
    pub(super) handle: MessageHandle,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct AttachmentObject {
    pub(super) attach_num: u32,
    pub(super) context: ContextId,
    pub(super) handle: AttachmentHandle,
}

pub(super) enum Object {
    /// The session itself; only meaningful as the parent of `AttachStore`.
    Logon,
    Folder(FolderObject),
    Message(MessageObject),
    Attachment(AttachmentObject),
    Table(TableObject),
}

impl Object {
    /// The context this object holds a reference to, and its backend handle.
    pub(super) fn binding(&self) -> Option<(ContextId, ObjectHandle)> {
        match *self {
            Object::Logon => None,
            Object::Folder(ref f) => {
                Some((f.context, ObjectHandle::Folder(f.handle)))
            }
            Object::Message(ref m) => {
                Some((m.context, ObjectHandle::Message(m.handle)))
            }
            Object::Attachment(ref a) => {
                Some((a.context, ObjectHandle::Attachment(a.handle)))
            }
            Object::Table(ref t) => t
                .binding()
                .map(|b| (b.context, ObjectHandle::Table(b.handle))),
        }
    }
}

/// Maps the `u32` handles clients use to refer to objects.
///
/// Handles are never reused within a session.
#[derive(Default)]
pub(super) struct HandleTable {
    objects: HashMap<u32, Object>,
    next: u32,
}

impl HandleTable {
    pub(super) fn insert(&mut self, object: Object) -> u32 {
        let handle = self.next;
        self.next += 1;
        self.objects.insert(handle, object);
        handle
    }

    pub(super) fn get(&self, handle: u32) -> Option<&Object> {
        self.objects.get(&handle)
    }

    pub(super) fn get_mut(&mut self, handle: u32) -> Option<&mut Object> {
        self.objects.get_mut(&handle)
    }

    pub(super) fn remove(&mut self, handle: u32) -> Option<Object> {
        self.objects.remove(&handle)
    }

    /// Removes and returns every object, highest handle first, so that
    /// children are released before the objects they were opened from.
    pub(super) fn drain(&mut self) -> Vec<Object> {
        let mut handles = self.objects.keys().copied().collect::<Vec<_>>();
        handles.sort_unstable_by(|a, b| b.cmp(a));
        handles
            .into_iter()
            .filter_map(|h| self.objects.remove(&h))
            .collect()
    }

    pub(super) fn len(&self) -> usize {
        self.objects.len()
    }
}
