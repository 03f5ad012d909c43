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

//! Folder, table-opening and property operations.

use super::defs::*;
use super::handles::{FolderObject, Object};
use super::table::{TableBinding, TableObject, TableParent};
use crate::store::model::*;
use crate::support::error::Error;

impl RopProcessor {
    pub(super) fn cmd_open_folder(
        &mut self,
        parent: u32,
        fid: FolderId,
    ) -> RopResult {
        let parent = object!(self, parent, Folder)?;
        let handle = self
            .registry
            .open_folder(parent.context, parent.handle, fid)
            .map_err(map_error!(self))?;

        let handle = self.bind(
            parent.context,
            Object::Folder(FolderObject {
                fid,
                context: parent.context,
                handle,
            }),
        )?;
        Ok(RopReply::ok(ReplyBody::Object { handle }))
    }

    pub(super) fn cmd_create_folder(
        &mut self,
        parent: u32,
        fid: FolderId,
        properties: Vec<PropertyValue>,
    ) -> RopResult {
        let parent = object!(self, parent, Folder)?;
        let handle = self
            .registry
            .create_folder(parent.context, parent.handle, fid, &properties)
            .map_err(map_error!(self, Exists => Collision,))?;

        let handle = self.bind(
            parent.context,
            Object::Folder(FolderObject {
                fid,
                context: parent.context,
                handle,
            }),
        )?;
        Ok(RopReply::ok(ReplyBody::Object { handle }))
    }

    pub(super) fn cmd_delete_folder(
        &mut self,
        parent: u32,
        fid: FolderId,
        flags: FolderDeleteFlags,
    ) -> RopResult {
        let parent = object!(self, parent, Folder)?;
        self.registry
            .delete_folder(parent.context, parent.handle, fid, flags)
            .map_err(map_error!(self, Exists => HasFolders,))?;
        Ok(RopReply::ok(ReplyBody::Empty))
    }

    /// Opens a backend table of `kind` on the folder `folder`.
    pub(super) fn cmd_open_folder_table(
        &mut self,
        folder: u32,
        kind: TableKind,
    ) -> RopResult {
        let folder = object!(self, folder, Folder)?;
        let parent = Some(TableParent::Folder(folder.fid));

        if kind.is_faked() {
            let table = TableObject::new(parent, kind, 0, None);
            let handle = self.handles.insert(Object::Table(table));
            return Ok(RopReply::ok(ReplyBody::Table {
                handle,
                row_count: 0,
            }));
        }

        let (table, row_count) = self
            .registry
            .open_table(folder.context, folder.handle, kind)
            .map_err(map_error!(self))?;
        let table = TableObject::new(
            parent,
            kind,
            row_count,
            Some(TableBinding {
                context: folder.context,
                handle: table,
            }),
        );

        let handle = self.bind(folder.context, Object::Table(table))?;
        Ok(RopReply::ok(ReplyBody::Table { handle, row_count }))
    }

    pub(super) fn cmd_get_properties_specific(
        &mut self,
        object: u32,
        tags: Vec<PropTag>,
    ) -> RopResult {
        let (context, object) = self.backend_object(object)?;
        let data = self
            .registry
            .get_properties(context, object, &tags)
            .map_err(map_error!(self))?;
        let row =
            PropertyRow::assemble(&tags, data).map_err(map_error!(self))?;
        Ok(RopReply::ok(ReplyBody::Properties(row)))
    }

    pub(super) fn cmd_set_properties(
        &mut self,
        object: u32,
        values: Vec<PropertyValue>,
    ) -> RopResult {
        let (context, object) = self.backend_object(object)?;
        self.registry
            .set_properties(context, object, &values)
            .map_err(map_error!(self))?;
        Ok(RopReply::ok(ReplyBody::Empty))
    }

    pub(super) fn cmd_get_properties_list(&mut self, object: u32) -> RopResult {
        let (context, object) = self.backend_object(object)?;
        let tags = self
            .registry
            .get_available_properties(context, object)
            .map_err(map_error!(self))?;
        Ok(RopReply::ok(ReplyBody::PropertyTags(tags)))
    }

    /// Resolves `handle` to an object that lives in a backend.
    fn backend_object(
        &self,
        handle: u32,
    ) -> PartialResult<(ContextId, ObjectHandle)> {
        match self.handles.get(handle) {
            None => Err(RopReply::error(MapiStatus::InvalidObject)),
            Some(object) => object
                .binding()
                .ok_or_else(|| RopReply::error(MapiStatus::NoSupport)),
        }
    }
}
