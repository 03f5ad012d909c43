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

use log::{info, warn};

use super::defs::*;
use super::handles::{FolderObject, Object};
use crate::store::model::*;
use crate::store::registry::DeleteOutcome;
use crate::support::error::Error;

impl RopProcessor {
    pub(super) fn cmd_logon(&mut self, username: String) -> RopResult {
        if self.username.is_some() {
            return Err(RopReply::error(MapiStatus::InvalidParameter));
        }

        self.log_prefix.set_user(username.clone());
        self.registry.open_indexing(&username);
        info!("{} Logged on", self.log_prefix);
        self.username = Some(username);

        let handle = self.handles.insert(Object::Logon);
        Ok(RopReply::ok(ReplyBody::Object { handle }))
    }

    /// Binds the store at `uri` to the session.
    ///
    /// If a context for `uri` is already live (possibly from another
    /// session), it is shared; otherwise a new one is created. Either way
    /// the new root folder object holds one reference to it.
    pub(super) fn cmd_attach_store(
        &mut self,
        logon: u32,
        uri: String,
        root: FolderId,
    ) -> RopResult {
        match self.handles.get(logon) {
            Some(&Object::Logon) => (),
            _ => return Err(RopReply::error(MapiStatus::InvalidObject)),
        }
        let username = self
            .username
            .clone()
            .ok_or_else(|| RopReply::error(MapiStatus::NotInitialized))?;

        let info = match self.registry.lookup_by_uri(&uri) {
            Ok(info) => {
                self.registry.add_ref(info.id).map_err(map_error!(self))?;
                info
            }
            Err(Error::NotFound) => {
                let id = self.registry.add_context(&uri, root).map_err(
                    map_error!(self, InvalidNamespace => NotFound,),
                )?;
                self.registry.lookup_by_id(id).map_err(map_error!(self))?
            }
            Err(e) => return Err(catch_all_error_handling(&self.log_prefix, e)),
        };

        if let Err(e) = self.registry.associate_indexing(&username, info.id) {
            self.release_reference(info.id);
            return Err(catch_all_error_handling(&self.log_prefix, e));
        }

        info!("{} Attached {} as context {}", self.log_prefix, uri, info.id);
        let handle = self.handles.insert(Object::Folder(FolderObject {
            fid: root,
            context: info.id,
            handle: info.root,
        }));
        Ok(RopReply::ok(ReplyBody::Object { handle }))
    }

    pub(super) fn cmd_release(&mut self, handle: u32) -> RopResult {
        let object = self
            .handles
            .remove(handle)
            .ok_or_else(|| RopReply::error(MapiStatus::InvalidObject))?;
        self.release_object(object);
        Ok(RopReply::ok(ReplyBody::Empty))
    }

    /// Releases every object the session still holds.
    pub fn close(&mut self) {
        for object in self.handles.drain() {
            self.release_object(object);
        }
    }

    /// Adds `object`, which was just opened through `context`, to the handle
    /// table, taking a reference to the context on its behalf.
    pub(super) fn bind(
        &mut self,
        context: ContextId,
        object: Object,
    ) -> PartialResult<u32> {
        if let Err(e) = self.registry.add_ref(context) {
            if let Some((_, backend_object)) = object.binding() {
                if let Err(e) =
                    self.registry.release_object(context, backend_object)
                {
                    warn!(
                        "{} Failed to release {:?}: {}",
                        self.log_prefix, backend_object, e
                    );
                }
            }
            return Err(catch_all_error_handling(&self.log_prefix, e));
        }

        Ok(self.handles.insert(object))
    }

    fn release_object(&self, object: Object) {
        if let Some((context, backend_object)) = object.binding() {
            if let Err(e) = self.registry.release_object(context, backend_object)
            {
                warn!(
                    "{} Failed to release {:?}: {}",
                    self.log_prefix, backend_object, e
                );
            }
            self.release_reference(context);
        }
    }

    fn release_reference(&self, context: ContextId) {
        match self.registry.delete_context(context) {
            Ok(DeleteOutcome::Removed) => {
                info!("{} Context {} released", self.log_prefix, context)
            }
            Ok(DeleteOutcome::StillReferenced) => (),
            Err(e) => warn!(
                "{} Failed to release context {}: {}",
                self.log_prefix, context, e
            ),
        }
    }
}

impl Drop for RopProcessor {
    fn drop(&mut self) {
        self.close();
    }
}
