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

use log::warn;

use super::defs::*;
use super::handles::Object;
use super::table::TableObject;
use crate::store::model::TableKind;
use crate::store::registry::ContextRegistry;
use crate::support::log_prefix::LogPrefix;

impl RopProcessor {
    /// Executes one operation.
    ///
    /// This always produces a reply. Whether the operation itself succeeded
    /// is reported in the reply's `error_code`.
    pub fn handle_rop(&mut self, request: RopRequest) -> RopReply {
        let res = match request {
            RopRequest::Logon { username } => self.cmd_logon(username),
            RopRequest::AttachStore { logon, uri, root } => {
                self.cmd_attach_store(logon, uri, root)
            }
            RopRequest::Release { object } => self.cmd_release(object),

            RopRequest::OpenFolder { parent, fid } => {
                self.cmd_open_folder(parent, fid)
            }
            RopRequest::CreateFolder {
                parent,
                fid,
                properties,
            } => self.cmd_create_folder(parent, fid, properties),
            RopRequest::DeleteFolder { parent, fid, flags } => {
                self.cmd_delete_folder(parent, fid, flags)
            }
            RopRequest::GetHierarchyTable { folder } => {
                self.cmd_open_folder_table(folder, TableKind::Folder)
            }
            RopRequest::GetContentsTable { folder, associated } => self
                .cmd_open_folder_table(
                    folder,
                    if associated {
                        TableKind::Fai
                    } else {
                        TableKind::Message
                    },
                ),
            RopRequest::GetRulesTable { folder } => {
                self.cmd_open_folder_table(folder, TableKind::Rule)
            }
            RopRequest::GetPermissionsTable { folder } => {
                self.cmd_open_folder_table(folder, TableKind::Permissions)
            }

            RopRequest::GetPropertiesSpecific { object, tags } => {
                self.cmd_get_properties_specific(object, tags)
            }
            RopRequest::SetProperties { object, values } => {
                self.cmd_set_properties(object, values)
            }
            RopRequest::GetPropertiesList { object } => {
                self.cmd_get_properties_list(object)
            }

            RopRequest::OpenMessage { folder, mid } => {
                self.cmd_open_message(folder, mid)
            }
            RopRequest::CreateMessage {
                folder,
                mid,
                associated,
            } => self.cmd_create_message(folder, mid, associated),
            RopRequest::DeleteMessages {
                folder,
                mids,
                hard_delete,
            } => self.cmd_delete_messages(folder, mids, hard_delete),
            RopRequest::ModifyRecipients { message, rows } => {
                self.cmd_modify_recipients(message, rows)
            }
            RopRequest::SaveChangesMessage { message } => {
                self.cmd_save_changes_message(message)
            }
            RopRequest::SubmitMessage { message, flags } => {
                self.cmd_submit_message(message, flags)
            }
            RopRequest::GetAttachmentTable { message } => {
                self.cmd_get_attachment_table(message)
            }
            RopRequest::OpenAttach {
                message,
                attach_num,
            } => self.cmd_open_attach(message, attach_num),
            RopRequest::CreateAttach { message } => {
                self.cmd_create_attach(message)
            }
            RopRequest::OpenEmbeddedMessage { attachment } => {
                self.cmd_open_embedded_message(attachment)
            }

            RopRequest::SetColumns { table, columns } => {
                self.with_table(table, |t, registry, log_prefix| {
                    t.set_columns(registry, log_prefix, columns)
                })
            }
            RopRequest::SortTable {
                table,
                flags,
                order,
            } => self.with_table(table, |t, registry, log_prefix| {
                t.sort_table(registry, log_prefix, flags, order)
            }),
            RopRequest::Restrict { table, restriction } => {
                self.with_table(table, |t, registry, log_prefix| {
                    t.restrict(registry, log_prefix, restriction)
                })
            }
            RopRequest::QueryRows { table, count } => {
                self.with_table(table, |t, registry, log_prefix| {
                    t.query_rows(registry, log_prefix, count)
                })
            }
            RopRequest::QueryPosition { table } => {
                self.with_table(table, |t, _, _| t.query_position())
            }
            RopRequest::SeekRow {
                table,
                origin,
                offset,
                want_row_moved_count,
            } => self.with_table(table, |t, _, _| {
                t.seek_row(origin, offset, want_row_moved_count)
            }),
            RopRequest::FindRow {
                table,
                origin,
                direction,
                restriction,
            } => self.with_table(table, |t, registry, log_prefix| {
                t.find_row(registry, log_prefix, origin, direction, &restriction)
            }),
            RopRequest::ResetTable { table } => {
                self.with_table(table, |t, registry, log_prefix| {
                    t.reset_table(registry, log_prefix)
                })
            }
            RopRequest::QueryColumnsAll { table } => {
                self.with_table(table, |t, registry, log_prefix| {
                    t.query_columns_all(registry, log_prefix)
                })
            }
            RopRequest::GetStatus { table } => {
                self.with_table(table, |t, _, _| t.get_status())
            }

            RopRequest::Unsupported(op) => {
                warn!("{} Unsupported operation {:#04x}", self.log_prefix, op);
                Err(RopReply::error(MapiStatus::NotImplemented))
            }
        };

        match res {
            Ok(r) => r,
            Err(r) => r,
        }
    }

    /// Runs a cursor operation on the table behind `handle`.
    fn with_table(
        &mut self,
        handle: u32,
        f: impl FnOnce(&mut TableObject, &ContextRegistry, &LogPrefix) -> RopReply,
    ) -> RopResult {
        match self.handles.get_mut(handle) {
            Some(&mut Object::Table(ref mut table)) => {
                Ok(f(table, &self.registry, &self.log_prefix))
            }
            _ => Err(RopReply::error(MapiStatus::InvalidObject)),
        }
    }
}
