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

use std::sync::Arc;

use bitflags::bitflags;
use log::{error, warn};

use super::handles::HandleTable;
use crate::store::model::*;
use crate::store::registry::ContextRegistry;
use crate::support::{error::Error, log_prefix::LogPrefix};

/// The semantic status carried in every operation reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapiStatus {
    Success,
    CallFailed,
    NotEnoughMemory,
    InvalidParameter,
    NoSupport,
    UnknownFlags,
    InvalidObject,
    NotFound,
    Collision,
    NotInitialized,
    HasFolders,
    NullObject,
    NotImplemented,
}

impl MapiStatus {
    pub fn wire_value(self) -> u32 {
        match self {
            MapiStatus::Success => 0x0000_0000,
            MapiStatus::CallFailed => 0x8000_4005,
            MapiStatus::NotEnoughMemory => 0x8007_000e,
            MapiStatus::InvalidParameter => 0x8007_0057,
            MapiStatus::NoSupport => 0x8004_0102,
            MapiStatus::UnknownFlags => 0x8004_0106,
            MapiStatus::InvalidObject => 0x8004_0108,
            MapiStatus::NotFound => 0x8004_010f,
            MapiStatus::Collision => 0x8004_0604,
            MapiStatus::NotInitialized => 0x8004_0605,
            MapiStatus::HasFolders => 0x8004_0609,
            MapiStatus::NullObject => 0x0000_04b9,
            MapiStatus::NotImplemented => 0x8004_0fff,
        }
    }
}

impl<'a> From<&'a Error> for MapiStatus {
    fn from(e: &'a Error) -> Self {
        match *e {
            Error::NotFound | Error::InvalidNamespace => MapiStatus::NotFound,
            Error::NoMemory => MapiStatus::NotEnoughMemory,
            Error::InvalidParameter => MapiStatus::InvalidParameter,
            Error::NotInitialized => MapiStatus::NotInitialized,
            Error::NotImplemented => MapiStatus::NotImplemented,
            _ => MapiStatus::CallFailed,
        }
    }
}

/// Where `SeekRow` and `FindRow` measure from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookmarkOrigin {
    Beginning,
    Current,
    End,
    /// A client-created bookmark. These are never issued, so any reference
    /// to one is unresolvable.
    Custom(u8),
}

impl From<u8> for BookmarkOrigin {
    fn from(raw: u8) -> Self {
        match raw {
            0 => BookmarkOrigin::Beginning,
            1 => BookmarkOrigin::Current,
            2 => BookmarkOrigin::End,
            n => BookmarkOrigin::Custom(n),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindRowDirection {
    Forward,
    Backward,
}

bitflags! {
    pub struct SortTableFlags: u8 {
        const TBL_ASYNC = 0x01;
        const TBL_BATCH = 0x02;
    }
}

/// One row of property values, in the order they were asked for.
///
/// If any property could not be resolved, the row is `flagged` and the
/// affected entries carry a `PT_ERROR`-typed tag and an error value in place
/// of the property.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyRow {
    pub flagged: bool,
    pub values: Vec<PropertyValue>,
}

/// A single protocol operation. Object handles refer to the session's handle
/// table.
#[derive(Clone, Debug, PartialEq)]
pub enum RopRequest {
    /// Starts a session for `username`.
    Logon { username: String },
    /// Binds the store at `uri` (whose root folder is `root`) to the session,
    /// yielding a handle to its root folder.
    AttachStore {
        logon: u32,
        uri: String,
        root: FolderId,
    },
    OpenFolder {
        parent: u32,
        fid: FolderId,
    },
    CreateFolder {
        parent: u32,
        fid: FolderId,
        properties: Vec<PropertyValue>,
    },
    DeleteFolder {
        parent: u32,
        fid: FolderId,
        flags: FolderDeleteFlags,
    },
    GetHierarchyTable {
        folder: u32,
    },
    GetContentsTable {
        folder: u32,
        associated: bool,
    },
    GetRulesTable {
        folder: u32,
    },
    GetPermissionsTable {
        folder: u32,
    },
    GetPropertiesSpecific {
        object: u32,
        tags: Vec<PropTag>,
    },
    SetProperties {
        object: u32,
        values: Vec<PropertyValue>,
    },
    GetPropertiesList {
        object: u32,
    },
    OpenMessage {
        folder: u32,
        mid: MessageId,
    },
    CreateMessage {
        folder: u32,
        mid: MessageId,
        associated: bool,
    },
    DeleteMessages {
        folder: u32,
        mids: Vec<MessageId>,
        hard_delete: bool,
    },
    ModifyRecipients {
        message: u32,
        rows: Vec<RecipientRow>,
    },
    SaveChangesMessage {
        message: u32,
    },
    SubmitMessage {
        message: u32,
        flags: SubmitFlags,
    },
    GetAttachmentTable {
        message: u32,
    },
    OpenAttach {
        message: u32,
        attach_num: u32,
    },
    CreateAttach {
        message: u32,
    },
    OpenEmbeddedMessage {
        attachment: u32,
    },
    Release {
        object: u32,
    },

    SetColumns {
        table: u32,
        columns: Vec<PropTag>,
    },
    SortTable {
        table: u32,
        flags: SortTableFlags,
        order: SortOrderSet,
    },
    Restrict {
        table: u32,
        restriction: Option<Restriction>,
    },
    QueryRows {
        table: u32,
        count: u16,
    },
    QueryPosition {
        table: u32,
    },
    SeekRow {
        table: u32,
        origin: BookmarkOrigin,
        offset: i32,
        want_row_moved_count: bool,
    },
    FindRow {
        table: u32,
        origin: BookmarkOrigin,
        direction: FindRowDirection,
        restriction: Restriction,
    },
    ResetTable {
        table: u32,
    },
    QueryColumnsAll {
        table: u32,
    },
    GetStatus {
        table: u32,
    },

    /// An operation this server does not implement, by operation number.
    Unsupported(u8),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReplyBody {
    Empty,
    /// A newly created handle.
    Object {
        handle: u32,
    },
    Table {
        handle: u32,
        row_count: u32,
    },
    Message {
        handle: u32,
        mid: MessageId,
    },
    Attachment {
        handle: u32,
        attach_num: u32,
    },
    Properties(PropertyRow),
    PropertyTags(Vec<PropTag>),
    TableStatus(TableStatus),
    QueryRows {
        /// 0 if more rows may remain, 2 if the end of the table was reached.
        origin: u8,
        rows: Vec<PropertyRow>,
    },
    QueryPosition {
        numerator: u32,
        denominator: u32,
    },
    SeekRow {
        has_sought_less: bool,
        rows_sought: i32,
    },
    FindRow {
        row: Option<PropertyRow>,
    },
}

/// The reply to one `RopRequest`.
///
/// Delivering a reply always succeeds; whether the operation did is
/// reported by `error_code`.
#[derive(Clone, Debug, PartialEq)]
pub struct RopReply {
    pub error_code: MapiStatus,
    pub body: ReplyBody,
}

impl RopReply {
    pub fn ok(body: ReplyBody) -> Self {
        RopReply {
            error_code: MapiStatus::Success,
            body,
        }
    }

    pub fn error(error_code: MapiStatus) -> Self {
        RopReply {
            error_code,
            body: ReplyBody::Empty,
        }
    }
}

/// Executes operations on behalf of one client session.
///
/// The processor owns the session's handle table. The context registry is
/// shared between all sessions.
pub struct RopProcessor {
    pub(super) log_prefix: LogPrefix,
    pub(super) registry: Arc<ContextRegistry>,
    pub(super) username: Option<String>,
    pub(super) handles: HandleTable,
}

/// Used just for the convenient `?` operator. We don't distinguish `Ok` from
/// `Err` when the reply is delivered.
pub(super) type RopResult = Result<RopReply, RopReply>;

/// Return value from an operation that can either succeed with a value, or
/// fail with a reply.
pub(super) type PartialResult<T> = Result<T, RopReply>;

impl RopProcessor {
    pub fn new(log_prefix: LogPrefix, registry: Arc<ContextRegistry>) -> Self {
        RopProcessor {
            log_prefix,
            registry,
            username: None,
            handles: HandleTable::default(),
        }
    }

    pub fn log_prefix(&self) -> &LogPrefix {
        &self.log_prefix
    }
}

pub(super) fn catch_all_error_handling(
    log_prefix: &LogPrefix,
    e: Error,
) -> RopReply {
    let status = MapiStatus::from(&e);
    if MapiStatus::CallFailed == status {
        error!("{} Unhandled store error {}: {}", log_prefix, e.code(), e);
    } else {
        warn!("{} Operation failed: {}", log_prefix, e);
    }

    RopReply::error(status)
}
