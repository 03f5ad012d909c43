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

//! Data types shared between the context registry, the backends, and the
//! protocol layer.

use std::cmp::Ordering;
use std::fmt;

use bitflags::bitflags;
use chrono::prelude::*;

use crate::support::error::Error;

/// Identifies a live backend context.
///
/// `index` is the small integer that clients see; it is dense and is reused
/// once a context is finally released. `generation` distinguishes successive
/// occupants of the same index, so that a stale `ContextId` held somewhere
/// cannot silently refer to a context registered after its own was deleted.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId {
    pub(super) index: u32,
    pub(super) generation: u32,
}

impl ContextId {
    pub fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ContextId({}@{})", self.index, self.generation)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.index)
    }
}

/// A 64-bit folder identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FolderId(pub u64);

impl fmt::Debug for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FolderId({:#018x})", self.0)
    }
}

/// A 64-bit message identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MessageId(pub u64);

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MessageId({:#018x})", self.0)
    }
}

/// A parsed context URI of the form `scheme://payload`.
///
/// The namespace retains the `://` separator since that is what backends are
/// registered under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextUri<'a> {
    pub namespace: &'a str,
    pub payload: &'a str,
}

impl<'a> ContextUri<'a> {
    /// Parses `uri`.
    ///
    /// The URI must be at least 4 bytes long and contain a colon immediately
    /// followed by exactly two slashes and a non-empty payload.
    pub fn parse(uri: &'a str) -> Result<Self, Error> {
        if uri.len() < 4 {
            return Err(Error::InvalidNamespace);
        }

        let colon = uri.find(':').ok_or(Error::InvalidNamespace)?;
        let rest = &uri[colon + 1..];
        if !rest.starts_with("//") {
            return Err(Error::InvalidNamespace);
        }

        let payload = &rest[2..];
        if payload.is_empty() || payload.starts_with('/') {
            return Err(Error::InvalidNamespace);
        }

        Ok(ContextUri {
            namespace: &uri[..colon + 3],
            payload,
        })
    }
}

/// A MAPI property tag: the property identifier in the upper 16 bits and the
/// property type in the lower 16.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropTag(pub u32);

impl fmt::Debug for PropTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PropTag({:#010x})", self.0)
    }
}

pub const PT_UNSPECIFIED: u16 = 0x0000;
pub const PT_LONG: u16 = 0x0003;
pub const PT_ERROR: u16 = 0x000a;
pub const PT_BOOLEAN: u16 = 0x000b;
pub const PT_I8: u16 = 0x0014;
pub const PT_STRING8: u16 = 0x001e;
pub const PT_UNICODE: u16 = 0x001f;
pub const PT_SYSTIME: u16 = 0x0040;
pub const PT_BINARY: u16 = 0x0102;

impl PropTag {
    pub const MESSAGE_CLASS: Self = PropTag(0x001a_001f);
    pub const SUBJECT: Self = PropTag(0x0037_001f);
    pub const MESSAGE_FLAGS: Self = PropTag(0x0e07_0003);
    pub const MESSAGE_SIZE: Self = PropTag(0x0e08_0003);
    pub const ATTACH_NUM: Self = PropTag(0x0e21_0003);
    pub const DISPLAY_NAME: Self = PropTag(0x3001_001f);
    pub const CREATION_TIME: Self = PropTag(0x3007_0040);
    pub const LAST_MODIFICATION_TIME: Self = PropTag(0x3008_0040);
    pub const CONTENT_COUNT: Self = PropTag(0x3602_0003);
    pub const SUBFOLDERS: Self = PropTag(0x360a_000b);
    pub const CONTAINER_CLASS: Self = PropTag(0x3613_001f);
    pub const ATTACH_LONG_FILENAME: Self = PropTag(0x3707_001f);
    pub const ATTACH_METHOD: Self = PropTag(0x3705_0003);
    pub const FOLDER_CHILD_COUNT: Self = PropTag(0x6638_0003);
    pub const FID: Self = PropTag(0x6748_0014);
    pub const PARENT_FID: Self = PropTag(0x6749_0014);
    pub const MID: Self = PropTag(0x674a_0014);
    pub const INST_ID: Self = PropTag(0x674d_0014);
    pub const INSTANCE_NUM: Self = PropTag(0x674e_0003);

    pub fn id(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn prop_type(self) -> u16 {
        self.0 as u16
    }

    /// Returns this tag with its type replaced by `prop_type`.
    pub fn with_type(self, prop_type: u16) -> Self {
        PropTag((self.0 & 0xffff_0000) | u32::from(prop_type))
    }
}

/// A property value.
///
/// Only the handful of types needed to describe folders and messages in
/// tables are modelled.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Boolean(bool),
    Long(i32),
    I8(i64),
    Unicode(String),
    Binary(Vec<u8>),
    SysTime(DateTime<Utc>),
    /// An error placeholder, carrying a MAPI status code.
    Error(u32),
}

impl PropValue {
    /// The property type that naturally carries this value.
    pub fn prop_type(&self) -> u16 {
        match *self {
            PropValue::Boolean(_) => PT_BOOLEAN,
            PropValue::Long(_) => PT_LONG,
            PropValue::I8(_) => PT_I8,
            PropValue::Unicode(_) => PT_UNICODE,
            PropValue::Binary(_) => PT_BINARY,
            PropValue::SysTime(_) => PT_SYSTIME,
            PropValue::Error(_) => PT_ERROR,
        }
    }

    /// Compares two values of the same type.
    ///
    /// Returns `None` if the types differ or the type is not ordered.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (&PropValue::Boolean(a), &PropValue::Boolean(b)) => Some(a.cmp(&b)),
            (&PropValue::Long(a), &PropValue::Long(b)) => Some(a.cmp(&b)),
            (&PropValue::I8(a), &PropValue::I8(b)) => Some(a.cmp(&b)),
            (&PropValue::Unicode(ref a), &PropValue::Unicode(ref b)) => {
                Some(a.cmp(b))
            }
            (&PropValue::Binary(ref a), &PropValue::Binary(ref b)) => {
                Some(a.cmp(b))
            }
            (&PropValue::SysTime(a), &PropValue::SysTime(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match *self {
            PropValue::Unicode(ref s) => Some(s),
            _ => None,
        }
    }
}

/// A tagged property value, as used when creating or updating objects.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyValue {
    pub tag: PropTag,
    pub value: PropValue,
}

impl PropertyValue {
    pub fn new(tag: PropTag, value: PropValue) -> Self {
        PropertyValue { tag, value }
    }
}

/// The outcome of resolving one property: either its value, or the reason it
/// could not be resolved.
pub type PropertyData = Result<PropValue, Error>;

/// The kinds of table a folder or message can expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// The hierarchy table: child folders.
    Folder,
    /// The contents table: normal messages.
    Message,
    /// The associated contents table.
    Fai,
    Rule,
    Attachment,
    Permissions,
}

impl TableKind {
    /// Rule and permission tables are not backed by any store; queries on
    /// them are answered without touching a backend.
    pub fn is_faked(self) -> bool {
        matches!(self, TableKind::Rule | TableKind::Permissions)
    }

    pub fn is_contents(self) -> bool {
        matches!(self, TableKind::Message | TableKind::Fai)
    }
}

/// How a row index passed to `get_row` is to be interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryType {
    /// The index is into the rows that satisfy the table's restriction.
    Prefiltered,
    /// The index is into the unrestricted rows; the backend must fail the
    /// lookup if the row at that index does not satisfy the restriction.
    LiveFiltered,
}

/// The status a table reports after a configuration change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableStatus {
    Complete,
    Sorting,
    SortError,
    SettingColumns,
    SetColumnsError,
    Restricting,
    RestrictError,
}

impl TableStatus {
    pub fn wire_value(self) -> u8 {
        match self {
            TableStatus::Complete => 0x00,
            TableStatus::Sorting => 0x09,
            TableStatus::SortError => 0x0a,
            TableStatus::SettingColumns => 0x0b,
            TableStatus::SetColumnsError => 0x0d,
            TableStatus::Restricting => 0x0e,
            TableStatus::RestrictError => 0x0f,
        }
    }
}

/// Relational operators for property restrictions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// How a content restriction matches strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuzzyLevel {
    FullString,
    Substring,
    Prefix,
}

/// A filter predicate over the properties of a row.
#[derive(Clone, Debug, PartialEq)]
pub enum Restriction {
    And(Vec<Restriction>),
    Or(Vec<Restriction>),
    Not(Box<Restriction>),
    Content {
        tag: PropTag,
        value: String,
        level: FuzzyLevel,
        ignore_case: bool,
    },
    Property {
        op: RelOp,
        tag: PropTag,
        value: PropValue,
    },
    Exist(PropTag),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortColumn {
    pub tag: PropTag,
    pub direction: SortDirection,
}

/// A sort specification. Category and expansion counts are passed through
/// to the backend verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortOrderSet {
    pub categories: u16,
    pub expanded: u16,
    pub columns: Vec<SortColumn>,
}

macro_rules! handle_type {
    ($name:ident) => {
        /// A backend-assigned handle. Only meaningful to the backend context
        /// that issued it.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);
    };
}

handle_type!(FolderHandle);
handle_type!(MessageHandle);
handle_type!(AttachmentHandle);
handle_type!(TableHandle);

/// Any backend object that carries properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectHandle {
    Folder(FolderHandle),
    Message(MessageHandle),
    Attachment(AttachmentHandle),
    Table(TableHandle),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecipientType {
    To,
    Cc,
    Bcc,
}

/// One entry of a recipient modification.
#[derive(Clone, Debug, PartialEq)]
pub struct RecipientRow {
    pub row_id: u32,
    pub recipient_type: RecipientType,
    /// Empty to remove the recipient with `row_id`.
    pub properties: Vec<PropertyValue>,
}

bitflags! {
    pub struct FolderDeleteFlags: u8 {
        const DEL_MESSAGES = 0x01;
        const DEL_FOLDERS = 0x04;
        const DEL_ASSOCIATED = 0x08;
        const DELETE_HARD_DELETE = 0x10;
    }
}

bitflags! {
    pub struct SubmitFlags: u8 {
        const PRE_PROCESS = 0x01;
        const NEEDS_SPOOLER = 0x02;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageDeleteMode {
    Soft,
    Permanent,
}
