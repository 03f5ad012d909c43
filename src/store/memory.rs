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

//! A volatile, process-local backend.
//!
//! Each distinct URI payload names one store. Contexts opened on the same
//! payload share that store; it is discarded once the last context on it is
//! gone.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, Weak};

use chrono::prelude::*;
use log::debug;

use super::backend::{Backend, StoreContext};
use super::model::*;
use crate::support::error::Error;

const MSGFLAG_READ: i32 = 0x0001;
const MSGFLAG_UNSENT: i32 = 0x0008;
const MSGFLAG_SUBMIT: i32 = 0x0004;
const ATTACH_BY_VALUE: i32 = 1;
const ATTACH_EMBEDDED_MSG: i32 = 5;

pub struct MemoryBackend {
    namespace: String,
    stores: Mutex<HashMap<String, Weak<Mutex<Store>>>>,
}

impl MemoryBackend {
    pub fn new(namespace: &str) -> Self {
        MemoryBackend {
            namespace: namespace.to_owned(),
            stores: Mutex::new(HashMap::new()),
        }
    }
}

impl Backend for MemoryBackend {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn create_context(
        &self,
        payload: &str,
        root: FolderId,
    ) -> Result<Box<dyn StoreContext>, Error> {
        if !payload.chars().all(|c| {
            c.is_ascii_alphanumeric() || "-_./@".contains(c)
        }) {
            return Err(Error::InvalidParameter);
        }

        let store = {
            let mut stores = self.stores.lock().unwrap();
            stores.retain(|_, store| store.strong_count() > 0);
            match stores.get(payload).and_then(Weak::upgrade) {
                Some(store) => store,
                None => {
                    debug!("New memory store for {}{}", self.namespace, payload);
                    let store = Arc::new(Mutex::new(Store::default()));
                    stores.insert(payload.to_owned(), Arc::downgrade(&store));
                    store
                }
            }
        };

        store.lock().unwrap().ensure_root(root);
        Ok(Box::new(MemoryContext::new(store, root)))
    }
}

type Properties = BTreeMap<PropTag, PropValue>;

#[derive(Default)]
struct Store {
    folders: HashMap<FolderId, Folder>,
    messages: HashMap<MessageId, Message>,
    /// Embedded messages are given ids counting down from the top of the id
    /// space, which real message ids never reach.
    embedded_mids: u64,
}

struct Folder {
    parent: Option<FolderId>,
    children: BTreeSet<FolderId>,
    /// Saved messages, in the order they were first saved.
    messages: Vec<MessageId>,
    properties: Properties,
}

struct Message {
    folder: Option<FolderId>,
    associated: bool,
    saved: bool,
    properties: Properties,
    recipients: Vec<RecipientRow>,
    attachments: Vec<Attachment>,
    next_attach_num: u32,
}

struct Attachment {
    num: u32,
    properties: Properties,
    embedded: Option<MessageId>,
}

/// The thing a table row or property-bearing object refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ObjectKey {
    Folder(FolderId),
    Message(MessageId),
    Attachment(MessageId, u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TableSource {
    Folder(FolderId),
    Attachments(MessageId),
}

struct Table {
    source: TableSource,
    kind: TableKind,
    columns: Vec<PropTag>,
    restriction: Option<Restriction>,
    sort: SortOrderSet,
}

enum Object {
    Folder(FolderId),
    Message(MessageId),
    Attachment(MessageId, u32),
    Table(Table),
}

struct MemoryContext {
    store: Arc<Mutex<Store>>,
    root: FolderHandle,
    objects: HashMap<u64, Object>,
    next_handle: u64,
}

fn timestamp_properties() -> Properties {
    let now = PropValue::SysTime(Utc::now());
    let mut properties = Properties::new();
    properties.insert(PropTag::CREATION_TIME, now.clone());
    properties.insert(PropTag::LAST_MODIFICATION_TIME, now);
    properties
}

fn is_computed(tag: PropTag) -> bool {
    [
        PropTag::FID,
        PropTag::PARENT_FID,
        PropTag::MID,
        PropTag::INST_ID,
        PropTag::INSTANCE_NUM,
        PropTag::CONTENT_COUNT,
        PropTag::SUBFOLDERS,
        PropTag::FOLDER_CHILD_COUNT,
        PropTag::ATTACH_NUM,
        PropTag::MESSAGE_SIZE,
    ]
    .iter()
    .any(|t| t.id() == tag.id())
}

fn lookup_stored(properties: &Properties, tag: PropTag) -> PropertyData {
    if PT_UNSPECIFIED == tag.prop_type() {
        properties
            .iter()
            .find(|&(t, _)| t.id() == tag.id())
            .map(|(_, v)| v.clone())
            .ok_or(Error::NotFound)
    } else {
        properties.get(&tag).cloned().ok_or(Error::NotFound)
    }
}

fn estimate_size(properties: &Properties) -> i32 {
    properties
        .values()
        .map(|v| {
            let size = match *v {
                PropValue::Boolean(_) => 2,
                PropValue::Long(_) => 4,
                PropValue::I8(_) | PropValue::SysTime(_) => 8,
                PropValue::Unicode(ref s) => 2 * s.len() + 2,
                PropValue::Binary(ref b) => b.len(),
                PropValue::Error(_) => 4,
            };
            size as i32
        })
        .sum()
}

impl Store {
    fn ensure_root(&mut self, root: FolderId) {
        self.folders.entry(root).or_insert_with(|| Folder {
            parent: None,
            children: BTreeSet::new(),
            messages: Vec::new(),
            properties: timestamp_properties(),
        });
    }

    fn folder(&self, fid: FolderId) -> Result<&Folder, Error> {
        self.folders.get(&fid).ok_or(Error::NotFound)
    }

    fn folder_mut(&mut self, fid: FolderId) -> Result<&mut Folder, Error> {
        self.folders.get_mut(&fid).ok_or(Error::NotFound)
    }

    fn message(&self, mid: MessageId) -> Result<&Message, Error> {
        self.messages.get(&mid).ok_or(Error::NotFound)
    }

    fn message_mut(&mut self, mid: MessageId) -> Result<&mut Message, Error> {
        self.messages.get_mut(&mid).ok_or(Error::NotFound)
    }

    fn attachment(
        &self,
        mid: MessageId,
        num: u32,
    ) -> Result<&Attachment, Error> {
        self.message(mid)?
            .attachments
            .iter()
            .find(|a| a.num == num)
            .ok_or(Error::NotFound)
    }

    fn attachment_mut(
        &mut self,
        mid: MessageId,
        num: u32,
    ) -> Result<&mut Attachment, Error> {
        self.message_mut(mid)?
            .attachments
            .iter_mut()
            .find(|a| a.num == num)
            .ok_or(Error::NotFound)
    }

    fn contents<'a>(
        &'a self,
        folder: &'a Folder,
        associated: bool,
    ) -> impl Iterator<Item = MessageId> + 'a {
        let messages = &self.messages;
        folder
            .messages
            .iter()
            .copied()
            .filter(move |mid| {
                messages.get(mid).map_or(false, |m| m.associated == associated)
            })
    }

    fn properties(&self, key: ObjectKey) -> Result<&Properties, Error> {
        match key {
            ObjectKey::Folder(fid) => Ok(&self.folder(fid)?.properties),
            ObjectKey::Message(mid) => Ok(&self.message(mid)?.properties),
            ObjectKey::Attachment(mid, num) => {
                Ok(&self.attachment(mid, num)?.properties)
            }
        }
    }

    fn properties_mut(
        &mut self,
        key: ObjectKey,
    ) -> Result<&mut Properties, Error> {
        match key {
            ObjectKey::Folder(fid) => Ok(&mut self.folder_mut(fid)?.properties),
            ObjectKey::Message(mid) => {
                Ok(&mut self.message_mut(mid)?.properties)
            }
            ObjectKey::Attachment(mid, num) => {
                Ok(&mut self.attachment_mut(mid, num)?.properties)
            }
        }
    }

    fn computed(&self, key: ObjectKey, tag: PropTag) -> Option<PropertyData> {
        let id = tag.id();
        let matches = |t: PropTag| t.id() == id;

        let value = match key {
            ObjectKey::Folder(fid) => {
                let folder = match self.folder(fid) {
                    Ok(folder) => folder,
                    Err(e) => return Some(Err(e)),
                };
                if matches(PropTag::FID) {
                    PropValue::I8(fid.0 as i64)
                } else if matches(PropTag::PARENT_FID) {
                    match folder.parent {
                        Some(parent) => PropValue::I8(parent.0 as i64),
                        None => return Some(Err(Error::NotFound)),
                    }
                } else if matches(PropTag::CONTENT_COUNT) {
                    PropValue::Long(self.contents(folder, false).count() as i32)
                } else if matches(PropTag::SUBFOLDERS) {
                    PropValue::Boolean(!folder.children.is_empty())
                } else if matches(PropTag::FOLDER_CHILD_COUNT) {
                    PropValue::Long(folder.children.len() as i32)
                } else {
                    return None;
                }
            }

            ObjectKey::Message(mid) => {
                let message = match self.message(mid) {
                    Ok(message) => message,
                    Err(e) => return Some(Err(e)),
                };
                if matches(PropTag::MID) || matches(PropTag::INST_ID) {
                    PropValue::I8(mid.0 as i64)
                } else if matches(PropTag::INSTANCE_NUM) {
                    PropValue::Long(0)
                } else if matches(PropTag::FID) || matches(PropTag::PARENT_FID)
                {
                    match message.folder {
                        Some(fid) => PropValue::I8(fid.0 as i64),
                        None => return Some(Err(Error::NotFound)),
                    }
                } else if matches(PropTag::MESSAGE_SIZE) {
                    PropValue::Long(
                        estimate_size(&message.properties)
                            + message
                                .attachments
                                .iter()
                                .map(|a| estimate_size(&a.properties))
                                .sum::<i32>(),
                    )
                } else {
                    return None;
                }
            }

            ObjectKey::Attachment(mid, num) => {
                if let Err(e) = self.attachment(mid, num) {
                    return Some(Err(e));
                }
                if matches(PropTag::ATTACH_NUM) {
                    PropValue::Long(num as i32)
                } else {
                    return None;
                }
            }
        };

        Some(Ok(value))
    }

    fn property(&self, key: ObjectKey, tag: PropTag) -> PropertyData {
        if let Some(data) = self.computed(key, tag) {
            return data;
        }

        lookup_stored(self.properties(key)?, tag)
    }

    fn available_properties(&self, key: ObjectKey) -> Result<Vec<PropTag>, Error> {
        let computed: &[PropTag] = match key {
            ObjectKey::Folder(_) => &[
                PropTag::FID,
                PropTag::PARENT_FID,
                PropTag::CONTENT_COUNT,
                PropTag::SUBFOLDERS,
                PropTag::FOLDER_CHILD_COUNT,
            ],
            ObjectKey::Message(_) => &[
                PropTag::FID,
                PropTag::MID,
                PropTag::INST_ID,
                PropTag::INSTANCE_NUM,
                PropTag::MESSAGE_SIZE,
            ],
            ObjectKey::Attachment(..) => &[PropTag::ATTACH_NUM],
        };

        let mut tags = computed
            .iter()
            .copied()
            .filter(|&tag| self.property(key, tag).is_ok())
            .collect::<Vec<_>>();
        tags.extend(self.properties(key)?.keys().copied());
        Ok(tags)
    }

    fn matches(&self, key: ObjectKey, restriction: &Restriction) -> bool {
        match *restriction {
            Restriction::And(ref parts) => {
                parts.iter().all(|r| self.matches(key, r))
            }
            Restriction::Or(ref parts) => {
                parts.iter().any(|r| self.matches(key, r))
            }
            Restriction::Not(ref inner) => !self.matches(key, inner),
            Restriction::Exist(tag) => self.property(key, tag).is_ok(),
            Restriction::Content {
                tag,
                ref value,
                level,
                ignore_case,
            } => {
                let haystack = match self.property(key, tag) {
                    Ok(PropValue::Unicode(s)) => s,
                    _ => return false,
                };
                let (haystack, needle) = if ignore_case {
                    (haystack.to_lowercase(), value.to_lowercase())
                } else {
                    (haystack, value.clone())
                };

                match level {
                    FuzzyLevel::FullString => haystack == needle,
                    FuzzyLevel::Substring => haystack.contains(&needle),
                    FuzzyLevel::Prefix => haystack.starts_with(&needle),
                }
            }
            Restriction::Property { op, tag, ref value } => {
                let ordering = match self
                    .property(key, tag)
                    .ok()
                    .and_then(|actual| actual.compare(value))
                {
                    Some(ordering) => ordering,
                    None => return false,
                };

                match op {
                    RelOp::Lt => Ordering::Less == ordering,
                    RelOp::Le => Ordering::Greater != ordering,
                    RelOp::Gt => Ordering::Greater == ordering,
                    RelOp::Ge => Ordering::Less != ordering,
                    RelOp::Eq => Ordering::Equal == ordering,
                    RelOp::Ne => Ordering::Equal != ordering,
                }
            }
        }
    }

    /// All rows of `table`, sorted, before restriction.
    fn rows(&self, table: &Table) -> Result<Vec<ObjectKey>, Error> {
        let mut rows = match (table.source, table.kind) {
            (TableSource::Folder(fid), TableKind::Folder) => self
                .folder(fid)?
                .children
                .iter()
                .copied()
                .map(ObjectKey::Folder)
                .collect::<Vec<_>>(),
            (TableSource::Folder(fid), TableKind::Message) => self
                .contents(self.folder(fid)?, false)
                .map(ObjectKey::Message)
                .collect(),
            (TableSource::Folder(fid), TableKind::Fai) => self
                .contents(self.folder(fid)?, true)
                .map(ObjectKey::Message)
                .collect(),
            (TableSource::Attachments(mid), _) => self
                .message(mid)?
                .attachments
                .iter()
                .map(|a| ObjectKey::Attachment(mid, a.num))
                .collect(),
            (TableSource::Folder(_), _) => Vec::new(),
        };

        if !table.sort.columns.is_empty() {
            rows.sort_by(|&a, &b| {
                for column in &table.sort.columns {
                    let va = self.property(a, column.tag).ok();
                    let vb = self.property(b, column.tag).ok();
                    // Rows lacking the property sort after those having it
                    let ordering = match (va, vb) {
                        (Some(va), Some(vb)) => {
                            va.compare(&vb).unwrap_or(Ordering::Equal)
                        }
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    };
                    let ordering = match column.direction {
                        SortDirection::Ascending => ordering,
                        SortDirection::Descending => ordering.reverse(),
                    };

                    if Ordering::Equal != ordering {
                        return ordering;
                    }
                }

                Ordering::Equal
            });
        }

        Ok(rows)
    }

    fn row_count(&self, table: &Table) -> Result<u32, Error> {
        let rows = self.rows(table)?;
        Ok(match table.restriction {
            None => rows.len(),
            Some(ref r) => rows.iter().filter(|&&k| self.matches(k, r)).count(),
        } as u32)
    }

    fn remove_folder(&mut self, fid: FolderId) {
        if let Some(folder) = self.folders.remove(&fid) {
            for mid in folder.messages {
                self.remove_message(mid);
            }
        }
    }

    fn remove_message(&mut self, mid: MessageId) {
        if let Some(message) = self.messages.remove(&mid) {
            for embedded in message.attachments.iter().filter_map(|a| a.embedded)
            {
                self.remove_message(embedded);
            }
        }
    }
}

impl MemoryContext {
    fn new(store: Arc<Mutex<Store>>, root: FolderId) -> Self {
        let mut this = MemoryContext {
            store,
            root: FolderHandle(0),
            objects: HashMap::new(),
            next_handle: 0,
        };
        this.root = FolderHandle(this.insert(Object::Folder(root)));
        this
    }

    fn insert(&mut self, object: Object) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(handle, object);
        handle
    }

    fn folder_id(&self, handle: FolderHandle) -> Result<FolderId, Error> {
        match self.objects.get(&handle.0) {
            Some(&Object::Folder(fid)) => Ok(fid),
            _ => Err(Error::InvalidParameter),
        }
    }

    fn message_id(&self, handle: MessageHandle) -> Result<MessageId, Error> {
        match self.objects.get(&handle.0) {
            Some(&Object::Message(mid)) => Ok(mid),
            _ => Err(Error::InvalidParameter),
        }
    }

    fn attachment_key(
        &self,
        handle: AttachmentHandle,
    ) -> Result<(MessageId, u32), Error> {
        match self.objects.get(&handle.0) {
            Some(&Object::Attachment(mid, num)) => Ok((mid, num)),
            _ => Err(Error::InvalidParameter),
        }
    }

    fn table(&self, handle: TableHandle) -> Result<&Table, Error> {
        match self.objects.get(&handle.0) {
            Some(&Object::Table(ref table)) => Ok(table),
            _ => Err(Error::InvalidParameter),
        }
    }

    fn table_mut(&mut self, handle: TableHandle) -> Result<&mut Table, Error> {
        match self.objects.get_mut(&handle.0) {
            Some(&mut Object::Table(ref mut table)) => Ok(table),
            _ => Err(Error::InvalidParameter),
        }
    }

    fn object_key(&self, object: ObjectHandle) -> Result<ObjectKey, Error> {
        match object {
            ObjectHandle::Folder(h) => self.folder_id(h).map(ObjectKey::Folder),
            ObjectHandle::Message(h) => {
                self.message_id(h).map(ObjectKey::Message)
            }
            ObjectHandle::Attachment(h) => self
                .attachment_key(h)
                .map(|(mid, num)| ObjectKey::Attachment(mid, num)),
            ObjectHandle::Table(_) => Err(Error::InvalidParameter),
        }
    }

    fn open_table_on(
        &mut self,
        source: TableSource,
        kind: TableKind,
    ) -> Result<(TableHandle, u32), Error> {
        let table = Table {
            source,
            kind,
            columns: Vec::new(),
            restriction: None,
            sort: SortOrderSet::default(),
        };
        let count = self.store.lock().unwrap().row_count(&table)?;
        let handle = TableHandle(self.insert(Object::Table(table)));
        Ok((handle, count))
    }
}

impl StoreContext for MemoryContext {
    fn root_folder(&self) -> FolderHandle {
        self.root
    }

    fn release(&mut self) -> Result<(), Error> {
        if self.objects.len() > 1 {
            debug!(
                "Memory context still has {} open objects",
                self.objects.len() - 1
            );
            return Err(Error::RefCount);
        }

        Ok(())
    }

    fn release_object(&mut self, object: ObjectHandle) {
        let handle = match object {
            ObjectHandle::Folder(h) => h.0,
            ObjectHandle::Message(h) => h.0,
            ObjectHandle::Attachment(h) => h.0,
            ObjectHandle::Table(h) => h.0,
        };

        if handle != self.root.0 {
            self.objects.remove(&handle);
        }
    }

    fn open_folder(
        &mut self,
        parent: FolderHandle,
        fid: FolderId,
    ) -> Result<FolderHandle, Error> {
        self.folder_id(parent)?;
        self.store.lock().unwrap().folder(fid)?;
        Ok(FolderHandle(self.insert(Object::Folder(fid))))
    }

    fn create_folder(
        &mut self,
        parent: FolderHandle,
        fid: FolderId,
        properties: &[PropertyValue],
    ) -> Result<FolderHandle, Error> {
        let parent = self.folder_id(parent)?;
        {
            let mut store = self.store.lock().unwrap();
            if store.folders.contains_key(&fid) {
                return Err(Error::Exists);
            }

            let name = properties
                .iter()
                .find(|p| p.tag.id() == PropTag::DISPLAY_NAME.id())
                .and_then(|p| p.value.as_str());
            let parent_folder = store.folder(parent)?;
            if let Some(name) = name {
                let collides = parent_folder.children.iter().any(|child| {
                    store
                        .property(ObjectKey::Folder(*child), PropTag::DISPLAY_NAME)
                        .ok()
                        .as_ref()
                        .and_then(PropValue::as_str)
                        == Some(name)
                });
                if collides {
                    return Err(Error::Exists);
                }
            }

            let mut folder_properties = timestamp_properties();
            for p in properties.iter().filter(|p| !is_computed(p.tag)) {
                folder_properties.insert(p.tag, p.value.clone());
            }

            store.folder_mut(parent)?.children.insert(fid);
            store.folders.insert(
                fid,
                Folder {
                    parent: Some(parent),
                    children: BTreeSet::new(),
                    messages: Vec::new(),
                    properties: folder_properties,
                },
            );
        }

        Ok(FolderHandle(self.insert(Object::Folder(fid))))
    }

    fn delete_folder(
        &mut self,
        parent: FolderHandle,
        fid: FolderId,
    ) -> Result<(), Error> {
        let parent = self.folder_id(parent)?;
        let mut store = self.store.lock().unwrap();
        if !store.folder(parent)?.children.contains(&fid) {
            return Err(Error::NotFound);
        }
        if !store.folder(fid)?.children.is_empty() {
            return Err(Error::Exists);
        }

        store.folder_mut(parent)?.children.remove(&fid);
        store.remove_folder(fid);
        Ok(())
    }

    fn get_child_fids(
        &mut self,
        folder: FolderHandle,
    ) -> Result<Vec<FolderId>, Error> {
        let fid = self.folder_id(folder)?;
        let store = self.store.lock().unwrap();
        Ok(store.folder(fid)?.children.iter().copied().collect())
    }

    fn get_child_count(
        &mut self,
        folder: FolderHandle,
        kind: TableKind,
    ) -> Result<u32, Error> {
        let fid = self.folder_id(folder)?;
        let store = self.store.lock().unwrap();
        let folder = store.folder(fid)?;
        Ok(match kind {
            TableKind::Folder => folder.children.len(),
            TableKind::Message => store.contents(folder, false).count(),
            TableKind::Fai => store.contents(folder, true).count(),
            TableKind::Rule | TableKind::Permissions => 0,
            TableKind::Attachment => return Err(Error::InvalidParameter),
        } as u32)
    }

    fn open_table(
        &mut self,
        folder: FolderHandle,
        kind: TableKind,
    ) -> Result<(TableHandle, u32), Error> {
        if TableKind::Attachment == kind {
            return Err(Error::InvalidParameter);
        }

        let fid = self.folder_id(folder)?;
        self.open_table_on(TableSource::Folder(fid), kind)
    }

    fn open_message(
        &mut self,
        folder: FolderHandle,
        mid: MessageId,
    ) -> Result<MessageHandle, Error> {
        let fid = self.folder_id(folder)?;
        {
            let store = self.store.lock().unwrap();
            let message = store.message(mid)?;
            if !message.saved || message.folder != Some(fid) {
                return Err(Error::NotFound);
            }
        }

        Ok(MessageHandle(self.insert(Object::Message(mid))))
    }

    fn create_message(
        &mut self,
        folder: FolderHandle,
        mid: MessageId,
        associated: bool,
    ) -> Result<MessageHandle, Error> {
        let fid = self.folder_id(folder)?;
        {
            let mut store = self.store.lock().unwrap();
            store.folder(fid)?;
            if store.messages.contains_key(&mid) {
                return Err(Error::Exists);
            }

            let mut properties = timestamp_properties();
            properties.insert(
                PropTag::MESSAGE_FLAGS,
                PropValue::Long(MSGFLAG_UNSENT | MSGFLAG_READ),
            );
            store.messages.insert(
                mid,
                Message {
                    folder: Some(fid),
                    associated,
                    saved: false,
                    properties,
                    recipients: Vec::new(),
                    attachments: Vec::new(),
                    next_attach_num: 0,
                },
            );
        }

        Ok(MessageHandle(self.insert(Object::Message(mid))))
    }

    fn delete_message(
        &mut self,
        folder: FolderHandle,
        mid: MessageId,
        mode: MessageDeleteMode,
    ) -> Result<(), Error> {
        let fid = self.folder_id(folder)?;
        let mut store = self.store.lock().unwrap();
        let folder = store.folder_mut(fid)?;
        let before = folder.messages.len();
        folder.messages.retain(|&m| m != mid);
        if folder.messages.len() == before {
            return Err(Error::NotFound);
        }

        match mode {
            // Soft-deleted messages remain openable by handle but are no
            // longer listed in the folder.
            MessageDeleteMode::Soft => {
                store.message_mut(mid)?.saved = false;
            }
            MessageDeleteMode::Permanent => store.remove_message(mid),
        }

        Ok(())
    }

    fn modify_recipients(
        &mut self,
        message: MessageHandle,
        rows: &[RecipientRow],
    ) -> Result<(), Error> {
        let mid = self.message_id(message)?;
        let mut store = self.store.lock().unwrap();
        let message = store.message_mut(mid)?;
        for row in rows {
            message.recipients.retain(|r| r.row_id != row.row_id);
            if !row.properties.is_empty() {
                message.recipients.push(row.clone());
            }
        }
        message.recipients.sort_by_key(|r| r.row_id);
        Ok(())
    }

    fn save_message(&mut self, message: MessageHandle) -> Result<(), Error> {
        let mid = self.message_id(message)?;
        let mut store = self.store.lock().unwrap();
        let message = store.message_mut(mid)?;
        message.properties.insert(
            PropTag::LAST_MODIFICATION_TIME,
            PropValue::SysTime(Utc::now()),
        );
        if message.saved {
            return Ok(());
        }

        message.saved = true;
        if let Some(fid) = message.folder {
            store.folder_mut(fid)?.messages.push(mid);
        }
        Ok(())
    }

    fn submit_message(
        &mut self,
        message: MessageHandle,
        flags: SubmitFlags,
    ) -> Result<(), Error> {
        let mid = self.message_id(message)?;
        let mut store = self.store.lock().unwrap();
        let message = store.message_mut(mid)?;
        if message.recipients.is_empty() {
            return Err(Error::InvalidParameter);
        }

        let mut msg_flags = match message.properties.get(&PropTag::MESSAGE_FLAGS)
        {
            Some(&PropValue::Long(f)) => f,
            _ => 0,
        };
        msg_flags |= MSGFLAG_SUBMIT;
        if !flags.contains(SubmitFlags::NEEDS_SPOOLER) {
            msg_flags &= !MSGFLAG_UNSENT;
        }
        message
            .properties
            .insert(PropTag::MESSAGE_FLAGS, PropValue::Long(msg_flags));
        Ok(())
    }

    fn get_attachment_table(
        &mut self,
        message: MessageHandle,
    ) -> Result<(TableHandle, u32), Error> {
        let mid = self.message_id(message)?;
        self.open_table_on(TableSource::Attachments(mid), TableKind::Attachment)
    }

    fn open_attachment(
        &mut self,
        message: MessageHandle,
        attach_num: u32,
    ) -> Result<AttachmentHandle, Error> {
        let mid = self.message_id(message)?;
        self.store.lock().unwrap().attachment(mid, attach_num)?;
        Ok(AttachmentHandle(
            self.insert(Object::Attachment(mid, attach_num)),
        ))
    }

    fn create_attachment(
        &mut self,
        message: MessageHandle,
    ) -> Result<(AttachmentHandle, u32), Error> {
        let mid = self.message_id(message)?;
        let num = {
            let mut store = self.store.lock().unwrap();
            let message = store.message_mut(mid)?;
            let num = message.next_attach_num;
            message.next_attach_num += 1;

            let mut properties = Properties::new();
            properties
                .insert(PropTag::ATTACH_METHOD, PropValue::Long(ATTACH_BY_VALUE));
            message.attachments.push(Attachment {
                num,
                properties,
                embedded: None,
            });
            num
        };

        Ok((
            AttachmentHandle(self.insert(Object::Attachment(mid, num))),
            num,
        ))
    }

    fn open_embedded_message(
        &mut self,
        attachment: AttachmentHandle,
    ) -> Result<(MessageHandle, MessageId), Error> {
        let (parent, num) = self.attachment_key(attachment)?;
        let mid = {
            let mut store = self.store.lock().unwrap();
            let existing = store.attachment(parent, num)?.embedded;
            match existing {
                Some(mid) => mid,
                None => {
                    let mid = MessageId(u64::MAX - store.embedded_mids);
                    store.embedded_mids += 1;

                    let mut properties = timestamp_properties();
                    properties.insert(
                        PropTag::MESSAGE_FLAGS,
                        PropValue::Long(MSGFLAG_UNSENT | MSGFLAG_READ),
                    );
                    store.messages.insert(
                        mid,
                        Message {
                            folder: None,
                            associated: false,
                            saved: true,
                            properties,
                            recipients: Vec::new(),
                            attachments: Vec::new(),
                            next_attach_num: 0,
                        },
                    );

                    let attachment = store.attachment_mut(parent, num)?;
                    attachment.embedded = Some(mid);
                    attachment.properties.insert(
                        PropTag::ATTACH_METHOD,
                        PropValue::Long(ATTACH_EMBEDDED_MSG),
                    );
                    mid
                }
            }
        };

        Ok((MessageHandle(self.insert(Object::Message(mid))), mid))
    }

    fn set_columns(
        &mut self,
        table: TableHandle,
        columns: &[PropTag],
    ) -> Result<(), Error> {
        self.table_mut(table)?.columns = columns.to_vec();
        Ok(())
    }

    fn set_restrictions(
        &mut self,
        table: TableHandle,
        restriction: Option<&Restriction>,
    ) -> Result<TableStatus, Error> {
        self.table_mut(table)?.restriction = restriction.cloned();
        Ok(TableStatus::Complete)
    }

    fn set_sort_order(
        &mut self,
        table: TableHandle,
        order: &SortOrderSet,
    ) -> Result<TableStatus, Error> {
        self.table_mut(table)?.sort = order.clone();
        Ok(TableStatus::Complete)
    }

    fn get_row(
        &mut self,
        table: TableHandle,
        query: QueryType,
        row: u32,
    ) -> Result<Vec<PropertyData>, Error> {
        let table = self.table(table)?;
        let store = self.store.lock().unwrap();
        let rows = store.rows(table)?;

        let key = match (query, table.restriction.as_ref()) {
            (_, None) => rows.get(row as usize).copied(),
            (QueryType::Prefiltered, Some(r)) => rows
                .iter()
                .copied()
                .filter(|&k| store.matches(k, r))
                .nth(row as usize),
            (QueryType::LiveFiltered, Some(r)) => rows
                .get(row as usize)
                .copied()
                .filter(|&k| store.matches(k, r)),
        }
        .ok_or(Error::NotFound)?;

        Ok(table
            .columns
            .iter()
            .map(|&tag| store.property(key, tag))
            .collect())
    }

    fn get_available_properties(
        &mut self,
        object: ObjectHandle,
    ) -> Result<Vec<PropTag>, Error> {
        if let ObjectHandle::Table(h) = object {
            let table = self.table(h)?;
            let store = self.store.lock().unwrap();
            let mut tags = BTreeSet::new();
            for key in store.rows(table)? {
                tags.extend(store.available_properties(key)?);
            }
            return Ok(tags.into_iter().collect());
        }

        let key = self.object_key(object)?;
        self.store.lock().unwrap().available_properties(key)
    }

    fn get_properties(
        &mut self,
        object: ObjectHandle,
        tags: &[PropTag],
    ) -> Result<Vec<PropertyData>, Error> {
        let key = self.object_key(object)?;
        let store = self.store.lock().unwrap();
        store.properties(key)?;
        Ok(tags.iter().map(|&tag| store.property(key, tag)).collect())
    }

    fn set_properties(
        &mut self,
        object: ObjectHandle,
        values: &[PropertyValue],
    ) -> Result<(), Error> {
        if values.iter().any(|v| is_computed(v.tag)) {
            return Err(Error::InvalidParameter);
        }

        let key = self.object_key(object)?;
        let mut store = self.store.lock().unwrap();
        let properties = store.properties_mut(key)?;
        for v in values {
            properties.insert(v.tag, v.value.clone());
        }
        properties.insert(
            PropTag::LAST_MODIFICATION_TIME,
            PropValue::SysTime(Utc::now()),
        );
        Ok(())
    }
}
