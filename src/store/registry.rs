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

//! The context registry.
//!
//! The registry owns every live backend context. Contexts are addressed by a
//! `ContextId` whose index is allocated densely: indices of deleted contexts
//! go onto a free list and are handed out again (oldest first) before the id
//! space grows.
//!
//! All bookkeeping (id allocation, reference counts, indexing associations)
//! happens under a single registry lock. Calls into backends never happen
//! while that lock is held; each context has its own lock which serialises
//! calls into that context alone.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use super::backend::{BackendRegistry, StoreContext};
use super::model::*;
use crate::support::error::Error;
use crate::support::system_config::StoreConfig;

pub struct ContextRegistry {
    backends: BackendRegistry,
    max_contexts: Option<u32>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    slots: Vec<Slot>,
    free_list: VecDeque<u32>,
    indexing: HashMap<String, IndexingRecord>,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    context: Option<LiveContext>,
}

struct LiveContext {
    uri: String,
    ref_count: u32,
    /// Set while the backend is being asked to release the context. The
    /// context cannot be looked up or referenced in this state.
    releasing: bool,
    /// The user whose indexing record this context is bound to.
    indexing: Option<String>,
    binding: Arc<ContextBinding>,
}

/// What the dispatch layer needs to call into a context.
pub(super) struct ContextBinding {
    pub(super) root: FolderHandle,
    pub(super) backend: Mutex<Box<dyn StoreContext>>,
}

/// Per-user indexing state shared by every context bound to that user's
/// mailbox.
struct IndexingRecord {
    ref_count: u32,
}

/// A snapshot of the registry's view of a context.
#[derive(Clone, Debug)]
pub struct ContextInfo {
    pub id: ContextId,
    pub uri: String,
    pub ref_count: u32,
    pub root: FolderHandle,
    pub indexing: Option<String>,
}

/// The result of a successful `delete_context` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The context is gone and its id may be reused.
    Removed,
    /// Other references remain; the context was not removed.
    StillReferenced,
}

impl ContextRegistry {
    pub fn new(backends: BackendRegistry) -> Self {
        ContextRegistry {
            backends,
            max_contexts: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Builds the registry and its backends from configuration.
    pub fn from_config(config: &StoreConfig) -> Result<Self, Error> {
        let mut this = Self::new(BackendRegistry::from_config(config)?);
        this.max_contexts = config.max_contexts;
        for user in &config.indexing_users {
            this.open_indexing(user);
        }
        Ok(this)
    }

    pub fn with_max_contexts(mut self, max_contexts: u32) -> Self {
        self.max_contexts = Some(max_contexts);
        self
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Registers a new context for `uri`, whose root folder is `root`.
    ///
    /// The URI must be well-formed and name a registered namespace
    /// (`InvalidNamespace` otherwise). If the backend refuses to create the
    /// context, or no context id is available, fails with
    /// `ContextCreationFailed`.
    ///
    /// The new context starts with a reference count of 1.
    pub fn add_context(
        &self,
        uri: &str,
        root: FolderId,
    ) -> Result<ContextId, Error> {
        let parsed = ContextUri::parse(uri).map_err(|e| {
            warn!("Rejecting invalid context URI '{}'", uri);
            e
        })?;
        let backend = self.backends.get(parsed.namespace).ok_or_else(|| {
            warn!("No backend registered for namespace of '{}'", uri);
            Error::InvalidNamespace
        })?;

        let mut context =
            backend.create_context(parsed.payload, root).map_err(|e| {
                warn!("Backend failed to create context for '{}': {}", uri, e);
                Error::ContextCreationFailed
            })?;

        let binding = Arc::new(ContextBinding {
            root: context.root_folder(),
            backend: Mutex::new(context),
        });

        let id = {
            let mut inner = self.inner.lock().unwrap();
            inner.allocate(self.max_contexts).map(|id| {
                inner.slots[id.index as usize].context = Some(LiveContext {
                    uri: uri.to_owned(),
                    ref_count: 1,
                    releasing: false,
                    indexing: None,
                    binding: Arc::clone(&binding),
                });
                id
            })
        };

        match id {
            Some(id) => {
                info!("Added context {} for '{}'", id, uri);
                Ok(id)
            }
            None => {
                warn!("Context id space exhausted; cannot add '{}'", uri);
                context = match Arc::try_unwrap(binding) {
                    Ok(binding) => binding.backend.into_inner().unwrap(),
                    Err(_) => return Err(Error::ContextCreationFailed),
                };
                if let Err(e) = context.release() {
                    warn!("Releasing orphaned context for '{}': {}", uri, e);
                }
                Err(Error::ContextCreationFailed)
            }
        }
    }

    /// Looks up a live context by id.
    pub fn lookup_by_id(&self, id: ContextId) -> Result<ContextInfo, Error> {
        let inner = self.inner.lock().unwrap();
        inner
            .live(id)
            .map(|live| live.info(id))
            .ok_or(Error::InvalidParameter)
    }

    /// Looks up the first live context registered for exactly `uri`.
    pub fn lookup_by_uri(&self, uri: &str) -> Result<ContextInfo, Error> {
        let inner = self.inner.lock().unwrap();
        let info = inner
            .iter_live()
            .find(|&(_, live)| live.uri == uri)
            .map(|(id, live)| live.info(id));
        info.ok_or(Error::NotFound)
    }

    /// Increments the reference count of a context, returning the new count.
    pub fn add_ref(&self, id: ContextId) -> Result<u32, Error> {
        let mut inner = self.inner.lock().unwrap();
        let live = inner.live_mut(id).ok_or(Error::InvalidParameter)?;
        live.ref_count += 1;
        debug!("Context {} reference count now {}", id, live.ref_count);
        Ok(live.ref_count)
    }

    /// Drops one reference to a context.
    ///
    /// When the last reference is dropped, the backend is asked to release
    /// the context. If it reports that the context is still referenced, the
    /// context stays registered and `StillReferenced` is returned, as it is
    /// when other references remain. Otherwise the context is removed and
    /// its index returns to the free list.
    pub fn delete_context(&self, id: ContextId) -> Result<DeleteOutcome, Error> {
        let binding = {
            let mut inner = self.inner.lock().unwrap();
            let live = inner.live_mut(id).ok_or(Error::InvalidParameter)?;
            live.ref_count -= 1;
            if live.ref_count > 0 {
                debug!(
                    "Context {} still has {} references",
                    id, live.ref_count
                );
                return Ok(DeleteOutcome::StillReferenced);
            }

            live.releasing = true;
            Arc::clone(&live.binding)
        };

        let result = binding.backend.lock().unwrap().release();

        let mut inner = self.inner.lock().unwrap();
        match result {
            Ok(()) => {
                inner.remove(id);
                info!("Deleted context {}", id);
                Ok(DeleteOutcome::Removed)
            }
            Err(e) => {
                let live = inner
                    .slots
                    .get_mut(id.index as usize)
                    .and_then(|slot| slot.context.as_mut())
                    .ok_or(Error::InvalidParameter)?;
                live.releasing = false;
                live.ref_count = 1;

                if let Error::RefCount = e {
                    debug!("Backend still references context {}", id);
                    Ok(DeleteOutcome::StillReferenced)
                } else {
                    warn!("Backend failed to release context {}: {}", id, e);
                    Err(e)
                }
            }
        }
    }

    /// Creates the indexing record for `username` if it does not exist yet.
    pub fn open_indexing(&self, username: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .indexing
            .entry(username.to_owned())
            .or_insert_with(|| {
                debug!("Created indexing record for {}", username);
                IndexingRecord { ref_count: 0 }
            });
    }

    /// Binds the indexing record of `username` to a context.
    ///
    /// Does nothing if the context is already bound to a record. The record
    /// must already exist.
    pub fn associate_indexing(
        &self,
        username: &str,
        id: ContextId,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;

        let live = inner
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.context.as_mut())
            .filter(|live| !live.releasing)
            .ok_or(Error::InvalidParameter)?;
        if live.indexing.is_some() {
            return Ok(());
        }

        let record = inner
            .indexing
            .get_mut(username)
            .ok_or(Error::InvalidParameter)?;
        record.ref_count += 1;
        live.indexing = Some(username.to_owned());
        debug!("Context {} bound to indexing record of {}", id, username);
        Ok(())
    }

    /// The number of contexts bound to the indexing record of `username`, or
    /// `None` if there is no such record.
    pub fn indexing_ref_count(&self, username: &str) -> Option<u32> {
        let inner = self.inner.lock().unwrap();
        inner.indexing.get(username).map(|r| r.ref_count)
    }

    /// The number of live contexts.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.iter_live().count()
    }

    pub fn is_empty(&self) -> bool {
        0 == self.len()
    }

    pub(super) fn binding(
        &self,
        id: ContextId,
    ) -> Result<Arc<ContextBinding>, Error> {
        let inner = self.inner.lock().unwrap();
        inner
            .live(id)
            .map(|live| Arc::clone(&live.binding))
            .ok_or(Error::InvalidParameter)
    }
}

impl Inner {
    fn allocate(&mut self, max_contexts: Option<u32>) -> Option<ContextId> {
        if let Some(index) = self.free_list.pop_front() {
            let generation = self.slots[index as usize].generation;
            return Some(ContextId { index, generation });
        }

        let index = self.slots.len() as u32;
        if max_contexts.map_or(false, |max| index >= max) || u32::MAX == index
        {
            return None;
        }

        self.slots.push(Slot::default());
        Some(ContextId {
            index,
            generation: 0,
        })
    }

    fn live(&self, id: ContextId) -> Option<&LiveContext> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.context.as_ref())
            .filter(|live| !live.releasing)
    }

    fn live_mut(&mut self, id: ContextId) -> Option<&mut LiveContext> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.context.as_mut())
            .filter(|live| !live.releasing)
    }

    fn iter_live(&self) -> impl Iterator<Item = (ContextId, &LiveContext)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.context
                .as_ref()
                .filter(|live| !live.releasing)
                .map(|live| {
                    (
                        ContextId {
                            index: index as u32,
                            generation: slot.generation,
                        },
                        live,
                    )
                })
        })
    }

    fn remove(&mut self, id: ContextId) {
        let slot = &mut self.slots[id.index as usize];
        let live = match slot.context.take() {
            Some(live) => live,
            None => return,
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push_back(id.index);

        if let Some(username) = live.indexing {
            let destroy = match self.indexing.get_mut(&username) {
                Some(record) => {
                    record.ref_count -= 1;
                    0 == record.ref_count
                }
                None => false,
            };
            if destroy {
                debug!("Destroyed indexing record for {}", username);
                self.indexing.remove(&username);
            }
        }
    }
}

impl LiveContext {
    fn info(&self, id: ContextId) -> ContextInfo {
        ContextInfo {
            id,
            uri: self.uri.clone(),
            ref_count: self.ref_count,
            root: self.binding.root,
            indexing: self.indexing.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use proptest::prelude::*;
    use rayon::prelude::*;

    use super::super::test_prelude::*;
    use super::*;

    #[test]
    fn first_context_gets_id_zero() {
        let registry = set_up();
        let id = registry
            .add_context("mstore://tmp/maildir", FolderId(42))
            .unwrap();
        assert_eq!(0, id.index());

        let info = registry.lookup_by_id(id).unwrap();
        assert_eq!("mstore://tmp/maildir", info.uri);
        assert_eq!(1, info.ref_count);
        assert_eq!(None, info.indexing);
    }

    #[test]
    fn invalid_uris_are_rejected() {
        let registry = set_up();
        assert_matches!(
            Err(Error::InvalidNamespace),
            registry.add_context("bad_uri", FolderId(1))
        );
        assert_matches!(
            Err(Error::InvalidNamespace),
            registry.add_context("mstore:/x", FolderId(1))
        );
        assert_matches!(
            Err(Error::InvalidNamespace),
            registry.add_context("nosuch://x", FolderId(1))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn backend_refusal_fails_creation() {
        let registry = set_up();
        assert_matches!(
            Err(Error::ContextCreationFailed),
            registry.add_context("mstore://has space", FolderId(1))
        );
        assert!(registry.is_empty());

        // The refusal did not consume an id
        let id = registry.add_context("mstore://ok", FolderId(1)).unwrap();
        assert_eq!(0, id.index());
    }

    #[test]
    fn lookup_round_trip() {
        let registry = set_up();
        let a = registry.add_context("mstore://a", FolderId(1)).unwrap();
        let b = registry.add_context("mstore://b", FolderId(2)).unwrap();
        assert_ne!(a, b);

        assert_eq!(a, registry.lookup_by_uri("mstore://a").unwrap().id);
        assert_eq!(b, registry.lookup_by_uri("mstore://b").unwrap().id);
        assert_matches!(
            Err(Error::NotFound),
            registry.lookup_by_uri("mstore://c")
        );

        assert_eq!(
            DeleteOutcome::Removed,
            registry.delete_context(a).unwrap()
        );
        assert_matches!(Err(Error::InvalidParameter), registry.lookup_by_id(a));
        assert_matches!(
            Err(Error::NotFound),
            registry.lookup_by_uri("mstore://a")
        );
        assert!(registry.lookup_by_id(b).is_ok());
    }

    #[test]
    fn reference_counting() {
        let registry = set_up();
        let id = registry.add_context("mstore://a", FolderId(1)).unwrap();
        assert_eq!(2, registry.add_ref(id).unwrap());
        assert_eq!(3, registry.add_ref(id).unwrap());

        assert_eq!(
            DeleteOutcome::StillReferenced,
            registry.delete_context(id).unwrap()
        );
        assert_eq!(
            DeleteOutcome::StillReferenced,
            registry.delete_context(id).unwrap()
        );
        assert_eq!(1, registry.lookup_by_id(id).unwrap().ref_count);
        assert_eq!(
            DeleteOutcome::Removed,
            registry.delete_context(id).unwrap()
        );

        assert_matches!(Err(Error::InvalidParameter), registry.add_ref(id));
        assert_matches!(
            Err(Error::InvalidParameter),
            registry.delete_context(id)
        );
    }

    #[test]
    fn ids_are_reused_oldest_first() {
        let registry = set_up();
        let ids = (0..4)
            .map(|i| {
                registry
                    .add_context(&format!("mstore://{}", i), FolderId(i))
                    .unwrap()
            })
            .collect::<Vec<_>>();
        assert_eq!(
            vec![0, 1, 2, 3],
            ids.iter().map(|id| id.index()).collect::<Vec<_>>()
        );

        registry.delete_context(ids[2]).unwrap();
        registry.delete_context(ids[0]).unwrap();

        let c = registry.add_context("mstore://x", FolderId(9)).unwrap();
        let d = registry.add_context("mstore://y", FolderId(9)).unwrap();
        let e = registry.add_context("mstore://z", FolderId(9)).unwrap();
        assert_eq!(2, c.index());
        assert_eq!(0, d.index());
        assert_eq!(4, e.index());
    }

    #[test]
    fn stale_ids_do_not_alias_reused_slots() {
        let registry = set_up();
        let old = registry.add_context("mstore://a", FolderId(1)).unwrap();
        registry.delete_context(old).unwrap();
        let new = registry.add_context("mstore://b", FolderId(1)).unwrap();

        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_matches!(
            Err(Error::InvalidParameter),
            registry.lookup_by_id(old)
        );
        assert_matches!(Err(Error::InvalidParameter), registry.add_ref(old));
        assert_matches!(
            Err(Error::InvalidParameter),
            registry.delete_context(old)
        );
        assert_eq!(1, registry.lookup_by_id(new).unwrap().ref_count);
    }

    #[test]
    fn capacity_limit() {
        let registry = set_up().with_max_contexts(2);
        let a = registry.add_context("mstore://a", FolderId(1)).unwrap();
        registry.add_context("mstore://b", FolderId(1)).unwrap();
        assert_matches!(
            Err(Error::ContextCreationFailed),
            registry.add_context("mstore://c", FolderId(1))
        );

        registry.delete_context(a).unwrap();
        registry.add_context("mstore://c", FolderId(1)).unwrap();
    }

    #[test]
    fn backend_can_veto_release() {
        let registry = set_up();
        let id = registry.add_context("mstore://a", FolderId(1)).unwrap();
        let root = registry.lookup_by_id(id).unwrap().root;
        let folder = registry
            .create_folder(id, root, FolderId(2), &[])
            .unwrap();

        // The backend refuses while the folder is still open
        assert_eq!(
            DeleteOutcome::StillReferenced,
            registry.delete_context(id).unwrap()
        );
        let info = registry.lookup_by_id(id).unwrap();
        assert_eq!(1, info.ref_count);

        registry
            .release_object(id, ObjectHandle::Folder(folder))
            .unwrap();
        assert_eq!(
            DeleteOutcome::Removed,
            registry.delete_context(id).unwrap()
        );
    }

    #[test]
    fn indexing_association() {
        let registry = set_up();
        let a = registry.add_context("mstore://a", FolderId(1)).unwrap();
        let b = registry.add_context("mstore://b", FolderId(1)).unwrap();

        assert_matches!(
            Err(Error::InvalidParameter),
            registry.associate_indexing("jdoe", a)
        );
        assert_eq!(None, registry.indexing_ref_count("jdoe"));

        registry.open_indexing("jdoe");
        assert_eq!(Some(0), registry.indexing_ref_count("jdoe"));

        registry.associate_indexing("jdoe", a).unwrap();
        registry.associate_indexing("jdoe", a).unwrap();
        assert_eq!(Some(1), registry.indexing_ref_count("jdoe"));
        registry.associate_indexing("jdoe", b).unwrap();
        assert_eq!(Some(2), registry.indexing_ref_count("jdoe"));
        assert_eq!(
            Some("jdoe".to_owned()),
            registry.lookup_by_id(a).unwrap().indexing
        );

        // Already bound, so binding to another user is a no-op
        registry.open_indexing("other");
        registry.associate_indexing("other", a).unwrap();
        assert_eq!(Some(0), registry.indexing_ref_count("other"));

        assert_matches!(
            Err(Error::InvalidParameter),
            registry.associate_indexing("jdoe", ContextId {
                index: 99,
                generation: 0,
            })
        );

        registry.delete_context(a).unwrap();
        assert_eq!(Some(1), registry.indexing_ref_count("jdoe"));
        registry.delete_context(b).unwrap();
        assert_eq!(None, registry.indexing_ref_count("jdoe"));
    }

    #[test]
    fn concurrent_sessions_get_unique_ids() {
        let registry = set_up();
        registry.open_indexing("shared");

        let ids = (0..64u64)
            .into_par_iter()
            .map(|i| {
                let id = registry
                    .add_context(&format!("mstore://user{}", i), FolderId(i))
                    .unwrap();
                registry.associate_indexing("shared", id).unwrap();
                registry.add_ref(id).unwrap();
                registry.delete_context(id).unwrap();
                id
            })
            .collect::<Vec<_>>();

        let indices = ids.iter().map(|id| id.index()).collect::<HashSet<_>>();
        assert_eq!(64, indices.len());
        assert_eq!(Some(64), registry.indexing_ref_count("shared"));

        ids.par_iter().for_each(|&id| {
            assert_eq!(
                DeleteOutcome::Removed,
                registry.delete_context(id).unwrap()
            );
        });
        assert!(registry.is_empty());
        assert_eq!(None, registry.indexing_ref_count("shared"));
    }

    #[test]
    fn backend_calls_happen_outside_registry_lock() {
        let registry = Arc::new(set_up());
        let id = registry.add_context("mstore://a", FolderId(1)).unwrap();
        let root = registry.lookup_by_id(id).unwrap().root;
        let observed = AtomicBool::new(false);

        // While the context's own lock is held by a backend call, the
        // registry must remain usable.
        registry
            .with_context(id, |_| {
                let other =
                    registry.add_context("mstore://b", FolderId(2)).unwrap();
                registry.lookup_by_id(other).unwrap();
                observed.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert!(observed.load(Ordering::SeqCst));
        registry.get_child_count(id, root, TableKind::Folder).unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        #[test]
        fn live_ids_are_always_unique(ops in prop::collection::vec(
            (any::<bool>(), 0usize..8), 1..64
        )) {
            let registry = set_up();
            let mut live: Vec<ContextId> = Vec::new();

            for (add, victim) in ops {
                if add || live.is_empty() {
                    let id = registry
                        .add_context("mstore://p", FolderId(1))
                        .unwrap();
                    prop_assert!(live.iter().all(|l| l.index() != id.index()));
                    live.push(id);
                } else {
                    let id = live.remove(victim % live.len());
                    prop_assert_eq!(
                        DeleteOutcome::Removed,
                        registry.delete_context(id).unwrap()
                    );
                }
            }

            prop_assert_eq!(live.len(), registry.len());
        }
    }
}
