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

//! The table cursor engine.
//!
//! A `TableObject` tracks a cursor over the rows of one backend table: the
//! current offset (`numerator`), the row count (`denominator`), the column
//! projection, and the sort and restriction that have been applied. The
//! operations here are the only things that move the cursor.
//!
//! Every operation produces a complete reply, including on failure.

use log::{debug, warn};

use super::defs::*;
use super::rows::fetch_row;
use crate::store::model::*;
use crate::store::registry::ContextRegistry;
use crate::support::log_prefix::LogPrefix;

/// The object whose children a table lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableParent {
    Folder(FolderId),
    Message(MessageId),
}

/// The backend table a `TableObject` reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableBinding {
    pub context: ContextId,
    pub handle: TableHandle,
}

/// The configuration state of a table.
///
/// Whether a restriction has been requested is tracked separately (see
/// `TableObject::restricted`), since `Restrict` on a table without columns
/// is legal and does not make it readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableState {
    /// No columns set. Rows cannot be read.
    Unprojected,
    /// Columns set, no restriction applied.
    Projected,
    /// Columns set and a restriction applied.
    Restricted,
    /// The backend reported that the last sort is still in progress.
    SortPending,
}

impl TableState {
    fn after_set_columns(self) -> Self {
        match self {
            TableState::Unprojected => TableState::Projected,
            s => s,
        }
    }

    fn after_restrict(self) -> Self {
        match self {
            TableState::Projected => TableState::Restricted,
            s => s,
        }
    }

    fn after_sort(self, status: TableStatus, restricted: bool) -> Self {
        match (self, status) {
            (_, TableStatus::Sorting) => TableState::SortPending,
            (TableState::SortPending, _) if restricted => TableState::Restricted,
            (TableState::SortPending, _) => TableState::Projected,
            (s, _) => s,
        }
    }
}

pub struct TableObject {
    parent: Option<TableParent>,
    kind: TableKind,
    numerator: u32,
    denominator: u32,
    columns: Option<Vec<PropTag>>,
    sort: Option<SortOrderSet>,
    restriction: Option<Restriction>,
    /// Set by any `Restrict`, including on kinds whose restriction is faked.
    /// Cleared only by `ResetTable`.
    restricted: bool,
    binding: Option<TableBinding>,
    state: TableState,
}

impl TableObject {
    pub fn new(
        parent: Option<TableParent>,
        kind: TableKind,
        denominator: u32,
        binding: Option<TableBinding>,
    ) -> Self {
        TableObject {
            parent,
            kind,
            numerator: 0,
            denominator,
            columns: None,
            sort: None,
            restriction: None,
            restricted: false,
            binding,
            state: TableState::Unprojected,
        }
    }

    pub fn parent(&self) -> Option<TableParent> {
        self.parent
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    pub fn columns(&self) -> Option<&[PropTag]> {
        self.columns.as_deref()
    }

    pub fn sort(&self) -> Option<&SortOrderSet> {
        self.sort.as_ref()
    }

    pub fn restricted(&self) -> bool {
        self.restricted
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn binding(&self) -> Option<TableBinding> {
        self.binding
    }

    /// Replaces the column projection.
    ///
    /// An empty list leaves the current projection alone, as does a list the
    /// backend rejects. The reply always reports a complete status; a backend
    /// failure is only logged.
    pub fn set_columns(
        &mut self,
        registry: &ContextRegistry,
        log_prefix: &LogPrefix,
        columns: Vec<PropTag>,
    ) -> RopReply {
        if !columns.is_empty() {
            if let Some(b) = self.binding {
                if let Err(e) = registry.set_columns(b.context, b.handle, &columns)
                {
                    warn!("{} Backend rejected columns: {}", log_prefix, e);
                    return RopReply::ok(ReplyBody::TableStatus(
                        TableStatus::Complete,
                    ));
                }
            }

            self.columns = Some(columns);
            self.state = self.state.after_set_columns();
        }

        RopReply::ok(ReplyBody::TableStatus(TableStatus::Complete))
    }

    /// Changes the sort order of a contents table and rewinds the cursor.
    pub fn sort_table(
        &mut self,
        registry: &ContextRegistry,
        log_prefix: &LogPrefix,
        flags: SortTableFlags,
        order: SortOrderSet,
    ) -> RopReply {
        if flags.contains(SortTableFlags::TBL_ASYNC) {
            return RopReply::error(MapiStatus::UnknownFlags);
        }

        if !self.kind.is_contents() {
            debug!("{} Sort requested on {:?} table", log_prefix, self.kind);
            return RopReply::error(MapiStatus::NoSupport);
        }

        self.numerator = 0;

        let status = match self.binding {
            None => TableStatus::Complete,
            Some(b) => match registry.set_sort_order(b.context, b.handle, &order)
            {
                Ok(status) => status,
                Err(e) => return catch_all_error_handling(log_prefix, e),
            },
        };

        self.sort = Some(order);
        self.state = self.state.after_sort(status, self.restricted);
        RopReply::ok(ReplyBody::TableStatus(status))
    }

    /// Applies (or with `None`, clears) a restriction.
    pub fn restrict(
        &mut self,
        registry: &ContextRegistry,
        log_prefix: &LogPrefix,
        restriction: Option<Restriction>,
    ) -> RopReply {
        self.restricted = true;

        if self.kind.is_faked() {
            return RopReply::ok(ReplyBody::TableStatus(TableStatus::Complete));
        }

        let b = match self.binding {
            Some(b) => b,
            None => return RopReply::error(MapiStatus::NoSupport),
        };

        match registry.set_restrictions(b.context, b.handle, restriction.as_ref())
        {
            Ok(status) => {
                self.restriction = restriction;
                self.state = self.state.after_restrict();
                RopReply::ok(ReplyBody::TableStatus(status))
            }
            Err(e) => catch_all_error_handling(log_prefix, e),
        }
    }

    /// Reads up to `count` rows from the cursor, advancing it past each row
    /// read.
    ///
    /// Reading stops early (without error) at the first row the backend
    /// cannot produce.
    pub fn query_rows(
        &mut self,
        registry: &ContextRegistry,
        log_prefix: &LogPrefix,
        count: u16,
    ) -> RopReply {
        if self.parent.is_none() {
            return RopReply::error(MapiStatus::NotFound);
        }

        let empty_origin = if self.restricted { 0 } else { 2 };
        if self.kind.is_faked() {
            return RopReply::ok(ReplyBody::QueryRows {
                origin: empty_origin,
                rows: Vec::new(),
            });
        }

        let columns = match self.columns {
            Some(ref columns) => columns,
            None => return RopReply::error(MapiStatus::NullObject),
        };

        let count = u32::from(count).min(self.denominator - self.numerator);
        let mut rows = Vec::new();
        if let Some(b) = self.binding {
            while (rows.len() as u32) < count {
                match fetch_row(
                    registry,
                    b.context,
                    b.handle,
                    columns,
                    QueryType::Prefiltered,
                    self.numerator,
                ) {
                    Ok(row) => {
                        rows.push(row);
                        self.numerator += 1;
                    }
                    Err(e) => {
                        debug!(
                            "{} Row {} unavailable, truncating: {}",
                            log_prefix, self.numerator, e
                        );
                        break;
                    }
                }
            }
        }

        let origin = if rows.is_empty() {
            empty_origin
        } else if (rows.len() as u32) < count {
            0
        } else {
            2
        };

        RopReply::ok(ReplyBody::QueryRows { origin, rows })
    }

    pub fn query_position(&self) -> RopReply {
        if self.parent.is_none() {
            return RopReply::error(MapiStatus::NotFound);
        }

        RopReply::ok(ReplyBody::QueryPosition {
            numerator: self.numerator,
            denominator: self.denominator,
        })
    }

    /// Moves the cursor relative to `origin`, clamped to the rows that
    /// exist.
    pub fn seek_row(
        &mut self,
        origin: BookmarkOrigin,
        offset: i32,
        want_row_moved_count: bool,
    ) -> RopReply {
        let numerator = i64::from(self.numerator);
        let denominator = i64::from(self.denominator);
        let offset = i64::from(offset);

        let candidate = match origin {
            BookmarkOrigin::Beginning => offset,
            BookmarkOrigin::Current => numerator + offset,
            BookmarkOrigin::End => denominator - 1 + offset,
            BookmarkOrigin::Custom(_) => {
                return RopReply::error(MapiStatus::NotFound)
            }
        };

        let last = (denominator - 1).max(0);
        let (position, has_sought_less) = if candidate < 0 {
            (0, true)
        } else if candidate >= denominator {
            (last, true)
        } else {
            (candidate, false)
        };

        let rows_sought = if want_row_moved_count {
            (position - numerator) as i32
        } else {
            0
        };

        self.numerator = position as u32;
        RopReply::ok(ReplyBody::SeekRow {
            has_sought_less,
            rows_sought,
        })
    }

    /// Moves the cursor to the first row at or after it that matches
    /// `restriction`, and returns that row.
    ///
    /// Only forward scans are supported; a backward scan is performed as a
    /// forward scan from the first row.
    pub fn find_row(
        &mut self,
        registry: &ContextRegistry,
        log_prefix: &LogPrefix,
        origin: BookmarkOrigin,
        direction: FindRowDirection,
        restriction: &Restriction,
    ) -> RopReply {
        if self.kind.is_faked() {
            return RopReply {
                error_code: MapiStatus::NotFound,
                body: ReplyBody::FindRow { row: None },
            };
        }

        let columns = match self.columns {
            Some(ref columns) => columns,
            None => return RopReply::error(MapiStatus::NullObject),
        };

        if BookmarkOrigin::Beginning == origin {
            self.numerator = 0;
        }
        if FindRowDirection::Backward == direction {
            debug!("{} Backward FindRow scanning forward", log_prefix);
            self.numerator = 0;
        }

        let b = match self.binding {
            Some(b) => b,
            None => return RopReply::ok(ReplyBody::FindRow { row: None }),
        };

        if let Err(e) =
            registry.set_restrictions(b.context, b.handle, Some(restriction))
        {
            return catch_all_error_handling(log_prefix, e);
        }

        let mut found = None;
        while self.numerator < self.denominator {
            match fetch_row(
                registry,
                b.context,
                b.handle,
                columns,
                QueryType::LiveFiltered,
                self.numerator,
            ) {
                Ok(row) => {
                    found = Some(row);
                    break;
                }
                Err(_) => self.numerator += 1,
            }
        }

        // The scan restriction is transient; put back the table's own.
        if let Err(e) = registry.set_restrictions(
            b.context,
            b.handle,
            self.restriction.as_ref(),
        ) {
            warn!("{} Failed to clear FindRow restriction: {}", log_prefix, e);
        }

        match found {
            Some(row) => RopReply::ok(ReplyBody::FindRow { row: Some(row) }),
            None => RopReply {
                error_code: MapiStatus::NotFound,
                body: ReplyBody::FindRow { row: None },
            },
        }
    }

    /// Discards the columns and restriction and rewinds the cursor. The sort
    /// order is kept.
    pub fn reset_table(
        &mut self,
        registry: &ContextRegistry,
        log_prefix: &LogPrefix,
    ) -> RopReply {
        if self.kind.is_faked() {
            return RopReply::ok(ReplyBody::Empty);
        }

        self.columns = None;
        if let Some(b) = self.binding {
            if let Err(e) = registry.set_restrictions(b.context, b.handle, None)
            {
                warn!("{} Failed to clear restriction: {}", log_prefix, e);
            }
        }

        self.restriction = None;
        self.restricted = false;
        self.numerator = 0;
        self.state = TableState::Unprojected;
        RopReply::ok(ReplyBody::Empty)
    }

    /// Lists every property the rows of this table can have.
    pub fn query_columns_all(
        &self,
        registry: &ContextRegistry,
        log_prefix: &LogPrefix,
    ) -> RopReply {
        let b = match self.binding {
            Some(b) => b,
            None => return RopReply::error(MapiStatus::NoSupport),
        };

        match registry
            .get_available_properties(b.context, ObjectHandle::Table(b.handle))
        {
            Ok(tags) => RopReply::ok(ReplyBody::PropertyTags(tags)),
            Err(e) => catch_all_error_handling(log_prefix, e),
        }
    }

    pub fn get_status(&self) -> RopReply {
        let status = if TableState::SortPending == self.state {
            TableStatus::Sorting
        } else {
            TableStatus::Complete
        };

        RopReply::ok(ReplyBody::TableStatus(status))
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::super::test_prelude::*;
    use super::*;

    fn open_contents(setup: &Setup) -> TableObject {
        let (handle, count) = setup
            .registry
            .open_table(setup.context, setup.root, TableKind::Message)
            .unwrap();
        TableObject::new(
            Some(ROOT_PARENT),
            TableKind::Message,
            count,
            Some(TableBinding {
                context: setup.context,
                handle,
            }),
        )
    }

    fn subjects(reply: &RopReply) -> Vec<String> {
        match reply.body {
            ReplyBody::QueryRows { ref rows, .. } => rows
                .iter()
                .map(|r| {
                    r.get(PropTag::SUBJECT)
                        .and_then(PropValue::as_str)
                        .unwrap_or("<none>")
                        .to_owned()
                })
                .collect(),
            ref body => panic!("Unexpected body: {:?}", body),
        }
    }

    fn origin(reply: &RopReply) -> u8 {
        match reply.body {
            ReplyBody::QueryRows { origin, .. } => origin,
            ref body => panic!("Unexpected body: {:?}", body),
        }
    }

    fn found_subject(reply: &RopReply) -> Option<String> {
        match reply.body {
            ReplyBody::FindRow { ref row } => row.as_ref().map(|r| {
                r.get(PropTag::SUBJECT)
                    .and_then(PropValue::as_str)
                    .unwrap_or("<none>")
                    .to_owned()
            }),
            ref body => panic!("Unexpected body: {:?}", body),
        }
    }

    fn subject_is(s: &str) -> Restriction {
        Restriction::Content {
            tag: PropTag::SUBJECT,
            value: s.to_owned(),
            level: FuzzyLevel::FullString,
            ignore_case: false,
        }
    }

    #[test]
    fn query_rows_clamps_at_end() {
        let setup = set_up_with_messages(10);
        let mut table = open_contents(&setup);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);

        table.seek_row(BookmarkOrigin::Beginning, 8, false);
        assert_eq!(8, table.numerator());

        let reply =
            table.query_rows(&setup.registry, &setup.log_prefix, 5);
        assert_eq!(MapiStatus::Success, reply.error_code);
        assert_eq!(vec!["m8", "m9"], subjects(&reply));
        assert_eq!(2, origin(&reply));
        assert_eq!(10, table.numerator());

        // Nothing left
        let reply =
            table.query_rows(&setup.registry, &setup.log_prefix, 5);
        assert!(subjects(&reply).is_empty());
        assert_eq!(2, origin(&reply));
    }

    #[test]
    fn query_rows_truncates_at_unavailable_row() {
        let setup = set_up_with_messages(4);
        let mut table = open_contents(&setup);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);

        // The denominator was captured at open time; with the restriction
        // in place only 2 rows exist
        table.restrict(
            &setup.registry,
            &setup.log_prefix,
            Some(Restriction::Or(vec![subject_is("m1"), subject_is("m3")])),
        );
        assert_eq!(TableState::Restricted, table.state());

        let reply =
            table.query_rows(&setup.registry, &setup.log_prefix, 4);
        assert_eq!(MapiStatus::Success, reply.error_code);
        assert_eq!(vec!["m1", "m3"], subjects(&reply));
        assert_eq!(0, origin(&reply));
        assert_eq!(2, table.numerator());

        // Restricted and empty
        let reply =
            table.query_rows(&setup.registry, &setup.log_prefix, 4);
        assert!(subjects(&reply).is_empty());
        assert_eq!(0, origin(&reply));
        assert_eq!(2, table.numerator());
    }

    #[test]
    fn unprojected_reads_report_null_object() {
        let setup = set_up_with_messages(3);
        let mut table = open_contents(&setup);
        table.seek_row(BookmarkOrigin::Beginning, 1, false);

        assert_eq!(
            MapiStatus::NullObject,
            table
                .query_rows(&setup.registry, &setup.log_prefix, 2)
                .error_code
        );
        assert_eq!(
            MapiStatus::NullObject,
            table
                .find_row(
                    &setup.registry,
                    &setup.log_prefix,
                    BookmarkOrigin::Beginning,
                    FindRowDirection::Forward,
                    &subject_is("m0"),
                )
                .error_code
        );
        assert_eq!(1, table.numerator());
    }

    #[test]
    fn set_columns_with_empty_list_is_a_no_op() {
        let setup = set_up_with_messages(2);
        let mut table = open_contents(&setup);

        let reply =
            table.set_columns(&setup.registry, &setup.log_prefix, vec![]);
        assert_eq!(
            ReplyBody::TableStatus(TableStatus::Complete),
            reply.body
        );
        assert_eq!(None, table.columns());
        assert_eq!(TableState::Unprojected, table.state());

        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
            PropTag::MID,
        ]);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![]);
        assert_eq!(
            Some(&[PropTag::SUBJECT, PropTag::MID][..]),
            table.columns()
        );
        assert_eq!(TableState::Projected, table.state());
    }

    #[test]
    fn repeated_set_columns_gives_same_row_shape() {
        let setup = set_up_with_messages(3);
        let mut table = open_contents(&setup);
        let columns = vec![PropTag::MID, PropTag::SUBJECT, PropTag::DISPLAY_NAME];

        table.set_columns(&setup.registry, &setup.log_prefix, columns.clone());
        let first = table.query_rows(&setup.registry, &setup.log_prefix, 1);
        table.set_columns(&setup.registry, &setup.log_prefix, columns.clone());
        table.seek_row(BookmarkOrigin::Beginning, 0, false);
        let second = table.query_rows(&setup.registry, &setup.log_prefix, 1);

        assert_eq!(first, second);
        match first.body {
            ReplyBody::QueryRows { ref rows, .. } => {
                let tags =
                    rows[0].values.iter().map(|v| v.tag.id()).collect::<Vec<_>>();
                assert_eq!(
                    columns.iter().map(|t| t.id()).collect::<Vec<_>>(),
                    tags
                );
                // No message has a display name
                assert!(rows[0].flagged);
            }
            ref body => panic!("Unexpected body: {:?}", body),
        }
    }

    #[test]
    fn seek_row_scenarios() {
        let setup = set_up_with_messages(10);
        let mut table = open_contents(&setup);

        assert_eq!(
            ReplyBody::SeekRow {
                has_sought_less: true,
                rows_sought: 9,
            },
            table.seek_row(BookmarkOrigin::End, 3, true).body
        );
        assert_eq!(9, table.numerator());

        assert_eq!(
            ReplyBody::SeekRow {
                has_sought_less: true,
                rows_sought: 0,
            },
            table.seek_row(BookmarkOrigin::Current, -20, false).body
        );
        assert_eq!(0, table.numerator());

        assert_eq!(
            ReplyBody::SeekRow {
                has_sought_less: false,
                rows_sought: 4,
            },
            table.seek_row(BookmarkOrigin::Current, 4, true).body
        );
        assert_eq!(4, table.numerator());

        let reply = table.seek_row(BookmarkOrigin::Custom(5), 1, true);
        assert_eq!(MapiStatus::NotFound, reply.error_code);
        assert_eq!(4, table.numerator());
    }

    #[test]
    fn seek_row_on_empty_table() {
        let setup = set_up_with_messages(0);
        let mut table = open_contents(&setup);
        let reply = table.seek_row(BookmarkOrigin::Beginning, 0, true);
        assert_eq!(
            ReplyBody::SeekRow {
                has_sought_less: true,
                rows_sought: 0,
            },
            reply.body
        );
        assert_eq!(0, table.numerator());
    }

    #[test]
    fn find_row_forward() {
        let setup = set_up_with_messages(6);
        let mut table = open_contents(&setup);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
            PropTag::DISPLAY_NAME,
        ]);

        let reply = table.find_row(
            &setup.registry,
            &setup.log_prefix,
            BookmarkOrigin::Beginning,
            FindRowDirection::Forward,
            &subject_is("m4"),
        );
        assert_eq!(MapiStatus::Success, reply.error_code);
        assert_eq!(Some("m4".to_owned()), found_subject(&reply));
        assert_eq!(4, table.numerator());
        match reply.body {
            ReplyBody::FindRow { row: Some(ref row) } => {
                assert!(row.flagged);
                assert_eq!(
                    PropTag::DISPLAY_NAME.with_type(PT_ERROR),
                    row.values[1].tag
                );
            }
            ref body => panic!("Unexpected body: {:?}", body),
        }

        // The FindRow restriction does not linger
        let reply = table.query_rows(&setup.registry, &setup.log_prefix, 10);
        assert_eq!(vec!["m4", "m5"], subjects(&reply));

        // From the current position, an earlier row is not found
        let reply = table.find_row(
            &setup.registry,
            &setup.log_prefix,
            BookmarkOrigin::Current,
            FindRowDirection::Forward,
            &subject_is("m1"),
        );
        assert_eq!(MapiStatus::NotFound, reply.error_code);
        assert_eq!(ReplyBody::FindRow { row: None }, reply.body);
        assert_eq!(6, table.numerator());
    }

    #[test]
    fn find_row_backward_scans_forward_from_start() {
        let setup = set_up_with_messages(6);
        let mut backward = open_contents(&setup);
        let mut forward = open_contents(&setup);
        for table in vec![&mut backward, &mut forward] {
            table.set_columns(&setup.registry, &setup.log_prefix, vec![
                PropTag::SUBJECT,
            ]);
        }

        backward.seek_row(BookmarkOrigin::Beginning, 5, false);
        let b = backward.find_row(
            &setup.registry,
            &setup.log_prefix,
            BookmarkOrigin::Current,
            FindRowDirection::Backward,
            &subject_is("m2"),
        );
        let f = forward.find_row(
            &setup.registry,
            &setup.log_prefix,
            BookmarkOrigin::Beginning,
            FindRowDirection::Forward,
            &subject_is("m2"),
        );

        assert_eq!(f, b);
        assert_eq!(Some("m2".to_owned()), found_subject(&b));
        assert_eq!(forward.numerator(), backward.numerator());
    }

    #[test]
    fn sort_table() {
        let setup = set_up_with_messages(3);
        let mut table = open_contents(&setup);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);
        table.seek_row(BookmarkOrigin::Beginning, 2, false);

        let descending = SortOrderSet {
            columns: vec![SortColumn {
                tag: PropTag::SUBJECT,
                direction: SortDirection::Descending,
            }],
            ..SortOrderSet::default()
        };

        assert_eq!(
            MapiStatus::UnknownFlags,
            table
                .sort_table(
                    &setup.registry,
                    &setup.log_prefix,
                    SortTableFlags::TBL_ASYNC,
                    descending.clone(),
                )
                .error_code
        );
        assert_eq!(2, table.numerator());

        let reply = table.sort_table(
            &setup.registry,
            &setup.log_prefix,
            SortTableFlags::empty(),
            descending.clone(),
        );
        assert_eq!(ReplyBody::TableStatus(TableStatus::Complete), reply.body);
        assert_eq!(0, table.numerator());

        let reply = table.query_rows(&setup.registry, &setup.log_prefix, 3);
        assert_eq!(vec!["m2", "m1", "m0"], subjects(&reply));

        // Reset keeps the sort but drops the columns
        table.reset_table(&setup.registry, &setup.log_prefix);
        assert_eq!(Some(&descending), table.sort());
        assert_eq!(None, table.columns());
        assert_eq!(0, table.numerator());
    }

    #[test]
    fn sort_only_on_contents_tables() {
        let setup = set_up_with_messages(0);
        let (handle, count) = setup
            .registry
            .open_table(setup.context, setup.root, TableKind::Folder)
            .unwrap();
        let mut table = TableObject::new(
            Some(ROOT_PARENT),
            TableKind::Folder,
            count,
            Some(TableBinding {
                context: setup.context,
                handle,
            }),
        );

        assert_eq!(
            MapiStatus::NoSupport,
            table
                .sort_table(
                    &setup.registry,
                    &setup.log_prefix,
                    SortTableFlags::empty(),
                    SortOrderSet::default(),
                )
                .error_code
        );
    }

    #[test]
    fn reset_table_clears_restriction() {
        let setup = set_up_with_messages(4);
        let mut table = open_contents(&setup);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);
        table.restrict(
            &setup.registry,
            &setup.log_prefix,
            Some(subject_is("m3")),
        );
        assert!(table.restricted());

        table.reset_table(&setup.registry, &setup.log_prefix);
        assert!(!table.restricted());
        assert_eq!(TableState::Unprojected, table.state());

        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);
        let reply = table.query_rows(&setup.registry, &setup.log_prefix, 10);
        assert_eq!(vec!["m0", "m1", "m2", "m3"], subjects(&reply));
    }

    #[test]
    fn faked_tables() {
        let setup = set_up_with_messages(0);
        let mut table =
            TableObject::new(Some(ROOT_PARENT), TableKind::Rule, 0, None);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::DISPLAY_NAME,
        ]);

        let reply =
            table.restrict(&setup.registry, &setup.log_prefix, None);
        assert_eq!(
            RopReply::ok(ReplyBody::TableStatus(TableStatus::Complete)),
            reply
        );
        assert!(table.restricted());

        let reply = table.query_rows(&setup.registry, &setup.log_prefix, 10);
        assert_eq!(MapiStatus::Success, reply.error_code);
        assert!(subjects(&reply).is_empty());
        assert_eq!(0, origin(&reply));

        let reply = table.find_row(
            &setup.registry,
            &setup.log_prefix,
            BookmarkOrigin::Beginning,
            FindRowDirection::Forward,
            &subject_is("x"),
        );
        assert_eq!(MapiStatus::NotFound, reply.error_code);

        table.reset_table(&setup.registry, &setup.log_prefix);
        assert!(table.columns().is_some());
        assert!(table.restricted());
    }

    #[test]
    fn unbound_tables() {
        let setup = set_up_with_messages(0);
        let mut table =
            TableObject::new(Some(ROOT_PARENT), TableKind::Message, 5, None);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);

        assert_eq!(
            MapiStatus::NoSupport,
            table
                .restrict(&setup.registry, &setup.log_prefix, None)
                .error_code
        );
        let reply = table.query_rows(&setup.registry, &setup.log_prefix, 3);
        assert!(subjects(&reply).is_empty());
        assert_eq!(0, table.numerator());
    }

    #[test]
    fn query_position_requires_folder() {
        let mut table = TableObject::new(None, TableKind::Message, 5, None);
        assert_eq!(
            MapiStatus::NotFound,
            table.query_position().error_code
        );

        table = TableObject::new(Some(ROOT_PARENT), TableKind::Message, 5, None);
        table.seek_row(BookmarkOrigin::Beginning, 3, false);
        assert_eq!(
            ReplyBody::QueryPosition {
                numerator: 3,
                denominator: 5,
            },
            table.query_position().body
        );
    }

    #[test]
    fn state_transitions() {
        use TableState::*;

        assert_eq!(Projected, Unprojected.after_set_columns());
        assert_eq!(Restricted, Restricted.after_set_columns());
        assert_eq!(Unprojected, Unprojected.after_restrict());
        assert_eq!(Restricted, Projected.after_restrict());
        assert_eq!(
            SortPending,
            Projected.after_sort(TableStatus::Sorting, false)
        );
        assert_eq!(
            Restricted,
            SortPending.after_sort(TableStatus::Complete, true)
        );
        assert_eq!(
            Projected,
            SortPending.after_sort(TableStatus::Complete, false)
        );
        assert_eq!(
            Projected,
            Projected.after_sort(TableStatus::Complete, true)
        );
    }

    #[test]
    fn get_status() {
        let mut table =
            TableObject::new(Some(ROOT_PARENT), TableKind::Message, 0, None);
        assert_eq!(
            ReplyBody::TableStatus(TableStatus::Complete),
            table.get_status().body
        );
        table.state = TableState::SortPending;
        assert_eq!(
            ReplyBody::TableStatus(TableStatus::Sorting),
            table.get_status().body
        );
    }

    #[test]
    fn restrict_is_idempotent() {
        let setup = set_up_with_messages(6);
        let mut table = open_contents(&setup);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);
        let restriction =
            Restriction::Or(vec![subject_is("m2"), subject_is("m4")]);

        table.restrict(
            &setup.registry,
            &setup.log_prefix,
            Some(restriction.clone()),
        );
        let once = table.query_rows(&setup.registry, &setup.log_prefix, 6);

        table.restrict(
            &setup.registry,
            &setup.log_prefix,
            Some(restriction.clone()),
        );
        table.restrict(&setup.registry, &setup.log_prefix, Some(restriction));
        table.seek_row(BookmarkOrigin::Beginning, 0, false);
        let again = table.query_rows(&setup.registry, &setup.log_prefix, 6);

        assert_eq!(vec!["m2", "m4"], subjects(&once));
        assert_eq!(subjects(&once), subjects(&again));
        assert_eq!(TableState::Restricted, table.state());
    }

    #[test]
    fn find_row_restores_table_restriction() {
        let setup = set_up_with_messages(4);
        let mut table = open_contents(&setup);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);
        table.restrict(&setup.registry, &setup.log_prefix, Some(subject_is("m3")));

        let reply = table.find_row(
            &setup.registry,
            &setup.log_prefix,
            BookmarkOrigin::Beginning,
            FindRowDirection::Forward,
            &subject_is("m9"),
        );
        assert_eq!(MapiStatus::NotFound, reply.error_code);

        table.seek_row(BookmarkOrigin::Beginning, 0, false);
        let reply = table.query_rows(&setup.registry, &setup.log_prefix, 4);
        assert_eq!(vec!["m3"], subjects(&reply));
        assert!(table.restricted());
        assert_eq!(TableState::Restricted, table.state());
    }

    #[test]
    fn find_row_fails_if_restriction_cannot_be_applied() {
        let setup = set_up_faulty_with_messages(3);
        let mut table = open_contents(&setup);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);
        setup.faulty.faults().reject_restrictions = true;

        let reply = table.find_row(
            &setup.registry,
            &setup.log_prefix,
            BookmarkOrigin::Beginning,
            FindRowDirection::Forward,
            &subject_is("m2"),
        );
        assert_eq!(MapiStatus::CallFailed, reply.error_code);
        assert_eq!(0, table.numerator());
    }

    #[test]
    fn rejected_columns_keep_previous_projection() {
        let setup = set_up_faulty_with_messages(2);
        let mut table = open_contents(&setup);

        setup.faulty.faults().reject_columns = true;
        let reply = table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);
        assert_eq!(
            ReplyBody::TableStatus(TableStatus::Complete),
            reply.body
        );
        assert_eq!(None, table.columns());
        assert_eq!(TableState::Unprojected, table.state());

        setup.faulty.faults().reject_columns = false;
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);
        setup.faulty.faults().reject_columns = true;
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::MID,
        ]);
        assert_eq!(Some(&[PropTag::SUBJECT][..]), table.columns());

        let reply = table.query_rows(&setup.registry, &setup.log_prefix, 1);
        assert_eq!(vec!["m0"], subjects(&reply));
    }

    #[test]
    fn sort_in_progress_is_passed_through() {
        let setup = set_up_faulty_with_messages(3);
        let mut table = open_contents(&setup);
        table.set_columns(&setup.registry, &setup.log_prefix, vec![
            PropTag::SUBJECT,
        ]);
        table.seek_row(BookmarkOrigin::Beginning, 2, false);
        let descending = SortOrderSet {
            columns: vec![SortColumn {
                tag: PropTag::SUBJECT,
                direction: SortDirection::Descending,
            }],
            ..SortOrderSet::default()
        };

        setup.faulty.faults().sort_status = Some(TableStatus::Sorting);
        let reply = table.sort_table(
            &setup.registry,
            &setup.log_prefix,
            SortTableFlags::empty(),
            descending.clone(),
        );
        assert_eq!(MapiStatus::Success, reply.error_code);
        assert_eq!(ReplyBody::TableStatus(TableStatus::Sorting), reply.body);
        assert_eq!(0, table.numerator());
        assert_eq!(TableState::SortPending, table.state());
        assert_eq!(
            ReplyBody::TableStatus(TableStatus::Sorting),
            table.get_status().body
        );

        setup.faulty.faults().sort_status = None;
        let reply = table.sort_table(
            &setup.registry,
            &setup.log_prefix,
            SortTableFlags::empty(),
            descending,
        );
        assert_eq!(ReplyBody::TableStatus(TableStatus::Complete), reply.body);
        assert_eq!(TableState::Projected, table.state());
        assert_eq!(
            ReplyBody::TableStatus(TableStatus::Complete),
            table.get_status().body
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            ..ProptestConfig::default()
        })]

        #[test]
        fn query_rows_progression(
            rows in 0u32..20,
            batch in 1u16..8,
            calls in 0usize..6,
        ) {
            let setup = set_up_with_messages(rows);
            let mut table = open_contents(&setup);
            table.set_columns(&setup.registry, &setup.log_prefix, vec![
                PropTag::MID,
            ]);

            for _ in 0..calls {
                table.query_rows(&setup.registry, &setup.log_prefix, batch);
                prop_assert!(table.numerator() <= table.denominator());
            }

            prop_assert_eq!(
                (calls as u32 * u32::from(batch)).min(rows),
                table.numerator()
            );
        }

        #[test]
        fn seek_row_stays_in_bounds(
            denominator in 0u32..50,
            start in 0u32..50,
            origin in 0u8..3,
            offset in -100i32..100,
        ) {
            let mut table = TableObject::new(
                Some(ROOT_PARENT), TableKind::Message, denominator, None);
            table.numerator = start.min(denominator);
            let before = table.numerator;

            let reply = table.seek_row(
                BookmarkOrigin::from(origin), offset, true);
            prop_assert!(table.numerator() <= denominator);
            prop_assert!(
                table.numerator() < denominator || 0 == table.numerator());

            match reply.body {
                ReplyBody::SeekRow { rows_sought, .. } => prop_assert_eq!(
                    i64::from(table.numerator()) - i64::from(before),
                    i64::from(rows_sought)
                ),
                ref body => panic!("Unexpected body: {:?}", body),
            }
        }
    }
}
