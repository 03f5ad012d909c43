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

//! Assembly of property rows from backend data.

use super::defs::*;
use crate::store::model::*;
use crate::store::registry::ContextRegistry;
use crate::support::error::Error;

/// The status recorded in place of a property that could not be resolved.
fn property_status(e: &Error) -> MapiStatus {
    match *e {
        Error::NotFound => MapiStatus::NotFound,
        Error::NoMemory => MapiStatus::NotEnoughMemory,
        _ => MapiStatus::CallFailed,
    }
}

impl PropertyRow {
    /// Pairs `data` up with the tags it was fetched for.
    ///
    /// Each entry that failed becomes an error placeholder, and the row is
    /// flagged; the entries that succeeded are kept as they are. Fails if
    /// `data` does not have one entry per tag.
    pub fn assemble(
        tags: &[PropTag],
        data: Vec<PropertyData>,
    ) -> Result<Self, Error> {
        if tags.len() != data.len() {
            return Err(Error::Corrupted);
        }

        let mut flagged = false;
        let values = tags
            .iter()
            .zip(data)
            .map(|(&tag, datum)| match datum {
                Ok(value) => PropertyValue::new(tag, value),
                Err(e) => {
                    flagged = true;
                    PropertyValue::new(
                        tag.with_type(PT_ERROR),
                        PropValue::Error(property_status(&e).wire_value()),
                    )
                }
            })
            .collect();

        Ok(PropertyRow { flagged, values })
    }

    /// The entry for the property with the same identifier as `tag`,
    /// whether it resolved or not.
    pub fn get(&self, tag: PropTag) -> Option<&PropValue> {
        self.values
            .iter()
            .find(|v| v.tag.id() == tag.id())
            .map(|v| &v.value)
    }
}

/// Fetches one row of `table` from its backend and assembles it.
///
/// An error means the row as a whole is unavailable.
pub(super) fn fetch_row(
    registry: &ContextRegistry,
    context: ContextId,
    table: TableHandle,
    columns: &[PropTag],
    query: QueryType,
    row: u32,
) -> Result<PropertyRow, Error> {
    let data = registry.get_row(context, table, query, row)?;
    PropertyRow::assemble(columns, data)
}
