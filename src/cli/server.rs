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

use log::info;

use super::main::ServerProbeSubcommand;
use crate::emsmdb::{MapiStatus, ReplyBody, RopProcessor, RopReply, RopRequest};
use crate::store::model::{PropTag, PropValue};
use crate::store::registry::ContextRegistry;
use crate::support::error::store_errstr;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::SystemConfig;

fn build_registry(config: &SystemConfig) -> ContextRegistry {
    match ContextRegistry::from_config(&config.store) {
        Ok(registry) => registry,
        Err(e) => die!(
            EX_CONFIG,
            "Invalid store configuration: {}",
            store_errstr(e.code())
        ),
    }
}

pub(super) fn check(config: SystemConfig) {
    let registry = build_registry(&config);
    let namespaces = registry.backends().namespaces();
    if namespaces.is_empty() {
        die!(EX_CONFIG, "No storage backends are configured");
    }

    for namespace in namespaces {
        println!("{}", namespace);
    }
    if let Some(max) = config.store.max_contexts {
        println!("At most {} contexts", max);
    }
}

/// Runs `request` and returns the handle it created.
fn open(processor: &mut RopProcessor, what: &str, request: RopRequest) -> u32 {
    match processor.handle_rop(request) {
        RopReply {
            error_code: MapiStatus::Success,
            body:
                ReplyBody::Object { handle }
                | ReplyBody::Table { handle, .. },
        } => handle,
        RopReply { error_code, .. } => {
            die!(EX_UNAVAILABLE, "Failed to open {}: {:?}", what, error_code)
        }
    }
}

/// Prints the `tag` column of every row of `table`.
fn list(processor: &mut RopProcessor, label: &str, table: u32, tag: PropTag) {
    processor.handle_rop(RopRequest::SetColumns {
        table,
        columns: vec![tag],
    });

    let mut count = 0;
    loop {
        match processor.handle_rop(RopRequest::QueryRows { table, count: 64 }) {
            RopReply {
                error_code: MapiStatus::Success,
                body: ReplyBody::QueryRows { rows, .. },
            } if !rows.is_empty() => {
                for row in rows {
                    count += 1;
                    println!(
                        "  {}",
                        row.get(tag)
                            .and_then(PropValue::as_str)
                            .unwrap_or("(unnamed)")
                    );
                }
            }
            RopReply { error_code, .. } => {
                if MapiStatus::Success != error_code {
                    println!("  ({:?})", error_code);
                }
                break;
            }
        }
    }

    println!("{}: {}", label, count);
}

pub(super) fn probe(config: SystemConfig, cmd: ServerProbeSubcommand) {
    let registry = Arc::new(build_registry(&config));
    let log_prefix = LogPrefix::new("probe".to_owned());
    log_prefix.set_session(std::process::id());
    let mut processor = RopProcessor::new(log_prefix, registry.clone());

    let logon = open(&mut processor, "session", RopRequest::Logon {
        username: cmd.user.clone(),
    });
    let root = open(&mut processor, &cmd.uri, RopRequest::AttachStore {
        logon,
        uri: cmd.uri.clone(),
        root: cmd.root_folder(),
    });
    info!("Probing {}", cmd.uri);

    let hierarchy = open(
        &mut processor,
        "hierarchy table",
        RopRequest::GetHierarchyTable { folder: root },
    );
    list(&mut processor, "Folders", hierarchy, PropTag::DISPLAY_NAME);

    for &(label, associated) in
        &[("Messages", false), ("Associated messages", true)]
    {
        let contents = open(
            &mut processor,
            "contents table",
            RopRequest::GetContentsTable {
                folder: root,
                associated,
            },
        );
        list(&mut processor, label, contents, PropTag::SUBJECT);
    }

    processor.close();
    if !registry.is_empty() {
        die!(EX_SOFTWARE, "Context for '{}' was not released", cmd.uri);
    }
}
