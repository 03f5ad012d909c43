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

use std::path::{Path, PathBuf};

use structopt::StructOpt;

use crate::store::model::FolderId;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Commands to be run on the Mapistore server system.
    Server(ServerSubcommand),
}

#[derive(StructOpt, Default)]
pub(super) struct ServerCommonOptions {
    /// The directory containing `mapistore.toml` etc
    /// [default: /etc/mapistore or /usr/local/etc/mapistore]
    #[structopt(long, parse(from_os_str))]
    root: Option<PathBuf>,
}

#[derive(StructOpt)]
enum ServerSubcommand {
    /// Load the configuration and list the registered storage backends.
    Check(ServerCommonOptions),
    Probe(ServerProbeSubcommand),
}

impl ServerSubcommand {
    fn common_options(&mut self) -> ServerCommonOptions {
        match *self {
            ServerSubcommand::Check(ref mut c) => std::mem::take(c),
            ServerSubcommand::Probe(ref mut c) => std::mem::take(&mut c.common),
        }
    }
}

/// Open a store and report what it contains.
///
/// This logs on, attaches the store at the given URI, lists the hierarchy
/// and contents tables of its root folder, and then releases the store
/// again. Nothing in the store is modified.
#[derive(StructOpt)]
pub(super) struct ServerProbeSubcommand {
    #[structopt(flatten)]
    pub(super) common: ServerCommonOptions,

    /// The identifier of the store's root folder.
    #[structopt(long, default_value = "1")]
    pub(super) folder_id: u64,

    /// The user name to log on as.
    #[structopt(long, short, default_value = "probe")]
    pub(super) user: String,

    /// The context URI to open, e.g. `mstore://jdoe`.
    pub(super) uri: String,
}

impl ServerProbeSubcommand {
    pub(super) fn root_folder(&self) -> FolderId {
        FolderId(self.folder_id)
    }
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    match cmd {
        Command::Server(cmd) => server(cmd),
    }
}

fn server(mut cmd: ServerSubcommand) {
    let common = cmd.common_options();
    let root = common.root.unwrap_or_else(|| {
        if Path::new("/etc/mapistore/mapistore.toml").is_file() {
            "/etc/mapistore".to_owned().into()
        } else if Path::new("/usr/local/etc/mapistore/mapistore.toml").is_file()
        {
            "/usr/local/etc/mapistore".to_owned().into()
        } else {
            die!(
                EX_CONFIG,
                "Neither /etc/mapistore nor /usr/local/etc/mapistore looks\n\
                 like the Mapistore root; use --root=/path/to/mapistore if\n\
                 your installation is elsewhere."
            )
        }
    });

    let system_config = match SystemConfig::load(&root) {
        Ok(config) => config,
        Err(e) => die!(
            EX_CONFIG,
            "Error loading '{}': {}",
            root.join("mapistore.toml").display(),
            e
        ),
    };

    init_logging(&root);

    match cmd {
        ServerSubcommand::Check(_) => super::server::check(system_config),
        ServerSubcommand::Probe(cmd) => {
            super::server::probe(system_config, cmd)
        }
    }
}

fn init_logging(root: &Path) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        crate::init_simple_log();
        return;
    }

    let log_config_file = root.join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::file::Deserializers::new(),
        ) {
            die!(
                EX_CONFIG,
                "Failed to initialise logging from '{}': {}",
                log_config_file.display(),
                e
            );
        }
    } else {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_owned(),
            pid: nix::unistd::getpid().as_raw(),
        };

        let logger = match syslog::unix(formatter) {
            Ok(logger) => logger,
            Err(e) => die!(EX_OSERR, "Failed to connect to syslog: {}", e),
        };
        if let Err(e) =
            log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
                .map(|_| log::set_max_level(log::LevelFilter::Info))
        {
            die!(EX_SOFTWARE, "Failed to initialise logging: {}", e);
        }
    }
}
