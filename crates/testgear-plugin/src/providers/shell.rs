//! `shell`: runs the `command` variable through `/bin/sh -c`.

use std::process::Command;

use testgear_wire::Kind;
use tracing::{info, warn};

use crate::descriptor::{CapabilityDef, ProviderDescriptor, ProviderInfo};
use crate::table::CapabilityTable;

pub fn descriptor() -> ProviderDescriptor {
    let info = ProviderInfo::new("shell")
        .version("0.1")
        .description("Shell plugin")
        .author("Martin Lund")
        .license("BSD-3");

    let entries = vec![
        CapabilityDef::variable("command", Kind::String, "Command string"),
        CapabilityDef::command("run", "Run command", run_command),
    ];

    ProviderDescriptor::new(info, entries)
}

/// Exit status of the command, or -1 if it could not be spawned or was
/// terminated by a signal.
fn run_command(table: &mut CapabilityTable) -> i32 {
    let command = match table.get_string("command") {
        Ok(command) => command,
        Err(err) => {
            warn!(error = %err, "shell command variable unavailable");
            return -1;
        }
    };

    info!(%command, "firing shell command");
    match Command::new("/bin/sh").arg("-c").arg(&command).status() {
        Ok(status) => status.code().unwrap_or(-1),
        Err(err) => {
            warn!(%command, error = %err, "failed to spawn shell");
            -1
        }
    }
}
