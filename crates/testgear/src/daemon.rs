use std::io;

use tracing::info;

use crate::exit::{io_error, CliResult};

/// Detach from the controlling terminal.
///
/// The parent exits with status 0; the child continues in a new session with
/// `/` as its working directory. Already-detached processes return at once.
pub fn detach() -> CliResult<()> {
    // SAFETY: plain libc process calls; no Rust state is shared with the
    // parent after fork, which exits immediately.
    unsafe {
        if libc::getppid() == 1 {
            return Ok(());
        }

        match libc::fork() {
            -1 => return Err(io_error("fork failed", io::Error::last_os_error())),
            0 => {}
            _ => libc::_exit(0),
        }

        libc::umask(0o022);

        if libc::setsid() < 0 {
            return Err(io_error("setsid failed", io::Error::last_os_error()));
        }
    }

    std::env::set_current_dir("/").map_err(|err| io_error("chdir failed", err))?;
    info!(pid = std::process::id(), "daemonized");
    Ok(())
}
