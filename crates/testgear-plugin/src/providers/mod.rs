//! Providers compiled into the daemon.

pub mod dummy;
pub mod shell;
