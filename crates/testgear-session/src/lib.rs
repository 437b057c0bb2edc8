//! Request handling for the Test Gear protocol.
//!
//! The [`Dispatcher`] is the daemon side: it reads one request at a time,
//! routes it through a [`ProviderRegistry`](testgear_plugin::ProviderRegistry)
//! and answers with exactly one `RSP_OK` or `RSP_ERROR`. The [`Client`] is the
//! controller side: it sends a request, waits for the correlated response and
//! turns it into a typed result.

pub mod client;
pub mod connect;
pub mod dispatcher;
pub mod error;

pub use client::Client;
pub use connect::{connect_tcp, connect_unix, serve_stream, Endpoint};
pub use dispatcher::{Dispatcher, Reply};
pub use error::{Result, SessionError};
