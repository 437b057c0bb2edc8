//! Remote control of test equipment through loadable capability providers.
//!
//! A Test Gear daemon hosts providers (builtin or dynamically loaded) whose
//! variables and commands a controller reads, writes and runs over a small
//! binary request/response protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix-domain byte streams
//! - [`wire`]: message framing, typed values and the blocking reader/writer
//! - [`plugin`]: capability tables, the provider registry and loaders
//! - [`session`]: the daemon-side dispatcher and the controller-side client

/// Re-export transport types.
pub mod transport {
    pub use testgear_transport::*;
}

/// Re-export wire types.
pub mod wire {
    pub use testgear_wire::*;
}

/// Re-export provider types.
pub mod plugin {
    pub use testgear_plugin::*;
}

/// Re-export session types.
pub mod session {
    pub use testgear_session::*;
}
