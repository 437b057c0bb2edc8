//! Capability providers for the Test Gear daemon.
//!
//! A provider contributes named, typed capabilities: variables holding one
//! [`Value`](testgear_wire::Value) each and zero-argument commands returning an
//! integer status. Each loaded provider owns a [`CapabilityTable`]; the
//! [`ProviderRegistry`] tracks loaded providers by name, drives their
//! load/unload lifecycle and routes dotted names such as `dummy.int0`.
//!
//! Providers are resolved through a [`ProviderLoader`]: the [`BuiltinLoader`]
//! serves a static catalogue compiled into the daemon, and on Unix the
//! [`DylibLoader`] opens shared objects from a plugin directory.

#[cfg(unix)]
pub mod dylib;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod providers;
pub mod registry;
pub mod table;

pub use descriptor::{CapabilityDef, CommandFn, ProviderDescriptor, ProviderInfo};
#[cfg(unix)]
pub use dylib::DylibLoader;
pub use error::{PluginError, Result};
pub use loader::{BuiltinLoader, ChainLoader, CodeUnit, LoaderConfig, ProviderLoader};
pub use registry::{split_dotted, ProviderRegistry};
pub use table::{CapabilityTable, RESERVED_NAMES};
