//! The capability-provider contract.
//!
//! A provider describes itself with a [`ProviderDescriptor`]: read-only
//! metadata, an ordered list of capability definitions, a mandatory `init`
//! hook that populates defaults and optional `load`/`unload` hooks.

use std::fmt;
use std::sync::Arc;

use testgear_wire::Kind;

use crate::error::Result;
use crate::table::CapabilityTable;

/// A zero-argument command. It may read or write its provider's variables.
pub type CommandFn = Arc<dyn Fn(&mut CapabilityTable) -> i32 + Send + Sync>;

/// Populates a freshly built table.
pub type InitHook = Box<dyn Fn(&mut CapabilityTable) -> Result<()> + Send>;

/// Optional lifecycle callback. A non-zero status is logged, not fatal.
pub type LifecycleHook = Box<dyn Fn() -> i32 + Send>;

/// Identifying metadata of a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub license: String,
}

impl ProviderInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn license(mut self, license: impl Into<String>) -> Self {
        self.license = license.into();
        self
    }

    /// Look up a reserved metadata field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "name" => Some(&self.name),
            "version" => Some(&self.version),
            "description" => Some(&self.description),
            "author" => Some(&self.author),
            "license" => Some(&self.license),
            _ => None,
        }
    }
}

/// What a capability definition provides.
#[derive(Clone)]
pub enum Slot {
    /// A variable, with an optional textual default.
    Variable { kind: Kind, default: Option<String> },
    Command(CommandFn),
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Variable { kind, default } => f
                .debug_struct("Variable")
                .field("kind", kind)
                .field("default", default)
                .finish(),
            Slot::Command(_) => f.write_str("Command"),
        }
    }
}

/// One entry of a provider's capability table.
#[derive(Debug, Clone)]
pub struct CapabilityDef {
    pub name: String,
    pub description: String,
    pub slot: Slot,
}

impl CapabilityDef {
    /// A variable of `kind`, defaulting to zero/empty.
    pub fn variable(name: impl Into<String>, kind: Kind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            slot: Slot::Variable {
                kind,
                default: None,
            },
        }
    }

    pub fn command<F>(name: impl Into<String>, description: impl Into<String>, function: F) -> Self
    where
        F: Fn(&mut CapabilityTable) -> i32 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            slot: Slot::Command(Arc::new(function)),
        }
    }

    /// Attach a default literal. Ignored for commands.
    pub fn with_default(mut self, literal: impl Into<String>) -> Self {
        if let Slot::Variable { default, .. } = &mut self.slot {
            *default = Some(literal.into());
        }
        self
    }

    pub fn kind(&self) -> Kind {
        match &self.slot {
            Slot::Variable { kind, .. } => *kind,
            Slot::Command(_) => Kind::Command,
        }
    }
}

/// Everything a provider hands to the registry when it is registered.
pub struct ProviderDescriptor {
    pub info: ProviderInfo,
    pub entries: Vec<CapabilityDef>,
    pub init: InitHook,
    pub load: Option<LifecycleHook>,
    pub unload: Option<LifecycleHook>,
}

impl ProviderDescriptor {
    /// A descriptor whose `init` hook applies each variable's default.
    pub fn new(info: ProviderInfo, entries: Vec<CapabilityDef>) -> Self {
        Self {
            info,
            entries,
            init: Box::new(|table| {
                table.populate_defaults();
                Ok(())
            }),
            load: None,
            unload: None,
        }
    }

    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: Fn(&mut CapabilityTable) -> Result<()> + Send + 'static,
    {
        self.init = Box::new(init);
        self
    }

    pub fn with_load<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> i32 + Send + 'static,
    {
        self.load = Some(Box::new(hook));
        self
    }

    pub fn with_unload<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> i32 + Send + 'static,
    {
        self.unload = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("info", &self.info)
            .field("entries", &self.entries)
            .field("load", &self.load.is_some())
            .field("unload", &self.unload.is_some())
            .finish()
    }
}
