//! Resolving provider names to code units.

use std::path::PathBuf;

use crate::descriptor::ProviderDescriptor;
use crate::error::{PluginError, Result};
use crate::providers;

/// A resolved, loaded unit of provider code.
pub trait CodeUnit: Send {
    /// Call the unit's registration entry point.
    fn register(&self) -> Result<ProviderDescriptor>;

    /// Release the unit. Called after every table and hook built from it is gone.
    fn release(self: Box<Self>) -> Result<()>;

    /// Where the unit came from, for logs.
    fn origin(&self) -> String;
}

/// Resolves provider names to code units.
pub trait ProviderLoader: Send {
    fn resolve(&self, name: &str) -> Result<Box<dyn CodeUnit>>;
}

/// Where dynamically loaded providers are looked up.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory holding `<name>.<extension>` files. Default: `./plugins`.
    pub plugin_dir: PathBuf,
    /// File extension of provider units. Default: `so`.
    pub extension: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from("./plugins"),
            extension: "so".to_string(),
        }
    }
}

impl LoaderConfig {
    /// The file a provider named `name` is expected in.
    pub fn unit_path(&self, name: &str) -> PathBuf {
        self.plugin_dir.join(format!("{name}.{}", self.extension))
    }
}

type Factory = fn() -> ProviderDescriptor;

/// Serves providers compiled into the daemon.
#[derive(Debug, Clone)]
pub struct BuiltinLoader {
    catalogue: Vec<(&'static str, Factory)>,
}

impl BuiltinLoader {
    /// The stock catalogue: `dummy` and `shell`.
    pub fn new() -> Self {
        Self::empty()
            .with_provider("dummy", providers::dummy::descriptor)
            .with_provider("shell", providers::shell::descriptor)
    }

    pub fn empty() -> Self {
        Self {
            catalogue: Vec::new(),
        }
    }

    pub fn with_provider(mut self, name: &'static str, factory: Factory) -> Self {
        self.catalogue.push((name, factory));
        self
    }

    /// Names in the catalogue.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.catalogue.iter().map(|(name, _)| *name)
    }
}

impl Default for BuiltinLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderLoader for BuiltinLoader {
    fn resolve(&self, name: &str) -> Result<Box<dyn CodeUnit>> {
        self.catalogue
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(unit_name, factory)| {
                Box::new(BuiltinUnit {
                    name: *unit_name,
                    factory: *factory,
                }) as Box<dyn CodeUnit>
            })
            .ok_or_else(|| PluginError::load(name, "no builtin provider with that name"))
    }
}

struct BuiltinUnit {
    name: &'static str,
    factory: Factory,
}

impl CodeUnit for BuiltinUnit {
    fn register(&self) -> Result<ProviderDescriptor> {
        Ok((self.factory)())
    }

    fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    fn origin(&self) -> String {
        format!("builtin:{}", self.name)
    }
}

/// Tries each loader in order; the first that resolves the name wins.
pub struct ChainLoader {
    loaders: Vec<Box<dyn ProviderLoader>>,
}

impl ChainLoader {
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    pub fn with<L: ProviderLoader + 'static>(mut self, loader: L) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }

    /// Builtins first, then shared objects from `config.plugin_dir` on Unix.
    pub fn standard(config: LoaderConfig) -> Self {
        let chain = Self::new().with(BuiltinLoader::new());
        #[cfg(unix)]
        let chain = chain.with(crate::dylib::DylibLoader::new(config));
        #[cfg(not(unix))]
        let _ = config;
        chain
    }
}

impl Default for ChainLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderLoader for ChainLoader {
    fn resolve(&self, name: &str) -> Result<Box<dyn CodeUnit>> {
        let mut reasons = Vec::new();
        for loader in &self.loaders {
            match loader.resolve(name) {
                Ok(unit) => return Ok(unit),
                Err(PluginError::LoadError { reason, .. }) => reasons.push(reason),
                Err(other) => return Err(other),
            }
        }
        if reasons.is_empty() {
            reasons.push("no loaders configured".to_string());
        }
        Err(PluginError::load(name, reasons.join("; ")))
    }
}
