use tracing::{debug, info, warn};

use crate::descriptor::{LifecycleHook, ProviderDescriptor};
use crate::error::{PluginError, Result};
use crate::loader::{CodeUnit, ProviderLoader};
use crate::table::CapabilityTable;

/// Split a dotted name such as `fb.xres` at its first `.`.
pub fn split_dotted(dotted: &str) -> Result<(&str, &str)> {
    dotted
        .split_once('.')
        .ok_or_else(|| PluginError::not_found("capability", dotted))
}

// Fields drop in declaration order: the table and hook go before the unit
// whose code they may point into.
struct LoadedProvider {
    name: String,
    table: CapabilityTable,
    unload_hook: Option<LifecycleHook>,
    unit: Box<dyn CodeUnit>,
}

/// Tracks loaded providers by unique name, in load order.
pub struct ProviderRegistry {
    loader: Box<dyn ProviderLoader>,
    providers: Vec<LoadedProvider>,
}

impl ProviderRegistry {
    pub fn new<L: ProviderLoader + 'static>(loader: L) -> Self {
        Self {
            loader: Box::new(loader),
            providers: Vec::new(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.providers.iter().position(|p| p.name == name)
    }

    /// Resolve, register and initialize the provider `name`.
    pub fn load(&mut self, name: &str) -> Result<()> {
        debug!(provider = name, "loading provider");
        if self.position(name).is_some() {
            return Err(PluginError::AlreadyLoaded(name.to_string()));
        }

        let unit = self.loader.resolve(name)?;
        let descriptor = match unit.register() {
            Ok(descriptor) => descriptor,
            Err(err) => {
                release_quietly(name, unit);
                return Err(err);
            }
        };

        let ProviderDescriptor {
            info,
            entries,
            init,
            load,
            unload,
        } = descriptor;
        if info.name != name {
            warn!(
                provider = name,
                registered_as = %info.name,
                "provider metadata name differs from the requested name"
            );
        }

        let mut table = CapabilityTable::new(info, entries);
        let initialized = init(&mut table);
        if let Err(err) = initialized {
            drop(table);
            drop((init, load, unload));
            release_quietly(name, unit);
            return Err(match err {
                PluginError::InitFailed { .. } => err,
                other => PluginError::InitFailed {
                    name: name.to_string(),
                    reason: other.to_string(),
                },
            });
        }
        log_provider_info(&table, &unit.origin());

        self.providers.push(LoadedProvider {
            name: name.to_string(),
            table,
            unload_hook: unload,
            unit,
        });

        if let Some(hook) = load {
            let status = hook();
            if status != 0 {
                warn!(provider = name, status, "load hook reported failure");
            }
        }

        info!(provider = name, "provider loaded");
        Ok(())
    }

    /// Run the unload hook, drop the table and release the code unit.
    ///
    /// The provider leaves the registry even when releasing its unit fails;
    /// that failure is still reported as [`PluginError::UnloadError`].
    pub fn unload(&mut self, name: &str) -> Result<()> {
        debug!(provider = name, "unloading provider");
        let idx = self
            .position(name)
            .ok_or_else(|| PluginError::not_found("provider", name))?;
        let LoadedProvider {
            name: _,
            table,
            unload_hook,
            unit,
        } = self.providers.remove(idx);

        if let Some(hook) = unload_hook {
            let status = hook();
            if status != 0 {
                warn!(provider = name, status, "unload hook reported failure");
            }
        }
        drop(table);

        unit.release().map_err(|err| {
            warn!(provider = name, error = %err, "code unit release failed");
            PluginError::UnloadError {
                name: name.to_string(),
                reason: err.to_string(),
            }
        })?;

        info!(provider = name, "provider unloaded");
        Ok(())
    }

    /// Unload every provider, newest first. Failures are logged.
    pub fn unload_all(&mut self) {
        while let Some(name) = self.providers.last().map(|p| p.name.clone()) {
            if let Err(err) = self.unload(&name) {
                warn!(provider = %name, error = %err, "unload during shutdown failed");
            }
        }
    }

    /// Names of loaded providers, in load order.
    pub fn list(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// The table of a loaded provider.
    pub fn provider(&self, name: &str) -> Result<&CapabilityTable> {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.table)
            .ok_or_else(|| PluginError::not_found("provider", name))
    }

    pub fn provider_mut(&mut self, name: &str) -> Result<&mut CapabilityTable> {
        self.providers
            .iter_mut()
            .find(|p| p.name == name)
            .map(|p| &mut p.table)
            .ok_or_else(|| PluginError::not_found("provider", name))
    }

    /// Map `provider.member` to the provider's table and the member name.
    pub fn resolve<'n>(&self, dotted: &'n str) -> Result<(&CapabilityTable, &'n str)> {
        let (provider, member) = split_dotted(dotted)?;
        Ok((self.provider(provider)?, member))
    }

    pub fn resolve_mut<'n>(&mut self, dotted: &'n str) -> Result<(&mut CapabilityTable, &'n str)> {
        let (provider, member) = split_dotted(dotted)?;
        Ok((self.provider_mut(provider)?, member))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list())
            .finish()
    }
}

fn release_quietly(name: &str, unit: Box<dyn CodeUnit>) {
    if let Err(err) = unit.release() {
        warn!(provider = name, error = %err, "code unit release failed");
    }
}

fn log_provider_info(table: &CapabilityTable, origin: &str) {
    let info = table.info();
    debug!(
        name = %info.name,
        version = %info.version,
        description = %info.description,
        author = %info.author,
        license = %info.license,
        origin,
        commands = %table.commands().collect::<Vec<_>>().join(" "),
        variables = %table.variables().collect::<Vec<_>>().join(" "),
        "provider information"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use testgear_wire::Kind;

    use super::*;
    use crate::descriptor::{CapabilityDef, ProviderInfo};
    use crate::loader::BuiltinLoader;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(BuiltinLoader::new())
    }

    #[test]
    fn double_load_is_already_loaded() {
        let mut reg = registry();
        reg.load("dummy").unwrap();
        assert!(matches!(
            reg.load("dummy"),
            Err(PluginError::AlreadyLoaded(name)) if name == "dummy"
        ));
        assert_eq!(reg.list(), vec!["dummy"]);
    }

    #[test]
    fn double_unload_is_not_found() {
        let mut reg = registry();
        reg.load("dummy").unwrap();
        reg.unload("dummy").unwrap();
        assert!(matches!(
            reg.unload("dummy"),
            Err(PluginError::NotFound { what: "provider", .. })
        ));
        assert!(reg.list().is_empty());
    }

    #[test]
    fn unknown_provider_is_load_error() {
        let mut reg = registry();
        assert!(matches!(reg.load("audio"), Err(PluginError::LoadError { .. })));
        assert!(!reg.is_loaded("audio"));
    }

    #[test]
    fn list_follows_load_order() {
        let mut reg = registry();
        reg.load("shell").unwrap();
        reg.load("dummy").unwrap();
        assert_eq!(reg.list(), vec!["shell", "dummy"]);
        reg.unload("shell").unwrap();
        assert_eq!(reg.list(), vec!["dummy"]);
    }

    #[test]
    fn resolve_dotted_names() {
        let mut reg = registry();
        reg.load("dummy").unwrap();

        let (table, member) = reg.resolve("dummy.int0").unwrap();
        assert_eq!(table.info().name, "dummy");
        assert_eq!(member, "int0");

        assert!(matches!(
            reg.resolve("dummy"),
            Err(PluginError::NotFound { what: "capability", .. })
        ));
        assert!(matches!(
            reg.resolve("fb.xres"),
            Err(PluginError::NotFound { what: "provider", .. })
        ));

        let (table, member) = reg.resolve_mut("dummy.string0").unwrap();
        table.set_string(member, "Hi world!").unwrap();
        assert_eq!(
            reg.provider("dummy").unwrap().get_string("string0").unwrap(),
            "Hi world!"
        );
    }

    static LOADS: AtomicUsize = AtomicUsize::new(0);
    static UNLOADS: AtomicUsize = AtomicUsize::new(0);

    fn hooked() -> ProviderDescriptor {
        ProviderDescriptor::new(
            ProviderInfo::new("hooked"),
            vec![CapabilityDef::variable("level", Kind::Int, "Level").with_default("7")],
        )
        .with_load(|| {
            LOADS.fetch_add(1, Ordering::SeqCst);
            0
        })
        .with_unload(|| {
            UNLOADS.fetch_add(1, Ordering::SeqCst);
            1
        })
    }

    #[test]
    fn hooks_run_around_lifecycle() {
        let mut reg = ProviderRegistry::new(BuiltinLoader::empty().with_provider("hooked", hooked));
        reg.load("hooked").unwrap();
        assert_eq!(LOADS.load(Ordering::SeqCst), 1);
        assert_eq!(reg.provider("hooked").unwrap().get_int("level").unwrap(), 7);

        reg.unload("hooked").unwrap();
        assert_eq!(UNLOADS.load(Ordering::SeqCst), 1);
    }

    fn failing_init() -> ProviderDescriptor {
        ProviderDescriptor::new(ProviderInfo::new("broken"), Vec::new())
            .with_init(|_| Err(PluginError::ReadOnly("hardware".to_string())))
    }

    #[test]
    fn init_failure_leaves_registry_unchanged() {
        let mut reg =
            ProviderRegistry::new(BuiltinLoader::empty().with_provider("broken", failing_init));
        assert!(matches!(
            reg.load("broken"),
            Err(PluginError::InitFailed { .. })
        ));
        assert!(reg.list().is_empty());
    }

    struct StickyLoader {
        releases: Arc<AtomicUsize>,
    }

    struct StickyUnit {
        releases: Arc<AtomicUsize>,
    }

    impl ProviderLoader for StickyLoader {
        fn resolve(&self, _name: &str) -> Result<Box<dyn CodeUnit>> {
            Ok(Box::new(StickyUnit {
                releases: Arc::clone(&self.releases),
            }))
        }
    }

    impl CodeUnit for StickyUnit {
        fn register(&self) -> Result<ProviderDescriptor> {
            Ok(ProviderDescriptor::new(ProviderInfo::new("sticky"), Vec::new()))
        }

        fn release(self: Box<Self>) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Err(PluginError::load("sticky", "handle busy"))
        }

        fn origin(&self) -> String {
            "test:sticky".to_string()
        }
    }

    #[test]
    fn failed_release_still_untracks_provider() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut reg = ProviderRegistry::new(StickyLoader {
            releases: Arc::clone(&releases),
        });
        reg.load("sticky").unwrap();

        assert!(matches!(
            reg.unload("sticky"),
            Err(PluginError::UnloadError { .. })
        ));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!reg.is_loaded("sticky"));
        reg.load("sticky").unwrap();
    }
}
