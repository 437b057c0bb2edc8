//! Providers loaded from shared objects with `dlopen`.
//!
//! A unit named `fb` lives at `<plugin_dir>/fb.so` and exports
//! [`REGISTER_SYMBOL`], a C function returning a pointer to a static
//! [`RawDescriptor`]. Variable and command tables end with an entry whose
//! `name` is null. Variable kinds are coded 0 (char) through 7 (data), in
//! the order of [`Kind::VARIABLES`].

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use testgear_wire::Kind;
use tracing::{debug, warn};

use crate::descriptor::{CapabilityDef, ProviderDescriptor, ProviderInfo};
use crate::error::{PluginError, Result};
use crate::loader::{CodeUnit, LoaderConfig, ProviderLoader};

/// Name of the registration entry point every unit exports.
pub const REGISTER_SYMBOL: &str = "testgear_provider_register";

pub type RawHook = unsafe extern "C" fn() -> c_int;
pub type RegisterFn = unsafe extern "C" fn() -> *const RawDescriptor;

#[repr(C)]
#[derive(Debug)]
pub struct RawVariable {
    pub name: *const c_char,
    pub kind: c_int,
    pub description: *const c_char,
    /// Default literal, or null for zero/empty.
    pub default_value: *const c_char,
}

#[repr(C)]
#[derive(Debug)]
pub struct RawCommand {
    pub name: *const c_char,
    pub description: *const c_char,
    pub function: Option<RawHook>,
}

#[repr(C)]
#[derive(Debug)]
pub struct RawDescriptor {
    pub name: *const c_char,
    pub version: *const c_char,
    pub description: *const c_char,
    pub author: *const c_char,
    pub license: *const c_char,
    /// Runs after defaults are applied; non-zero fails the load.
    pub init: Option<RawHook>,
    pub load: Option<RawHook>,
    pub unload: Option<RawHook>,
    pub variables: *const RawVariable,
    pub commands: *const RawCommand,
}

/// Loads `<plugin_dir>/<name>.<extension>` shared objects.
#[derive(Debug, Clone, Default)]
pub struct DylibLoader {
    config: LoaderConfig,
}

impl DylibLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }
}

impl ProviderLoader for DylibLoader {
    fn resolve(&self, name: &str) -> Result<Box<dyn CodeUnit>> {
        let path = self.config.unit_path(name);
        if !path.is_file() {
            return Err(PluginError::load(
                name,
                format!("{} does not exist", path.display()),
            ));
        }
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| PluginError::load(name, "unit path contains a NUL byte"))?;

        // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(PluginError::load(name, last_dl_error()));
        }

        let symbol = CString::new(REGISTER_SYMBOL)
            .map_err(|_| PluginError::load(name, "invalid entry point name"))?;
        // SAFETY: `handle` was returned non-null by dlopen and has not been closed.
        let register = unsafe { libc::dlsym(handle, symbol.as_ptr()) };
        if register.is_null() {
            // SAFETY: `handle` is open and no symbol from it has escaped.
            unsafe { libc::dlclose(handle) };
            return Err(PluginError::load(
                name,
                format!("entry point {REGISTER_SYMBOL} not found in {}", path.display()),
            ));
        }

        debug!(provider = name, path = %path.display(), "opened provider unit");
        // SAFETY: units export the entry point with the `RegisterFn` signature.
        let register = unsafe { std::mem::transmute::<*mut c_void, RegisterFn>(register) };
        Ok(Box::new(DylibUnit {
            name: name.to_string(),
            path,
            handle,
            register,
        }))
    }
}

struct DylibUnit {
    name: String,
    path: PathBuf,
    handle: *mut c_void,
    register: RegisterFn,
}

// SAFETY: dlopen handles are process-wide and may be used and closed from any thread.
unsafe impl Send for DylibUnit {}

impl CodeUnit for DylibUnit {
    fn register(&self) -> Result<ProviderDescriptor> {
        // SAFETY: the unit is still open, so its entry point is callable.
        let raw = unsafe { (self.register)() };
        if raw.is_null() {
            return Err(PluginError::load(&self.name, "entry point returned null"));
        }
        // SAFETY: a non-null result points at the unit's static descriptor,
        // which lives as long as the handle.
        unsafe { descriptor_from_raw(&self.name, &*raw) }
    }

    fn release(mut self: Box<Self>) -> Result<()> {
        let handle = std::mem::replace(&mut self.handle, std::ptr::null_mut());
        // SAFETY: `handle` is open; the registry drops every table and hook first.
        if unsafe { libc::dlclose(handle) } != 0 {
            return Err(PluginError::UnloadError {
                name: self.name.clone(),
                reason: last_dl_error(),
            });
        }
        Ok(())
    }

    fn origin(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for DylibUnit {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            // SAFETY: the handle has not been closed by `release`.
            unsafe { libc::dlclose(self.handle) };
        }
    }
}

fn last_dl_error() -> String {
    // SAFETY: dlerror returns null or a NUL-terminated, thread-local message.
    unsafe {
        let msg = libc::dlerror();
        if msg.is_null() {
            "unknown dynamic loader error".to_string()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

/// Copy a C string, treating null as empty.
///
/// # Safety
/// `ptr` must be null or point at a NUL-terminated string.
unsafe fn text(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn kind_from_code(code: c_int) -> Option<Kind> {
    usize::try_from(code)
        .ok()
        .and_then(|idx| Kind::VARIABLES.get(idx).copied())
}

/// Build a provider descriptor from a unit's C descriptor.
///
/// # Safety
/// Every pointer in `raw` must be null or valid for as long as the unit stays
/// loaded, and both tables must be terminated by an entry with a null name.
pub unsafe fn descriptor_from_raw(unit: &str, raw: &RawDescriptor) -> Result<ProviderDescriptor> {
    let info = ProviderInfo::new(text(raw.name))
        .version(text(raw.version))
        .description(text(raw.description))
        .author(text(raw.author))
        .license(text(raw.license));

    let mut entries = Vec::new();
    if !raw.variables.is_null() {
        let mut var = raw.variables;
        while !(*var).name.is_null() {
            let entry = &*var;
            let name = text(entry.name);
            let kind = kind_from_code(entry.kind).ok_or_else(|| {
                PluginError::load(unit, format!("variable {name} has unknown kind {}", entry.kind))
            })?;
            let mut def = CapabilityDef::variable(name, kind, text(entry.description));
            if !entry.default_value.is_null() {
                def = def.with_default(text(entry.default_value));
            }
            entries.push(def);
            var = var.add(1);
        }
    }

    if !raw.commands.is_null() {
        let mut cmd = raw.commands;
        while !(*cmd).name.is_null() {
            let entry = &*cmd;
            let name = text(entry.name);
            match entry.function {
                Some(function) => {
                    entries.push(CapabilityDef::command(
                        name,
                        text(entry.description),
                        // SAFETY: the function stays valid while the unit is loaded,
                        // and the table holding this closure is dropped first.
                        move |_table| unsafe { function() },
                    ));
                }
                None => warn!(provider = unit, command = %name, "command without a function; skipping"),
            }
            cmd = cmd.add(1);
        }
    }

    let mut descriptor = ProviderDescriptor::new(info, entries);
    if let Some(init) = raw.init {
        let unit = unit.to_string();
        descriptor = descriptor.with_init(move |table| {
            table.populate_defaults();
            // SAFETY: called during load while the unit is open.
            let status = unsafe { init() };
            if status != 0 {
                return Err(PluginError::InitFailed {
                    name: unit.clone(),
                    reason: format!("init hook returned {status}"),
                });
            }
            Ok(())
        });
    }
    if let Some(load) = raw.load {
        // SAFETY: called right after load while the unit is open.
        descriptor = descriptor.with_load(move || unsafe { load() });
    }
    if let Some(unload) = raw.unload {
        // SAFETY: called before the unit is released.
        descriptor = descriptor.with_unload(move || unsafe { unload() });
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;
    use crate::table::CapabilityTable;

    unsafe extern "C" fn status_five() -> c_int {
        5
    }

    unsafe extern "C" fn init_fails() -> c_int {
        1
    }

    #[test]
    fn missing_unit_is_load_error() {
        let dir = std::env::temp_dir().join(format!("testgear-dylib-missing-{}", std::process::id()));
        let loader = DylibLoader::new(LoaderConfig {
            plugin_dir: dir,
            ..LoaderConfig::default()
        });
        let err = loader.resolve("fb").err().unwrap();
        assert!(matches!(err, PluginError::LoadError { name, .. } if name == "fb"));
    }

    #[test]
    fn non_library_file_is_load_error() {
        let dir = std::env::temp_dir().join(format!("testgear-dylib-bogus-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bogus.so"), b"not an ELF object").unwrap();

        let loader = DylibLoader::new(LoaderConfig {
            plugin_dir: dir.clone(),
            ..LoaderConfig::default()
        });
        let err = loader.resolve("bogus").err().unwrap();
        assert!(matches!(err, PluginError::LoadError { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn raw_descriptor_converts() {
        let vars = [
            RawVariable {
                name: c"xres".as_ptr(),
                kind: 2,
                description: c"Horizontal resolution".as_ptr(),
                default_value: c"640".as_ptr(),
            },
            RawVariable {
                name: c"device".as_ptr(),
                kind: 6,
                description: c"Device node".as_ptr(),
                default_value: ptr::null(),
            },
            RawVariable {
                name: ptr::null(),
                kind: 0,
                description: ptr::null(),
                default_value: ptr::null(),
            },
        ];
        let cmds = [
            RawCommand {
                name: c"clear".as_ptr(),
                description: c"Clear screen".as_ptr(),
                function: Some(status_five),
            },
            RawCommand {
                name: ptr::null(),
                description: ptr::null(),
                function: None,
            },
        ];
        let raw = RawDescriptor {
            name: c"fb".as_ptr(),
            version: c"0.1".as_ptr(),
            description: c"Framebuffer plugin".as_ptr(),
            author: ptr::null(),
            license: c"BSD-3".as_ptr(),
            init: None,
            load: None,
            unload: Some(status_five),
            variables: vars.as_ptr(),
            commands: cmds.as_ptr(),
        };

        let d = unsafe { descriptor_from_raw("fb", &raw) }.unwrap();
        assert_eq!(d.info.name, "fb");
        assert_eq!(d.info.author, "");
        assert!(d.unload.is_some());

        let mut table = CapabilityTable::new(d.info, d.entries);
        (d.init)(&mut table).unwrap();
        assert_eq!(table.get_int("xres").unwrap(), 640);
        assert_eq!(table.get_string("device").unwrap(), "");
        assert_eq!(table.run("clear").unwrap(), 5);
        assert_eq!(
            table.list(),
            vec![
                ("xres", Kind::Int),
                ("device", Kind::String),
                ("clear", Kind::Command)
            ]
        );
    }

    #[test]
    fn raw_init_failure_and_bad_kind() {
        let raw = RawDescriptor {
            name: c"flaky".as_ptr(),
            version: ptr::null(),
            description: ptr::null(),
            author: ptr::null(),
            license: ptr::null(),
            init: Some(init_fails),
            load: None,
            unload: None,
            variables: ptr::null(),
            commands: ptr::null(),
        };
        let d = unsafe { descriptor_from_raw("flaky", &raw) }.unwrap();
        let mut table = CapabilityTable::new(d.info, d.entries);
        assert!(matches!(
            (d.init)(&mut table),
            Err(PluginError::InitFailed { .. })
        ));

        let vars = [
            RawVariable {
                name: c"odd".as_ptr(),
                kind: 42,
                description: ptr::null(),
                default_value: ptr::null(),
            },
            RawVariable {
                name: ptr::null(),
                kind: 0,
                description: ptr::null(),
                default_value: ptr::null(),
            },
        ];
        let raw = RawDescriptor {
            variables: vars.as_ptr(),
            init: None,
            ..raw
        };
        let err = unsafe { descriptor_from_raw("flaky", &raw) }.unwrap_err();
        assert!(matches!(err, PluginError::LoadError { .. }));
    }

    #[test]
    fn kind_codes_follow_variable_order() {
        assert_eq!(kind_from_code(0), Some(Kind::Char));
        assert_eq!(kind_from_code(7), Some(Kind::Data));
        assert_eq!(kind_from_code(8), None);
        assert_eq!(kind_from_code(-1), None);
    }
}
