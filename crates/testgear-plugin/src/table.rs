//! Per-provider, name-indexed store of typed variables and commands.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use testgear_wire::{Kind, Value};
use tracing::warn;

use crate::descriptor::{CapabilityDef, CommandFn, ProviderInfo, Slot};
use crate::error::{PluginError, Result};

/// Read-only virtual variables served from the provider's metadata, with the
/// text `describe` returns for each.
pub const RESERVED_NAMES: [(&str, &str); 5] = [
    ("name", "Plugin name"),
    ("version", "Plugin version"),
    ("description", "Plugin description"),
    ("author", "Plugin author"),
    ("license", "Plugin license"),
];

enum Cell {
    Variable { value: Value, default: Option<String> },
    Command(CommandFn),
}

struct Entry {
    name: String,
    description: String,
    cell: Cell,
}

impl Entry {
    fn kind(&self) -> Kind {
        match &self.cell {
            Cell::Variable { value, .. } => value.kind(),
            Cell::Command(_) => Kind::Command,
        }
    }
}

/// The capability table of one loaded provider.
///
/// Entries keep their definition order. When two entries share a name the
/// first one is reachable by lookups; both still appear in [`list`](Self::list).
pub struct CapabilityTable {
    info: ProviderInfo,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl CapabilityTable {
    /// Build a table from definitions. Variables start at zero/empty.
    pub fn new(info: ProviderInfo, defs: Vec<CapabilityDef>) -> Self {
        let mut entries = Vec::with_capacity(defs.len());
        let mut index = HashMap::with_capacity(defs.len());

        for def in defs {
            let cell = match def.slot {
                Slot::Variable { kind, default } => match Value::zero(kind) {
                    Some(value) => Cell::Variable { value, default },
                    None => {
                        warn!(
                            provider = %info.name,
                            name = %def.name,
                            "variable declared with command kind; skipping"
                        );
                        continue;
                    }
                },
                Slot::Command(function) => Cell::Command(function),
            };

            if index.contains_key(&def.name) {
                warn!(
                    provider = %info.name,
                    name = %def.name,
                    "duplicate capability name; keeping the first definition"
                );
            } else {
                index.insert(def.name.clone(), entries.len());
            }

            entries.push(Entry {
                name: def.name,
                description: def.description,
                cell,
            });
        }

        Self {
            info,
            entries,
            index,
        }
    }

    /// Reset every variable to its default literal, or zero/empty without one.
    pub fn populate_defaults(&mut self) {
        for entry in &mut self.entries {
            if let Cell::Variable { value, default } = &mut entry.cell {
                let kind = value.kind();
                let fresh = match default {
                    Some(literal) => Value::parse_lenient(kind, literal),
                    None => Value::zero(kind),
                };
                if let Some(fresh) = fresh {
                    *value = fresh;
                }
            }
        }
    }

    pub fn info(&self) -> &ProviderInfo {
        &self.info
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).map(|&idx| &self.entries[idx])
    }

    fn is_reserved(name: &str) -> bool {
        RESERVED_NAMES.iter().any(|(reserved, _)| *reserved == name)
    }

    /// Read a variable.
    ///
    /// With `expected` set, an entry of another kind is a
    /// [`PluginError::KindMismatch`]. Reserved metadata names read as strings.
    pub fn get(&self, name: &str, expected: Option<Kind>) -> Result<Value> {
        if let Some(text) = self.info.field(name) {
            return match expected {
                Some(kind) if kind != Kind::String => Err(PluginError::KindMismatch {
                    name: name.to_string(),
                    expected: kind,
                    found: Kind::String,
                }),
                _ => Ok(Value::String(text.to_string())),
            };
        }

        let entry = self
            .lookup(name)
            .ok_or_else(|| PluginError::not_found("variable", name))?;
        match (&entry.cell, expected) {
            (Cell::Variable { value, .. }, Some(kind)) if value.kind() != kind => {
                Err(PluginError::KindMismatch {
                    name: name.to_string(),
                    expected: kind,
                    found: value.kind(),
                })
            }
            (Cell::Variable { value, .. }, _) => Ok(value.clone()),
            (Cell::Command(_), Some(kind)) => Err(PluginError::KindMismatch {
                name: name.to_string(),
                expected: kind,
                found: Kind::Command,
            }),
            (Cell::Command(_), None) => Err(PluginError::not_found("variable", name)),
        }
    }

    /// Replace a variable's value. The value's kind must match the entry's.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        if Self::is_reserved(name) {
            return Err(PluginError::ReadOnly(name.to_string()));
        }

        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| PluginError::not_found("variable", name))?;
        let entry = &mut self.entries[idx];
        let found = entry.kind();
        match &mut entry.cell {
            Cell::Variable { value: slot, .. } if found == value.kind() => {
                *slot = value;
                Ok(())
            }
            _ => Err(PluginError::KindMismatch {
                name: name.to_string(),
                expected: value.kind(),
                found,
            }),
        }
    }

    /// Run a command and return its status.
    pub fn run(&mut self, name: &str) -> Result<i32> {
        let function = match self.lookup(name).map(|entry| &entry.cell) {
            Some(Cell::Command(function)) => Arc::clone(function),
            _ => return Err(PluginError::not_found("command", name)),
        };
        Ok(function(self))
    }

    /// Describe a capability. An empty name describes the provider itself.
    pub fn describe(&self, name: &str) -> Result<&str> {
        if name.is_empty() {
            return Ok(&self.info.description);
        }
        if let Some((_, text)) = RESERVED_NAMES.iter().find(|(reserved, _)| *reserved == name) {
            return Ok(*text);
        }
        self.lookup(name)
            .map(|entry| entry.description.as_str())
            .ok_or_else(|| PluginError::not_found("variable or command", name))
    }

    /// All entries as `(name, kind)`, in definition order, commands included.
    pub fn list(&self) -> Vec<(&str, Kind)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.kind()))
            .collect()
    }

    /// Names of all variables, in definition order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.cell, Cell::Variable { .. }))
            .map(|entry| entry.name.as_str())
    }

    /// Names of all commands, in definition order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.cell, Cell::Command(_)))
            .map(|entry| entry.name.as_str())
    }
}

macro_rules! typed_accessors {
    ($($get:ident, $set:ident, $variant:ident, $ty:ty;)*) => {
        impl CapabilityTable {
            $(
                pub fn $get(&self, name: &str) -> Result<$ty> {
                    match self.get(name, Some(Kind::$variant))? {
                        Value::$variant(v) => Ok(v),
                        other => Err(PluginError::KindMismatch {
                            name: name.to_string(),
                            expected: Kind::$variant,
                            found: other.kind(),
                        }),
                    }
                }

                pub fn $set(&mut self, name: &str, value: impl Into<$ty>) -> Result<()> {
                    self.set(name, Value::$variant(value.into()))
                }
            )*
        }
    };
}

typed_accessors! {
    get_char, set_char, Char, i8;
    get_short, set_short, Short, i16;
    get_int, set_int, Int, i32;
    get_long, set_long, Long, i64;
    get_float, set_float, Float, f32;
    get_double, set_double, Double, f64;
    get_string, set_string, String, String;
    get_data, set_data, Data, Bytes;
}

impl std::fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityTable")
            .field("provider", &self.info.name)
            .field("entries", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CapabilityTable {
        let info = ProviderInfo::new("sample")
            .version("1.2")
            .description("Sample provider")
            .author("Lab")
            .license("BSD-3");
        let defs = vec![
            CapabilityDef::variable("label", Kind::String, "Display label"),
            CapabilityDef::variable("gain", Kind::Int, "Gain").with_default("12"),
            CapabilityDef::variable("ratio", Kind::Float, "Ratio").with_default("bogus"),
            CapabilityDef::command("bump", "Increment gain", |table: &mut CapabilityTable| {
                let gain = table.get_int("gain").unwrap_or(0) + 1;
                match table.set_int("gain", gain) {
                    Ok(()) => gain,
                    Err(_) => -1,
                }
            }),
        ];
        let mut table = CapabilityTable::new(info, defs);
        table.populate_defaults();
        table
    }

    #[test]
    fn string_set_then_get() {
        let mut t = table();
        t.set_string("label", "hi").unwrap();
        assert_eq!(t.get_string("label").unwrap(), "hi");
        t.set_string("label", "a much longer replacement").unwrap();
        assert_eq!(t.get_string("label").unwrap(), "a much longer replacement");
    }

    #[test]
    fn wrong_kind_is_mismatch() {
        let t = table();
        let err = t.get_int("label").unwrap_err();
        assert!(matches!(
            err,
            PluginError::KindMismatch {
                expected: Kind::Int,
                found: Kind::String,
                ..
            }
        ));

        let mut t = table();
        let err = t.set_short("gain", 1i16).unwrap_err();
        assert!(matches!(err, PluginError::KindMismatch { .. }));
    }

    #[test]
    fn missing_variable_is_not_found() {
        let t = table();
        assert!(matches!(
            t.get("nope", None),
            Err(PluginError::NotFound { what: "variable", .. })
        ));
    }

    #[test]
    fn reserved_names_are_read_only_metadata() {
        let mut t = table();
        assert_eq!(t.get_string("name").unwrap(), "sample");
        assert_eq!(t.get_string("version").unwrap(), "1.2");
        assert!(matches!(
            t.set_string("name", "x"),
            Err(PluginError::ReadOnly(name)) if name == "name"
        ));
        assert!(matches!(t.set_int("license", 3), Err(PluginError::ReadOnly(_))));
    }

    #[test]
    fn defaults_parse_leniently() {
        let t = table();
        assert_eq!(t.get_int("gain").unwrap(), 12);
        assert_eq!(t.get_float("ratio").unwrap(), 0.0);
        assert_eq!(t.get_string("label").unwrap(), "");
    }

    #[test]
    fn commands_run_against_the_table() {
        let mut t = table();
        assert_eq!(t.run("bump").unwrap(), 13);
        assert_eq!(t.get_int("gain").unwrap(), 13);
        assert!(matches!(
            t.run("label"),
            Err(PluginError::NotFound { what: "command", .. })
        ));
        assert!(matches!(
            t.get("bump", Some(Kind::Int)),
            Err(PluginError::KindMismatch {
                found: Kind::Command,
                ..
            })
        ));
    }

    #[test]
    fn describe_covers_provider_reserved_and_entries() {
        let t = table();
        assert_eq!(t.describe("").unwrap(), "Sample provider");
        assert_eq!(t.describe("author").unwrap(), "Plugin author");
        assert_eq!(t.describe("gain").unwrap(), "Gain");
        assert_eq!(t.describe("bump").unwrap(), "Increment gain");
        assert!(t.describe("missing").is_err());
    }

    #[test]
    fn list_keeps_definition_order() {
        let t = table();
        assert_eq!(
            t.list(),
            vec![
                ("label", Kind::String),
                ("gain", Kind::Int),
                ("ratio", Kind::Float),
                ("bump", Kind::Command),
            ]
        );
        assert_eq!(t.commands().collect::<Vec<_>>(), vec!["bump"]);
    }

    #[test]
    fn duplicate_names_keep_first() {
        let defs = vec![
            CapabilityDef::variable("x", Kind::Int, "first"),
            CapabilityDef::variable("x", Kind::String, "second"),
        ];
        let t = CapabilityTable::new(ProviderInfo::new("dup"), defs);
        assert_eq!(t.len(), 2);
        assert_eq!(t.describe("x").unwrap(), "first");
        assert_eq!(t.get("x", None).unwrap(), Value::Int(0));
    }

    #[test]
    fn data_values() {
        let mut t = CapabilityTable::new(
            ProviderInfo::new("blob"),
            vec![CapabilityDef::variable("buf", Kind::Data, "Buffer")],
        );
        t.set_data("buf", Bytes::from_static(b"\x00\x01")).unwrap();
        assert_eq!(t.get_data("buf").unwrap().as_ref(), b"\x00\x01");
    }
}
