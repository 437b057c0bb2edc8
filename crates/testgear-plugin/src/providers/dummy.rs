//! `dummy`: one variable of every kind plus a no-op command, for exercising
//! the protocol end to end.

use testgear_wire::Kind;
use tracing::debug;

use crate::descriptor::{CapabilityDef, ProviderDescriptor, ProviderInfo};

pub fn descriptor() -> ProviderDescriptor {
    let info = ProviderInfo::new("dummy")
        .version("0.1")
        .description("Dummy plugin (for testing only)")
        .author("Martin Lund")
        .license("BSD-3");

    let entries = vec![
        CapabilityDef::variable("char0", Kind::Char, "Test char 0"),
        CapabilityDef::variable("short0", Kind::Short, "Test short 0"),
        CapabilityDef::variable("int0", Kind::Int, "Test int 0"),
        CapabilityDef::variable("long0", Kind::Long, "Test long 0"),
        CapabilityDef::variable("float0", Kind::Float, "Test float 0"),
        CapabilityDef::variable("double0", Kind::Double, "Test double 0"),
        CapabilityDef::variable("string0", Kind::String, "Test string 0"),
        CapabilityDef::variable("data0", Kind::Data, "Test data 0"),
        CapabilityDef::command("command0", "Run command", |_table| {
            debug!(provider = "dummy", "running command0");
            0
        }),
    ];

    ProviderDescriptor::new(info, entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CapabilityTable;

    #[test]
    fn every_variable_starts_at_zero() {
        let d = descriptor();
        let mut table = CapabilityTable::new(d.info, d.entries);
        (d.init)(&mut table).unwrap();

        assert_eq!(table.get_char("char0").unwrap(), 0);
        assert_eq!(table.get_int("int0").unwrap(), 0);
        assert_eq!(table.get_long("long0").unwrap(), 0);
        assert_eq!(table.get_string("string0").unwrap(), "");
        assert!(table.get_data("data0").unwrap().is_empty());
        assert_eq!(table.run("command0").unwrap(), 0);
    }
}
