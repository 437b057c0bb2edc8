use bytes::Bytes;
use testgear_wire::{Kind, Value};

use crate::cmd::SetArgs;
use crate::exit::{io_error, session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_ack, OutputFormat};

pub fn run(args: SetArgs, format: OutputFormat) -> CliResult<i32> {
    let value = build_value(&args)?;
    let mut client = args.target.client()?;
    client
        .set(&args.name, &value)
        .map_err(|err| session_error("set failed", err))?;
    print_ack("set", &args.name, format);
    Ok(SUCCESS)
}

fn build_value(args: &SetArgs) -> CliResult<Value> {
    if let Some(path) = &args.file {
        let contents = std::fs::read(path)
            .map_err(|err| io_error(&format!("failed to read {}", path.display()), err))?;
        return match args.kind {
            Kind::Data => Ok(Value::Data(Bytes::from(contents))),
            Kind::String => String::from_utf8(contents)
                .map(Value::String)
                .map_err(|_| CliError::new(USAGE, format!("{} is not UTF-8", path.display()))),
            other => Err(CliError::new(
                USAGE,
                format!("--file only applies to string or data values, not {other}"),
            )),
        };
    }

    let literal = args
        .value
        .as_deref()
        .ok_or_else(|| CliError::new(USAGE, "a value or --file is required"))?;
    Value::parse(args.kind, literal).map_err(|err| CliError::new(USAGE, err))
}
