use crate::cmd::GetArgs;
use crate::exit::{session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_value, OutputFormat};

pub fn run(args: GetArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.kind.is_variable() {
        return Err(CliError::new(
            USAGE,
            format!("{} entries have no value; use `run`", args.kind),
        ));
    }
    let mut client = args.target.client()?;
    let value = client
        .get(args.kind, &args.name)
        .map_err(|err| session_error("get failed", err))?;
    print_value(&args.name, &value, format);
    Ok(SUCCESS)
}
