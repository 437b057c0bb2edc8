use crate::cmd::TargetArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_providers, OutputFormat};

pub fn run(args: TargetArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = args.client()?;
    let providers = client
        .list_plugins()
        .map_err(|err| session_error("list failed", err))?;
    print_providers(&providers, format);
    Ok(SUCCESS)
}
