use crate::cmd::ProviderArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_properties, OutputFormat};

pub fn run(args: ProviderArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = args.target.client()?;
    let properties = client
        .list_properties(&args.provider)
        .map_err(|err| session_error("props failed", err))?;
    print_properties(&args.provider, &properties, format);
    Ok(SUCCESS)
}
