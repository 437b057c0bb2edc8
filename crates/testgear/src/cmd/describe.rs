use crate::cmd::NameArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_description, OutputFormat};

pub fn run(args: NameArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = args.target.client()?;
    let description = client
        .describe(&args.name)
        .map_err(|err| session_error("describe failed", err))?;
    print_description(&args.name, &description, format);
    Ok(SUCCESS)
}
