use crate::cmd::NameArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_status, OutputFormat};

/// Run a command. The command's own status is printed; the exit code only
/// reflects whether the request succeeded.
pub fn run(args: NameArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = args.target.client()?;
    let status = client
        .run(&args.name)
        .map_err(|err| session_error("run failed", err))?;
    print_status(&args.name, status, format);
    Ok(SUCCESS)
}
