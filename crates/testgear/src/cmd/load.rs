use crate::cmd::ProviderArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_ack, OutputFormat};

/// Load (`load == true`) or unload a provider on the daemon.
pub fn run(args: ProviderArgs, format: OutputFormat, load: bool) -> CliResult<i32> {
    let mut client = args.target.client()?;
    let (action, result) = if load {
        ("load", client.load(&args.provider))
    } else {
        ("unload", client.unload(&args.provider))
    };
    result.map_err(|err| session_error(&format!("{action} failed"), err))?;
    print_ack(action, &args.provider, format);
    Ok(SUCCESS)
}
