use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use testgear_session::{Client, Endpoint};
use testgear_transport::Stream;
use testgear_wire::{Kind, WireConfig, DEFAULT_MAX_PAYLOAD};

use crate::exit::{session_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod describe;
pub mod get;
pub mod list;
pub mod load;
pub mod props;
pub mod run;
pub mod serve;
pub mod set;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the daemon: accept one controller connection and serve it.
    Serve(ServeArgs),
    /// List loaded providers.
    List(TargetArgs),
    /// Load a provider.
    Load(ProviderArgs),
    /// Unload a provider.
    Unload(ProviderArgs),
    /// List a provider's variables and commands.
    Props(ProviderArgs),
    /// Read a variable.
    Get(GetArgs),
    /// Write a variable.
    Set(SetArgs),
    /// Run a command.
    Run(NameArgs),
    /// Describe a provider, variable or command.
    Describe(NameArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::List(args) => list::run(args, format),
        Command::Load(args) => load::run(args, format, true),
        Command::Unload(args) => load::run(args, format, false),
        Command::Props(args) => props::run(args, format),
        Command::Get(args) => get::run(args, format),
        Command::Set(args) => set::run(args, format),
        Command::Run(args) => run::run(args, format),
        Command::Describe(args) => describe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Connection {
    Tcp,
    Unix,
    Serial,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Connection type.
    #[arg(long, value_enum, default_value = "tcp")]
    pub connection: Connection,
    /// TCP listen port.
    #[arg(long, env = "TESTGEAR_PORT", default_value_t = testgear_transport::DEFAULT_PORT)]
    pub port: u16,
    /// TCP listen address.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,
    /// Unix socket path (with `--connection unix`).
    #[arg(long, env = "TESTGEAR_SOCKET")]
    pub socket: Option<PathBuf>,
    /// Directory holding dynamically loaded providers.
    #[arg(long, env = "TESTGEAR_PLUGIN_DIR", default_value = "./plugins")]
    pub plugin_dir: PathBuf,
    /// Providers to load before accepting a connection (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub preload: Vec<String>,
    /// Detach from the terminal after binding.
    #[arg(long)]
    pub daemon: bool,
    /// Largest accepted payload in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
    /// Per-read timeout (e.g. 30s, 500ms). Off by default.
    #[arg(long)]
    pub read_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Daemon TCP address.
    #[arg(long, env = "TESTGEAR_CONNECT", default_value = "127.0.0.1:8000")]
    pub connect: String,
    /// Daemon Unix socket path; takes precedence over `--connect`.
    #[arg(long, env = "TESTGEAR_SOCKET")]
    pub socket: Option<PathBuf>,
    /// Response timeout (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
}

impl TargetArgs {
    pub fn endpoint(&self) -> Endpoint {
        match &self.socket {
            Some(path) => Endpoint::Unix(path.clone()),
            None => Endpoint::Tcp(self.connect.clone()),
        }
    }

    pub fn client(&self) -> CliResult<Client<Stream, Stream>> {
        let timeout = self.timeout.as_deref().map(parse_duration).transpose()?;
        let config = WireConfig {
            read_timeout: timeout,
            write_timeout: timeout,
            ..WireConfig::default()
        };
        let endpoint = self.endpoint();
        tracing::debug!(%endpoint, "connecting");
        endpoint
            .connect(config)
            .map_err(|err| session_error("connect failed", err))
    }
}

#[derive(Args, Debug)]
pub struct ProviderArgs {
    /// Provider name.
    pub provider: String,
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug)]
pub struct NameArgs {
    /// Dotted capability name (`provider.name`).
    pub name: String,
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Dotted variable name (`provider.name`).
    pub name: String,
    /// Variable kind.
    #[arg(long, short = 'k')]
    pub kind: Kind,
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Dotted variable name (`provider.name`).
    pub name: String,
    /// New value, parsed according to `--kind`.
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub value: Option<String>,
    /// Variable kind.
    #[arg(long, short = 'k')]
    pub kind: Kind,
    /// Read a string or data value from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
