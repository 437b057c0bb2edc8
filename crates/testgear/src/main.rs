mod cmd;
#[cfg(unix)]
mod daemon;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "testgear", version, about = "Test Gear daemon and controller")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        env = "TESTGEAR_LOG_FORMAT",
        default_value = "text",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "TESTGEAR_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::Connection;
    use testgear_wire::Kind;

    #[test]
    fn parses_serve_defaults() {
        let cli = Cli::try_parse_from(["testgear", "serve"]).expect("serve args should parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.connection, Connection::Tcp);
        assert_eq!(args.port, 8000);
        assert_eq!(args.bind, "0.0.0.0");
        assert!(!args.daemon);
        assert!(args.read_timeout.is_none());
    }

    #[test]
    fn parses_serve_over_unix_socket() {
        let cli = Cli::try_parse_from([
            "testgear",
            "serve",
            "--connection",
            "unix",
            "--socket",
            "/tmp/testgear.sock",
            "--preload",
            "dummy,shell",
        ])
        .expect("serve args should parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.connection, Connection::Unix);
        assert_eq!(args.preload, vec!["dummy".to_string(), "shell".to_string()]);
    }

    #[test]
    fn parses_get_with_kind() {
        let cli = Cli::try_parse_from(["testgear", "get", "dummy.short0", "--kind", "short"])
            .expect("get args should parse");
        let Command::Get(args) = cli.command else {
            panic!("expected get");
        };
        assert_eq!(args.kind, Kind::Short);
        assert_eq!(args.name, "dummy.short0");
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = Cli::try_parse_from(["testgear", "get", "dummy.int0", "--kind", "bogus"])
            .expect_err("unknown kind should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn rejects_conflicting_set_sources() {
        let err = Cli::try_parse_from([
            "testgear",
            "set",
            "dummy.data0",
            "abc",
            "--kind",
            "data",
            "--file",
            "/tmp/blob",
        ])
        .expect_err("value and file should conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_run_over_socket() {
        let cli = Cli::try_parse_from([
            "testgear",
            "run",
            "dummy.command0",
            "--socket",
            "/tmp/testgear.sock",
        ])
        .expect("run args should parse");
        assert!(matches!(cli.command, Command::Run(_)));
    }
}
