use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::debug::DebugCommand;
use crate::telemetry::logging::{LogArea, LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "cluster-service",
    about = "Drive an instrument cluster display from a navigation client",
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "CLUSTER_SOCKET",
        value_name = "PATH",
        help = "Socket the cluster host listens on"
    )]
    pub socket: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        global = true,
        value_enum,
        env = "CLUSTER_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-area",
        global = true,
        value_enum,
        value_name = "AREA",
        help = "Restrict verbose logging to these areas (repeatable)"
    )]
    pub areas: Vec<LogArea>,

    #[arg(
        long = "log-file",
        global = true,
        value_name = "PATH",
        env = "CLUSTER_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            areas: self.areas.clone(),
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the cluster rendering host until interrupted
    Serve(ServeArgs),
    /// Print the cluster configuration advertised by the host
    Info,
    /// Push one navigation event to the host
    SendEvent(SendEventArgs),
    /// Report an activity's placement to the host
    SetState(SetStateArgs),
    /// Run a diagnostic command against an in-process host and print its state
    #[command(subcommand)]
    Debug(DebugCommand),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    #[arg(
        long = "display",
        value_name = "ID",
        help = "Announce a cluster display as attached (repeatable)"
    )]
    pub displays: Vec<i32>,
}

#[derive(Args, Debug, Clone)]
pub struct SendEventArgs {
    #[arg(long = "type", value_name = "N", allow_negative_numbers = true)]
    pub event_type: i32,

    #[arg(
        long = "field",
        value_name = "KEY=VALUE",
        help = "Payload entry; numbers and booleans are typed, anything else is a string"
    )]
    pub fields: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SetStateArgs {
    #[arg(long, value_name = "CATEGORY")]
    pub category: String,

    #[arg(long, help = "Report the activity as obscured")]
    pub obscured: bool,

    #[arg(allow_negative_numbers = true)]
    pub left: i32,
    #[arg(allow_negative_numbers = true)]
    pub top: i32,
    #[arg(allow_negative_numbers = true)]
    pub right: i32,
    #[arg(allow_negative_numbers = true)]
    pub bottom: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "cluster-service",
            "send-event",
            "--type",
            "3",
            "--field",
            "road=A1",
            "--socket",
            "/tmp/c.sock",
            "--log-level",
            "debug",
            "--log-area",
            "ipc",
        ])
        .expect("parse");
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/c.sock")));
        assert_eq!(cli.logging.level, LogLevel::Debug);
        assert_eq!(cli.logging.to_config().areas, vec![LogArea::Ipc]);
        let Command::SendEvent(args) = cli.command else {
            panic!("expected send-event");
        };
        assert_eq!(args.event_type, 3);
        assert_eq!(args.fields, vec!["road=A1".to_owned()]);
    }

    #[test]
    fn debug_subcommands_are_nested() {
        let cli = Cli::try_parse_from(["cluster-service", "debug", "inject-key", "20"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::Debug(DebugCommand::InjectKey { key_code: 20 })
        ));
    }
}
