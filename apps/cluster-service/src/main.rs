use clap::Parser;
use cluster_service::app;
use cluster_service::cli::Cli;
use cluster_service::error::CliError;
use cluster_service::telemetry::logging;

fn main() {
    let cli = Cli::parse();

    let result = logging::init(&cli.logging.to_config())
        .map_err(|err| CliError::Logging(err.to_string()))
        .and_then(|()| app::run(cli));

    if let Err(err) = result {
        eprintln!("cluster-service: {err}");
        std::process::exit(1);
    }
}
