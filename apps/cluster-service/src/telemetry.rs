//! Process-wide diagnostics for the service binary.

pub mod logging {
    //! Every event in the workspace is tagged `cluster::<area>`, so verbosity
    //! is chosen per area. Third-party crates stay at `warn` unless
    //! [`FILTER_ENV`] replaces the whole filter.

    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use std::sync::OnceLock;

    use clap::ValueEnum;
    use tracing::level_filters::LevelFilter;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::EnvFilter;

    pub const FILTER_ENV: &str = "CLUSTER_LOG_FILTER";

    #[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
    pub enum LogLevel {
        Error,
        #[default]
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl From<LogLevel> for LevelFilter {
        fn from(level: LogLevel) -> Self {
            match level {
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            }
        }
    }

    /// Part of the service that logs under its own target.
    #[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
    pub enum LogArea {
        App,
        Channel,
        Config,
        Debug,
        Host,
        Ipc,
        Launcher,
        Local,
        Proxy,
        Renderer,
        Supervisor,
        Transport,
    }

    impl LogArea {
        pub fn target(self) -> &'static str {
            match self {
                LogArea::App => "cluster::app",
                LogArea::Channel => "cluster::channel",
                LogArea::Config => "cluster::config",
                LogArea::Debug => "cluster::debug",
                LogArea::Host => "cluster::host",
                LogArea::Ipc => "cluster::ipc",
                LogArea::Launcher => "cluster::launcher",
                LogArea::Local => "cluster::local",
                LogArea::Proxy => "cluster::proxy",
                LogArea::Renderer => "cluster::renderer",
                LogArea::Supervisor => "cluster::supervisor",
                LogArea::Transport => "cluster::transport",
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        /// Areas raised to `level`. Empty means every area.
        pub areas: Vec<LogArea>,
        pub file: Option<PathBuf>,
    }

    impl LogConfig {
        /// `EnvFilter` directives for this configuration.
        pub fn directives(&self) -> String {
            let level = LevelFilter::from(self.level);
            if self.level <= LogLevel::Warn {
                return level.to_string().to_lowercase();
            }
            let mut directives = String::from("warn");
            if self.areas.is_empty() {
                directives.push_str(&format!(",cluster={level}"));
            }
            for area in &self.areas {
                directives.push_str(&format!(",{}={level}", area.target()));
            }
            directives.to_lowercase()
        }
    }

    #[derive(thiserror::Error, Debug)]
    pub enum InitError {
        #[error("failed to open log file {path:?}: {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("failed to install logger: {0}")]
        Install(String),
    }

    static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    /// Installs the global subscriber. Later calls are no-ops.
    pub fn init(config: &LogConfig) -> Result<(), InitError> {
        if GUARD.get().is_some() {
            return Ok(());
        }

        let filter = match std::env::var(FILTER_ENV) {
            Ok(custom) => EnvFilter::new(custom),
            Err(_) => EnvFilter::new(config.directives()),
        };

        let (writer, guard) = match &config.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InitError::Io {
                        path: path.clone(),
                        source,
                    })?;
                tracing_appender::non_blocking(file)
            }
            None => tracing_appender::non_blocking(std::io::stderr()),
        };

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(config.level >= LogLevel::Debug || !config.areas.is_empty())
            .with_thread_names(config.level == LogLevel::Trace)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Install(err.to_string()))?;
        let _ = GUARD.set(guard);
        Ok(())
    }

}
