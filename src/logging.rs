//! Log sink used by failure actions, and subscriber setup for the binary

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[cfg(test)]
use mockall::automock;

/// Environment variable overriding the CLI log filter
pub const LOG_ENV_VAR: &str = "GEM_ENFORCER_LOG";

/// Level a failure message is logged at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    #[default]
    Error,
    /// Logged as an error; kept distinct so it can be reported as such
    Fatal,
}

impl LogLevel {
    pub const ALLOWED: [&'static str; 6] = ["trace", "debug", "info", "warn", "error", "fatal"];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for policy failure messages
#[cfg_attr(test, automock)]
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards messages to the global `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!("{}", message),
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Fatal => tracing::error!(fatal = true, "{}", message),
        }
    }
}

/// Subscriber options chosen on the command line
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Filter directive used when `GEM_ENFORCER_LOG` is not set
    pub filter: String,
    /// Write to this file instead of stderr
    pub file: Option<PathBuf>,
    pub json: bool,
}

/// Installs the global subscriber
///
/// The returned guard must be held until exit so buffered file output is flushed.
pub fn init_logging(options: &LogOptions) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(&options.filter))?;

    let (writer, guard) = match &options.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(options.file.is_none());

    let result = if options.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!(e))?;

    Ok(guard)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::{LogLevel, LogSink};

    /// Sink that keeps every message for assertions
    #[derive(Default)]
    pub struct RecordingSink {
        entries: Mutex<Vec<(LogLevel, String)>>,
    }

    impl RecordingSink {
        pub fn entries(&self) -> Vec<(LogLevel, String)> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl LogSink for RecordingSink {
        fn log(&self, level: LogLevel, message: &str) {
            self.entries
                .lock()
                .unwrap()
                .push((level, message.to_string()));
        }
    }
}
