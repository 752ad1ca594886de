use std::fmt;

use tracing::Level;

/// A sink for the messages a publisher reports to its user.
///
/// Publishers without a logger are silent. Messages are reported when a publish cycle fails, when an unrecognized
/// metric is skipped, and, in verbose mode, on every cache reset and every flushed change set.
///
/// Closures taking a [`Level`] and the formatted message implement this trait.
pub trait Logger: Send + Sync {
    /// Reports a single message.
    fn log(&self, level: Level, message: fmt::Arguments<'_>);
}

impl<F> Logger for F
where
    F: Fn(Level, fmt::Arguments<'_>) + Send + Sync,
{
    fn log(&self, level: Level, message: fmt::Arguments<'_>) {
        self(level, message);
    }
}

/// A logger that emits every message as a [`tracing`] event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: fmt::Arguments<'_>) {
        match level {
            Level::ERROR => tracing::error!(target: "metrics_exporter_signalfx", "{}", message),
            Level::WARN => tracing::warn!(target: "metrics_exporter_signalfx", "{}", message),
            Level::INFO => tracing::info!(target: "metrics_exporter_signalfx", "{}", message),
            Level::DEBUG => tracing::debug!(target: "metrics_exporter_signalfx", "{}", message),
            _ => tracing::trace!(target: "metrics_exporter_signalfx", "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::Level;

    use super::{Logger, TracingLogger};

    #[test]
    fn closures_are_loggers() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let logger: Arc<dyn Logger> = Arc::new(move |level: Level, message: std::fmt::Arguments<'_>| {
            sink.lock().unwrap().push(format!("{level}: {message}"));
        });

        logger.log(Level::ERROR, format_args!("unable to publish: {}", "timeout"));
        assert_eq!(*lines.lock().unwrap(), vec!["ERROR: unable to publish: timeout"]);
    }

    #[test]
    fn tracing_logger_accepts_every_level() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        for level in [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE] {
            TracingLogger.log(level, format_args!("level {level}"));
        }
    }
}
