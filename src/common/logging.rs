use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// Events go to stderr and, when `logs_dir` can be created, to a daily
/// rolling file there. `RUST_LOG` overrides the default filter. The returned
/// guard must be held until exit so buffered file output is flushed.
pub fn init(verbose: bool, logs_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_filter = if verbose { "adsweep=debug" } else { "adsweep=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let logs_dir = logs_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok());
    match logs_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "adsweep.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init();
            None
        }
    }
}
