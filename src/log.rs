//! Log setup for the `relic` binary.
//!
//! Besides the usual stderr, file and journald outputs, everything is also collected in a
//! [`LogBuffer`] so the whole session can be handed over in one piece when the run is done.
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use parking_lot::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, EnvFilter};

/// In-memory log sink. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// # Errors
    /// Cannot write `path`.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, &*self.0.lock())
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Keeps the log outputs alive. Drop it (or call [`Logging::finish`]) before exiting so the
/// file appender gets flushed.
pub struct Logging {
    pub buffer: LogBuffer,
    pub log_dir: PathBuf,
    _guard: WorkerGuard,
}

impl Logging {
    /// Flush everything; if `dest` is given the collected log is written there too.
    ///
    /// # Errors
    /// Cannot write `dest`.
    pub fn finish(self, dest: Option<&Path>) -> Result<()> {
        if let Some(dest) = dest {
            self.buffer.write_to(dest).wrap_err_with(|| format!("cannot write log to {dest:?}"))?;
        }
        Ok(())
    }
}

/// Install `color_eyre` and a global subscriber. `RUST_LOG` overrides the default `info` level.
///
/// # Errors
/// - cannot install `color_eyre`
/// - cannot create the logs tempdir
/// - a global subscriber is already set
pub fn setup_logs_and_install_panic_hook() -> Result<Logging> {
    color_eyre::install()?;
    let log_dir = tempfile::Builder::new()
        .prefix("relic-logs")
        .tempdir()
        .wrap_err("cannot create relic logs tempdir")?
        .keep();
    let file_appender = tracing_appender::rolling::never(&log_dir, "relic.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let buffer = LogBuffer::new();

    let (journald, journald_err) = match tracing_journald::layer() {
        Ok(layer) => (Some(layer.with_syslog_identifier("relic".to_owned())), None),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .pretty(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .compact(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(buffer.clone())
                .with_ansi(false)
                .compact(),
        )
        .with(journald)
        .try_init()
        .wrap_err("unable to set global subscriber")?;

    if cfg!(debug_assertions) {
        tracing::info!("Running in debug mode");
    }
    tracing::info!("relic {version}", version = env!("CARGO_PKG_VERSION"));
    tracing::info!("Logging to {}", log_dir.join("relic.log").display());
    match journald_err {
        None => tracing::info!("Logging to journald"),
        Some(e) => tracing::warn!("Not logging to journald: {e}"),
    }
    Ok(Logging {
        buffer,
        log_dir,
        _guard: guard,
    })
}
