//! Process-wide logger setup.
//!
//! Log records go through the [log] facade to an [env_logger] backend which
//! appends to the configured log file and optionally mirrors lines on stderr.
//! The level filter is read from the `GPSWEEP_LOG` environment variable
//! (default `info`).
use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use env_logger::{Builder, Env};

use crate::config::OutputSettings;
use crate::errors::Result;

/// Environment variable holding the log filter
pub const GPSWEEP_LOG: &str = "GPSWEEP_LOG";

/// Writes every line both to the log file and, when enabled, to stderr
struct LogTee {
    file: File,
    echo: bool,
}

impl Write for LogTee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if self.echo {
            io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.echo {
            io::stderr().flush()?;
        }
        Ok(())
    }
}

/// Handle on the initialized logger, flushes pending records when finished or dropped
#[derive(Debug)]
pub struct LogSession {
    _private: (),
}

impl LogSession {
    /// Flush the logger at the end of the run
    pub fn finish(self) {}
}

impl Drop for LogSession {
    fn drop(&mut self) {
        log::logger().flush();
    }
}

/// Initialize the process-wide logger once, before any sweep.
///
/// A logger already installed (e.g. by a previous call) is kept as is.
pub fn init(settings: &OutputSettings) -> Result<LogSession> {
    if let Some(dir) = settings.log_file.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&settings.log_file)?;

    let env = Env::new().filter_or(GPSWEEP_LOG, "info");
    let mut builder = Builder::from_env(env);
    let builder = builder
        .format_timestamp_millis()
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(LogTee {
            file,
            echo: settings.echo,
        })));
    builder.try_init().ok();
    Ok(LogSession { _private: () })
}
