// SPDX-License-Identifier: MIT

//! Logging setup: a non-blocking file appender plus an `EnvFilter`,
//! defaulting to `info`. `USE_SYSLOG` is honored by routing through the
//! system log instead of the configured log file; everything else about
//! the filter and formatting stays the same either way.

use std::path::Path;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sdpc_core::error::CoreError;

/// Guard that must be kept alive for the process lifetime, or buffered log
/// lines are dropped on the floor when it's dropped early.
pub struct LogGuard(#[allow(dead_code)] tracing_appender::non_blocking::WorkerGuard);

fn verbosity_filter(verbosity: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    EnvFilter::new(level)
}

/// Set up the global tracing subscriber. `log_path`'s parent directory is
/// created if missing.
pub fn init(log_path: &Path, verbosity: u8, use_syslog: bool) -> Result<LogGuard, CoreError> {
    if use_syslog {
        return init_syslog(verbosity);
    }

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::fs(parent, e))?;
    }

    let file_name = log_path
        .file_name()
        .ok_or_else(|| CoreError::fs(log_path, std::io::Error::other("log path has no file name")))?;
    let dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(verbosity_filter(verbosity))
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(LogGuard(guard))
}

/// `USE_SYSLOG` path: logs go to the system logger instead of a file,
/// keeping the same `EnvFilter` and textual formatting. The `syslog`
/// crate's `Logger` implements `std::io::Write`, so it slots into the same
/// non-blocking writer the file path uses.
fn init_syslog(verbosity: u8) -> Result<LogGuard, CoreError> {
    let formatter = syslog::Formatter3164 {
        facility: syslog::Facility::LOG_DAEMON,
        hostname: None,
        process: "sdpc-agentd".into(),
        pid: std::process::id(),
    };
    let logger = syslog::unix(formatter)
        .map_err(|e| CoreError::fs(Path::new("/dev/log"), std::io::Error::other(e.to_string())))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(SyslogWriter(std::sync::Mutex::new(logger)));

    tracing_subscriber::registry()
        .with(verbosity_filter(verbosity))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(LogGuard(guard))
}

struct SyslogWriter(std::sync::Mutex<syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>>);

impl std::io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let mut logger = self
            .0
            .lock()
            .map_err(|_| std::io::Error::other("syslog writer lock poisoned"))?;
        logger
            .info(text.trim_end())
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
