use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{self, PanicInfo};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,serenity=warn,songbird=warn";

/// Console plus a daily file under `log_dir`. Keep the guard alive for the whole program.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    // Create logs directory if it doesn't exist
    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, "app.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(
            // Console output
            tracing_subscriber::fmt::layer().with_target(true).with_line_number(true),
        )
        .with(
            // File output
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_ansi(false),
        )
        .init();

    guard
}

/// Appends a crash report to `log_dir/crash-YYYY-MM-DD.log` on every panic, then defers to the
/// previous hook.
pub fn install_crash_hook(log_dir: PathBuf) {
    let previous = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let now = Utc::now();
        let report = crash_report(now, info);
        let path = log_dir.join(format!("crash-{}.log", now.format("%Y-%m-%d")));

        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(report.as_bytes()));

        match written {
            Ok(()) => error!("Application crashed! Report written to {}", path.display()),
            Err(why) => error!("Application crashed and the report could not be written: {why}"),
        }

        previous(info);
    }));
}

fn crash_report(now: DateTime<Utc>, info: &PanicInfo<'_>) -> String {
    let message = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    let location = info
        .location()
        .map(|l| format!("{}:{}", l.file(), l.line()))
        .unwrap_or_else(|| "unknown location".to_string());

    format_report(now, &message, &location)
}

fn format_report(now: DateTime<Utc>, message: &str, location: &str) -> String {
    format!(
        "\n=== Application Crash Report ===\nTimestamp: {}\nMessage: {message}\nLocation: {location}\n",
        now.to_rfc3339()
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_report_contains_timestamp_message_and_location() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap();

        let report = format_report(now, "boom", "src/main.rs:10");

        assert!(report.contains("=== Application Crash Report ==="));
        assert!(report.contains("Timestamp: 2024-03-09T12:30:00+00:00"));
        assert!(report.contains("Message: boom"));
        assert!(report.contains("Location: src/main.rs:10"));
    }
}
