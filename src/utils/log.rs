//! Simple logging module with macros.
//!
//! There is no process-wide logger: the entry point builds a [`Logger`] and
//! hands it (usually as `Arc<Logger>`) to every component that reports.

use std::fmt::Display;
use std::io::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Log level for filtering messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `pad` keeps width specifiers like `{:5}` working.
        f.pad(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        })
    }
}

/// Converts days since Unix epoch to (year, month, day).
fn days_to_date(days: u64) -> (u32, u32, u32) {
    // Algorithm based on Howard Hinnant's date algorithms
    let z = days as i64 + 719468;
    let era = z.div_euclid(146097);
    let doe = z.rem_euclid(146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as u32, m, d)
}

/// Line-oriented, timestamped, coloured logger writing to stderr.
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
    min_level: Level,
    show_timestamp: bool,
    show_type: bool,
}

impl Logger {
    /// Creates a logger whose lines are tagged with `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_level: Level::Info,
            show_timestamp: true,
            show_type: true,
        }
    }

    /// Drops messages below `level`.
    pub fn with_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn without_timestamp(mut self) -> Self {
        self.show_timestamp = false;
        self
    }

    pub fn without_type(mut self) -> Self {
        self.show_type = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    /// Renders one log line (without the trailing newline).
    fn format_line(&self, level: Level, since_epoch: Duration, message: &str) -> String {
        let mut line = String::new();
        if self.show_timestamp {
            let secs = since_epoch.as_secs();
            let (year, month, day) = days_to_date(secs / 86400);
            line.push_str(&format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03} ",
                year,
                month,
                day,
                (secs / 3600) % 24,
                (secs / 60) % 60,
                secs % 60,
                since_epoch.subsec_millis()
            ));
        }
        if self.show_type {
            line.push_str(&format!("[{:5}] ", level));
        }
        if !self.name.is_empty() {
            line.push_str(&self.name);
            line.push_str(": ");
        }
        line.push_str(message);
        line
    }

    /// Writes a message. Use the `info!`, `warn!`, or `error!` macros instead.
    #[doc(hidden)]
    pub fn log(&self, level: Level, message: &str) {
        if !self.enabled(level) {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let line = self.format_line(level, now, message);

        let mut stderr = StandardStream::stderr(ColorChoice::Auto);
        let mut spec = ColorSpec::new();
        match level {
            Level::Warn => {
                spec.set_fg(Some(Color::Yellow)).set_bold(true);
            }
            Level::Error => {
                spec.set_fg(Some(Color::Red)).set_bold(true);
            }
            Level::Info => {
                spec.clear();
            }
        }
        let _ = stderr.set_color(&spec);
        let _ = writeln!(stderr, "{}", line);
        let _ = stderr.reset();
    }
}

/// Logs an info-level message.
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)*) => {{
        if cfg!(not(test)) {
            $logger.log($crate::utils::log::Level::Info, &format!($($arg)*));
        }
    }};
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)*) => {{
        if cfg!(not(test)) {
            $logger.log($crate::utils::log::Level::Warn, &format!($($arg)*));
        }
    }};
}

/// Logs an error-level message.
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)*) => {{
        if cfg!(not(test)) {
            $logger.log($crate::utils::log::Level::Error, &format!($($arg)*));
        }
    }};
}
