//! warpeye logging utilities.
//!
//! Every log line is shaped like:
//!     <timestamp> [TAG][thread] message
//!
//! - stderr is always the primary sink.
//! - An optional append-only file sink can be set once at startup.
//! - `logd!` lines are only emitted when `WARPEYE_DEBUG` is set (per-event chatter stays off
//!   by default).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<Option<std::fs::File>>> = OnceLock::new();
static RUN_ID: OnceLock<String> = OnceLock::new();
static DEBUG: AtomicBool = AtomicBool::new(false);

/// Initialize logging. Call once at startup.
/// - If `log_file` is Some, we append all log lines to that path.
/// - Always logs to stderr as the primary sink.
///
/// Returns the generated run_id.
pub fn init(log_file: Option<PathBuf>) -> String {
    let rid = RUN_ID
        .get_or_init(|| {
            // Short correlation id: time xor pid
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
            format!("{:08x}", (now.as_nanos() as u64) ^ (std::process::id() as u64))
        })
        .clone();

    let debug = std::env::var("WARPEYE_DEBUG")
        .map(|v| !v.trim().is_empty() && v != "0")
        .unwrap_or(false);
    DEBUG.store(debug, Ordering::Relaxed);

    let _ = LOG_FILE.get_or_init(|| Mutex::new(None));

    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => {
                if let Some(m) = LOG_FILE.get() {
                    if let Ok(mut guard) = m.lock() {
                        *guard = Some(f);
                    }
                }
            }
            Err(e) => {
                // log_line would try the (missing) file sink again; go straight to stderr.
                eprintln!(
                    "{} [WARN][{}] failed to open log file sink {}: {e}",
                    log_timestamp(),
                    log_thread_name(),
                    path.display()
                );
            }
        }
    }

    rid
}

/// Current run id (empty if init() wasn't called).
pub fn run_id() -> &'static str {
    RUN_ID.get().map(|s| s.as_str()).unwrap_or("")
}

pub fn debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

// NOTE: local time is used when the offset can be determined; it falls back to UTC.
pub fn log_timestamp() -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let fmt = time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    );
    now.format(&fmt).unwrap_or_else(|_| "<time-format-error>".to_string())
}

/// Best-effort thread name for log prefix.
pub fn log_thread_name() -> String {
    std::thread::current().name().unwrap_or("main").to_string()
}

/// Write one fully formatted line to stderr + optional file sink.
#[doc(hidden)]
pub fn log_line(_level: &str, tag: &str, msg: &str) {
    let line = format!("{} [{}][{}] {}", log_timestamp(), tag, log_thread_name(), msg);

    eprintln!("{line}");

    if let Some(m) = LOG_FILE.get() {
        if let Ok(mut guard) = m.lock() {
            if let Some(f) = guard.as_mut() {
                let _ = writeln!(f, "{line}");
                let _ = f.flush();
            }
        }
    }
}

#[macro_export]
macro_rules! logi {
    ($tag:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::logging::log_line("INFO", $tag, &msg);
    }};
}

#[macro_export]
macro_rules! logw {
    ($tag:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::logging::log_line("WARN", $tag, &msg);
    }};
}

#[macro_export]
macro_rules! loge {
    ($tag:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::logging::log_line("ERROR", $tag, &msg);
    }};
}

#[macro_export]
macro_rules! logd {
    ($tag:expr, $($arg:tt)*) => {{
        if $crate::logging::debug_enabled() {
            let msg = format!($($arg)*);
            $crate::logging::log_line("DEBUG", $tag, &msg);
        }
    }};
}
