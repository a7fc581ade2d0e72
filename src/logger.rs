//! Session log for the `pixelfe` binary.
//!
//! One file per run, truncated at startup:
//!   Windows:  `%APPDATA%\PixelFE\pixelfe.log`
//!   Linux:    `$XDG_DATA_HOME/PixelFE/pixelfe.log` (or `~/.local/share/...`)
//!   macOS:    `~/Library/Application Support/PixelFE/pixelfe.log`
//!
//! The engine logs through `log_info!` / `log_warn!` / `log_err!`. Until
//! [`init`] or [`init_at`] runs, those macros do nothing, so library users and
//! tests never touch the file system.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

pub fn is_enabled() -> bool {
    LOG_FILE.get().is_some()
}

/// Append a raw line. I/O errors are swallowed.
pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

pub fn write(level: &str, msg: &str) {
    if !is_enabled() {
        return;
    }
    write_line(&format!("[{}] [{}] {}", clock_time(), level, msg));
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write("INFO", &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write("WARN", &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write("ERROR", &format!($($arg)*))
    };
}

/// Open the session log at the platform location.
pub fn init() -> bool {
    init_at(&default_log_path())
}

/// Open (truncating) the session log at `path` and install the panic hook.
/// Only the first successful call takes effect. Returns whether logging is on.
pub fn init_at(path: &Path) -> bool {
    if is_enabled() {
        return true;
    }
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] could not open {}: {}", path.display(), e);
            return false;
        }
    };
    if LOG_FILE.set(Mutex::new(file)).is_err() {
        return true;
    }
    let _ = LOG_PATH.set(path.to_path_buf());

    write_line(&format!(
        "=== PixelFE {} session, unix {} ===",
        env!("CARGO_PKG_VERSION"),
        unix_seconds()
    ));
    write_line(&format!("Log file: {}", path.display()));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", clock_time(), info));
        prev(info);
    }));
    true
}

fn default_log_path() -> PathBuf {
    data_dir().join("PixelFE").join("pixelfe.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

fn unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// HH:MM:SS (UTC) within the current day.
fn clock_time() -> String {
    let secs = unix_seconds();
    format!("{:02}:{:02}:{:02}", (secs % 86_400) / 3_600, (secs % 3_600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_time_is_fixed_width() {
        let t = clock_time();
        assert_eq!(t.len(), 8);
        assert_eq!(t.as_bytes()[2], b':');
    }

    #[test]
    fn macros_are_harmless_without_init() {
        log_info!("nothing to see {}", 1);
        log_warn!("still nothing");
        log_err!("{}", "quiet");
    }
}
