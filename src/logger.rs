//! Session log for the raster engine and the CLI.
//!
//! One file per run, `<data dir>/ComicFE/comicfe.log`, truncated by [`init`].
//! Each engine operation reports its outcome through `log_info!`,
//! `log_warn!` (user-facing refusals such as "no pixels matched") or
//! `log_err!` (decode/encode failures). Nothing is written until [`init`]
//! runs, so library users and unit tests stay off the filesystem.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static SINK: OnceLock<Mutex<File>> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        }
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    }};
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {{
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    }};
}

/// Append one entry. I/O errors are dropped: a raster operation never fails
/// because its log line could not be written.
pub fn write(level: Level, msg: &str) {
    let Some(sink) = SINK.get() else { return };
    if let Ok(mut file) = sink.lock() {
        let _ = writeln!(file, "{}", entry(clock(), level, msg));
    }
}

/// `[HH:MM:SS.mmm] [LEVEL] message`, with `millis` since midnight UTC.
fn entry(millis: u64, level: Level, msg: &str) -> String {
    let secs = millis / 1000;
    format!(
        "[{:02}:{:02}:{:02}.{:03}] [{}] {}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        millis % 1000,
        level.tag(),
        msg
    )
}

fn clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_millis() % 86_400_000) as u64)
        .unwrap_or(0)
}

/// Open (truncating) the session log and mirror panics into it.
/// Later calls are ignored.
pub fn init() {
    if SINK.get().is_some() {
        return;
    }
    let path = data_dir().join("ComicFE").join("comicfe.log");
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match File::create(&path) {
        Ok(f) => {
            let _ = SINK.set(Mutex::new(f));
        }
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    }

    log_info!(
        "ComicFE {} raster session, pid {}, log at {}",
        env!("CARGO_PKG_VERSION"),
        std::process::id(),
        path.display()
    );

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, &info.to_string());
        prev(info);
    }));
}

fn data_dir() -> PathBuf {
    let var = |k: &str| std::env::var_os(k).map(PathBuf::from);
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = var("APPDATA") {
            return appdata;
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = var("HOME") {
            return home.join("Library").join("Application Support");
        }
    }
    var("XDG_DATA_HOME")
        .or_else(|| var("HOME").map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}
