//! Robust file operations (retry with backoff on transient errors) and tracing setup.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const TRIES: usize = 16;
const DELAY_MS: u64 = 50;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`) that writes
/// to stderr. When `LOG_FILE` is set, the same events are also appended to that file.
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let file_layer = open_log_file(std::env::var("LOG_FILE").ok().as_deref())
            .map(|f| fmt::layer().with_ansi(false).with_writer(Mutex::new(f)));
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new(env_filter))
            .with(fmt::layer().with_writer(io::stderr))
            .with(file_layer)
            .try_init();
    });
}

/// Open `path` for appending. Blank or unopenable paths yield `None` so logging
/// falls back to stderr only.
fn open_log_file(path: Option<&str>) -> Option<File> {
    let path = path.map(str::trim).filter(|p| !p.is_empty())?;
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Return true for transient I/O errors commonly raised by AV/backup filter drivers,
/// sharing violations, or flaky network volumes (Windows codes).
fn is_retriable_io_error(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(5 | 21 | 32 | 33 | 225 | 433 | 1006 | 1117 | 1224))
}

/// Run `op` up to `tries` times, sleeping a linearly growing delay between
/// retriable failures. Non-retriable errors are returned immediately.
fn with_backoff<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "retries exhausted")))
}

pub fn open_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(TRIES, DELAY_MS, || File::open(path))
}

pub fn create_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(TRIES, DELAY_MS, || File::create(path))
}

/// Open for appending, creating the file if needed.
pub fn append_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(TRIES, DELAY_MS, || OpenOptions::new().create(true).append(true).open(path))
}

/// Remove a file; succeeds if it does not exist.
pub fn remove_with_backoff(path: &Path) -> Result<()> {
    match with_backoff(TRIES, DELAY_MS, || fs::remove_file(path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// Replace `dest` with `tmp`. A plain rename is atomic on the same filesystem;
/// if it fails (e.g. sharing violations), fall back to copy + remove.
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    if with_backoff(TRIES, DELAY_MS, || fs::rename(tmp, dest)).is_ok() {
        return Ok(());
    }
    with_backoff(TRIES, DELAY_MS, || fs::copy(tmp, dest))
        .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
    remove_with_backoff(tmp)
}
