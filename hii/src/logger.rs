// Ring-buffer log sink for the HII database

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

const MAX_LOG_ENTRIES: usize = 64;

/// One captured log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
}

struct RingLogger {
    entries: Mutex<VecDeque<LogEntry>>,
}

static LOGGER: RingLogger = RingLogger {
    entries: Mutex::new(VecDeque::new()),
};
static LOG_TOTAL: AtomicUsize = AtomicUsize::new(0);

impl Log for RingLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            push(record.level(), *record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the ring buffer as the global `log` sink
///
/// Fails when another logger is already installed.
pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Record a message directly, bypassing the `log` facade
pub fn push(level: Level, args: fmt::Arguments<'_>) {
    let mut entries = LOGGER.entries.lock();
    if entries.len() == MAX_LOG_ENTRIES {
        entries.pop_front();
    }
    entries.push_back(LogEntry {
        level,
        message: alloc::fmt::format(args),
    });
    LOG_TOTAL.fetch_add(1, Ordering::SeqCst);
}

/// Buffered entries, oldest first
pub fn get_logs() -> Vec<LogEntry> {
    LOGGER.entries.lock().iter().cloned().collect()
}

/// Number of entries currently buffered
pub fn log_count() -> usize {
    LOG_TOTAL.load(Ordering::SeqCst).min(MAX_LOG_ENTRIES)
}

// Macro for easier logging
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::push(::log::Level::Info, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_keeps_latest_entries() {
        for i in 0..MAX_LOG_ENTRIES + 3 {
            crate::log_info!("entry {}", i);
        }
        let logs = get_logs();
        assert_eq!(logs.len(), MAX_LOG_ENTRIES);
        assert_eq!(log_count(), MAX_LOG_ENTRIES);
        // Other tests may log concurrently
        let last = alloc::format!("entry {}", MAX_LOG_ENTRIES + 2);
        assert!(logs.iter().any(|e| e.message == last && e.level == Level::Info));
        assert!(logs.iter().all(|e| e.message != "entry 0"));
    }
}
