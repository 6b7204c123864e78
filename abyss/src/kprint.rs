//! Kernel log.
//!
//! Messages go to whatever console was installed with [`set_console`];
//! before that they are discarded. The leveled macros ([`info!`],
//! [`warning!`], [`debug!`]) tag each line with its level and stay silent
//! while [`QUITE`] is set. [`print!`] and [`println!`] always write.
//!
//! [`QUITE`]: crate::QUITE

use crate::spinlock::SpinLock;
use alloc::boxed::Box;
use core::{
    fmt::{Arguments, Write},
    sync::atomic::Ordering,
};

type Console = Option<Box<dyn Write + Send>>;

static CONSOLE: SpinLock<Console> = SpinLock::new(None);

/// Level of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Progress of the daemons.
    Info,
    /// Something was lost or refused.
    Warning,
    /// Per-command tracing.
    Debug,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "[INFO]",
            Level::Warning => "[WARN]",
            Level::Debug => "[DEBUG]",
        }
    }
}

/// Installs the sink that receives the kernel log, replacing the previous
/// one.
pub fn set_console(sink: impl Write + Send + 'static) {
    CONSOLE.with(|console| *console = Some(Box::new(sink)));
}

#[doc(hidden)]
pub fn _print(args: Arguments<'_>) {
    CONSOLE.with(|console| {
        if let Some(console) = console {
            let _ = console.write_fmt(args);
        }
    });
}

#[doc(hidden)]
pub fn _log(level: Level, args: Arguments<'_>) {
    if crate::QUITE.load(Ordering::SeqCst) {
        return;
    }
    _print(format_args!("{} {}\n", level.tag(), args));
}

/// Prints out the message.
///
/// Use the format! syntax to write data to the console.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::kprint::_print(format_args!($($arg)*)));
}

/// Prints out the message with a newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Display an information message.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => ($crate::kprint::_log($crate::kprint::Level::Info, format_args!($($arg)*)));
}

/// Display a warning message.
#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => ($crate::kprint::_log($crate::kprint::Level::Warning, format_args!($($arg)*)));
}

/// Display a debug message.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => ($crate::kprint::_log($crate::kprint::Level::Debug, format_args!($($arg)*)));
}
