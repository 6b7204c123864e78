//! Test bootstrap of the device layer.
//!
//! [`Harness::boot`] builds a [`DeviceIo`] on a fresh simulated [`Machine`]
//! and starts its daemons. Test cases then play the user processes: they
//! issue system calls from host threads, type on the terminals, tick the
//! clock and inspect what the devices did.
//!
//! Set `DEVIO_LOG=1` to see the kernel log on stderr.

pub mod machine;

#[cfg(test)]
mod disk;
#[cfg(test)]
mod sleep;
#[cfg(test)]
mod terminal;

use devio::{Config, DeviceIo, SysArgs, SyscallNumber};
pub use machine::Machine;
use std::{
    sync::{Arc, Once},
    time::{Duration, Instant},
};

struct Stderr;

impl core::fmt::Write for Stderr {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        eprint!("{s}");
        Ok(())
    }
}

static CONSOLE: Once = Once::new();

/// A booted device layer on a simulated machine.
pub struct Harness {
    /// The machine.
    pub machine: Arc<Machine>,
    /// The device layer.
    pub io: Arc<DeviceIo<Machine>>,
}

impl Harness {
    /// Boots the layer with the default configuration on a default machine.
    pub fn boot() -> Self {
        Self::boot_with(Machine::new(), Config::new())
    }

    /// Boots the layer with `config` on `machine`.
    pub fn boot_with(machine: Machine, config: Config) -> Self {
        let verbose = std::env::var_os("DEVIO_LOG").is_some();
        if verbose {
            CONSOLE.call_once(|| abyss::kprint::set_console(Stderr));
        }
        let machine = Arc::new(machine);
        let io = DeviceIo::new(machine.clone(), config.quiet(!verbose));
        io.start_service_processes();
        Harness { machine, io }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.machine.halt();
    }
}

/// Polls `cond` until it holds. Gives up after ten seconds.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Issues system call `number` with the given argument slots.
pub fn invoke(io: &DeviceIo<Machine>, number: SyscallNumber, slots: &[usize]) -> SysArgs {
    let mut args = SysArgs::new(number);
    let mut slots = slots.iter().copied();
    args.arg1 = slots.next().unwrap_or(0);
    args.arg2 = slots.next().unwrap_or(0);
    args.arg3 = slots.next().unwrap_or(0);
    args.arg4 = slots.next().unwrap_or(0);
    args.arg5 = slots.next().unwrap_or(0);
    io.syscall(&mut args);
    args
}

/// Issues a system call: `syscall!(io, SyscallNumber::Sleep, 1)`.
#[macro_export]
macro_rules! syscall {
    ($io:expr, $no:expr $(, $arg:expr)* $(,)?) => {
        $crate::invoke(&$io, $no, &[$($arg as usize),*])
    };
}
