//! Signal-capable handle to a running encoder process.
//!
//! The store registers one of these per running conversion so the abort path
//! can terminate a process it does not own. Only the OS pid is held; the
//! owning worker keeps the child and its exit status.

use std::io;

/// Cancellable handle to a spawned conversion process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: u32,
}

impl ProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Ask the process to stop gracefully (SIGINT; ffmpeg finalizes its
    /// output and exits).
    #[cfg(unix)]
    pub fn terminate(&self) -> io::Result<()> {
        self.signal(nix::sys::signal::Signal::SIGINT)
    }

    /// Forcefully kill the process (SIGKILL).
    #[cfg(unix)]
    pub fn force_kill(&self) -> io::Result<()> {
        self.signal(nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(unix)]
    fn signal(&self, sig: nix::sys::signal::Signal) -> io::Result<()> {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        kill(Pid::from_raw(self.pid as i32), sig).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    pub fn terminate(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "graceful termination is not supported on this platform",
        ))
    }

    #[cfg(not(unix))]
    pub fn force_kill(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process termination is not supported on this platform",
        ))
    }

    /// Whether a signalling error means the process had already exited, as
    /// opposed to a genuine signalling failure.
    pub fn already_exited(err: &io::Error) -> bool {
        #[cfg(unix)]
        {
            err.raw_os_error() == Some(nix::errno::Errno::ESRCH as i32)
        }
        #[cfg(not(unix))]
        {
            let _ = err;
            false
        }
    }
}
