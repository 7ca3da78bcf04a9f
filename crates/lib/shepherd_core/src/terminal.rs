//! Controlling-terminal hand-off.
//!
//! A child placed in its own process group is a background job as far as
//! the terminal is concerned: reading from it raises `SIGTTIN` and stops the
//! child. When the supervisor owns the terminal's foreground, the child's
//! group takes it over between fork and exec, and [`Foreground`] gives it
//! back once the child is gone.

#[cfg(unix)]
mod imp {
    use std::io;

    /// Restores the supervisor's group as the terminal's foreground group
    /// when dropped.
    #[derive(Debug)]
    pub(crate) struct Foreground {
        pgrp: libc::pid_t,
    }

    impl Foreground {
        /// `Some` if stdin is a terminal whose foreground group is ours.
        pub(crate) fn lend() -> Option<Self> {
            // SAFETY: plain queries on fd 0 and the calling process.
            let (is_tty, foreground, pgrp) = unsafe {
                (
                    libc::isatty(libc::STDIN_FILENO) == 1,
                    libc::tcgetpgrp(libc::STDIN_FILENO),
                    libc::getpgrp(),
                )
            };
            (is_tty && foreground == pgrp).then_some(Self { pgrp })
        }
    }

    impl Drop for Foreground {
        fn drop(&mut self) {
            let pgrp = self.pgrp;
            // SAFETY: tcsetpgrp has no memory-safety preconditions.
            if let Err(e) = without_ttou(|| unsafe { libc::tcsetpgrp(libc::STDIN_FILENO, pgrp) }) {
                log::debug!("cannot take back the terminal foreground: {e}");
            }
        }
    }

    /// Make the calling process's group the terminal's foreground group.
    ///
    /// Runs in the child between fork and exec: only async-signal-safe calls.
    pub(crate) fn take_foreground() -> io::Result<()> {
        // SAFETY: tcsetpgrp and getpgrp have no memory-safety preconditions.
        without_ttou(|| unsafe { libc::tcsetpgrp(libc::STDIN_FILENO, libc::getpgrp()) })
    }

    /// Run `call` with `SIGTTOU` blocked on this thread. A background group
    /// may then change the foreground group instead of being stopped.
    fn without_ttou(call: impl FnOnce() -> libc::c_int) -> io::Result<()> {
        // SAFETY: the sets are initialised by sigemptyset/pthread_sigmask
        // before use and live for the whole block.
        unsafe {
            let mut block: libc::sigset_t = std::mem::zeroed();
            let mut previous: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut block);
            libc::sigaddset(&mut block, libc::SIGTTOU);
            libc::pthread_sigmask(libc::SIG_BLOCK, &block, &mut previous);

            let result = if call() == -1 {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            };

            libc::pthread_sigmask(libc::SIG_SETMASK, &previous, std::ptr::null_mut());
            result
        }
    }
}

#[cfg(not(unix))]
mod imp {
    #[derive(Debug)]
    pub(crate) struct Foreground;

    impl Foreground {
        pub(crate) fn lend() -> Option<Self> {
            None
        }
    }
}

pub(crate) use imp::*;

