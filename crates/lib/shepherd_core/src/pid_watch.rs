//! Platform-specific process liveness checks and bounded exit waits.
//!
//! - Linux: `pidfd_open` + `poll` (instant notification, kernel ≥5.3).
//! - macOS: `kqueue` with `EVFILT_PROC` + `NOTE_EXIT`.
//! - Fallback: liveness polling every [`POLL_INTERVAL`].
//!
//! A zombie (exited but not yet reaped) counts as gone everywhere.

use std::time::{Duration, Instant};

/// Interval between liveness checks when no event mechanism is available.
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Block until `pid` exits or `timeout` elapses.
///
/// Returns `true` if the process is gone.
pub fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    if !is_pid_alive(pid) {
        return true;
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(exited) = pidfd_wait(pid, timeout) {
            return exited;
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(exited) = kqueue_wait(pid, timeout) {
            return exited;
        }
    }

    wait_until(timeout, || !is_pid_alive(pid))
}

/// Poll `done` every [`POLL_INTERVAL`] until it holds or `timeout` elapses.
///
/// `done` is always checked at least once, including after the deadline.
pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Check whether a PID is still running.
#[cfg(unix)]
pub fn is_pid_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    // SAFETY: kill(pid, 0) sends no signal, it only checks existence.
    let exists = unsafe { libc::kill(raw, 0) } == 0
        || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
    exists && !is_zombie(pid)
}

/// Check whether a PID is still running.
#[cfg(windows)]
pub fn is_pid_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
    use windows_sys::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    if pid == 0 {
        return false;
    }

    // SAFETY: the handle is checked for null and closed before returning.
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            return false;
        }
        let mut code: u32 = 0;
        let ok = GetExitCodeProcess(handle, &mut code) != 0;
        CloseHandle(handle);
        ok && code == STILL_ACTIVE as u32
    }
}

/// Check whether a process group still has members.
#[cfg(unix)]
pub fn is_group_alive(pgid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pgid) else {
        return false;
    };
    if raw <= 1 {
        return false;
    }
    // SAFETY: signal 0 performs only the permission/existence check.
    if unsafe { libc::killpg(raw, 0) } != 0 {
        return false;
    }

    // Zombies keep their pgid until reaped, which may never happen when the
    // init process does not reap orphans.
    #[cfg(target_os = "linux")]
    {
        if let Some(live) = group_has_live_member(pgid) {
            return live;
        }
    }

    true
}

/// Scan `/proc` for a non-zombie process in group `pgid`.
///
/// Returns `None` when `/proc` cannot be read.
#[cfg(target_os = "linux")]
fn group_has_live_member(pgid: u32) -> Option<bool> {
    let entries = std::fs::read_dir("/proc").ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        let Some((state, pgrp)) = read_stat(pid) else {
            continue;
        };
        if pgrp == pgid && state != 'Z' {
            return Some(true);
        }
    }
    Some(false)
}

/// Returns `(state, pgrp)` from `/proc/<pid>/stat`.
#[cfg(target_os = "linux")]
fn read_stat(pid: u32) -> Option<(char, u32)> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // The command name may contain spaces or parens; fields resume after the last ')'.
    let mut fields = stat[stat.rfind(')')? + 1..].split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let pgrp = fields.next()?.parse().ok()?;
    Some((state, pgrp))
}

/// Linux exposes process state in `/proc/<pid>/stat`; `Z` marks a zombie.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    matches!(read_stat(pid), Some(('Z', _)))
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}

/// Linux: use pidfd_open + poll for instant notification.
/// Returns `None` if pidfds are unavailable and the caller should poll.
#[cfg(target_os = "linux")]
fn pidfd_wait(pid: u32, timeout: Duration) -> Option<bool> {
    let raw = libc::pid_t::try_from(pid).ok()?;
    let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    // SAFETY: pidfd_open and poll are standard Linux syscalls; the fd is closed below.
    unsafe {
        let fd = libc::syscall(libc::SYS_pidfd_open, raw, 0_i32) as libc::c_int;
        if fd < 0 {
            // ESRCH means the process is already gone.
            return (std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH))
                .then_some(true);
        }

        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let n = libc::poll(&mut pfd as *mut libc::pollfd, 1, timeout_ms);
        libc::close(fd);

        match n {
            n if n > 0 => Some(true),
            0 => Some(!is_pid_alive(pid)),
            // EINTR and friends: let the caller fall back to polling.
            _ => None,
        }
    }
}

/// macOS: use kqueue EVFILT_PROC + NOTE_EXIT with a timeout.
/// Returns `None` if kqueue is unavailable and the caller should poll.
#[cfg(target_os = "macos")]
fn kqueue_wait(pid: u32, timeout: Duration) -> Option<bool> {
    // SAFETY: kqueue/kevent are standard macOS syscalls; the queue is closed below.
    unsafe {
        let kq = libc::kqueue();
        if kq < 0 {
            return None;
        }

        let change = libc::kevent {
            ident: pid as libc::uintptr_t,
            filter: libc::EVFILT_PROC,
            flags: libc::EV_ADD | libc::EV_ONESHOT,
            fflags: libc::NOTE_EXIT,
            data: 0,
            udata: std::ptr::null_mut(),
        };
        let ts = libc::timespec {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_nsec: timeout.subsec_nanos() as libc::c_long,
        };

        let mut event: libc::kevent = std::mem::zeroed();
        let n = libc::kevent(
            kq,
            &change as *const libc::kevent,
            1,
            &mut event as *mut libc::kevent,
            1,
            &ts,
        );
        libc::close(kq);

        match n {
            n if n > 0 => Some(true),
            0 => Some(false),
            // Registration fails with ESRCH if the process already exited.
            _ => Some(!is_pid_alive(pid)),
        }
    }
}
