//! Best-effort diagnostic process title.

/// Longest name the Linux kernel keeps in `comm` (excluding the NUL).
#[cfg(any(target_os = "linux", test))]
const COMM_MAX: usize = 15;

/// Show `"<label> [<pid>]"` as the supervisor's name. Failures are ignored.
pub(crate) fn set(label: &str, pid: u32) {
    imp::set(label, pid);
}

/// Fit the title into `max` bytes, shortening the label so the pid survives.
#[cfg(any(target_os = "linux", test))]
fn fit(label: &str, pid: u32, max: usize) -> String {
    let suffix = format!(" [{pid}]");
    let label = truncate(label, max.saturating_sub(suffix.len()));
    truncate(&format!("{label}{suffix}"), max).to_owned()
}

/// Cut `title` to at most `max` bytes without splitting a character.
#[cfg(any(target_os = "linux", test))]
fn truncate(title: &str, max: usize) -> &str {
    if title.len() <= max {
        return title;
    }
    let mut end = max;
    while !title.is_char_boundary(end) {
        end -= 1;
    }
    &title[..end]
}

#[cfg(target_os = "linux")]
mod imp {
    pub(super) fn set(label: &str, pid: u32) {
        let name = super::fit(label, pid, super::COMM_MAX);
        if let Err(e) = std::fs::write("/proc/self/comm", name) {
            log::debug!("cannot set process title: {e}");
        }
    }
}

#[cfg(windows)]
mod imp {
    use windows_sys::Win32::System::Console::SetConsoleTitleW;

    pub(super) fn set(label: &str, pid: u32) {
        let title = format!("{label} [{pid}]");
        let wide: Vec<u16> = title.encode_utf16().chain(std::iter::once(0)).collect();
        // SAFETY: `wide` is NUL-terminated and outlives the call.
        if unsafe { SetConsoleTitleW(wide.as_ptr()) } == 0 {
            log::debug!("cannot set console title");
        }
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod imp {
    pub(super) fn set(_label: &str, _pid: u32) {}
}
