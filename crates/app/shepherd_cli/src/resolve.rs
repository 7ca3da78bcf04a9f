//! Command lookup.
//!
//! Windows does not try `PATHEXT` extensions when spawning a bare name, so
//! `npx` must become `C:\...\npx.cmd` before it reaches the supervisor.
//! Everywhere else the OS does the search and the name is passed through.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Resolve `command` to something the OS can spawn directly.
#[cfg(windows)]
pub fn resolve(command: &str) -> String {
    let Some(path) = std::env::var_os("PATH") else {
        return command.to_string();
    };
    let pathext = std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".into());
    let extensions: Vec<&str> = pathext.split(';').filter(|e| !e.is_empty()).collect();

    match find_in(command, &path, &extensions) {
        Some(found) => {
            log::debug!("resolved `{command}` to {}", found.display());
            found.to_string_lossy().into_owned()
        }
        None => command.to_string(),
    }
}

/// Resolve `command` to something the OS can spawn directly.
#[cfg(not(windows))]
pub fn resolve(command: &str) -> String {
    command.to_string()
}

/// Search each directory of `path` for `command` with each extension.
///
/// Names that already carry a directory or an extension are not searched.
#[cfg_attr(not(windows), allow(dead_code))]
fn find_in(command: &str, path: &OsStr, extensions: &[&str]) -> Option<PathBuf> {
    let name = Path::new(command);
    if name.components().count() != 1 || name.extension().is_some() {
        return None;
    }
    std::env::split_paths(path).find_map(|dir| {
        extensions
            .iter()
            .map(|ext| dir.join(format!("{command}{ext}")))
            .find(|candidate| candidate.is_file())
    })
}
