//! What to run and how.
//!
//! A [`SupervisionSpec`] is immutable once handed to a
//! [`Supervisor`](crate::Supervisor). It (de)serialises with camelCase keys so
//! callers can keep it in a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// How the child's standard streams are wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum IoMode {
    /// stdin/stdout/stderr are inherited from the supervisor as-is.
    #[default]
    Inherit,
}

/// Everything needed to spawn and supervise one child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisionSpec {
    /// Executable path or name (already resolved by the caller).
    pub command: String,
    /// Arguments passed verbatim.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Working directory override for the child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    /// Variables merged over the inherited environment (child entries win).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Name used in diagnostics. Defaults to the basename of `command`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Force-terminate the child after this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<u64>,
    #[serde(default)]
    pub io_mode: IoMode,
    /// Start the child in a new session (Unix `setsid`).
    #[serde(default)]
    pub detached: bool,
    /// Linux only: the child receives SIGKILL if the supervisor dies first.
    #[serde(default)]
    pub die_with_parent: bool,
}

impl SupervisionSpec {
    /// Creates a spec for `command` with no arguments and default settings.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            arguments: Vec::new(),
            working_directory: None,
            environment: BTreeMap::new(),
            label: None,
            timeout_millis: None,
            io_mode: IoMode::Inherit,
            detached: false,
            die_with_parent: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_millis = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    pub fn die_with_parent(mut self, enabled: bool) -> Self {
        self.die_with_parent = enabled;
        self
    }

    /// Returns the diagnostic label: the explicit one, or the command's basename.
    pub fn label(&self) -> String {
        if let Some(label) = self.label.as_deref().filter(|l| !l.trim().is_empty()) {
            return label.to_string();
        }
        Path::new(&self.command)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.command.clone())
    }

    /// Returns the configured timeout, if any.
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout_millis.map(Duration::from_millis)
    }

    /// Checks the invariants `start` relies on.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.command.trim().is_empty() {
            return Err(SpecError::EmptyCommand);
        }
        if self.timeout_millis == Some(0) {
            return Err(SpecError::ZeroTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_defaults_to_command_basename() {
        let spec = SupervisionSpec::new("/usr/local/bin/npx");
        assert_eq!(spec.label(), "npx");
    }

    #[test]
    fn explicit_label_wins() {
        let spec = SupervisionSpec::new("/usr/bin/node").with_label("mcp-server");
        assert_eq!(spec.label(), "mcp-server");
    }

    #[test]
    fn blank_label_falls_back_to_command() {
        let spec = SupervisionSpec::new("sleep").with_label("  ");
        assert_eq!(spec.label(), "sleep");
    }

    #[test]
    fn validate_rejects_empty_command() {
        let err = SupervisionSpec::new("   ").validate().unwrap_err();
        assert!(matches!(err, SpecError::EmptyCommand));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let err = SupervisionSpec::new("true")
            .timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, SpecError::ZeroTimeout));
    }

    #[test]
    fn deserializes_camel_case_json() {
        let json = r#"{
            "command": "npx",
            "arguments": ["-y", "@scope/server"],
            "workingDirectory": "/tmp",
            "environment": {"DEBUG": "1"},
            "timeoutMillis": 1500
        }"#;
        let spec: SupervisionSpec = serde_json::from_str(json).expect("parse spec");
        assert_eq!(spec.command, "npx");
        assert_eq!(spec.arguments, vec!["-y", "@scope/server"]);
        assert_eq!(spec.working_directory, Some(PathBuf::from("/tmp")));
        assert_eq!(spec.environment.get("DEBUG").map(String::as_str), Some("1"));
        assert_eq!(spec.timeout_duration(), Some(Duration::from_millis(1500)));
        assert_eq!(spec.io_mode, IoMode::Inherit);
        assert!(!spec.detached);
    }
}
