//! Process tree termination strategies.
//!
//! A [`Terminator`] stops a root process and everything it spawned, in two
//! phases: a graceful signal to the whole tree, then an unconditional kill if
//! the tree is still around after the grace period.
//!
//! - [`GroupTerminator`] (Unix): the child leads its own process group and
//!   the group is signalled as a unit.
//! - [`TreeTerminator`]: descendants are discovered through a
//!   [`ProcessTable`] and signalled one by one.

#[cfg(unix)]
mod group;
mod tree;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TerminationError;
use crate::signal::StopSignal;

#[cfg(unix)]
pub use group::GroupTerminator;
pub use tree::{ProcessTable, SysinfoTable, TreeTerminator};

/// Default wait between the graceful and forced phases.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// How long to wait for the root to disappear after the forced phase.
pub const CONFIRM_TIMEOUT: Duration = Duration::from_millis(500);

/// Stops a process and all of its descendants.
pub trait Terminator: Send + Sync {
    /// Terminate the tree rooted at `pid`, starting with `signal`.
    ///
    /// Returns `Ok` once the root is confirmed gone. Individual signal
    /// failures never abort the sequence.
    fn kill_tree(&self, pid: u32, signal: StopSignal) -> Result<(), TerminationError>;

    /// Whether the child must be spawned as a process-group leader.
    fn needs_process_group(&self) -> bool {
        false
    }

    /// Strategy name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Strategy selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminatorKind {
    /// Process groups where the platform has them, tree walking elsewhere.
    #[default]
    Auto,
    /// Signal the child's process group (Unix only).
    ProcessGroup,
    /// Enumerate and kill descendants individually.
    ProcessTree,
}

impl TerminatorKind {
    /// Build the terminator for this platform.
    pub fn build(self, grace: Duration) -> Arc<dyn Terminator> {
        match self {
            TerminatorKind::ProcessTree => Arc::new(TreeTerminator::new(grace)),
            #[cfg(unix)]
            TerminatorKind::Auto | TerminatorKind::ProcessGroup => {
                Arc::new(GroupTerminator::new(grace))
            }
            #[cfg(not(unix))]
            TerminatorKind::Auto => Arc::new(TreeTerminator::new(grace)),
            #[cfg(not(unix))]
            TerminatorKind::ProcessGroup => {
                log::warn!("process groups are unavailable on this platform; walking the tree");
                Arc::new(TreeTerminator::new(grace))
            }
        }
    }
}

impl fmt::Display for TerminatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminatorKind::Auto => "auto",
            TerminatorKind::ProcessGroup => "group",
            TerminatorKind::ProcessTree => "tree",
        };
        f.write_str(s)
    }
}

impl FromStr for TerminatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(TerminatorKind::Auto),
            "group" | "process-group" => Ok(TerminatorKind::ProcessGroup),
            "tree" | "process-tree" => Ok(TerminatorKind::ProcessTree),
            other => Err(format!(
                "unknown strategy `{other}` (expected auto, group or tree)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strategy_names() {
        assert_eq!("auto".parse(), Ok(TerminatorKind::Auto));
        assert_eq!("Group".parse(), Ok(TerminatorKind::ProcessGroup));
        assert_eq!("tree".parse(), Ok(TerminatorKind::ProcessTree));
        assert!("nuke".parse::<TerminatorKind>().is_err());
    }

    #[test]
    fn tree_strategy_never_needs_a_group() {
        let t = TerminatorKind::ProcessTree.build(DEFAULT_GRACE_PERIOD);
        assert!(!t.needs_process_group());
        assert_eq!(t.name(), "process-tree");
    }

    #[cfg(unix)]
    #[test]
    fn auto_prefers_process_groups_on_unix() {
        let t = TerminatorKind::Auto.build(DEFAULT_GRACE_PERIOD);
        assert!(t.needs_process_group());
        assert_eq!(t.name(), "process-group");
    }
}
