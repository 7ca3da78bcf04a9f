//! Tree-enumeration-and-kill.
//!
//! Used where signals do not reach descendants on their own: platforms
//! without process groups, or children that moved into a group of their own.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

use crate::error::TerminationError;
use crate::pid_watch;
use crate::signal::StopSignal;

use super::{CONFIRM_TIMEOUT, Terminator};

/// Snapshot of the host's process table.
pub trait ProcessTable: Send {
    /// Re-read the process table.
    fn refresh(&mut self);

    /// Direct children of `pid` in the last snapshot.
    fn children(&self, pid: u32) -> Vec<u32>;

    /// Whether `pid` is running in the last snapshot (zombies are not).
    fn is_alive(&self, pid: u32) -> bool;

    /// Deliver `signal` to `pid`.
    fn signal(&mut self, pid: u32, signal: StopSignal) -> Result<(), String>;

    /// Whether graceful signals can be delivered on this platform.
    fn supports_graceful(&self) -> bool;
}

/// [`ProcessTable`] backed by `sysinfo`.
pub struct SysinfoTable {
    system: System,
}

impl SysinfoTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoTable {
    fn refresh(&mut self) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new(),
        );
    }

    fn children(&self, pid: u32) -> Vec<u32> {
        let parent = Pid::from_u32(pid);
        let mut children: Vec<u32> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| process.parent() == Some(parent))
            .map(|(child, _)| child.as_u32())
            .collect();
        children.sort_unstable();
        children
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.system
            .process(Pid::from_u32(pid))
            .is_some_and(|process| process.status() != ProcessStatus::Zombie)
    }

    fn signal(&mut self, pid: u32, signal: StopSignal) -> Result<(), String> {
        let process = self
            .system
            .process(Pid::from_u32(pid))
            .ok_or_else(|| "no such process".to_string())?;
        match process.kill_with(signal.to_sysinfo()) {
            Some(true) => Ok(()),
            Some(false) => Err(format!("{signal} was refused")),
            None => Err(format!("{signal} is not supported on this platform")),
        }
    }

    fn supports_graceful(&self) -> bool {
        sysinfo::SUPPORTED_SIGNALS.contains(&sysinfo::Signal::Term)
    }
}

/// Walks the process tree and signals every member individually.
pub struct TreeTerminator<T = SysinfoTable> {
    grace: Duration,
    table: Mutex<T>,
}

impl TreeTerminator<SysinfoTable> {
    pub fn new(grace: Duration) -> Self {
        Self::with_table(grace, SysinfoTable::new())
    }
}

impl<T: ProcessTable> TreeTerminator<T> {
    /// Use a custom process table (another enumeration backend, or a fake).
    pub fn with_table(grace: Duration, table: T) -> Self {
        Self {
            grace,
            table: Mutex::new(table),
        }
    }
}

impl<T: ProcessTable> Terminator for TreeTerminator<T> {
    fn kill_tree(&self, pid: u32, signal: StopSignal) -> Result<(), TerminationError> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let mut errors = Vec::new();

        table.refresh();
        if !table.is_alive(pid) {
            return Ok(());
        }

        // Remember the whole tree now: once a parent dies its children are
        // re-parented and can no longer be found through it.
        let mut members = collect_tree(&*table, pid);
        log::debug!("process tree of {pid}: {members:?}");

        if signal.is_graceful() && table.supports_graceful() {
            signal_all(&mut *table, &members, signal, &mut errors);
            let exited = pid_watch::wait_until(self.grace, || {
                table.refresh();
                members.iter().all(|member| !table.is_alive(*member))
            });
            if exited {
                return Ok(());
            }
            log::warn!(
                "process tree of {pid} still running {:?} after {signal}; killing",
                self.grace
            );
        }

        // Survivors may have spawned more children in the meantime.
        table.refresh();
        let survivors: Vec<u32> = members
            .iter()
            .copied()
            .filter(|member| table.is_alive(*member))
            .collect();
        for survivor in survivors {
            for member in collect_tree(&*table, survivor) {
                if !members.contains(&member) {
                    members.push(member);
                }
            }
        }
        let alive: Vec<u32> = members
            .into_iter()
            .filter(|member| table.is_alive(*member))
            .collect();
        signal_all(&mut *table, &alive, StopSignal::Kill, &mut errors);

        let confirmed = pid_watch::wait_until(CONFIRM_TIMEOUT, || {
            table.refresh();
            !table.is_alive(pid) && alive.iter().all(|member| !table.is_alive(*member))
        });
        if confirmed {
            if !errors.is_empty() {
                log::debug!("tree of {pid} stopped despite errors: {errors:?}");
            }
            Ok(())
        } else {
            Err(TerminationError::NotConfirmed { pid, errors })
        }
    }

    fn name(&self) -> &'static str {
        "process-tree"
    }
}

/// Root first, then descendants breadth-first. Each pid appears once even if
/// pid reuse produced a cycle in the parent links.
fn collect_tree<T: ProcessTable + ?Sized>(table: &T, root: u32) -> Vec<u32> {
    let mut seen = HashSet::from([root]);
    let mut order = vec![root];
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        for child in table.children(pid) {
            if seen.insert(child) {
                order.push(child);
                queue.push_back(child);
            }
        }
    }
    order
}

/// Signal every pid, recording failures without stopping.
fn signal_all<T: ProcessTable + ?Sized>(
    table: &mut T,
    pids: &[u32],
    signal: StopSignal,
    errors: &mut Vec<String>,
) {
    for &pid in pids {
        if let Err(e) = table.signal(pid, signal) {
            log::warn!("failed to send {signal} to pid {pid}: {e}");
            errors.push(format!("{signal} to {pid}: {e}"));
        }
    }
}
