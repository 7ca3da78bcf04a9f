//! Panic trigger.
//!
//! One process-wide panic hook, installed on first use and chained to
//! whatever hook was there before. It stops the child of every dispatcher
//! registered at the moment of the panic, then lets the previous hook run.

use std::sync::{Mutex, MutexGuard, Once, PoisonError, TryLockError};

use crate::outcome::StopCause;
use crate::signal::StopSignal;

use super::Dispatcher;

static HOOKS: Mutex<Vec<Dispatcher>> = Mutex::new(Vec::new());
static INSTALL: Once = Once::new();

pub(super) fn add(dispatcher: Dispatcher) {
    INSTALL.call_once(install);
    hooks().push(dispatcher);
}

pub(super) fn remove(id: u64) {
    hooks().retain(|d| d.id != id);
}

#[cfg(test)]
pub(super) fn registered() -> Vec<u64> {
    hooks().iter().map(|d| d.id).collect()
}

fn hooks() -> MutexGuard<'static, Vec<Dispatcher>> {
    HOOKS.lock().unwrap_or_else(PoisonError::into_inner)
}

fn install() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        fan_out();
        previous(info);
    }));
}

fn fan_out() {
    // Never block inside the hook: a panic while the table is held would deadlock.
    let dispatchers = match HOOKS.try_lock() {
        Ok(guard) => guard.clone(),
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().clone(),
        Err(TryLockError::WouldBlock) => return,
    };

    for dispatcher in dispatchers {
        dispatcher.fire_blocking(StopCause::Fault, StopSignal::Terminate);
    }
}
