use std::mem;

use crate::commands::Command;

/// Commands queued by a client between `MULTI` and `EXEC`. Every connection owns its own
/// transaction; it is never shared.
///
/// Ref: <https://redis.io/docs/latest/develop/interact/transactions/>
#[derive(Debug, Default)]
pub struct Transaction {
    active: bool,
    queued: Vec<Command>,
}

impl Transaction {
    pub fn new() -> Transaction {
        Transaction::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub fn begin(&mut self) {
        self.active = true;
    }

    pub fn queue(&mut self, command: Command) {
        self.queued.push(command);
    }

    /// Leaves transaction mode and hands out the queued commands in the order they were queued.
    /// Returns `None` when no transaction was started.
    pub fn take(&mut self) -> Option<Vec<Command>> {
        if !self.active {
            return None;
        }
        self.active = false;
        Some(mem::take(&mut self.queued))
    }

    /// Leaves transaction mode dropping the queued commands. Returns whether a transaction was
    /// active.
    pub fn discard(&mut self) -> bool {
        self.queued.clear();
        mem::replace(&mut self.active, false)
    }
}
