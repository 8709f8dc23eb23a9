//! # Function Table
//!
//! The local functions this endpoint has sent across the channel, with the
//! number of references the other side still holds to each.
//!
//! ## Invariants
//!
//! - An entry exists exactly while its retain count is above zero.
//! - One `LocalFunction` identity maps to at most one live id.
//! - Every transmission retains once; every `Release` gives back once.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use threadwire::FunctionId;

use crate::value::LocalFunction;

struct Entry {
    function: LocalFunction,
    retained: u64,
}

#[derive(Default)]
struct State {
    next_id: u64,
    entries: HashMap<FunctionId, Entry>,
    by_addr: HashMap<usize, FunctionId>,
}

/// Reference-counted registry of functions exported over one channel.
#[derive(Default)]
pub(crate) struct FunctionTable {
    state: Mutex<State>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one more transmission of `function`, returning its id.
    pub fn retain(&self, function: &LocalFunction) -> FunctionId {
        let mut state = self.lock();
        let addr = function.addr();

        if let Some(id) = state.by_addr.get(&addr).copied() {
            if let Some(entry) = state.entries.get_mut(&id) {
                entry.retained += 1;
                return id;
            }
        }

        state.next_id += 1;
        let id = FunctionId(state.next_id);
        state.entries.insert(id, Entry { function: function.clone(), retained: 1 });
        state.by_addr.insert(addr, id);
        id
    }

    /// Handles an incoming `Retain`. Returns false if the id is not live.
    pub fn retain_id(&self, id: FunctionId) -> bool {
        match self.lock().entries.get_mut(&id) {
            Some(entry) => {
                entry.retained += 1;
                true
            }
            None => false,
        }
    }

    /// Gives back one reference. Returns the remaining count, or `None` if the id is not live.
    pub fn release(&self, id: FunctionId) -> Option<u64> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(&id)?;
        entry.retained -= 1;
        let remaining = entry.retained;

        if remaining == 0 {
            if let Some(entry) = state.entries.remove(&id) {
                state.by_addr.remove(&entry.function.addr());
            }
        }
        Some(remaining)
    }

    /// Gives back a batch of references taken for a message that was never sent.
    pub fn release_all(&self, ids: &[FunctionId]) {
        for id in ids {
            self.release(*id);
        }
    }

    pub fn get(&self, id: FunctionId) -> Option<LocalFunction> {
        self.lock().entries.get(&id).map(|entry| entry.function.clone())
    }

    pub fn retain_count(&self, id: FunctionId) -> u64 {
        self.lock().entries.get(&id).map_or(0, |entry| entry.retained)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.by_addr.clear();
    }
}
