use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Per-collection mutual exclusion for schema changes.
///
/// Operations on one collection are serialized; operations on different
/// collections run concurrently. A multi-collection operation acquires all of
/// its names at once, so two of them can never deadlock.
#[derive(Default)]
pub struct CollectionLocks {
    busy: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Collections held by one schema operation, released on drop.
pub struct LockSet<'a> {
    owner: &'a CollectionLocks,
    names: Vec<String>,
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn busy(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.busy.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Blocks until every named collection is free, then holds all of them.
    pub fn lock_many<'n, I>(&self, names: I) -> LockSet<'_>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let mut names: Vec<String> = names.into_iter().map(str::to_string).collect();
        names.sort_unstable();
        names.dedup();

        let mut busy = self.busy();
        while names.iter().any(|n| busy.contains(n)) {
            busy = match self.released.wait(busy) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        busy.extend(names.iter().cloned());
        LockSet { owner: self, names }
    }

    pub fn lock(&self, name: &str) -> LockSet<'_> {
        self.lock_many([name])
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        let mut busy = self.owner.busy();
        for name in &self.names {
            busy.remove(name);
        }
        drop(busy);
        self.owner.released.notify_all();
    }
}
