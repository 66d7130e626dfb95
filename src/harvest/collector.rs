//! Dedupe map shared by the sources of one harvest

use std::collections::HashSet;
use std::sync::Mutex;

/// Result of offering an item to a [`Collector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// A previously unseen id was stored
    Added,

    /// The id was already present; nothing changed
    Duplicate,

    /// The cap was already reached; nothing changed
    CapReached,
}

/// Dedupe map shared by every source feeding one harvest
///
/// Keeps insertion order and refuses new ids once the optional cap is hit.
/// The lock is never held across an await point.
#[derive(Debug)]
pub struct Collector<T> {
    cap: Option<usize>,
    inner: Mutex<Entries<T>>,
}

#[derive(Debug)]
struct Entries<T> {
    seen: HashSet<String>,
    items: Vec<T>,
}

impl<T> Collector<T> {
    /// Creates an empty collector with an optional cap
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            cap,
            inner: Mutex::new(Entries {
                seen: HashSet::new(),
                items: Vec::new(),
            }),
        }
    }

    /// Offers an item under its stable id
    pub fn insert(&self, id: impl Into<String>, item: T) -> Inserted {
        let mut entries = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let id = id.into();

        if entries.seen.contains(&id) {
            return Inserted::Duplicate;
        }

        if self.cap.is_some_and(|cap| entries.items.len() >= cap) {
            return Inserted::CapReached;
        }

        entries.seen.insert(id);
        entries.items.push(item);

        Inserted::Added
    }

    /// Number of collected items
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns true if nothing was collected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once the cap is reached
    pub fn is_full(&self) -> bool {
        self.cap.is_some_and(|cap| self.len() >= cap)
    }

    /// Consumes the collector, returning items in insertion order
    pub fn into_items(self) -> Vec<T> {
        match self.inner.into_inner() {
            Ok(entries) => entries.items,
            Err(poisoned) => poisoned.into_inner().items,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries<T>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
