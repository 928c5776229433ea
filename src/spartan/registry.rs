//! Book-keeping for in-flight client requests.
//!
//! Every request submitted through [`SpartanClient::send_request`] gets an
//! entry here from submission until its callback has returned. Insert and
//! remove are the only mutations, both under a single mutex.
//!
//! [`SpartanClient::send_request`]: crate::spartan::client::SpartanClient::send_request

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::spartan::url::SpartanUrl;

/// Opaque handle of a registered request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(u64);

/// What the registry knows about a request.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub url: SpartanUrl,
    pub started: Instant,
}

#[derive(Debug, Default)]
struct Entries {
    next_id: u64,
    requests: HashMap<u64, InFlight>,
}

#[derive(Debug, Default)]
pub struct RequestRegistry {
    entries: Mutex<Entries>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a request and returns its fresh, unique handle.
    pub fn insert(&self, url: SpartanUrl) -> RequestHandle {
        let mut entries = self.lock();
        let id = loop {
            entries.next_id = entries.next_id.wrapping_add(1);
            let candidate = entries.next_id;
            if candidate != 0 && !entries.requests.contains_key(&candidate) {
                break candidate;
            }
        };
        entries.requests.insert(
            id,
            InFlight {
                url,
                started: Instant::now(),
            },
        );
        RequestHandle(id)
    }

    pub fn remove(&self, handle: RequestHandle) -> Option<InFlight> {
        self.lock().requests.remove(&handle.0)
    }

    pub fn get(&self, handle: RequestHandle) -> Option<InFlight> {
        self.lock().requests.get(&handle.0).cloned()
    }

    pub fn contains(&self, handle: RequestHandle) -> bool {
        self.lock().requests.contains_key(&handle.0)
    }

    pub fn len(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its entry from the registry when dropped.
///
/// Held by the task running a request so the entry goes away once the
/// callback has returned, even if the callback panics.
pub(crate) struct Registration {
    registry: Arc<RequestRegistry>,
    handle: RequestHandle,
}

impl Registration {
    pub(crate) fn new(registry: Arc<RequestRegistry>, handle: RequestHandle) -> Self {
        Self { registry, handle }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.handle);
    }
}
