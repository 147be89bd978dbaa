//! Correlation of lookup requests and their responses.

use std::collections::HashMap;

use crate::context::BackgroundContext;
use crate::message::{LookupRequest, LookupResponse};

/// Single-use continuation for one lookup.
pub type ResponseCallback = Box<dyn FnOnce(Option<LookupResponse>) + Send>;

/// Pending request table plus the ID allocator.
///
/// IDs start at 1 and only ever increase; clearing the table does not
/// rewind them, so a response from a torn-down context can never resolve a
/// newer request.
pub struct Correlator {
    next_id: u64,
    pending: HashMap<u64, ResponseCallback>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Tag `request` with a fresh ID, remember `callback` and post the
    /// request into `context`. Returns the assigned ID.
    pub fn dispatch(
        &mut self,
        context: &mut dyn BackgroundContext,
        request: LookupRequest,
        callback: ResponseCallback,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(id, callback);
        context.post(request.into_message(id));
        id
    }

    /// Remove and return the callback waiting on `id`.
    pub fn resolve(&mut self, id: u64) -> Option<ResponseCallback> {
        self.pending.remove(&id)
    }

    /// Drop every pending entry, returning the abandoned callbacks.
    pub fn clear(&mut self) -> Vec<ResponseCallback> {
        self.pending.drain().map(|(_, callback)| callback).collect()
    }

    /// Number of requests still waiting for a response.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("next_id", &self.next_id)
            .field("pending", &self.pending.len())
            .finish()
    }
}
