//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Tracking of in-flight requests awaiting responses.
//!
//! Allocation and bookkeeping live together: a request id is never handed
//! out without its resolver entry, and an entry is removed exactly once when
//! the matching response settles it.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Largest request id handed out before the counter wraps back to 1.
///
/// Ids stay below 2^53 so a peer that stores them in a double-precision
/// float never loses precision.
pub(crate) const MAX_REQUEST_ID: u64 = (1 << 53) - 1;

/// The settled outcome of one request: the handler's return value on
/// success, the relayed failure value otherwise. `Ok(None)` is a successful
/// call with no meaningful return value.
pub(crate) type Outcome = Result<Option<Value>, Value>;

/// Tracks pending requests awaiting responses.
///
/// Maps correlation ids to resolver channels so responses route back to the
/// correct caller even when many requests are in flight and replies arrive
/// out of order.
#[derive(Debug)]
pub(crate) struct PendingRequests {
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    resolvers: HashMap<u64, oneshot::Sender<Outcome>>,
}

impl PendingRequests {
    /// Creates an empty tracker; the first allocated id is 1.
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                resolvers: HashMap::new(),
            }),
        }
    }

    /// Allocates the next request id and records its resolver.
    ///
    /// The counter increases monotonically and wraps back to 1 after
    /// [`MAX_REQUEST_ID`]; under normal load an id is never reissued while a
    /// request with that id is still outstanding.
    pub(crate) fn register(&self) -> (u64, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id = if id >= MAX_REQUEST_ID { 1 } else { id + 1 };
        state.resolvers.insert(id, tx);
        (id, rx)
    }

    /// Removes the entry for `id` and settles its caller.
    ///
    /// Returns `false` when no entry exists: an orphaned response the
    /// caller of this method must report, never swallow.
    pub(crate) fn settle(&self, id: u64, outcome: Outcome) -> bool {
        let resolver = self.state.lock().resolvers.remove(&id);
        match resolver {
            // A dropped receiver just means the caller stopped waiting.
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Backs out an entry whose request was never posted.
    pub(crate) fn discard(&self, id: u64) {
        self.state.lock().resolvers.remove(&id);
    }

    /// Number of requests currently awaiting a response.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().resolvers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let pending = PendingRequests::new();
        let (first, _rx1) = pending.register();
        let (second, _rx2) = pending.register();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_id_wraps_after_maximum() {
        let pending = PendingRequests::new();
        pending.state.lock().next_id = MAX_REQUEST_ID;

        let (last, _rx1) = pending.register();
        let (wrapped, _rx2) = pending.register();
        assert_eq!(last, MAX_REQUEST_ID);
        assert_eq!(wrapped, 1);
    }

    #[tokio::test]
    async fn test_settle_resolves_exactly_one_caller() {
        let pending = PendingRequests::new();
        let (id_a, rx_a) = pending.register();
        let (id_b, rx_b) = pending.register();

        assert!(pending.settle(id_b, Ok(Some(json!("b")))));
        assert!(pending.settle(id_a, Err(json!("a failed"))));

        assert_eq!(rx_a.await.unwrap(), Err(json!("a failed")));
        assert_eq!(rx_b.await.unwrap(), Ok(Some(json!("b"))));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_settle_unknown_id_reports_orphan() {
        let pending = PendingRequests::new();
        assert!(!pending.settle(99, Ok(None)));
    }

    #[test]
    fn test_settle_is_exactly_once() {
        let pending = PendingRequests::new();
        let (id, _rx) = pending.register();
        assert!(pending.settle(id, Ok(None)));
        assert!(!pending.settle(id, Ok(None)));
    }

    #[test]
    fn test_discard_backs_out_entry() {
        let pending = PendingRequests::new();
        let (id, rx) = pending.register();
        pending.discard(id);
        assert_eq!(pending.len(), 0);
        drop(rx);
        assert!(!pending.settle(id, Ok(None)));
    }

    #[test]
    fn test_settle_tolerates_dropped_caller() {
        let pending = PendingRequests::new();
        let (id, rx) = pending.register();
        drop(rx);
        // Entry removal still counts as settled; the caller walked away.
        assert!(pending.settle(id, Ok(None)));
    }
}
