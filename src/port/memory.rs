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

//! In-memory port implementation for testing.
//!
//! Two cross-wired [`MemoryPort`]s form a complete duplex link inside one
//! process, using Tokio channels for delivery. Every posted envelope
//! round-trips through its JSON text form before delivery, so tests exercise
//! the same serialization fidelity a real host channel would enforce.

use crate::envelope::Envelope;
use crate::error::PortError;
use crate::port::MessagePort;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// One end of an in-memory duplex envelope link.
///
/// # Example
///
/// ```rust
/// use portlink::{Envelope, MemoryPort, MessagePort};
///
/// # async fn example() {
/// let (left, right) = MemoryPort::pair();
/// let mut inbound = right.subscribe().unwrap();
///
/// left.post(Envelope::notification("ping", vec![])).unwrap();
/// let delivered = inbound.recv().await.unwrap();
/// assert_eq!(delivered.name(), Some("ping"));
/// # }
/// ```
pub struct MemoryPort {
    outbound: mpsc::UnboundedSender<Envelope>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
}

impl MemoryPort {
    /// Creates a pair of connected in-memory ports.
    ///
    /// Envelopes posted on one end are delivered on the other, in order.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (tx_left, rx_left) = mpsc::unbounded_channel();
        let (tx_right, rx_right) = mpsc::unbounded_channel();

        let left = Self {
            outbound: tx_left,
            inbound: Mutex::new(Some(rx_right)),
        };
        let right = Self {
            outbound: tx_right,
            inbound: Mutex::new(Some(rx_left)),
        };
        (left, right)
    }
}

impl MessagePort for MemoryPort {
    fn post(&self, envelope: Envelope) -> Result<(), PortError> {
        // Round-trip through the textual wire form so anything the peer
        // receives has survived real serialization.
        let text =
            serde_json::to_string(&envelope).map_err(|err| PortError::NotTransportable {
                reason: err.to_string(),
            })?;
        let decoded =
            serde_json::from_str(&text).map_err(|err| PortError::NotTransportable {
                reason: err.to_string(),
            })?;
        self.outbound.send(decoded).map_err(|_| PortError::Closed)
    }

    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Envelope>, PortError> {
        self.inbound
            .lock()
            .take()
            .ok_or(PortError::AlreadySubscribed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_port_basic_delivery() {
        let (left, right) = MemoryPort::pair();
        let mut inbound = right.subscribe().unwrap();

        left.post(Envelope::request("sum", vec![json!(2), json!(3)], 1))
            .unwrap();

        let delivered = inbound.recv().await.unwrap();
        assert_eq!(
            delivered,
            Envelope::request("sum", vec![json!(2), json!(3)], 1)
        );
    }

    #[tokio::test]
    async fn test_memory_port_bidirectional() {
        let (left, right) = MemoryPort::pair();
        let mut left_inbound = left.subscribe().unwrap();
        let mut right_inbound = right.subscribe().unwrap();

        left.post(Envelope::notification("ping", vec![])).unwrap();
        right.post(Envelope::notification("pong", vec![])).unwrap();

        assert_eq!(right_inbound.recv().await.unwrap().name(), Some("ping"));
        assert_eq!(left_inbound.recv().await.unwrap().name(), Some("pong"));
    }

    #[tokio::test]
    async fn test_memory_port_fifo_order() {
        let (left, right) = MemoryPort::pair();
        let mut inbound = right.subscribe().unwrap();

        for id in 1..=5 {
            left.post(Envelope::request("tick", vec![], id)).unwrap();
        }
        for id in 1..=5 {
            assert_eq!(inbound.recv().await.unwrap().id(), Some(id));
        }
    }

    #[tokio::test]
    async fn test_memory_port_single_subscriber() {
        let (left, _right) = MemoryPort::pair();
        let _inbound = left.subscribe().unwrap();
        assert!(matches!(
            left.subscribe(),
            Err(PortError::AlreadySubscribed)
        ));
    }

    #[tokio::test]
    async fn test_memory_port_closed_peer() {
        let (left, right) = MemoryPort::pair();
        drop(right);

        let result = left.post(Envelope::notification("ping", vec![]));
        assert!(matches!(result, Err(PortError::Closed)));
    }

    #[tokio::test]
    async fn test_memory_port_payload_fidelity() {
        let (left, right) = MemoryPort::pair();
        let mut inbound = right.subscribe().unwrap();

        let params = vec![json!({"nested": [1, 2.5, "three", null, true]})];
        left.post(Envelope::request("echo", params.clone(), 9))
            .unwrap();

        let delivered = inbound.recv().await.unwrap();
        assert_eq!(delivered, Envelope::request("echo", params, 9));
    }
}
