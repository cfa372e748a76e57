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

//! The message port abstraction a [`Connection`](crate::Connection) sits on.
//!
//! A port is one end of a duplex link supplied by the host environment: it
//! can post opaque envelopes to the peer and delivers the peer's envelopes
//! asynchronously, FIFO per direction, with no shared memory. The connection
//! layer never assumes anything else about the link: pairing a process with
//! a background worker, two threads, or two halves of a test are all the
//! same thing behind this trait.
//!
//! The abstract contract's "register a message listener" is rendered as
//! [`MessagePort::subscribe`]: the inbound envelope stream may be taken once,
//! and dropping the receiver is unregistration.

mod memory;

pub use memory::MemoryPort;

use crate::envelope::Envelope;
use crate::error::PortError;
use tokio::sync::mpsc;

/// One end of a duplex envelope channel.
///
/// Implementations must deliver envelopes in per-direction FIFO order and
/// must tolerate `post` after the peer is gone by returning
/// [`PortError::Closed`].
pub trait MessagePort: Send + Sync + 'static {
    /// Hands an envelope to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotTransportable`] when the envelope cannot be
    /// encoded and [`PortError::Closed`] when the peer end is gone. The
    /// failure propagates to whichever connection call triggered the post.
    fn post(&self, envelope: Envelope) -> Result<(), PortError>;

    /// Takes the inbound envelope stream.
    ///
    /// Yields each envelope delivered by the peer, in delivery order. A port
    /// has exactly one subscriber at a time.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::AlreadySubscribed`] when the stream has already
    /// been taken.
    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Envelope>, PortError>;
}
