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

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # Portlink - Bidirectional RPC over Message Ports
//!
//! Portlink provides typed, bidirectional request/response and
//! fire-and-forget notification semantics over an abstract asynchronous
//! message channel: two endpoints that can post opaque messages to each
//! other and receive them asynchronously, FIFO per direction, with no
//! shared memory. It is designed for pairing a background worker, process,
//! or thread with a controlling counterpart, but the port abstraction is
//! generic.
//!
//! - **Symmetric peers**: there is no client/server split; each side
//!   registers handlers for what it receives and issues requests of its own
//! - **Request correlation**: responses are matched to callers by id, even
//!   when many requests are in flight and replies arrive out of order
//! - **Failure relay**: a handler's failure value crosses the port verbatim
//!   and rejects the original caller, nowhere else
//! - **Pluggable ports**: the channel is an explicit capability behind the
//!   [`MessagePort`] trait, so the core runs unchanged over any host link
//!   (and over [`MemoryPort`] in tests)
//!
//! ## Architecture
//!
//! Portlink is organized in four layers:
//!
//! - [`envelope`]: the three wire shapes (notification, request, response)
//! - [`port`]: the duplex channel capability supplied by the host
//! - [`connection`]: the protocol core: pending-request table, handler
//!   tables, dispatch, lifecycle
//! - [`bridge`]: optional sugar exposing request names as callable methods
//!
//! ## Quick Start
//!
//! ```rust
//! use portlink::{Connection, MemoryPort};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (left, right) = MemoryPort::pair();
//! let controller = Connection::new(Arc::new(left))?;
//! let worker = Connection::new(Arc::new(right))?;
//!
//! // The worker side answers "sum" requests...
//! worker.on_request("sum", |params: Vec<Value>| async move {
//!     let total: i64 = params.iter().filter_map(Value::as_i64).sum();
//!     Ok(json!(total))
//! })?;
//!
//! // ...and observes "progress" notifications.
//! worker.on_notification("progress", |params| {
//!     println!("progress: {:?}", params);
//! })?;
//!
//! let total = controller.send_request("sum", vec![json!(2), json!(3)]).await?;
//! assert_eq!(total, json!(5));
//!
//! controller.send_notification("progress", vec![json!(50)])?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Portlink distinguishes local usage errors from relayed peer failures:
//!
//! - [`ConnectionError::Disposed`] / [`ConnectionError::AlreadyRegistered`]:
//!   caller bugs, reported at the call site
//! - [`ConnectionError::Remote`]: the peer had no handler or its handler
//!   failed; the peer's failure value is carried verbatim
//! - [`ConnectionError::Port`]: the underlying channel rejected a post
//! - [`ProtocolFault`]: a response matching no pending request has no caller
//!   to reject; it surfaces through the connection's fault hook instead of
//!   being dropped
//!
//! ## Safety
//!
//! Portlink is written in 100% safe Rust with `#![deny(unsafe_code)]`.
//! All concurrency is handled through Tokio's async runtime.

pub mod bridge;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod port;

pub use bridge::{Bridge, RemoteMethod};
pub use connection::{Connection, DynRequestHandler, HandlerResult, Registration, boxed_handler};
pub use envelope::Envelope;
pub use error::{ConnectionError, PortError, ProtocolFault, RemoteFailure, SerializedThrow};
pub use port::{MemoryPort, MessagePort};
