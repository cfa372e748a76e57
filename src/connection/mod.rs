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

//! The connection protocol core.
//!
//! A [`Connection`] is one symmetric end of a duplex link: it can register
//! handlers for the requests and notifications it receives while issuing
//! requests and notifications of its own. There is no client/server split;
//! both peers run the same state machine.
//!
//! # Architecture
//!
//! Each connection owns:
//!
//! - the port subscription, drained by one spawned reader task
//! - the pending-request table correlating outgoing ids with resolvers
//! - the request-handler and notification-listener tables
//! - the request id generator
//!
//! Notifications and response settlement run inline on the reader task, in
//! delivery order. Request handlers run in their own spawned task per
//! message, so a slow handler never blocks the message behind it.
//!
//! # Lifecycle
//!
//! A connection subscribes to its port at construction and stops dispatching
//! at [`dispose`](Connection::dispose). Disposal clears the handler tables
//! but deliberately leaves the pending table alone: a response still in
//! flight settles its caller afterward, and one that never arrives leaves
//! the caller pending forever; bounded waits are the caller's own
//! `tokio::time::timeout`.
//!
//! # Example
//!
//! ```rust
//! use portlink::{Connection, MemoryPort};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (left, right) = MemoryPort::pair();
//! let caller = Connection::new(Arc::new(left))?;
//! let callee = Connection::new(Arc::new(right))?;
//!
//! callee.on_request("sum", |params: Vec<Value>| async move {
//!     let a = params[0].as_i64().unwrap_or(0);
//!     let b = params[1].as_i64().unwrap_or(0);
//!     Ok(json!(a + b))
//! })?;
//!
//! let result = caller.send_request("sum", vec![json!(2), json!(3)]).await?;
//! assert_eq!(result, json!(5));
//! # Ok(())
//! # }
//! ```

mod pending;

use crate::envelope::Envelope;
use crate::error::{ConnectionError, ProtocolFault, RemoteFailure, SerializedThrow};
use crate::port::MessagePort;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use pending::{Outcome, PendingRequests};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// The outcome of one request handler invocation.
///
/// The `Err` value is the arbitrary serializable failure relayed verbatim to
/// the caller; it does not have to be error-shaped.
pub type HandlerResult = Result<Value, Value>;

/// A type-erased request handler.
///
/// Useful for collecting handlers with distinct closure types into one
/// homogeneous collection, e.g. for
/// [`Bridge::with_handlers`](crate::Bridge::with_handlers); build one with
/// [`boxed_handler`].
pub type DynRequestHandler =
    Box<dyn Fn(Vec<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Boxes a handler closure into a [`DynRequestHandler`].
pub fn boxed_handler<F, Fut>(handler: F) -> DynRequestHandler
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Box::new(move |params| handler(params).boxed())
}

type RequestHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
type NotificationListener = Arc<dyn Fn(&[Value]) + Send + Sync>;
type FaultHook = Box<dyn Fn(ProtocolFault) + Send + Sync>;

/// State shared between the public API, the reader task, and outstanding
/// registration handles.
struct Shared {
    disposed: AtomicBool,
    pending: PendingRequests,
    requests: Mutex<HashMap<String, RequestHandler>>,
    notifications: Mutex<HashMap<String, Vec<(u64, NotificationListener)>>>,
    next_listener_token: AtomicU64,
    fault_hook: Mutex<Option<FaultHook>>,
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn report_fault(&self, fault: ProtocolFault) {
        let hook = self.fault_hook.lock();
        match hook.as_ref() {
            Some(hook) => hook(fault),
            None => error!(%fault, "unattributable protocol fault"),
        }
    }
}

/// One symmetric end of a typed request/notification link over a message
/// port.
///
/// See the [module documentation](self) for the protocol and lifecycle
/// rules.
pub struct Connection {
    port: Arc<dyn MessagePort>,
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Creates a connection bound to one port and subscribes to its inbound
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Port`] when the port's inbound stream has
    /// already been taken.
    pub fn new(port: Arc<dyn MessagePort>) -> Result<Self, ConnectionError> {
        let inbound = port
            .subscribe()
            .map_err(|source| ConnectionError::Port { source })?;

        let shared = Arc::new(Shared {
            disposed: AtomicBool::new(false),
            pending: PendingRequests::new(),
            requests: Mutex::new(HashMap::new()),
            notifications: Mutex::new(HashMap::new()),
            next_listener_token: AtomicU64::new(1),
            fault_hook: Mutex::new(None),
        });

        let reader = tokio::spawn(run_dispatch(
            Arc::clone(&shared),
            Arc::clone(&port),
            inbound,
        ));

        Ok(Self {
            port,
            shared,
            reader,
        })
    }

    /// Creates a connection with the peer roles mirrored.
    ///
    /// Every connection is symmetric at the protocol level; this constructor
    /// exists to document which side of a pairing is being built: what the
    /// mirrored peer sends, this end handles, and vice versa. Runtime
    /// behavior is identical to [`new`](Self::new).
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn invert(port: Arc<dyn MessagePort>) -> Result<Self, ConnectionError> {
        Self::new(port)
    }

    /// Registers `handler` as the unique responder for requests named `name`.
    ///
    /// The handler receives the request params and its outcome is posted
    /// back to the caller as the response: `Ok` as the result, `Err` relayed
    /// verbatim as the failure. A handler that panics still answers its
    /// request with an error-shaped failure.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::AlreadyRegistered`] when a handler for
    /// `name` exists (the first registration is kept) and
    /// [`ConnectionError::Disposed`] after disposal.
    pub fn on_request<F, Fut>(
        &self,
        name: impl Into<String>,
        handler: F,
    ) -> Result<Registration, ConnectionError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if self.shared.is_disposed() {
            return Err(ConnectionError::Disposed);
        }
        let name = name.into();
        let boxed: RequestHandler = Arc::new(move |params| handler(params).boxed());

        let mut requests = self.shared.requests.lock();
        match requests.entry(name.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(ConnectionError::AlreadyRegistered { name })
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(boxed);
                Ok(Registration {
                    shared: Arc::downgrade(&self.shared),
                    slot: Slot::Request { name },
                })
            }
        }
    }

    /// Sends a request and waits for the correlated response.
    ///
    /// Allocates the next request id, records a resolver under it, posts the
    /// request envelope, and completes when the matching response arrives,
    /// or never, if none does. A response with neither result nor error
    /// resolves to [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Disposed`] immediately (without posting)
    /// after disposal, [`ConnectionError::Port`] when the post itself fails,
    /// and [`ConnectionError::Remote`] carrying the peer's failure value
    /// verbatim when the peer has no handler for `name` or its handler
    /// failed.
    pub async fn send_request(
        &self,
        name: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<Value, ConnectionError> {
        if self.shared.is_disposed() {
            return Err(ConnectionError::Disposed);
        }
        let name = name.into();
        let (id, resolver) = self.shared.pending.register();
        debug!(request = %name, id, "sending request");

        if let Err(source) = self.port.post(Envelope::request(name, params, id)) {
            self.shared.pending.discard(id);
            return Err(ConnectionError::Port { source });
        }

        match resolver.await {
            Ok(Ok(result)) => Ok(result.unwrap_or(Value::Null)),
            Ok(Err(error)) => Err(ConnectionError::Remote {
                failure: RemoteFailure::from_wire(error),
            }),
            // The resolver is held in the pending table for as long as this
            // future exists, so the sender can only vanish if the entry was
            // removed without being settled.
            Err(_) => Err(ConnectionError::Internal {
                message: format!("resolver for request #{} dropped unsettled", id),
            }),
        }
    }

    /// Adds `listener` to the set invoked for notifications named `name`.
    ///
    /// Any number of listeners may share a name; each is invoked
    /// independently per delivery and a panicking listener affects neither
    /// the others nor the dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Disposed`] after disposal.
    pub fn on_notification<F>(
        &self,
        name: impl Into<String>,
        listener: F,
    ) -> Result<Registration, ConnectionError>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        if self.shared.is_disposed() {
            return Err(ConnectionError::Disposed);
        }
        let name = name.into();
        let token = self
            .shared
            .next_listener_token
            .fetch_add(1, Ordering::Relaxed);

        self.shared
            .notifications
            .lock()
            .entry(name.clone())
            .or_default()
            .push((token, Arc::new(listener)));

        Ok(Registration {
            shared: Arc::downgrade(&self.shared),
            slot: Slot::Notification { name, token },
        })
    }

    /// Posts a fire-and-forget notification envelope.
    ///
    /// No acknowledgment, no result; a peer with no listeners for `name`
    /// drops it silently.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Disposed`] after disposal and
    /// [`ConnectionError::Port`] when the post fails.
    pub fn send_notification(
        &self,
        name: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<(), ConnectionError> {
        if self.shared.is_disposed() {
            return Err(ConnectionError::Disposed);
        }
        self.port
            .post(Envelope::notification(name, params))
            .map_err(|source| ConnectionError::Port { source })
    }

    /// Marks the connection disposed and clears both handler tables.
    ///
    /// Idempotent. Registered handlers stop firing even for envelopes
    /// already in flight; subsequent API calls fail with
    /// [`ConnectionError::Disposed`]. Pending requests are untouched: a
    /// response still in flight settles its caller, one that never arrives
    /// leaves the caller pending forever.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.requests.lock().clear();
        self.shared.notifications.lock().clear();
        debug!("connection disposed");
    }

    /// Returns true once [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Installs an observer for protocol faults that cannot be attributed
    /// to any caller, replacing the previous one.
    ///
    /// Without a hook such faults are logged at `error` level.
    pub fn set_fault_hook<F>(&self, hook: F)
    where
        F: Fn(ProtocolFault) + Send + Sync + 'static,
    {
        *self.shared.fault_hook.lock() = Some(Box::new(hook));
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("disposed", &self.shared.is_disposed())
            .field("pending", &self.shared.pending.len())
            .finish_non_exhaustive()
    }
}

/// Revocation handle for one handler or listener registration.
///
/// Disposing removes exactly this registration and is an idempotent no-op
/// thereafter. Dropping the handle without disposing leaves the
/// registration in place.
///
/// For request handlers, disposal removes whatever handler currently owns
/// the name; a stale handle disposed after the name was re-registered
/// removes the new handler too, matching the remove-by-key contract.
#[derive(Debug)]
pub struct Registration {
    shared: Weak<Shared>,
    slot: Slot,
}

#[derive(Debug)]
enum Slot {
    Request { name: String },
    Notification { name: String, token: u64 },
}

impl Registration {
    /// Removes the registration this handle was issued for.
    pub fn dispose(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match &self.slot {
            Slot::Request { name } => {
                shared.requests.lock().remove(name);
            }
            Slot::Notification { name, token } => {
                let mut notifications = shared.notifications.lock();
                if let Some(listeners) = notifications.get_mut(name) {
                    listeners.retain(|(held, _)| held != token);
                    if listeners.is_empty() {
                        notifications.remove(name);
                    }
                }
            }
        }
    }
}

/// Reads the inbound stream and reacts to each envelope, in delivery order.
async fn run_dispatch(
    shared: Arc<Shared>,
    port: Arc<dyn MessagePort>,
    mut inbound: mpsc::UnboundedReceiver<Envelope>,
) {
    while let Some(envelope) = inbound.recv().await {
        match envelope {
            Envelope::Notification { name, params } => {
                if shared.is_disposed() {
                    continue;
                }
                dispatch_notification(&shared, &name, &params);
            }
            Envelope::Request { name, params, id } => {
                if shared.is_disposed() {
                    continue;
                }
                dispatch_request(&shared, &port, name, params, id);
            }
            Envelope::Response { id, result, error } => {
                let outcome: Outcome = match error {
                    Some(error) => Err(error),
                    None => Ok(result),
                };
                if !shared.pending.settle(id, outcome) && !shared.is_disposed() {
                    shared.report_fault(ProtocolFault::OrphanedResponse { id });
                }
            }
        }
    }
}

fn dispatch_notification(shared: &Shared, name: &str, params: &[Value]) {
    let listeners: Vec<NotificationListener> = match shared.notifications.lock().get(name) {
        Some(listeners) => listeners.iter().map(|(_, f)| Arc::clone(f)).collect(),
        None => {
            debug!(notification = %name, "no listeners, dropping notification");
            return;
        }
    };
    for listener in listeners {
        // Each listener is isolated: a panic in one neither reaches the
        // others nor the dispatch loop.
        if std::panic::catch_unwind(AssertUnwindSafe(|| listener(params))).is_err() {
            warn!(notification = %name, "notification listener panicked");
        }
    }
}

fn dispatch_request(
    shared: &Shared,
    port: &Arc<dyn MessagePort>,
    name: String,
    params: Vec<Value>,
    id: u64,
) {
    let handler = shared.requests.lock().get(&name).cloned();
    let Some(handler) = handler else {
        debug!(request = %name, id, "no handler registered");
        let error = SerializedThrow::not_implemented(&name).to_value();
        if let Err(err) = port.post(Envelope::response_err(id, error)) {
            warn!(request = %name, id, error = %err, "failed to post not-implemented response");
        }
        return;
    };

    // The invocation is committed here: the handler runs to completion and
    // its response fires even if the name is disposed or re-registered in
    // the meantime. The next inbound message is not blocked on it.
    let port = Arc::clone(port);
    tokio::spawn(async move {
        // Constructing the future and awaiting it are both contained: a
        // handler that panics before suspending is answered the same way as
        // one that panics after.
        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(payload) => Err(payload),
        };
        let response = match outcome {
            Ok(Ok(result)) => Envelope::response_ok(id, result),
            Ok(Err(error)) => Envelope::response_err(id, error),
            Err(payload) => {
                let thrown = SerializedThrow::panicked(&name, panic_message(payload.as_ref()));
                Envelope::response_err(id, thrown.to_value())
            }
        };
        if let Err(err) = port.post(response) {
            // There is no further channel to report this on.
            warn!(request = %name, id, error = %err, "failed to post response");
        }
    });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
