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

//! Error types for the connection and port layers.
//!
//! # Error Categories
//!
//! - **Usage errors** ([`ConnectionError::Disposed`],
//!   [`ConnectionError::AlreadyRegistered`]): reported synchronously at the
//!   call site, always recoverable, indicate a caller bug.
//! - **Protocol errors from the peer** ([`ConnectionError::Remote`]): a
//!   missing handler or a failed handler on the other side; always delivered
//!   to the original caller of
//!   [`send_request`](crate::Connection::send_request), never thrown
//!   elsewhere.
//! - **Transport errors** ([`ConnectionError::Port`]): the port rejected a
//!   post; surface on whichever call triggered the post.
//! - **Unattributable faults** ([`ProtocolFault`]): a response with no
//!   matching pending request has no caller to deliver to; it is reported
//!   through the connection's fault hook instead of being silently dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use thiserror::Error;

/// Wire error name used when a request has no registered handler on the peer.
pub(crate) const NOT_IMPLEMENTED: &str = "NotImplemented";

/// Wire error name used when a request handler panicked.
pub(crate) const HANDLER_PANICKED: &str = "HandlerPanicked";

/// Errors raised by a [`MessagePort`](crate::port::MessagePort)
/// implementation.
#[derive(Debug, Error)]
pub enum PortError {
    /// The peer end of the port is gone; nothing can be posted or received.
    #[error("port is closed")]
    Closed,

    /// The envelope could not be encoded for transport.
    #[error("envelope is not transportable: {reason}")]
    NotTransportable {
        /// Description of the encoding failure.
        reason: String,
    },

    /// The inbound stream of this port has already been taken.
    ///
    /// A port delivers to exactly one subscriber at a time; a second
    /// [`subscribe`](crate::port::MessagePort::subscribe) without the first
    /// receiver being returned is a caller bug.
    #[error("port inbound stream is already subscribed")]
    AlreadySubscribed,
}

/// Errors returned by [`Connection`](crate::Connection) operations.
#[derive(Debug)]
pub enum ConnectionError {
    /// The connection has been disposed; no further operations are accepted.
    Disposed,

    /// A request handler is already registered under this name.
    ///
    /// The first registration is kept; this registration had no effect.
    AlreadyRegistered {
        /// The contested request name.
        name: String,
    },

    /// The peer answered the request with a failure.
    ///
    /// Covers both a missing handler on the peer and a handler that failed.
    /// The peer's error value is carried verbatim in the failure.
    Remote {
        /// The relayed failure.
        failure: RemoteFailure,
    },

    /// The underlying port rejected a post.
    Port {
        /// The port-level failure.
        source: PortError,
    },

    /// An internal invariant was violated.
    Internal {
        /// A description of the internal error.
        message: String,
    },
}

impl ConnectionError {
    /// Returns true if the connection was disposed before or during the call.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    /// Returns true if this is a duplicate handler registration.
    #[must_use]
    pub const fn is_already_registered(&self) -> bool {
        matches!(self, Self::AlreadyRegistered { .. })
    }

    /// Returns true if the peer reported that no handler exists for the
    /// requested name.
    #[must_use]
    pub fn is_not_implemented(&self) -> bool {
        match self {
            Self::Remote { failure } => failure.is_not_implemented(),
            _ => false,
        }
    }

    /// Returns the relayed peer failure, if this is a remote error.
    #[must_use]
    pub const fn remote_failure(&self) -> Option<&RemoteFailure> {
        match self {
            Self::Remote { failure } => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disposed => {
                write!(f, "connection is disposed")
            }
            Self::AlreadyRegistered { name } => {
                write!(f, "request handler for '{}' is already registered", name)
            }
            Self::Remote { failure } => {
                write!(f, "peer request failed: {}", failure)
            }
            Self::Port { source } => {
                write!(f, "port post failed: {}", source)
            }
            Self::Internal { message } => {
                write!(f, "internal connection error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Port { source } => Some(source),
            _ => None,
        }
    }
}

/// A failure value relayed from the peer, verbatim.
///
/// The peer's error may be any serializable value, not necessarily an error
/// object. When it is error-shaped (`{name, message, stack}`), the caller's
/// own backtrace is appended to a diagnostic copy of the stack so a failure
/// crossing the port shows a continuous trace spanning both sides. The
/// verbatim [`value`](Self::value) is never altered by this; error identity
/// survives the crossing unmodified.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFailure {
    error: Value,
    stack: Option<String>,
}

impl RemoteFailure {
    /// Wraps a wire error value, splicing the caller-side backtrace into the
    /// diagnostic stack when the value is error-shaped.
    #[must_use]
    pub(crate) fn from_wire(error: Value) -> Self {
        let stack = SerializedThrow::from_value(&error).map(|thrown| {
            let mut stack = thrown.stack.unwrap_or_default();
            let local = Backtrace::capture();
            if local.status() == BacktraceStatus::Captured {
                if !stack.is_empty() {
                    stack.push('\n');
                }
                stack.push_str("request sent at:\n");
                stack.push_str(&local.to_string());
            }
            stack
        });
        Self { error, stack }
    }

    /// The peer's failure value, exactly as it came off the wire.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.error
    }

    /// Consumes the failure, yielding the verbatim wire value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.error
    }

    /// The `message` field, when the failure is error-shaped.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.error.get("message").and_then(Value::as_str)
    }

    /// The `name` field, when the failure is error-shaped.
    #[must_use]
    pub fn error_name(&self) -> Option<&str> {
        self.error.get("name").and_then(Value::as_str)
    }

    /// The spliced diagnostic stack: callee frames first, caller frames
    /// appended. `None` when the failure is not error-shaped.
    #[must_use]
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// Returns true if the peer had no handler for the requested name.
    #[must_use]
    pub fn is_not_implemented(&self) -> bool {
        self.error_name() == Some(NOT_IMPLEMENTED)
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}", message),
            None => write!(f, "{}", self.error),
        }
    }
}

/// The error-shaped wire value a responder sends when a handler fails with a
/// structured error, when no handler exists, or when a handler panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedThrow {
    /// Error class name.
    pub name: String,
    /// Human-readable failure description.
    pub message: String,
    /// Callee-side diagnostic trace, if one was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl SerializedThrow {
    /// Builds the synthesized failure for a request nobody handles.
    #[must_use]
    pub(crate) fn not_implemented(request: &str) -> Self {
        Self {
            name: NOT_IMPLEMENTED.to_string(),
            message: format!("request '{}' is not implemented", request),
            stack: None,
        }
    }

    /// Builds the failure relayed when a handler panicked instead of
    /// returning.
    #[must_use]
    pub(crate) fn panicked(request: &str, message: String) -> Self {
        Self {
            name: HANDLER_PANICKED.to_string(),
            message: format!("handler for '{}' panicked: {}", request, message),
            stack: None,
        }
    }

    /// Reads an error-shaped wire value back into its parts.
    ///
    /// Returns `None` when the value does not carry both `name` and
    /// `message` strings; such values are relayed verbatim without stack
    /// splicing.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            name: value.get("name")?.as_str()?.to_string(),
            message: value.get("message")?.as_str()?.to_string(),
            stack: value
                .get("stack")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Encodes this error as a wire value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        // Serialization of three plain fields cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A protocol violation that cannot be attributed to any caller.
///
/// Reported through the connection's fault hook (default:
/// `tracing::error!`) rather than silently dropped, since it indicates
/// either an id-correlation bug or a forged message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolFault {
    /// A response arrived whose id matches no pending request.
    OrphanedResponse {
        /// The unmatched correlation id.
        id: u64,
    },
}

impl fmt::Display for ProtocolFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanedResponse { id } => {
                write!(f, "response #{} matches no pending request", id)
            }
        }
    }
}
