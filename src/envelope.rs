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

//! Wire envelopes exchanged between connected peers.
//!
//! Every message posted over a [`MessagePort`](crate::port::MessagePort) is
//! one of three shapes:
//!
//! - [`Envelope::Notification`]: fire-and-forget, no reply expected
//! - [`Envelope::Request`]: carries a request id so the reply can be matched
//! - [`Envelope::Response`]: carries the matching id plus a result or error
//!
//! # Wire Format
//!
//! Envelopes serialize to a JSON-like object discriminated by an integer
//! `type` field:
//!
//! ```text
//! Notification: { "type": 0, "name": string, "params": [any...] }
//! Request:      { "type": 1, "name": string, "params": [any...], "id": integer }
//! Response:     { "type": 2, "id": integer, "result"?: any, "error"?: any }
//! ```
//!
//! A response carrying neither `result` nor `error` denotes a successful
//! call with no meaningful return value.
//!
//! Envelopes are immutable once constructed; there are constructor functions
//! but no mutators.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Wire discriminant for notification envelopes.
const KIND_NOTIFICATION: u8 = 0;
/// Wire discriminant for request envelopes.
const KIND_REQUEST: u8 = 1;
/// Wire discriminant for response envelopes.
const KIND_RESPONSE: u8 = 2;

/// One message on the wire between two connected peers.
///
/// # Example
///
/// ```rust
/// use portlink::Envelope;
/// use serde_json::json;
///
/// let request = Envelope::request("sum", vec![json!(2), json!(3)], 1);
/// let text = serde_json::to_string(&request).unwrap();
/// let back: Envelope = serde_json::from_str(&text).unwrap();
/// assert_eq!(request, back);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A fire-and-forget event. The receiver invokes every listener
    /// registered for `name` and discards their results.
    Notification {
        /// The notification name listeners are keyed by.
        name: String,
        /// Positional arguments delivered to each listener.
        params: Vec<Value>,
    },
    /// A call expecting exactly one [`Envelope::Response`] with the same `id`.
    Request {
        /// The request name the peer's handler is keyed by.
        name: String,
        /// Positional arguments delivered to the handler.
        params: Vec<Value>,
        /// Correlation id, unique among the sender's outstanding requests.
        id: u64,
    },
    /// The reply to a [`Envelope::Request`] with the same `id`.
    ///
    /// At most one of `result`/`error` is meaningfully present. Both absent
    /// means the call succeeded with no return value.
    Response {
        /// Correlation id copied from the request.
        id: u64,
        /// The handler's return value on success.
        result: Option<Value>,
        /// The handler's failure value, relayed verbatim.
        error: Option<Value>,
    },
}

impl Envelope {
    /// Creates a notification envelope.
    #[must_use]
    pub fn notification(name: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Notification {
            name: name.into(),
            params,
        }
    }

    /// Creates a request envelope with the given correlation id.
    #[must_use]
    pub fn request(name: impl Into<String>, params: Vec<Value>, id: u64) -> Self {
        Self::Request {
            name: name.into(),
            params,
            id,
        }
    }

    /// Creates a successful response envelope.
    #[must_use]
    pub fn response_ok(id: u64, result: Value) -> Self {
        Self::Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates a failed response envelope carrying the failure value verbatim.
    #[must_use]
    pub fn response_err(id: u64, error: Value) -> Self {
        Self::Response {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Returns the request or notification name, if this envelope has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Notification { name, .. } | Self::Request { name, .. } => Some(name),
            Self::Response { .. } => None,
        }
    }

    /// Returns the correlation id, if this envelope carries one.
    #[must_use]
    pub const fn id(&self) -> Option<u64> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } => Some(*id),
            Self::Notification { .. } => None,
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notification { name, params } => {
                write!(f, "Notification({}, {} params)", name, params.len())
            }
            Self::Request { name, params, id } => {
                write!(f, "Request(#{}, {}, {} params)", id, name, params.len())
            }
            Self::Response { id, error, .. } => {
                if error.is_some() {
                    write!(f, "Response(#{}, error)", id)
                } else {
                    write!(f, "Response(#{}, ok)", id)
                }
            }
        }
    }
}

/// Flattened wire representation: the integer discriminant plus every field
/// any of the three shapes may carry.
#[derive(Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = match self.clone() {
            Self::Notification { name, params } => RawEnvelope {
                kind: KIND_NOTIFICATION,
                name: Some(name),
                params: Some(params),
                id: None,
                result: None,
                error: None,
            },
            Self::Request { name, params, id } => RawEnvelope {
                kind: KIND_REQUEST,
                name: Some(name),
                params: Some(params),
                id: Some(id),
                result: None,
                error: None,
            },
            Self::Response { id, result, error } => RawEnvelope {
                kind: KIND_RESPONSE,
                name: None,
                params: None,
                id: Some(id),
                result,
                error,
            },
        };
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let raw = RawEnvelope::deserialize(deserializer)?;
        match raw.kind {
            KIND_NOTIFICATION => Ok(Self::Notification {
                name: raw
                    .name
                    .ok_or_else(|| D::Error::custom("notification without name"))?,
                params: raw.params.unwrap_or_default(),
            }),
            KIND_REQUEST => Ok(Self::Request {
                name: raw
                    .name
                    .ok_or_else(|| D::Error::custom("request without name"))?,
                params: raw.params.unwrap_or_default(),
                id: raw
                    .id
                    .ok_or_else(|| D::Error::custom("request without id"))?,
            }),
            KIND_RESPONSE => Ok(Self::Response {
                id: raw
                    .id
                    .ok_or_else(|| D::Error::custom("response without id"))?,
                result: raw.result,
                error: raw.error,
            }),
            other => Err(D::Error::custom(format!(
                "unknown envelope discriminant {}",
                other
            ))),
        }
    }
}
