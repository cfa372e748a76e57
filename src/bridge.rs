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

//! Proxy layer exposing request names as directly callable methods.
//!
//! A [`Bridge`] is thin sugar over a [`Connection`]: asking it for a name
//! yields a [`RemoteMethod`] that forwards its calls to
//! [`send_request`](Connection::send_request) under that name. Methods are
//! created lazily and cached; asking for the same name again yields the
//! same underlying instance, so a method can serve as a stable callback
//! reference and be compared by identity later.
//!
//! The reverse direction, registering an implementation's named handlers in
//! bulk, is [`Bridge::with_handlers`].
//!
//! # Example
//!
//! ```rust
//! use portlink::{Bridge, Connection, MemoryPort};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (left, right) = MemoryPort::pair();
//! let caller = Arc::new(Connection::new(Arc::new(left))?);
//! let callee = Connection::new(Arc::new(right))?;
//!
//! callee.on_request("greet", |params: Vec<Value>| async move {
//!     Ok(json!(format!("hello {}", params[0].as_str().unwrap_or("?"))))
//! })?;
//!
//! let bridge = Bridge::new(caller);
//! let greet = bridge.method("greet");
//! assert_eq!(greet.call(vec![json!("world")]).await?, json!("hello world"));
//! assert!(greet.same_as(&bridge.method("greet")));
//! # Ok(())
//! # }
//! ```

use crate::connection::{Connection, HandlerResult, Registration};
use crate::error::ConnectionError;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Proxy over a [`Connection`] handing out named forwarding methods.
pub struct Bridge {
    connection: Arc<Connection>,
    methods: Mutex<HashMap<String, RemoteMethod>>,
}

impl Bridge {
    /// Wraps a connection in a call-forwarding proxy.
    #[must_use]
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            methods: Mutex::new(HashMap::new()),
        }
    }

    /// Wraps a connection and registers every named handler of an
    /// implementation as a request responder.
    ///
    /// The returned registrations revoke the handlers individually; dropping
    /// them leaves the handlers in place.
    ///
    /// # Errors
    ///
    /// Fails with [`ConnectionError::AlreadyRegistered`] on a duplicate name
    /// (handlers registered before the duplicate stay registered) and
    /// [`ConnectionError::Disposed`] on a disposed connection.
    pub fn with_handlers<I, F, Fut>(
        connection: Arc<Connection>,
        handlers: I,
    ) -> Result<(Self, Vec<Registration>), ConnectionError>
    where
        I: IntoIterator<Item = (String, F)>,
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let mut registrations = Vec::new();
        for (name, handler) in handlers {
            registrations.push(connection.on_request(name, handler)?);
        }
        Ok((Self::new(connection), registrations))
    }

    /// Returns the forwarding method for `name`.
    ///
    /// The first access creates and caches the method; every later access
    /// for the same name yields the identical instance
    /// ([`RemoteMethod::same_as`] holds between them).
    #[must_use]
    pub fn method(&self, name: &str) -> RemoteMethod {
        let mut methods = self.methods.lock();
        if let Some(method) = methods.get(name) {
            return method.clone();
        }
        let method = RemoteMethod {
            inner: Arc::new(MethodInner {
                name: name.to_string(),
                connection: Arc::clone(&self.connection),
            }),
        };
        methods.insert(name.to_string(), method.clone());
        method
    }

    /// The wrapped connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("cached_methods", &self.methods.lock().len())
            .finish_non_exhaustive()
    }
}

/// A callable handle forwarding to one request name on the peer.
///
/// Clones share identity with the instance they were cloned from.
#[derive(Clone)]
pub struct RemoteMethod {
    inner: Arc<MethodInner>,
}

struct MethodInner {
    name: String,
    connection: Arc<Connection>,
}

impl RemoteMethod {
    /// The request name this method forwards to, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Invokes the peer's handler for this method's name.
    ///
    /// # Errors
    ///
    /// Exactly the failures of [`Connection::send_request`].
    pub async fn call(&self, params: Vec<Value>) -> Result<Value, ConnectionError> {
        self.inner
            .connection
            .send_request(self.inner.name.as_str(), params)
            .await
    }

    /// Returns true when both handles are the same cached instance.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RemoteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMethod")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::boxed_handler;
    use crate::port::MemoryPort;
    use serde_json::json;

    fn bridge_pair() -> (Bridge, Connection) {
        let (left, right) = MemoryPort::pair();
        let caller = Arc::new(Connection::new(Arc::new(left)).unwrap());
        let callee = Connection::new(Arc::new(right)).unwrap();
        (Bridge::new(caller), callee)
    }

    #[tokio::test]
    async fn test_method_cache_is_referentially_stable() {
        let (bridge, _callee) = bridge_pair();

        let first = bridge.method("sum");
        let second = bridge.method("sum");
        let other = bridge.method("difference");

        assert!(first.same_as(&second));
        assert!(first.same_as(&first.clone()));
        assert!(!first.same_as(&other));
        assert_eq!(first.name(), "sum");
    }

    #[tokio::test]
    async fn test_method_forwards_to_send_request() {
        let (bridge, callee) = bridge_pair();
        callee
            .on_request("sum", |params: Vec<Value>| async move {
                let total: i64 = params.iter().filter_map(Value::as_i64).sum();
                Ok(json!(total))
            })
            .unwrap();

        let sum = bridge.method("sum");
        let result = sum.call(vec![json!(2), json!(3)]).await.unwrap();
        assert_eq!(result, json!(5));
    }

    #[tokio::test]
    async fn test_with_handlers_registers_every_name() {
        let (left, right) = MemoryPort::pair();
        let caller = Connection::new(Arc::new(left)).unwrap();
        let callee = Arc::new(Connection::new(Arc::new(right)).unwrap());

        let handlers = vec![
            (
                "double".to_string(),
                boxed_handler(|params: Vec<Value>| async move {
                    Ok(json!(params[0].as_i64().unwrap_or(0) * 2))
                }),
            ),
            (
                "negate".to_string(),
                boxed_handler(|params: Vec<Value>| async move {
                    Ok(json!(-params[0].as_i64().unwrap_or(0)))
                }),
            ),
        ];
        let (_bridge, registrations) = Bridge::with_handlers(callee, handlers).unwrap();
        assert_eq!(registrations.len(), 2);

        let doubled = caller.send_request("double", vec![json!(4)]).await.unwrap();
        assert_eq!(doubled, json!(8));
        let negated = caller.send_request("negate", vec![json!(4)]).await.unwrap();
        assert_eq!(negated, json!(-4));
    }

    #[tokio::test]
    async fn test_with_handlers_rejects_duplicate_names() {
        let (left, _right) = MemoryPort::pair();
        let connection = Arc::new(Connection::new(Arc::new(left)).unwrap());

        let handlers = vec![
            (
                "echo".to_string(),
                boxed_handler(|params: Vec<Value>| async move {
                    Ok(params.into_iter().next().unwrap_or(Value::Null))
                }),
            ),
            (
                "echo".to_string(),
                boxed_handler(|params: Vec<Value>| async move {
                    Ok(params.into_iter().next().unwrap_or(Value::Null))
                }),
            ),
        ];
        let result = Bridge::with_handlers(connection, handlers);
        assert!(matches!(
            result,
            Err(ConnectionError::AlreadyRegistered { ref name }) if name == "echo"
        ));
    }
}
