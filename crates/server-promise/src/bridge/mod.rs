//! The suspense bridge.
//!
//! [`use_server_promise`] returns a value synchronously when one is cached and
//! otherwise, on the server, hands back a [`PendingSignal`] the host awaits
//! before rendering the same call site again.
//!
//! Identifiers must be stable: the server render and the client render of the
//! same call site have to pass the same `id`, or the client finds nothing to
//! replay. This crate does not generate identifiers and cannot verify that
//! they match across renders. It does flag an identifier used twice within one
//! pass.

use futures::future::{BoxFuture, FutureExt, join_all};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, error, trace};

use crate::error::{Result, ServerPromiseError};
use crate::provider::ServerPromiseContext;

/// Settles once the operation behind it has completed and its value is in the
/// cache. A rejected operation leaves it pending forever.
///
/// Dropping a signal never cancels the operation. The context keeps it in
/// flight and hands out another signal for it on the next pass; with a
/// runtime configured it keeps running even if nothing polls it.
pub struct PendingSignal {
    future: BoxFuture<'static, ()>,
}

impl PendingSignal {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self { future: future.boxed() }
    }

    /// Settles when every signal has settled.
    pub fn join<I>(signals: I) -> Self
    where
        I: IntoIterator<Item = PendingSignal>,
    {
        let signals: Vec<PendingSignal> = signals.into_iter().collect();
        Self::new(async move {
            join_all(signals).await;
        })
    }
}

impl Future for PendingSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.future.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for PendingSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSignal").finish_non_exhaustive()
    }
}

#[must_use]
#[derive(Debug)]
pub enum Suspend<T> {
    Ready(T),
    Pending(PendingSignal),
}

impl<T> Suspend<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Suspend::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Suspend::Pending(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Suspend::Ready(value) => Some(value),
            Suspend::Pending(_) => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> Suspend<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Suspend::Ready(value) => Suspend::Ready(f(value)),
            Suspend::Pending(signal) => Suspend::Pending(signal),
        }
    }

    /// Combine sibling call sites. Ready only when every sibling is ready;
    /// otherwise one signal covering all pending siblings.
    pub fn all<I>(items: I) -> Suspend<Vec<T>>
    where
        I: IntoIterator<Item = Suspend<T>>,
    {
        let mut values = Vec::new();
        let mut pending = Vec::new();

        for item in items {
            match item {
                Suspend::Ready(value) => values.push(value),
                Suspend::Pending(signal) => pending.push(signal),
            }
        }

        if pending.is_empty() {
            Suspend::Ready(values)
        } else {
            Suspend::Pending(PendingSignal::join(pending))
        }
    }
}

/// Resolve `id` against the nearest provider's context.
///
/// Fails with [`ServerPromiseError::NoProvider`] when `context` is `None`.
pub fn use_server_promise<T, E, F, Fut>(
    context: Option<&ServerPromiseContext>,
    id: &str,
    produce: F,
) -> Result<Suspend<Option<T>>>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    E: Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
{
    let context = context.ok_or(ServerPromiseError::NoProvider)?;
    context.use_server_promise(id, produce)
}

impl ServerPromiseContext {
    pub fn use_server_promise<T, E, F, Fut>(
        &self,
        id: &str,
        produce: F,
    ) -> Result<Suspend<Option<T>>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        self.track_identifier(id);

        let cache = self.cache();

        if self.is_client() && !cache.has(id) {
            self.record_client_miss(id);
        }

        if self.is_server() && !cache.has(id) {
            if let Some(in_flight) = self.in_flight(id) {
                debug!("server promise {} already in flight", id);
                return Ok(Suspend::Pending(PendingSignal::new(in_flight)));
            }

            debug!("suspending on server promise {}", id);

            let operation = produce();
            let cache = Arc::clone(cache);
            let key = id.to_string();

            let resolve = async move {
                let Ok(value) = operation.await else {
                    return futures::future::pending::<()>().await;
                };

                match encode(&key, &value) {
                    Some(encoded) => {
                        debug!("server promise {} resolved", key);
                        cache.set(key, encoded);
                    }
                    None => futures::future::pending::<()>().await,
                }
            };

            let in_flight = self.start_in_flight(id, resolve.boxed());
            return Ok(Suspend::Pending(PendingSignal::new(in_flight)));
        }

        if cache.has(id) {
            self.settle_in_flight(id);
        }

        trace!("reading cached value for {}", id);
        cache.get_as(id).map(Suspend::Ready)
    }
}

/// Encode a resolved value for the cache. `None` when the value cannot be
/// stored or would not read back as `T`, e.g. a non-finite float that JSON
/// turns into `null`.
fn encode<T>(key: &str, value: &T) -> Option<Value>
where
    T: Serialize + DeserializeOwned,
{
    let encoded = match serde_json::to_value(value) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!("server promise {} resolved to an unserializable value: {}", key, e);
            return None;
        }
    };

    if let Err(e) = serde_json::from_value::<T>(encoded.clone()) {
        error!(
            "server promise {} resolved to a value that does not survive serialization: {}",
            key, e
        );
        return None;
    }

    Some(encoded)
}
