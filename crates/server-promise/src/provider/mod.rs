//! Context record and suspension boundary.
//!
//! A [`ServerPromiseProvider`] owns one [`ServerPromiseContext`] and drives
//! render passes over it. Every bridge call beneath the provider receives the
//! same context by reference, so all of them share one [`Cache`].

mod diagnostics;

pub use diagnostics::Diagnostic;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::bridge::{PendingSignal, Suspend};
use crate::cache::Cache;
use crate::config::{Config, Mode};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub server: bool,
    pub client: bool,
    pub cache: Arc<Cache>,
    pub warn_on_miss: bool,
    /// Runtime that drives triggered operations. Without one, an operation
    /// only makes progress while one of its signals is polled.
    pub runtime: Option<Handle>,
}

impl ProviderOptions {
    pub fn new(mode: Mode, cache: Arc<Cache>) -> Self {
        Self {
            server: mode.server(),
            client: mode.client(),
            cache,
            warn_on_miss: true,
            runtime: None,
        }
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Use the runtime of the calling task, when there is one.
    pub fn with_current_runtime(mut self) -> Self {
        self.runtime = Handle::try_current().ok();
        self
    }

    pub fn server(cache: Arc<Cache>) -> Self {
        Self::new(Mode::Server, cache)
    }

    pub fn client(cache: Arc<Cache>) -> Self {
        Self::new(Mode::Client, cache)
    }

    pub fn cache_only(cache: Arc<Cache>) -> Self {
        Self::new(Mode::CacheOnly, cache)
    }

    pub fn from_config(config: &Config, cache: Arc<Cache>) -> Self {
        Self { warn_on_miss: config.warn_on_miss, ..Self::new(config.mode, cache) }
    }

    pub fn mode(&self) -> Mode {
        Mode::from_flags(self.server, self.client)
    }
}

pub(crate) type InFlight = Shared<BoxFuture<'static, ()>>;

#[derive(Debug, Default)]
struct PassState {
    pass: u64,
    identifiers: FxHashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

pub struct ServerPromiseContext {
    server: bool,
    client: bool,
    warn_on_miss: bool,
    cache: Arc<Cache>,
    runtime: Option<Handle>,
    state: Mutex<PassState>,
    in_flight: Mutex<FxHashMap<String, InFlight>>,
}

impl std::fmt::Debug for ServerPromiseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPromiseContext")
            .field("server", &self.server)
            .field("client", &self.client)
            .field("warn_on_miss", &self.warn_on_miss)
            .field("cache", &self.cache)
            .field("state", &self.state)
            .field("in_flight", &self.in_flight.lock().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ServerPromiseContext {
    pub fn new(options: ProviderOptions) -> Self {
        Self {
            server: options.server,
            client: options.client,
            warn_on_miss: options.warn_on_miss,
            cache: options.cache,
            runtime: options.runtime,
            state: Mutex::new(PassState::default()),
            in_flight: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn is_server(&self) -> bool {
        self.server
    }

    pub fn is_client(&self) -> bool {
        self.client
    }

    pub fn mode(&self) -> Mode {
        Mode::from_flags(self.server, self.client)
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn current_pass(&self) -> u64 {
        self.state.lock().pass
    }

    /// Start a new render pass. Identifiers from earlier passes may be reused.
    pub fn begin_pass(&self) -> u64 {
        let mut state = self.state.lock();
        state.pass += 1;
        state.identifiers.clear();
        state.pass
    }

    /// Everything recorded since the context was created or last drained.
    /// Diagnostics accumulate across passes; call [`Self::take_diagnostics`]
    /// to drain them on a long-lived context.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.state.lock().diagnostics.clone()
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.state.lock().diagnostics)
    }

    /// Operations triggered but not yet observed in the cache. A rejected
    /// operation stays here, so its identifier is never triggered again.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub(crate) fn in_flight(&self, id: &str) -> Option<InFlight> {
        self.in_flight.lock().get(id).cloned()
    }

    pub(crate) fn settle_in_flight(&self, id: &str) {
        self.in_flight.lock().remove(id);
    }

    /// Register a triggered operation. With a runtime the operation is spawned
    /// and runs to completion whether or not any signal is awaited.
    pub(crate) fn start_in_flight(&self, id: &str, operation: BoxFuture<'static, ()>) -> InFlight {
        let shared = operation.shared();
        if let Some(runtime) = &self.runtime {
            runtime.spawn(shared.clone());
        }
        self.in_flight.lock().insert(id.to_string(), shared.clone());
        shared
    }

    pub(crate) fn track_identifier(&self, id: &str) {
        let mut state = self.state.lock();
        if state.identifiers.insert(id.to_string()) {
            return;
        }

        let diagnostic = Diagnostic::DuplicateIdentifier { id: id.to_string(), pass: state.pass };
        warn!("use-server-promise: {}", diagnostic);
        state.diagnostics.push(diagnostic);
    }

    pub(crate) fn record_client_miss(&self, id: &str) {
        let diagnostic = Diagnostic::ClientMiss { id: id.to_string() };
        if self.warn_on_miss {
            warn!("use-server-promise: {}", diagnostic);
        }
        self.state.lock().diagnostics.push(diagnostic);
    }
}

/// Outcome of one render pass.
#[derive(Debug)]
pub enum Rendered<R> {
    Content(R),
    /// Something beneath the boundary suspended. The placeholder stands in
    /// for the content until the signal settles.
    Fallback(PendingSignal),
}

impl<R> Rendered<R> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Rendered::Fallback(_))
    }

    pub fn content(self) -> Option<R> {
        match self {
            Rendered::Content(content) => Some(content),
            Rendered::Fallback(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerPromiseProvider {
    context: Arc<ServerPromiseContext>,
}

impl ServerPromiseProvider {
    pub fn new(options: ProviderOptions) -> Self {
        Self { context: Arc::new(ServerPromiseContext::new(options)) }
    }

    pub fn context(&self) -> &ServerPromiseContext {
        &self.context
    }

    pub fn shared_context(&self) -> Arc<ServerPromiseContext> {
        Arc::clone(&self.context)
    }

    pub fn cache(&self) -> &Arc<Cache> {
        self.context.cache()
    }

    /// Render the subtree once.
    pub fn render_pass<R, F>(&self, render: F) -> Result<Rendered<R>>
    where
        F: FnOnce(&ServerPromiseContext) -> Result<Suspend<R>>,
    {
        let pass = self.context.begin_pass();

        match render(&self.context)? {
            Suspend::Ready(content) => {
                debug!("render pass {} complete", pass);
                Ok(Rendered::Content(content))
            }
            Suspend::Pending(signal) => {
                debug!("render pass {} suspended, rendering fallback", pass);
                Ok(Rendered::Fallback(signal))
            }
        }
    }

    /// Re-enter the subtree until nothing suspends. There is no retry limit
    /// and no timeout, so a signal that never settles keeps this pending.
    pub async fn render<R, F>(&self, mut render: F) -> Result<R>
    where
        F: FnMut(&ServerPromiseContext) -> Result<Suspend<R>>,
    {
        loop {
            match self.render_pass(&mut render)? {
                Rendered::Content(content) => return Ok(content),
                Rendered::Fallback(signal) => signal.await,
            }
        }
    }
}
