//! Host side of the cluster protocol.
//!
//! A [`ClusterRenderingHost`] moves through `Unbound -> Bound -> Destroyed`.
//! The renderer is created the first time a client binds for it and reused
//! for every later binding. Once destroyed, the host refuses everything.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use cluster_proto::{ActivityPlacementState, Bundle, Call, ClusterConfig, FailureCode, Reply};
use cluster_transport::{Acceptor, CallHandler, TransportId};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::input::KeyEvent;
use crate::launcher::{DisplayId, SurfaceLauncher};
use crate::listeners::{ListenerHandle, ListenerRegistry};
use crate::renderer::NavigationRenderer;

pub type RendererFactory = Box<dyn Fn() -> Box<dyn NavigationRenderer> + Send + Sync>;
pub type KeyListener = dyn Fn(&KeyEvent) + Send + Sync;
pub type PlacementListener = dyn Fn(&str, &ActivityPlacementState) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("cluster host has no renderer yet")]
    NotReady,
    #[error("cluster host has been destroyed")]
    Destroyed,
}

impl HostError {
    fn failure_code(self) -> FailureCode {
        match self {
            HostError::NotReady => FailureCode::NotReady,
            HostError::Destroyed => FailureCode::Destroyed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Unbound,
    Bound,
    Destroyed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Unbound => "unbound",
            LifecycleState::Bound => "bound",
            LifecycleState::Destroyed => "destroyed",
        })
    }
}

/// What a binding request asks the host for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindIntent {
    /// An in-process component wants the host itself, e.g. to observe keys.
    Local,
    /// A navigation client wants the renderer.
    Renderer,
}

pub enum Binding {
    Local(Arc<ClusterRenderingHost>),
    Renderer(Arc<RendererBinding>),
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Local(_) => f.write_str("Binding::Local"),
            Binding::Renderer(_) => f.write_str("Binding::Renderer"),
        }
    }
}

enum Lifecycle {
    Unbound,
    Bound(Arc<RendererBinding>),
    Destroyed,
}

impl Lifecycle {
    fn state(&self) -> LifecycleState {
        match self {
            Lifecycle::Unbound => LifecycleState::Unbound,
            Lifecycle::Bound(_) => LifecycleState::Bound,
            Lifecycle::Destroyed => LifecycleState::Destroyed,
        }
    }
}

/// Point-in-time view of a host, for dumps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostSnapshot {
    pub lifecycle: LifecycleState,
    pub displays: Vec<DisplayId>,
    pub key_listeners: usize,
    pub placement_listeners: usize,
    pub events_dispatched: u64,
    pub placements: BTreeMap<String, ActivityPlacementState>,
}

pub struct ClusterRenderingHost {
    lifecycle: RwLock<Lifecycle>,
    renderer_factory: RendererFactory,
    launcher: Arc<dyn SurfaceLauncher>,
    key_listeners: ListenerRegistry<KeyListener>,
    placement_listeners: ListenerRegistry<PlacementListener>,
    displays: Mutex<BTreeSet<DisplayId>>,
    placements: Mutex<BTreeMap<String, ActivityPlacementState>>,
    events_dispatched: AtomicU64,
}

impl ClusterRenderingHost {
    pub fn new(renderer_factory: RendererFactory, launcher: Arc<dyn SurfaceLauncher>) -> Arc<Self> {
        Arc::new(Self {
            lifecycle: RwLock::new(Lifecycle::Unbound),
            renderer_factory,
            launcher,
            key_listeners: ListenerRegistry::new(),
            placement_listeners: ListenerRegistry::new(),
            displays: Mutex::new(BTreeSet::new()),
            placements: Mutex::new(BTreeMap::new()),
            events_dispatched: AtomicU64::new(0),
        })
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle.read().state()
    }

    /// Answers a binding request. The first `Renderer` request creates the
    /// renderer; later ones share it.
    pub fn on_bind(self: &Arc<Self>, intent: BindIntent) -> Result<Binding, HostError> {
        info!(target = "cluster::host", ?intent, "bind requested");
        match intent {
            BindIntent::Local => {
                if self.lifecycle() == LifecycleState::Destroyed {
                    return Err(HostError::Destroyed);
                }
                Ok(Binding::Local(Arc::clone(self)))
            }
            BindIntent::Renderer => self.renderer_binding().map(Binding::Renderer),
        }
    }

    fn renderer_binding(self: &Arc<Self>) -> Result<Arc<RendererBinding>, HostError> {
        if let Lifecycle::Bound(binding) = &*self.lifecycle.read() {
            return Ok(Arc::clone(binding));
        }

        let mut lifecycle = self.lifecycle.write();
        match &*lifecycle {
            Lifecycle::Bound(binding) => Ok(Arc::clone(binding)),
            Lifecycle::Destroyed => Err(HostError::Destroyed),
            Lifecycle::Unbound => {
                let renderer = (self.renderer_factory)();
                let binding = Arc::new(RendererBinding {
                    host: Arc::downgrade(self),
                    renderer,
                });
                *lifecycle = Lifecycle::Bound(Arc::clone(&binding));
                info!(target = "cluster::host", "navigation renderer created");
                Ok(binding)
            }
        }
    }

    /// Serves one decoded call against the current lifecycle state.
    pub fn dispatch(&self, call: Call) -> Reply {
        let binding = match &*self.lifecycle.read() {
            Lifecycle::Bound(binding) => Arc::clone(binding),
            Lifecycle::Unbound => return refuse(&call, HostError::NotReady),
            Lifecycle::Destroyed => return refuse(&call, HostError::Destroyed),
        };
        // The lock is released here so a slow renderer cannot stall teardown.
        binding.serve(self, call)
    }

    /// Tears the host down, dropping the renderer, every listener and all
    /// recorded display and placement state. Idempotent.
    pub fn on_destroy(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.write(), Lifecycle::Destroyed);
        if previous.state() == LifecycleState::Destroyed {
            return;
        }
        let listeners = self.key_listeners.clear() + self.placement_listeners.clear();
        let displays = std::mem::take(&mut *self.displays.lock()).len();
        self.placements.lock().clear();
        warn!(
            target = "cluster::host",
            from = %previous.state(),
            listeners,
            displays,
            "cluster host destroyed"
        );
    }

    /// Forwards a physical key event to every registered key listener.
    pub fn on_key_event(&self, event: &KeyEvent) {
        if self.lifecycle() == LifecycleState::Destroyed {
            debug!(target = "cluster::host", key_code = event.key_code, "key event after destroy ignored");
            return;
        }
        let notified = self.key_listeners.notify(|listener| listener(event));
        info!(
            target = "cluster::host",
            key_code = event.key_code,
            action = ?event.action,
            listeners = notified,
            "key event"
        );
    }

    #[must_use = "dropping the handle deregisters the listener"]
    pub fn register_key_listener(
        &self,
        listener: impl Fn(&KeyEvent) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.key_listeners.register(Arc::new(listener))
    }

    #[must_use = "dropping the handle deregisters the listener"]
    pub fn register_placement_listener(
        &self,
        listener: impl Fn(&str, &ActivityPlacementState) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.placement_listeners.register(Arc::new(listener))
    }

    /// Launches the rendering surface on a newly attached display. A display
    /// that is already attached is not launched again.
    pub fn on_display_attached(&self, display_id: DisplayId) {
        if self.lifecycle() == LifecycleState::Destroyed {
            debug!(target = "cluster::host", display = display_id.0, "display attach after destroy ignored");
            return;
        }
        if !self.displays.lock().insert(display_id) {
            debug!(target = "cluster::host", display = display_id.0, "display already attached");
            return;
        }
        info!(target = "cluster::host", display = display_id.0, "cluster display attached");
        self.launcher.launch_surface(display_id);
    }

    pub fn on_display_detached(&self, display_id: DisplayId) {
        if self.displays.lock().remove(&display_id) {
            warn!(target = "cluster::host", display = display_id.0, "cluster display removed");
        }
    }

    /// Last placement reported for `category`.
    pub fn placement(&self, category: &str) -> Option<ActivityPlacementState> {
        self.placements.lock().get(category).copied()
    }

    pub fn snapshot(&self) -> HostSnapshot {
        HostSnapshot {
            lifecycle: self.lifecycle(),
            displays: self.displays.lock().iter().copied().collect(),
            key_listeners: self.key_listeners.len(),
            placement_listeners: self.placement_listeners.len(),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            placements: self.placements.lock().clone(),
        }
    }

    fn record_placement(&self, category: &str, state: ActivityPlacementState) {
        info!(
            target = "cluster::host",
            category,
            unobscured = state.is_unobscured(),
            area = ?state.visible_area(),
            "activity state"
        );
        self.placements.lock().insert(category.to_owned(), state);
        self.placement_listeners
            .notify(|listener| listener(category, &state));
    }
}

impl CallHandler for ClusterRenderingHost {
    fn handle(&self, call: Call) -> Reply {
        self.dispatch(call)
    }
}

fn refuse(call: &Call, err: HostError) -> Reply {
    debug!(target = "cluster::host", call = call.name(), error = %err, "refusing call");
    Reply::Failure(err.failure_code())
}

/// The renderer capability handed to bound clients.
pub struct RendererBinding {
    host: Weak<ClusterRenderingHost>,
    renderer: Box<dyn NavigationRenderer>,
}

impl RendererBinding {
    /// The renderer's advertised cluster configuration.
    pub fn navigation_properties(&self) -> Result<ClusterConfig, HostError> {
        self.live_host()?;
        Ok(self.renderer.navigation_properties())
    }

    /// Hands one event to the renderer. Renderer failures are logged and
    /// swallowed; only a destroyed host is reported.
    pub fn on_event(&self, event_type: i32, payload: &Bundle) -> Result<(), HostError> {
        let host = self.live_host()?;
        self.deliver(event_type, payload);
        host.events_dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn live_host(&self) -> Result<Arc<ClusterRenderingHost>, HostError> {
        match self.host.upgrade() {
            Some(host) if host.lifecycle() == LifecycleState::Bound => Ok(host),
            _ => Err(HostError::Destroyed),
        }
    }

    fn serve(&self, host: &ClusterRenderingHost, call: Call) -> Reply {
        match call {
            Call::GetClusterInfo => Reply::ClusterInfo(self.renderer.navigation_properties()),
            Call::SendEvent(event) => {
                self.deliver(event.event_type, &event.payload);
                host.events_dispatched.fetch_add(1, Ordering::Relaxed);
                Reply::Ack
            }
            Call::SetActivityState { category, state } => {
                host.record_placement(&category, state);
                Reply::Ack
            }
        }
    }

    fn deliver(&self, event_type: i32, payload: &Bundle) {
        trace!(target = "cluster::host", event_type, "dispatching event");
        let outcome = catch_unwind(AssertUnwindSafe(|| self.renderer.on_event(event_type, payload)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                target = "cluster::host",
                event_type,
                error = %err,
                "renderer failed to handle event"
            ),
            Err(_) => warn!(
                target = "cluster::host",
                event_type,
                "renderer panicked while handling event"
            ),
        }
    }
}

impl CallHandler for RendererBinding {
    fn handle(&self, call: Call) -> Reply {
        match self.host.upgrade() {
            Some(host) => host.dispatch(call),
            None => refuse(&call, HostError::Destroyed),
        }
    }
}

/// Binds every incoming connection to the host's renderer.
pub struct HostBinder {
    host: Arc<ClusterRenderingHost>,
}

impl HostBinder {
    pub fn new(host: Arc<ClusterRenderingHost>) -> Self {
        Self { host }
    }
}

impl Acceptor for HostBinder {
    fn accept(&self, peer: TransportId) -> Option<Arc<dyn CallHandler>> {
        match self.host.on_bind(BindIntent::Renderer) {
            Ok(Binding::Renderer(binding)) => Some(binding as Arc<dyn CallHandler>),
            Ok(Binding::Local(_)) => None,
            Err(err) => {
                info!(target = "cluster::host", %peer, error = %err, "refusing connection");
                None
            }
        }
    }
}
