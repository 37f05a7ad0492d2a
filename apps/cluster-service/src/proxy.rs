//! Client side of the cluster protocol.
//!
//! Every operation blocks until the host answers. Whatever goes wrong on the
//! way (link down, host not ready, host torn down, garbled reply) reaches the
//! caller as [`ClusterError::ConnectivityLost`]; nothing is retried here.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cluster_proto::{ActivityPlacementState, Bundle, Call, ClusterConfig, FailureCode, Reply};
use cluster_transport::{FailureKind, Transport, TransportError, TransportId};
use thiserror::Error;
use tracing::{debug, warn};

use crate::channel::NavigationEventChannel;

/// Why connectivity was declared lost. Informational: callers treat every
/// reason as "cluster temporarily unavailable".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossReason {
    /// The link is down, revoked, or was never up.
    HostUnreachable,
    /// The host is alive but has no renderer yet.
    HostNotReady,
    /// The host has been torn down.
    HostDestroyed,
    /// The host answered with something that could not be understood.
    MalformedReply,
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LossReason::HostUnreachable => "host unreachable",
            LossReason::HostNotReady => "host not ready",
            LossReason::HostDestroyed => "host destroyed",
            LossReason::MalformedReply => "malformed reply",
        })
    }
}

impl From<&TransportError> for LossReason {
    fn from(err: &TransportError) -> Self {
        match err.kind() {
            FailureKind::MalformedMessage => LossReason::MalformedReply,
            FailureKind::ConnectivityLost => match err {
                TransportError::Remote(FailureCode::NotReady) => LossReason::HostNotReady,
                TransportError::Remote(FailureCode::Destroyed) => LossReason::HostDestroyed,
                _ => LossReason::HostUnreachable,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("instrument cluster connectivity lost: {reason}")]
    ConnectivityLost { reason: LossReason },
}

impl ClusterError {
    pub fn reason(&self) -> LossReason {
        match self {
            ClusterError::ConnectivityLost { reason } => *reason,
        }
    }
}

impl From<LossReason> for ClusterError {
    fn from(reason: LossReason) -> Self {
        ClusterError::ConnectivityLost { reason }
    }
}

/// Shared flag that invalidates every clone of a [`ConnectionHandle`].
#[derive(Debug, Clone)]
pub struct Revoker(Arc<AtomicBool>);

impl Revoker {
    pub fn revoke(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_revoked(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reference to the link to a rendering host.
///
/// Valid until the transport drops or the handle is revoked. A revoked
/// handle fails every call without touching the transport.
#[derive(Clone)]
pub struct ConnectionHandle {
    transport: Arc<dyn Transport>,
    revoker: Revoker,
}

impl ConnectionHandle {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            revoker: Revoker(Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn transport_id(&self) -> TransportId {
        self.transport.id()
    }

    pub fn is_valid(&self) -> bool {
        !self.revoker.is_revoked() && self.transport.is_connected()
    }

    pub fn revoke(&self) {
        if !self.revoker.is_revoked() {
            debug!(target = "cluster::proxy", transport = %self.transport.id(), "connection revoked");
        }
        self.revoker.revoke();
    }

    pub fn revoker(&self) -> Revoker {
        self.revoker.clone()
    }

    /// Issues one call, normalising every failure to [`ClusterError`].
    pub fn call(&self, call: &Call) -> Result<Reply, ClusterError> {
        if self.revoker.is_revoked() {
            return Err(LossReason::HostUnreachable.into());
        }
        self.transport.call(call).map_err(|err| {
            let reason = LossReason::from(&err);
            warn!(
                target = "cluster::proxy",
                transport = %self.transport.id(),
                call = call.name(),
                error = %err,
                %reason,
                "cluster call failed"
            );
            ClusterError::from(reason)
        })
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("transport", &self.transport.id())
            .field("revoked", &self.revoker.is_revoked())
            .finish()
    }
}

/// Anything that can accept an activity placement update.
pub trait ActivityStateTarget: Send + Sync {
    fn set_activity_state(
        &self,
        category: &str,
        state: ActivityPlacementState,
    ) -> Result<(), ClusterError>;
}

/// Navigation client's view of a remote rendering host.
pub struct RemoteClusterProxy {
    handle: ConnectionHandle,
    events: NavigationEventChannel,
}

impl RemoteClusterProxy {
    pub fn new(handle: ConnectionHandle) -> Self {
        let events = NavigationEventChannel::new(handle.clone());
        Self { handle, events }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_valid()
    }

    pub fn get_instrument_cluster_info(&self) -> Result<ClusterConfig, ClusterError> {
        match self.handle.call(&Call::GetClusterInfo)? {
            Reply::ClusterInfo(config) => Ok(config),
            other => Err(unexpected_reply(&Call::GetClusterInfo, &other)),
        }
    }

    /// Pushes one navigation event; returns once the host has taken it.
    pub fn send_event(&self, event_type: i32, payload: Bundle) -> Result<(), ClusterError> {
        self.events.push(event_type, payload)
    }

    pub fn event_channel(&self) -> &NavigationEventChannel {
        &self.events
    }
}

impl ActivityStateTarget for RemoteClusterProxy {
    fn set_activity_state(
        &self,
        category: &str,
        state: ActivityPlacementState,
    ) -> Result<(), ClusterError> {
        let call = Call::SetActivityState {
            category: category.to_owned(),
            state,
        };
        match self.handle.call(&call)? {
            Reply::Ack => Ok(()),
            other => Err(unexpected_reply(&call, &other)),
        }
    }
}

pub(crate) fn unexpected_reply(call: &Call, reply: &Reply) -> ClusterError {
    warn!(
        target = "cluster::proxy",
        call = call.name(),
        reply = ?reply,
        "host answered with the wrong reply type"
    );
    LossReason::MalformedReply.into()
}
