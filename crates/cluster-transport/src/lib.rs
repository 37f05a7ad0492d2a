//! Call/reply transports between a navigation client and the cluster host.
//!
//! A [`Transport`] is the client half: it encodes a [`Call`], blocks until the
//! host answers, and decodes the [`Reply`]. The host half is a
//! [`CallHandler`], always invoked on a worker thread owned by the transport,
//! never on the caller's thread. Calls issued through one transport reach the
//! handler in the order they were issued.
//!
//! Failures come back as [`TransportError`], whose [`FailureKind`] tells the
//! caller whether the link is gone or a single message was bad.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cluster_proto::wire::{decode_call, decode_reply, encode_reply};
use cluster_proto::{Call, FailureCode, Reply, WireError};
use thiserror::Error;
use tracing::warn;

pub mod frame;
#[cfg(unix)]
pub mod ipc;
pub mod local;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(pub u64);

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_transport_id() -> TransportId {
    TransportId(NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Coarse classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The link to the host is unusable, or the host refused to serve.
    ConnectivityLost,
    /// One message could not be decoded; the link itself may still be fine.
    MalformedMessage,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport channel closed")]
    ChannelClosed,
    #[error("host refused the call: {0:?}")]
    Remote(FailureCode),
    #[error("malformed message: {0}")]
    Malformed(#[from] WireError),
    #[error("frame of {0} bytes exceeds the transport limit")]
    FrameTooLarge(usize),
    #[error("transport setup failed: {0}")]
    Setup(String),
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Malformed(_)
            | TransportError::FrameTooLarge(_)
            | TransportError::Remote(FailureCode::Malformed) => FailureKind::MalformedMessage,
            TransportError::ChannelClosed
            | TransportError::Remote(_)
            | TransportError::Setup(_) => FailureKind::ConnectivityLost,
        }
    }
}

pub trait Transport: Send + Sync {
    fn id(&self) -> TransportId;

    /// Whether the link is still believed to be up. A `true` here does not
    /// promise the next call succeeds.
    fn is_connected(&self) -> bool;

    /// Sends one call and blocks until the host replies or the link fails.
    ///
    /// A host-side refusal arrives as [`TransportError::Remote`]; the `Ok`
    /// value is never [`Reply::Failure`].
    fn call(&self, call: &Call) -> Result<Reply, TransportError>;
}

/// Host-side receiver of decoded calls.
pub trait CallHandler: Send + Sync {
    fn handle(&self, call: Call) -> Reply;
}

impl<F> CallHandler for F
where
    F: Fn(Call) -> Reply + Send + Sync,
{
    fn handle(&self, call: Call) -> Reply {
        self(call)
    }
}

/// Decides, per incoming connection, which handler serves it. Returning
/// `None` refuses the connection.
pub trait Acceptor: Send + Sync {
    fn accept(&self, peer: TransportId) -> Option<Arc<dyn CallHandler>>;
}

/// Decodes a call, runs it through `handler` and encodes the reply.
///
/// An undecodable call is dropped and answered with
/// [`FailureCode::Malformed`] so the caller does not wait forever.
pub fn dispatch_bytes(handler: &dyn CallHandler, bytes: &[u8]) -> Vec<u8> {
    let reply = match decode_call(bytes) {
        Ok(call) => handler.handle(call),
        Err(err) => {
            warn!(target = "cluster::transport", error = %err, "dropping malformed call");
            Reply::Failure(FailureCode::Malformed)
        }
    };
    encode_reply(&reply)
}

pub(crate) fn reply_from_bytes(bytes: &[u8]) -> Result<Reply, TransportError> {
    match decode_reply(bytes)? {
        Reply::Failure(code) => Err(TransportError::Remote(code)),
        reply => Ok(reply),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_proto::wire::encode_call;
    use cluster_proto::ClusterConfig;

    #[test]
    fn failure_kinds_split_link_loss_from_bad_messages() {
        assert_eq!(
            TransportError::ChannelClosed.kind(),
            FailureKind::ConnectivityLost
        );
        assert_eq!(
            TransportError::Remote(FailureCode::NotReady).kind(),
            FailureKind::ConnectivityLost
        );
        assert_eq!(
            TransportError::Remote(FailureCode::Destroyed).kind(),
            FailureKind::ConnectivityLost
        );
        assert_eq!(
            TransportError::Remote(FailureCode::Malformed).kind(),
            FailureKind::MalformedMessage
        );
        assert_eq!(
            TransportError::Malformed(WireError::UnexpectedEof).kind(),
            FailureKind::MalformedMessage
        );
    }

    #[test]
    fn dispatch_answers_garbage_with_malformed_failure() {
        let handler = |_call: Call| Reply::Ack;
        let reply = dispatch_bytes(&handler, &[0xde, 0xad]);
        assert!(matches!(
            reply_from_bytes(&reply),
            Err(TransportError::Remote(FailureCode::Malformed))
        ));
    }

    #[test]
    fn dispatch_runs_handler_for_valid_call() {
        let handler = |call: Call| match call {
            Call::GetClusterInfo => Reply::ClusterInfo(ClusterConfig::enum_only(1000)),
            _ => Reply::Ack,
        };
        let reply = dispatch_bytes(&handler, &encode_call(&Call::GetClusterInfo));
        assert_eq!(
            reply_from_bytes(&reply).expect("reply"),
            Reply::ClusterInfo(ClusterConfig::enum_only(1000))
        );
    }
}
