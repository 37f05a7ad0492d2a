//! In-process transport: calls are encoded, queued to a dedicated host worker
//! thread, decoded there and answered over a reply channel.
//!
//! Used when client and host share a process and by tests that need to cut
//! the link on demand via [`LocalLink::sever`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;

use cluster_proto::wire::encode_call;
use cluster_proto::{Call, Reply};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{CallHandler, Transport, TransportError, TransportId, next_transport_id, reply_from_bytes};

struct Envelope {
    call_id: u64,
    bytes: Vec<u8>,
    reply: mpsc::Sender<Vec<u8>>,
}

type Queue = Arc<Mutex<Option<mpsc::Sender<Envelope>>>>;

pub struct LocalTransport {
    id: TransportId,
    next_call: AtomicU64,
    queue: Queue,
    connected: Arc<AtomicBool>,
}

/// Host-side control of a [`LocalTransport`].
pub struct LocalLink {
    id: TransportId,
    queue: Queue,
    connected: Arc<AtomicBool>,
}

/// Starts a host worker thread serving `handler` and returns the client
/// transport plus the link controlling it.
pub fn pair(handler: Arc<dyn CallHandler>) -> Result<(LocalTransport, LocalLink), TransportError> {
    let id = next_transport_id();
    let (tx, rx) = mpsc::channel::<Envelope>();

    thread::Builder::new()
        .name(format!("cluster-host-{}", id.0))
        .spawn(move || {
            while let Ok(envelope) = rx.recv() {
                trace!(target = "cluster::local", call_id = envelope.call_id, "dispatching call");
                let reply = crate::dispatch_bytes(handler.as_ref(), &envelope.bytes);
                let _ = envelope.reply.send(reply);
            }
            debug!(target = "cluster::local", %id, "host worker stopped");
        })
        .map_err(|err| TransportError::Setup(err.to_string()))?;

    let queue: Queue = Arc::new(Mutex::new(Some(tx)));
    let connected = Arc::new(AtomicBool::new(true));
    let transport = LocalTransport {
        id,
        next_call: AtomicU64::new(0),
        queue: Arc::clone(&queue),
        connected: Arc::clone(&connected),
    };
    let link = LocalLink {
        id,
        queue,
        connected,
    };
    Ok((transport, link))
}

impl LocalLink {
    pub fn id(&self) -> TransportId {
        self.id
    }

    /// Cuts the link as if the host process died. Calls already queued are
    /// still answered; later calls fail with [`TransportError::ChannelClosed`].
    pub fn sever(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if self.queue.lock().take().is_some() {
            debug!(target = "cluster::local", id = %self.id, "link severed");
        }
    }
}

impl Drop for LocalLink {
    fn drop(&mut self) {
        self.sever();
    }
}

impl Transport for LocalTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn call(&self, call: &Call) -> Result<Reply, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ChannelClosed);
        }
        let sender = self
            .queue
            .lock()
            .clone()
            .ok_or(TransportError::ChannelClosed)?;

        let (reply_tx, reply_rx) = mpsc::channel();
        let envelope = Envelope {
            call_id: self.next_call.fetch_add(1, Ordering::Relaxed),
            bytes: encode_call(call),
            reply: reply_tx,
        };
        sender
            .send(envelope)
            .map_err(|_| TransportError::ChannelClosed)?;
        drop(sender);

        let bytes = reply_rx.recv().map_err(|_| TransportError::ChannelClosed)?;
        reply_from_bytes(&bytes)
    }
}
