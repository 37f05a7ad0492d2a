use cluster_proto::{Bundle, Call, NavigationEvent, Reply};
use parking_lot::Mutex;
use tracing::trace;

use crate::proxy::{ClusterError, ConnectionHandle, unexpected_reply};

/// One-way push of navigation events to the host.
///
/// Pushes from any number of threads reach the host one at a time, in the
/// order they acquired the channel. There is no retry: a lost event is
/// superseded by the next one.
pub struct NavigationEventChannel {
    handle: ConnectionHandle,
    order: Mutex<()>,
}

impl NavigationEventChannel {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            order: Mutex::new(()),
        }
    }

    pub fn push(&self, event_type: i32, payload: Bundle) -> Result<(), ClusterError> {
        let call = Call::SendEvent(NavigationEvent::new(event_type, payload));
        let _order = self.order.lock();
        trace!(target = "cluster::channel", event_type, "pushing navigation event");
        match self.handle.call(&call)? {
            Reply::Ack => Ok(()),
            other => Err(unexpected_reply(&call, &other)),
        }
    }
}
