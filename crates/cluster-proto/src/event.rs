use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;

/// One navigation state change pushed from the client to the cluster.
///
/// `event_type` is defined by the navigation application; the protocol
/// carries it opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationEvent {
    pub event_type: i32,
    pub payload: Bundle,
}

impl NavigationEvent {
    pub fn new(event_type: i32, payload: Bundle) -> Self {
        Self {
            event_type,
            payload,
        }
    }
}
