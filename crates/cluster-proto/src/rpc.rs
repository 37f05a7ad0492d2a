use crate::config::ClusterConfig;
use crate::event::NavigationEvent;
use crate::placement::ActivityPlacementState;

/// Requests a navigation client issues to the rendering host.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetClusterInfo,
    SendEvent(NavigationEvent),
    SetActivityState {
        category: String,
        state: ActivityPlacementState,
    },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::GetClusterInfo => "get_cluster_info",
            Call::SendEvent(_) => "send_event",
            Call::SetActivityState { .. } => "set_activity_state",
        }
    }
}

/// Host answers. Every call gets exactly one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    ClusterInfo(ClusterConfig),
    Ack,
    Failure(FailureCode),
}

/// Why the host refused a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCode {
    /// The host is alive but has no renderer registered yet.
    NotReady,
    /// The host has been torn down.
    Destroyed,
    /// The call could not be decoded.
    Malformed,
}

impl FailureCode {
    pub fn code(self) -> i32 {
        match self {
            FailureCode::NotReady => 1,
            FailureCode::Destroyed => 2,
            FailureCode::Malformed => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(FailureCode::NotReady),
            2 => Some(FailureCode::Destroyed),
            3 => Some(FailureCode::Malformed),
            _ => None,
        }
    }
}
