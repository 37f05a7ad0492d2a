//! Shared protocol definitions for navigation client ↔ cluster host communication.
//!
//! Every value here is plain data. Nothing is shared across the process
//! boundary by reference: the sender encodes, the receiver decodes a fresh
//! value. Keeping this in a dedicated crate lets both the client proxy and the
//! rendering host depend on it without pulling in transport code.

pub mod bundle;
pub mod config;
pub mod error;
pub mod event;
pub mod placement;
pub mod rpc;
pub mod wire;

pub use bundle::{Bundle, BundleValue};
pub use config::{ClusterConfig, ClusterKind};
pub use error::InvalidConfiguration;
pub use event::NavigationEvent;
pub use placement::{ActivityPlacementState, Rect};
pub use rpc::{Call, FailureCode, Reply};
pub use wire::{PROTOCOL_VERSION, WireError};
