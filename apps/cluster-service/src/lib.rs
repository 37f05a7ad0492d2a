//! Instrument cluster rendering: the navigation client's proxy, the host that
//! serves it, and the glue that ties the host to displays and diagnostics.

pub mod app;
pub mod channel;
pub mod cli;
pub mod config;
pub mod debug;
pub mod error;
pub mod host;
pub mod input;
pub mod launcher;
pub mod listeners;
pub mod proxy;
pub mod renderer;
pub mod supervisor;
pub mod telemetry;

pub use channel::NavigationEventChannel;
pub use host::{BindIntent, Binding, ClusterRenderingHost, HostError, HostSnapshot, LifecycleState};
pub use proxy::{ClusterError, ConnectionHandle, LossReason, RemoteClusterProxy};
pub use renderer::NavigationRenderer;
pub use supervisor::ConnectionSupervisor;
