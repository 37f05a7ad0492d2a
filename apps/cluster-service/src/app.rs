use std::path::Path;
use std::sync::Arc;

use cluster_proto::{ActivityPlacementState, Bundle, BundleValue, Rect};
use cluster_transport::{CallHandler, ipc, local};
use tracing::info;

use crate::cli::{Cli, Command, SendEventArgs, ServeArgs, SetStateArgs};
use crate::config::ServiceConfig;
use crate::debug::{DebugCommand, DebugConsole, InMemoryOverlays};
use crate::error::CliError;
use crate::host::{BindIntent, Binding, ClusterRenderingHost, HostBinder, RendererFactory};
use crate::launcher::{DisplayId, LoggingLauncher};
use crate::proxy::{ActivityStateTarget, ConnectionHandle, RemoteClusterProxy};
use crate::renderer::{LoggingRenderer, NavigationRenderer};
use crate::supervisor::ConnectionSupervisor;

pub fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ServiceConfig::from_env();
    if let Some(socket) = cli.socket {
        config.socket = socket;
    }

    match cli.command {
        Command::Serve(args) => serve(&config, args),
        Command::Info => {
            let proxy = connect(&config.socket)?;
            println!("{}", proxy.get_instrument_cluster_info()?);
            Ok(())
        }
        Command::SendEvent(args) => send_event(&config.socket, args),
        Command::SetState(args) => set_state(&config.socket, args),
        Command::Debug(command) => run_debug(&config, command),
    }
}

/// Builds a host whose renderer logs everything and advertises `config`.
pub fn demo_host(config: &ServiceConfig) -> Arc<ClusterRenderingHost> {
    let advertised = config.cluster_config();
    let factory: RendererFactory = Box::new(move || {
        Box::new(LoggingRenderer::new(advertised.clone())) as Box<dyn NavigationRenderer>
    });
    ClusterRenderingHost::new(factory, Arc::new(LoggingLauncher))
}

fn serve(config: &ServiceConfig, args: ServeArgs) -> Result<(), CliError> {
    let host = demo_host(config);
    let supervisor = ConnectionSupervisor::new(Arc::clone(&host));
    let server = ipc::serve(&config.socket, Arc::new(HostBinder::new(Arc::clone(&host))))?;

    for display in args.displays {
        supervisor.on_display_added(DisplayId(display));
    }

    println!("cluster host listening on {}", server.path().display());
    ipc::wait_for_ctrl_c()?;

    info!(target = "cluster::app", "shutting down");
    host.on_destroy();
    drop(server);
    Ok(())
}

fn connect(socket: &Path) -> Result<RemoteClusterProxy, CliError> {
    let transport = ipc::connect(socket)?;
    Ok(RemoteClusterProxy::new(ConnectionHandle::new(Arc::new(transport))))
}

fn send_event(socket: &Path, args: SendEventArgs) -> Result<(), CliError> {
    let payload = args
        .fields
        .iter()
        .map(|field| parse_field(field))
        .collect::<Result<Bundle, _>>()?;
    let proxy = connect(socket)?;
    proxy.send_event(args.event_type, payload)?;
    Ok(())
}

fn set_state(socket: &Path, args: SetStateArgs) -> Result<(), CliError> {
    let area = Rect::new(args.left, args.top, args.right, args.bottom)
        .map_err(|err| CliError::InvalidArgument(err.to_string()))?;
    let state = ActivityPlacementState::create(!args.obscured, area);
    let proxy = connect(socket)?;
    proxy.set_activity_state(&args.category, state)?;
    Ok(())
}

fn run_debug(config: &ServiceConfig, command: DebugCommand) -> Result<(), CliError> {
    let host = demo_host(config);

    let Binding::Local(local_host) = host.on_bind(BindIntent::Local)? else {
        return Err(CliError::InvalidArgument("local binding unavailable".into()));
    };
    let _keys = local_host.register_key_listener(|event| {
        println!("key {:?} code={} scan={}", event.action, event.key_code, event.scan_code);
    });

    let handler: Arc<dyn CallHandler> = match host.on_bind(BindIntent::Renderer)? {
        Binding::Renderer(binding) => binding as Arc<dyn CallHandler>,
        Binding::Local(_) => {
            return Err(CliError::InvalidArgument("renderer binding unavailable".into()));
        }
    };
    let (transport, _link) = local::pair(handler)?;
    let proxy = RemoteClusterProxy::new(ConnectionHandle::new(Arc::new(transport)));

    let console = DebugConsole::new(
        Arc::clone(&host),
        Arc::new(InMemoryOverlays::default()),
        Arc::new(proxy) as Arc<dyn ActivityStateTarget>,
    );
    console.execute(command)?;

    println!("{}", serde_json::to_string_pretty(&host.snapshot())?);
    Ok(())
}

/// Parses `key=value`. The value becomes the narrowest of int, long, double
/// or bool it parses as, and a string otherwise.
pub fn parse_field(field: &str) -> Result<(String, BundleValue), CliError> {
    let (key, raw) = field
        .split_once('=')
        .ok_or_else(|| CliError::InvalidArgument(format!("expected KEY=VALUE, got '{field}'")))?;
    if key.is_empty() {
        return Err(CliError::InvalidArgument(format!("empty key in '{field}'")));
    }

    let value = if let Ok(value) = raw.parse::<i32>() {
        BundleValue::Int(value)
    } else if let Ok(value) = raw.parse::<i64>() {
        BundleValue::Long(value)
    } else if let Ok(value) = raw.parse::<f64>() {
        BundleValue::Double(value)
    } else if let Ok(value) = raw.parse::<bool>() {
        BundleValue::Bool(value)
    } else {
        BundleValue::String(raw.to_owned())
    };
    Ok((key.to_owned(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_values_take_the_narrowest_type() {
        let cases = [
            ("distance=250", BundleValue::Int(250)),
            ("eta=4102444800000", BundleValue::Long(4_102_444_800_000)),
            ("speed=13.5", BundleValue::Double(13.5)),
            ("muted=true", BundleValue::Bool(true)),
            ("road=A1 North", BundleValue::String("A1 North".into())),
            ("note=a=b", BundleValue::String("a=b".into())),
            ("blank=", BundleValue::String(String::new())),
        ];
        for (field, expected) in cases {
            let (_, value) = parse_field(field).expect(field);
            assert_eq!(value, expected, "{field}");
        }
    }

    #[test]
    fn malformed_fields_are_rejected() {
        assert!(matches!(parse_field("novalue"), Err(CliError::InvalidArgument(_))));
        assert!(matches!(parse_field("=5"), Err(CliError::InvalidArgument(_))));
    }

    #[test]
    fn demo_host_advertises_configured_cluster() {
        let config = ServiceConfig {
            min_interval_millis: 250,
            ..ServiceConfig::default()
        };
        let host = demo_host(&config);
        assert!(host.on_bind(BindIntent::Renderer).is_ok());
        assert_eq!(
            host.dispatch(cluster_proto::Call::GetClusterInfo),
            cluster_proto::Reply::ClusterInfo(cluster_proto::ClusterConfig::enum_only(250))
        );
    }
}
