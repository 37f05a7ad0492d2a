use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cluster_proto::{
    ActivityPlacementState, Bundle, Call, ClusterConfig, ClusterKind, Rect, Reply,
};
use cluster_service::host::{HostBinder, RendererFactory};
use cluster_service::launcher::{DisplayId, SurfaceLauncher};
use cluster_service::proxy::ActivityStateTarget;
use cluster_service::{
    BindIntent, Binding, ClusterError, ClusterRenderingHost, ConnectionHandle,
    ConnectionSupervisor, LifecycleState, LossReason, NavigationRenderer, RemoteClusterProxy,
};
use cluster_transport::{CallHandler, ipc, local};
use parking_lot::Mutex;

/// Renderer that records every event it sees.
struct RecordingRenderer {
    config: ClusterConfig,
    events: Arc<Mutex<Vec<(i32, Bundle)>>>,
}

impl NavigationRenderer for RecordingRenderer {
    fn navigation_properties(&self) -> ClusterConfig {
        self.config.clone()
    }

    fn on_event(&self, event_type: i32, payload: &Bundle) -> anyhow::Result<()> {
        if event_type == i32::MIN {
            panic!("renderer blew up");
        }
        self.events.lock().push((event_type, payload.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingLauncher {
    launches: Mutex<Vec<DisplayId>>,
}

impl SurfaceLauncher for RecordingLauncher {
    fn launch_surface(&self, display: DisplayId) {
        self.launches.lock().push(display);
    }
}

struct Fixture {
    host: Arc<ClusterRenderingHost>,
    events: Arc<Mutex<Vec<(i32, Bundle)>>>,
    renderers_created: Arc<AtomicUsize>,
    launcher: Arc<RecordingLauncher>,
}

fn fixture(config: ClusterConfig) -> Fixture {
    let events = Arc::new(Mutex::new(Vec::new()));
    let renderers_created = Arc::new(AtomicUsize::new(0));
    let launcher = Arc::new(RecordingLauncher::default());

    let factory_events = Arc::clone(&events);
    let factory_count = Arc::clone(&renderers_created);
    let factory: RendererFactory = Box::new(move || {
        factory_count.fetch_add(1, Ordering::SeqCst);
        Box::new(RecordingRenderer {
            config: config.clone(),
            events: Arc::clone(&factory_events),
        }) as Box<dyn NavigationRenderer>
    });
    let host = ClusterRenderingHost::new(factory, Arc::clone(&launcher) as Arc<dyn SurfaceLauncher>);

    Fixture {
        host,
        events,
        renderers_created,
        launcher,
    }
}

/// Binds the host's renderer and connects a proxy to it in-process.
fn bound_proxy(host: &Arc<ClusterRenderingHost>) -> (RemoteClusterProxy, local::LocalLink) {
    let Ok(Binding::Renderer(binding)) = host.on_bind(BindIntent::Renderer) else {
        panic!("expected renderer binding");
    };
    let (transport, link) = local::pair(binding).expect("local pair");
    (RemoteClusterProxy::new(ConnectionHandle::new(Arc::new(transport))), link)
}

fn assert_lost(result: Result<impl std::fmt::Debug, ClusterError>, reason: LossReason) {
    match result {
        Err(ClusterError::ConnectivityLost { reason: actual }) => assert_eq!(actual, reason),
        other => panic!("expected connectivity loss ({reason}), got {other:?}"),
    }
}

fn placement() -> ActivityPlacementState {
    ActivityPlacementState::create(true, Rect::new(0, 0, 800, 480).expect("rect"))
}

#[test_timeout::timeout]
fn enum_only_cluster_reaches_client_intact() {
    let fixture = fixture(ClusterConfig::enum_only(1000));
    let (proxy, _link) = bound_proxy(&fixture.host);

    let config = proxy.get_instrument_cluster_info().expect("cluster info");
    assert_eq!(config.min_interval_millis(), 1000);
    assert_eq!(config.kind(), ClusterKind::EnumOnly);
    assert!(!config.supports_custom_images());
    assert_eq!(
        (config.image_width(), config.image_height(), config.image_color_depth_bits()),
        (0, 0, 0)
    );
}

#[test_timeout::timeout]
fn image_capable_cluster_reaches_client_intact() {
    let advertised = ClusterConfig::image_capable(500, 800, 480, 16)
        .expect("valid config")
        .with_extra(Bundle::new().with("vendor", "acme"));
    let fixture = fixture(advertised.clone());
    let (proxy, _link) = bound_proxy(&fixture.host);

    let config = proxy.get_instrument_cluster_info().expect("cluster info");
    assert_eq!(config, advertised);
    assert_eq!(config.image_width(), 800);
    assert_eq!(config.image_color_depth_bits(), 16);
    assert!(config.supports_custom_images());
}

#[test_timeout::timeout]
fn events_reach_renderer_in_issue_order() {
    let fixture = fixture(ClusterConfig::enum_only(1000));
    let (proxy, _link) = bound_proxy(&fixture.host);

    proxy
        .send_event(1, Bundle::new().with("maneuver", "turn-left"))
        .expect("e1");
    proxy
        .send_event(2, Bundle::new().with("distance", 120))
        .expect("e2");
    for event_type in 3..50 {
        proxy
            .event_channel()
            .push(event_type, Bundle::new())
            .expect("event");
    }

    let seen: Vec<i32> = fixture.events.lock().iter().map(|(t, _)| *t).collect();
    assert_eq!(seen, (1..50).collect::<Vec<_>>());
    assert_eq!(fixture.events.lock()[0].1.get("maneuver").and_then(|v| v.as_str()), Some("turn-left"));
}

#[test_timeout::timeout]
fn concurrent_pushes_are_each_delivered_once() {
    let fixture = fixture(ClusterConfig::enum_only(1000));
    let (proxy, _link) = bound_proxy(&fixture.host);
    let proxy = Arc::new(proxy);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let proxy = Arc::clone(&proxy);
            std::thread::spawn(move || {
                for i in 0..25 {
                    proxy.send_event(worker * 100 + i, Bundle::new()).expect("event");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker");
    }

    let events = fixture.events.lock();
    assert_eq!(events.len(), 100);
    for worker in 0..4 {
        let mine: Vec<i32> = events
            .iter()
            .map(|(t, _)| *t)
            .filter(|t| t / 100 == worker)
            .collect();
        assert_eq!(mine, (0..25).map(|i| worker * 100 + i).collect::<Vec<_>>());
    }
}

#[test_timeout::timeout]
fn severed_link_fails_every_operation_as_connectivity_lost() {
    let fixture = fixture(ClusterConfig::enum_only(1000));
    let (proxy, link) = bound_proxy(&fixture.host);
    assert!(proxy.is_connected());

    link.sever();
    assert!(!proxy.is_connected());
    assert_lost(proxy.get_instrument_cluster_info(), LossReason::HostUnreachable);
    assert_lost(proxy.send_event(1, Bundle::new()), LossReason::HostUnreachable);
    assert_lost(
        proxy.set_activity_state("navigation", placement()),
        LossReason::HostUnreachable,
    );
}

#[test_timeout::timeout]
fn unbound_host_reports_not_ready() {
    let fixture = fixture(ClusterConfig::enum_only(1000));
    let handler: Arc<dyn CallHandler> = fixture.host.clone();
    let (transport, _link) = local::pair(handler).expect("local pair");
    let proxy = RemoteClusterProxy::new(ConnectionHandle::new(Arc::new(transport)));

    assert_lost(proxy.get_instrument_cluster_info(), LossReason::HostNotReady);
    assert_lost(proxy.send_event(7, Bundle::new()), LossReason::HostNotReady);
    assert_eq!(fixture.renderers_created.load(Ordering::SeqCst), 0);
}

#[test_timeout::timeout]
fn calls_after_teardown_fail() {
    let fixture = fixture(ClusterConfig::enum_only(1000));
    let (proxy, _link) = bound_proxy(&fixture.host);
    proxy.send_event(1, Bundle::new()).expect("before teardown");

    fixture.host.on_destroy();
    assert_eq!(fixture.host.lifecycle(), LifecycleState::Destroyed);
    assert_lost(proxy.get_instrument_cluster_info(), LossReason::HostDestroyed);
    assert_lost(proxy.send_event(2, Bundle::new()), LossReason::HostDestroyed);
    assert_eq!(fixture.events.lock().len(), 1);
}

#[test_timeout::timeout]
fn wrong_reply_type_is_a_malformed_reply() {
    let confused: Arc<dyn CallHandler> = Arc::new(|_call: Call| Reply::Ack);
    let (transport, _link) = local::pair(confused).expect("local pair");
    let proxy = RemoteClusterProxy::new(ConnectionHandle::new(Arc::new(transport)));
    assert_lost(proxy.get_instrument_cluster_info(), LossReason::MalformedReply);
}

#[test_timeout::timeout]
fn renderer_panic_is_contained() {
    let fixture = fixture(ClusterConfig::enum_only(1000));
    let (proxy, _link) = bound_proxy(&fixture.host);

    proxy.send_event(i32::MIN, Bundle::new()).expect("acknowledged despite panic");
    proxy.send_event(5, Bundle::new()).expect("host still serving");
    assert_eq!(fixture.events.lock().len(), 1);
    assert_eq!(fixture.host.snapshot().events_dispatched, 2);
}

#[test_timeout::timeout]
fn supervisor_revocation_stops_tracked_proxies() {
    let fixture = fixture(ClusterConfig::enum_only(1000));
    let supervisor = ConnectionSupervisor::new(Arc::clone(&fixture.host));
    let (first, _first_link) = bound_proxy(&fixture.host);
    let (second, _second_link) = bound_proxy(&fixture.host);
    supervisor.track(first.handle());
    supervisor.track(second.handle());

    assert_eq!(supervisor.on_host_unreachable(), 2);
    assert_lost(first.get_instrument_cluster_info(), LossReason::HostUnreachable);
    assert_lost(second.send_event(1, Bundle::new()), LossReason::HostUnreachable);
    assert!(fixture.events.lock().is_empty());
    assert_eq!(fixture.renderers_created.load(Ordering::SeqCst), 1);
}

#[test_timeout::timeout]
fn display_notifications_are_deduplicated() {
    let fixture = fixture(ClusterConfig::enum_only(1000));
    let supervisor = ConnectionSupervisor::new(Arc::clone(&fixture.host));

    supervisor.on_display_added(DisplayId(5));
    supervisor.on_display_added(DisplayId(5));
    supervisor.on_display_removed(DisplayId(99));

    assert_eq!(*fixture.launcher.launches.lock(), vec![DisplayId(5)]);
    assert_eq!(fixture.host.snapshot().displays, vec![DisplayId(5)]);
}

#[test_timeout::timeout]
fn ipc_clients_share_one_lazily_created_renderer() {
    let fixture = fixture(ClusterConfig::enum_only(1000));
    let dir = tempfile::tempdir().expect("tempdir");
    let socket = dir.path().join("cluster.sock");
    let server = ipc::serve(&socket, Arc::new(HostBinder::new(Arc::clone(&fixture.host))))
        .expect("serve");
    assert_eq!(fixture.host.lifecycle(), LifecycleState::Unbound);

    let connect = || {
        let transport = ipc::connect(&socket).expect("connect");
        RemoteClusterProxy::new(ConnectionHandle::new(Arc::new(transport)))
    };
    let first = connect();
    let second = connect();

    assert_eq!(
        first.get_instrument_cluster_info().expect("info"),
        ClusterConfig::enum_only(1000)
    );
    second
        .send_event(4, Bundle::new().with("road", "A1"))
        .expect("event");
    first
        .set_activity_state("navigation", placement())
        .expect("state");

    assert_eq!(fixture.renderers_created.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.host.lifecycle(), LifecycleState::Bound);
    assert_eq!(fixture.host.placement("navigation"), Some(placement()));
    assert_eq!(fixture.events.lock().len(), 1);

    fixture.host.on_destroy();
    assert_lost(first.get_instrument_cluster_info(), LossReason::HostDestroyed);

    drop(server);
    assert!(second.send_event(5, Bundle::new()).is_err());
}
