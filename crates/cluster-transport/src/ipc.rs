//! Unix-domain-socket transport.
//!
//! Socket I/O runs on a process-wide Tokio runtime; the public API is
//! blocking so callers never need a runtime of their own. Do not call
//! [`connect`], [`serve`] or [`build_pair`] from inside another Tokio runtime.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;

use cluster_proto::wire::{encode_call, encode_reply};
use cluster_proto::{Call, FailureCode, Reply};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc as tokio_mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::frame::{encode_frame, read_frame};
use crate::{
    Acceptor, CallHandler, Transport, TransportError, TransportId, dispatch_bytes,
    next_transport_id, reply_from_bytes,
};

static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("cluster-ipc")
        .enable_all()
        .build()
        .expect("tokio runtime")
});

type Pending = Arc<Mutex<HashMap<u64, mpsc::Sender<Vec<u8>>>>>;

/// Client half of an IPC link.
pub struct IpcTransport {
    id: TransportId,
    next_call: AtomicU64,
    outbound_tx: tokio_mpsc::UnboundedSender<Vec<u8>>,
    pending: Pending,
    connected: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl IpcTransport {
    fn spawn<S>(id: TransportId, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let (outbound_tx, mut outbound_rx) = tokio_mpsc::unbounded_channel::<Vec<u8>>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let read_pending = Arc::clone(&pending);
        let read_connected = Arc::clone(&connected);
        let read_task = RUNTIME.spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some((call_id, payload))) => {
                        let waiter = read_pending.lock().remove(&call_id);
                        match waiter {
                            Some(waiter) => {
                                let _ = waiter.send(payload);
                            }
                            None => warn!(
                                target = "cluster::ipc",
                                %id,
                                call_id,
                                "reply for unknown call"
                            ),
                        }
                    }
                    Ok(None) => {
                        debug!(target = "cluster::ipc", %id, "host closed the connection");
                        break;
                    }
                    Err(err) => {
                        warn!(target = "cluster::ipc", %id, error = %err, "read failed");
                        break;
                    }
                }
            }
            mark_disconnected(&read_connected, &read_pending);
        });

        let write_pending = Arc::clone(&pending);
        let write_connected = Arc::clone(&connected);
        let write_task = RUNTIME.spawn(async move {
            while let Some(bytes) = outbound_rx.recv().await {
                let written = async {
                    writer.write_all(&bytes).await?;
                    writer.flush().await
                };
                if let Err(err) = written.await {
                    warn!(target = "cluster::ipc", %id, error = %err, "write failed");
                    break;
                }
            }
            mark_disconnected(&write_connected, &write_pending);
        });

        Self {
            id,
            next_call: AtomicU64::new(0),
            outbound_tx,
            pending,
            connected,
            tasks: vec![read_task, write_task],
        }
    }

    fn forget(&self, call_id: u64) {
        self.pending.lock().remove(&call_id);
    }
}

fn mark_disconnected(connected: &AtomicBool, pending: &Pending) {
    connected.store(false, Ordering::SeqCst);
    // Dropping the waiters wakes every blocked caller with a closed channel.
    pending.lock().clear();
}

impl Drop for IpcTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Transport for IpcTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn call(&self, call: &Call) -> Result<Reply, TransportError> {
        let call_id = self.next_call.fetch_add(1, Ordering::Relaxed);
        let frame = encode_frame(call_id, &encode_call(call))?;
        if !self.is_connected() {
            return Err(TransportError::ChannelClosed);
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        self.pending.lock().insert(call_id, reply_tx);
        // The reader may have cleared the table between the check above and
        // the insert; re-check so the waiter cannot be orphaned.
        if !self.is_connected() {
            self.forget(call_id);
            return Err(TransportError::ChannelClosed);
        }

        if self.outbound_tx.send(frame).is_err() {
            self.forget(call_id);
            return Err(TransportError::ChannelClosed);
        }

        let bytes = reply_rx.recv().map_err(|_| TransportError::ChannelClosed)?;
        reply_from_bytes(&bytes)
    }
}

/// Connects to a host listening on `path`.
pub fn connect(path: impl AsRef<Path>) -> Result<IpcTransport, TransportError> {
    let path = path.as_ref();
    let stream = RUNTIME
        .block_on(UnixStream::connect(path))
        .map_err(to_setup_error)?;
    let id = next_transport_id();
    debug!(target = "cluster::ipc", %id, path = %path.display(), "connected to host");
    Ok(IpcTransport::spawn(id, stream))
}

/// Host half of a single IPC connection. Dropping it closes the connection.
pub struct IpcConnection {
    peer: TransportId,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl IpcConnection {
    pub fn peer(&self) -> TransportId {
        self.peer
    }

    /// Closes the connection and waits for its task to finish.
    pub fn close(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = RUNTIME.block_on(task);
        }
    }
}

impl Drop for IpcConnection {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

pub struct IpcPair {
    pub client: IpcTransport,
    pub server: IpcConnection,
}

/// Connects a client transport directly to `handler` over a socket pair.
pub fn build_pair(handler: Arc<dyn CallHandler>) -> Result<IpcPair, TransportError> {
    let (client_stream, server_stream) = {
        let _guard = RUNTIME.enter();
        UnixStream::pair().map_err(to_setup_error)?
    };

    let client_id = next_transport_id();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = RUNTIME.spawn(serve_connection(server_stream, handler, client_id, shutdown_rx));

    Ok(IpcPair {
        client: IpcTransport::spawn(client_id, client_stream),
        server: IpcConnection {
            peer: client_id,
            shutdown,
            task: Some(task),
        },
    })
}

/// A listening host socket. Dropping it stops accepting, closes every open
/// connection and removes the socket file.
pub struct IpcServer {
    path: PathBuf,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl IpcServer {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.accept_task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Binds `path` and serves each accepted connection with the handler the
/// acceptor picks for it.
pub fn serve(path: impl AsRef<Path>, acceptor: Arc<dyn Acceptor>) -> Result<IpcServer, TransportError> {
    let path = path.as_ref().to_path_buf();

    // Remove a stale socket left by a previous run
    let _ = std::fs::remove_file(&path);

    let listener = {
        let _guard = RUNTIME.enter();
        UnixListener::bind(&path).map_err(to_setup_error)?
    };
    info!(target = "cluster::ipc", path = %path.display(), "host listening");

    let (shutdown, shutdown_rx) = watch::channel(false);
    let accept_task = RUNTIME.spawn(accept_loop(listener, acceptor, shutdown_rx));

    Ok(IpcServer {
        path,
        shutdown,
        accept_task,
    })
}

async fn accept_loop(
    listener: UnixListener,
    acceptor: Arc<dyn Acceptor>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, _addr)) => {
                let peer = next_transport_id();
                match acceptor.accept(peer) {
                    Some(handler) => {
                        debug!(target = "cluster::ipc", %peer, "client connected");
                        tokio::spawn(serve_connection(stream, handler, peer, shutdown.clone()));
                    }
                    None => {
                        info!(target = "cluster::ipc", %peer, "connection refused by host");
                        drop(stream);
                    }
                }
            }
            Err(err) => {
                warn!(target = "cluster::ipc", error = %err, "failed to accept connection");
                break;
            }
        }
    }
}

async fn serve_connection<S>(
    stream: S,
    handler: Arc<dyn CallHandler>,
    peer: TransportId,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = read_frame(&mut reader) => frame,
        };
        let (call_id, payload) = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                warn!(target = "cluster::ipc", %peer, error = %err, "dropping connection on bad frame");
                break;
            }
        };

        // Handlers may block; keep them off the I/O threads. Awaiting each
        // call before reading the next keeps delivery in issue order.
        let handler = Arc::clone(&handler);
        let reply = match tokio::task::spawn_blocking(move || dispatch_bytes(handler.as_ref(), &payload)).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(target = "cluster::ipc", %peer, call_id, error = %err, "handler task failed");
                break;
            }
        };

        let frame = encode_frame(call_id, &reply).or_else(|err| {
            warn!(target = "cluster::ipc", %peer, call_id, error = %err, "reply does not fit in a frame");
            encode_frame(call_id, &encode_reply(&Reply::Failure(FailureCode::Malformed)))
        });
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!(target = "cluster::ipc", %peer, call_id, error = %err, "cannot frame failure reply");
                break;
            }
        };
        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };
        if let Err(err) = written.await {
            debug!(target = "cluster::ipc", %peer, error = %err, "client went away");
            break;
        }
    }
    debug!(target = "cluster::ipc", %peer, "connection closed");
}

/// Blocks the calling thread until the process receives Ctrl-C.
pub fn wait_for_ctrl_c() -> io::Result<()> {
    RUNTIME.block_on(tokio::signal::ctrl_c())
}

fn to_setup_error<E: std::fmt::Display>(err: E) -> TransportError {
    TransportError::Setup(err.to_string())
}
