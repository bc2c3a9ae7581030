//! Starting and stopping the listeners of every server group.
//!
//! The listeners run on a dedicated thread owning a single-threaded Tokio runtime, so callers
//! can drive the [`ControlHandle`](crate::ControlHandle) from any async runtime.
use crate::error::Error;
use crate::loader::ResourceLoader;
use crate::mock_server::control::{ServerState, SharedState};
use crate::mock_server::group::{Registered, ServerGroup};
use crate::mock_server::listener::{run_listener, Bind, GroupContext};
use crate::monitor::spawn_collector;
use crate::verification::InvocationReport;
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// Everything needed to bring the groups up.
pub(crate) struct Launch {
    pub(crate) groups: Vec<(ServerGroup, Bind)>,
    pub(crate) mocks: Arc<Vec<Registered>>,
    pub(crate) tls: Option<TlsAcceptor>,
    pub(crate) loader: Arc<dyn ResourceLoader>,
    pub(crate) settle_window: Duration,
    pub(crate) grace_period: Duration,
}

/// The channels tying a [`ControlHandle`](crate::ControlHandle) to the serving thread.
pub(crate) struct Started {
    pub(crate) addresses: BTreeMap<u16, SocketAddr>,
    pub(crate) stop: oneshot::Sender<()>,
    pub(crate) stopped: oneshot::Receiver<Vec<InvocationReport>>,
}

type Startup = oneshot::Sender<Result<BTreeMap<u16, SocketAddr>, Error>>;

/// Spawn the serving thread and wait until its listeners are up, one of them failed, or the
/// settle window elapsed.
pub(crate) async fn launch(plan: Launch, state: SharedState) -> Result<Started, Error> {
    let (startup_tx, startup_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel();
    let (stopped_tx, stopped_rx) = oneshot::channel();

    state.set(ServerState::Starting);
    let thread_state = state.clone();
    let spawned = std::thread::Builder::new()
        .name("standin-server".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    thread_state.set(ServerState::Stopped);
                    let _ = startup_tx.send(Err(Error::ServingThread(e.to_string())));
                    return;
                }
            };
            runtime.block_on(serve(plan, thread_state, startup_tx, stop_rx, stopped_tx));
        });
    if let Err(e) = spawned {
        state.set(ServerState::Stopped);
        return Err(Error::ServingThread(e.to_string()));
    }

    match startup_rx.await {
        Ok(Ok(addresses)) => Ok(Started {
            addresses,
            stop: stop_tx,
            stopped: stopped_rx,
        }),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            state.set(ServerState::Stopped);
            Err(Error::ServingThread(
                "the serving thread exited during start-up".to_string(),
            ))
        }
    }
}

async fn serve(
    launch: Launch,
    state: SharedState,
    startup: Startup,
    stop: oneshot::Receiver<()>,
    stopped: oneshot::Sender<Vec<InvocationReport>>,
) {
    let (sink, collector) = spawn_collector();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut listeners = Vec::with_capacity(launch.groups.len());
    let mut readiness = Vec::with_capacity(launch.groups.len());
    for (group, bind) in launch.groups {
        let context = Arc::new(GroupContext {
            port: group.port,
            router: group.router,
            mocks: launch.mocks.clone(),
            tls: if group.tls { launch.tls.clone() } else { None },
            loader: launch.loader.clone(),
            sink: sink.clone(),
        });
        let (ready_tx, ready_rx) = oneshot::channel();
        listeners.push(tokio::spawn(run_listener(
            bind,
            context,
            ready_tx,
            shutdown_rx.clone(),
            launch.grace_period,
        )));
        readiness.push((group.port, ready_rx));
    }
    // From here on only the listeners hold producers.
    drop(sink);

    match await_readiness(readiness, launch.settle_window).await {
        Ok(addresses) => {
            state.set(ServerState::Running);
            let _ = startup.send(Ok(addresses));
        }
        Err(e) => {
            error!("Start-up failed, tearing down the listeners already started: {}", e);
            state.set(ServerState::Stopping);
            shutdown(shutdown_tx, listeners).await;
            let _ = collector.finish(Duration::ZERO).await;
            state.set(ServerState::Stopped);
            let _ = startup.send(Err(e));
            return;
        }
    }

    // Resolves on an explicit stop and when the handle is dropped.
    let _ = stop.await;

    state.set(ServerState::Stopping);
    info!("Stopping {} listener(s).", listeners.len());
    shutdown(shutdown_tx, listeners).await;
    let reports = collector.finish(launch.grace_period).await;
    info!("Stopped, {} request(s) captured.", reports.len());
    state.set(ServerState::Stopped);
    let _ = stopped.send(reports);
}

async fn shutdown(shutdown: watch::Sender<bool>, listeners: Vec<JoinHandle<()>>) {
    let _ = shutdown.send(true);
    for joined in join_all(listeners).await {
        if let Err(e) = joined {
            warn!("A listener task failed: {}", e);
        }
    }
}

/// Collect the ready signals of every listener, bounded by `settle_window`.
///
/// Listeners that have not answered when the window elapses are assumed to be coming up: the
/// start-up still succeeds, without their address.
async fn await_readiness(
    pending: Vec<(u16, oneshot::Receiver<Result<SocketAddr, Error>>)>,
    settle_window: Duration,
) -> Result<BTreeMap<u16, SocketAddr>, Error> {
    let mut addresses = BTreeMap::new();
    let mut pending = pending
        .into_iter()
        .map(|(port, ready)| async move { (port, ready.await) })
        .collect::<FuturesUnordered<_>>();
    let deadline = tokio::time::sleep(settle_window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            next = pending.next() => match next {
                None => return Ok(addresses),
                Some((port, Ok(Ok(address)))) => {
                    addresses.insert(port, address);
                }
                Some((_, Ok(Err(e)))) => return Err(e),
                Some((port, Err(_))) => {
                    return Err(Error::ServingThread(format!(
                        "the listener for port {} exited before binding",
                        port
                    )))
                }
            },
            _ = &mut deadline => {
                warn!(
                    "{} listener(s) did not report ready within {:?}: carrying on regardless.",
                    pending.len(),
                    settle_window
                );
                return Ok(addresses);
            }
        }
    }
}
