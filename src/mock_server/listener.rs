//! The accept loop of one server group and the handling of the requests it receives.
use crate::error::Error;
use crate::loader::ResourceLoader;
use crate::mock_server::group::Registered;
use crate::monitor::ReportSink;
use crate::render::{plain_response, render};
use crate::router::Router;
use crate::verification::{InvocationReport, ResponseSnapshot};
use crate::Request;
use chrono::Utc;
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use log::{debug, error, info, warn};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

/// Where a listener gets its socket from.
#[derive(Debug)]
pub(crate) enum Bind {
    Address(SocketAddr),
    /// Bound by the caller ahead of time.
    Prebound(std::net::TcpListener),
}

/// Everything the connections of one group share.
pub(crate) struct GroupContext {
    pub(crate) port: u16,
    pub(crate) router: Router,
    pub(crate) mocks: Arc<Vec<Registered>>,
    pub(crate) tls: Option<TlsAcceptor>,
    pub(crate) loader: Arc<dyn ResourceLoader>,
    pub(crate) sink: ReportSink,
}

impl GroupContext {
    fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }
}

/// Resolves once `true` has been published on the shutdown channel, or the channel is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn bind(bind: Bind) -> Result<(tokio::net::TcpListener, SocketAddr), Error> {
    let (listener, requested) = match bind {
        Bind::Address(addr) => {
            let listener =
                std::net::TcpListener::bind(addr).map_err(|source| Error::Bind { addr, source })?;
            (listener, addr)
        }
        Bind::Prebound(listener) => {
            let addr = listener
                .local_addr()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
            (listener, addr)
        }
    };
    listener
        .set_nonblocking(true)
        .and_then(|_| tokio::net::TcpListener::from_std(listener))
        .and_then(|listener| {
            let address = listener.local_addr()?;
            Ok((listener, address))
        })
        .map_err(|source| Error::Bind {
            addr: requested,
            source,
        })
}

/// Bind, report readiness, then accept connections until shutdown is requested.
///
/// Once shutdown is requested every open connection is asked to finish its in-flight requests;
/// connections still open after `grace` are aborted.
pub(crate) async fn run_listener(
    bind_to: Bind,
    context: Arc<GroupContext>,
    ready: oneshot::Sender<Result<SocketAddr, Error>>,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) {
    let (listener, address) = match bind(bind_to) {
        Ok(bound) => bound,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    info!("Listening on {}://{}", context.scheme(), address);
    let _ = ready.send(Ok(address));

    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {} on {}.", peer, address);
                    connections.spawn(serve_connection(stream, context.clone(), shutdown.clone()));
                }
                Err(e) => error!("Failed to accept a connection on {}: {}", address, e),
            },
            _ = shutdown_requested(&mut shutdown) => break,
        }
        while connections.try_join_next().is_some() {}
    }
    drop(listener);
    debug!(
        "Stopped accepting on {}, waiting for {} connection(s).",
        address,
        connections.len()
    );

    let drained = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            "{} connection(s) on {} did not finish within {:?} and were abandoned.",
            connections.len(),
            address,
            grace
        );
        connections.abort_all();
    }
    info!("Listener on {} stopped.", address);
}

async fn serve_connection(
    stream: TcpStream,
    context: Arc<GroupContext>,
    shutdown: watch::Receiver<bool>,
) {
    match context.tls.clone() {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(stream) => drive(TokioIo::new(stream), context, shutdown).await,
            Err(e) => debug!("TLS handshake failed on port {}: {}", context.port, e),
        },
        None => drive(TokioIo::new(stream), context, shutdown).await,
    }
}

async fn drive<I>(io: I, context: Arc<GroupContext>, mut shutdown: watch::Receiver<bool>)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service = service_fn(move |request| {
        let context = context.clone();
        async move { Ok::<_, Infallible>(handle(request, &context).await) }
    });
    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(io, service);
    tokio::pin!(connection);

    tokio::select! {
        served = connection.as_mut() => {
            if let Err(e) = served {
                debug!("Connection error: {}", e);
            }
        }
        _ = shutdown_requested(&mut shutdown) => {
            connection.as_mut().graceful_shutdown();
            if let Err(e) = connection.await {
                debug!("Connection error while shutting down: {}", e);
            }
        }
    }
}

/// Route, render and report one request. Never fails: problems become 4xx/5xx responses and
/// failing reports.
async fn handle(
    request: hyper::Request<Incoming>,
    context: &GroupContext,
) -> hyper::Response<Full<Bytes>> {
    let received_at = Utc::now();
    let request = match Request::from_hyper(request, context.scheme()).await {
        Ok(request) => request,
        Err(e) => {
            warn!("Could not capture a request on port {}: {}", context.port, e);
            context
                .sink
                .send(InvocationReport::unreadable(e.to_string(), received_at));
            return plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                HeaderMap::new(),
                e.to_string().into_bytes(),
            );
        }
    };

    let Some(hit) = context.router.lookup(&request.method, request.url.path()) else {
        debug!(
            "No mock matches {} {} on port {}.",
            request.method,
            request.url.path(),
            context.port
        );
        let snapshot = ResponseSnapshot {
            status: StatusCode::NOT_FOUND.as_u16(),
            headers: Vec::new(),
            body: Vec::new(),
        };
        context
            .sink
            .send(InvocationReport::not_found(request, snapshot, received_at));
        return plain_response(StatusCode::NOT_FOUND, HeaderMap::new(), Vec::new());
    };

    let mock = &context.mocks[hit.mock.0];
    debug!("{} {} routed to {}.", request.method, request.url, mock.name);
    let rendered = render(
        &mock.definition,
        hit.captures,
        &request,
        context.loader.as_ref(),
    )
    .await;

    if let Some(delay) = mock.definition.response.delay() {
        tokio::time::sleep(delay).await;
    }

    context.sink.send(InvocationReport::served(
        mock.id,
        mock.name.clone(),
        request,
        rendered.snapshot,
        rendered.checks,
        rendered.errors,
        received_at,
    ));
    rendered.response
}
