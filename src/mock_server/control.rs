use crate::mock::MockId;
use crate::request::BodyPrintLimit;
use crate::verification::{reconcile, InvocationReport, VerificationOutcome};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// The lifecycle of a set of stand-in servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Unstarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// The lifecycle state, shared between the serving thread and the [`ControlHandle`].
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<Mutex<ServerState>>);

impl SharedState {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(ServerState::Unstarted)))
    }

    pub(crate) fn set(&self, state: ServerState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub(crate) fn get(&self) -> ServerState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The handle to running stand-in servers, returned by
/// [`MockServerBuilder::serve`](crate::MockServerBuilder::serve).
///
/// Every request the servers receive is captured as an [`InvocationReport`]. Call
/// [`analyse`](Self::analyse) once the application under test is done to stop the servers and
/// get the reports back, including one synthesized report for every enabled mock that was
/// never called.
///
/// Dropping the handle stops the servers without waiting for them, and discards the reports.
pub struct ControlHandle {
    stop: Option<oneshot::Sender<()>>,
    stopped: Option<oneshot::Receiver<Vec<InvocationReport>>>,
    reports: Vec<InvocationReport>,
    state: SharedState,
    addresses: BTreeMap<u16, SocketAddr>,
    tls_ports: BTreeSet<u16>,
    expected: Vec<(MockId, String)>,
    body_print_limit: BodyPrintLimit,
}

impl ControlHandle {
    pub(crate) fn new(
        stop: oneshot::Sender<()>,
        stopped: oneshot::Receiver<Vec<InvocationReport>>,
        state: SharedState,
        addresses: BTreeMap<u16, SocketAddr>,
        tls_ports: BTreeSet<u16>,
        expected: Vec<(MockId, String)>,
        body_print_limit: BodyPrintLimit,
    ) -> Self {
        Self {
            stop: Some(stop),
            stopped: Some(stopped),
            reports: Vec::new(),
            state,
            addresses,
            tls_ports,
            expected,
            body_print_limit,
        }
    }

    /// Stop every server and wait until they have shut down.
    ///
    /// In-flight requests get the grace period configured on the builder to complete. Calling
    /// `stop` again is a no-op.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            debug!("Stopping the stand-in servers.");
            let _ = stop.send(());
        }
        if let Some(stopped) = self.stopped.take() {
            match stopped.await {
                Ok(reports) => self.reports = reports,
                Err(_) => warn!("The serving thread exited without handing back its reports."),
            }
        }
    }

    /// Stop the servers and reconcile what they received with what was expected.
    ///
    /// Returns every captured report in completion order, so a delayed response is reported
    /// once it has been sent. They are followed by one error report
    /// (`mock <name> was not called`) per enabled mock that received no request.
    pub async fn analyse(mut self) -> Vec<InvocationReport> {
        self.stop().await;
        let reports = std::mem::take(&mut self.reports);
        reconcile(reports, &self.expected)
    }

    /// Like [`analyse`](Self::analyse), but panics with a summary of every report that did not
    /// pass.
    ///
    /// Request and response bodies in the summary are truncated according to the body print
    /// limit of the builder.
    pub async fn verify(self) {
        let body_print_limit = self.body_print_limit;
        let reports = self.analyse().await;
        let outcome = VerificationOutcome::from_reports(&reports);
        if !outcome.is_success() {
            panic!("{}", outcome.error_message(body_print_limit));
        }
    }

    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    /// The addresses each port's listener is bound to, keyed by the port declared in the mocks.
    ///
    /// A port declared as `0` is bound to a free port chosen by the OS.
    pub fn addresses(&self) -> &BTreeMap<u16, SocketAddr> {
        &self.addresses
    }

    pub fn address(&self, port: u16) -> Option<&SocketAddr> {
        self.addresses.get(&port)
    }

    /// The base uri of the listener serving `port`, e.g. `https://127.0.0.1:8443`.
    pub fn uri(&self, port: u16) -> Option<String> {
        let scheme = if self.tls_ports.contains(&port) {
            "https"
        } else {
            "http"
        };
        self.address(port)
            .map(|address| format!("{}://{}", scheme, address))
    }
}

impl Drop for ControlHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            debug!("Stand-in servers dropped without being analysed: stopping them.");
            let _ = stop.send(());
        }
    }
}
