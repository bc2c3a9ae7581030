use crate::error::Error;
use crate::loader::{FsLoader, ResourceLoader};
use crate::mock::MockDefinition;
use crate::mock_server::control::{ControlHandle, SharedState};
use crate::mock_server::group::{plan, Registered};
use crate::mock_server::listener::Bind;
use crate::mock_server::manager::{launch, Launch};
use crate::mock_server::tls::{acceptor, TlsMaterial};
use crate::request::{BodyPrintLimit, BODY_PRINT_LIMIT};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How long start-up waits for every listener to report ready.
pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_millis(500);
/// How long in-flight requests get to complete once a stop is requested.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

fn duration_from_env(var: &str) -> Option<Duration> {
    env::var(var)
        .ok()
        .and_then(|ms| ms.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// A builder providing a fluent API to assemble stand-in servers step-by-step.
/// Use [`MockServer::builder`](crate::MockServer::builder) to get started.
pub struct MockServerBuilder {
    mocks: Vec<MockDefinition>,
    listeners: HashMap<u16, TcpListener>,
    tls: Option<TlsMaterial>,
    bind_ip: IpAddr,
    settle_window: Duration,
    grace_period: Duration,
    body_print_limit: BodyPrintLimit,
    loader: Arc<dyn ResourceLoader>,
}

impl MockServerBuilder {
    pub(super) fn new() -> Self {
        let body_print_limit = match env::var("STANDIN_BODY_PRINT_LIMIT")
            .ok()
            .and_then(|x| x.parse::<usize>().ok())
        {
            Some(limit) => BodyPrintLimit::Limited(limit),
            None => BodyPrintLimit::Limited(BODY_PRINT_LIMIT),
        };
        Self {
            mocks: Vec::new(),
            listeners: HashMap::new(),
            tls: None,
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            settle_window: duration_from_env("STANDIN_SETTLE_WINDOW_MS")
                .unwrap_or(DEFAULT_SETTLE_WINDOW),
            grace_period: duration_from_env("STANDIN_GRACE_PERIOD_MS")
                .unwrap_or(DEFAULT_GRACE_PERIOD),
            body_print_limit,
            loader: Arc::new(FsLoader::default()),
        }
    }

    /// Register a [`MockDefinition`].
    ///
    /// Mocks are identified by their registration order: the first registered mock gets
    /// [`MockId(0)`](crate::MockId), the second `MockId(1)`, and so on.
    pub fn register(mut self, mock: MockDefinition) -> Self {
        self.mocks.push(mock);
        self
    }

    /// Register several [`MockDefinition`]s, e.g. the output of
    /// [`load_mocks`](crate::config::load_mocks).
    pub fn register_all(mut self, mocks: impl IntoIterator<Item = MockDefinition>) -> Self {
        self.mocks.extend(mocks);
        self
    }

    /// By default every group binds `<bind ip>:<port>` when the servers start.
    /// With `MockServerBuilder::listener` you can instead hand over a listener you have
    /// already bound for the mocks declaring `port`.
    ///
    /// ### Example:
    /// ```rust,no_run
    /// use standin::{MockDefinition, MockServer, ResponseTemplate};
    ///
    /// # async fn run() -> Result<(), standin::Error> {
    /// let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    /// let port = listener.local_addr().unwrap().port();
    ///
    /// let server = MockServer::builder()
    ///     .listener(port, listener)
    ///     .register(
    ///         MockDefinition::given("GET", format!("http://127.0.0.1:{}/health", port))
    ///             .respond_with(ResponseTemplate::new(200)),
    ///     )
    ///     .serve()
    ///     .await?;
    ///
    /// assert_eq!(server.address(port).unwrap().port(), port);
    /// # Ok(())
    /// # }
    /// ```
    pub fn listener(mut self, port: u16, listener: TcpListener) -> Self {
        self.listeners.insert(port, listener);
        self
    }

    /// The certificate chain and private key every https group presents, as PEM.
    pub fn tls_pem(mut self, cert_chain: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        self.tls = Some(TlsMaterial::Pem {
            cert_chain: cert_chain.into(),
            key: key.into(),
        });
        self
    }

    /// Like [`tls_pem`](Self::tls_pem), reading the PEM files when the servers start.
    pub fn tls_files(mut self, cert_chain: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsMaterial::Files {
            cert_chain: cert_chain.into(),
            key: key.into(),
        });
        self
    }

    /// The IP listeners bind to. Defaults to `127.0.0.1`.
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// How long [`serve`](Self::serve) waits for every listener to report ready before
    /// returning anyway. Defaults to [`DEFAULT_SETTLE_WINDOW`], or `STANDIN_SETTLE_WINDOW_MS`.
    pub fn settle_window(mut self, window: Duration) -> Self {
        self.settle_window = window;
        self
    }

    /// How long in-flight requests get to complete once a stop is requested. Defaults to
    /// [`DEFAULT_GRACE_PERIOD`], or `STANDIN_GRACE_PERIOD_MS`.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// [`ControlHandle::verify`] prints the requests and responses of the reports that did not
    /// pass. By default, the size of the printed bodies is limited.
    ///
    /// You may want to change this if you're working with services with very large
    /// bodies, or when printing the output to a file where size matters less than in a
    /// terminal window. The limit can also be set with `STANDIN_BODY_PRINT_LIMIT`.
    pub fn body_print_limit(mut self, limit: BodyPrintLimit) -> Self {
        self.body_print_limit = limit;
        self
    }

    /// Resolve `file://` body references with `loader`. Defaults to an [`FsLoader`] rooted in
    /// the current directory.
    pub fn loader<L: ResourceLoader + 'static>(mut self, loader: L) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Validate the mocks, start one listener per port and return once they are serving.
    ///
    /// Configuration problems (invalid URLs, methods or path templates, a port mixing https
    /// and http mocks, duplicate routes, missing or invalid TLS material) are reported before
    /// any listener is started. If a listener fails to bind, the listeners already started are
    /// stopped and the error is returned.
    pub async fn serve(mut self) -> Result<ControlHandle, Error> {
        let registered = self
            .mocks
            .drain(..)
            .enumerate()
            .map(|(index, mock)| Registered::new(index, mock))
            .collect::<Result<Vec<_>, _>>()?;
        let groups = plan(&registered)?;

        let tls = match groups.iter().find(|g| g.tls) {
            Some(group) => match &self.tls {
                Some(material) => Some(acceptor(material)?),
                None => return Err(Error::MissingTlsMaterial { port: group.port }),
            },
            None => None,
        };

        let tls_ports = groups
            .iter()
            .filter(|g| g.tls)
            .map(|g| g.port)
            .collect::<BTreeSet<_>>();
        let expected = registered
            .iter()
            .filter(|m| m.definition.enabled)
            .map(|m| (m.id, m.name.clone()))
            .collect::<Vec<_>>();

        let groups = groups
            .into_iter()
            .map(|group| {
                let bind = match self.listeners.remove(&group.port) {
                    Some(listener) => Bind::Prebound(listener),
                    None => Bind::Address(SocketAddr::new(self.bind_ip, group.port)),
                };
                (group, bind)
            })
            .collect();

        let state = SharedState::new();
        let started = launch(
            Launch {
                groups,
                mocks: Arc::new(registered),
                tls,
                loader: self.loader.clone(),
                settle_window: self.settle_window,
                grace_period: self.grace_period,
            },
            state.clone(),
        )
        .await?;

        Ok(ControlHandle::new(
            started.stop,
            started.stopped,
            state,
            started.addresses,
            tls_ports,
            expected,
            self.body_print_limit,
        ))
    }
}
