//! All bits and pieces concerning the stand-in HTTP(S) servers are in this module.
//!
//! `builder::MockServerBuilder` validates the mocks and partitions them into one server group
//! per port (`group`). `manager` brings the groups' listeners (`listener`) up on a dedicated
//! serving thread and tears them down when the `control::ControlHandle` asks for it.
mod builder;
mod control;
mod group;
mod listener;
mod manager;
mod tls;

pub use builder::{MockServerBuilder, DEFAULT_GRACE_PERIOD, DEFAULT_SETTLE_WINDOW};
pub use control::{ControlHandle, ServerState};
pub use tls::TlsMaterial;

/// The entry point to assemble stand-in servers.
///
/// ```rust,no_run
/// use standin::{MockDefinition, MockServer, ResponseTemplate};
///
/// # async fn run() -> Result<(), standin::Error> {
/// let server = MockServer::builder()
///     .register(
///         MockDefinition::given("GET", "http://127.0.0.1:8080/health")
///             .respond_with(ResponseTemplate::new(200)),
///     )
///     .serve()
///     .await?;
///
/// // ... exercise the application under test ...
///
/// server.verify().await;
/// # Ok(())
/// # }
/// ```
pub struct MockServer;

impl MockServer {
    /// You can use `MockServer::builder` to configure the servers before starting them: TLS
    /// material, pre-bound listeners, timeouts, resource loader.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }
}
