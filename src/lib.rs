#![allow(clippy::needless_doctest_main)]
//! `standin` stands up lightweight HTTP(S) endpoints that the application under test calls as
//! if they were its real backends, captures every request they receive and, once the run is
//! over, verifies that the expected interactions took place.
//!
//! # Table of Contents
//! 1. [Getting started](#getting-started)
//! 2. [Templating](#templating)
//! 3. [Checks](#checks)
//! 4. [Verification](#verification)
//! 5. [Server groups](#server-groups)
//! 6. [Configuration](#configuration)
//! 7. [Runtime compatibility](#runtime-compatibility)
//!
//! ## Getting started
//! ```rust,no_run
//! use standin::{MockDefinition, MockServer, ResponseTemplate};
//! use standin::checks::header;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), standin::Error> {
//!     // Describe the endpoints the application under test depends on...
//!     let server = MockServer::builder()
//!         .register(
//!             MockDefinition::given("GET", "http://127.0.0.1:8080/users/{id}")
//!                 .check(header("accept", "application/json"))
//!                 .respond_with(
//!                     ResponseTemplate::new(200)
//!                         .set_body_raw(r#"{"id": "{{id}}"}"#, "application/json"),
//!                 )
//!                 .named("get user"),
//!         )
//!         // ...start serving them...
//!         .serve()
//!         .await?;
//!
//!     // ...run the application under test against `http://127.0.0.1:8080`...
//!
//!     // ...and check what it did.
//!     for report in server.analyse().await {
//!         println!("{}", report);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Templating
//!
//! Response header values and bodies are templates. Each request gets its own
//! [`VariableScope`], built from these layers (lowest to highest precedence):
//! 1. the captures of the path template (`/users/{id}`);
//! 2. the default variables of the mock ([`MockBuilder::var`]);
//! 3. the query and url-encoded form parameters, if [`MockBuilder::parse_form`] is enabled;
//! 4. the variables extracted by checks and by [extraction rules](extraction);
//! 5. the outputs of the mock's [`MappingRule`]s, evaluated in order.
//!
//! Every `{{name}}` placeholder in scope is replaced; unknown placeholders are left as they
//! are. A body rendering to `file://<reference>` is replaced by whatever the configured
//! [`ResourceLoader`](loader::ResourceLoader) returns for `<reference>`.
//!
//! ## Checks
//!
//! [Checks](checks) are assertions evaluated against every request a mock serves. They never
//! decide which mock answers a request, and failing checks do not change the response: they
//! end up in the request's [`InvocationReport`].
//!
//! ## Verification
//!
//! [`ControlHandle::analyse`] stops the servers and returns one report per request received,
//! followed by one error report for every enabled mock that was never called.
//! [`ControlHandle::verify`] does the same and panics if any report did not pass.
//! Requests matching no mock receive a `404` and a failing report.
//!
//! ## Server groups
//!
//! Mocks are grouped by the port of their URL: one listener is started per port. A port
//! serves either https or plain http mocks, never both; https groups present the certificate
//! chain configured with [`MockServerBuilder::tls_pem`] or [`MockServerBuilder::tls_files`].
//! Configuration problems are reported by [`MockServerBuilder::serve`] before any listener is
//! started.
//!
//! ## Configuration
//!
//! Mocks can also be loaded from JSON, see the [`config`] module.
//!
//! ## Runtime compatibility
//!
//! The servers run on a dedicated thread with their own Tokio runtime: the [`ControlHandle`]
//! can be driven from any async runtime.
pub mod checks;
pub mod config;
mod error;
pub mod extraction;
pub mod http;
pub mod loader;
mod mapping;
mod mock;
mod mock_server;
mod monitor;
mod render;
mod request;
mod response_template;
mod router;
mod scope;
pub mod verification;

pub use error::Error;
pub use mapping::{MappingRule, MALFORMED_TABLE, MALFORMED_VARIABLES, UNDEFINED, WILDCARD};
pub use mock::{MockBuilder, MockDefinition, MockId};
pub use mock_server::{
    ControlHandle, MockServer, MockServerBuilder, ServerState, TlsMaterial, DEFAULT_GRACE_PERIOD,
    DEFAULT_SETTLE_WINDOW,
};
pub use request::{BodyPrintLimit, Request, BODY_PRINT_LIMIT};
pub use response_template::ResponseTemplate;
pub use router::PathTemplate;
pub use scope::VariableScope;
pub use verification::{InvocationReport, ReportStatus};
