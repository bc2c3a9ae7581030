//! Errors surfaced synchronously while assembling or starting stand-in servers.
//!
//! Anything that goes wrong *while serving* is not an [`Error`]: it is recorded as a failing
//! [`InvocationReport`](crate::InvocationReport) and the listener keeps running.
use std::net::SocketAddr;

/// Everything that can prevent [`MockServer::serve`](crate::MockServer) from reaching the
/// running state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("mock `{mock}` has an invalid url `{url}`: {reason}")]
    InvalidUrl {
        mock: String,
        url: String,
        reason: String,
    },

    #[error("mock `{mock}` uses unsupported scheme `{scheme}` (expected http or https)")]
    UnsupportedScheme { mock: String, scheme: String },

    #[error("mock `{mock}` has an invalid HTTP method `{method}`")]
    InvalidMethod { mock: String, method: String },

    #[error("mock `{mock}` has an invalid path template `{template}`: {reason}")]
    InvalidPathTemplate {
        mock: String,
        template: String,
        reason: String,
    },

    #[error("port {port} mixes TLS and plain HTTP mocks (`{tls_mock}` vs `{plain_mock}`)")]
    MixedTls {
        port: u16,
        tls_mock: String,
        plain_mock: String,
    },

    #[error("port {port} serves https mocks but no TLS certificate/key pair was supplied")]
    MissingTlsMaterial { port: u16 },

    #[error("invalid TLS certificate/key pair: {0}")]
    InvalidTlsMaterial(String),

    #[error("mocks `{first}` and `{second}` both route {method} {path} on port {port}")]
    DuplicateRoute {
        port: u16,
        method: String,
        path: String,
        first: String,
        second: String,
    },

    #[error("invalid mock configuration: {0}")]
    Config(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("the serving thread could not be started: {0}")]
    ServingThread(String),
}
