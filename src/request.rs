use std::fmt;

use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use log::debug;
use serde::de::DeserializeOwned;
use url::Url;

use crate::scope::flatten_params;

pub const BODY_PRINT_LIMIT: usize = 10_000;

/// Specifies limitations on printing request bodies when reporting failed verifications. Some
/// stand-ins receive bodies too large to reasonably print and it may be desirable to limit them.
#[derive(Debug, Copy, Clone)]
pub enum BodyPrintLimit {
    /// Maximum length of a body to print in bytes.
    Limited(usize),
    /// There is no limit to the size of a body that may be printed.
    Unlimited,
}

/// A snapshot of a request received by a stand-in server.
///
/// The body is read once when the request arrives, so checks, the renderer and the final
/// [`InvocationReport`](crate::InvocationReport) can all share an immutable view of it.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Request {
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Query string pairs, in order, percent-decoded.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Query parameters followed by the url-encoded form body, if the request carries one.
    ///
    /// Multi-valued fields are flattened into `name[0]`, `name[1]`, ...
    pub fn form_params(&self) -> Vec<(String, String)> {
        let mut pairs = self.query_pairs();
        if self.is_form() {
            pairs.extend(
                url::form_urlencoded::parse(&self.body)
                    .map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }
        flatten_params(pairs)
    }

    fn is_form(&self) -> bool {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }

    pub(crate) async fn from_hyper(
        request: hyper::Request<hyper::body::Incoming>,
        scheme: &str,
    ) -> Result<Request, RequestError> {
        let (parts, body) = request.into_parts();
        let host = parts
            .headers
            .get(http::header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        let raw_url = match parts.uri.authority() {
            Some(_) => parts.uri.to_string(),
            None => format!("{}://{}{}", scheme, host, path_and_query),
        };
        // Routing only needs the method and the path: an unusable `Host` must not reject the
        // request.
        let url = match Url::parse(&raw_url) {
            Ok(url) => url,
            Err(e) => {
                debug!(
                    "Unusable request url `{}` ({}), capturing it as localhost.",
                    raw_url, e
                );
                let fallback = format!("{}://localhost{}", scheme, path_and_query);
                Url::parse(&fallback).map_err(|_| RequestError::Url(raw_url, e))?
            }
        };

        let body = body
            .collect()
            .await
            .map_err(|source| RequestError::Body {
                method: parts.method.clone(),
                path: url.path().to_string(),
                source,
            })?
            .to_bytes();

        Ok(Self {
            url,
            method: parts.method,
            headers: parts.headers,
            body: body.to_vec(),
        })
    }

    pub(crate) fn print_with_limit(
        &self,
        mut buffer: impl fmt::Write,
        body_print_limit: BodyPrintLimit,
    ) -> fmt::Result {
        writeln!(buffer, "{} {}", self.method, self.url)?;
        for name in self.headers.keys() {
            let values = self
                .headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()))
                .collect::<Vec<_>>();
            let values = values.join(",");
            writeln!(buffer, "{}: {}", name, values)?;
        }
        print_body(buffer, &self.body, body_print_limit)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print_with_limit(f, BodyPrintLimit::Limited(BODY_PRINT_LIMIT))
    }
}

/// Why an incoming request could not be captured.
#[derive(Debug, thiserror::Error)]
pub(crate) enum RequestError {
    #[error("failed to read the body of {method} {path}: {source}")]
    Body {
        method: Method,
        path: String,
        #[source]
        source: hyper::Error,
    },
    #[error("failed to parse request url `{0}`: {1}")]
    Url(String, #[source] url::ParseError),
}

pub(crate) fn print_body(
    mut buffer: impl fmt::Write,
    body: &[u8],
    body_print_limit: BodyPrintLimit,
) -> fmt::Result {
    match body_print_limit {
        BodyPrintLimit::Limited(limit) if body.len() > limit => {
            let mut written = false;
            for end_byte in limit..(limit + 4).min(body.len()) {
                if let Ok(truncated) = std::str::from_utf8(&body[..end_byte]) {
                    written = true;
                    writeln!(buffer, "{}", truncated)?;
                    writeln!(
                        buffer,
                        "We truncated the body because it was too large: {} bytes (limit: {} bytes)",
                        body.len(),
                        limit
                    )?;
                    writeln!(
                        buffer,
                        "Increase this limit by setting `STANDIN_BODY_PRINT_LIMIT`, or calling `MockServerBuilder::body_print_limit`"
                    )?;
                    break;
                }
            }
            if !written {
                writeln!(
                    buffer,
                    "Body is likely binary (invalid utf-8) size is {} bytes",
                    body.len()
                )
            } else {
                Ok(())
            }
        }
        _ => {
            if let Ok(body) = std::str::from_utf8(body) {
                writeln!(buffer, "{}", body)
            } else {
                writeln!(
                    buffer,
                    "Body is likely binary (invalid utf-8) size is {} bytes",
                    body.len()
                )
            }
        }
    }
}
