//! Turning a routed request into the response of its mock.
use crate::checks::{run_checks, CheckOutcome};
use crate::extraction::extract_all;
use crate::loader::{external_reference, ResourceLoader};
use crate::mock::MockDefinition;
use crate::response_template::BodyTemplate;
use crate::verification::ResponseSnapshot;
use crate::{Request, VariableScope};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use log::debug;

/// Everything the renderer produced for one request.
pub(crate) struct Rendered {
    pub(crate) response: Response<Full<Bytes>>,
    pub(crate) snapshot: ResponseSnapshot,
    pub(crate) checks: Vec<CheckOutcome>,
    /// Why the response had to be replaced by a 500, if it did.
    pub(crate) errors: Vec<String>,
}

/// Build the scope a mock renders its response with.
///
/// Check-extracted variables are merged before the extraction rules' results, in the same
/// layer.
pub(crate) fn build_scope(
    mock: &MockDefinition,
    captures: Vec<(String, String)>,
    request: &Request,
    checks: &[CheckOutcome],
) -> VariableScope {
    let form = mock.parse_form.then(|| request.form_params());
    let extracted = checks
        .iter()
        .flat_map(|outcome| outcome.extracted.iter().cloned())
        .chain(extract_all(&mock.extractions, request));

    VariableScope::builder()
        .path_captures(captures)
        .defaults(&mock.vars)
        .form(form)
        .extracted(extracted)
        .mappings(&mock.mappings)
}

/// Run the mock's checks and render its response template.
///
/// Check failures never change the response. Rendering failures (a body that cannot be
/// loaded, a header or status code that is not valid once rendered) turn the response into a
/// `500` and are returned in [`Rendered::errors`].
pub(crate) async fn render(
    mock: &MockDefinition,
    captures: Vec<(String, String)>,
    request: &Request,
    loader: &dyn ResourceLoader,
) -> Rendered {
    let checks = run_checks(&mock.checks, request);
    let scope = build_scope(mock, captures, request, &checks);
    let template = &mock.response;
    let mut errors = Vec::new();

    let mut headers = HeaderMap::new();
    for (name, value) in template.headers() {
        let rendered = scope.substitute(value);
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&rendered),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => errors.push(format!("invalid rendered header `{}: {}`", name, rendered)),
        }
    }
    if !template.mime().is_empty() && !headers.contains_key(http::header::CONTENT_TYPE) {
        match HeaderValue::from_str(template.mime()) {
            Ok(mime) => {
                headers.insert(http::header::CONTENT_TYPE, mime);
            }
            Err(_) => errors.push(format!("invalid mime type `{}`", template.mime())),
        }
    }

    let body = match template.body() {
        None => Vec::new(),
        Some(BodyTemplate::Bytes(bytes)) => bytes.clone(),
        Some(BodyTemplate::Text(text)) => {
            let rendered = scope.substitute(text);
            match external_reference(&rendered) {
                Some(reference) => {
                    debug!("Loading response body from `{}`.", reference);
                    match loader.load(reference).await {
                        Ok(content) => content,
                        Err(e) => {
                            errors.push(e.to_string());
                            Vec::new()
                        }
                    }
                }
                None => rendered.into_bytes(),
            }
        }
    };

    let status = match template.status_code() {
        0 => StatusCode::OK,
        code => StatusCode::from_u16(code).unwrap_or_else(|_| {
            errors.push(format!("invalid status code {}", code));
            StatusCode::INTERNAL_SERVER_ERROR
        }),
    };

    if errors.is_empty() {
        finish(status, headers, body, checks, errors)
    } else {
        let body = errors.join("\n").into_bytes();
        finish(
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
            body,
            checks,
            errors,
        )
    }
}

fn finish(
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    checks: Vec<CheckOutcome>,
    errors: Vec<String>,
) -> Rendered {
    let snapshot = ResponseSnapshot {
        status: status.as_u16(),
        headers: headers
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: body.clone(),
    };
    Rendered {
        response: plain_response(status, headers, body),
        snapshot,
        checks,
        errors,
    }
}

/// Assemble a hyper response from already-validated parts.
pub(crate) fn plain_response(
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
