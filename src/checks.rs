//! Assertions evaluated against every request a mock receives.
//!
//! Checks never decide *whether* a mock answers a request - routing does that. They record
//! whether the request looked the way the test expected, and their outcomes end up in the
//! [`InvocationReport`](crate::InvocationReport) of the request.
//!
//! A set of checks is provided out-of-the-box. You can write your own by implementing
//! [`Check`], and `Fn(&RequestView) -> CheckOutcome` closures implement it automatically.
use crate::Request;
use assert_json_diff::{assert_json_matches_no_panic, CompareMode};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::convert::TryInto;
use std::fmt;
use url::Url;

/// A captured request presented the way assertion machinery expects a response.
///
/// There is no status code yet when checks run, so `status_code` is always `0`.
#[derive(Debug)]
pub struct RequestView<'a> {
    pub status_code: u16,
    pub method: &'a Method,
    pub url: &'a Url,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
    /// The body parsed as JSON, if it is valid JSON.
    pub body_json: Option<Value>,
}

impl<'a> RequestView<'a> {
    pub fn of(request: &'a Request) -> Self {
        Self {
            status_code: 0,
            method: &request.method,
            url: &request.url,
            headers: &request.headers,
            body: &request.body,
            body_json: serde_json::from_slice(&request.body).ok(),
        }
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(self.body).into_owned()
    }
}

/// Verdict of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Pass,
    /// The request did not satisfy the assertion.
    Fail(String),
    /// The assertion could not be evaluated at all.
    Error(String),
}

/// What a [`Check`] returns: a verdict and any variable it extracted from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: String,
    pub result: CheckResult,
    pub extracted: Vec<(String, String)>,
}

impl CheckOutcome {
    pub fn pass(name: impl Into<String>) -> Self {
        Self::new(name, CheckResult::Pass)
    }

    pub fn fail(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(name, CheckResult::Fail(reason.into()))
    }

    pub fn error(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(name, CheckResult::Error(reason.into()))
    }

    fn new(name: impl Into<String>, result: CheckResult) -> Self {
        Self {
            name: name.into(),
            result,
            extracted: Vec::new(),
        }
    }

    /// Attach an extracted variable to the outcome.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extracted.push((name.into(), value.into()));
        self
    }

    pub fn is_pass(&self) -> bool {
        self.result == CheckResult::Pass
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            CheckResult::Pass => write!(f, "{}: pass", self.name),
            CheckResult::Fail(reason) => write!(f, "{}: fail - {}", self.name, reason),
            CheckResult::Error(reason) => write!(f, "{}: error - {}", self.name, reason),
        }
    }
}

/// Anything that implements `Check` can be attached to a
/// [`MockDefinition`](crate::MockDefinition) and will be evaluated on every request it serves.
///
/// ```rust
/// use standin::checks::{Check, CheckOutcome, RequestView};
///
/// // Fails unless the request carries a body of an even length.
/// pub struct EvenBody;
///
/// impl Check for EvenBody {
///     fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
///         if view.body.len() % 2 == 0 {
///             CheckOutcome::pass("even body")
///         } else {
///             CheckOutcome::fail("even body", format!("body has {} bytes", view.body.len()))
///         }
///     }
/// }
/// ```
pub trait Check: Send + Sync {
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome;
}

impl<F> Check for F
where
    F: Fn(&RequestView<'_>) -> CheckOutcome,
    F: Send + Sync,
{
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
        self(view)
    }
}

/// Run every check against `request`, in order.
pub(crate) fn run_checks(checks: &[Box<dyn Check>], request: &Request) -> Vec<CheckOutcome> {
    let view = RequestView::of(request);
    checks.iter().map(|c| c.check(&view)).collect()
}

#[derive(Debug)]
/// Check that a header carries **exactly** the given values.
pub struct HeaderExactCheck(HeaderName, Vec<HeaderValue>);

/// Shorthand for [`HeaderExactCheck::new`].
pub fn header<K, V>(key: K, value: V) -> HeaderExactCheck
where
    K: TryInto<HeaderName>,
    <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
    V: TryInto<HeaderValue>,
    <V as TryInto<HeaderValue>>::Error: std::fmt::Debug,
{
    HeaderExactCheck::new(key, vec![value])
}

impl HeaderExactCheck {
    pub fn new<K, V>(key: K, values: Vec<V>) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        <V as TryInto<HeaderValue>>::Error: std::fmt::Debug,
    {
        let key = key.try_into().expect("Failed to convert to header name.");
        let values = values
            .into_iter()
            .map(|value| {
                value
                    .try_into()
                    .expect("Failed to convert to header value.")
            })
            .collect();
        Self(key, values)
    }
}

impl Check for HeaderExactCheck {
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
        let name = format!("header {}", self.0);
        let values: Vec<&HeaderValue> = view.headers.get_all(&self.0).iter().collect();
        if values.is_empty() {
            return CheckOutcome::fail(name, "header is missing");
        }
        let expected: Vec<&HeaderValue> = self.1.iter().collect();
        if values == expected {
            CheckOutcome::pass(name)
        } else {
            CheckOutcome::fail(name, format!("expected {:?}, got {:?}", expected, values))
        }
    }
}

#[derive(Debug)]
/// Check that a header is present, whatever its value.
pub struct HeaderExistsCheck(HeaderName);

/// Shorthand for [`HeaderExistsCheck::new`].
pub fn header_exists<K>(key: K) -> HeaderExistsCheck
where
    K: TryInto<HeaderName>,
    <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
{
    HeaderExistsCheck::new(key)
}

impl HeaderExistsCheck {
    pub fn new<K>(key: K) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
    {
        let key = key.try_into().expect("Failed to convert to header name.");
        Self(key)
    }
}

impl Check for HeaderExistsCheck {
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
        let name = format!("header {} exists", self.0);
        if view.headers.contains_key(&self.0) {
            CheckOutcome::pass(name)
        } else {
            CheckOutcome::fail(name, "header is missing")
        }
    }
}

#[derive(Debug)]
/// Check a header against a regular expression. Named capture groups are extracted as
/// variables.
pub struct HeaderRegexCheck(HeaderName, Regex);

/// Shorthand for [`HeaderRegexCheck::new`].
pub fn header_regex<K>(key: K, value: &str) -> HeaderRegexCheck
where
    K: TryInto<HeaderName>,
    <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
{
    HeaderRegexCheck::new(key, value)
}

impl HeaderRegexCheck {
    pub fn new<K>(key: K, value: &str) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
    {
        let key = key.try_into().expect("Failed to convert to header name.");
        let value_matcher = Regex::new(value).expect("Failed to create regex for value matcher");
        Self(key, value_matcher)
    }
}

impl Check for HeaderRegexCheck {
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
        let name = format!("header {} matches {}", self.0, self.1);
        let Some(value) = view.headers.get(&self.0) else {
            return CheckOutcome::fail(name, "header is missing");
        };
        let Ok(value) = value.to_str() else {
            return CheckOutcome::error(name, "header value is not valid ASCII");
        };
        match self.1.captures(value) {
            Some(captures) => capture_vars(&self.1, &captures)
                .into_iter()
                .fold(CheckOutcome::pass(name), |o, (k, v)| o.with_var(k, v)),
            None => CheckOutcome::fail(name, format!("value `{}` does not match", value)),
        }
    }
}

#[derive(Debug)]
/// Check that a query parameter has **exactly** the given value.
pub struct QueryParamExactCheck(String, String);

impl QueryParamExactCheck {
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self(key.into(), value.into())
    }
}

/// Shorthand for [`QueryParamExactCheck::new`].
pub fn query_param<K, V>(key: K, value: V) -> QueryParamExactCheck
where
    K: Into<String>,
    V: Into<String>,
{
    QueryParamExactCheck::new(key, value)
}

impl Check for QueryParamExactCheck {
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
        let name = format!("query {}={}", self.0, self.1);
        let found: Vec<String> = view
            .url
            .query_pairs()
            .filter(|(k, _)| k == self.0.as_str())
            .map(|(_, v)| v.into_owned())
            .collect();
        if found.iter().any(|v| v == &self.1) {
            CheckOutcome::pass(name)
        } else if found.is_empty() {
            CheckOutcome::fail(name, "query parameter is missing")
        } else {
            CheckOutcome::fail(name, format!("got {:?}", found))
        }
    }
}

#[derive(Debug)]
/// Check that the body contains the given bytes.
pub struct BodyContainsCheck(Vec<u8>);

/// Shorthand for [`BodyContainsCheck`].
pub fn body_string_contains<T>(body: T) -> BodyContainsCheck
where
    T: Into<String>,
{
    BodyContainsCheck(body.into().into_bytes())
}

impl Check for BodyContainsCheck {
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
        let needle = String::from_utf8_lossy(&self.0);
        let name = format!("body contains `{}`", needle);
        let found = self.0.is_empty()
            || view
                .body
                .windows(self.0.len())
                .any(|window| window == self.0.as_slice());
        if found {
            CheckOutcome::pass(name)
        } else {
            CheckOutcome::fail(name, "substring not found")
        }
    }
}

#[derive(Debug)]
/// Check that the body is JSON equal to the expected value, regardless of key ordering.
pub struct BodyJsonCheck(Value);

/// Shorthand for [`BodyJsonCheck`].
pub fn body_json<T: Serialize>(body: T) -> BodyJsonCheck {
    BodyJsonCheck(serde_json::to_value(body).expect("Can't serialize to JSON"))
}

impl Check for BodyJsonCheck {
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
        let name = "body json".to_string();
        match &view.body_json {
            None => CheckOutcome::error(name, "request body is not valid JSON"),
            Some(actual) => match assert_json_matches_no_panic(
                actual,
                &self.0,
                assert_json_diff::Config::new(CompareMode::Strict),
            ) {
                Ok(()) => CheckOutcome::pass(name),
                Err(diff) => CheckOutcome::fail(name, diff),
            },
        }
    }
}

#[derive(Debug)]
/// Check that the JSON body includes the expected value - extra fields are allowed.
pub struct BodyPartialJsonCheck(Value);

/// Shorthand for [`BodyPartialJsonCheck`].
pub fn body_partial_json<T: Serialize>(body: T) -> BodyPartialJsonCheck {
    BodyPartialJsonCheck(serde_json::to_value(body).expect("Can't serialize to JSON"))
}

impl Check for BodyPartialJsonCheck {
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
        let name = "body partial json".to_string();
        match &view.body_json {
            None => CheckOutcome::error(name, "request body is not valid JSON"),
            Some(actual) => match assert_json_matches_no_panic(
                actual,
                &self.0,
                assert_json_diff::Config::new(CompareMode::Inclusive),
            ) {
                Ok(()) => CheckOutcome::pass(name),
                Err(diff) => CheckOutcome::fail(name, diff),
            },
        }
    }
}

#[derive(Debug)]
/// Check the body against a regular expression. Named capture groups are extracted as
/// variables.
pub struct BodyRegexCheck(Regex);

/// Shorthand for [`BodyRegexCheck`].
pub fn body_regex(pattern: &str) -> BodyRegexCheck {
    BodyRegexCheck(Regex::new(pattern).expect("Failed to create regex for body matcher"))
}

impl Check for BodyRegexCheck {
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
        let name = format!("body matches {}", self.0);
        let body = view.body_string();
        match self.0.captures(&body) {
            Some(captures) => capture_vars(&self.0, &captures)
                .into_iter()
                .fold(CheckOutcome::pass(name), |o, (k, v)| o.with_var(k, v)),
            None => CheckOutcome::fail(name, "body does not match"),
        }
    }
}

#[derive(Debug)]
/// Check the `Authorization` header for HTTP basic credentials.
pub struct BasicAuthCheck(HeaderExactCheck);

impl BasicAuthCheck {
    pub fn from_credentials(username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        Self::from_token(BASE64_STANDARD.encode(format!(
            "{}:{}",
            username.as_ref(),
            password.as_ref()
        )))
    }

    pub fn from_token(token: impl AsRef<str>) -> Self {
        Self(header(
            "Authorization",
            &*format!("Basic {}", token.as_ref()),
        ))
    }
}

/// Shorthand for [`BasicAuthCheck::from_credentials`].
pub fn basic_auth<U, P>(username: U, password: P) -> BasicAuthCheck
where
    U: AsRef<str>,
    P: AsRef<str>,
{
    BasicAuthCheck::from_credentials(username, password)
}

impl Check for BasicAuthCheck {
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
        let CheckOutcome { result, .. } = self.0.check(view);
        CheckOutcome::new("basic auth", result)
    }
}

#[derive(Debug)]
/// Check the `Authorization` header for a bearer token.
pub struct BearerTokenCheck(HeaderExactCheck);

impl BearerTokenCheck {
    pub fn from_token(token: impl AsRef<str>) -> Self {
        Self(header(
            "Authorization",
            &*format!("Bearer {}", token.as_ref()),
        ))
    }
}

/// Shorthand for [`BearerTokenCheck::from_token`].
pub fn bearer_token<T>(token: T) -> BearerTokenCheck
where
    T: AsRef<str>,
{
    BearerTokenCheck::from_token(token)
}

impl Check for BearerTokenCheck {
    fn check(&self, view: &RequestView<'_>) -> CheckOutcome {
        let CheckOutcome { result, .. } = self.0.check(view);
        CheckOutcome::new("bearer token", result)
    }
}

pub(crate) fn capture_vars(regex: &Regex, captures: &regex::Captures<'_>) -> Vec<(String, String)> {
    regex
        .capture_names()
        .flatten()
        .filter_map(|group| {
            captures
                .name(group)
                .map(|m| (group.to_string(), m.as_str().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(headers: &[(&str, &str)], url: &str, body: &str) -> Request {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(HeaderName::from_bytes(k.as_bytes()).unwrap(), v.parse().unwrap());
        }
        Request {
            url: Url::parse(url).unwrap(),
            method: Method::POST,
            headers: map,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn request_view_has_no_status_and_parses_json() {
        let request = request(&[], "http://localhost/", r#"{"a": 1}"#);
        let view = RequestView::of(&request);
        assert_eq!(view.status_code, 0);
        assert_eq!(view.body_json, Some(json!({"a": 1})));
    }

    #[test]
    fn header_check_reports_missing_and_mismatched_headers() {
        let request = request(&[("x-env", "prod")], "http://localhost/", "");
        let view = RequestView::of(&request);

        assert!(header("x-env", "prod").check(&view).is_pass());
        assert!(matches!(
            header("x-env", "dev").check(&view).result,
            CheckResult::Fail(_)
        ));
        assert_eq!(
            header("x-missing", "1").check(&view).result,
            CheckResult::Fail("header is missing".to_string())
        );
    }

    #[test]
    fn regex_checks_extract_named_groups() {
        let request = request(
            &[("authorization", "Token abc123")],
            "http://localhost/",
            "order=42;qty=3",
        );
        let view = RequestView::of(&request);

        let header_outcome = header_regex("authorization", r"^Token (?P<token>\w+)$").check(&view);
        assert!(header_outcome.is_pass());
        assert_eq!(
            header_outcome.extracted,
            vec![("token".to_string(), "abc123".to_string())]
        );

        let body_outcome = body_regex(r"order=(?P<order>\d+);qty=(?P<qty>\d+)").check(&view);
        assert_eq!(
            body_outcome.extracted,
            vec![
                ("order".to_string(), "42".to_string()),
                ("qty".to_string(), "3".to_string())
            ]
        );
    }

    #[test]
    fn json_checks_error_on_non_json_bodies() {
        let request = request(&[], "http://localhost/", "not json");
        let view = RequestView::of(&request);
        assert!(matches!(
            body_json(json!({})).check(&view).result,
            CheckResult::Error(_)
        ));
    }

    #[test]
    fn partial_json_allows_extra_fields() {
        let request = request(&[], "http://localhost/", r#"{"a": 1, "b": {"c": 2, "d": 3}}"#);
        let view = RequestView::of(&request);
        assert!(body_partial_json(json!({"b": {"c": 2}})).check(&view).is_pass());
        assert!(!body_json(json!({"b": {"c": 2}})).check(&view).is_pass());
    }

    #[test]
    fn basic_auth_and_query_param() {
        let request = request(
            &[("authorization", "Basic dXNlcjpwYXNz")],
            "http://localhost/?page=2&page=3",
            "",
        );
        let view = RequestView::of(&request);
        assert!(basic_auth("user", "pass").check(&view).is_pass());
        assert!(!bearer_token("x").check(&view).is_pass());
        assert!(query_param("page", "3").check(&view).is_pass());
        assert!(!query_param("size", "3").check(&view).is_pass());
    }

    #[test]
    fn closures_are_checks() {
        let check = |view: &RequestView<'_>| {
            if view.method == Method::POST {
                CheckOutcome::pass("is post").with_var("verb", "post")
            } else {
                CheckOutcome::fail("is post", "not a post")
            }
        };
        let request = request(&[], "http://localhost/", "");
        let checks: Vec<Box<dyn Check>> = vec![Box::new(check)];
        let outcomes = run_checks(&checks, &request);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].extracted, vec![("verb".into(), "post".into())]);
    }
}
