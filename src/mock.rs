use crate::checks::Check;
use crate::error::Error;
use crate::extraction::Extract;
use crate::mapping::MappingRule;
use crate::response_template::ResponseTemplate;
use crate::router::PathTemplate;
use http::Method;
use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;
use url::Url;

/// The identifier assigned to a [`MockDefinition`] when it is registered with a
/// [`MockServerBuilder`](crate::MockServerBuilder).
///
/// Identifiers are indexes into the registration order: the first registered mock gets
/// `MockId(0)`, the second `MockId(1)`, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MockId(pub usize);

impl Display for MockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The declarative specification of one stand-in endpoint: which method and URL it answers,
/// what it checks, and how it renders its response.
///
/// `MockDefinition`s have to be registered with a [`MockServerBuilder`] to become effective.
///
/// ### Example:
/// ```rust,no_run
/// use standin::{MockDefinition, MockServer, ResponseTemplate};
/// use standin::checks::header;
///
/// # async fn run() -> Result<(), standin::Error> {
/// let server = MockServer::builder()
///     .register(
///         MockDefinition::given("GET", "http://127.0.0.1:8080/users/{id}")
///             .check(header("accept", "application/json"))
///             .respond_with(
///                 ResponseTemplate::new(200).set_body_string(r#"{"id": "{{id}}"}"#),
///             )
///             .named("get user"),
///     )
///     .serve()
///     .await?;
///
/// // ... exercise the application under test ...
///
/// let reports = server.analyse().await;
/// assert!(reports.iter().all(|r| r.is_pass()));
/// # Ok(())
/// # }
/// ```
///
/// [`MockServerBuilder`]: crate::MockServerBuilder
pub struct MockDefinition {
    pub(crate) name: Option<String>,
    pub(crate) method: String,
    pub(crate) url: String,
    pub(crate) enabled: bool,
    pub(crate) parse_form: bool,
    pub(crate) extractions: Vec<Extract>,
    pub(crate) checks: Vec<Box<dyn Check>>,
    pub(crate) response: ResponseTemplate,
    pub(crate) vars: HashMap<String, String>,
    pub(crate) mappings: Vec<MappingRule>,
}

impl Debug for MockDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDefinition")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("enabled", &self.enabled)
            .field("parse_form", &self.parse_form)
            .field("extractions", &self.extractions)
            .field("checks", &self.checks.len())
            .field("response", &self.response)
            .field("vars", &self.vars)
            .field("mappings", &self.mappings)
            .finish()
    }
}

/// A fluent builder to construct a [`MockDefinition`] given a method, a URL template and a
/// [`ResponseTemplate`].
pub struct MockBuilder {
    method: String,
    url: String,
    parse_form: bool,
    extractions: Vec<Extract>,
    checks: Vec<Box<dyn Check>>,
    vars: HashMap<String, String>,
    mappings: Vec<MappingRule>,
}

impl MockDefinition {
    /// Start building a `MockDefinition` answering `method` requests on `url`.
    ///
    /// `url` carries the scheme (`http` or `https`), the host and port the stand-in listens on,
    /// and a path template with named placeholders, e.g. `https://localhost:8443/users/{id}`.
    /// Both are validated when the server starts.
    pub fn given(method: impl Into<String>, url: impl Into<String>) -> MockBuilder {
        MockBuilder {
            method: method.into(),
            url: url.into(),
            parse_form: false,
            extractions: Vec::new(),
            checks: Vec::new(),
            vars: HashMap::new(),
            mappings: Vec::new(),
        }
    }

    /// Assign a name to your mock.
    ///
    /// The name is used in invocation reports, in particular in the report synthesized when
    /// the mock is never called. Unnamed mocks are called `Mock #<id>`.
    pub fn named<T: Into<String>>(mut self, mock_name: T) -> Self {
        self.name = Some(mock_name.into());
        self
    }

    /// A disabled mock is neither served nor expected to be called.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Validate the method and URL template of the mock.
    pub(crate) fn resolve(&self, display_name: &str) -> Result<ResolvedRoute, Error> {
        let method = Method::from_str(&self.method.to_ascii_uppercase()).map_err(|_| {
            Error::InvalidMethod {
                mock: display_name.to_string(),
                method: self.method.clone(),
            }
        })?;

        // Placeholders are not valid URL characters: split the path template out before
        // handing the rest to the URL parser.
        let (origin, path) = split_origin(&self.url).ok_or_else(|| Error::InvalidUrl {
            mock: display_name.to_string(),
            url: self.url.clone(),
            reason: "expected scheme://host[:port]/path".to_string(),
        })?;
        let origin = Url::parse(origin).map_err(|e| Error::InvalidUrl {
            mock: display_name.to_string(),
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        let tls = match origin.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(Error::UnsupportedScheme {
                    mock: display_name.to_string(),
                    scheme: other.to_string(),
                })
            }
        };
        let port = origin
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidUrl {
                mock: display_name.to_string(),
                url: self.url.clone(),
                reason: "missing port".to_string(),
            })?;
        let template = PathTemplate::parse(path).map_err(|reason| Error::InvalidPathTemplate {
            mock: display_name.to_string(),
            template: path.to_string(),
            reason,
        })?;

        Ok(ResolvedRoute {
            method,
            port,
            tls,
            template,
        })
    }
}

/// The routing facts derived from a mock's method and URL.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedRoute {
    pub(crate) method: Method,
    pub(crate) port: u16,
    pub(crate) tls: bool,
    pub(crate) template: PathTemplate,
}

// `scheme://authority/path?query` -> (`scheme://authority`, `/path`), query dropped.
fn split_origin(url: &str) -> Option<(&str, &str)> {
    let scheme_end = url.find("://")? + 3;
    let path_start = url[scheme_end..]
        .find('/')
        .map(|i| i + scheme_end)
        .unwrap_or(url.len());
    let (origin, path) = url.split_at(path_start);
    let path = path.split('?').next().unwrap_or_default();
    Some((origin, if path.is_empty() { "/" } else { path }))
}

impl MockBuilder {
    /// Add a check evaluated against every request the mock serves.
    ///
    /// Failing checks do not change the response: they mark the invocation report as failed.
    pub fn check<C: Check + 'static>(mut self, check: C) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// Add an extraction rule.
    pub fn extract(mut self, rule: Extract) -> Self {
        self.extractions.push(rule);
        self
    }

    /// Set a default variable, overridable by form parameters, extractions and mappings.
    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Add a mapping rule. Rules are evaluated in the order they are added.
    pub fn mapping(mut self, rule: MappingRule) -> Self {
        self.mappings.push(rule);
        self
    }

    /// Merge query and url-encoded form parameters into the variable scope.
    pub fn parse_form(mut self, enabled: bool) -> Self {
        self.parse_form = enabled;
        self
    }

    /// Establish what [`ResponseTemplate`] should be rendered when the mock is called.
    ///
    /// `respond_with` finalises the `MockBuilder` and returns a [`MockDefinition`], ready to
    /// be registered.
    pub fn respond_with(self, template: ResponseTemplate) -> MockDefinition {
        MockDefinition {
            name: None,
            method: self.method,
            url: self.url,
            enabled: true,
            parse_form: self.parse_form,
            extractions: self.extractions,
            checks: self.checks,
            response: template,
            vars: self.vars,
            mappings: self.mappings,
        }
    }
}
