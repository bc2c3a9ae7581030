//! Mock definitions loaded from JSON.
//!
//! ```json
//! {
//!   "mocks": [
//!     {
//!       "name": "get user",
//!       "method": "GET",
//!       "url": "http://127.0.0.1:8080/users/{id}",
//!       "checks": [{ "type": "header", "name": "accept", "value": "application/json" }],
//!       "extract": [{ "type": "regex", "source": { "header": "x-trace" }, "pattern": "(?P<trace>.+)" }],
//!       "vars": { "region": "eu" },
//!       "mappings": [{ "vars": ["id", "tier"], "table": ["1", "gold", "*", "bronze"] }],
//!       "response": {
//!         "status": 200,
//!         "headers": { "x-trace": "{{trace}}" },
//!         "body": "file://fixtures/users/{{id}}.json",
//!         "content_type": "application/json"
//!       }
//!     }
//!   ]
//! }
//! ```
use crate::checks::{
    basic_auth, bearer_token, body_json, body_partial_json, body_regex, body_string_contains,
    header, header_exists, header_regex, query_param,
};
use crate::error::Error;
use crate::extraction::{Extract, Source};
use crate::mapping::MappingRule;
use crate::mock::MockDefinition;
use crate::response_template::ResponseTemplate;
use http::{HeaderName, HeaderValue};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

/// The top-level document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MocksFile {
    pub mocks: Vec<MockConfig>,
}

/// One mock definition.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub method: String,
    pub url: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub parse_form: bool,
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
    #[serde(default)]
    pub extract: Vec<ExtractConfig>,
    #[serde(default)]
    pub vars: HashMap<String, String>,
    #[serde(default)]
    pub mappings: Vec<MappingRule>,
    #[serde(default)]
    pub response: ResponseConfig,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckConfig {
    Header { name: String, value: String },
    HeaderExists { name: String },
    HeaderRegex { name: String, pattern: String },
    QueryParam { name: String, value: String },
    BodyContains { value: String },
    BodyJson { value: Value },
    BodyPartialJson { value: Value },
    BodyRegex { pattern: String },
    BasicAuth { username: String, password: String },
    BearerToken { token: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceConfig {
    Body,
    Path,
    Header(String),
    Query(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractConfig {
    Regex { source: SourceConfig, pattern: String },
    JsonPointer { pointer: String, into: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseConfig {
    /// `0` or absent means `200`.
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// A body template, possibly a `file://` reference.
    #[serde(default)]
    pub body: Option<String>,
    /// A JSON body template. Mutually exclusive with `body`.
    #[serde(default)]
    pub json: Option<Value>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

/// Parse a JSON document into mock definitions, in document order.
pub fn load_mocks(json: &str) -> Result<Vec<MockDefinition>, Error> {
    let file: MocksFile =
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid JSON: {}", e)))?;
    file.mocks
        .into_iter()
        .map(MockConfig::into_definition)
        .collect()
}

pub fn load_mocks_from_file(path: impl AsRef<Path>) -> Result<Vec<MockDefinition>, Error> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
    load_mocks(&json)
}

fn header_name(mock: &str, name: &str) -> Result<HeaderName, Error> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::Config(format!("mock `{}`: invalid header name `{}`", mock, name)))
}

fn header_value(mock: &str, value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::Config(format!("mock `{}`: invalid header value `{}`", mock, value)))
}

fn regex(mock: &str, pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern)
        .map_err(|e| Error::Config(format!("mock `{}`: invalid regex `{}`: {}", mock, pattern, e)))
}

impl MockConfig {
    /// Validate the configuration and turn it into a [`MockDefinition`].
    pub fn into_definition(self) -> Result<MockDefinition, Error> {
        let label = self.name.clone().unwrap_or_else(|| self.url.clone());
        let mut builder = MockDefinition::given(self.method, self.url).parse_form(self.parse_form);

        for check in self.checks {
            builder = match check {
                CheckConfig::Header { name, value } => builder.check(header(
                    header_name(&label, &name)?,
                    header_value(&label, &value)?,
                )),
                CheckConfig::HeaderExists { name } => {
                    builder.check(header_exists(header_name(&label, &name)?))
                }
                CheckConfig::HeaderRegex { name, pattern } => {
                    let name = header_name(&label, &name)?;
                    regex(&label, &pattern)?;
                    builder.check(header_regex(name, &pattern))
                }
                CheckConfig::QueryParam { name, value } => builder.check(query_param(name, value)),
                CheckConfig::BodyContains { value } => builder.check(body_string_contains(value)),
                CheckConfig::BodyJson { value } => builder.check(body_json(value)),
                CheckConfig::BodyPartialJson { value } => builder.check(body_partial_json(value)),
                CheckConfig::BodyRegex { pattern } => {
                    regex(&label, &pattern)?;
                    builder.check(body_regex(&pattern))
                }
                CheckConfig::BasicAuth { username, password } => {
                    builder.check(basic_auth(username, password))
                }
                CheckConfig::BearerToken { token } => {
                    header_value(&label, &format!("Bearer {}", token))?;
                    builder.check(bearer_token(token))
                }
            };
        }

        for rule in self.extract {
            let rule = match rule {
                ExtractConfig::Regex { source, pattern } => Extract::Regex {
                    source: match source {
                        SourceConfig::Body => Source::Body,
                        SourceConfig::Path => Source::Path,
                        SourceConfig::Header(name) => Source::Header(name),
                        SourceConfig::Query(name) => Source::Query(name),
                    },
                    pattern: regex(&label, &pattern)?,
                },
                ExtractConfig::JsonPointer { pointer, into } => {
                    Extract::json_pointer(pointer, into)
                }
            };
            builder = builder.extract(rule);
        }

        for (name, value) in self.vars {
            builder = builder.var(name, value);
        }
        for rule in self.mappings {
            builder = builder.mapping(rule);
        }

        let mut definition = builder.respond_with(self.response.into_template(&label)?);
        if let Some(name) = self.name {
            definition = definition.named(name);
        }
        if !self.enabled {
            definition = definition.disabled();
        }
        Ok(definition)
    }
}

impl ResponseConfig {
    fn into_template(self, mock: &str) -> Result<ResponseTemplate, Error> {
        let mut template = ResponseTemplate::new(self.status);
        template = match (self.body, self.json) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(format!(
                    "mock `{}`: `body` and `json` are mutually exclusive",
                    mock
                )))
            }
            (Some(body), None) => match &self.content_type {
                Some(mime) => template.set_body_raw(body, mime),
                None => template.set_body_string(body),
            },
            (None, Some(json)) => {
                let json = json.to_string();
                template.set_body_raw(
                    json,
                    self.content_type.as_deref().unwrap_or("application/json"),
                )
            }
            (None, None) => template,
        };
        for (name, value) in self.headers {
            template = template.append_header(name, value);
        }
        if let Some(delay) = self.delay_ms {
            template = template.set_delay(Duration::from_millis(delay));
        }
        Ok(template)
    }
}
