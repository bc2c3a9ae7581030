//! Rules pulling variables out of a captured request.
use crate::checks::capture_vars;
use crate::Request;
use log::debug;
use regex::Regex;
use serde_json::Value;

/// Where a regex extraction rule looks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Body,
    Path,
    Header(String),
    Query(String),
}

/// An extraction rule. Its results land in the extraction layer of the
/// [`VariableScope`](crate::VariableScope).
#[derive(Debug, Clone)]
pub enum Extract {
    /// Every named capture group of `pattern` becomes a variable.
    Regex { source: Source, pattern: Regex },
    /// The value found at a JSON pointer (RFC 6901) in the body, bound to `into`.
    /// Strings are bound verbatim, any other JSON value is bound serialized.
    JsonPointer { pointer: String, into: String },
}

impl Extract {
    /// Panics if `pattern` is not a valid regular expression.
    pub fn regex(source: Source, pattern: &str) -> Self {
        Self::Regex {
            source,
            pattern: Regex::new(pattern).expect("Failed to create regex for extraction rule"),
        }
    }

    pub fn json_pointer(pointer: impl Into<String>, into: impl Into<String>) -> Self {
        Self::JsonPointer {
            pointer: pointer.into(),
            into: into.into(),
        }
    }

    /// Apply the rule. A rule that finds nothing contributes no variable.
    pub fn apply(&self, request: &Request) -> Vec<(String, String)> {
        match self {
            Extract::Regex { source, pattern } => {
                let Some(haystack) = read_source(source, request) else {
                    debug!("Extraction source {:?} is absent from the request.", source);
                    return Vec::new();
                };
                match pattern.captures(&haystack) {
                    Some(captures) => capture_vars(pattern, &captures),
                    None => Vec::new(),
                }
            }
            Extract::JsonPointer { pointer, into } => {
                let Ok(body) = request.body_json::<Value>() else {
                    return Vec::new();
                };
                match body.pointer(pointer) {
                    Some(Value::String(s)) => vec![(into.clone(), s.clone())],
                    Some(other) => vec![(into.clone(), other.to_string())],
                    None => Vec::new(),
                }
            }
        }
    }
}

fn read_source(source: &Source, request: &Request) -> Option<String> {
    match source {
        Source::Body => Some(String::from_utf8_lossy(&request.body).into_owned()),
        Source::Path => Some(request.url.path().to_string()),
        Source::Header(name) => request
            .headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        Source::Query(name) => request
            .url
            .query_pairs()
            .find(|(k, _)| k == name.as_str())
            .map(|(_, v)| v.into_owned()),
    }
}

/// Apply every rule in order; later rules overwrite earlier ones on name clashes once merged
/// into a scope.
pub(crate) fn extract_all(rules: &[Extract], request: &Request) -> Vec<(String, String)> {
    rules.iter().flat_map(|rule| rule.apply(request)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method};
    use url::Url;

    fn request() -> Request {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace", "trace-77".parse().unwrap());
        Request {
            url: Url::parse("http://localhost/orders/9?sort=desc").unwrap(),
            method: Method::POST,
            headers,
            body: br#"{"user": {"id": 12, "name": "ada"}}"#.to_vec(),
        }
    }

    #[test]
    fn regex_rules_read_each_source() {
        let request = request();
        assert_eq!(
            Extract::regex(Source::Header("x-trace".into()), r"trace-(?P<trace>\d+)")
                .apply(&request),
            vec![("trace".to_string(), "77".to_string())]
        );
        assert_eq!(
            Extract::regex(Source::Query("sort".into()), r"(?P<order>.+)").apply(&request),
            vec![("order".to_string(), "desc".to_string())]
        );
        assert_eq!(
            Extract::regex(Source::Path, r"/orders/(?P<order_id>\d+)").apply(&request),
            vec![("order_id".to_string(), "9".to_string())]
        );
        assert!(Extract::regex(Source::Header("absent".into()), r"(?P<x>.*)")
            .apply(&request)
            .is_empty());
    }

    #[test]
    fn json_pointer_binds_strings_verbatim_and_serializes_the_rest() {
        let request = request();
        let rules = vec![
            Extract::json_pointer("/user/name", "name"),
            Extract::json_pointer("/user/id", "id"),
            Extract::json_pointer("/user/missing", "missing"),
        ];
        assert_eq!(
            extract_all(&rules, &request),
            vec![
                ("name".to_string(), "ada".to_string()),
                ("id".to_string(), "12".to_string())
            ]
        );
    }
}
