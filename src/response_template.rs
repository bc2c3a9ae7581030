use serde::Serialize;
use std::time::Duration;

/// The blueprint for the response rendered by a stand-in when one of its [`MockDefinition`]s
/// is called.
///
/// Header values and string bodies are templates: every `{{name}}` placeholder is replaced
/// with the matching variable of the request's [`VariableScope`] when the response is
/// rendered. A body that renders to `file://<reference>` is replaced by the content the
/// configured [`ResourceLoader`] returns for `<reference>`.
///
/// [`MockDefinition`]: crate::MockDefinition
/// [`VariableScope`]: crate::VariableScope
/// [`ResourceLoader`]: crate::loader::ResourceLoader
#[derive(Clone, Debug, Default)]
pub struct ResponseTemplate {
    mime: String,
    status_code: u16,
    headers: Vec<(String, String)>,
    body: Option<BodyTemplate>,
    delay: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BodyTemplate {
    /// Rendered through variable substitution.
    Text(String),
    /// Sent verbatim.
    Bytes(Vec<u8>),
}

// Header names and values are only validated once rendered: a value such as `{{token}}` is
// not a meaningful header until the scope is known. Invalid results turn into a 500 response
// and an error report rather than a panic.
impl ResponseTemplate {
    /// Start building a `ResponseTemplate` specifying the status code of the response.
    ///
    /// `0` stands for "unset": the rendered response defaults to `200 OK`.
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            ..Self::default()
        }
    }

    /// Append a header `value` to the list of headers with `key` as header name.
    ///
    /// Unlike `insert_header`, this function will not override the contents of a header.
    pub fn append_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Insert a header `value` with `key` as header name, dropping any value previously set
    /// for `key`.
    ///
    /// ### Example:
    /// ```rust
    /// use standin::ResponseTemplate;
    ///
    /// let template = ResponseTemplate::new(201)
    ///     .insert_header("Location", "/users/{{id}}")
    ///     .insert_header("X-Correlation-ID", "{{correlation_id}}");
    /// ```
    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&key));
        self.headers.push((key, value.into()));
        self
    }

    /// Append multiple header key-value pairs.
    ///
    /// Existing header values will not be overridden.
    pub fn append_headers<K, V, I>(mut self, headers: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the response body with bytes. Byte bodies are never templated.
    ///
    /// It sets "Content-Type" to "application/octet-stream".
    pub fn set_body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(BodyTemplate::Bytes(body.into()));
        self.mime = "application/octet-stream".to_string();
        self
    }

    /// Set the response body from a JSON-serializable value.
    ///
    /// The serialized JSON is a template: string fields may carry `{{name}}` placeholders.
    /// It sets "Content-Type" to "application/json".
    pub fn set_body_json<B: Serialize>(mut self, body: B) -> Self {
        let body = serde_json::to_string(&body).expect("Failed to convert into body.");
        self.body = Some(BodyTemplate::Text(body));
        self.mime = "application/json".to_string();
        self
    }

    /// Set the response body template.
    ///
    /// It sets "Content-Type" to "text/plain".
    pub fn set_body_string(mut self, body: impl Into<String>) -> Self {
        self.body = Some(BodyTemplate::Text(body.into()));
        self.mime = "text/plain".to_string();
        self
    }

    /// Set a body template with an explicit mime type.
    ///
    /// ### Example:
    /// ```rust
    /// use standin::ResponseTemplate;
    ///
    /// // Rendered from a file chosen by the `id` path placeholder.
    /// let template = ResponseTemplate::new(200)
    ///     .set_body_raw("file://fixtures/users/{{id}}.json", "application/json");
    /// ```
    pub fn set_body_raw(mut self, body: impl Into<String>, mime: &str) -> Self {
        self.body = Some(BodyTemplate::Text(body.into()));
        self.mime = mime.to_string();
        self
    }

    /// By default stand-ins answer as fast as possible.
    ///
    /// You can use `set_delay` to introduce an artificial delay to simulate the behaviour of
    /// a real server with a non-negligible latency, e.g. to exercise timeout policies.
    pub fn set_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub(crate) fn mime(&self) -> &str {
        &self.mime
    }

    pub(crate) fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub(crate) fn body(&self) -> Option<&BodyTemplate> {
        self.body.as_ref()
    }

    pub(crate) fn delay(&self) -> Option<Duration> {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_header_replaces_previous_values_case_insensitively() {
        let template = ResponseTemplate::new(200)
            .append_header("x-a", "1")
            .append_header("X-A", "2")
            .append_header("x-b", "3")
            .insert_header("X-a", "4");
        assert_eq!(
            template.headers(),
            &[
                ("x-b".to_string(), "3".to_string()),
                ("X-a".to_string(), "4".to_string())
            ]
        );
    }

    #[test]
    fn body_setters_pick_the_mime_type() {
        let json = ResponseTemplate::new(0).set_body_json(json!({"id": "{{id}}"}));
        assert_eq!(json.mime(), "application/json");
        assert_eq!(
            json.body(),
            Some(&BodyTemplate::Text(r#"{"id":"{{id}}"}"#.to_string()))
        );

        let bytes = ResponseTemplate::new(0).set_body_bytes(vec![0u8, 159]);
        assert_eq!(bytes.mime(), "application/octet-stream");
        assert_eq!(bytes.body(), Some(&BodyTemplate::Bytes(vec![0u8, 159])));

        assert!(ResponseTemplate::new(204).body().is_none());
    }
}
