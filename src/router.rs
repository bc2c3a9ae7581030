//! Per-port dispatch of incoming requests by method and path template.
use crate::mock::MockId;
use http::Method;
use regex::Regex;

/// A path with named placeholders, e.g. `/users/{id}/orders/{order:[0-9]+}`.
///
/// A bare `{name}` matches a single path segment; `{name:regex}` matches `regex`.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    regex: Regex,
    names: Vec<String>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = if raw.is_empty() { "/" } else { raw };
        let mut pattern = String::from("^");
        let mut names = Vec::new();
        let mut rest = raw;

        while let Some(open) = rest.find('{') {
            pattern.push_str(&regex::escape(&rest[..open]));
            let close = find_closing_brace(&rest[open..])
                .ok_or_else(|| format!("unclosed placeholder at `{}`", &rest[open..]))?;
            let placeholder = &rest[open + 1..open + close];
            let (name, group) = match placeholder.split_once(':') {
                Some((name, custom)) => (name, custom.to_string()),
                None => (placeholder, "[^/]+".to_string()),
            };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(format!("invalid placeholder name `{}`", name));
            }
            if names.iter().any(|n| n == name) {
                return Err(format!("placeholder `{}` appears twice", name));
            }
            pattern.push_str(&format!("(?P<{}>{})", name, group));
            names.push(name.to_string());
            rest = &rest[open + close + 1..];
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| e.to_string())?;
        Ok(Self {
            raw: raw.to_string(),
            regex,
            names,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match `path`, returning the placeholder captures on success.
    pub fn captures(&self, path: &str) -> Option<Vec<(String, String)>> {
        let captures = self.regex.captures(path)?;
        Some(
            self.names
                .iter()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

// Offset of the brace closing the placeholder opened at `s[0]`, honouring nested braces used
// by regex quantifiers such as `{name:[0-9]{4}}`.
fn find_closing_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    template: PathTemplate,
    mock: MockId,
}

/// The routes of one server group, tried in registration order.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

/// A successful route lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub mock: MockId,
    pub captures: Vec<(String, String)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. If a route with the same method and path template already exists, the
    /// mock owning it is returned and nothing is added.
    pub fn add(
        &mut self,
        method: Method,
        template: PathTemplate,
        mock: MockId,
    ) -> Result<(), MockId> {
        if let Some(existing) = self
            .routes
            .iter()
            .find(|r| r.method == method && r.template.as_str() == template.as_str())
        {
            return Err(existing.mock);
        }
        self.routes.push(Route {
            method,
            template,
            mock,
        });
        Ok(())
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route.template.captures(path).map(|captures| RouteMatch {
                    mock: route.mock,
                    captures,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(raw: &str) -> PathTemplate {
        PathTemplate::parse(raw).unwrap()
    }

    #[test]
    fn placeholders_capture_single_segments() {
        let t = template("/users/{id}/orders/{order}");
        assert_eq!(
            t.captures("/users/42/orders/abc"),
            Some(vec![
                ("id".to_string(), "42".to_string()),
                ("order".to_string(), "abc".to_string())
            ])
        );
        assert_eq!(t.captures("/users/42/orders/abc/extra"), None);
        assert_eq!(t.captures("/users/4/2/orders/abc"), None);
    }

    #[test]
    fn custom_patterns_are_honoured() {
        let t = template("/years/{year:[0-9]{4}}/{rest:.*}");
        assert_eq!(
            t.captures("/years/2024/a/b"),
            Some(vec![
                ("year".to_string(), "2024".to_string()),
                ("rest".to_string(), "a/b".to_string())
            ])
        );
        assert_eq!(t.captures("/years/24/a"), None);
    }

    #[test]
    fn literal_segments_are_escaped() {
        let t = template("/v1.0/items");
        assert!(t.captures("/v1.0/items").is_some());
        assert!(t.captures("/v1x0/items").is_none());
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert!(PathTemplate::parse("/users/{id").is_err());
        assert!(PathTemplate::parse("/users/{}").is_err());
        assert!(PathTemplate::parse("/a/{x}/{x}").is_err());
        assert!(PathTemplate::parse("/a/{x:(}").is_err());
    }

    #[test]
    fn router_dispatches_on_method_and_path() {
        let mut router = Router::new();
        router
            .add(Method::GET, template("/users/{id}"), MockId(0))
            .unwrap();
        router
            .add(Method::POST, template("/users/{id}"), MockId(1))
            .unwrap();

        let hit = router.lookup(&Method::POST, "/users/7").unwrap();
        assert_eq!(hit.mock, MockId(1));
        assert_eq!(hit.captures, vec![("id".to_string(), "7".to_string())]);
        assert!(router.lookup(&Method::DELETE, "/users/7").is_none());
        assert!(router.lookup(&Method::GET, "/users").is_none());
    }

    #[test]
    fn duplicate_routes_are_refused() {
        let mut router = Router::new();
        router
            .add(Method::GET, template("/users/{id}"), MockId(0))
            .unwrap();
        assert_eq!(
            router.add(Method::GET, template("/users/{id}"), MockId(3)),
            Err(MockId(0))
        );
        assert!(router
            .add(Method::GET, template("/users/{name}"), MockId(4))
            .is_ok());
    }
}
