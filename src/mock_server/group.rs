//! Partitioning mock definitions into one server group per port.
use crate::error::Error;
use crate::mock::{MockDefinition, MockId, ResolvedRoute};
use crate::router::Router;
use log::debug;

/// A mock definition after registration: its identifier, display name and routing facts.
#[derive(Debug)]
pub(crate) struct Registered {
    pub(crate) id: MockId,
    pub(crate) name: String,
    pub(crate) definition: MockDefinition,
    pub(crate) route: ResolvedRoute,
}

impl Registered {
    /// Name and resolve the `index`-th registered definition.
    pub(crate) fn new(index: usize, definition: MockDefinition) -> Result<Self, Error> {
        let id = MockId(index);
        let name = definition
            .name
            .clone()
            .unwrap_or_else(|| format!("Mock {}", id));
        let route = definition.resolve(&name)?;
        Ok(Self {
            id,
            name,
            definition,
            route,
        })
    }
}

/// The enabled mocks bound to one port.
#[derive(Debug)]
pub(crate) struct ServerGroup {
    pub(crate) port: u16,
    pub(crate) tls: bool,
    pub(crate) mocks: Vec<MockId>,
    pub(crate) router: Router,
}

/// Group the enabled mocks by port, in order of first appearance.
///
/// A group takes its TLS-ness from its first mock: any later mock disagreeing with it fails
/// the whole plan, as does a second mock routing an identical method and path template.
pub(crate) fn plan(mocks: &[Registered]) -> Result<Vec<ServerGroup>, Error> {
    let mut groups: Vec<ServerGroup> = Vec::new();

    for mock in mocks.iter().filter(|m| m.definition.enabled) {
        let route = &mock.route;
        let index = match groups.iter().position(|g| g.port == route.port) {
            Some(index) => index,
            None => {
                groups.push(ServerGroup {
                    port: route.port,
                    tls: route.tls,
                    mocks: Vec::new(),
                    router: Router::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[index];

        if group.tls != route.tls {
            let first = &mocks[group.mocks[0].0].name;
            let (tls_mock, plain_mock) = if group.tls {
                (first.clone(), mock.name.clone())
            } else {
                (mock.name.clone(), first.clone())
            };
            return Err(Error::MixedTls {
                port: group.port,
                tls_mock,
                plain_mock,
            });
        }

        if let Err(existing) = group
            .router
            .add(route.method.clone(), route.template.clone(), mock.id)
        {
            return Err(Error::DuplicateRoute {
                port: group.port,
                method: route.method.to_string(),
                path: route.template.as_str().to_string(),
                first: mocks[existing.0].name.clone(),
                second: mock.name.clone(),
            });
        }
        group.mocks.push(mock.id);
    }

    for group in &groups {
        debug!(
            "Port {} ({}) serves {} mock(s).",
            group.port,
            if group.tls { "https" } else { "http" },
            group.mocks.len()
        );
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResponseTemplate;

    fn registered(definitions: Vec<MockDefinition>) -> Vec<Registered> {
        definitions
            .into_iter()
            .enumerate()
            .map(|(i, d)| Registered::new(i, d).unwrap())
            .collect()
    }

    fn mock(method: &str, url: &str) -> MockDefinition {
        MockDefinition::given(method, url).respond_with(ResponseTemplate::new(200))
    }

    #[test]
    fn mocks_are_grouped_by_port() {
        let mocks = registered(vec![
            mock("GET", "http://localhost:8001/a"),
            mock("GET", "https://localhost:8002/a"),
            mock("POST", "http://localhost:8001/a"),
            mock("GET", "http://localhost:8001/b").disabled(),
        ]);
        let groups = plan(&mocks).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].port, 8001);
        assert!(!groups[0].tls);
        assert_eq!(groups[0].mocks, vec![MockId(0), MockId(2)]);
        assert_eq!(groups[1].port, 8002);
        assert!(groups[1].tls);
    }

    #[test]
    fn mixing_tls_on_a_port_is_rejected() {
        let mocks = registered(vec![
            mock("GET", "http://localhost:8001/a").named("plain"),
            mock("GET", "https://localhost:8001/b").named("secure"),
        ]);
        match plan(&mocks) {
            Err(Error::MixedTls {
                port,
                tls_mock,
                plain_mock,
            }) => {
                assert_eq!(port, 8001);
                assert_eq!(tls_mock, "secure");
                assert_eq!(plain_mock, "plain");
            }
            other => panic!("unexpected plan: {:?}", other.map(|g| g.len())),
        }
    }

    #[test]
    fn disabled_mocks_do_not_take_part_in_validation() {
        let mocks = registered(vec![
            mock("GET", "http://localhost:8001/a"),
            mock("GET", "https://localhost:8001/b").disabled(),
            mock("GET", "http://localhost:8001/a").disabled(),
        ]);
        assert_eq!(plan(&mocks).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let mocks = registered(vec![
            mock("GET", "http://localhost:8001/users/{id}"),
            mock("get", "http://localhost:8001/users/{id}"),
        ]);
        match plan(&mocks) {
            Err(Error::DuplicateRoute { first, second, .. }) => {
                assert_eq!(first, "Mock #0");
                assert_eq!(second, "Mock #1");
            }
            other => panic!("unexpected plan: {:?}", other.map(|g| g.len())),
        }
    }
}
