use reqwest::StatusCode;
use serde_json::json;
use standin::config::{load_mocks, load_mocks_from_file};
use standin::loader::FsLoader;
use standin::{Error, MockServer, ReportStatus};

mod common;

fn document(port: u16) -> String {
    json!({
        "mocks": [
            {
                "name": "get user",
                "method": "GET",
                "url": format!("http://127.0.0.1:{}/users/{{id}}", port),
                "checks": [{ "type": "header", "name": "accept", "value": "application/json" }],
                "extract": [
                    { "type": "regex", "source": { "header": "x-trace" }, "pattern": "(?P<trace>.+)" }
                ],
                "vars": { "region": "eu" },
                "mappings": [{ "vars": ["id", "tier"], "table": ["1", "gold", "*", "bronze"] }],
                "response": {
                    "headers": { "x-trace": "{{trace}}" },
                    "json": { "id": "{{id}}", "tier": "{{tier}}", "region": "{{region}}" }
                }
            },
            {
                "name": "create user",
                "method": "POST",
                "url": format!("http://127.0.0.1:{}/users", port),
                "checks": [{ "type": "body_partial_json", "value": { "name": "ada" } }],
                "response": { "status": 201, "body": "file://created.json", "content_type": "application/json" }
            },
            {
                "name": "legacy",
                "method": "GET",
                "url": format!("http://127.0.0.1:{}/legacy", port),
                "enabled": false
            }
        ]
    })
    .to_string()
}

#[tokio::test]
async fn mocks_loaded_from_json_are_served() {
    // Arrange
    let fixtures = tempfile::tempdir().unwrap();
    std::fs::write(fixtures.path().join("created.json"), r#"{"created":true}"#).unwrap();
    let (listener, port) = common::free_listener();
    let mocks = load_mocks(&document(port)).unwrap();
    assert_eq!(mocks.len(), 3);

    let server = MockServer::builder()
        .listener(port, listener)
        .loader(FsLoader::new(fixtures.path()))
        .register_all(mocks)
        .serve()
        .await
        .unwrap();
    let uri = server.uri(port).unwrap();
    let client = reqwest::Client::new();

    // Act
    let user = client
        .get(format!("{}/users/1", uri))
        .header("accept", "application/json")
        .header("x-trace", "t-1")
        .send()
        .await
        .unwrap();
    let created = client
        .post(format!("{}/users", uri))
        .json(&json!({"name": "bob"}))
        .send()
        .await
        .unwrap();
    let legacy = client.get(format!("{}/legacy", uri)).send().await.unwrap();

    // Assert
    assert_eq!(user.status(), StatusCode::OK);
    assert_eq!(user.headers()["x-trace"], "t-1");
    assert_eq!(user.headers()["content-type"], "application/json");
    let body: serde_json::Value = user.json().await.unwrap();
    assert_eq!(body, json!({"id": "1", "tier": "gold", "region": "eu"}));

    assert_eq!(created.status(), StatusCode::CREATED);
    let body: serde_json::Value = created.json().await.unwrap();
    assert_eq!(body, json!({"created": true}));

    assert_eq!(legacy.status(), StatusCode::NOT_FOUND);

    let reports = server.analyse().await;
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].mock_name(), Some("get user"));
    assert_eq!(reports[0].status, ReportStatus::Pass);
    assert_eq!(reports[1].mock_name(), Some("create user"));
    assert_eq!(reports[1].status, ReportStatus::Fail);
    assert_eq!(reports[2].mock_name(), None);
}

#[tokio::test]
async fn mocks_can_be_loaded_from_a_file() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mocks.json");
    std::fs::write(&path, document(8080)).unwrap();

    // Act
    let mocks = load_mocks_from_file(&path).unwrap();

    // Assert
    let names = mocks.iter().map(|m| m.name()).collect::<Vec<_>>();
    assert_eq!(names, vec![Some("get user"), Some("create user"), Some("legacy")]);
    assert!(!mocks[2].is_enabled());
}

#[test]
fn missing_files_are_configuration_errors() {
    let result = load_mocks_from_file("does/not/exist.json");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn unknown_fields_are_rejected() {
    let result = load_mocks(
        r#"{ "mocks": [{ "method": "GET", "url": "http://localhost/", "colour": "red" }] }"#,
    );
    assert!(matches!(result, Err(Error::Config(_))));
}
