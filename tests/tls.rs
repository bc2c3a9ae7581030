use reqwest::StatusCode;
use standin::{Error, MockDefinition, MockServer, ResponseTemplate};

mod common;

use common::TestCertificates;

fn secure_mock() -> MockDefinition {
    MockDefinition::given("GET", "https://127.0.0.1:0/secure")
        .respond_with(ResponseTemplate::new(200).set_body_string("over tls"))
}

#[tokio::test]
async fn https_mocks_present_the_configured_certificate() {
    // Arrange
    let certs = TestCertificates::generate();
    let server = MockServer::builder()
        .tls_pem(certs.server_cert_pem.clone(), certs.server_key_pem.clone())
        .register(secure_mock())
        .serve()
        .await
        .unwrap();
    let uri = server.uri(0).unwrap();
    let port = server.address(0).unwrap().port();
    assert_eq!(uri, format!("https://127.0.0.1:{}", port));

    // Act
    let response = certs
        .client()
        .get(format!("{}/secure", uri))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "over tls");
    let reports = server.analyse().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_pass());
    assert_eq!(
        reports[0].request.as_ref().unwrap().url.scheme(),
        "https"
    );
}

#[tokio::test]
async fn untrusted_clients_fail_the_handshake() {
    // Arrange
    let certs = TestCertificates::generate();
    let server = MockServer::builder()
        .tls_pem(certs.server_cert_pem.clone(), certs.server_key_pem.clone())
        .register(secure_mock())
        .serve()
        .await
        .unwrap();

    // A client trusting a different CA.
    let client = TestCertificates::generate().client();

    // Act
    let result = client
        .get(format!("{}/secure", server.uri(0).unwrap()))
        .send()
        .await;

    // Assert
    assert!(result.is_err());
    // The failed handshake never reached a mock.
    let reports = server.analyse().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].request.is_none());
}

#[tokio::test]
async fn tls_material_can_be_read_from_files() {
    // Arrange
    let certs = TestCertificates::generate();
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("server.crt");
    let key_path = dir.path().join("server.key");
    std::fs::write(&cert_path, &certs.server_cert_pem).unwrap();
    std::fs::write(&key_path, &certs.server_key_pem).unwrap();

    let server = MockServer::builder()
        .tls_files(cert_path, key_path)
        .register(secure_mock())
        .serve()
        .await
        .unwrap();

    // Act
    let status = certs
        .client()
        .get(format!("{}/secure", server.uri(0).unwrap()))
        .send()
        .await
        .unwrap()
        .status();

    // Assert
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn http2_is_negotiated_over_tls() {
    // Arrange
    let certs = TestCertificates::generate();
    let server = MockServer::builder()
        .tls_pem(certs.server_cert_pem.clone(), certs.server_key_pem.clone())
        .register(secure_mock())
        .serve()
        .await
        .unwrap();

    // Act
    let response = certs
        .client()
        .get(format!("{}/secure", server.uri(0).unwrap()))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.version(), reqwest::Version::HTTP_2);
}

#[tokio::test]
async fn https_mocks_without_tls_material_are_rejected() {
    let result = MockServer::builder().register(secure_mock()).serve().await;
    assert!(matches!(result, Err(Error::MissingTlsMaterial { port: 0 })));
}

#[tokio::test]
async fn invalid_tls_material_is_rejected() {
    let result = MockServer::builder()
        .tls_pem("not a certificate", "not a key")
        .register(secure_mock())
        .serve()
        .await;
    assert!(matches!(result, Err(Error::InvalidTlsMaterial(_))));
}

#[tokio::test]
async fn a_port_cannot_mix_https_and_http_mocks() {
    // Arrange
    let certs = TestCertificates::generate();

    // Act
    let result = MockServer::builder()
        .tls_pem(certs.server_cert_pem.clone(), certs.server_key_pem.clone())
        .register(secure_mock().named("secure"))
        .register(
            MockDefinition::given("GET", "http://127.0.0.1:0/plain")
                .respond_with(ResponseTemplate::new(200))
                .named("plain"),
        )
        .serve()
        .await;

    // Assert
    match result {
        Err(Error::MixedTls {
            port,
            tls_mock,
            plain_mock,
        }) => {
            assert_eq!(port, 0);
            assert_eq!(tls_mock, "secure");
            assert_eq!(plain_mock, "plain");
        }
        other => panic!("expected a mixed TLS error, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn https_and_http_groups_run_side_by_side() {
    // Arrange
    let certs = TestCertificates::generate();
    let (plain, plain_port) = common::free_listener();
    let server = MockServer::builder()
        .tls_pem(certs.server_cert_pem.clone(), certs.server_key_pem.clone())
        .listener(plain_port, plain)
        .register(secure_mock())
        .register(
            MockDefinition::given("GET", format!("http://127.0.0.1:{}/plain", plain_port))
                .respond_with(ResponseTemplate::new(200)),
        )
        .serve()
        .await
        .unwrap();
    let client = certs.client();

    // Act
    let secure = client
        .get(format!("{}/secure", server.uri(0).unwrap()))
        .send()
        .await
        .unwrap();
    let plain = client
        .get(format!("{}/plain", server.uri(plain_port).unwrap()))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(secure.status(), StatusCode::OK);
    assert_eq!(plain.status(), StatusCode::OK);
    assert!(server.uri(plain_port).unwrap().starts_with("http://"));
    server.verify().await;
}
