use reqwest::Client;
use standin::{MockDefinition, MockServer, ResponseTemplate};

// The servers run on their own thread and runtime: whichever runtime drives the handle, and
// however many are involved, must not matter.

fn health() -> MockDefinition {
    MockDefinition::given("GET", "http://127.0.0.1:0/")
        .respond_with(ResponseTemplate::new(200))
}

#[tokio::test]
async fn hello_reqwest() {
    let server = MockServer::builder().register(health()).serve().await.unwrap();

    let resp = Client::new().get(server.uri(0).unwrap()).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    server.verify().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn hello_reqwest_multi_thread() {
    let server = MockServer::builder().register(health()).serve().await.unwrap();

    let resp = Client::new().get(server.uri(0).unwrap()).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    server.verify().await;
}

#[tokio::test]
async fn hello_reqwest_http2() {
    let server = MockServer::builder().register(health()).serve().await.unwrap();

    let resp = Client::builder()
        .http2_prior_knowledge()
        .build()
        .expect("http client")
        .get(server.uri(0).unwrap())
        .send()
        .await
        .expect("response");

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.version(), reqwest::Version::HTTP_2);
    server.verify().await;
}

#[test]
fn the_handle_outlives_the_runtime_that_started_the_servers() {
    let starting = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let server = starting.block_on(async {
        MockServer::builder()
            .register(health())
            .serve()
            .await
            .unwrap()
    });
    drop(starting);

    let analysing = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    analysing.block_on(async {
        let resp = Client::new().get(server.uri(0).unwrap()).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        server.verify().await;
    });
}

#[test]
fn dropping_the_handle_stops_the_servers() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let address = runtime.block_on(async {
        let server = MockServer::builder().register(health()).serve().await.unwrap();
        *server.address(0).unwrap()
    });

    // Shutting down is asynchronous: give the serving thread a moment.
    let mut refused = false;
    for _ in 0..50 {
        if std::net::TcpStream::connect(address).is_err() {
            refused = true;
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    assert!(refused);
}
