use std::time::Duration;

use games_query_contract::{
    probe::{BasicAuth, HttpProbe, Probe, ProbeError},
    rules::catalog::GAMES_PATH,
};
use reqwest::StatusCode;
use tokio::net::TcpListener;

use super::support::{GamesStub, StubBehavior};

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let probe = HttpProbe::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let err = probe.probe(GAMES_PATH, &[]).await.unwrap_err();
    assert!(matches!(err, ProbeError::Transport { .. }), "got {err:?}");
}

#[tokio::test]
async fn slow_service_is_reported_as_timeout() {
    let stub = GamesStub::spawn_with(StubBehavior {
        delay: Some(Duration::from_millis(500)),
        ..StubBehavior::default()
    })
    .await;
    let probe = HttpProbe::new(stub.base_url(), Duration::from_millis(50)).unwrap();

    let err = probe.probe(GAMES_PATH, &[]).await.unwrap_err();
    match err {
        ProbeError::Timeout { url, timeout } => {
            assert!(url.ends_with("/api/games/"));
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn baseline_request_has_no_query_string() {
    let stub = GamesStub::spawn().await;
    let probe = HttpProbe::new(stub.base_url(), Duration::from_secs(5)).unwrap();

    let response = probe.probe(GAMES_PATH, &[]).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(stub.raw_queries(), vec![String::new()]);
    assert_eq!(
        response.body.json().and_then(|body| body.as_array()).map(Vec::len),
        Some(5)
    );
}

#[tokio::test]
async fn configured_credentials_are_sent_as_basic_auth() {
    let stub = GamesStub::spawn().await;
    let probe = HttpProbe::new(stub.base_url(), Duration::from_secs(5))
        .unwrap()
        .with_basic_auth(Some(BasicAuth {
            username: "admin".into(),
            password: "secret".into(),
        }));

    probe.probe(GAMES_PATH, &[]).await.unwrap();
    // base64("admin:secret")
    assert_eq!(
        stub.last_authorization().as_deref(),
        Some("Basic YWRtaW46c2VjcmV0")
    );

    let anonymous = HttpProbe::new(stub.base_url(), Duration::from_secs(5)).unwrap();
    anonymous.probe(GAMES_PATH, &[]).await.unwrap();
    assert_eq!(stub.last_authorization(), None);
}

#[tokio::test]
async fn reserved_characters_are_percent_encoded() {
    let stub = GamesStub::spawn().await;
    let probe = HttpProbe::new(stub.base_url(), Duration::from_secs(5)).unwrap();
    let query = vec![("search".to_string(), "a&b=c".to_string())];

    let response = probe.probe(GAMES_PATH, &query).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(stub.raw_queries(), vec!["search=a%26b%3Dc".to_string()]);
}
