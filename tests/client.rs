use std::sync::Arc;
use std::time::{Duration, Instant};

use greynoise_provider::client::{
    ClientError, GreyNoiseClient, HttpResponse, PersonaSearchFilters, SensorSearchFilter,
    SensorSortBy, SensorUpdateRequest,
};
use greynoise_provider::testing::MockTransport;
use reqwest::StatusCode;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_ID: &str = "0b9a0f6e-43f1-4f7e-9d53-7b3f0c1f2a11";
const WORKSPACE_ID: &str = "25443a54-1e10-45e8-8164-c38aa238615e";

async fn server_with_account() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/account"))
        .and(header("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": USER_ID,
            "workspace_id": WORKSPACE_ID,
        })))
        .mount(&server)
        .await;
    server
}

async fn client_for(server: &MockServer) -> GreyNoiseClient {
    let base = Url::parse(&server.uri()).unwrap();
    GreyNoiseClient::builder("test-key").base_url(base).build().await.unwrap()
}

fn mock_client_transport() -> Arc<MockTransport> {
    Arc::new(MockTransport::with_account(
        USER_ID.parse().unwrap(),
        WORKSPACE_ID.parse().unwrap(),
    ))
}

async fn mock_client(mock: &Arc<MockTransport>) -> GreyNoiseClient {
    GreyNoiseClient::builder("test-key")
        .transport(mock.clone())
        .build()
        .await
        .unwrap()
}

fn persona_json() -> serde_json::Value {
    json!({
        "id": "87b5ee6c-7d24-4c5f-a0a7-0a2f3f9a8c21",
        "created_at": "2024-01-10T12:00:00Z",
        "updated_at": "2024-02-01T08:30:00Z",
        "name": "Cisco ASA",
        "author": "GreyNoise",
        "artifact_link": "",
        "tier": "community",
        "instance_management": "",
        "workspace": "",
        "categories": ["networking"],
        "description": "Cisco ASA firewall",
        "operating_system": "linux",
        "icon": "",
        "application_protocols": ["http", "https"],
        "ports": [80, 443],
        "associated_vulnerabilities": ["CVE-2020-3452"],
    })
}

#[tokio::test]
async fn test_build_resolves_account() {
    let server = server_with_account().await;
    let client = client_for(&server).await;

    assert_eq!(client.workspace_id(), WORKSPACE_ID.parse::<Uuid>().unwrap());
    assert_eq!(client.user_id(), USER_ID.parse::<Uuid>().unwrap());
}

#[tokio::test]
async fn test_build_fails_on_rejected_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/account"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = GreyNoiseClient::builder("bad-key")
        .base_url(Url::parse(&server.uri()).unwrap())
        .build()
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(err.to_string(), "invalid status code: 401, expected: 200");
}

#[tokio::test]
async fn test_get_persona() {
    let server = server_with_account().await;
    let id = "87b5ee6c-7d24-4c5f-a0a7-0a2f3f9a8c21";
    Mock::given(method("GET"))
        .and(path(format!("/v1/personas/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(persona_json()))
        .mount(&server)
        .await;

    let persona = assert_ok!(client_for(&server).await.get_persona(id).await);

    assert_eq!(persona.id, id);
    assert_eq!(persona.name, "Cisco ASA");
    assert_eq!(persona.tier, "community");
    assert_eq!(persona.categories, vec!["networking"]);
    assert_eq!(persona.application_protocols, vec!["http", "https"]);
    assert_eq!(persona.ports, vec![80, 443]);
    assert_eq!(persona.associated_vulnerabilities, vec!["CVE-2020-3452"]);
    assert_eq!(persona.operating_system, "linux");
    assert!(persona.created_at.is_some());
}

#[tokio::test]
async fn test_get_persona_malformed_body() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;
    mock.push_response(HttpResponse::new(StatusCode::OK, "{\"id\": "));

    let err = assert_err!(client.get_persona("abc").await);
    assert!(matches!(err, ClientError::Decode(_)));
}

#[tokio::test]
async fn test_get_persona_status_errors() {
    let server = server_with_account().await;
    Mock::given(method("GET"))
        .and(path("/v1/personas/forbidden"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/personas/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let client = client_for(&server).await;

    let err = assert_err!(client.get_persona("forbidden").await);
    assert!(matches!(err, ClientError::UnexpectedStatus { .. }));
    assert_eq!(err.status_code(), Some(StatusCode::FORBIDDEN));
    assert_eq!(err.to_string(), "invalid status code: 403, expected: 200");

    let err = assert_err!(client.get_persona("missing").await);
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_empty_ids_send_nothing() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;

    assert!(matches!(client.get_persona("").await, Err(ClientError::MissingField("id"))));
    assert!(matches!(client.get_sensor("").await, Err(ClientError::MissingField("id"))));
    let request = SensorUpdateRequest::default().with_name("edge-01");
    assert!(matches!(
        client.update_sensor("", &request).await,
        Err(ClientError::MissingField("id"))
    ));
    assert!(client
        .update_sensor("s1", &SensorUpdateRequest::default())
        .await
        .unwrap_err()
        .is_validation());

    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn test_search_personas_query() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;
    mock.push_response(HttpResponse::new(
        StatusCode::OK,
        json!({
            "items": [persona_json()],
            "pagination": {"page": 0, "page_size": 10, "total_items": 1},
        })
        .to_string(),
    ));

    let filters = PersonaSearchFilters {
        tiers: "community".into(),
        protocols: "http".into(),
        search: "rdp".into(),
        page_size: 10,
        ..Default::default()
    };
    let page = assert_ok!(client.search_personas(&filters).await);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.pagination.total_items, 1);

    let requests = mock.requests();
    let request = &requests[1];
    assert_eq!(request.url.path(), "/v1/personas");
    let query = format!(
        "page_size=10&protocols=http&search=rdp&tiers=community&workspace={}",
        WORKSPACE_ID
    );
    assert_eq!(request.url.query(), Some(query.as_str()));
}

#[tokio::test]
async fn test_search_personas_null_items() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;
    mock.push_response(HttpResponse::new(
        StatusCode::OK,
        json!({"items": null, "pagination": {"total_items": 0}}).to_string(),
    ));

    let page = assert_ok!(client.search_personas(&PersonaSearchFilters::default()).await);
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_search_sensors() {
    let server = server_with_account().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/workspaces/{}/sensors", WORKSPACE_ID)))
        .and(query_param("filter", "159.223.200.217"))
        .and(query_param("sort_by", "created_at"))
        .and(query_param("descending", "true"))
        .and(query_param("page", "0"))
        .and(query_param("page_size", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "sensor_id": "7d5e8a3f-1111-4222-8333-944455556666",
                "name": "edge-01",
                "public_ips": ["159.223.200.217"],
                "access_port": 55123,
                "persona": "87b5ee6c-7d24-4c5f-a0a7-0a2f3f9a8c21",
                "metadata": {"items": [{"access": "readonly", "name": "env", "val": "prod"}]},
                "status": "healthy",
                "disabled": false,
            }],
            "pagination": {"page": 0, "page_size": 1, "total_items": 1},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filter = SensorSearchFilter::new("159.223.200.217")
        .sorted_by(SensorSortBy::CreatedAt, true)
        .page(0, 1);
    let page = assert_ok!(client_for(&server).await.search_sensors(&filter).await);

    let sensor = &page.items[0];
    assert_eq!(sensor.id, "7d5e8a3f-1111-4222-8333-944455556666");
    assert_eq!(sensor.access_port, 55123);
    assert_eq!(sensor.metadata.items[0].val, "prod");
}

#[tokio::test]
async fn test_search_sensors_validates_before_sending() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;

    let err = assert_err!(client.search_sensors(&SensorSearchFilter::default()).await);
    assert!(matches!(err, ClientError::MissingField("filter")));

    let filter = SensorSearchFilter {
        filter: "edge".into(),
        sort_by: "hostname".into(),
        ..Default::default()
    };
    let err = assert_err!(client.search_sensors(&filter).await);
    assert!(err.is_validation());

    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn test_get_sensor_not_found() {
    let server = server_with_account().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/workspaces/{}/sensors/gone", WORKSPACE_ID)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = assert_err!(client_for(&server).await.get_sensor("gone").await);
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_update_sensor_name_only() {
    let server = server_with_account().await;
    Mock::given(method("PUT"))
        .and(path(format!("/v1/workspaces/{}/sensors/s1", WORKSPACE_ID)))
        .and(body_json(json!({"name": "edge-01"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let request = SensorUpdateRequest::default().with_name("edge-01");
    assert_ok!(client_for(&server).await.update_sensor("s1", &request).await);
}

#[tokio::test]
async fn test_update_sensor_expects_accepted() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;
    mock.push_response(HttpResponse::new(StatusCode::OK, ""));

    let request = SensorUpdateRequest::default().with_persona("p1");
    let err = assert_err!(client.update_sensor("s1", &request).await);
    assert_eq!(err.to_string(), "invalid status code: 200, expected: 202");

    let requests = mock.requests();
    let sent = &requests[1];
    assert_eq!(sent.method, reqwest::Method::PUT);
    assert_eq!(sent.body.as_deref(), Some(br#"{"persona":"p1"}"#.as_slice()));
}

#[tokio::test]
async fn test_ping() {
    let server = server_with_account().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .and(header("key", "test-key"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assert_ok!(client_for(&server).await.ping().await);
}

#[tokio::test]
async fn test_cancelled_client_sends_nothing() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;
    mock.push_response(HttpResponse::new(StatusCode::OK, ""));

    let token = CancellationToken::new();
    let cancellable = client.with_cancellation(token.clone());
    token.cancel();

    let err = assert_err!(cancellable.ping().await);
    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(mock.request_count(), 1);

    assert_ok!(client.ping().await);
}

#[tokio::test]
async fn test_transport_failure() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;

    let err = assert_err!(client.ping().await);
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(err.status_code(), None);
}

#[tokio::test]
async fn test_script_urls() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;
    let sensors = format!("https://api.greynoise.io/v1/workspaces/{}/sensors", WORKSPACE_ID);

    assert_eq!(client.sensors_url().unwrap().as_str(), sensors);
    assert_eq!(
        client.sensor_bootstrap_url().unwrap().as_str(),
        format!("{}/bootstrap/script", sensors)
    );
    assert_eq!(
        client.sensor_unbootstrap_url().unwrap().as_str(),
        format!("{}/unbootstrap/script", sensors)
    );
}

#[tokio::test]
async fn test_cancel_in_flight_request() {
    let server = server_with_account().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let client = client_for(&server).await.with_cancellation(token.clone());
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let started = Instant::now();
    let err = assert_err!(client.ping().await);
    assert!(matches!(err, ClientError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    canceller.await.unwrap();
}

#[tokio::test]
async fn test_ids_are_escaped_as_one_path_segment() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;
    mock.push_response(HttpResponse::new(StatusCode::OK, persona_json().to_string()));
    mock.push_response(HttpResponse::new(StatusCode::OK, json!({"sensor_id": "s1"}).to_string()));

    assert_ok!(client.get_persona("abc?tier=x").await);
    assert_ok!(client.get_sensor("s1/../metadata#x").await);

    let requests = mock.requests();
    assert_eq!(requests[1].url.path(), "/v1/personas/abc%3Ftier=x");
    assert_eq!(requests[1].url.query(), None);
    assert_eq!(
        requests[2].url.path(),
        format!("/v1/workspaces/{}/sensors/s1%2F..%2Fmetadata%23x", WORKSPACE_ID)
    );
    assert_eq!(requests[2].url.fragment(), None);
}

#[tokio::test]
async fn test_relative_path_ids_send_nothing() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;
    let request = SensorUpdateRequest::default().with_name("edge-01");

    for id in [".", ".."] {
        let err = assert_err!(client.get_persona(id).await);
        assert!(matches!(err, ClientError::InvalidField { field: "id", .. }));
        let err = assert_err!(client.get_sensor(id).await);
        assert!(matches!(err, ClientError::InvalidField { field: "id", .. }));
        let err = assert_err!(client.update_sensor(id, &request).await);
        assert!(err.is_validation());
    }

    assert_eq!(mock.request_count(), 1);
}

async fn call(client: &GreyNoiseClient, operation: &str) -> Result<(), ClientError> {
    match operation {
        "get_persona" => client.get_persona("p1").await.map(drop),
        "search_personas" => client
            .search_personas(&PersonaSearchFilters::default())
            .await
            .map(drop),
        "get_sensor" => client.get_sensor("s1").await.map(drop),
        "search_sensors" => client
            .search_sensors(&SensorSearchFilter::new("edge"))
            .await
            .map(drop),
        "update_sensor" => {
            let request = SensorUpdateRequest::default().with_name("edge-01");
            client.update_sensor("s1", &request).await
        }
        other => panic!("unknown operation {}", other),
    }
}

#[tokio::test]
async fn test_malformed_bodies_fail_to_decode() {
    let mock = mock_client_transport();
    let client = mock_client(&mock).await;

    for operation in ["get_persona", "search_personas", "get_sensor", "search_sensors"] {
        for body in ["{\"items\": [", "not json", "\"text\""] {
            mock.push_response(HttpResponse::new(StatusCode::OK, body));
            let err = assert_err!(call(&client, operation).await);
            assert!(
                matches!(err, ClientError::Decode(_)),
                "{} with body {:?} returned {:?}",
                operation,
                body,
                err
            );
        }
    }
}

#[tokio::test]
async fn test_build_fails_on_malformed_account() {
    for body in ["{\"user_id\": ", "{\"user_id\": \"not-a-uuid\", \"workspace_id\": 7}"] {
        let mock =
            Arc::new(MockTransport::new().with_response(HttpResponse::new(StatusCode::OK, body)));

        let err = GreyNoiseClient::builder("test-key")
            .transport(mock.clone())
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)), "{:?}", err);
        assert_eq!(mock.request_count(), 1);
    }
}

#[tokio::test]
async fn test_status_mapping_per_operation() {
    let cases = [
        ("get_persona", StatusCode::NOT_FOUND, None),
        ("get_sensor", StatusCode::NOT_FOUND, None),
        ("search_sensors", StatusCode::NOT_FOUND, None),
        ("update_sensor", StatusCode::NOT_FOUND, None),
        ("search_personas", StatusCode::NOT_FOUND, Some(StatusCode::OK)),
        ("search_personas", StatusCode::BAD_REQUEST, Some(StatusCode::OK)),
        ("search_sensors", StatusCode::INTERNAL_SERVER_ERROR, Some(StatusCode::OK)),
        ("update_sensor", StatusCode::OK, Some(StatusCode::ACCEPTED)),
    ];

    let mock = mock_client_transport();
    let client = mock_client(&mock).await;
    for (operation, status, expected) in cases {
        mock.push_response(HttpResponse::new(status, ""));
        let err = assert_err!(call(&client, operation).await);

        assert_eq!(err.status_code(), Some(status), "{}", operation);
        match expected {
            None => assert!(err.is_not_found(), "{} returned {:?}", operation, err),
            Some(expected) => assert!(
                matches!(&err, ClientError::UnexpectedStatus { expected: e, .. } if *e == expected),
                "{} returned {:?}",
                operation,
                err
            ),
        }
    }
}
