//! RevalidatingClient built from configuration, against a mock HTTP service.
#![cfg(feature = "http")]

use revalidate_client::error::ErrorKind;
use revalidate_client::{Outcome, RevalidatingClient};
use revalidate_config::{Config, RetryConfig, StoreConfig};
use revalidate_store::{CollectionLocator, DocumentId, ETag};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COLLECTION: &str = "dbs/demo/colls/customers";
const SELF_LINK: &str = "dbs/demo/colls/customers/docs/c1";

fn config(server: &MockServer, max_attempts: u32) -> Config {
    Config {
        store: StoreConfig {
            name: "documents".to_string(),
            endpoint: server.uri(),
            token: Some("test-token".to_string()),
            timeout_secs: 5,
        },
        retry: RetryConfig {
            max_attempts,
            base_backoff_ms: 1,
            max_backoff_ms: 2,
            attempt_timeout_ms: None,
        },
    }
}

fn customers() -> CollectionLocator {
    CollectionLocator::new(COLLECTION).unwrap()
}

fn c1() -> DocumentId {
    DocumentId::new("c1").unwrap()
}

async fn mount_unavailable(server: &MockServer, verb: &str, route: String, times: u64) {
    Mock::given(method(verb))
        .and(path(route))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(times)
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_from_config_retries_and_revalidates() {
    let server = MockServer::start().await;

    mount_unavailable(&server, "POST", format!("/{COLLECTION}/docs/query"), 2).await;
    Mock::given(method("POST"))
        .and(path(format!("/{COLLECTION}/docs/query")))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Documents": [{"id": "c1", "name": "Demo", "_etag": "\"v0\"", "_self": SELF_LINK}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    mount_unavailable(&server, "GET", format!("/{SELF_LINK}"), 2).await;
    Mock::given(method("GET"))
        .and(path(format!("/{SELF_LINK}")))
        .and(header("if-none-match", "\"v0\""))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let client = RevalidatingClient::from_config(&config(&server, 3)).unwrap();
    assert_eq!(client.store().name(), "documents");

    let (loaded, outcome) = client.get_document_with_outcome(&customers(), &c1()).await.unwrap();
    assert_eq!(outcome, Outcome::Loaded);
    assert_eq!(loaded.etag, ETag::new("\"v0\""));
    assert_eq!(loaded.payload, json!({"name": "Demo"}));
    assert_eq!(client.cache().len().await, 1);

    let (revalidated, outcome) = client.get_document_with_outcome(&customers(), &c1()).await.unwrap();
    assert_eq!(outcome, Outcome::Unchanged);
    assert_eq!(revalidated, loaded);
}

#[tokio::test]
async fn test_from_config_gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    mount_unavailable(&server, "POST", format!("/{COLLECTION}/docs/query"), 2).await;

    let client = RevalidatingClient::from_config(&config(&server, 2)).unwrap();
    let err = client.get_document_by_id(&customers(), &c1()).await.unwrap_err();
    assert_eq!(*err, ErrorKind::TransientRemoteFailure);
    assert!(client.cache().is_empty().await);
}

#[test]
fn test_from_config_rejects_invalid_endpoint() {
    let config = Config {
        store: StoreConfig {
            name: "documents".to_string(),
            endpoint: "not a url".to_string(),
            token: None,
            timeout_secs: 5,
        },
        retry: RetryConfig::default(),
    };
    let err = RevalidatingClient::from_config(&config).err().unwrap();
    assert_eq!(*err, ErrorKind::Store);
}
