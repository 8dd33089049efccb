//! HTTP document store.
//!
//! Speaks a Cosmos-style REST protocol: documents are JSON objects carrying
//! `id`, `_etag` and `_self` system properties next to their payload, point
//! reads honour `If-None-Match`, and writes honour `If-Match`.

use crate::error::{ErrorKind, Result};
use crate::models::{CollectionLocator, ConditionalRead, Document, DocumentId, ETag, Locator, RawDocument};
use crate::DocumentStore;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use reqwest::header::{AUTHORIZATION, ETAG, HeaderMap, HeaderValue, IF_MATCH, IF_NONE_MATCH, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::debug;

const USER_AGENT_VALUE: &str = concat!("revalidate-store/", env!("CARGO_PKG_VERSION"));
const QUERY_BY_ID: &str = "SELECT * FROM c WHERE c.id = @id";

/// A document as it travels over the wire. Every property that isn't a
/// system property (prefixed with an underscore) is payload.
#[derive(Debug, Serialize, Deserialize)]
struct WireDocument {
    id: String,
    #[serde(rename = "_etag", default, skip_serializing)]
    etag: Option<String>,
    #[serde(rename = "_self", default, skip_serializing)]
    self_link: Option<String>,
    #[serde(flatten)]
    properties: Map<String, Value>,
}
impl WireDocument {
    fn outgoing(id: &DocumentId, payload: Value) -> Result<Self> {
        let Value::Object(properties) = payload else {
            exn::bail!(ErrorKind::InvalidData);
        };
        Ok(Self {
            id: id.to_string(),
            etag: None,
            self_link: None,
            properties,
        })
    }

    /// `header_etag` wins over the `_etag` property; `fallback` is used when
    /// the body has no `_self`.
    fn into_document(
        self,
        collection: &CollectionLocator,
        header_etag: Option<String>,
        fallback: Option<&Locator>,
    ) -> Result<RawDocument> {
        let id = DocumentId::new(self.id)?;
        let etag = header_etag
            .or(self.etag)
            .ok_or_raise(|| ErrorKind::BackendError(format!("document {id} has no version tag")))?;
        let locator = match (self.self_link, fallback) {
            (Some(link), _) => Locator::new(link)?,
            (None, Some(locator)) => locator.clone(),
            (None, None) => collection.document(&id),
        };
        let payload = self.properties.into_iter().filter(|(key, _)| !key.starts_with('_')).collect();
        Ok(Document {
            id,
            etag: ETag::new(etag),
            locator,
            collection: collection.clone(),
            payload: Value::Object(payload),
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "Documents", default)]
    documents: Vec<WireDocument>,
}

/// Document store backed by a remote HTTP service.
///
/// Timeouts are enforced per request by the underlying client; a request that
/// exceeds it fails with [`Timeout`](ErrorKind::Timeout).
///
/// # Examples
///
/// ```no_run
/// use revalidate_store::backend::HttpStore;
/// use std::time::Duration;
///
/// # fn example() -> revalidate_store::error::Result<()> {
/// let store = HttpStore::new(
///     "documents",
///     "https://localhost:8081",
///     Some("secret-token".to_string()),
///     Duration::from_secs(30),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpStore {
    name: String,
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpStore {
    /// Create a new HTTP store.
    ///
    /// # Arguments
    /// * `name` - A name for this store (used in logging)
    /// * `endpoint` - Base URL of the document service
    /// * `token` - Optional bearer token sent with every request
    /// * `timeout` - Per-request timeout
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        let endpoint = match Url::parse(&endpoint) {
            Ok(url) if !url.cannot_be_a_base() => url,
            _ => exn::bail!(ErrorKind::InvalidLocator(endpoint)),
        };
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .or_raise(|| ErrorKind::BackendError("token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .or_raise(|| ErrorKind::BackendError("failed to create HTTP client".to_string()))?;
        Ok(Self {
            name: name.into(),
            client,
            endpoint,
        })
    }

    /// Resolve `path` against the endpoint. Each `/`-separated segment is
    /// percent-encoded, so identities containing `?`, `#` or spaces address
    /// the right resource.
    fn url(&self, path: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path.split('/').filter(|segment| !segment.is_empty()));
        }
        url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Send a request and map failure statuses onto [`ErrorKind`]s. `target`
    /// names the addressed resource in error messages.
    async fn send(&self, request: RequestBuilder, target: &str) -> Result<Response> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(e).or_raise(|| ErrorKind::Timeout),
            Err(e) => {
                let message = e.to_string();
                return Err(e).or_raise(|| ErrorKind::Network(message));
            },
        };
        let status = response.status();
        match status.as_u16() {
            200..=299 | 304 => Ok(response),
            401 | 403 => exn::bail!(ErrorKind::PermissionDenied),
            404 => exn::bail!(ErrorKind::NotFound(target.to_string())),
            409 => exn::bail!(ErrorKind::AlreadyExists(target.to_string())),
            412 => exn::bail!(ErrorKind::Conflict(target.to_string())),
            408 | 429 | 500..=599 => exn::bail!(ErrorKind::Network(format!("HTTP {}", status.as_u16()))),
            _ => {
                let body = response.text().await.unwrap_or_else(|_| status.to_string());
                exn::bail!(ErrorKind::BackendError(format!("HTTP {}: {}", status.as_u16(), body)))
            },
        }
    }

    async fn parse(response: Response) -> Result<WireDocument> {
        response.json::<WireDocument>().await.or_raise(|| ErrorKind::InvalidData)
    }

    fn header_etag(response: &Response) -> Option<String> {
        response.headers().get(ETAG).and_then(|v| v.to_str().ok()).map(str::to_string)
    }

    /// Self links look like `{collection}/docs/{id}`.
    fn collection_of(locator: &Locator) -> Result<CollectionLocator> {
        let (collection, _) = locator
            .as_str()
            .rsplit_once("/docs/")
            .ok_or_raise(|| ErrorKind::InvalidLocator(locator.to_string()))?;
        CollectionLocator::new(collection)
    }
}

#[async_trait]
impl DocumentStore for HttpStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn conditional_read(&self, locator: &Locator, if_none_match: &ETag) -> Result<ConditionalRead> {
        let collection = Self::collection_of(locator)?;
        debug!(store = self.name.as_str(), %locator, etag = %if_none_match, "Conditional read");
        let request = self.request(Method::GET, locator.as_str()).header(IF_NONE_MATCH, if_none_match.as_str());
        let response = self.send(request, locator.as_str()).await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(ConditionalRead::NotModified);
        }
        let etag = Self::header_etag(&response);
        let document = Self::parse(response).await?.into_document(&collection, etag, Some(locator))?;
        // Some services ignore the precondition and always answer 200.
        match &document.etag == if_none_match {
            true => Ok(ConditionalRead::NotModified),
            false => Ok(ConditionalRead::Modified(document)),
        }
    }

    async fn find_by_id(&self, collection: &CollectionLocator, id: &DocumentId) -> Result<Option<RawDocument>> {
        debug!(store = self.name.as_str(), %collection, %id, "Lookup by identity");
        let body = json!({
            "query": QUERY_BY_ID,
            "parameters": [{"name": "@id", "value": id.as_str()}],
        });
        let request = self.request(Method::POST, &format!("{collection}/docs/query")).json(&body);
        let response = self.send(request, collection.as_str()).await?;
        let results = response.json::<QueryResponse>().await.or_raise(|| ErrorKind::InvalidData)?;
        results
            .documents
            .into_iter()
            .next()
            .map(|document| document.into_document(collection, None, None))
            .transpose()
    }

    async fn replace(&self, locator: &Locator, payload: Value, if_match: &ETag) -> Result<RawDocument> {
        let collection = Self::collection_of(locator)?;
        let (_, id) = locator
            .as_str()
            .rsplit_once("/docs/")
            .ok_or_raise(|| ErrorKind::InvalidLocator(locator.to_string()))?;
        let body = WireDocument::outgoing(&DocumentId::new(id)?, payload)?;
        let request = self.request(Method::PUT, locator.as_str()).header(IF_MATCH, if_match.as_str()).json(&body);
        let response = self.send(request, locator.as_str()).await?;
        let etag = Self::header_etag(&response);
        Self::parse(response).await?.into_document(&collection, etag, Some(locator))
    }

    async fn create(&self, collection: &CollectionLocator, id: &DocumentId, payload: Value) -> Result<RawDocument> {
        let body = WireDocument::outgoing(id, payload)?;
        let request = self.request(Method::POST, &format!("{collection}/docs")).json(&body);
        let response = self.send(request, collection.document(id).as_str()).await?;
        let etag = Self::header_etag(&response);
        Self::parse(response).await?.into_document(collection, etag, None)
    }

    async fn delete(&self, locator: &Locator) -> Result<()> {
        self.send(self.request(Method::DELETE, locator.as_str()), locator.as_str()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COLLECTION: &str = "dbs/demo/colls/customers";
    const SELF_LINK: &str = "dbs/demo/colls/customers/docs/c1";

    fn store(server: &MockServer) -> HttpStore {
        HttpStore::new("test", server.uri(), Some("test-token".to_string()), Duration::from_secs(5)).unwrap()
    }

    fn collection() -> CollectionLocator {
        CollectionLocator::new(COLLECTION).unwrap()
    }

    fn locator() -> Locator {
        Locator::new(SELF_LINK).unwrap()
    }

    fn wire(name: &str, etag: &str) -> Value {
        json!({"id": "c1", "name": name, "_etag": etag, "_self": SELF_LINK, "_ts": 1700000000})
    }

    #[tokio::test]
    async fn test_conditional_read_not_modified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{SELF_LINK}")))
            .and(header("if-none-match", "\"v0\""))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let read = store(&server).conditional_read(&locator(), &ETag::new("\"v0\"")).await.unwrap();
        assert_eq!(read, ConditionalRead::NotModified);
    }

    #[tokio::test]
    async fn test_conditional_read_modified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{SELF_LINK}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(wire("Demo2", "\"v1\"")))
            .mount(&server)
            .await;

        let read = store(&server).conditional_read(&locator(), &ETag::new("\"v0\"")).await.unwrap();
        let ConditionalRead::Modified(document) = read else {
            panic!("expected a modified document");
        };
        assert_eq!(document.etag, ETag::new("\"v1\""));
        assert_eq!(document.collection, collection());
        assert_eq!(document.locator, locator());
        // System properties are stripped from the payload.
        assert_eq!(document.payload, json!({"name": "Demo2"}));
    }

    #[tokio::test]
    async fn test_header_etag_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{SELF_LINK}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(wire("Demo", "\"body\"")).insert_header("etag", "\"header\""),
            )
            .mount(&server)
            .await;

        let read = store(&server).conditional_read(&locator(), &ETag::new("\"v0\"")).await.unwrap();
        let ConditionalRead::Modified(document) = read else {
            panic!("expected a modified document");
        };
        assert_eq!(document.etag, ETag::new("\"header\""));
    }

    #[tokio::test]
    async fn test_conditional_read_ignored_precondition() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{SELF_LINK}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(wire("Demo", "\"v0\"")))
            .mount(&server)
            .await;

        let read = store(&server).conditional_read(&locator(), &ETag::new("\"v0\"")).await.unwrap();
        assert_eq!(read, ConditionalRead::NotModified);
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{COLLECTION}/docs/query")))
            .and(body_json(json!({
                "query": QUERY_BY_ID,
                "parameters": [{"name": "@id", "value": "c1"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Documents": [wire("Demo", "\"v0\"")]})))
            .mount(&server)
            .await;

        let id = DocumentId::new("c1").unwrap();
        let document = store(&server).find_by_id(&collection(), &id).await.unwrap().unwrap();
        assert_eq!(document.id, id);
        assert_eq!(document.etag, ETag::new("\"v0\""));
        assert_eq!(document.payload, json!({"name": "Demo"}));
    }

    #[tokio::test]
    async fn test_find_by_id_no_match() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{COLLECTION}/docs/query")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Documents": []})))
            .mount(&server)
            .await;

        let id = DocumentId::new("c1").unwrap();
        assert_eq!(store(&server).find_by_id(&collection(), &id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_sends_if_match() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("/{SELF_LINK}")))
            .and(header("if-match", "\"v0\""))
            .and(body_json(json!({"id": "c1", "name": "Demo2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(wire("Demo2", "\"v1\"")))
            .mount(&server)
            .await;

        let replaced =
            store(&server).replace(&locator(), json!({"name": "Demo2"}), &ETag::new("\"v0\"")).await.unwrap();
        assert_eq!(replaced.etag, ETag::new("\"v1\""));
    }

    #[tokio::test]
    async fn test_replace_rejects_non_object_payload() {
        let server = MockServer::start().await;
        let err = store(&server).replace(&locator(), json!([1, 2, 3]), &ETag::new("\"v0\"")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData));
    }

    #[tokio::test]
    async fn test_create() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{COLLECTION}/docs")))
            .respond_with(ResponseTemplate::new(201).set_body_json(wire("Demo", "\"v0\"")))
            .mount(&server)
            .await;

        let id = DocumentId::new("c1").unwrap();
        let created = store(&server).create(&collection(), &id, json!({"name": "Demo"})).await.unwrap();
        assert_eq!(created.locator, locator());
    }

    #[rstest]
    #[case(404, ErrorKind::NotFound(SELF_LINK.to_string()))]
    #[case(409, ErrorKind::AlreadyExists(SELF_LINK.to_string()))]
    #[case(412, ErrorKind::Conflict(SELF_LINK.to_string()))]
    #[case(401, ErrorKind::PermissionDenied)]
    #[case(403, ErrorKind::PermissionDenied)]
    #[case(429, ErrorKind::Network("HTTP 429".to_string()))]
    #[case(503, ErrorKind::Network("HTTP 503".to_string()))]
    #[tokio::test]
    async fn test_status_mapping(#[case] status: u16, #[case] expected: ErrorKind) {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("/{SELF_LINK}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let err = store(&server).delete(&locator()).await.unwrap_err();
        assert_eq!(*err, expected);
    }

    #[tokio::test]
    async fn test_unexpected_status_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{SELF_LINK}")))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let err = store(&server).conditional_read(&locator(), &ETag::new("\"v0\"")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::BackendError("HTTP 400: bad request".to_string()));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{SELF_LINK}")))
            .respond_with(ResponseTemplate::new(304).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let store = HttpStore::new("test", server.uri(), None, Duration::from_millis(100)).unwrap();
        let err = store.conditional_read(&locator(), &ETag::new("\"v0\"")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Timeout));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_collection_of() {
        assert_eq!(HttpStore::collection_of(&locator()).unwrap(), collection());
        let err = HttpStore::collection_of(&Locator::new("no-docs-segment").unwrap()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidLocator(_)));
    }

    #[rstest]
    #[case("")]
    #[case("/")]
    #[case("localhost without scheme")]
    #[case("mailto:documents@example.com")]
    fn test_invalid_endpoint_rejected(#[case] endpoint: &str) {
        let err = HttpStore::new("test", endpoint, None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidLocator(_)));
    }

    #[rstest]
    #[case("https://localhost:8081", "https://localhost:8081/dbs/demo/colls/customers/docs/c1")]
    #[case("https://localhost:8081/", "https://localhost:8081/dbs/demo/colls/customers/docs/c1")]
    #[case("https://example.com/api/", "https://example.com/api/dbs/demo/colls/customers/docs/c1")]
    fn test_url_joins_endpoint_path(#[case] endpoint: &str, #[case] expected: &str) {
        let store = HttpStore::new("test", endpoint, None, Duration::from_secs(1)).unwrap();
        assert_eq!(store.url(SELF_LINK).as_str(), expected);
    }

    #[test]
    fn test_url_encodes_identity_segment() {
        let store = HttpStore::new("test", "https://localhost:8081", None, Duration::from_secs(1)).unwrap();
        let locator = collection().document(&DocumentId::new("c?1 #2").unwrap());
        assert_eq!(
            store.url(locator.as_str()).as_str(),
            "https://localhost:8081/dbs/demo/colls/customers/docs/c%3F1%20%232"
        );
    }

    #[tokio::test]
    async fn test_conditional_read_with_reserved_characters_in_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dbs/demo/colls/customers/docs/c%3F1%20%232"))
            .and(header("if-none-match", "\"v0\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let locator = collection().document(&DocumentId::new("c?1 #2").unwrap());
        let read = store(&server).conditional_read(&locator, &ETag::new("\"v0\"")).await.unwrap();
        assert_eq!(read, ConditionalRead::NotModified);
    }
}
