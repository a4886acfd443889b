//! Outbound calls to the remote side: specification upload, remote
//! initialization and mock dispatch.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::ClientError;
use crate::openapi::ApiSpec;
use crate::retry::with_timeout_retry;

/// User agent sent with mock requests.
pub const CLIENT_USER_AGENT: &str = concat!("synthapi-client/", env!("CARGO_PKG_VERSION"));

/// Response from the mock-serving endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    /// The URL that was requested, including the query string.
    pub url: Url,
    pub status: u16,
    pub body: String,
}

impl MockResponse {
    /// Pretty-prints the body if it is JSON, otherwise returns it unchanged.
    pub fn pretty_body(&self) -> String {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|value| serde_json::to_string_pretty(&value).ok())
            .unwrap_or_else(|| self.body.clone())
    }
}

#[derive(Debug, Serialize)]
struct InitRequest<'a> {
    api_name: &'a str,
}

/// HTTP client for the upload, init and mock endpoints.
///
/// Every call runs under the configured timeout and is retried once if it
/// times out.
#[derive(Debug, Clone)]
pub struct SynthClient {
    http: Client,
    timeout: Duration,
}

impl SynthClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Uploads a specification document to `<bucket>/schemas/<api_name>.json`.
    ///
    /// ## Errors
    ///
    /// Returns [`ClientError`] on connection failures, timeouts or a
    /// non-success status.
    #[instrument(skip(self, spec))]
    pub async fn upload_spec(
        &self,
        bucket: &Url,
        api_name: &str,
        spec: &ApiSpec,
    ) -> Result<Url, ClientError> {
        let url = object_url(bucket, "schemas", &format!("{api_name}.json"))?;
        let body = serde_json::to_vec(spec)?;

        self.send("specification upload", || {
            self.http
                .put(url.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone())
        })
        .await?;

        info!("Uploaded specification for {} to {}", api_name, url);
        Ok(url)
    }

    /// Uploads the free-text description to `<bucket>/raw/<api_name>.txt`.
    #[instrument(skip(self, text))]
    pub async fn upload_raw(
        &self,
        bucket: &Url,
        api_name: &str,
        text: &str,
    ) -> Result<Url, ClientError> {
        let url = object_url(bucket, "raw", &format!("{api_name}.txt"))?;

        self.send("description upload", || {
            self.http
                .put(url.clone())
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(text.to_owned())
        })
        .await?;

        info!("Uploaded description for {} to {}", api_name, url);
        Ok(url)
    }

    /// Asks the remote side to generate and index sample data for `api_name`.
    ///
    /// Returns the response body.
    #[instrument(skip(self))]
    pub async fn initialize(&self, init_url: &Url, api_name: &str) -> Result<String, ClientError> {
        let body = self
            .send("remote initialization", || {
                self.http
                    .post(init_url.clone())
                    .json(&InitRequest { api_name })
            })
            .await?;

        info!("Remote initialization accepted for {}", api_name);
        Ok(body)
    }

    /// Issues a GET against the mock-serving endpoint.
    ///
    /// The query carries `API_NAME` and `ENDPOINT` followed by `params`.
    /// Parameters should already have passed [`validate`](crate::validate).
    #[instrument(skip(self, params))]
    pub async fn dispatch(
        &self,
        mock_url: &Url,
        api_name: &str,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<MockResponse, ClientError> {
        let url = mock_request_url(mock_url, api_name, endpoint, params);
        debug!("Dispatching mock request to {}", url);

        let response = self
            .execute("mock request", || {
                self.http
                    .get(url.clone())
                    .header(ACCEPT, "application/json")
                    .header(USER_AGENT, CLIENT_USER_AGENT)
            })
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(MockResponse { url, status, body })
    }

    /// Sends a request built by `build` under the timeout. The builder is
    /// invoked again for the retry.
    async fn execute(
        &self,
        label: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Response, ClientError> {
        let build = &build;
        with_timeout_retry(
            self.timeout,
            label,
            || async move { build().send().await.map_err(ClientError::from) },
            ClientError::Timeout,
        )
        .await
    }

    /// Sends a request built by `build`, mapping non-success statuses to
    /// [`ClientError::HttpStatus`]. Returns the response body.
    async fn send(
        &self,
        label: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<String, ClientError> {
        let response = self.execute(label, build).await?;

        let status = response.status();
        let body = response.text().await;
        if !status.is_success() {
            let body = body.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body
            };
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body?)
    }
}

/// Joins `<base>/<folder>/<file>` regardless of a trailing slash on `base`.
fn object_url(base: &Url, folder: &str, file: &str) -> Result<Url, ClientError> {
    let joined = format!("{}/{folder}/{file}", base.as_str().trim_end_matches('/'));
    Ok(Url::parse(&joined)?)
}

fn mock_request_url(
    base: &Url,
    api_name: &str,
    endpoint: &str,
    params: &BTreeMap<String, String>,
) -> Url {
    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("API_NAME", api_name);
        query.append_pair("ENDPOINT", endpoint);
        for (name, value) in params {
            query.append_pair(name, value);
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EndpointSchema, ParamType, Parameter};
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> SynthClient {
        SynthClient::new(Duration::from_secs(5))
    }

    fn base(server: &MockServer) -> Url {
        Url::parse(&server.uri()).unwrap()
    }

    #[test]
    fn object_url_tolerates_trailing_slash() {
        let with = Url::parse("https://bucket.example.com/prefix/").unwrap();
        let without = Url::parse("https://bucket.example.com/prefix").unwrap();
        assert_eq!(
            object_url(&with, "schemas", "yelp.json").unwrap().as_str(),
            "https://bucket.example.com/prefix/schemas/yelp.json"
        );
        assert_eq!(
            object_url(&with, "raw", "yelp.txt").unwrap(),
            object_url(&without, "raw", "yelp.txt").unwrap()
        );
    }

    #[test]
    fn mock_url_puts_api_and_endpoint_first() {
        let mut params = BTreeMap::new();
        params.insert("location".to_string(), "new york".to_string());
        params.insert("limit".to_string(), "5".to_string());

        let url = mock_request_url(
            &Url::parse("https://mock.example.com/default/get").unwrap(),
            "yelp",
            "/businesses/search",
            &params,
        );
        assert_eq!(
            url.query(),
            Some("API_NAME=yelp&ENDPOINT=%2Fbusinesses%2Fsearch&limit=5&location=new+york")
        );
    }

    #[test]
    fn pretty_body_formats_json_only() {
        let response = MockResponse {
            url: Url::parse("https://mock.example.com").unwrap(),
            status: 200,
            body: r#"{"id":1}"#.to_string(),
        };
        assert_eq!(response.pretty_body(), "{\n  \"id\": 1\n}");

        let plain = MockResponse {
            body: "not json".to_string(),
            ..response
        };
        assert_eq!(plain.pretty_body(), "not json");
    }

    #[tokio::test]
    async fn upload_spec_puts_json_under_schemas() {
        let server = MockServer::start().await;
        let mut endpoint = EndpointSchema::new("get", "/search");
        endpoint
            .parameters
            .push(Parameter::new("term", ParamType::String).required());
        let spec = ApiSpec::from_endpoints("yelp", &[endpoint]);

        Mock::given(method("PUT"))
            .and(path("/schemas/yelp.json"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::to_value(&spec).unwrap()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = client()
            .upload_spec(&base(&server), "yelp", &spec)
            .await
            .unwrap();
        assert!(url.as_str().ends_with("/schemas/yelp.json"));
    }

    #[tokio::test]
    async fn upload_raw_puts_text_under_raw() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/raw/yelp.txt"))
            .and(body_string("Restaurants in big cities"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client()
            .upload_raw(&base(&server), "yelp", "Restaurants in big cities")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn initialize_posts_api_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/init"))
            .and(body_json(json!({ "api_name": "yelp" })))
            .respond_with(ResponseTemplate::new(200).set_body_string("started"))
            .expect(1)
            .mount(&server)
            .await;

        let init_url = Url::parse(&format!("{}/init", server.uri())).unwrap();
        let body = client().initialize(&init_url, "yelp").await.unwrap();
        assert_eq!(body, "started");
    }

    #[tokio::test]
    async fn failed_upload_reports_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("AccessDenied"))
            .mount(&server)
            .await;

        let err = client()
            .upload_raw(&base(&server), "yelp", "text")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 403: AccessDenied");
    }

    #[tokio::test]
    async fn empty_error_body_uses_status_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client()
            .initialize(&base(&server), "yelp")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");
    }

    #[tokio::test]
    async fn dispatch_sends_flat_query_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mock"))
            .and(query_param("API_NAME", "yelp"))
            .and(query_param("ENDPOINT", "/search"))
            .and(query_param("term", "pizza"))
            .and(header("accept", "application/json"))
            .and(header("user-agent", CLIENT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "name": "Joe's" }])))
            .expect(1)
            .mount(&server)
            .await;

        let mock_url = Url::parse(&format!("{}/mock", server.uri())).unwrap();
        let mut params = BTreeMap::new();
        params.insert("term".to_string(), "pizza".to_string());

        let response = client()
            .dispatch(&mock_url, "yelp", "/search", &params)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(response.body.contains("Joe's"));
        assert_eq!(response.url.path(), "/mock");
    }

    #[tokio::test]
    async fn dispatch_returns_error_statuses_to_the_caller() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no records"))
            .mount(&server)
            .await;

        let response = client()
            .dispatch(&base(&server), "yelp", "/missing", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.body, "no records");
    }

    #[tokio::test]
    async fn dispatch_times_out_after_one_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .expect(2)
            .mount(&server)
            .await;

        let err = SynthClient::new(Duration::from_millis(100))
            .dispatch(&base(&server), "yelp", "/search", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
    }

    /// Answers one connection with a body shorter than its declared length.
    async fn truncated_body_server() -> Url {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\nconnection: close\r\n\r\nshort")
                .await
                .unwrap();
        });
        Url::parse(&format!("http://{addr}/init")).unwrap()
    }

    #[tokio::test]
    async fn initialize_surfaces_body_read_failures() {
        let init_url = truncated_body_server().await;

        let err = client().initialize(&init_url, "yelp").await.unwrap_err();
        assert!(matches!(err, ClientError::Request(_)));
    }
}
