//! Short-lived local HTTP server that captures an API description from the
//! browser.
//!
//! The server serves an HTML form on `/`, extracts parameters through the
//! documentation parser on `POST /parse`, and accepts the finished
//! specification on `POST /save`. The first accepted save is handed to the
//! waiting caller and the server shuts down.
//!
//! ## Examples
//!
//! ```rust,ignore
//! let handle = CaptureServer::new(parser, 8000).start().await?;
//! println!("Open {}", handle.url());
//! let outcome = handle.wait(Duration::from_secs(1800)).await?;
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::CaptureError;
use crate::openapi::ApiSpec;
use crate::parser::{DocParser, ExtractionService};

const FORM_HTML: &str = include_str!("../static/form.html");

/// How long shutdown waits for open connections to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// What the browser saved.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    pub spec: ApiSpec,
    /// Free-text description of the sample data, if one was entered.
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParseRequest {
    documentation: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    path: String,
}

fn default_method() -> String {
    "GET".to_string()
}

struct CaptureState<S> {
    parser: Arc<DocParser<S>>,
    saved: Arc<Mutex<Option<oneshot::Sender<CaptureOutcome>>>>,
}

impl<S> Clone for CaptureState<S> {
    fn clone(&self) -> Self {
        Self {
            parser: Arc::clone(&self.parser),
            saved: Arc::clone(&self.saved),
        }
    }
}

/// Capture server configuration.
pub struct CaptureServer<S> {
    parser: Arc<DocParser<S>>,
    port: u16,
}

impl<S> CaptureServer<S>
where
    S: ExtractionService + 'static,
{
    /// Creates a server bound to `127.0.0.1:<port>` once started. Port `0`
    /// picks a free port.
    pub fn new(parser: DocParser<S>, port: u16) -> Self {
        Self {
            parser: Arc::new(parser),
            port,
        }
    }

    /// Binds the listener and starts serving in the background.
    ///
    /// ## Errors
    ///
    /// Returns [`CaptureError::Io`] if the port cannot be bound.
    pub async fn start(self) -> Result<CaptureHandle, CaptureError> {
        let (saved_tx, saved_rx) = oneshot::channel();
        let state = CaptureState {
            parser: self.parser,
            saved: Arc::new(Mutex::new(Some(saved_tx))),
        };

        let app = Router::new()
            .route("/", get(form))
            .route("/parse", post(parse::<S>))
            .route("/save", post(save::<S>))
            .with_state(state);

        let listener =
            tokio::net::TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, self.port)))
                .await?;
        let addr = listener.local_addr()?;
        info!("Capture server listening on http://{}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(CaptureHandle {
            addr,
            saved: saved_rx,
            shutdown: shutdown_tx,
            server,
        })
    }
}

/// A running capture server.
#[derive(Debug)]
pub struct CaptureHandle {
    addr: SocketAddr,
    saved: oneshot::Receiver<CaptureOutcome>,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<std::io::Result<()>>,
}

impl CaptureHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The URL of the form.
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Waits for the first saved specification, then shuts the server down.
    ///
    /// ## Errors
    ///
    /// Returns [`CaptureError::Timeout`] if nothing is saved within
    /// `timeout`, and [`CaptureError::Closed`] if the server stopped first.
    pub async fn wait(self, timeout: Duration) -> Result<CaptureOutcome, CaptureError> {
        let result = match tokio::time::timeout(timeout, self.saved).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(CaptureError::Closed),
            Err(_) => Err(CaptureError::Timeout(timeout)),
        };

        let _ = self.shutdown.send(());
        match tokio::time::timeout(SHUTDOWN_GRACE, self.server).await {
            Ok(Ok(Err(e))) => warn!("Capture server stopped with an error: {}", e),
            Ok(Err(e)) => warn!("Capture server task failed: {}", e),
            Err(_) => debug!("Capture server did not drain within {:?}", SHUTDOWN_GRACE),
            Ok(Ok(Ok(()))) => debug!("Capture server stopped"),
        }

        result
    }
}

async fn form() -> Html<&'static str> {
    Html(FORM_HTML)
}

async fn parse<S: ExtractionService + 'static>(
    State(state): State<CaptureState<S>>,
    Json(request): Json<ParseRequest>,
) -> Response {
    match state
        .parser
        .try_parse(&request.documentation, &request.method, &request.path)
        .await
    {
        Ok(parameters) => Json(parameters).into_response(),
        Err(e) => {
            error!("Error parsing documentation: {}", e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

async fn save<S: ExtractionService + 'static>(
    State(state): State<CaptureState<S>>,
    Json(body): Json<Value>,
) -> Response {
    let outcome = match outcome_from_body(body) {
        Ok(outcome) => outcome,
        Err(message) => {
            warn!("Rejected specification: {}", message);
            return error_response(StatusCode::BAD_REQUEST, message);
        }
    };

    let sender = match state.saved.lock() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    let Some(sender) = sender else {
        return error_response(
            StatusCode::CONFLICT,
            "a specification has already been saved".to_string(),
        );
    };

    let endpoints = outcome.spec.endpoints().len();
    if sender.send(outcome).is_err() {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "capture session is no longer waiting".to_string(),
        );
    }

    info!("Received specification with {} endpoints", endpoints);
    Json(json!({ "status": "saved", "endpoints": endpoints })).into_response()
}

/// Splits the optional `description` off a saved document and parses the
/// rest as a specification.
fn outcome_from_body(mut body: Value) -> Result<CaptureOutcome, String> {
    let Some(object) = body.as_object_mut() else {
        return Err("specification must be a JSON object".to_string());
    };
    if !object.get("paths").is_some_and(Value::is_object) {
        return Err("specification must contain a 'paths' object".to_string());
    }

    let description = match object.remove("description") {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    };

    let spec: ApiSpec =
        serde_json::from_value(body).map_err(|e| format!("invalid specification: {e}"))?;
    Ok(CaptureOutcome { spec, description })
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::parser::ExtractionRequest;
    use crate::types::ParamType;

    struct FixedService(Result<String, String>);

    impl ExtractionService for FixedService {
        async fn extract(&self, _request: &ExtractionRequest) -> Result<String, ExtractionError> {
            self.0.clone().map_err(ExtractionError::Service)
        }
    }

    async fn start(reply: Result<&str, &str>) -> CaptureHandle {
        let service = FixedService(reply.map(str::to_string).map_err(str::to_string));
        CaptureServer::new(DocParser::new(service), 0)
            .start()
            .await
            .unwrap()
    }

    fn sample_spec() -> Value {
        json!({
            "openapi": "3.0.0",
            "info": { "title": "Generated API Spec", "version": "1.0.0" },
            "paths": {
                "/search": {
                    "get": {
                        "summary": "Search",
                        "parameters": [{
                            "name": "limit",
                            "in": "query",
                            "required": false,
                            "description": "Page size",
                            "schema": { "type": "integer", "minimum": 1, "maximum": 50 }
                        }]
                    }
                }
            },
            "description": "Restaurants in large cities"
        })
    }

    #[test]
    fn outcome_splits_description() {
        let outcome = outcome_from_body(sample_spec()).unwrap();
        assert_eq!(
            outcome.description.as_deref(),
            Some("Restaurants in large cities")
        );
        assert!(!outcome.spec.extra.contains_key("description"));

        let endpoint = outcome.spec.endpoint("GET", "/search").unwrap();
        assert_eq!(endpoint.parameters[0].param_type, ParamType::Integer);
        assert_eq!(endpoint.parameters[0].constraints.max, Some(50.0));
    }

    #[test]
    fn outcome_requires_paths_object() {
        assert!(outcome_from_body(json!({ "openapi": "3.0.0" })).is_err());
        assert!(outcome_from_body(json!({ "paths": [] })).is_err());
        assert!(outcome_from_body(json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn serves_the_form() {
        let handle = start(Ok("[]")).await;
        let body = reqwest::get(handle.url()).await.unwrap().text().await.unwrap();
        assert!(body.contains("<form id=\"spec-form\">"));
    }

    #[tokio::test]
    async fn parse_returns_cleaned_parameters() {
        let handle = start(Ok(
            r#"{"parameters": [{"name": " term ", "type": "STRING", "required": "yes"}]}"#,
        ))
        .await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/parse", handle.addr()))
            .json(&json!({ "documentation": "term (required)", "method": "GET", "path": "/search" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let parameters: Vec<Value> = response.json().await.unwrap();
        assert_eq!(parameters.len(), 1);
        assert_eq!(parameters[0]["name"], "term");
        assert_eq!(parameters[0]["type"], "string");
        assert_eq!(parameters[0]["required"], true);
    }

    #[tokio::test]
    async fn parse_reports_service_failures() {
        let handle = start(Err("quota exceeded")).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/parse", handle.addr()))
            .json(&json!({ "documentation": "term" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 502);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "quota exceeded");
    }

    #[tokio::test]
    async fn first_valid_save_completes_the_capture() {
        let handle = start(Ok("[]")).await;
        let save_url = format!("http://{}/save", handle.addr());
        let client = reqwest::Client::new();

        let rejected = client
            .post(&save_url)
            .json(&json!({ "openapi": "3.0.0" }))
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), 400);

        let accepted = client
            .post(&save_url)
            .json(&sample_spec())
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status(), 200);

        let outcome = handle.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.spec.endpoints().len(), 1);
        assert!(outcome.description.is_some());
    }

    #[tokio::test]
    async fn wait_times_out_without_a_save() {
        let handle = start(Ok("[]")).await;
        let err = handle.wait(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, CaptureError::Timeout(_)));
    }
}
