//! Turns free-text endpoint documentation into structured parameters.
//!
//! Extraction is delegated to an [`ExtractionService`] (normally a language
//! model). Its reply is treated as untrusted input: every field is
//! re-coerced, parameters without a name are dropped, and anything
//! suspicious is reported as a [`ParameterWarning`] without blocking the
//! result.

use std::fmt;
use std::future::Future;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::ExtractionError;
use crate::types::{Constraints, ParamType, Parameter};

/// System message sent with every extraction request.
pub const SYSTEM_PROMPT: &str = "You are a helpful API documentation parser. Your task is to \
extract parameter information from API documentation and return it in a structured format.";

/// A single extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub system: String,
    pub prompt: String,
}

/// A capability that turns an extraction request into a JSON reply.
///
/// Implementations return the raw reply text; parsing and cleaning happen
/// in [`DocParser`].
pub trait ExtractionService: Send + Sync {
    fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> impl Future<Output = Result<String, ExtractionError>> + Send;
}

/// Collapses whitespace noise: trims every line and drops blank ones.
///
/// ## Examples
///
/// ```
/// use synthapi_lib::normalize_documentation;
///
/// let text = "  location (required)  \n\n\t  The city to search \n";
/// assert_eq!(normalize_documentation(text), "location (required)\nThe city to search");
/// ```
pub fn normalize_documentation(documentation: &str) -> String {
    documentation
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the instruction prompt for one endpoint.
pub fn build_prompt(documentation: &str, method: &str, path: &str) -> String {
    format!(
        r#"Given the following API documentation for a {method} endpoint at {path}, extract all parameters and their details.

For each parameter, identify:
- name: the exact parameter name
- type: one of string, number, integer, boolean, array
- required: true if the text marks it as required (e.g. "required", "*", "must be provided"), false if it says optional or gives no indication
- description: the description, preserving any structured text such as examples or formats
- constraints:
  - min / max: numeric bounds, or null
  - enum: the list of allowed values, or an empty list
  - default: the default value, or null
  - conditional_requirement: a note on any dependency on other parameters (e.g. "required if latitude is not provided"), or null

Respond with JSON only, no prose, in exactly this shape:
{{"parameters": [{{"name": "parameter_name", "type": "string", "required": false, "description": "parameter description", "constraints": {{"min": null, "max": null, "enum": [], "default": null, "conditional_requirement": null}}}}]}}

API Documentation:
{documentation}"#
    )
}

/// The two reply shapes the extraction service may produce.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ExtractionReply {
    /// A bare JSON array of parameter objects.
    Bare(Vec<Value>),
    /// An object with a `parameters` array. A missing key means no parameters.
    Wrapped {
        #[serde(default)]
        parameters: Vec<Value>,
    },
}

impl ExtractionReply {
    /// Parses reply text, tolerating a surrounding Markdown code fence.
    ///
    /// ## Errors
    ///
    /// Returns [`ExtractionError::MalformedReply`] if the text is not one of
    /// the two accepted shapes.
    pub fn from_text(text: &str) -> Result<Self, ExtractionError> {
        Ok(serde_json::from_str(strip_code_fence(text))?)
    }

    /// Normalizes both shapes into the list of raw parameter objects.
    pub fn into_parameters(self) -> Vec<Value> {
        match self {
            Self::Bare(parameters) | Self::Wrapped { parameters } => parameters,
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag such as ```json
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// An advisory problem found in an extracted parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterWarning {
    MissingName,
    MissingDescription { name: String },
    UnknownType { name: String, param_type: String },
    InvertedRange { name: String, min: f64, max: f64 },
    /// `enum` was given but is not a non-empty list.
    InvalidEnum { name: String },
    NonTextualCondition { name: String },
}

impl fmt::Display for ParameterWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingName => write!(f, "parameter is missing a name"),
            Self::MissingDescription { name } => {
                write!(f, "parameter '{name}' is missing a description")
            }
            Self::UnknownType { name, param_type } => write!(
                f,
                "parameter '{name}' has unsupported type '{param_type}' \
                 (expected string, number, integer, boolean or array)"
            ),
            Self::InvertedRange { name, min, max } => {
                write!(f, "parameter '{name}' has min {min} greater than max {max}")
            }
            Self::InvalidEnum { name } => {
                write!(f, "parameter '{name}' has an enum that is not a non-empty list")
            }
            Self::NonTextualCondition { name } => write!(
                f,
                "parameter '{name}' has a conditional requirement that is not text"
            ),
        }
    }
}

/// Cleaned parameters plus the warnings raised while cleaning them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanReport {
    pub parameters: Vec<Parameter>,
    pub warnings: Vec<ParameterWarning>,
}

/// Coerces one raw extracted object into a [`Parameter`].
///
/// Returns `None` for non-objects and for objects whose trimmed name is
/// empty.
///
/// ## Examples
///
/// ```
/// use serde_json::json;
/// use synthapi_lib::{clean_parameter, ParamType};
///
/// let param = clean_parameter(&json!({ "name": " term ", "description": "Search term" })).unwrap();
/// assert_eq!(param.name, "term");
/// assert_eq!(param.param_type, ParamType::String);
/// assert!(!param.required);
/// ```
pub fn clean_parameter(raw: &Value) -> Option<Parameter> {
    let object = raw.as_object()?;

    let name = text_field(object.get("name")).trim().to_string();
    if name.is_empty() {
        return None;
    }

    let param_type = match object.get("type") {
        None | Some(Value::Null) => ParamType::String,
        Some(Value::String(s)) => ParamType::parse(s),
        Some(other) => ParamType::parse(&other.to_string()),
    };

    let empty = Map::new();
    let constraints = object
        .get("constraints")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    Some(Parameter {
        name,
        param_type,
        required: object.get("required").is_some_and(coerce_bool),
        description: text_field(object.get("description")).trim().to_string(),
        constraints: Constraints {
            min: constraints.get("min").and_then(coerce_number),
            max: constraints.get("max").and_then(coerce_number),
            allowed: match constraints.get("enum") {
                Some(Value::Array(values)) => values.clone(),
                _ => Vec::new(),
            },
            default: non_null(constraints.get("default")),
            conditional_requirement: non_null(constraints.get("conditional_requirement")),
        },
    })
}

/// Cleans a batch of raw parameters and collects all advisory warnings.
pub fn clean_parameters(raw: &[Value]) -> CleanReport {
    let mut report = CleanReport::default();

    for value in raw {
        let Some(param) = clean_parameter(value) else {
            if value.is_object() {
                report.warnings.push(ParameterWarning::MissingName);
            }
            debug!("Discarding extracted entry without a name: {}", value);
            continue;
        };

        if let Some(raw_enum) = value.get("constraints").and_then(|c| c.get("enum")) {
            let is_valid = matches!(raw_enum, Value::Array(v) if !v.is_empty());
            if !is_valid && !raw_enum.is_null() {
                report.warnings.push(ParameterWarning::InvalidEnum {
                    name: param.name.clone(),
                });
            }
        }

        report.parameters.push(param);
    }

    report.warnings.extend(lint_parameters(&report.parameters));
    report
}

/// Checks cleaned parameters for problems worth surfacing to the user.
///
/// Warnings are advisory: callers keep and persist the parameters as-is.
pub fn lint_parameters(parameters: &[Parameter]) -> Vec<ParameterWarning> {
    let mut warnings = Vec::new();

    for param in parameters {
        if param.name.trim().is_empty() {
            warnings.push(ParameterWarning::MissingName);
            continue;
        }
        let name = param.name.clone();

        if param.description.trim().is_empty() {
            warnings.push(ParameterWarning::MissingDescription { name: name.clone() });
        }
        if !param.param_type.is_known() {
            warnings.push(ParameterWarning::UnknownType {
                name: name.clone(),
                param_type: param.param_type.to_string(),
            });
        }
        if let (Some(min), Some(max)) = (param.constraints.min, param.constraints.max)
            && min > max
        {
            warnings.push(ParameterWarning::InvertedRange {
                name: name.clone(),
                min,
                max,
            });
        }
        if let Some(condition) = &param.constraints.conditional_requirement
            && !condition.is_string()
        {
            warnings.push(ParameterWarning::NonTextualCondition { name });
        }
    }

    warnings
}

/// Parses an extraction reply into cleaned parameters, logging warnings.
///
/// ## Errors
///
/// Returns [`ExtractionError::MalformedReply`] when the reply is not JSON of
/// an accepted shape.
pub fn parse_reply(text: &str) -> Result<Vec<Parameter>, ExtractionError> {
    let raw = ExtractionReply::from_text(text)?.into_parameters();
    let report = clean_parameters(&raw);

    for warning in &report.warnings {
        warn!("{}", warning);
    }

    Ok(report.parameters)
}

/// Documentation parser backed by an [`ExtractionService`].
#[derive(Debug, Clone)]
pub struct DocParser<S> {
    service: S,
}

impl<S: ExtractionService> DocParser<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Returns the underlying extraction service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Extracts the parameters of one endpoint, surfacing failures.
    ///
    /// ## Errors
    ///
    /// Returns the [`ExtractionError`] from the service call or from parsing
    /// its reply.
    #[tracing::instrument(skip(self, documentation), fields(doc_len = documentation.len()))]
    pub async fn try_parse(
        &self,
        documentation: &str,
        method: &str,
        path: &str,
    ) -> Result<Vec<Parameter>, ExtractionError> {
        let documentation = normalize_documentation(documentation);
        let request = ExtractionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(&documentation, method, path),
        };

        let reply = self.service.extract(&request).await?;
        debug!("Extraction reply: {}", reply);

        let parameters = parse_reply(&reply)?;
        info!("Extracted {} parameters for {} {}", parameters.len(), method, path);
        Ok(parameters)
    }

    /// Extracts the parameters of one endpoint.
    ///
    /// Never fails: a service error or malformed reply is logged and yields
    /// an empty list, which callers cannot tell apart from documentation
    /// that genuinely has no parameters.
    pub async fn parse(&self, documentation: &str, method: &str, path: &str) -> Vec<Parameter> {
        match self.try_parse(documentation, method, path).await {
            Ok(parameters) => parameters,
            Err(e) => {
                error!("Error parsing documentation: {}", e);
                Vec::new()
            }
        }
    }
}

fn text_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "1" | "required"
        ),
        _ => false,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_null(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays a canned reply and records the last request.
    struct CannedService {
        reply: Result<String, String>,
        last_request: Mutex<Option<ExtractionRequest>>,
    }

    impl CannedService {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                last_request: Mutex::new(None),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                last_request: Mutex::new(None),
            }
        }
    }

    impl ExtractionService for CannedService {
        async fn extract(&self, request: &ExtractionRequest) -> Result<String, ExtractionError> {
            *self.last_request.lock().unwrap() = Some(request.clone());
            self.reply.clone().map_err(ExtractionError::Service)
        }
    }

    #[test]
    fn normalization_drops_blank_lines() {
        assert_eq!(normalize_documentation("\n\n  a \n   \n b\n"), "a\nb");
        assert_eq!(normalize_documentation("   "), "");
    }

    #[test]
    fn prompt_mentions_method_path_and_documentation() {
        let prompt = build_prompt("term: search term", "GET", "/search");
        assert!(prompt.contains("GET endpoint at /search"));
        assert!(prompt.contains("term: search term"));
        assert!(prompt.contains("JSON only"));
    }

    #[test]
    fn reply_accepts_bare_array() {
        let reply = ExtractionReply::from_text(r#"[{"name": "a"}]"#).unwrap();
        assert!(matches!(reply, ExtractionReply::Bare(_)));
        assert_eq!(reply.into_parameters().len(), 1);
    }

    #[test]
    fn reply_accepts_wrapped_object() {
        let reply = ExtractionReply::from_text(r#"{"parameters": [{"name": "a"}, {"name": "b"}]}"#)
            .unwrap();
        assert!(matches!(reply, ExtractionReply::Wrapped { .. }));
        assert_eq!(reply.into_parameters().len(), 2);
    }

    #[test]
    fn reply_object_without_parameters_is_empty() {
        let reply = ExtractionReply::from_text(r#"{"result": "none"}"#).unwrap();
        assert!(reply.into_parameters().is_empty());
    }

    #[test]
    fn reply_tolerates_code_fence() {
        let text = "```json\n[{\"name\": \"a\"}]\n```";
        let reply = ExtractionReply::from_text(text).unwrap();
        assert_eq!(reply.into_parameters().len(), 1);
    }

    #[test]
    fn reply_rejects_malformed_json() {
        let result = ExtractionReply::from_text("not json at all");
        assert!(matches!(result, Err(ExtractionError::MalformedReply(_))));

        let result = ExtractionReply::from_text(r#"{"parameters": "nope"}"#);
        assert!(matches!(result, Err(ExtractionError::MalformedReply(_))));
    }

    #[test]
    fn cleaning_defaults_type_and_required() {
        let param = clean_parameter(&json!({ "name": "term" })).unwrap();
        assert_eq!(param.param_type, ParamType::String);
        assert!(!param.required);
        assert!(param.constraints.allowed.is_empty());
    }

    #[test]
    fn cleaning_normalizes_fields() {
        let param = clean_parameter(&json!({
            "name": "  limit ",
            "type": "INTEGER",
            "required": "true",
            "description": "  Max results\n",
            "constraints": {
                "min": "0",
                "max": 50,
                "enum": null,
                "default": 20,
                "conditional_requirement": "only with term"
            }
        }))
        .unwrap();

        assert_eq!(param.name, "limit");
        assert_eq!(param.param_type, ParamType::Integer);
        assert!(param.required);
        assert_eq!(param.description, "Max results");
        assert_eq!(param.constraints.min, Some(0.0));
        assert_eq!(param.constraints.max, Some(50.0));
        assert!(param.constraints.allowed.is_empty());
        assert_eq!(param.constraints.default, Some(json!(20)));
        assert_eq!(
            param.constraints.conditional_requirement,
            Some(json!("only with term"))
        );
    }

    #[test]
    fn unconvertible_bounds_become_absent() {
        let param = clean_parameter(&json!({
            "name": "radius",
            "type": "number",
            "constraints": { "min": "small", "max": [40000] }
        }))
        .unwrap();
        assert_eq!(param.constraints.min, None);
        assert_eq!(param.constraints.max, None);
    }

    #[test]
    fn nameless_entries_are_discarded() {
        assert!(clean_parameter(&json!({ "name": "   " })).is_none());
        assert!(clean_parameter(&json!({ "type": "string" })).is_none());
        assert!(clean_parameter(&json!("location")).is_none());
    }

    #[test]
    fn discarded_nameless_objects_raise_missing_name() {
        let raw = vec![
            json!({ "name": "", "description": "x" }),
            json!({ "description": "y" }),
            json!("location"),
            json!({ "name": "term", "description": "Search term" }),
        ];

        let report = clean_parameters(&raw);
        assert_eq!(report.parameters.len(), 1);
        assert_eq!(report.parameters[0].name, "term");
        assert_eq!(
            report.warnings,
            vec![ParameterWarning::MissingName, ParameterWarning::MissingName]
        );
    }

    #[test]
    fn lint_reports_every_problem_without_dropping_parameters() {
        let raw = vec![
            json!({
                "name": "age",
                "type": "integer",
                "description": "",
                "constraints": { "min": 10, "max": 5 }
            }),
            json!({
                "name": "filter",
                "type": "object",
                "description": "A filter",
                "constraints": { "enum": [], "conditional_requirement": { "if": "x" } }
            }),
        ];

        let report = clean_parameters(&raw);
        assert_eq!(report.parameters.len(), 2);
        assert!(report.warnings.contains(&ParameterWarning::MissingDescription {
            name: "age".to_string()
        }));
        assert!(report.warnings.contains(&ParameterWarning::InvertedRange {
            name: "age".to_string(),
            min: 10.0,
            max: 5.0
        }));
        assert!(report.warnings.contains(&ParameterWarning::UnknownType {
            name: "filter".to_string(),
            param_type: "object".to_string()
        }));
        assert!(report.warnings.contains(&ParameterWarning::InvalidEnum {
            name: "filter".to_string()
        }));
        assert!(report.warnings.contains(&ParameterWarning::NonTextualCondition {
            name: "filter".to_string()
        }));
    }

    #[test]
    fn well_formed_parameters_raise_no_warnings() {
        let raw = vec![json!({
            "name": "status",
            "type": "string",
            "description": "Ticket status",
            "constraints": { "enum": ["open", "closed"] }
        })];
        assert!(clean_parameters(&raw).warnings.is_empty());
    }

    #[test]
    fn non_list_enum_is_reported() {
        let raw = vec![json!({
            "name": "status",
            "description": "Ticket status",
            "constraints": { "enum": "open|closed" }
        })];
        let report = clean_parameters(&raw);
        assert!(report.parameters[0].constraints.allowed.is_empty());
        assert_eq!(
            report.warnings,
            vec![ParameterWarning::InvalidEnum {
                name: "status".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn parse_sends_normalized_documentation() {
        let parser = DocParser::new(CannedService::replying(r#"{"parameters": []}"#));
        parser
            .parse("  location (required) \n\n  city name ", "GET", "/search")
            .await;

        let request = parser.service().last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.system, SYSTEM_PROMPT);
        assert!(request.prompt.contains("location (required)\ncity name"));
    }

    #[tokio::test]
    async fn parse_returns_cleaned_parameters() {
        let reply = json!({
            "parameters": [
                { "name": "location", "type": "string", "required": true, "description": "City" },
                { "name": "", "type": "string" },
                { "name": "limit", "type": "integer", "description": "Max", "constraints": { "max": "50" } }
            ]
        });
        let parser = DocParser::new(CannedService::replying(&reply.to_string()));

        let params = parser.parse("docs", "GET", "/search").await;
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "location");
        assert!(params[0].required);
        assert_eq!(params[1].constraints.max, Some(50.0));
    }

    #[tokio::test]
    async fn service_failure_yields_empty_list() {
        let parser = DocParser::new(CannedService::failing("connection refused"));
        let params = parser.parse("docs", "GET", "/search").await;
        assert!(params.is_empty());

        let err = parser.try_parse("docs", "GET", "/search").await.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }

    #[tokio::test]
    async fn malformed_reply_yields_empty_list() {
        let parser = DocParser::new(CannedService::replying("Sure! Here are the parameters:"));
        assert!(parser.parse("docs", "GET", "/search").await.is_empty());
    }

    #[test]
    #[tracing_test::traced_test]
    fn warnings_are_logged() {
        let reply = r#"[{"name": "age", "type": "integer", "description": "Age", "constraints": {"min": 10, "max": 1}}]"#;
        let params = parse_reply(reply).unwrap();
        assert_eq!(params.len(), 1);
        assert!(logs_contain("min 10 greater than max 1"));
    }
}
