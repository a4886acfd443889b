//! OpenAPI-shaped specification documents.
//!
//! Generated specifications follow the OpenAPI layout
//! `paths -> path -> method -> operation { parameters }`. Parameters are
//! stored as query parameters whose `schema` carries the type and
//! constraints; [`Parameter`] values are converted on the way in and out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Constraints, EndpointSchema, ParamType, Parameter};

const OPENAPI_VERSION: &str = "3.0.0";

/// Document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecInfo {
    pub title: String,
    pub version: String,
}

impl Default for SpecInfo {
    fn default() -> Self {
        Self {
            title: "Generated API Spec".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

/// The `schema` object of an OpenAPI parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A single OpenAPI parameter object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecParameter {
    pub name: String,
    #[serde(rename = "in", default = "default_location")]
    pub location: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schema: ParameterSchema,
    #[serde(
        rename = "x-conditional-requirement",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub conditional_requirement: Option<Value>,
}

fn default_location() -> String {
    "query".to_string()
}

impl From<&Parameter> for SpecParameter {
    fn from(param: &Parameter) -> Self {
        Self {
            name: param.name.clone(),
            location: default_location(),
            required: param.required,
            description: param.description.clone(),
            schema: ParameterSchema {
                param_type: param.param_type.clone(),
                minimum: param.constraints.min,
                maximum: param.constraints.max,
                allowed: param.constraints.allowed.clone(),
                default: param.constraints.default.clone(),
            },
            conditional_requirement: param.constraints.conditional_requirement.clone(),
        }
    }
}

impl From<&SpecParameter> for Parameter {
    fn from(param: &SpecParameter) -> Self {
        Self {
            name: param.name.clone(),
            param_type: param.schema.param_type.clone(),
            required: param.required,
            description: param.description.clone(),
            constraints: Constraints {
                min: param.schema.minimum,
                max: param.schema.maximum,
                allowed: param.schema.allowed.clone(),
                default: param.schema.default.clone(),
                conditional_requirement: param.conditional_requirement.clone(),
            },
        }
    }
}

/// An operation object under a path and method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub parameters: Vec<SpecParameter>,
    /// Any other operation fields (responses, tags, ...), kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A full API specification document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSpec {
    #[serde(default = "default_openapi_version")]
    pub openapi: String,
    #[serde(default)]
    pub info: SpecInfo,
    /// path -> lower-case method -> operation
    #[serde(default)]
    pub paths: BTreeMap<String, BTreeMap<String, Operation>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_openapi_version() -> String {
    OPENAPI_VERSION.to_string()
}

impl Default for ApiSpec {
    fn default() -> Self {
        Self {
            openapi: default_openapi_version(),
            info: SpecInfo::default(),
            paths: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

impl ApiSpec {
    /// Builds a document holding the given endpoints.
    ///
    /// A later endpoint with the same method and path replaces an earlier one.
    pub fn from_endpoints(title: impl Into<String>, endpoints: &[EndpointSchema]) -> Self {
        let mut spec = Self {
            info: SpecInfo {
                title: title.into(),
                ..SpecInfo::default()
            },
            ..Self::default()
        };
        for endpoint in endpoints {
            spec.insert_endpoint(endpoint);
        }
        spec
    }

    /// Adds or replaces the operation for `endpoint`.
    pub fn insert_endpoint(&mut self, endpoint: &EndpointSchema) {
        let operation = Operation {
            summary: endpoint.summary.clone(),
            parameters: endpoint.parameters.iter().map(SpecParameter::from).collect(),
            extra: Map::new(),
        };
        self.paths
            .entry(endpoint.path.clone())
            .or_default()
            .insert(endpoint.method.to_lowercase(), operation);
    }

    /// Looks up one endpoint. `method` is matched case-insensitively.
    ///
    /// ## Examples
    ///
    /// ```
    /// use synthapi_lib::{ApiSpec, EndpointSchema, ParamType, Parameter};
    ///
    /// let mut endpoint = EndpointSchema::new("GET", "/v3/businesses/search");
    /// endpoint.parameters.push(Parameter::new("term", ParamType::String));
    /// let spec = ApiSpec::from_endpoints("yelp", &[endpoint]);
    ///
    /// let found = spec.endpoint("get", "/v3/businesses/search").unwrap();
    /// assert_eq!(found.parameters[0].name, "term");
    /// assert!(spec.endpoint("POST", "/v3/businesses/search").is_none());
    /// ```
    pub fn endpoint(&self, method: &str, path: &str) -> Option<EndpointSchema> {
        let operation = self.paths.get(path)?.get(&method.to_lowercase())?;
        Some(to_endpoint(path, &method.to_uppercase(), operation))
    }

    /// All endpoints in path order, then method order.
    pub fn endpoints(&self) -> Vec<EndpointSchema> {
        self.paths
            .iter()
            .flat_map(|(path, methods)| {
                methods
                    .iter()
                    .map(move |(method, op)| to_endpoint(path, &method.to_uppercase(), op))
            })
            .collect()
    }
}

fn to_endpoint(path: &str, method: &str, operation: &Operation) -> EndpointSchema {
    EndpointSchema {
        method: method.to_string(),
        path: path.to_string(),
        summary: operation.summary.clone(),
        parameters: operation.parameters.iter().map(Parameter::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search_endpoint() -> EndpointSchema {
        let mut endpoint = EndpointSchema::new("GET", "/v3/businesses/search");
        endpoint.summary = Some("Search businesses".to_string());
        endpoint.parameters = vec![
            Parameter::new("location", ParamType::String)
                .required()
                .with_description("Where to search"),
            Parameter::new("limit", ParamType::Integer).with_range(Some(0.0), Some(50.0)),
            Parameter::new("sort_by", ParamType::String).with_enum(["best_match", "rating"]),
        ];
        endpoint
    }

    #[test]
    fn parameters_are_written_as_query_parameters() {
        let spec = ApiSpec::from_endpoints("yelp", &[search_endpoint()]);
        let value = serde_json::to_value(&spec).unwrap();

        let params = &value["paths"]["/v3/businesses/search"]["get"]["parameters"];
        assert_eq!(params[0]["in"], "query");
        assert_eq!(params[0]["required"], true);
        assert_eq!(params[1]["schema"], json!({ "type": "integer", "minimum": 0.0, "maximum": 50.0 }));
        assert_eq!(params[2]["schema"]["enum"], json!(["best_match", "rating"]));
        assert_eq!(value["openapi"], "3.0.0");
        assert_eq!(value["info"]["title"], "yelp");
    }

    #[test]
    fn zero_bounds_are_preserved() {
        let spec = ApiSpec::from_endpoints("yelp", &[search_endpoint()]);
        let endpoint = spec.endpoint("GET", "/v3/businesses/search").unwrap();
        assert_eq!(endpoint.parameters[1].constraints.min, Some(0.0));
    }

    #[test]
    fn endpoint_round_trips_through_the_document() {
        let original = search_endpoint();
        let spec = ApiSpec::from_endpoints("yelp", &[original.clone()]);
        let text = serde_json::to_string_pretty(&spec).unwrap();
        let reloaded: ApiSpec = serde_json::from_str(&text).unwrap();

        assert_eq!(reloaded.endpoint("GET", &original.path), Some(original));
    }

    #[test]
    fn reads_documents_written_by_the_capture_form() {
        let doc = json!({
            "openapi": "3.0.0",
            "info": { "title": "Generated API Spec", "version": "1.0.0" },
            "paths": {
                "/users": {
                    "get": {
                        "summary": "List users",
                        "parameters": [
                            {
                                "name": "active",
                                "in": "query",
                                "required": false,
                                "schema": { "type": "boolean" },
                                "description": "Only active users"
                            }
                        ],
                        "responses": { "200": { "description": "ok" } }
                    }
                }
            },
            "servers": [{ "url": "https://example.com" }]
        });

        let spec: ApiSpec = serde_json::from_value(doc).unwrap();
        let endpoint = spec.endpoint("GET", "/users").unwrap();
        assert_eq!(endpoint.parameters[0].param_type, ParamType::Boolean);
        assert!(spec.extra.contains_key("servers"));

        let operation = &spec.paths["/users"]["get"];
        assert!(operation.extra.contains_key("responses"));
    }

    #[test]
    fn endpoints_lists_every_operation() {
        let mut post = EndpointSchema::new("POST", "/v3/businesses/search");
        post.parameters.push(Parameter::new("name", ParamType::String));
        let spec = ApiSpec::from_endpoints("yelp", &[search_endpoint(), post]);

        let endpoints = spec.endpoints();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].method, "GET");
        assert_eq!(endpoints[1].method, "POST");
    }

    #[test]
    fn missing_paths_deserialize_as_empty() {
        let spec: ApiSpec = serde_json::from_value(json!({})).unwrap();
        assert!(spec.paths.is_empty());
        assert!(spec.endpoint("GET", "/").is_none());
    }
}
