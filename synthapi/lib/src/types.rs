//! Core parameter types shared by the parser, validator and spec documents.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// The declared type of an endpoint parameter.
///
/// Anything outside the five supported kinds is kept as [`ParamType::Other`]
/// so it can be reported as a warning instead of being silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParamType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Array,
    /// An unsupported type name, lower-cased.
    Other(String),
}

impl ParamType {
    /// Parses a type name, case-insensitively.
    ///
    /// ## Examples
    ///
    /// ```
    /// use synthapi_lib::ParamType;
    ///
    /// assert_eq!(ParamType::parse(" Integer "), ParamType::Integer);
    /// assert_eq!(ParamType::parse("object"), ParamType::Other("object".to_string()));
    /// ```
    pub fn parse(value: &str) -> Self {
        let lowered = value.trim().to_lowercase();
        match lowered.as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            _ => Self::Other(lowered),
        }
    }

    /// Returns the lower-case type name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Other(name) => name,
        }
    }

    /// Returns `true` for one of the five supported kinds.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Returns `true` for `number` and `integer`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Number | Self::Integer)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ParamType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ParamType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Constraints attached to a parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Inclusive lower bound for numeric parameters.
    #[serde(default)]
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric parameters.
    #[serde(default)]
    pub max: Option<f64>,
    /// Allowed literal values, in documentation order. Empty means unrestricted.
    #[serde(default, rename = "enum")]
    pub allowed: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Free-text note about a dependency on other fields, e.g.
    /// "required if latitude is not provided".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_requirement: Option<Value>,
}

impl Constraints {
    /// The allowed values rendered as plain strings.
    ///
    /// JSON strings render without quotes; other literals use their JSON form.
    pub fn allowed_literals(&self) -> Vec<String> {
        self.allowed.iter().map(literal).collect()
    }
}

/// Renders a JSON literal the way a user would type it on the command line.
pub(crate) fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One documented input of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub constraints: Constraints,
}

impl Parameter {
    /// Creates an optional parameter with no description or constraints.
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            description: String::new(),
            constraints: Constraints::default(),
        }
    }

    /// Marks the parameter as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets inclusive numeric bounds.
    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.constraints.min = min;
        self.constraints.max = max;
        self
    }

    /// Restricts the parameter to a set of string literals.
    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints.allowed = values
            .into_iter()
            .map(|v| Value::String(v.into()))
            .collect();
        self
    }
}

/// The parameters of one operation, identified by method and path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSchema {
    /// Upper-case HTTP method, e.g. `GET`.
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl EndpointSchema {
    pub fn new(method: &str, path: impl Into<String>) -> Self {
        Self {
            method: method.trim().to_uppercase(),
            path: path.into(),
            summary: None,
            parameters: Vec::new(),
        }
    }
}
